//! Structured content extraction from rendered HTML.
//!
//! Pulls title, description, h1/h2 headings and the readable body text out of
//! a page. Body text is collected from block elements outside navigation
//! chrome, one block per line, and truncated to a byte budget.

use crawlq_shared::{CrawlqError, Heading, PageContent, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

/// Elements whose text forms the page content.
const CONTENT_BLOCKS: &[&str] = &["p", "li", "blockquote", "pre"];

/// Site chrome whose text never counts as content.
const CHROME: &[&str] = &["nav", "header", "footer", "aside"];

/// Elements whose text is never visible.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Extract structured content from `html`, capping `content` at `max_bytes`.
///
/// Never fails: extraction problems are logged and yield empty fields.
pub fn extract(html: &str, max_bytes: usize) -> PageContent {
    match try_extract(html, max_bytes) {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "content extraction failed, using empty fields");
            PageContent::default()
        }
    }
}

/// Fallible extraction used by [`extract`].
pub fn try_extract(html: &str, max_bytes: usize) -> Result<PageContent> {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc)?;
    let description = extract_description(&doc)?;
    let headings = extract_headings(&doc)?;
    let content = truncate_at_boundary(&extract_body_text(&doc)?, max_bytes).to_string();

    Ok(PageContent {
        title,
        description,
        headings,
        content,
    })
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| CrawlqError::parse(format!("invalid selector {css:?}: {e:?}")))
}

fn extract_title(doc: &Html) -> Result<String> {
    let title_sel = selector("title")?;
    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();
    if !title.is_empty() {
        return Ok(title);
    }

    let h1_sel = selector("h1")?;
    Ok(doc
        .select(&h1_sel)
        .map(visible_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default())
}

fn extract_description(doc: &Html) -> Result<String> {
    let named_sel = selector("meta[name][content]")?;
    let named = doc
        .select(&named_sel)
        .filter(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("description"))
        })
        .filter_map(|el| el.value().attr("content"))
        .map(normalize_whitespace)
        .find(|content| !content.is_empty());
    if let Some(description) = named {
        return Ok(description);
    }

    let og_sel = selector(r#"meta[property="og:description"][content]"#)?;
    Ok(doc
        .select(&og_sel)
        .filter_map(|el| el.value().attr("content"))
        .map(normalize_whitespace)
        .find(|content| !content.is_empty())
        .unwrap_or_default())
}

fn extract_headings(doc: &Html) -> Result<Vec<Heading>> {
    let heading_sel = selector("h1, h2")?;
    Ok(doc
        .select(&heading_sel)
        .filter_map(|el| {
            let level = if el.value().name() == "h1" { 1 } else { 2 };
            let text = visible_text(el);
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect())
}

fn extract_body_text(doc: &Html) -> Result<String> {
    let block_sel = selector(&CONTENT_BLOCKS.join(", "))?;

    let blocks: Vec<String> = doc
        .select(&block_sel)
        .filter(|el| !inside_chrome_or_block(*el))
        .filter(|el| !is_anchor_only(*el))
        .map(visible_text)
        .filter(|text| !text.is_empty())
        .collect();

    Ok(blocks.join("\n"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `el` sits in site chrome or inside another content block.
fn inside_chrome_or_block(el: ElementRef<'_>) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
        let name = ancestor.value().name();
        CHROME.contains(&name) || CONTENT_BLOCKS.contains(&name)
    })
}

/// Whether every visible character of `el` belongs to a link.
fn is_anchor_only(el: ElementRef<'_>) -> bool {
    let mut has_link_text = false;
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        let ancestors: Vec<&str> = node
            .ancestors()
            .take_while(|a| a.id() != el.id())
            .filter_map(ElementRef::wrap)
            .map(|a| a.value().name())
            .collect();
        if ancestors.iter().any(|name| INVISIBLE.contains(name)) {
            continue;
        }
        if ancestors.contains(&"a") {
            has_link_text = true;
        } else {
            return false;
        }
    }
    has_link_text
}

/// Text of `el` with invisible elements skipped and whitespace collapsed.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != el.id())
            .filter_map(ElementRef::wrap)
            .any(|a| INVISIBLE.contains(&a.value().name()));
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }
    normalize_whitespace(&raw)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a character.
pub fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 10 * 1024;

    #[test]
    fn extracts_all_fields() {
        let html = r#"<html><head>
            <title> Pricing | Acme </title>
            <meta name="description" content="Plans for every team">
        </head><body>
            <h1>Pricing</h1>
            <p>Three plans are available.</p>
            <h2>Enterprise</h2>
            <ul><li>SSO</li><li>Audit log</li></ul>
        </body></html>"#;

        let page = extract(html, MAX);
        assert_eq!(page.title, "Pricing | Acme");
        assert_eq!(page.description, "Plans for every team");
        assert_eq!(
            page.headings,
            vec![
                Heading { level: 1, text: "Pricing".into() },
                Heading { level: 2, text: "Enterprise".into() },
            ]
        );
        assert_eq!(page.content, "Three plans are available.\nSSO\nAudit log");
    }

    #[test]
    fn title_falls_back_to_first_h1() {
        let html = "<html><body><h1>  </h1><h1>Liên hệ</h1><p>x</p></body></html>";
        assert_eq!(extract(html, MAX).title, "Liên hệ");
    }

    #[test]
    fn description_matches_name_case_insensitively() {
        let html = r#"<head><meta name="Description" content="Upper-case name"></head>"#;
        assert_eq!(extract(html, MAX).description, "Upper-case name");
    }

    #[test]
    fn description_falls_back_to_open_graph() {
        let html = r#"<head><meta property="og:description" content="From OG"></head>"#;
        assert_eq!(extract(html, MAX).description, "From OG");

        let html = "<head><title>None</title></head>";
        assert_eq!(extract(html, MAX).description, "");
    }

    #[test]
    fn chrome_is_excluded_from_content() {
        let html = r#"<body>
            <header><p>Site banner</p></header>
            <nav><ul><li>Home</li><li>About</li></ul></nav>
            <main><p>Real article text.</p></main>
            <aside><p>Related posts</p></aside>
            <footer><p>Copyright 2025</p></footer>
        </body>"#;
        assert_eq!(extract(html, MAX).content, "Real article text.");
    }

    #[test]
    fn anchor_only_blocks_are_skipped() {
        let html = r#"<body>
            <ul><li><a href="/a">Link A</a></li><li>Plain item</li></ul>
            <p>Read the <a href="/docs">docs</a> first.</p>
        </body>"#;
        assert_eq!(
            extract(html, MAX).content,
            "Plain item\nRead the docs first."
        );
    }

    #[test]
    fn nested_blocks_are_not_duplicated() {
        let html = "<body><blockquote><p>Quoted line</p></blockquote></body>";
        assert_eq!(extract(html, MAX).content, "Quoted line");
    }

    #[test]
    fn scripts_do_not_leak_into_text() {
        let html = "<body><p>Visible<script>var hidden = 1;</script> text</p></body>";
        assert_eq!(extract(html, MAX).content, "Visible text");
    }

    #[test]
    fn content_is_truncated_to_byte_budget() {
        let paragraph = "word ".repeat(5_000);
        let html = format!("<body><p>{paragraph}</p></body>");
        let page = extract(&html, MAX);
        assert_eq!(page.content.len(), MAX);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "aé";
        // 'é' is two bytes starting at index 1
        assert_eq!(truncate_at_boundary(text, 2), "a");
        assert_eq!(truncate_at_boundary(text, 3), "aé");
        assert_eq!(truncate_at_boundary("", 0), "");
    }

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(extract("", MAX), PageContent::default());
    }
}
