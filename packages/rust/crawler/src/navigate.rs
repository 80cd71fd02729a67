//! Home-page navigation helpers shared by the browser and HTTP fetchers.
//!
//! A link "points at" the target when, resolved against the page it sits on,
//! it has the same host and the same path (trailing slash ignored).

use scraper::{Html, Selector};
use url::Url;

/// The site root of `target` (scheme, host and port only).
pub fn home_url(target: &Url) -> Url {
    let mut home = target.clone();
    home.set_path("/");
    home.set_query(None);
    home.set_fragment(None);
    home
}

/// Whether `target` is its own home page.
pub fn is_site_root(target: &Url) -> bool {
    target.path().trim_matches('/').is_empty() && target.query().is_none()
}

/// `host[:port]`, with the port omitted when it is the scheme default.
fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn normalized_path(url: &Url) -> &str {
    let trimmed = url.path().trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Whether `candidate` points at the same page as `target`.
pub fn same_page(candidate: &Url, target: &Url) -> bool {
    host_with_port(candidate).eq_ignore_ascii_case(&host_with_port(target))
        && normalized_path(candidate) == normalized_path(target)
}

/// Find the first anchor in `html` (served from `base`) that points at `target`.
pub fn find_matching_link(html: &str, base: &Url, target: &Url) -> Option<Url> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").ok()?;

    doc.select(&link_sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.starts_with("javascript:") && !href.starts_with("mailto:"))
        .filter_map(|href| base.join(href).ok())
        .find(|resolved| same_page(resolved, target))
        .map(|mut resolved| {
            resolved.set_fragment(None);
            resolved
        })
}

/// JavaScript that clicks the first link pointing at `target`.
///
/// Evaluates to `true` when a link was clicked, `false` otherwise.
pub fn click_script(target: &Url) -> String {
    // serde_json produces valid JS string literals, quotes and all
    let host = serde_json::Value::String(host_with_port(target)).to_string();
    let path = serde_json::Value::String(normalized_path(target).to_string()).to_string();

    format!(
        r#"(() => {{
  const targetHost = {host}.toLowerCase();
  const targetPath = {path};
  const norm = (p) => p.replace(/\/+$/, "") || "/";
  for (const a of document.querySelectorAll("a[href]")) {{
    let resolved;
    try {{
      resolved = new URL(a.getAttribute("href"), document.baseURI);
    }} catch (_) {{
      continue;
    }}
    if (resolved.host.toLowerCase() === targetHost && norm(resolved.pathname) === targetPath) {{
      a.click();
      return true;
    }}
  }}
  return false;
}})()"#
    )
}
