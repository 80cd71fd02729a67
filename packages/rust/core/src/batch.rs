//! In-process batch crawling.
//!
//! Runs the strategy ladder over a list of URLs without the queue and
//! optionally saves every passing page as Markdown with YAML frontmatter,
//! named `<slug>-<url hash>.md`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crawlq_crawler::CrawlPipeline;
use crawlq_shared::{CrawlJob, CrawlResult, CrawlqError, JobId, Result, Strategy};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

/// Longest slug kept in a file name, in characters.
const MAX_SLUG_CHARS: usize = 80;

/// Hex digits of the URL hash appended to each file name.
const URL_HASH_LEN: usize = 8;

/// A page written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPage {
    pub path: PathBuf,
    pub job_id: JobId,
}

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One result per input URL, in input order.
    pub results: Vec<CrawlResult>,
    /// Files written, one per successful result when an output dir was set.
    pub saved: Vec<SavedPage>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Pages won per strategy, in ladder order. Unused strategies are omitted.
    pub fn strategy_usage(&self) -> Vec<(Strategy, usize)> {
        Strategy::LADDER
            .iter()
            .map(|&strategy| {
                let count = self
                    .results
                    .iter()
                    .filter(|r| r.strategy == Some(strategy))
                    .count();
                (strategy, count)
            })
            .filter(|&(_, count)| count > 0)
            .collect()
    }
}

/// Crawls URLs one after another through a [`CrawlPipeline`].
pub struct BatchCrawler {
    pipeline: CrawlPipeline,
    out_dir: Option<PathBuf>,
}

impl BatchCrawler {
    pub fn new(pipeline: CrawlPipeline) -> Self {
        Self {
            pipeline,
            out_dir: None,
        }
    }

    /// Save successful pages under `dir`, creating it if needed.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }

    pub fn fetcher_name(&self) -> &str {
        self.pipeline.fetcher_name()
    }

    /// Crawl every URL. Invalid URLs become failed results; only I/O errors
    /// on the output directory abort the run.
    #[instrument(skip_all, fields(urls = urls.len(), fetcher = self.pipeline.fetcher_name()))]
    pub async fn run(&self, urls: &[String]) -> Result<BatchReport> {
        let started = Instant::now();
        let mut report = BatchReport::default();

        if let Some(dir) = &self.out_dir {
            std::fs::create_dir_all(dir).map_err(|e| CrawlqError::io(dir, e))?;
        }

        for url in urls {
            let result = match CrawlJob::new(url) {
                Ok(job) => self.pipeline.process(&job).await,
                Err(e) => {
                    warn!(url = %url, error = %e, "skipping invalid URL");
                    CrawlResult::failure(JobId::new(), Some(url.clone()), e.to_string())
                }
            };

            match &self.out_dir {
                Some(dir) if result.is_success() => {
                    let path = save_markdown(dir, &result)?;
                    info!(url = %url, path = %path.display(), "page saved");
                    report.saved.push(SavedPage {
                        path,
                        job_id: result.job_id,
                    });
                }
                _ => {}
            }

            report.results.push(result);
        }

        report.elapsed = started.elapsed();
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Markdown output
// ---------------------------------------------------------------------------

/// Write `result` to `dir` and return the file path.
pub fn save_markdown(dir: &Path, result: &CrawlResult) -> Result<PathBuf> {
    let title = result.title.as_deref().unwrap_or_default();
    let url = result.url.as_deref().unwrap_or_default();
    let path = dir.join(page_file_name(title, url));

    std::fs::write(&path, render_markdown(result)).map_err(|e| CrawlqError::io(&path, e))?;
    Ok(path)
}

/// `<slug>-<url hash>.md`
pub fn page_file_name(title: &str, url: &str) -> String {
    format!("{}-{}.md", slugify(title), url_hash(url))
}

/// Frontmatter, title heading, italic description, then the body text.
pub fn render_markdown(result: &CrawlResult) -> String {
    let title = result.title.as_deref().unwrap_or_default();
    let description = result.description.as_deref().unwrap_or_default();

    let mut md = String::from("---\n");
    md.push_str(&format!("title: \"{}\"\n", escape_yaml_string(title)));
    if let Some(url) = &result.url {
        md.push_str(&format!("url: \"{}\"\n", escape_yaml_string(url)));
    }
    if let Some(strategy) = result.strategy {
        md.push_str(&format!("strategy: {strategy}\n"));
    }
    if !description.is_empty() {
        md.push_str(&format!("description: \"{}\"\n", escape_yaml_string(description)));
    }
    md.push_str("---\n\n");

    md.push_str(&format!("# {title}\n\n"));
    if !description.is_empty() {
        md.push_str(&format!("_{description}_\n\n"));
    }
    md.push_str(result.content.as_deref().unwrap_or_default());
    md.push('\n');
    md
}

/// Lowercase, non-alphanumerics collapsed to single dashes, at most
/// [`MAX_SLUG_CHARS`] characters. Falls back to `page`.
pub fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}

/// Short SHA-256 prefix of `url`, stable across runs.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..URL_HASH_LEN].to_string()
}

fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crawlq_crawler::HttpFetcher;
    use crawlq_shared::{CrawlSettings, PageContent};
    use uuid::Uuid;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn article(title: &str, links: &str) -> String {
        let paragraphs =
            "<p>Our studio builds fast, accessible storefronts for local shops.</p>".repeat(5);
        format!(
            r#"<html><head><title>{title}</title><meta name="description" content="About the &quot;{title}&quot; page"></head>
            <body><nav>{links}</nav><main><h1>{title}</h1>{paragraphs}</main></body></html>"#
        )
    }

    fn temp_out_dir() -> PathBuf {
        std::env::temp_dir().join(format!("crawlq_batch_test_{}", Uuid::now_v7()))
    }

    fn http_batch() -> BatchCrawler {
        let fetcher = Arc::new(HttpFetcher::new().unwrap());
        BatchCrawler::new(CrawlPipeline::new(fetcher, &CrawlSettings::default()))
    }

    #[tokio::test]
    async fn batch_saves_passing_pages_and_counts_strategies() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(article("Home", r#"<a href="/about">About</a>"#)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article("About", "")))
            .mount(&server)
            .await;
        Mock::given(path("/pricing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Soon.</p>"))
            .mount(&server)
            .await;

        let out_dir = temp_out_dir();
        let urls = vec![
            format!("{}/about", server.uri()),
            format!("{}/pricing", server.uri()),
            "ftp://files.example.com/brochure.pdf".to_string(),
        ];

        let report = http_batch()
            .with_output_dir(&out_dir)
            .run(&urls)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.strategy_usage(), vec![(Strategy::Direct, 1)]);
        assert_eq!(report.results[2].url.as_deref(), Some(urls[2].as_str()));

        assert_eq!(report.saved.len(), 1);
        let saved = &report.saved[0];
        assert_eq!(saved.job_id, report.results[0].job_id);
        let about_url = report.results[0].url.clone().unwrap();
        assert_eq!(saved.path, out_dir.join(format!("about-{}.md", url_hash(&about_url))));

        let md = std::fs::read_to_string(&saved.path).unwrap();
        assert!(md.starts_with("---\ntitle: \"About\"\n"));
        assert!(md.contains(&format!("url: \"{about_url}\"\n")));
        assert!(md.contains("strategy: direct\n"));
        assert!(md.contains("description: \"About the \\\"About\\\" page\"\n"));
        assert!(md.contains("\n# About\n"));
        assert!(md.contains("accessible storefronts"));

        let files = std::fs::read_dir(&out_dir).unwrap().count();
        assert_eq!(files, 1);
        let _ = std::fs::remove_dir_all(&out_dir);
    }

    #[tokio::test]
    async fn batch_without_output_dir_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article("About", "")))
            .mount(&server)
            .await;

        let report = http_batch()
            .run(&[format!("{}/about", server.uri())])
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert!(report.saved.is_empty());
    }

    #[test]
    fn strategy_usage_follows_ladder_order() {
        let job = CrawlJob::new("https://example.com/a").unwrap();
        let page = PageContent::default();
        let report = BatchReport {
            results: vec![
                CrawlResult::success(&job, Strategy::NavigateFromHome, page.clone()),
                CrawlResult::success(&job, Strategy::Direct, page.clone()),
                CrawlResult::success(&job, Strategy::NavigateFromHome, page),
                CrawlResult::failure(job.job_id, None, "all crawl strategies failed"),
            ],
            ..Default::default()
        };

        assert_eq!(
            report.strategy_usage(),
            vec![(Strategy::Direct, 1), (Strategy::NavigateFromHome, 2)]
        );
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn slugify_keeps_letters_and_collapses_separators() {
        assert_eq!(slugify("Liên hệ với chúng tôi"), "liên-hệ-với-chúng-tôi");
        assert_eq!(slugify("  Pricing & Plans -- 2024 "), "pricing-plans-2024");
        assert_eq!(slugify(""), "page");
        assert_eq!(slugify("!!!"), "page");
    }

    #[test]
    fn slugify_caps_length() {
        let slug = slugify(&"word ".repeat(40));
        assert!(slug.chars().count() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn url_hash_is_short_and_stable() {
        let a = url_hash("https://example.com/about");
        assert_eq!(a.len(), URL_HASH_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, url_hash("https://example.com/about"));
        assert_ne!(a, url_hash("https://example.com/about/team"));
    }

    #[test]
    fn same_title_on_different_urls_gets_distinct_files() {
        assert_ne!(
            page_file_name("Contact", "https://a.example.com/contact"),
            page_file_name("Contact", "https://b.example.com/contact"),
        );
    }
}
