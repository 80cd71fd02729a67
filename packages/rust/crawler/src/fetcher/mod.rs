//! Page fetchers: the one primitive every strategy is built on.
//!
//! A fetcher takes a [`FetchRequest`] (target, navigation, timings) and
//! returns the rendered HTML. The pipeline only sees the trait, so it runs
//! the same against headless Chromium, plain HTTP, or a scripted test double.

mod chrome;
mod http;

use std::sync::Arc;

use async_trait::async_trait;
use crawlq_shared::{BrowserConfig, FetchEngine, Result};
use url::Url;

use crate::strategy::FetchRequest;

pub use chrome::ChromeFetcher;
pub use http::HttpFetcher;

/// HTML of a page after the fetcher finished loading (and clicking).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Where the fetcher ended up; may differ from the target after redirects.
    pub url: Url,
    pub html: String,
}

/// Loads pages for the strategy pipeline.
///
/// Implementations must release every resource they acquire before
/// returning, and also when the returned future is dropped mid-flight
/// (the pipeline enforces per-attempt timeouts by dropping it).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Perform one attempt.
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage>;

    /// Short backend name for tracing.
    fn name(&self) -> &str;
}

/// Build the fetcher for `engine`.
pub fn fetcher_for(engine: FetchEngine, browser: &BrowserConfig) -> Result<Arc<dyn PageFetcher>> {
    Ok(match engine {
        FetchEngine::Chrome => Arc::new(ChromeFetcher::new(browser.clone())),
        FetchEngine::Http => Arc::new(HttpFetcher::new()?),
    })
}
