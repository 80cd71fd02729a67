//! Plain HTTP fetcher: no JavaScript, no settle waits.

use std::time::Duration;

use async_trait::async_trait;
use crawlq_shared::{CrawlqError, Result};
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{PageFetcher, RenderedPage};
use crate::navigate;
use crate::strategy::{FetchRequest, Navigation};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("crawlq/", env!("CARGO_PKG_VERSION"));

/// Bytes of response body kept per request; the rest is discarded unread.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Fetches raw server HTML with `reqwest`.
///
/// Client errors (4xx) still return their body so the quality gate can judge
/// the page; only 5xx and transport failures count as fetch errors. Bodies
/// are streamed and cut off at [`DEFAULT_MAX_BODY_BYTES`] unless configured.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CrawlqError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Cap the bytes read from each response body.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn get(&self, url: &Url, timeout: Duration) -> Result<RenderedPage> {
        debug!(%url, "fetching page");

        let mut response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CrawlqError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CrawlqError::Network(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().clone();
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CrawlqError::Network(format!("{url}: body read failed: {e}")))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                let room = self.max_body_bytes - body.len();
                body.extend_from_slice(&chunk[..room]);
                warn!(%url, limit = self.max_body_bytes, "response body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RenderedPage {
            url: final_url,
            html: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %request.target, strategy = %request.strategy()))]
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage> {
        let timeout = request.plan.timeout;
        match &request.navigation {
            Navigation::Direct => self.get(&request.target, timeout).await,
            Navigation::FromHome { home } => {
                let home_page = self.get(home, timeout).await?;
                let link = navigate::find_matching_link(&home_page.html, &home_page.url, &request.target)
                    .ok_or_else(|| {
                        CrawlqError::Navigation(format!("no link to {} on {home}", request.target))
                    })?;
                debug!(%link, "following link from home page");
                self.get(&link, timeout).await
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
