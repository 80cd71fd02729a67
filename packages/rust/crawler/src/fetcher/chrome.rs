//! Headless Chromium fetcher over the DevTools protocol.
//!
//! Every attempt gets its own browser process and a fresh temporary profile,
//! wrapped in a [`BrowserSession`] guard:
//! 1. `close()` on the normal path shuts the browser down and waits for it.
//! 2. `Drop` covers errors, timeouts and panics: the browser is killed, the
//!    handler task aborted and the profile directory removed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use crawlq_shared::{BrowserConfig, CrawlqError, Result};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::{PageFetcher, RenderedPage};
use crate::navigate;
use crate::strategy::{FetchRequest, Navigation};

/// How long a single DevTools command may take.
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches pages with a fresh headless Chromium per attempt.
#[derive(Debug, Clone)]
pub struct ChromeFetcher {
    config: BrowserConfig,
}

impl ChromeFetcher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn launch_config(&self, profile_dir: &Path) -> Result<CdpBrowserConfig> {
        let mut builder = CdpBrowserConfig::builder()
            .user_data_dir(profile_dir)
            .request_timeout(CDP_REQUEST_TIMEOUT)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--no-first-run");

        if !self.config.headless {
            builder = builder.with_head();
        }
        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }

        builder
            .build()
            .map_err(|e| CrawlqError::Browser(format!("invalid browser config: {e}")))
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    #[instrument(skip_all, fields(url = %request.target, strategy = %request.strategy()))]
    async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage> {
        let session = BrowserSession::launch(self).await?;
        let rendered = session.render(request).await;
        session.close().await;
        rendered
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

// ---------------------------------------------------------------------------
// BrowserSession
// ---------------------------------------------------------------------------

/// One browser process plus its event loop and profile directory.
struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl BrowserSession {
    async fn launch(fetcher: &ChromeFetcher) -> Result<Self> {
        let profile_dir = std::env::temp_dir().join(format!("crawlq-profile-{}", Uuid::now_v7()));
        let config = fetcher.launch_config(&profile_dir)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            let _ = std::fs::remove_dir_all(&profile_dir);
            CrawlqError::Browser(format!("failed to launch browser: {e}"))
        })?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        debug!(profile = %profile_dir.display(), "browser launched");

        Ok(Self {
            browser: Some(browser),
            handler,
            profile_dir,
        })
    }

    fn browser(&self) -> Result<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| CrawlqError::Browser("browser session already closed".into()))
    }

    async fn render(&self, request: &FetchRequest) -> Result<RenderedPage> {
        let page = self
            .browser()?
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlqError::Browser(format!("failed to open tab: {e}")))?;

        match &request.navigation {
            Navigation::Direct => {
                goto(&page, &request.target).await?;
                tokio::time::sleep(request.plan.settle).await;
            }
            Navigation::FromHome { home } => {
                goto(&page, home).await?;
                tokio::time::sleep(request.plan.settle).await;

                let clicked = page
                    .evaluate(navigate::click_script(&request.target))
                    .await
                    .map_err(|e| CrawlqError::Browser(format!("click script failed: {e}")))?
                    .into_value::<bool>()
                    .map_err(|e| CrawlqError::Browser(format!("click script result: {e}")))?;
                if !clicked {
                    return Err(CrawlqError::Navigation(format!(
                        "no link to {} on {home}",
                        request.target
                    )));
                }
                tokio::time::sleep(request.plan.after_click).await;
            }
        }

        let html = page
            .content()
            .await
            .map_err(|e| CrawlqError::Browser(format!("failed to read page content: {e}")))?;

        let url = match page.url().await {
            Ok(Some(current)) => Url::parse(&current).unwrap_or_else(|_| request.target.clone()),
            _ => request.target.clone(),
        };

        Ok(RenderedPage { url, html })
    }

    /// Graceful shutdown; [`Drop`] finishes the cleanup.
    async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "browser close failed, killing process");
            } else if let Err(e) = browser.wait().await {
                warn!(error = %e, "waiting for browser exit failed");
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Dropping the Browser kills the child process if it is still running.
        drop(self.browser.take());
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(profile = %self.profile_dir.display(), error = %e, "profile cleanup failed");
            }
        }
    }
}

async fn goto(page: &Page, url: &Url) -> Result<()> {
    page.goto(url.as_str())
        .await
        .map_err(|e| CrawlqError::Network(format!("{url}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_config_builds_with_profile_dir() {
        let fetcher = ChromeFetcher::new(BrowserConfig {
            headless: true,
            executable: Some(PathBuf::from("/usr/bin/chromium")),
            no_sandbox: true,
        });
        let profile = std::env::temp_dir().join("crawlq-profile-test");
        assert!(fetcher.launch_config(&profile).is_ok());
    }

    /// A session over a populated profile dir and a handler task that runs
    /// until aborted. The receiver resolves once the task has been dropped.
    fn idle_session() -> (BrowserSession, PathBuf, tokio::sync::oneshot::Receiver<()>) {
        let profile_dir = std::env::temp_dir().join(format!("crawlq-profile-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(profile_dir.join("Default")).unwrap();
        std::fs::write(profile_dir.join("Default").join("Preferences"), "{}").unwrap();

        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let handler = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });

        let session = BrowserSession {
            browser: None,
            handler,
            profile_dir: profile_dir.clone(),
        };
        (session, profile_dir, alive_rx)
    }

    #[tokio::test]
    async fn dropped_session_releases_handler_and_profile() {
        let (session, profile_dir, alive_rx) = idle_session();
        assert!(profile_dir.exists());

        drop(session);

        assert!(!profile_dir.exists());
        let ended = tokio::time::timeout(Duration::from_secs(1), alive_rx).await;
        assert!(matches!(ended, Ok(Err(_))), "handler task still running");
    }

    #[tokio::test]
    async fn closed_session_releases_handler_and_profile() {
        let (session, profile_dir, alive_rx) = idle_session();

        session.close().await;

        assert!(!profile_dir.exists());
        let ended = tokio::time::timeout(Duration::from_secs(1), alive_rx).await;
        assert!(matches!(ended, Ok(Err(_))), "handler task still running");
    }

    #[tokio::test]
    async fn session_dropped_mid_render_is_released() {
        let (session, profile_dir, alive_rx) = idle_session();
        let render = async move {
            let _session = session;
            std::future::pending::<()>().await;
        };

        let timed_out = tokio::time::timeout(Duration::from_millis(20), render).await;

        assert!(timed_out.is_err());
        assert!(!profile_dir.exists());
        let ended = tokio::time::timeout(Duration::from_secs(1), alive_rx).await;
        assert!(matches!(ended, Ok(Err(_))), "handler task still running");
    }
}
