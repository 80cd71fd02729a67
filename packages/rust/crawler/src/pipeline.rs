//! The strategy ladder: direct → SPA with delay → navigate from home → failed.
//!
//! Strategies run strictly one after another. Each attempt is
//! fetch → extract → quality gate; the first page that passes wins. A fetch
//! error or a gate rejection is recorded and the next strategy is tried,
//! without retrying the same one.

use std::sync::Arc;

use crawlq_shared::{
    AttemptRecord, CrawlJob, CrawlResult, CrawlSettings, CrawlqError, EXHAUSTED_ERROR,
    PageContent, Result, Strategy, validate_target_url,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::extract::extract;
use crate::fetcher::PageFetcher;
use crate::quality::QualityGate;
use crate::strategy::FetchRequest;

/// What the ladder produced for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// The strategy that passed the gate, if any.
    pub strategy: Option<Strategy>,
    /// The winning page, or the last page that was extracted at all.
    pub page: Option<PageContent>,
    pub attempts: Vec<AttemptRecord>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.strategy.is_some()
    }

    /// Turn the outcome into the result published for `job`.
    ///
    /// An exhausted ladder still carries the last extracted page so callers
    /// can inspect what was there.
    pub fn into_result(self, job: &CrawlJob) -> CrawlResult {
        match (self.strategy, self.page) {
            (Some(strategy), Some(page)) => {
                CrawlResult::success(job, strategy, page).with_attempts(self.attempts)
            }
            (_, page) => {
                let result = CrawlResult::failure(job.job_id, Some(job.url.clone()), EXHAUSTED_ERROR)
                    .with_attempts(self.attempts);
                match page {
                    Some(page) => result.with_page(page),
                    None => result,
                }
            }
        }
    }
}

enum LadderState {
    Attempt(Strategy),
    Succeeded(Strategy, PageContent),
    Exhausted,
}

fn advance(strategy: Strategy) -> LadderState {
    strategy.next().map_or(LadderState::Exhausted, LadderState::Attempt)
}

/// Runs the strategy ladder with a given fetcher.
#[derive(Clone)]
pub struct CrawlPipeline {
    fetcher: Arc<dyn PageFetcher>,
    gate: QualityGate,
    max_content_bytes: usize,
}

impl CrawlPipeline {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &CrawlSettings) -> Self {
        Self {
            fetcher,
            gate: QualityGate::from(settings),
            max_content_bytes: settings.max_content_bytes,
        }
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    /// Crawl one job and build its result. Never fails: every problem ends
    /// up in the result.
    #[instrument(skip_all, fields(job_id = %job.job_id, url = %job.url))]
    pub async fn process(&self, job: &CrawlJob) -> CrawlResult {
        let target = match validate_target_url(&job.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "rejecting job with invalid URL");
                return CrawlResult::failure(job.job_id, Some(job.url.clone()), e.to_string());
            }
        };

        let result = self.run(&target).await.into_result(job);
        info!(
            status = ?result.status,
            strategy = result.strategy.map(Strategy::as_str).unwrap_or("none"),
            attempts = result.attempts.len(),
            "job finished"
        );
        result
    }

    /// Walk the ladder for `target`.
    #[instrument(skip_all, fields(url = %target, fetcher = self.fetcher.name()))]
    pub async fn run(&self, target: &Url) -> PipelineOutcome {
        let mut attempts = Vec::new();
        let mut last_page = None;
        let mut state = LadderState::Attempt(Strategy::Direct);

        loop {
            state = match state {
                LadderState::Attempt(strategy) => match self.attempt(strategy, target).await {
                    Ok(page) => {
                        let verdict = self.gate.evaluate(&page);
                        debug!(%strategy, verdict = %verdict.describe(), "quality gate");
                        attempts.push(AttemptRecord {
                            strategy,
                            outcome: verdict.describe(),
                        });
                        if verdict.is_pass() {
                            LadderState::Succeeded(strategy, page)
                        } else {
                            info!(%strategy, reason = %verdict.describe(), "attempt rejected, falling back");
                            last_page = Some(page);
                            advance(strategy)
                        }
                    }
                    Err(e) => {
                        warn!(%strategy, error = %e, "attempt failed, falling back");
                        attempts.push(AttemptRecord {
                            strategy,
                            outcome: e.to_string(),
                        });
                        advance(strategy)
                    }
                },
                LadderState::Succeeded(strategy, page) => {
                    return PipelineOutcome {
                        strategy: Some(strategy),
                        page: Some(page),
                        attempts,
                    };
                }
                LadderState::Exhausted => {
                    warn!(attempts = attempts.len(), "{EXHAUSTED_ERROR}");
                    return PipelineOutcome {
                        strategy: None,
                        page: last_page,
                        attempts,
                    };
                }
            };
        }
    }

    /// One fetch + extract under the strategy's hard timeout.
    async fn attempt(&self, strategy: Strategy, target: &Url) -> Result<PageContent> {
        let request = FetchRequest::for_strategy(strategy, target)?;
        let limit = request.plan.timeout;

        let rendered = tokio::time::timeout(limit, self.fetcher.fetch(&request))
            .await
            .map_err(|_| {
                CrawlqError::Network(format!("{strategy} attempt timed out after {}s", limit.as_secs()))
            })??;

        Ok(extract(&rendered.html, self.max_content_bytes))
    }
}
