//! Job submission and result collection.
//!
//! Any process that can reach the queue database can submit work and wait
//! for the structured answer. Correlation is by job id only.

use std::sync::Arc;
use std::time::Duration;

use crawlq_queue::JobQueue;
use crawlq_shared::{CrawlJob, CrawlResult, JobId, QueueConfig, Result, SubmitterConfig};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Submits crawl jobs and polls for their results.
#[derive(Clone)]
pub struct JobSubmitter {
    queue: Arc<JobQueue>,
    job_queue: String,
    result_queue: String,
    poll_interval: Duration,
}

impl JobSubmitter {
    pub fn new(queue: Arc<JobQueue>, queue_config: &QueueConfig, config: &SubmitterConfig) -> Self {
        Self {
            queue,
            job_queue: queue_config.job_queue.clone(),
            result_queue: queue_config.result_queue.clone(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Validate `url` and enqueue it. Returns immediately with the job id.
    ///
    /// Invalid URLs fail here and never reach the queue.
    pub async fn submit(&self, url: &str) -> Result<JobId> {
        Ok(self.enqueue(url).await?.job_id)
    }

    /// Wait for the result of `job_id`, giving up after `timeout`.
    ///
    /// On timeout a synthetic `status=error, error="timeout"` result is
    /// returned. The call never outlasts `timeout` by more than one polling
    /// interval. Read errors are logged and polling continues.
    pub async fn await_result(&self, job_id: JobId, timeout: Duration) -> CrawlResult {
        self.poll_result(job_id, None, timeout).await
    }

    /// Submit `url` and wait for its result. A timeout result echoes the
    /// submitted URL.
    pub async fn submit_and_wait(&self, url: &str, timeout: Duration) -> Result<CrawlResult> {
        let job = self.enqueue(url).await?;
        Ok(self.poll_result(job.job_id, Some(&job.url), timeout).await)
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn enqueue(&self, url: &str) -> Result<CrawlJob> {
        let job = CrawlJob::new(url)?;
        self.queue.enqueue(&self.job_queue, &job).await?;
        info!(job_id = %job.job_id, "job submitted");
        Ok(job)
    }

    #[instrument(skip_all, fields(job_id = %job_id, timeout_ms = timeout.as_millis() as u64))]
    async fn poll_result(&self, job_id: JobId, url: Option<&str>, timeout: Duration) -> CrawlResult {
        let deadline = Instant::now() + timeout;

        loop {
            match self.queue.take_result(&self.result_queue, &job_id).await {
                Ok(Some(result)) => {
                    debug!(status = ?result.status, "result received");
                    return result;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "result poll failed, retrying"),
            }

            let now = Instant::now();
            if now >= deadline {
                info!("no result before timeout");
                return CrawlResult::timeout(job_id, url.map(str::to_owned));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
