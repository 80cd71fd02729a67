//! The crawl worker loop: pop a job, run the strategy ladder, publish.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crawlq_crawler::CrawlPipeline;
use crawlq_queue::JobQueue;
use crawlq_shared::{CrawlResult, QueueConfig, Result, WorkerConfig};
use futures::FutureExt;
use tracing::{error, info, instrument, warn};

/// Pause after a queue error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Counters for one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Jobs popped and processed.
    pub processed: u64,
    /// Jobs whose result had `status=success`.
    pub succeeded: u64,
    /// Jobs whose result could not be published.
    pub publish_failures: u64,
    /// Wall time spent in the loop.
    pub elapsed: Duration,
}

impl WorkerReport {
    pub fn failed(&self) -> u64 {
        self.processed - self.succeeded
    }
}

/// Consumes crawl jobs one at a time.
///
/// Many workers may share one queue; the atomic pop guarantees each job is
/// handed to exactly one of them.
pub struct CrawlWorker {
    queue: Arc<JobQueue>,
    pipeline: CrawlPipeline,
    job_queue: String,
    result_queue: String,
    block_timeout: Duration,
    result_ttl: Duration,
}

impl CrawlWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        pipeline: CrawlPipeline,
        queue_config: &QueueConfig,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            queue,
            pipeline,
            job_queue: queue_config.job_queue.clone(),
            result_queue: queue_config.result_queue.clone(),
            block_timeout: Duration::from_secs(config.block_timeout_secs),
            result_ttl: queue_config.result_ttl(),
        }
    }

    /// Wait up to the block timeout for one job, process and publish it.
    ///
    /// Returns `None` when no job arrived in time.
    pub async fn run_once(&self) -> Result<Option<CrawlResult>> {
        let Some(job) = self
            .queue
            .blocking_pop(&self.job_queue, self.block_timeout)
            .await?
        else {
            return Ok(None);
        };

        let result = self.pipeline.process(&job).await;
        self.queue.publish(&self.result_queue, &result).await?;
        Ok(Some(result))
    }

    /// Process jobs until `shutdown` resolves or `max_jobs` have been handled.
    ///
    /// Shutdown is checked between pops. A pop in progress is never
    /// cancelled, so a job taken off the queue always runs to completion and
    /// is published; stopping may therefore take up to one block timeout.
    #[instrument(skip_all, fields(queue = %self.job_queue, fetcher = self.pipeline.fetcher_name()))]
    pub async fn run<F>(&self, max_jobs: Option<u64>, shutdown: F) -> WorkerReport
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut report = WorkerReport::default();
        tokio::pin!(shutdown);

        info!(max_jobs, "worker started");

        loop {
            if max_jobs.is_some_and(|max| report.processed >= max) {
                info!("job limit reached");
                break;
            }

            if (&mut shutdown).now_or_never().is_some() {
                info!("shutdown requested");
                break;
            }

            let popped = self
                .queue
                .blocking_pop(&self.job_queue, self.block_timeout)
                .await;

            let job = match popped {
                Ok(Some(job)) => job,
                Ok(None) => {
                    self.purge_expired().await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "failed to pop job");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            let result = self.pipeline.process(&job).await;
            report.processed += 1;
            if result.is_success() {
                report.succeeded += 1;
            }

            if let Err(e) = self.queue.publish(&self.result_queue, &result).await {
                error!(job_id = %job.job_id, error = %e, "failed to publish result");
                report.publish_failures += 1;
            }

            self.purge_expired().await;
        }

        report.elapsed = started.elapsed();
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "worker stopped"
        );
        report
    }

    async fn purge_expired(&self) {
        if let Err(e) = self.queue.purge_results(self.result_ttl).await {
            warn!(error = %e, "failed to purge expired results");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlq_shared::{CrawlSettings, CrawlStatus, Strategy, SubmitterConfig};

    use crate::submitter::JobSubmitter;
    use crate::test_support::{EchoFetcher, open_handle, test_db_path, test_queue};

    fn worker(queue: Arc<JobQueue>) -> CrawlWorker {
        let pipeline = CrawlPipeline::new(Arc::new(EchoFetcher), &CrawlSettings::default());
        CrawlWorker::new(
            queue,
            pipeline,
            &QueueConfig::default(),
            &WorkerConfig {
                block_timeout_secs: 1,
                ..Default::default()
            },
        )
    }

    fn submitter(queue: Arc<JobQueue>) -> JobSubmitter {
        JobSubmitter::new(
            queue,
            &QueueConfig::default(),
            &SubmitterConfig {
                timeout_secs: 10,
                poll_interval_ms: 50,
            },
        )
    }

    #[tokio::test]
    async fn run_once_with_empty_queue_returns_none() {
        let queue = test_queue().await;
        assert!(worker(queue).run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submitted_job_round_trips() {
        let queue = test_queue().await;
        let submitter = submitter(queue.clone());
        let worker = worker(queue.clone());

        let job_id = submitter.submit("https://acme.test/pricing").await.unwrap();
        let published = worker.run_once().await.unwrap().expect("job processed");
        let received = submitter.await_result(job_id, Duration::from_secs(2)).await;

        assert_eq!(received, published);
        assert_eq!(received.job_id, job_id);
        assert_eq!(received.status, CrawlStatus::Success);
        assert_eq!(received.strategy, Some(Strategy::Direct));
        assert_eq!(received.title.as_deref(), Some("/pricing"));
    }

    #[tokio::test]
    async fn degraded_job_still_resolves() {
        let queue = test_queue().await;
        let submitter = submitter(queue.clone());
        let worker = worker(queue);

        // EchoFetcher serves a short page for /short, so every strategy fails the gate.
        let result = {
            let job_id = submitter.submit("https://acme.test/short").await.unwrap();
            worker.run_once().await.unwrap();
            submitter.await_result(job_id, Duration::from_secs(2)).await
        };

        assert_eq!(result.status, CrawlStatus::Error);
        assert_eq!(result.error.as_deref(), Some(crawlq_shared::EXHAUSTED_ERROR));
        assert_eq!(result.attempts.len(), 3);
        assert!(result.content.is_some());
    }

    #[tokio::test]
    async fn max_jobs_stops_the_loop() {
        let queue = test_queue().await;
        let submitter = submitter(queue.clone());
        for page in ["a", "b", "c"] {
            submitter.submit(&format!("https://acme.test/{page}")).await.unwrap();
        }

        let report = worker(queue.clone())
            .run(Some(2), std::future::pending())
            .await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(queue.pending_jobs("crawl_jobs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_worker() {
        let queue = test_queue().await;
        let report = worker(queue).run(None, async {}).await;
        assert_eq!(report, WorkerReport { elapsed: report.elapsed, ..Default::default() });
    }

    #[tokio::test]
    async fn shutdown_during_pop_still_finishes_the_job() {
        let queue = test_queue().await;
        let submitter = submitter(queue.clone());

        let late_submit = {
            let submitter = submitter.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                submitter.submit("https://acme.test/late").await.unwrap()
            })
        };

        // Shutdown fires while the worker is blocked waiting for the job.
        let report = worker(queue.clone())
            .run(None, tokio::time::sleep(Duration::from_millis(100)))
            .await;
        let job_id = late_submit.await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(queue.pending_jobs("crawl_jobs").await.unwrap(), 0);
        let result = submitter.await_result(job_id, Duration::from_secs(1)).await;
        assert_eq!(result.title.as_deref(), Some("/late"));
    }

    #[tokio::test]
    async fn concurrent_workers_do_not_cross_results() {
        let path = test_db_path();
        let submit_handle = open_handle(&path).await;
        let submitter = submitter(submit_handle);

        let pages: Vec<String> = (0..6).map(|i| format!("/page-{i}")).collect();
        let mut ids = Vec::new();
        for page in &pages {
            ids.push(submitter.submit(&format!("https://acme.test{page}")).await.unwrap());
        }

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let mut workers = Vec::new();
        for _ in 0..2 {
            let handle = open_handle(&path).await;
            let mut stop = stop_rx.clone();
            workers.push(tokio::spawn(async move {
                worker(handle)
                    .run(None, async move {
                        let _ = stop.wait_for(|stopped| *stopped).await;
                    })
                    .await
            }));
        }

        for (job_id, page) in ids.iter().zip(&pages) {
            let result = submitter.await_result(*job_id, Duration::from_secs(10)).await;
            assert_eq!(result.job_id, *job_id);
            assert_eq!(result.title.as_deref(), Some(page.as_str()));
        }

        stop_tx.send(true).unwrap();
        let mut processed = 0;
        for handle in workers {
            processed += handle.await.unwrap().processed;
        }
        assert_eq!(processed, 6);
    }
}
