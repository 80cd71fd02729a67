//! Durable job queue and result channel on libSQL.
//!
//! The [`JobQueue`] struct wraps a libSQL database shared by submitters and
//! workers. It is the only state those processes share.
//!
//! **Atomicity rules:**
//! - Popping a job is a single `DELETE … RETURNING` statement, so concurrent
//!   workers never receive the same job.
//! - Results are keyed by job id; a second publish for the same id fails.
//! - Taking a result marks it consumed in the same statement that reads it,
//!   so a result is handed out at most once.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use crawlq_shared::{CrawlJob, CrawlResult, CrawlqError, JobId, QueueConfig, Result};
use libsql::{Connection, Database, params};
use tokio::time::Instant;
use tracing::{debug, instrument};

/// How often [`JobQueue::blocking_pop`] re-checks an empty queue.
const POP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long SQLite waits on a locked database before failing a statement.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Handle to the shared queue database.
pub struct JobQueue {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl JobQueue {
    /// Open the queue described by `config` (local path or remote URL).
    pub async fn open(config: &QueueConfig) -> Result<Self> {
        if config.is_remote() {
            Self::open_remote(&config.url, config.auth_token()).await
        } else {
            Self::open_local(Path::new(&config.url)).await
        }
    }

    /// Open or create a local database file at `path`.
    pub async fn open_local(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CrawlqError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(queue_err)?;
        let conn = db.connect().map_err(queue_err)?;

        conn.execute_batch(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"))
            .await
            .map_err(queue_err)?;

        let queue = Self { db, conn };
        queue.run_migrations().await?;
        Ok(queue)
    }

    /// Connect to a remote libSQL server.
    pub async fn open_remote(url: &str, auth_token: String) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token)
            .build()
            .await
            .map_err(queue_err)?;
        let conn = db.connect().map_err(queue_err)?;

        let queue = Self { db, conn };
        queue.run_migrations().await?;
        Ok(queue)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    CrawlqError::Queue(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Round-trip a trivial statement to prove the database is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT 1", params![])
            .await
            .map_err(queue_err)?;
        match rows.next().await.map_err(queue_err)? {
            Some(_) => Ok(()),
            None => Err(CrawlqError::Queue("ping returned no rows".into())),
        }
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Append a job to the tail of `queue`.
    #[instrument(skip_all, fields(queue = %queue, job_id = %job.job_id))]
    pub async fn enqueue(&self, queue: &str, job: &CrawlJob) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO crawl_jobs (queue, job_id, url, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    queue,
                    job.job_id.to_string(),
                    job.url.as_str(),
                    now_stamp()
                ],
            )
            .await
            .map_err(queue_err)?;
        debug!(url = %job.url, "job enqueued");
        Ok(())
    }

    /// Remove and return the oldest job of `queue`, if any.
    pub async fn pop(&self, queue: &str) -> Result<Option<CrawlJob>> {
        let mut rows = self
            .conn
            .query(
                "DELETE FROM crawl_jobs
                 WHERE seq = (SELECT seq FROM crawl_jobs WHERE queue = ?1 ORDER BY seq LIMIT 1)
                 RETURNING job_id, url",
                params![queue],
            )
            .await
            .map_err(queue_err)?;

        match rows.next().await.map_err(queue_err)? {
            Some(row) => {
                let job_id: String = row.get(0).map_err(queue_err)?;
                let url: String = row.get(1).map_err(queue_err)?;
                Ok(Some(CrawlJob {
                    job_id: parse_job_id(&job_id)?,
                    url,
                }))
            }
            None => Ok(None),
        }
    }

    /// Pop the oldest job, waiting up to `timeout` for one to arrive.
    pub async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<CrawlJob>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job) = self.pop(queue).await? {
                return Ok(Some(job));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POP_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Number of jobs waiting in `queue`.
    pub async fn pending_jobs(&self, queue: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM crawl_jobs WHERE queue = ?1",
                params![queue],
            )
            .await
            .map_err(queue_err)?;
        match rows.next().await.map_err(queue_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(queue_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Result operations
    // -----------------------------------------------------------------------

    /// Publish `result` on `queue`, keyed by its job id.
    ///
    /// Fails if a result for the same job was ever published and not yet purged.
    #[instrument(skip_all, fields(queue = %queue, job_id = %result.job_id))]
    pub async fn publish(&self, queue: &str, result: &CrawlResult) -> Result<()> {
        let payload = serde_json::to_string(result)
            .map_err(|e| CrawlqError::validation(format!("cannot encode result: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO crawl_results (job_id, queue, payload_json, published_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![result.job_id.to_string(), queue, payload, now_stamp()],
            )
            .await
            .map_err(|e| {
                CrawlqError::Queue(format!(
                    "cannot publish result for job {}: {e}",
                    result.job_id
                ))
            })?;
        debug!(status = ?result.status, "result published");
        Ok(())
    }

    /// Read and consume the result for `job_id`, if it has been published.
    pub async fn take_result(&self, queue: &str, job_id: &JobId) -> Result<Option<CrawlResult>> {
        let mut rows = self
            .conn
            .query(
                "UPDATE crawl_results SET consumed_at = ?1
                 WHERE job_id = ?2 AND queue = ?3 AND consumed_at IS NULL
                 RETURNING payload_json",
                params![now_stamp(), job_id.to_string(), queue],
            )
            .await
            .map_err(queue_err)?;

        match rows.next().await.map_err(queue_err)? {
            Some(row) => {
                let payload: String = row.get(0).map_err(queue_err)?;
                let result = serde_json::from_str(&payload).map_err(|e| {
                    CrawlqError::validation(format!("malformed result for job {job_id}: {e}"))
                })?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Delete results published more than `older_than` ago. Returns the number removed.
    pub async fn purge_results(&self, older_than: Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| CrawlqError::validation(format!("retention window too large: {e}")))?;
        let cutoff = (Utc::now() - age).to_rfc3339_opts(SecondsFormat::Micros, true);

        let removed = self
            .conn
            .execute(
                "DELETE FROM crawl_results WHERE published_at < ?1",
                params![cutoff],
            )
            .await
            .map_err(queue_err)?;
        if removed > 0 {
            debug!(removed, "purged expired results");
        }
        Ok(removed)
    }
}

/// Fixed-width UTC timestamp; lexicographic order equals time order.
fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .map_err(|e| CrawlqError::validation(format!("invalid job id '{raw}' in queue: {e}")))
}

fn queue_err(e: libsql::Error) -> CrawlqError {
    CrawlqError::Queue(e.to_string())
}
