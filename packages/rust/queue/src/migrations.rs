//! SQL migration definitions for the crawlq queue database.
//!
//! Migrations are applied in order on open. Several workers may open the same
//! database concurrently, so every statement must be safe to run twice.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: crawl_jobs queue, crawl_results channel",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pending jobs; `seq` gives FIFO order within a queue
CREATE TABLE IF NOT EXISTS crawl_jobs (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    queue       TEXT NOT NULL,
    job_id      TEXT NOT NULL UNIQUE,
    url         TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_queue ON crawl_jobs(queue, seq);

-- Published results; one row per job, ever
CREATE TABLE IF NOT EXISTS crawl_results (
    job_id       TEXT PRIMARY KEY,
    queue        TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    published_at TEXT NOT NULL,
    consumed_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_results_published ON crawl_results(published_at);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
