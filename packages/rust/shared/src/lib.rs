//! Shared types, error model, and configuration for crawlq.
//!
//! This crate is the foundation depended on by all other crawlq crates.
//! It provides:
//! - [`CrawlqError`] — the unified error type
//! - Domain types ([`CrawlJob`], [`CrawlResult`], [`Strategy`], [`PageContent`], [`JobId`])
//! - Configuration ([`AppConfig`], [`CrawlSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, CrawlSettings, FetchEngine, QualityConfig, QueueConfig,
    SubmitterConfig, WorkerConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{CrawlqError, Result};
pub use types::{
    AttemptRecord, CrawlJob, CrawlResult, CrawlStatus, EXHAUSTED_ERROR, Heading, JobId,
    PageContent, Strategy, TIMEOUT_ERROR, validate_target_url,
};
