//! Page fetching, content extraction, and the crawl strategy ladder.
//!
//! This crate provides:
//! - [`PageFetcher`] with headless Chromium and plain HTTP backends
//! - [`extract`] — title, description, headings and body text from HTML
//! - [`QualityGate`] — rejects error pages and near-empty renders
//! - [`CrawlPipeline`] — direct → SPA with delay → navigate from home

pub mod extract;
pub mod fetcher;
pub mod navigate;
pub mod pipeline;
pub mod quality;
pub mod strategy;

pub use extract::{extract, truncate_at_boundary, try_extract};
pub use fetcher::{ChromeFetcher, HttpFetcher, PageFetcher, RenderedPage, fetcher_for};
pub use pipeline::{CrawlPipeline, PipelineOutcome};
pub use quality::{ERROR_MARKERS, QualityGate, QualityVerdict};
pub use strategy::{FetchRequest, Navigation, StrategyPlan};
