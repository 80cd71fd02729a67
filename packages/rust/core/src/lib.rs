//! Job orchestration for crawlq.
//!
//! This crate ties the queue and the crawler together:
//! - [`JobSubmitter`] — enqueue a URL, wait for its [`CrawlResult`](crawlq_shared::CrawlResult)
//! - [`CrawlWorker`] — pop jobs, run the strategy ladder, publish results
//! - [`BatchCrawler`] — crawl a list of URLs in-process and save Markdown

pub mod batch;
pub mod submitter;
pub mod worker;

pub use batch::{BatchCrawler, BatchReport, SavedPage};
pub use submitter::JobSubmitter;
pub use worker::{CrawlWorker, WorkerReport};
