//! crawlq CLI — queue-driven crawl worker and job submitter.
//!
//! Runs workers that render pages through a fallback strategy ladder, and
//! lets any process submit URLs and collect structured results.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
