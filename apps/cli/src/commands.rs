//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use crawlq_core::{BatchCrawler, BatchReport, CrawlWorker, JobSubmitter};
use crawlq_crawler::{CrawlPipeline, fetcher_for};
use crawlq_queue::JobQueue;
use crawlq_shared::{
    AppConfig, CrawlResult, CrawlSettings, FetchEngine, JobId, init_config, load_config,
    load_config_from, validate_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// crawlq — crawl pages through a job queue.
#[derive(Parser)]
#[command(
    name = "crawlq",
    version,
    about = "Queue-driven crawl worker: submit URLs, get back structured page content.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.crawlq/crawlq.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Queue database: local path or libsql:// URL.
    #[arg(long, env = "CRAWLQ_QUEUE_URL", global = true)]
    pub queue_url: Option<String>,

    /// Name of the job queue.
    #[arg(long, env = "CRAWLQ_JOB_QUEUE", global = true)]
    pub job_queue: Option<String>,

    /// Name of the result queue.
    #[arg(long, env = "CRAWLQ_RESULT_QUEUE", global = true)]
    pub result_queue: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Fetch backend selectable on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum EngineArg {
    Chrome,
    Http,
}

impl From<EngineArg> for FetchEngine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Chrome => FetchEngine::Chrome,
            EngineArg::Http => FetchEngine::Http,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Consume jobs from the queue until Ctrl-C.
    Worker {
        /// Fetch backend (overrides worker.engine).
        #[arg(long)]
        engine: Option<EngineArg>,

        /// Exit after processing this many jobs.
        #[arg(long)]
        max_jobs: Option<u64>,
    },

    /// Submit a URL for crawling.
    Submit {
        /// Absolute http(s) URL.
        url: String,

        /// Wait for the result and print it instead of the job id.
        #[arg(long)]
        wait: bool,

        /// Seconds to wait with --wait (overrides submitter.timeout_secs).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait for and print the result of a submitted job.
    Result {
        /// Job id printed by `submit`.
        job_id: String,

        /// Seconds to wait (overrides submitter.timeout_secs).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Crawl URLs in-process, without the queue.
    Crawl {
        /// Absolute http(s) URLs, crawled in order.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Fetch backend (overrides worker.engine).
        #[arg(long)]
        engine: Option<EngineArg>,

        /// Save each successful page as Markdown here and print a summary
        /// instead of the result JSON.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check that the queue database is reachable.
    Health,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries results.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = ["crawlq", "crawlq_core", "crawlq_crawler", "crawlq_queue", "crawlq_shared"]
        .map(|target| format!("{target}={level}"))
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Command::Worker { engine, max_jobs } => cmd_worker(&config, engine, max_jobs).await,
        Command::Submit { url, wait, timeout } => cmd_submit(&config, &url, wait, timeout).await,
        Command::Result { job_id, timeout } => cmd_result(&config, &job_id, timeout).await,
        Command::Crawl { urls, engine, out } => cmd_crawl(&config, &urls, engine, out).await,
        Command::Health => cmd_health(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Defaults → config file → environment / flags.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    apply_overrides(&mut config, cli);
    validate_config(&config)?;
    Ok(config)
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(url) = &cli.queue_url {
        config.queue.url = url.clone();
    }
    if let Some(name) = &cli.job_queue {
        config.queue.job_queue = name.clone();
    }
    if let Some(name) = &cli.result_queue {
        config.queue.result_queue = name.clone();
    }
}

async fn open_queue(config: &AppConfig) -> Result<Arc<JobQueue>> {
    Ok(Arc::new(JobQueue::open(&config.queue).await?))
}

fn build_pipeline(config: &AppConfig, engine: Option<EngineArg>) -> Result<CrawlPipeline> {
    let engine = engine.map(FetchEngine::from).unwrap_or(config.worker.engine);
    let fetcher = fetcher_for(engine, &config.browser)?;
    Ok(CrawlPipeline::new(fetcher, &CrawlSettings::from(config)))
}

fn wait_timeout(config: &AppConfig, secs: Option<u64>) -> Duration {
    secs.map(Duration::from_secs)
        .unwrap_or_else(|| config.submitter.timeout())
}

fn print_result(result: &CrawlResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_worker(config: &AppConfig, engine: Option<EngineArg>, max_jobs: Option<u64>) -> Result<()> {
    let queue = open_queue(config).await?;
    let pipeline = build_pipeline(config, engine)?;
    let worker = CrawlWorker::new(queue, pipeline, &config.queue, &config.worker);

    info!(
        queue_url = %config.queue.url,
        job_queue = %config.queue.job_queue,
        result_queue = %config.queue.result_queue,
        "starting worker (Ctrl-C to stop)"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let report = worker.run(max_jobs, shutdown).await;

    println!();
    println!("  Worker stopped.");
    println!("  Processed: {}", report.processed);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed());
    if report.publish_failures > 0 {
        println!("  Unpublished: {}", report.publish_failures);
    }
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_submit(config: &AppConfig, url: &str, wait: bool, timeout: Option<u64>) -> Result<()> {
    let queue = open_queue(config).await?;
    let submitter = JobSubmitter::new(queue, &config.queue, &config.submitter);

    if !wait {
        let job_id = submitter.submit(url).await?;
        println!("{job_id}");
        return Ok(());
    }

    let spinner = Spinner::new(format!("Waiting for {url}"));
    let result = submitter
        .submit_and_wait(url, wait_timeout(config, timeout))
        .await;
    spinner.finish();

    print_result(&result?)
}

async fn cmd_result(config: &AppConfig, job_id: &str, timeout: Option<u64>) -> Result<()> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|e| eyre!("invalid job id '{job_id}': {e}"))?;

    let queue = open_queue(config).await?;
    let submitter = JobSubmitter::new(queue, &config.queue, &config.submitter);

    let spinner = Spinner::new(format!("Waiting for {job_id}"));
    let result = submitter
        .await_result(job_id, wait_timeout(config, timeout))
        .await;
    spinner.finish();

    print_result(&result)
}

async fn cmd_crawl(
    config: &AppConfig,
    urls: &[String],
    engine: Option<EngineArg>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut batch = BatchCrawler::new(build_pipeline(config, engine)?);
    if let Some(dir) = &out {
        batch = batch.with_output_dir(dir);
    }

    info!(urls = urls.len(), fetcher = batch.fetcher_name(), "crawling in-process");

    let spinner = Spinner::new(format!("Crawling {} URL(s)", urls.len()));
    let report = batch.run(urls).await;
    spinner.finish();
    let report = report?;

    match &out {
        Some(dir) => print_batch_summary(&report, dir),
        None => {
            for result in &report.results {
                print_result(result)?;
            }
        }
    }
    Ok(())
}

fn print_batch_summary(report: &BatchReport, out_dir: &Path) {
    println!();
    println!("  Crawl complete.");
    println!("  URLs:      {}", report.results.len());
    println!("  Succeeded: {}", report.succeeded());
    println!("  Failed:    {}", report.failed());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());

    if report.succeeded() > 0 {
        println!();
        println!("  Pages:");
        for result in report.results.iter().filter(|r| r.is_success()) {
            let title: String = result.title.as_deref().unwrap_or_default().chars().take(60).collect();
            let chars = result.content.as_deref().map_or(0, |c| c.chars().count());
            let strategy = result.strategy.map(|s| s.as_str()).unwrap_or_default();
            println!("    - {title}: {chars} chars [{strategy}]");
        }

        println!();
        println!("  Strategy usage:");
        for (strategy, count) in report.strategy_usage() {
            println!("    - {strategy}: {count} page(s)");
        }
    }

    let failures: Vec<_> = report.results.iter().filter(|r| !r.is_success()).collect();
    if !failures.is_empty() {
        println!();
        println!("  Failures:");
        for result in failures {
            println!(
                "    - {}: {}",
                result.url.as_deref().unwrap_or_default(),
                result.error.as_deref().unwrap_or_default()
            );
        }
    }

    println!();
    println!("  Output:    {} ({} file(s))", out_dir.display(), report.saved.len());
    println!();
}

async fn cmd_health(config: &AppConfig) -> Result<()> {
    let queue = open_queue(config).await?;
    queue.ping().await?;
    let pending = queue.pending_jobs(&config.queue.job_queue).await?;

    println!("  Queue:   {} (ok)", config.queue.url);
    println!("  Pending: {pending} job(s) on '{}'", config.queue.job_queue);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI spinner
// ---------------------------------------------------------------------------

/// Stderr spinner shown while waiting on a job.
struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    fn new(message: String) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
            bar.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
            );
        }
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}
