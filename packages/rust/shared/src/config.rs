//! Application configuration for crawlq.
//!
//! User config lives at `~/.crawlq/crawlq.toml`.
//! CLI flags and environment variables override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CrawlqError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "crawlq.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".crawlq";

// ---------------------------------------------------------------------------
// Config structs (matching crawlq.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Queue connection and naming.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Submitter polling behavior.
    #[serde(default)]
    pub submitter: SubmitterConfig,

    /// Worker loop behavior.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Quality gate and extraction thresholds.
    #[serde(default)]
    pub quality: QualityConfig,

    /// Headless browser settings.
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// `[queue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Local database path, or a `libsql://` / `https://` remote URL.
    #[serde(default = "default_queue_url")]
    pub url: String,

    /// Name of the env var holding the remote auth token (never store the token itself).
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,

    /// Queue name jobs are pushed to.
    #[serde(default = "default_job_queue")]
    pub job_queue: String,

    /// Queue name results are published to.
    #[serde(default = "default_result_queue")]
    pub result_queue: String,

    /// Seconds a published result is retained before it may be purged.
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            auth_token_env: default_auth_token_env(),
            job_queue: default_job_queue(),
            result_queue: default_result_queue(),
            result_ttl_secs: default_result_ttl(),
        }
    }
}

fn default_queue_url() -> String {
    "var/crawlq.db".into()
}
fn default_auth_token_env() -> String {
    "CRAWLQ_QUEUE_TOKEN".into()
}
fn default_job_queue() -> String {
    "crawl_jobs".into()
}
fn default_result_queue() -> String {
    "crawl_results".into()
}
fn default_result_ttl() -> u64 {
    600
}

/// `[submitter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterConfig {
    /// How long `await_result` waits before giving up.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Interval between result-channel polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    500
}

/// Which fetch backend the worker uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchEngine {
    /// Headless Chromium over the DevTools protocol.
    #[default]
    Chrome,
    /// Plain HTTP GET, no JavaScript.
    Http,
}

impl std::str::FromStr for FetchEngine {
    type Err = CrawlqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Self::Chrome),
            "http" => Ok(Self::Http),
            other => Err(CrawlqError::config(format!(
                "unknown fetch engine '{other}' (expected chrome or http)"
            ))),
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long one blocking pop waits for a job before re-checking shutdown.
    #[serde(default = "default_block_timeout")]
    pub block_timeout_secs: u64,

    /// Fetch backend.
    #[serde(default)]
    pub engine: FetchEngine,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            block_timeout_secs: default_block_timeout(),
            engine: FetchEngine::default(),
        }
    }
}

fn default_block_timeout() -> u64 {
    5
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum cleaned content length, in characters.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Byte budget for the extracted content.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_content_length: default_min_content_length(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

fn default_min_content_length() -> usize {
    200
}
fn default_max_content_bytes() -> usize {
    10 * 1024
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run Chromium without a window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Explicit Chromium binary; auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Pass `--no-sandbox` (needed in most containers).
    #[serde(default)]
    pub no_sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            no_sandbox: false,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Runtime settings (derived from config + CLI flags)
// ---------------------------------------------------------------------------

/// Thresholds the crawl pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    pub min_content_length: usize,
    pub max_content_bytes: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_content_length: config.quality.min_content_length,
            max_content_bytes: config.quality.max_content_bytes,
        }
    }
}

impl SubmitterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl QueueConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Whether [`QueueConfig::url`] points at a remote libSQL server.
    pub fn is_remote(&self) -> bool {
        ["libsql://", "http://", "https://", "wss://", "ws://"]
            .iter()
            .any(|prefix| self.url.starts_with(prefix))
    }

    /// Read the remote auth token from the configured env var (empty if unset).
    pub fn auth_token(&self) -> String {
        std::env::var(&self.auth_token_env).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.crawlq/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CrawlqError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.crawlq/crawlq.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CrawlqError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| CrawlqError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CrawlqError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CrawlqError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CrawlqError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values that would make the worker or submitter misbehave.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.queue.url.trim().is_empty() {
        return Err(CrawlqError::config("queue.url must not be empty"));
    }
    if config.queue.job_queue.is_empty() || config.queue.result_queue.is_empty() {
        return Err(CrawlqError::config("queue names must not be empty"));
    }
    if config.queue.job_queue == config.queue.result_queue {
        return Err(CrawlqError::config(
            "queue.job_queue and queue.result_queue must differ",
        ));
    }
    if config.submitter.poll_interval_ms == 0 || config.submitter.poll_interval_ms >= 1000 {
        return Err(CrawlqError::config(
            "submitter.poll_interval_ms must be between 1 and 999",
        ));
    }
    if config.quality.max_content_bytes == 0 {
        return Err(CrawlqError::config("quality.max_content_bytes must be positive"));
    }
    Ok(())
}
