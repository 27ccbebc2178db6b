//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upper bound for any configured sleep (30 days).
const MAX_WAIT_SECS: u64 = 30 * 24 * 3600;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker identity and claim behavior
    #[serde(default)]
    pub worker: WorkerConfig,

    /// On-disk locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Call budget against the content source
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Ban backoff tuning
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Pause between jobs
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Cutoff and retry behavior within a job
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Content source connection settings
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Worker identity: configured value or the host name.
    pub fn worker_id(&self) -> String {
        self.worker
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(crate::utils::host_identity)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_calls == 0 {
            return Err(AppError::validation("rate_limit.max_calls must be > 0"));
        }
        if self.rate_limit.period_secs == 0 {
            return Err(AppError::validation("rate_limit.period_secs must be > 0"));
        }
        if self.backoff.base_secs == 0 {
            return Err(AppError::validation("backoff.base_secs must be > 0"));
        }
        if self.backoff.factor < 1.0 {
            return Err(AppError::validation("backoff.factor must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_ratio) {
            return Err(AppError::validation(
                "backoff.jitter_ratio must be within [0, 1]",
            ));
        }
        if self.backoff.max_delay_secs < self.backoff.base_secs {
            return Err(AppError::validation(
                "backoff.max_delay_secs must be >= backoff.base_secs",
            ));
        }
        if self.backoff.max_total_wait_secs > MAX_WAIT_SECS {
            return Err(AppError::validation(format!(
                "backoff.max_total_wait_secs must be <= {MAX_WAIT_SECS}"
            )));
        }
        if self.backoff.max_delay_secs > self.backoff.max_total_wait_secs {
            return Err(AppError::validation(
                "backoff.max_delay_secs must be <= backoff.max_total_wait_secs",
            ));
        }
        if self.cooldown.max_secs > MAX_WAIT_SECS {
            return Err(AppError::validation(format!(
                "cooldown.max_secs must be <= {MAX_WAIT_SECS}"
            )));
        }
        if self.cooldown.min_secs > self.cooldown.max_secs {
            return Err(AppError::validation(
                "cooldown.min_secs must be <= cooldown.max_secs",
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        Ok(())
    }
}

/// Worker identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker identity; defaults to the host name
    #[serde(default)]
    pub id: Option<String>,

    /// Delay before re-reading a fresh claim to detect a lost race (0 disables)
    #[serde(default = "defaults::claim_confirm_ms")]
    pub claim_confirm_ms: u64,
}

impl WorkerConfig {
    pub fn claim_confirm(&self) -> Option<Duration> {
        (self.claim_confirm_ms > 0).then(|| Duration::from_millis(self.claim_confirm_ms))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: None,
            claim_confirm_ms: defaults::claim_confirm_ms(),
        }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root for relative paths below
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// Job board document
    #[serde(default = "defaults::jobs_file")]
    pub jobs_file: String,

    #[serde(default = "defaults::checkpoint_dir")]
    pub checkpoint_dir: String,

    #[serde(default = "defaults::download_dir")]
    pub download_dir: String,
}

impl PathsConfig {
    fn resolve(&self, path: &str) -> PathBuf {
        Path::new(&self.data_dir).join(path)
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.resolve(&self.jobs_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve(&self.checkpoint_dir)
    }

    pub fn download_path(&self) -> PathBuf {
        self.resolve(&self.download_dir)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            jobs_file: defaults::jobs_file(),
            checkpoint_dir: defaults::checkpoint_dir(),
            download_dir: defaults::download_dir(),
        }
    }
}

/// At most `max_calls` fetches per sliding `period_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "defaults::max_calls")]
    pub max_calls: usize,

    #[serde(default = "defaults::period_secs")]
    pub period_secs: u64,
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: defaults::max_calls(),
            period_secs: defaults::period_secs(),
        }
    }
}

/// Exponential backoff applied while the source reports a temporary block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First sleep after a block
    #[serde(default = "defaults::base_secs")]
    pub base_secs: u64,

    /// Growth per consecutive block
    #[serde(default = "defaults::factor")]
    pub factor: f64,

    /// Random extra fraction added on top of each delay
    #[serde(default = "defaults::jitter_ratio")]
    pub jitter_ratio: f64,

    /// Cap for a single sleep
    #[serde(default = "defaults::max_delay_secs")]
    pub max_delay_secs: u64,

    /// Cap for all sleeps spent on one blocked fetch
    #[serde(default = "defaults::max_total_wait_secs")]
    pub max_total_wait_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: defaults::base_secs(),
            factor: defaults::factor(),
            jitter_ratio: defaults::jitter_ratio(),
            max_delay_secs: defaults::max_delay_secs(),
            max_total_wait_secs: defaults::max_total_wait_secs(),
        }
    }
}

/// Uniform random pause between jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "defaults::cooldown_min_secs")]
    pub min_secs: u64,

    #[serde(default = "defaults::cooldown_max_secs")]
    pub max_secs: u64,
}

impl CooldownConfig {
    pub fn disabled() -> Self {
        Self {
            min_secs: 0,
            max_secs: 0,
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            min_secs: defaults::cooldown_min_secs(),
            max_secs: defaults::cooldown_max_secs(),
        }
    }
}

/// Per-job harvest behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Consecutive stale items tolerated before the window is considered exhausted
    #[serde(default = "defaults::tolerance")]
    pub tolerance: usize,

    /// Pause after each persisted item
    #[serde(default = "defaults::item_delay_ms")]
    pub item_delay_ms: u64,

    /// Consecutive malformed responses tolerated before giving up
    #[serde(default = "defaults::max_unexpected_responses")]
    pub max_unexpected_responses: u32,

    /// Pause before retrying after a malformed response
    #[serde(default = "defaults::unexpected_retry_ms")]
    pub unexpected_retry_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            tolerance: defaults::tolerance(),
            item_delay_ms: defaults::item_delay_ms(),
            max_unexpected_responses: defaults::max_unexpected_responses(),
            unexpected_retry_ms: defaults::unexpected_retry_ms(),
        }
    }
}

/// Content source connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Feed root; a job key is appended as the last path segment
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Session cookie sent with every request
    #[serde(default)]
    pub session_cookie: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            session_cookie: None,
        }
    }
}

mod defaults {
    // Worker defaults
    pub fn claim_confirm_ms() -> u64 {
        0
    }

    // Path defaults
    pub fn data_dir() -> String {
        ".".into()
    }
    pub fn jobs_file() -> String {
        "jobs.json".into()
    }
    pub fn checkpoint_dir() -> String {
        "resume_files".into()
    }
    pub fn download_dir() -> String {
        "downloads".into()
    }

    // Rate limit defaults
    pub fn max_calls() -> usize {
        50
    }
    pub fn period_secs() -> u64 {
        900
    }

    // Backoff defaults
    pub fn base_secs() -> u64 {
        600
    }
    pub fn factor() -> f64 {
        2.0
    }
    pub fn jitter_ratio() -> f64 {
        0.2
    }
    pub fn max_delay_secs() -> u64 {
        4 * 3600
    }
    pub fn max_total_wait_secs() -> u64 {
        24 * 3600
    }

    // Cooldown defaults
    pub fn cooldown_min_secs() -> u64 {
        3 * 3600
    }
    pub fn cooldown_max_secs() -> u64 {
        4 * 3600
    }

    // Harvest defaults
    pub fn tolerance() -> usize {
        20
    }
    pub fn item_delay_ms() -> u64 {
        1000
    }
    pub fn max_unexpected_responses() -> u32 {
        5
    }
    pub fn unexpected_retry_ms() -> u64 {
        5000
    }

    // Source defaults
    pub fn base_url() -> String {
        "http://localhost:8080/groups".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; group-harvester/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
}
