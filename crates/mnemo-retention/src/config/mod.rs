use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use crate::error::{Result, RetentionError};
use crate::memory::access::DEFAULT_LATENCY_WINDOW;
use crate::storage::decay::DecayPolicy;
use crate::storage::tiers::TierThresholds;

/// Main configuration structure for the retention engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Composite score settings
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Tier capacities and thresholds
    #[serde(default)]
    pub tiers: TiersConfig,
    /// Stale item decay
    #[serde(default)]
    pub decay: DecayConfig,
    /// Periodic optimization pass
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Tier migration against the external store
    #[serde(default)]
    pub migration: MigrationConfig,
    /// Access statistics
    #[serde(default)]
    pub access: AccessConfig,
    /// Admin HTTP server
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| RetentionError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetentionError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Load from `path`, or from the first default location that exists,
    /// or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for candidate in default_config_paths() {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RetentionError::Config(msg));

        let rate = self.decay.decay_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return invalid(format!("decay.decay_rate must be in (0, 1), got {rate}"));
        }

        let TiersConfig {
            hot_threshold: hot,
            warm_threshold: warm,
            ..
        } = self.tiers;
        if !(0.0 <= warm && warm < hot && hot <= 1.0) {
            return invalid(format!(
                "tiers thresholds must satisfy 0 <= warm < hot <= 1, got warm={warm} hot={hot}"
            ));
        }

        if self.tiers.hot_capacity == 0 || self.tiers.warm_capacity == 0 {
            return invalid("tiers.hot_capacity and tiers.warm_capacity must be non-zero".into());
        }
        if self.scoring.recency_window_hours == 0 {
            return invalid("scoring.recency_window_hours must be non-zero".into());
        }
        if self.decay.staleness_days == 0 || self.decay.decay_interval_hours == 0 {
            return invalid("decay.staleness_days and decay.decay_interval_hours must be non-zero".into());
        }
        if self.optimizer.interval_hours == 0 {
            return invalid("optimizer.interval_hours must be non-zero".into());
        }
        if self.optimizer.max_parallel_migrations == 0 {
            return invalid("optimizer.max_parallel_migrations must be non-zero".into());
        }
        if self.optimizer.signal_timeout_ms == 0 || self.migration.store_timeout_ms == 0 {
            return invalid("signal and store timeouts must be non-zero".into());
        }
        if self.access.latency_window == 0 {
            return invalid("access.latency_window must be non-zero".into());
        }

        Ok(())
    }
}

/// Default config file locations, in lookup order
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".mnemo").join("retention.toml")),
        dirs::config_dir().map(|c| c.join("mnemo").join("retention.toml")),
        Some(PathBuf::from("retention.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Composite score configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Hours after an owner's last interaction until the recency bonus is 0
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_window_hours: default_recency_window_hours(),
        }
    }
}

impl ScoringConfig {
    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::hours(clamp_i64(self.recency_window_hours))
    }
}

fn default_recency_window_hours() -> u64 {
    24
}

/// Tier capacity and threshold configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TiersConfig {
    /// Maximum items in the Hot tier
    #[serde(default = "default_hot_capacity")]
    pub hot_capacity: usize,
    /// Maximum items in the Warm tier (Cold is unbounded)
    #[serde(default = "default_warm_capacity")]
    pub warm_capacity: usize,
    /// Minimum score for Hot
    #[serde(default = "default_hot_threshold")]
    pub hot_threshold: f64,
    /// Minimum score for Warm
    #[serde(default = "default_warm_threshold")]
    pub warm_threshold: f64,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            hot_capacity: default_hot_capacity(),
            warm_capacity: default_warm_capacity(),
            hot_threshold: default_hot_threshold(),
            warm_threshold: default_warm_threshold(),
        }
    }
}

impl TiersConfig {
    pub fn thresholds(&self) -> TierThresholds {
        TierThresholds {
            hot: self.hot_threshold,
            warm: self.warm_threshold,
        }
    }
}

fn default_hot_capacity() -> usize {
    1000
}

fn default_warm_capacity() -> usize {
    5000
}

fn default_hot_threshold() -> f64 {
    0.7
}

fn default_warm_threshold() -> f64 {
    0.4
}

/// Decay configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Fraction of score lost per decay step
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Days without access before an item is stale
    #[serde(default = "default_staleness_days")]
    pub staleness_days: u64,
    /// Minimum hours between two decay steps of one item
    #[serde(default = "default_decay_interval_hours")]
    pub decay_interval_hours: u64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            staleness_days: default_staleness_days(),
            decay_interval_hours: default_decay_interval_hours(),
        }
    }
}

impl DecayConfig {
    pub fn policy(&self) -> DecayPolicy {
        DecayPolicy {
            decay_rate: self.decay_rate,
            staleness: chrono::Duration::days(clamp_i64(self.staleness_days)),
            interval: chrono::Duration::hours(clamp_i64(self.decay_interval_hours)),
        }
    }
}

fn default_decay_rate() -> f64 {
    0.1
}

fn default_staleness_days() -> u64 {
    7
}

fn default_decay_interval_hours() -> u64 {
    6
}

/// Optimization pass configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Hours between scheduled passes
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// Demotions run concurrently up to this many at a time
    #[serde(default = "default_max_parallel_migrations")]
    pub max_parallel_migrations: usize,
    /// Bound on one classifier request
    #[serde(default = "default_signal_timeout_ms")]
    pub signal_timeout_ms: u64,
    /// Store failures in a row before a pass gives up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
    /// Start the scheduler with the daemon
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            max_parallel_migrations: default_max_parallel_migrations(),
            signal_timeout_ms: default_signal_timeout_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            auto_start: default_auto_start(),
        }
    }
}

impl OptimizerConfig {
    pub fn interval(&self) -> StdDuration {
        StdDuration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn signal_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.signal_timeout_ms)
    }
}

fn default_interval_hours() -> u64 {
    6
}

fn default_max_parallel_migrations() -> usize {
    8
}

fn default_signal_timeout_ms() -> u64 {
    2000
}

fn default_max_consecutive_failures() -> usize {
    10
}

fn default_auto_start() -> bool {
    true
}

/// Migration configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Bound on one external store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl MigrationConfig {
    pub fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }
}

fn default_store_timeout_ms() -> u64 {
    5000
}

/// Access statistics configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Retrieval latencies kept per item
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            latency_window: default_latency_window(),
        }
    }
}

fn default_latency_window() -> usize {
    DEFAULT_LATENCY_WINDOW
}

/// Admin HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:9898")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:9898".to_string()
}

/// Caps hour/day counts so building a `chrono::Duration` cannot overflow
fn clamp_i64(value: u64) -> i64 {
    value.min(1_000_000) as i64
}
