//! Runtime configuration structures

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Frequency;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub retry: RetryConfig,
    pub discovery: DiscoveryConfig,
    pub scheduler: SchedulerConfig,
    pub market: MarketApiConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub commitment: String,
    pub timeout_secs: u64,
    /// Minimum spacing between RPC calls
    pub min_request_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            timeout_secs: 30,
            min_request_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1200,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Recent signatures fetched per poll
    pub signature_limit: usize,
    pub poll_interval_secs: u64,
    /// Look up token supply for every newly discovered mint
    pub analyze_new_tokens: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            signature_limit: 20,
            poll_interval_secs: 5,
            analyze_new_tokens: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub capacity: usize,
    /// Delay between discovery and the admission decision
    pub observation_delay_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_token_age_days: i64,
    /// Failed admission fetches before a pending token is given up on
    pub max_admission_attempts: u32,
    pub tier_intervals: TierIntervals,
    pub admission: AdmissionThresholds,
    pub tiers: TierThresholds,
    /// JSON lines file receiving metric snapshots
    pub snapshot_path: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            observation_delay_secs: 3600,
            sweep_interval_secs: 30,
            max_token_age_days: 7,
            max_admission_attempts: 3,
            tier_intervals: TierIntervals::default(),
            admission: AdmissionThresholds::default(),
            tiers: TierThresholds::default(),
            snapshot_path: PathBuf::from("data/token_metrics.jsonl"),
        }
    }
}

/// Refresh interval per monitoring tier, in seconds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TierIntervals {
    pub high_secs: u64,
    pub medium_secs: u64,
    pub low_secs: u64,
}

impl Default for TierIntervals {
    fn default() -> Self {
        Self {
            high_secs: 300,
            medium_secs: 900,
            low_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionThresholds {
    pub min_liquidity_sol: f64,
    pub min_holders: u64,
    pub min_transactions: u64,
    /// Liquidity change since discovery must stay above this (percent)
    pub min_liquidity_change_pct: f64,
    pub min_volume_1h_sol: f64,
    /// Checks that must pass out of five
    pub min_passed: usize,
}

impl Default for AdmissionThresholds {
    fn default() -> Self {
        Self {
            min_liquidity_sol: 3.0,
            min_holders: 20,
            min_transactions: 50,
            min_liquidity_change_pct: -50.0,
            min_volume_1h_sol: 10.0,
            min_passed: 3,
        }
    }
}

/// Score bands, highest first. A value strictly above band `i` earns `3 - i`
/// points.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TierThresholds {
    pub liquidity_sol: [f64; 3],
    pub holders: [u64; 3],
    pub volume_1h_sol: [f64; 3],
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            liquidity_sol: [20.0, 10.0, 5.0],
            holders: [100, 50, 25],
            volume_1h_sol: [100.0, 50.0, 20.0],
        }
    }
}

/// Live price and pair APIs queried for token metrics
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketApiConfig {
    pub dexscreener_url: String,
    pub jupiter_url: String,
    pub timeout_secs: u64,
    /// Minimum spacing between calls to each API
    pub min_request_interval_ms: u64,
}

impl Default for MarketApiConfig {
    fn default() -> Self {
        Self {
            dexscreener_url: "https://api.dexscreener.com/latest/dex/tokens".to_string(),
            jupiter_url: "https://lite-api.jup.ag/price/v3".to_string(),
            timeout_secs: 15,
            min_request_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api_base: String,
    pub vs_currency: String,
    /// Number of coins to collect, -1 for every listed coin
    pub count: i64,
    pub frequencies: Vec<Frequency>,
    pub output_dir: PathBuf,
    pub resume: bool,
    pub workers: usize,
    pub min_request_interval_ms: u64,
    pub collect_snapshots: bool,
    /// Minimum samples a history series needs to be kept
    pub min_samples: usize,
    pub early_window: usize,
    pub full_windows: Vec<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.coingecko.com/api/v3".to_string(),
            vs_currency: "usd".to_string(),
            count: 250,
            frequencies: vec![Frequency::Daily],
            output_dir: PathBuf::from("data/memecoins"),
            resume: true,
            workers: 5,
            min_request_interval_ms: 1200,
            collect_snapshots: false,
            min_samples: 3,
            early_window: 3,
            full_windows: vec![30, 90, 180, 365],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
    pub file_prefix: String,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_prefix: "memescout.log".to_string(),
            json_file: true,
        }
    }
}

pub const MAX_WORKERS: usize = 10;
/// Upper bound for any configured interval or delay (one year)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 3600;
pub const MAX_TOKEN_AGE_DAYS: i64 = 365;

impl Config {
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Loads and validates a config file. A missing file yields the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content, &display)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Read { path: display, source }),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.capacity == 0 {
            return Err(ConfigError::Invalid("scheduler.capacity must be at least 1".into()));
        }
        if scheduler.admission.min_passed > 5 {
            return Err(ConfigError::Invalid(format!(
                "scheduler.admission.min_passed is {} but there are only 5 checks",
                scheduler.admission.min_passed
            )));
        }
        if scheduler.sweep_interval_secs == 0 || self.discovery.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll and sweep intervals must be non-zero".into()));
        }
        if !(1..=MAX_TOKEN_AGE_DAYS).contains(&scheduler.max_token_age_days) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.max_token_age_days must be between 1 and {}, got {}",
                MAX_TOKEN_AGE_DAYS, scheduler.max_token_age_days
            )));
        }
        if scheduler.max_admission_attempts == 0 {
            return Err(ConfigError::Invalid("scheduler.max_admission_attempts must be at least 1".into()));
        }
        let intervals = &scheduler.tier_intervals;
        for (name, secs) in [
            ("scheduler.observation_delay_secs", scheduler.observation_delay_secs),
            ("scheduler.sweep_interval_secs", scheduler.sweep_interval_secs),
            ("discovery.poll_interval_secs", self.discovery.poll_interval_secs),
            ("scheduler.tier_intervals.high_secs", intervals.high_secs),
            ("scheduler.tier_intervals.medium_secs", intervals.medium_secs),
            ("scheduler.tier_intervals.low_secs", intervals.low_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {} seconds, got {}",
                    name, MAX_INTERVAL_SECS, secs
                )));
            }
        }

        let pipeline = &self.pipeline;
        if pipeline.workers == 0 || pipeline.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "pipeline.workers must be between 1 and {}, got {}",
                MAX_WORKERS, pipeline.workers
            )));
        }
        if pipeline.frequencies.is_empty() {
            return Err(ConfigError::Invalid("pipeline.frequencies must not be empty".into()));
        }
        if pipeline.count == 0 || pipeline.count < -1 {
            return Err(ConfigError::Invalid("pipeline.count must be positive or -1 for all coins".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.capacity, 30);
        assert_eq!(config.scheduler.tier_intervals.medium_secs, 900);
        assert_eq!(config.pipeline.full_windows, vec![30, 90, 180, 365]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let content = r#"
            [scheduler]
            capacity = 10

            [scheduler.admission]
            min_holders = 40

            [pipeline]
            frequencies = ["hourly", "minute"]
            workers = 3
        "#;
        let config = Config::from_toml_str(content, "inline").unwrap();

        assert_eq!(config.scheduler.capacity, 10);
        assert_eq!(config.scheduler.admission.min_holders, 40);
        assert_eq!(config.scheduler.admission.min_passed, 3);
        assert_eq!(config.pipeline.frequencies, vec![Frequency::Hourly, Frequency::Minute]);
        assert_eq!(config.rpc, RpcConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.scheduler.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.pipeline.workers = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.frequencies.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.admission.min_passed = 6;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.max_admission_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_durations() {
        let mut config = Config::default();
        config.scheduler.max_token_age_days = -1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.scheduler.max_token_age_days = 0;
        assert!(config.validate().is_err());

        config.scheduler.max_token_age_days = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.observation_delay_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.tier_intervals.low_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.max_token_age_days = MAX_TOKEN_AGE_DAYS;
        config.scheduler.tier_intervals.low_secs = MAX_INTERVAL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unparsable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[scheduler\ncapacity = ").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
