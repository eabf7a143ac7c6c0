//! Master Configuration
//!
//! Defines the configuration for the benchmarking master including:
//! - Network API endpoint and player identity
//! - Dispatch server bind address
//! - Scheduler flags (auto-calibration, difficulty optimization)
//! - Per-(challenge, algorithm) job targets
//!
//! Loaded from a TOML file and validated up front, so a bad pair entry fails
//! at startup instead of at use time inside the scheduling loop.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Complete master configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Base URL of the network API.
    pub api_url: String,
    /// Player id benchmarks are attributed to.
    pub player_id: String,
    /// Dispatch server bind address.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Scheduling loop settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Snapshot refresh settings.
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// One entry per (challenge, algorithm) pair to keep staffed.
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5115,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduling iterations in milliseconds.
    pub interval_ms: u64,
    /// Redistribute effort across challenges from observed solution counts
    /// instead of using the statically configured weights.
    pub auto_calibrate_challenges: bool,
    /// Concentrate difficulty sampling on the interquartile band of the
    /// qualifying set instead of drawing uniformly.
    pub difficulty_optimization: bool,
    /// How often the optimized sampler re-anchors with a draw from the full
    /// qualifying set, in milliseconds.
    pub regular_draw_period_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            auto_calibrate_challenges: true,
            difficulty_optimization: false,
            regular_draw_period_ms: 600_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Interval between network polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
        }
    }
}

/// Job targets for one (challenge, algorithm) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Challenge name as listed by the network.
    pub challenge: String,
    /// Algorithm name within that challenge.
    pub algorithm: String,
    /// Number of jobs to keep in flight.
    pub num_jobs: u32,
    /// Per-job weight when auto-calibration is off.
    pub weight: u32,
    /// Benchmark run window in milliseconds.
    pub benchmark_duration_ms: u64,
    /// Grace period after the run window before the benchmark is submitted.
    pub wait_duration_ms: u64,
    /// Multiplier on `num_jobs` while this challenge is the calibration's
    /// max-weight challenge.
    pub num_jobs_factor: f64,
    /// Multiplier on `benchmark_duration_ms` under the same condition.
    pub duration_factor: f64,
}

impl MasterConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail later inside the loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url must not be empty".into()));
        }
        if self.player_id.trim().is_empty() {
            return Err(ConfigError::Invalid("player_id must not be empty".into()));
        }
        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[jobs]] entry is required".into(),
            ));
        }
        if self.scheduler.interval_ms == 0 || self.fetcher.interval_ms == 0 {
            return Err(ConfigError::Invalid("intervals must be positive".into()));
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            let key = (job.challenge.as_str(), job.algorithm.as_str());
            if !seen.insert(key) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate jobs entry for challenge '{}' algorithm '{}'",
                    job.challenge, job.algorithm
                )));
            }
            if job.challenge.trim().is_empty() || job.algorithm.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "jobs entries need non-empty challenge and algorithm names".into(),
                ));
            }
            if job.num_jobs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "num_jobs must be at least 1 for '{}/{}'",
                    job.challenge, job.algorithm
                )));
            }
            if job.benchmark_duration_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "benchmark_duration_ms must be positive for '{}/{}'",
                    job.challenge, job.algorithm
                )));
            }
            if job.num_jobs_factor <= 0.0 || job.duration_factor <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "scaling factors must be positive for '{}/{}'",
                    job.challenge, job.algorithm
                )));
            }
        }
        Ok(())
    }
}
