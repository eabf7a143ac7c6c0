//! Error types for configuration loading and scheduling iterations.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load or validate the master configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Condition that aborts one scheduler iteration.
///
/// These are configuration/environment errors, not per-pair skips: the whole
/// iteration is abandoned, logged, and retried unchanged on the next tick so
/// the condition stays visible to an operator.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no network snapshot available yet")]
    NoSnapshot,

    #[error("challenge '{0}' does not exist in the current block")]
    UnknownChallenge(String),

    #[error("algorithm '{algorithm}' for challenge '{challenge}' does not exist")]
    UnknownAlgorithm {
        challenge: String,
        algorithm: String,
    },

    #[error("no download URL for algorithm '{0}'")]
    MissingDownloadUrl(String),

    #[error("job '{0}' references ids missing from the current block")]
    StaleJob(String),

    #[error("challenge '{0}' has no qualifying difficulties")]
    NoQualifiers(String),

    #[error("no qualifying difficulty inside the interquartile band for challenge '{0}'")]
    EmptyDifficultyBand(String),
}
