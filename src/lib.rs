//! Fleet Benchmarker Master
//!
//! Master node of a distributed benchmarking fleet. It tracks the state of
//! an external competitive-computation network, schedules benchmark jobs to
//! meet configured per-(challenge, algorithm) targets, hands jobs to remote
//! workers over HTTP and collects their solutions.
//!
//! ## Module Structure
//!
//! - `model`: network snapshot and job data model
//! - `config`: typed master configuration (TOML)
//! - `state`: shared state - snapshot slot, job store, difficulty samplers
//! - `calibration`: per-block challenge weighting
//! - `difficulty`: difficulty sampler model and selection policy
//! - `scheduler`: the periodic reconcile loop
//! - `dispatch`: worker-facing HTTP server
//! - `fetcher`: network API client and snapshot refresh loop

/// Snapshot and job data model.
pub mod model;

/// Typed configuration.
pub mod config;

/// Error types.
pub mod error;

/// Shared process state.
pub mod state;

/// Challenge weight calibration.
pub mod calibration;

/// Difficulty sampling and selection.
pub mod difficulty;

/// Job scheduling loop.
pub mod scheduler;

/// Worker dispatch server.
pub mod dispatch;

/// Network snapshot fetcher.
pub mod fetcher;

pub use calibration::{CalibrationWeights, ChallengeCalibrator};
pub use config::{JobConfig, MasterConfig};
pub use difficulty::{DifficultySampler, DifficultySelector};
pub use error::{ConfigError, ScheduleError};
pub use fetcher::{NetworkClient, SnapshotFetcher};
pub use model::{Difficulty, Job, Snapshot, SolutionData};
pub use scheduler::JobScheduler;
pub use state::{JobStore, MasterState};
