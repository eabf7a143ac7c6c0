//! Job Scheduler
//!
//! The periodic control loop that keeps the configured amount of benchmark
//! work in flight. Each iteration, under a single job-store write guard:
//! 1. Expire: available jobs whose run window ended move to
//!    `pending_benchmark` (solutions preserved).
//! 2. Count: in-flight jobs grouped by (challenge name, algorithm name).
//! 3. Calibrate: per-challenge weights, cached per block id.
//! 4. Reconcile: for every configured pair, create jobs up to the effective
//!    target, selecting a difficulty per job.
//!
//! A failed iteration is logged and retried unchanged on the next tick;
//! unknown algorithm names or missing download URLs fail the whole iteration
//! on purpose so misconfiguration stays loud.

use crate::calibration::{CalibrationWeights, ChallengeCalibrator};
use crate::config::{JobConfig, MasterConfig};
use crate::difficulty::DifficultySelector;
use crate::error::ScheduleError;
use crate::model::{now_millis, BenchmarkSettings, Difficulty, Job, Snapshot, Timestamps};
use crate::state::{JobStore, MasterState};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Periodic scheduling loop over the shared state.
///
/// Owns the calibration cache and the difficulty selector, so independent
/// scheduler instances (e.g. in tests) never interfere through shared module
/// state.
pub struct JobScheduler {
    config: Arc<MasterConfig>,
    state: Arc<MasterState>,
    calibrator: ChallengeCalibrator,
    selector: DifficultySelector,
    shutdown_rx: watch::Receiver<bool>,
}

impl JobScheduler {
    pub fn new(
        config: Arc<MasterConfig>,
        state: Arc<MasterState>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let selector = DifficultySelector::new(
            config.scheduler.difficulty_optimization,
            config.scheduler.regular_draw_period_ms,
            now_millis(),
        );
        Self {
            config,
            state,
            calibrator: ChallengeCalibrator::new(),
            selector,
            shutdown_rx,
        }
    }

    /// Run until shutdown. Iteration failures are logged and the loop
    /// continues after its normal interval; nothing propagates out.
    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.scheduler.interval_ms));

        info!(
            "starting job scheduler (interval: {} ms)",
            self.config.scheduler.interval_ms
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.execute().await {
                        error!("scheduling iteration failed: {}", e);
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("job scheduler received shutdown signal, stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One scheduling iteration.
    async fn execute(&mut self) -> Result<(), ScheduleError> {
        let snapshot = self
            .state
            .snapshot()
            .await
            .ok_or(ScheduleError::NoSnapshot)?;

        // The write guard spans the whole reconcile sequence, making it one
        // critical section relative to the dispatch handlers.
        let mut store = self.state.jobs.write().await;
        let outcome = reconcile(
            &self.config,
            &snapshot,
            &mut store,
            &mut self.calibrator,
            &mut self.selector,
            now_millis(),
            &mut rand::thread_rng(),
        )?;

        if outcome.expired > 0 || outcome.created > 0 {
            info!(
                "scheduling pass: {} expired, {} created, {} available",
                outcome.expired,
                outcome.created,
                store.available.len()
            );
        }
        Ok(())
    }
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub expired: usize,
    pub created: usize,
}

/// One full reconcile pass: expire, count, calibrate, create.
///
/// Synchronous on purpose — the caller runs it under the job-store write
/// lock, and tests can drive it directly with a fixed clock and rng.
pub fn reconcile(
    config: &MasterConfig,
    snapshot: &Snapshot,
    store: &mut JobStore,
    calibrator: &mut ChallengeCalibrator,
    selector: &mut DifficultySelector,
    now: u64,
    rng: &mut impl Rng,
) -> Result<ReconcileOutcome, ScheduleError> {
    let expired = store.expire_finished(now);
    for benchmark_id in &expired {
        info!("job {} finished, awaiting benchmark submission", benchmark_id);
    }

    let in_flight = count_by_pair(store, snapshot)?;

    let auto_calibrate = config.scheduler.auto_calibrate_challenges;
    let calibration = calibrator.calibrate(snapshot, auto_calibrate);

    // Creation is all-or-nothing per iteration: jobs accumulate here and are
    // only inserted once every configured pair resolved cleanly.
    let mut new_jobs: Vec<Job> = Vec::new();
    for job_config in &config.jobs {
        let challenge_id = snapshot
            .names
            .challenge_id(&job_config.challenge)
            .ok_or_else(|| ScheduleError::UnknownChallenge(job_config.challenge.clone()))?;
        let algorithm_id = snapshot
            .names
            .algorithm_id(challenge_id, &job_config.algorithm)
            .ok_or_else(|| ScheduleError::UnknownAlgorithm {
                challenge: job_config.challenge.clone(),
                algorithm: job_config.algorithm.clone(),
            })?;
        let download_url = snapshot
            .wasms
            .get(algorithm_id)
            .and_then(|wasm| wasm.details.download_url.clone())
            .ok_or_else(|| ScheduleError::MissingDownloadUrl(algorithm_id.to_string()))?;

        let target = effective_num_jobs(job_config, challenge_id, calibration, auto_calibrate);
        let current = in_flight
            .get(&(job_config.challenge.clone(), job_config.algorithm.clone()))
            .copied()
            .unwrap_or(0);
        if current >= target {
            continue;
        }

        let weight = effective_weight(job_config, challenge_id, calibration, auto_calibrate);
        let duration = effective_duration(job_config, challenge_id, calibration, auto_calibrate);

        let challenge = snapshot
            .challenges
            .get(challenge_id)
            .ok_or_else(|| ScheduleError::UnknownChallenge(job_config.challenge.clone()))?;
        let block_data = challenge
            .block_data
            .as_ref()
            .ok_or_else(|| ScheduleError::NoQualifiers(job_config.challenge.clone()))?;

        let timestamps = Timestamps {
            start: now,
            end: now + duration,
            submit: now + duration + job_config.wait_duration_ms,
        };

        for _ in 0..(target - current) {
            let difficulty =
                selector.select(challenge_id, &block_data.qualifier_difficulties, now, rng)?;
            let benchmark_id =
                new_benchmark_id(&job_config.challenge, &job_config.algorithm, difficulty, now);
            info!("job {} created with weight {}", benchmark_id, weight);

            new_jobs.push(Job {
                benchmark_id,
                download_url: download_url.clone(),
                settings: BenchmarkSettings {
                    algorithm_id: algorithm_id.to_string(),
                    challenge_id: challenge_id.to_string(),
                    difficulty,
                    player_id: config.player_id.clone(),
                    block_id: snapshot.block.id.clone(),
                },
                solution_signature_threshold: block_data.solution_signature_threshold,
                wasm_vm_config: snapshot.block.config.wasm_vm.clone(),
                weight,
                timestamps,
                solutions_data: HashMap::new(),
            });
        }
    }

    let created = new_jobs.len();
    for job in new_jobs {
        store.available.insert(job.benchmark_id.clone(), job);
    }

    Ok(ReconcileOutcome {
        expired: expired.len(),
        created,
    })
}

/// Count available jobs per (challenge name, algorithm name).
///
/// A job whose ids no longer resolve against the current snapshot fails the
/// iteration: the snapshot and the store have diverged and scheduling on top
/// of that would miscount.
fn count_by_pair(
    store: &JobStore,
    snapshot: &Snapshot,
) -> Result<HashMap<(String, String), u32>, ScheduleError> {
    let mut counts: HashMap<(String, String), u32> = HashMap::new();
    for job in store.available.values() {
        let challenge_name = snapshot
            .names
            .challenge_name(&job.settings.challenge_id)
            .ok_or_else(|| ScheduleError::StaleJob(job.benchmark_id.clone()))?;
        let algorithm_name = snapshot
            .names
            .algorithm_name(&job.settings.algorithm_id)
            .ok_or_else(|| ScheduleError::StaleJob(job.benchmark_id.clone()))?;
        *counts
            .entry((challenge_name.to_string(), algorithm_name.to_string()))
            .or_insert(0) += 1;
    }
    Ok(counts)
}

/// Calibration weight when auto-calibration is on, configured weight
/// otherwise.
fn effective_weight(
    job_config: &JobConfig,
    challenge_id: &str,
    calibration: &CalibrationWeights,
    auto_calibrate: bool,
) -> u32 {
    if auto_calibrate {
        calibration.weight(challenge_id)
    } else {
        job_config.weight
    }
}

/// Count/duration scaling applies only to the max-weight challenge, and only
/// while its weight exceeds 1.
fn scaling_applies(challenge_id: &str, calibration: &CalibrationWeights) -> bool {
    calibration.max_weight_challenge_id.as_deref() == Some(challenge_id)
        && calibration.weight(challenge_id) > 1
}

fn effective_num_jobs(
    job_config: &JobConfig,
    challenge_id: &str,
    calibration: &CalibrationWeights,
    auto_calibrate: bool,
) -> u32 {
    if auto_calibrate && scaling_applies(challenge_id, calibration) {
        ((job_config.num_jobs as f64 * job_config.num_jobs_factor).round() as u32).max(1)
    } else {
        job_config.num_jobs
    }
}

fn effective_duration(
    job_config: &JobConfig,
    challenge_id: &str,
    calibration: &CalibrationWeights,
    auto_calibrate: bool,
) -> u64 {
    if auto_calibrate && scaling_applies(challenge_id, calibration) {
        ((job_config.benchmark_duration_ms as f64 * job_config.duration_factor).round() as u64)
            .max(1)
    } else {
        job_config.benchmark_duration_ms
    }
}

/// Benchmark id encoding challenge, algorithm, difficulty and creation time,
/// plus a random suffix so ids stay unique when several jobs for the same
/// pair and difficulty are created in one tick.
fn new_benchmark_id(
    challenge_name: &str,
    algorithm_name: &str,
    difficulty: Difficulty,
    now: u64,
) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}_{}_{}",
        challenge_name,
        algorithm_name,
        difficulty[0],
        difficulty[1],
        now,
        &suffix[..8]
    )
}
