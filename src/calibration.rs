//! Challenge Weight Calibration
//!
//! Shifts benchmarking effort toward challenges that are under-producing
//! solutions relative to the others, while damping runaway favoritism toward
//! challenges that already dominate:
//! - Inverse-proportional raw weights from observed solution counts
//! - Normalization so the least-starved challenge lands on weight 1
//! - Dominance suppression once one challenge's share of solutions exceeds
//!   the runner-up's by more than 20 percentage points
//! - Maximally-starved boost for challenges with no observed solutions at all
//!   (an unsampled challenge is starved, not unneeded)
//!
//! Weights derive purely from snapshot state, so they are cached per block id
//! and recomputed only when a new block lands.

use crate::model::Snapshot;
use std::collections::HashMap;
use tracing::debug;

/// Share gap beyond which the single dominant challenge is suppressed.
const DOMINANCE_GAP: f64 = 0.20;

/// Offset on the solution proportion; guards division by zero and bounds the
/// maximum raw weight at `1 / OFFSET`.
const PROPORTION_OFFSET: f64 = 0.01;

/// Per-block calibration result.
#[derive(Debug, Clone, Default)]
pub struct CalibrationWeights {
    /// Final integer weight per challenge id.
    pub weights: HashMap<String, u32>,
    /// The challenge eligible for count/duration scaling this block, if any.
    pub max_weight_challenge_id: Option<String>,
}

impl CalibrationWeights {
    /// Weight for a challenge, defaulting to 1 for unknown ids.
    pub fn weight(&self, challenge_id: &str) -> u32 {
        self.weights.get(challenge_id).copied().unwrap_or(1)
    }
}

/// Calibration cache owned by the scheduler.
///
/// Holding the cache in a struct (instead of module state) keeps multiple
/// scheduler instances independent, e.g. in tests.
pub struct ChallengeCalibrator {
    cached_block_id: Option<String>,
    cached: CalibrationWeights,
}

impl ChallengeCalibrator {
    pub fn new() -> Self {
        Self {
            cached_block_id: None,
            cached: CalibrationWeights::default(),
        }
    }

    /// Current per-challenge weight table, recomputed only when the
    /// snapshot's block id differs from the cached one.
    pub fn calibrate(&mut self, snapshot: &Snapshot, auto_calibrate: bool) -> &CalibrationWeights {
        if self.cached_block_id.as_deref() == Some(snapshot.block.id.as_str()) {
            return &self.cached;
        }

        let solutions = solutions_by_challenge(snapshot);
        self.cached = compute_weights(
            snapshot.challenges.keys().cloned(),
            &solutions,
            auto_calibrate,
        );
        self.cached_block_id = Some(snapshot.block.id.clone());

        debug!(
            block_id = %snapshot.block.id,
            max_weight_challenge = ?self.cached.max_weight_challenge_id,
            "recalibrated challenge weights: {:?}",
            self.cached.weights
        );
        &self.cached
    }
}

impl Default for ChallengeCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Total solutions found per challenge across all benchmarks in the snapshot.
///
/// Challenges with no benchmarks get no entry; that absence is what routes
/// them into the maximally-starved boost below.
fn solutions_by_challenge(snapshot: &Snapshot) -> HashMap<String, u64> {
    let mut totals: HashMap<String, u64> = HashMap::new();
    for benchmark in snapshot.benchmarks.values() {
        *totals
            .entry(benchmark.settings.challenge_id.clone())
            .or_insert(0) += benchmark.details.num_solutions;
    }
    totals
}

fn compute_weights(
    challenge_ids: impl Iterator<Item = String>,
    solutions: &HashMap<String, u64>,
    auto_calibrate: bool,
) -> CalibrationWeights {
    let mut weights: HashMap<String, u32> = challenge_ids.map(|id| (id, 0)).collect();

    if !auto_calibrate {
        for weight in weights.values_mut() {
            *weight = 1;
        }
        return CalibrationWeights {
            weights,
            max_weight_challenge_id: None,
        };
    }

    let total: u64 = solutions.values().sum();
    if total == 0 {
        // Nothing observed yet: keep the zero table until benchmarks land.
        return CalibrationWeights {
            weights,
            max_weight_challenge_id: None,
        };
    }

    let raw: HashMap<&String, f64> = solutions
        .iter()
        .map(|(id, &count)| {
            let proportion = count as f64 / total as f64;
            (id, 1.0 / (proportion + PROPORTION_OFFSET))
        })
        .collect();
    let min_raw = raw.values().fold(f64::INFINITY, |min, &w| min.min(w));
    for (id, &weight) in &raw {
        weights.insert((*id).clone(), (weight / min_raw).round() as u32);
    }

    // Dominance suppression: a single clear leader gets minimum priority.
    let max_solutions = solutions.values().copied().max().unwrap_or(0);
    let mut counts: Vec<u64> = solutions.values().copied().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let second_max = counts.get(1).copied().unwrap_or(0);
    let leaders: Vec<&String> = solutions
        .iter()
        .filter(|(_, &count)| count == max_solutions)
        .map(|(id, _)| id)
        .collect();

    let share_gap = (max_solutions as f64 - second_max as f64) / total as f64;
    let suppressed = if leaders.len() == 1 && share_gap > DOMINANCE_GAP {
        let leader = leaders[0].clone();
        weights.insert(leader.clone(), 0);
        Some(leader)
    } else {
        None
    };

    // Unsampled challenges are the most starved, not the least.
    let max_weight = weights.values().copied().max().unwrap_or(0);
    for (id, weight) in weights.iter_mut() {
        if *weight == 0 && suppressed.as_deref() != Some(id.as_str()) {
            *weight = max_weight * 2;
        }
    }

    // Ties broken toward the smallest id so the choice is deterministic.
    let max_weight_challenge_id = weights
        .iter()
        .max_by(|(id_a, w_a), (id_b, w_b)| w_a.cmp(w_b).then_with(|| id_b.cmp(id_a)))
        .map(|(id, _)| id.clone());

    CalibrationWeights {
        weights,
        max_weight_challenge_id,
    }
}
