//! Difficulty Sampling & Selection
//!
//! Two pieces live here:
//! - [`DifficultySampler`]: the per-challenge model fed by worker
//!   submissions. It tracks, per qualifying difficulty point, how many
//!   submission calls and solutions were observed. It is rebuilt when new
//!   block data lands for its challenge and mutated incrementally on every
//!   submission. Selection does not read it yet; its read surface exists for
//!   inspection and tests.
//! - [`DifficultySelector`]: the policy that picks the difficulty for each
//!   new job — either a uniform draw over the qualifying set, or (in
//!   optimization mode) a draw concentrated on the interquartile band of the
//!   per-point ratios, periodically re-anchored by a draw from the full set.

use crate::error::ScheduleError;
use crate::model::Difficulty;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

// ============================================================================
// SAMPLER
// ============================================================================

/// Observed outcomes for one difficulty point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointStats {
    /// Number of submission calls that landed on this point.
    pub num_submissions: u64,
    /// Total solutions reported across those calls.
    pub num_solutions: u64,
}

/// Per-challenge adaptive model of solution yield across difficulty points.
#[derive(Debug, Clone, Default)]
pub struct DifficultySampler {
    min_difficulty: Vec<i32>,
    stats: HashMap<Difficulty, PointStats>,
}

impl DifficultySampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refit the model to a new block: adopt the new minimum-difficulty
    /// vector and qualifying set. Counters for points that still qualify are
    /// kept; points that dropped out of the set are forgotten.
    pub fn update_with_block_data(
        &mut self,
        min_difficulty: Vec<i32>,
        qualifier_difficulties: &[Difficulty],
    ) {
        let mut next = HashMap::with_capacity(qualifier_difficulties.len());
        for &difficulty in qualifier_difficulties {
            let carried = self.stats.get(&difficulty).copied().unwrap_or_default();
            next.insert(difficulty, carried);
        }
        self.stats = next;
        self.min_difficulty = min_difficulty;
    }

    /// Record one submission call: `num_solutions` solutions arrived for
    /// `difficulty` in this call (not a cumulative total).
    pub fn update_with_solutions(&mut self, difficulty: Difficulty, num_solutions: u64) {
        let stats = self.stats.entry(difficulty).or_default();
        stats.num_submissions += 1;
        stats.num_solutions += num_solutions;
    }

    pub fn min_difficulty(&self) -> &[i32] {
        &self.min_difficulty
    }

    pub fn stats(&self, difficulty: Difficulty) -> Option<PointStats> {
        self.stats.get(&difficulty).copied()
    }

    /// Mean solutions per submission call at a point, if it has been sampled.
    pub fn solution_rate(&self, difficulty: Difficulty) -> Option<f64> {
        self.stats
            .get(&difficulty)
            .filter(|stats| stats.num_submissions > 0)
            .map(|stats| stats.num_solutions as f64 / stats.num_submissions as f64)
    }
}

// ============================================================================
// SELECTION POLICY
// ============================================================================

/// Difficulty-selection policy for new jobs.
///
/// The last-regular-draw timestamp is process-wide (shared across all
/// challenges) and owned here rather than in module state, so independent
/// schedulers do not interfere.
#[derive(Debug)]
pub struct DifficultySelector {
    optimization_enabled: bool,
    regular_draw_period_ms: u64,
    last_regular_draw_ms: u64,
}

impl DifficultySelector {
    pub fn new(optimization_enabled: bool, regular_draw_period_ms: u64, now_ms: u64) -> Self {
        Self {
            optimization_enabled,
            regular_draw_period_ms,
            last_regular_draw_ms: now_ms,
        }
    }

    /// Pick a difficulty for one new job on `challenge_id`.
    ///
    /// Optimization mode draws from the interquartile band of the per-point
    /// ratios; every `regular_draw_period_ms` it re-anchors with one draw
    /// from the full qualifying set. An empty band (possible with very few
    /// distinct ratios) is an error that fails the scheduling iteration.
    pub fn select<R: Rng>(
        &mut self,
        challenge_id: &str,
        qualifier_difficulties: &[Difficulty],
        now_ms: u64,
        rng: &mut R,
    ) -> Result<Difficulty, ScheduleError> {
        if qualifier_difficulties.is_empty() {
            return Err(ScheduleError::NoQualifiers(challenge_id.to_string()));
        }

        if !self.optimization_enabled {
            return uniform_draw(challenge_id, qualifier_difficulties, rng);
        }

        if now_ms.saturating_sub(self.last_regular_draw_ms) >= self.regular_draw_period_ms {
            self.last_regular_draw_ms = now_ms;
            return uniform_draw(challenge_id, qualifier_difficulties, rng);
        }

        let ratios: Vec<f64> = qualifier_difficulties
            .iter()
            .map(difficulty_ratio)
            .collect();
        let mut sorted = ratios.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        let q1 = percentile(&sorted, 25.0);
        let q3 = percentile(&sorted, 75.0);

        let band: Vec<Difficulty> = qualifier_difficulties
            .iter()
            .zip(&ratios)
            .filter(|(_, &ratio)| q1 <= ratio && ratio <= q3)
            .map(|(&difficulty, _)| difficulty)
            .collect();

        band.choose(rng)
            .copied()
            .ok_or_else(|| ScheduleError::EmptyDifficultyBand(challenge_id.to_string()))
    }
}

fn uniform_draw<R: Rng>(
    challenge_id: &str,
    qualifier_difficulties: &[Difficulty],
    rng: &mut R,
) -> Result<Difficulty, ScheduleError> {
    qualifier_difficulties
        .choose(rng)
        .copied()
        .ok_or_else(|| ScheduleError::NoQualifiers(challenge_id.to_string()))
}

/// Ratio of the two difficulty components; a zero denominator counts as
/// infinitely skewed rather than an error.
fn difficulty_ratio(difficulty: &Difficulty) -> f64 {
    if difficulty[1] == 0 {
        f64::INFINITY
    } else {
        difficulty[0] as f64 / difficulty[1] as f64
    }
}

/// Percentile with linear interpolation between closest ranks, over an
/// already sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    // Interpolating between equal (possibly infinite) bounds must not NaN.
    if lower == upper || sorted[lower] == sorted[upper] {
        return sorted[lower];
    }
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}
