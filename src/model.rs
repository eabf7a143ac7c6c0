//! Network data model shared by the fetcher, scheduler and dispatch server.
//!
//! The read-only side (everything under [`Snapshot`]) mirrors the records
//! served by the network API and is replaced wholesale whenever a new block
//! lands. The mutable side is [`Job`]: the unit of schedulable work handed to
//! workers, whose `solutions_data` is the only field that changes after
//! creation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A difficulty point: the pair of numeric parameters defining how hard one
/// instance of a challenge is.
pub type Difficulty = [i32; 2];

// ============================================================================
// BLOCK
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub details: BlockDetails,
    pub config: BlockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDetails {
    pub height: u64,
    #[serde(default)]
    pub round: u64,
}

/// The slice of the block's protocol config this node consumes.
///
/// `wasm_vm` is deliberately untyped: it is copied verbatim into every job
/// for workers to interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    pub difficulty: DifficultyConfig,
    pub wasm_vm: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyConfig {
    /// Per-challenge difficulty parameter ranges, keyed by challenge id.
    pub parameters: HashMap<String, Vec<DifficultyParameter>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyParameter {
    pub name: String,
    pub min_value: i32,
    pub max_value: i32,
}

// ============================================================================
// CHALLENGES & ALGORITHMS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub details: ChallengeDetails,
    /// Present only for challenges active in the fetched block.
    pub block_data: Option<ChallengeBlockData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDetails {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeBlockData {
    pub solution_signature_threshold: u32,
    /// The difficulty points the network currently accepts for benchmarking.
    pub qualifier_difficulties: Vec<Difficulty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Algorithm {
    pub id: String,
    pub details: AlgorithmDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmDetails {
    pub name: String,
    pub challenge_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wasm {
    pub algorithm_id: String,
    pub details: WasmDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasmDetails {
    pub download_url: Option<String>,
}

// ============================================================================
// PLAYER & PIPELINE RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub details: PlayerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDetails {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: String,
    pub settings: BenchmarkSettings,
    pub details: BenchmarkDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkDetails {
    pub num_solutions: u64,
}

/// Network record that a benchmark's solutions were accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub benchmark_id: String,
}

/// Network record that a benchmark's solutions were rejected as fraudulent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fraud {
    pub benchmark_id: String,
}

// ============================================================================
// JOBS
// ============================================================================

/// Immutable parameters of one benchmark, fixed at job creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSettings {
    pub algorithm_id: String,
    pub challenge_id: String,
    pub difficulty: Difficulty,
    pub player_id: String,
    pub block_id: String,
}

/// Job window in unix milliseconds: run from `start` until `end`, submit the
/// collected solutions to the network by `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub start: u64,
    pub end: u64,
    pub submit: u64,
}

/// One candidate solution computed by a worker for a single nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionData {
    pub nonce: u64,
    pub runtime_signature: u64,
    pub fuel_consumed: u64,
    pub solution: serde_json::Value,
}

/// One scheduled unit of work: run an algorithm on a challenge at a fixed
/// difficulty for a bounded time window, collecting solutions from workers.
///
/// `benchmark_id`, `settings` and `timestamps` never change after creation;
/// only `solutions_data` is appended to by worker submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub benchmark_id: String,
    pub download_url: String,
    pub settings: BenchmarkSettings,
    pub solution_signature_threshold: u32,
    pub wasm_vm_config: serde_json::Value,
    pub weight: u32,
    pub timestamps: Timestamps,
    pub solutions_data: HashMap<u64, SolutionData>,
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable view of the network at one block.
///
/// Published by the fetcher only when the block id changes; consumers hold an
/// `Arc` and never observe a partially updated snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub block: Block,
    pub challenges: HashMap<String, Challenge>,
    pub algorithms: HashMap<String, Algorithm>,
    pub wasms: HashMap<String, Wasm>,
    pub player: Option<Player>,
    pub benchmarks: HashMap<String, Benchmark>,
    pub proofs: HashMap<String, Proof>,
    pub frauds: HashMap<String, Fraud>,
    pub names: NameIndex,
}

/// One-directional name/id lookup tables, built once per snapshot.
///
/// Algorithm names are only unique within a challenge, so the name→id table
/// is keyed by (challenge id, algorithm name).
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    challenge_name_by_id: HashMap<String, String>,
    challenge_id_by_name: HashMap<String, String>,
    algorithm_name_by_id: HashMap<String, String>,
    algorithm_id_by_name: HashMap<(String, String), String>,
}

impl NameIndex {
    pub fn build(
        challenges: &HashMap<String, Challenge>,
        algorithms: &HashMap<String, Algorithm>,
    ) -> Self {
        let mut index = Self::default();
        for c in challenges.values() {
            index
                .challenge_name_by_id
                .insert(c.id.clone(), c.details.name.clone());
            index
                .challenge_id_by_name
                .insert(c.details.name.clone(), c.id.clone());
        }
        for a in algorithms.values() {
            index
                .algorithm_name_by_id
                .insert(a.id.clone(), a.details.name.clone());
            index.algorithm_id_by_name.insert(
                (a.details.challenge_id.clone(), a.details.name.clone()),
                a.id.clone(),
            );
        }
        index
    }

    pub fn challenge_name(&self, challenge_id: &str) -> Option<&str> {
        self.challenge_name_by_id.get(challenge_id).map(String::as_str)
    }

    pub fn challenge_id(&self, challenge_name: &str) -> Option<&str> {
        self.challenge_id_by_name.get(challenge_name).map(String::as_str)
    }

    pub fn algorithm_name(&self, algorithm_id: &str) -> Option<&str> {
        self.algorithm_name_by_id.get(algorithm_id).map(String::as_str)
    }

    pub fn algorithm_id(&self, challenge_id: &str, algorithm_name: &str) -> Option<&str> {
        self.algorithm_id_by_name
            .get(&(challenge_id.to_string(), algorithm_name.to_string()))
            .map(String::as_str)
    }
}

/// Current unix time in milliseconds, the clock used for all job timestamps.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
