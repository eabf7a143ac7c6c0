//! Reconcile-loop tests over a fixture snapshot.
//!
//! These drive the scheduler's synchronous reconcile pass directly with a
//! fixed clock and seeded rng, the same way the loop runs it under the
//! job-store write lock.

use fleet_benchmarker::calibration::ChallengeCalibrator;
use fleet_benchmarker::config::{JobConfig, MasterConfig};
use fleet_benchmarker::difficulty::DifficultySelector;
use fleet_benchmarker::error::ScheduleError;
use fleet_benchmarker::model::{
    Algorithm, AlgorithmDetails, Benchmark, BenchmarkDetails, BenchmarkSettings, Block,
    BlockConfig, BlockDetails, Challenge, ChallengeBlockData, ChallengeDetails, DifficultyConfig,
    DifficultyParameter, NameIndex, SolutionData, Snapshot, Wasm, WasmDetails,
};
use fleet_benchmarker::scheduler::reconcile;
use fleet_benchmarker::state::JobStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

const NOW: u64 = 1_700_000_000_000;

// ============================================================================
// FIXTURES
// ============================================================================

/// Snapshot with two challenges, one algorithm each, and the given
/// per-challenge benchmark solution counts.
fn fixture_snapshot(benchmark_solutions: &[(&str, u64)]) -> Snapshot {
    let challenges: HashMap<String, Challenge> = [
        ("c001", "satisfiability", vec![[50, 300], [55, 310], [60, 320]]),
        ("c002", "vehicle_routing", vec![[40, 0], [45, 5]]),
    ]
    .into_iter()
    .map(|(id, name, qualifiers)| {
        (
            id.to_string(),
            Challenge {
                id: id.to_string(),
                details: ChallengeDetails {
                    name: name.to_string(),
                },
                block_data: Some(ChallengeBlockData {
                    solution_signature_threshold: 5_000,
                    qualifier_difficulties: qualifiers,
                }),
            },
        )
    })
    .collect();

    let algorithms: HashMap<String, Algorithm> = [
        ("c001_a001", "sprint_sat", "c001"),
        ("c002_a001", "clarke_wright", "c002"),
    ]
    .into_iter()
    .map(|(id, name, challenge_id)| {
        (
            id.to_string(),
            Algorithm {
                id: id.to_string(),
                details: AlgorithmDetails {
                    name: name.to_string(),
                    challenge_id: challenge_id.to_string(),
                },
            },
        )
    })
    .collect();

    let wasms: HashMap<String, Wasm> = algorithms
        .keys()
        .map(|id| {
            (
                id.clone(),
                Wasm {
                    algorithm_id: id.clone(),
                    details: WasmDetails {
                        download_url: Some(format!("https://wasms.example.net/{id}.wasm")),
                    },
                },
            )
        })
        .collect();

    let benchmarks: HashMap<String, Benchmark> = benchmark_solutions
        .iter()
        .enumerate()
        .map(|(i, (challenge_id, num_solutions))| {
            let id = format!("bench_{i}");
            (
                id.clone(),
                Benchmark {
                    id,
                    settings: BenchmarkSettings {
                        algorithm_id: format!("{challenge_id}_a001"),
                        challenge_id: challenge_id.to_string(),
                        difficulty: [50, 300],
                        player_id: "0xplayer".to_string(),
                        block_id: "block_1".to_string(),
                    },
                    details: BenchmarkDetails {
                        num_solutions: *num_solutions,
                    },
                },
            )
        })
        .collect();

    let names = NameIndex::build(&challenges, &algorithms);
    Snapshot {
        block: Block {
            id: "block_1".to_string(),
            details: BlockDetails {
                height: 100,
                round: 10,
            },
            config: BlockConfig {
                difficulty: DifficultyConfig {
                    parameters: challenges
                        .keys()
                        .map(|id| {
                            (
                                id.clone(),
                                vec![
                                    DifficultyParameter {
                                        name: "p0".to_string(),
                                        min_value: 40,
                                        max_value: 100,
                                    },
                                    DifficultyParameter {
                                        name: "p1".to_string(),
                                        min_value: 0,
                                        max_value: 400,
                                    },
                                ],
                            )
                        })
                        .collect(),
                },
                wasm_vm: serde_json::json!({"max_fuel": 1_000_000}),
            },
        },
        challenges,
        algorithms,
        wasms,
        player: None,
        benchmarks,
        proofs: HashMap::new(),
        frauds: HashMap::new(),
        names,
    }
}

fn pair(challenge: &str, algorithm: &str, num_jobs: u32) -> JobConfig {
    JobConfig {
        challenge: challenge.to_string(),
        algorithm: algorithm.to_string(),
        num_jobs,
        weight: 3,
        benchmark_duration_ms: 15_000,
        wait_duration_ms: 5_000,
        num_jobs_factor: 2.0,
        duration_factor: 1.5,
    }
}

fn fixture_config(auto_calibrate: bool, jobs: Vec<JobConfig>) -> MasterConfig {
    let mut config = MasterConfig {
        api_url: "https://api.example.net".to_string(),
        player_id: "0xplayer".to_string(),
        dispatch: Default::default(),
        scheduler: Default::default(),
        fetcher: Default::default(),
        jobs,
    };
    config.scheduler.auto_calibrate_challenges = auto_calibrate;
    config.scheduler.difficulty_optimization = false;
    config
}

struct Harness {
    calibrator: ChallengeCalibrator,
    selector: DifficultySelector,
    rng: StdRng,
}

impl Harness {
    fn new() -> Self {
        Self {
            calibrator: ChallengeCalibrator::new(),
            selector: DifficultySelector::new(false, 600_000, NOW),
            rng: StdRng::seed_from_u64(7),
        }
    }

    fn reconcile(
        &mut self,
        config: &MasterConfig,
        snapshot: &Snapshot,
        store: &mut JobStore,
        now: u64,
    ) -> Result<fleet_benchmarker::scheduler::ReconcileOutcome, ScheduleError> {
        reconcile(
            config,
            snapshot,
            store,
            &mut self.calibrator,
            &mut self.selector,
            now,
            &mut self.rng,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn fills_configured_targets_and_stops() {
    let snapshot = fixture_snapshot(&[]);
    let config = fixture_config(
        false,
        vec![
            pair("satisfiability", "sprint_sat", 2),
            pair("vehicle_routing", "clarke_wright", 1),
        ],
    );
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    let outcome = harness.reconcile(&config, &snapshot, &mut store, NOW).unwrap();
    assert_eq!(outcome.created, 3);
    assert_eq!(store.available.len(), 3);

    // Every created job is fully populated from the snapshot.
    let sat_jobs: Vec<_> = store
        .available
        .values()
        .filter(|job| job.settings.challenge_id == "c001")
        .collect();
    assert_eq!(sat_jobs.len(), 2);
    for job in sat_jobs {
        assert_eq!(job.settings.algorithm_id, "c001_a001");
        assert_eq!(job.settings.block_id, "block_1");
        assert_eq!(job.settings.player_id, "0xplayer");
        assert_eq!(job.solution_signature_threshold, 5_000);
        assert_eq!(job.weight, 3, "configured weight without auto-calibration");
        assert_eq!(
            job.download_url,
            "https://wasms.example.net/c001_a001.wasm"
        );
        assert_eq!(job.wasm_vm_config["max_fuel"], 1_000_000);
        assert_eq!(job.timestamps.start, NOW);
        assert_eq!(job.timestamps.end, NOW + 15_000);
        assert_eq!(job.timestamps.submit, NOW + 20_000);
        assert!(job.solutions_data.is_empty());
        let challenge = &snapshot.challenges["c001"];
        assert!(challenge
            .block_data
            .as_ref()
            .unwrap()
            .qualifier_difficulties
            .contains(&job.settings.difficulty));
    }

    // Already at target: the next pass creates nothing.
    let outcome = harness
        .reconcile(&config, &snapshot, &mut store, NOW + 1_000)
        .unwrap();
    assert_eq!(outcome.created, 0);
    assert_eq!(store.available.len(), 3);
}

#[test]
fn expired_jobs_hand_off_and_get_replaced() {
    let snapshot = fixture_snapshot(&[]);
    let config = fixture_config(false, vec![pair("satisfiability", "sprint_sat", 2)]);
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    harness.reconcile(&config, &snapshot, &mut store, NOW).unwrap();
    let first_ids: Vec<String> = store.available.keys().cloned().collect();

    // A worker got some solutions in before the window closed.
    let some_id = first_ids[0].clone();
    store
        .available
        .get_mut(&some_id)
        .unwrap()
        .solutions_data
        .insert(
            1,
            SolutionData {
                nonce: 1,
                runtime_signature: 11,
                fuel_consumed: 12,
                solution: serde_json::json!({}),
            },
        );

    // Past the run window: both jobs expire and both get replaced.
    let later = NOW + 15_000;
    let outcome = harness
        .reconcile(&config, &snapshot, &mut store, later)
        .unwrap();
    assert_eq!(outcome.expired, 2);
    assert_eq!(outcome.created, 2);

    for id in &first_ids {
        assert!(!store.available.contains_key(id), "expired id left available");
        assert!(store.pending_benchmark.contains_key(id));
    }
    assert_eq!(
        store.pending_benchmark[&some_id].solutions_data.len(),
        1,
        "solutions survive the transition"
    );

    // Replacements are fresh ids with the later window.
    for job in store.available.values() {
        assert!(!first_ids.contains(&job.benchmark_id));
        assert_eq!(job.timestamps.start, later);
    }
}

#[test]
fn unknown_algorithm_fails_the_whole_iteration() {
    let snapshot = fixture_snapshot(&[]);
    // A healthy pair first, then a misconfigured one: nothing may be created.
    let config = fixture_config(
        false,
        vec![
            pair("satisfiability", "sprint_sat", 2),
            pair("vehicle_routing", "no_such_algorithm", 1),
        ],
    );
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    let err = harness
        .reconcile(&config, &snapshot, &mut store, NOW)
        .unwrap_err();
    assert!(matches!(err, ScheduleError::UnknownAlgorithm { .. }));
    assert!(
        store.available.is_empty(),
        "a failed iteration must not partially create jobs"
    );
}

#[test]
fn unknown_challenge_fails_the_whole_iteration() {
    let snapshot = fixture_snapshot(&[]);
    let config = fixture_config(false, vec![pair("no_such_challenge", "sprint_sat", 1)]);
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    let err = harness
        .reconcile(&config, &snapshot, &mut store, NOW)
        .unwrap_err();
    assert!(matches!(err, ScheduleError::UnknownChallenge(_)));
}

#[test]
fn missing_download_url_fails_the_whole_iteration() {
    let mut snapshot = fixture_snapshot(&[]);
    snapshot.wasms.get_mut("c001_a001").unwrap().details.download_url = None;
    let config = fixture_config(false, vec![pair("satisfiability", "sprint_sat", 1)]);
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    let err = harness
        .reconcile(&config, &snapshot, &mut store, NOW)
        .unwrap_err();
    assert!(matches!(err, ScheduleError::MissingDownloadUrl(_)));
    assert!(store.available.is_empty());
}

#[test]
fn ids_stay_unique_for_identical_jobs_in_one_tick() {
    let mut snapshot = fixture_snapshot(&[]);
    // Exactly one qualifying difficulty: all three jobs share (pair,
    // difficulty, timestamp) and must still get distinct ids.
    snapshot
        .challenges
        .get_mut("c001")
        .unwrap()
        .block_data
        .as_mut()
        .unwrap()
        .qualifier_difficulties = vec![[50, 300]];
    let config = fixture_config(false, vec![pair("satisfiability", "sprint_sat", 3)]);
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    let outcome = harness.reconcile(&config, &snapshot, &mut store, NOW).unwrap();
    assert_eq!(outcome.created, 3);
    assert_eq!(store.available.len(), 3, "identical jobs collapsed into one id");
}

#[test]
fn scaling_applies_only_to_the_max_weight_challenge() {
    // c002 dominates (90 of 100), so it is suppressed to weight 0 and c001
    // becomes the max-weight challenge with weight 8.
    let snapshot = fixture_snapshot(&[("c001", 10), ("c002", 90)]);
    let config = fixture_config(
        true,
        vec![
            pair("satisfiability", "sprint_sat", 2),
            pair("vehicle_routing", "clarke_wright", 2),
        ],
    );
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    harness.reconcile(&config, &snapshot, &mut store, NOW).unwrap();

    let sat_jobs: Vec<_> = store
        .available
        .values()
        .filter(|job| job.settings.challenge_id == "c001")
        .collect();
    let routing_jobs: Vec<_> = store
        .available
        .values()
        .filter(|job| job.settings.challenge_id == "c002")
        .collect();

    // Max-weight pair: count and duration scaled by the configured factors.
    assert_eq!(sat_jobs.len(), 4, "num_jobs 2 x factor 2.0");
    for job in &sat_jobs {
        assert_eq!(job.weight, 8, "calibration weight overrides configured");
        assert_eq!(job.timestamps.end - job.timestamps.start, 22_500);
    }

    // Same configuration on the other challenge: base values.
    assert_eq!(routing_jobs.len(), 2);
    for job in &routing_jobs {
        assert_eq!(job.weight, 0, "suppressed dominant challenge");
        assert_eq!(job.timestamps.end - job.timestamps.start, 15_000);
    }
}

#[test]
fn no_observed_solutions_schedules_at_base_with_zero_weights() {
    let snapshot = fixture_snapshot(&[]);
    let config = fixture_config(true, vec![pair("satisfiability", "sprint_sat", 2)]);
    let mut store = JobStore::default();
    let mut harness = Harness::new();

    harness.reconcile(&config, &snapshot, &mut store, NOW).unwrap();

    assert_eq!(store.available.len(), 2, "base target without a max-weight challenge");
    for job in store.available.values() {
        assert_eq!(job.weight, 0, "no benchmarks yet means zero weights");
        assert_eq!(job.timestamps.end - job.timestamps.start, 15_000);
    }
}
