//! Shared in-memory state of the master process.
//!
//! One [`MasterState`] is shared by the scheduler loop, the snapshot fetcher
//! and every dispatch request handler. Each piece of state sits behind its
//! own `tokio::sync::RwLock` and no guard is ever held across an await
//! point, so every synchronous section is atomic with respect to the other
//! tasks.

use crate::difficulty::DifficultySampler;
use crate::model::{Job, Snapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide state shared between the scheduler, fetcher and dispatch
/// server.
pub struct MasterState {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    pub jobs: RwLock<JobStore>,
    pub samplers: RwLock<HashMap<String, DifficultySampler>>,
}

impl MasterState {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            jobs: RwLock::new(JobStore::default()),
            samplers: RwLock::new(HashMap::new()),
        }
    }

    /// Current network snapshot, if one has been published yet.
    pub async fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().await.clone()
    }

    /// Replace the snapshot wholesale. Callers only publish when the block
    /// id changed; readers holding the previous `Arc` are unaffected.
    pub async fn publish_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = Some(Arc::new(snapshot));
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self::new()
    }
}

/// All jobs known to the process, partitioned by lifecycle stage.
///
/// A benchmark id lives in exactly one of the three maps at any time:
/// `available` (workers should fetch and run it), `pending_benchmark` (run
/// window over, awaiting benchmark submission) or `pending_proof` (awaiting
/// proof submission). The scheduler owns the first transition; downstream
/// submitters own the rest and record finished ids in `submitted_proof_ids`.
#[derive(Debug, Default)]
pub struct JobStore {
    pub available: HashMap<String, Job>,
    pub pending_benchmark: HashMap<String, Job>,
    pub pending_proof: HashMap<String, Job>,
    pub submitted_proof_ids: HashSet<String>,
}

impl JobStore {
    /// Move every available job whose run window has ended into
    /// `pending_benchmark`, identity and collected solutions preserved.
    /// Returns the moved ids. This is the sole transition out of `available`.
    pub fn expire_finished(&mut self, now: u64) -> Vec<String> {
        let finished: Vec<String> = self
            .available
            .iter()
            .filter(|(_, job)| now >= job.timestamps.end)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &finished {
            if let Some(job) = self.available.remove(id) {
                self.pending_benchmark.insert(id.clone(), job);
            }
        }
        finished
    }

    /// Look up a job that workers may still submit solutions for.
    ///
    /// Covers both `available` and `pending_benchmark`: a worker may race
    /// past the expiry transition and its solutions are still wanted.
    pub fn live_job_mut(&mut self, benchmark_id: &str) -> Option<&mut Job> {
        if self.available.contains_key(benchmark_id) {
            self.available.get_mut(benchmark_id)
        } else {
            self.pending_benchmark.get_mut(benchmark_id)
        }
    }
}
