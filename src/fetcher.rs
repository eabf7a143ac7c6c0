//! Snapshot Fetcher
//!
//! Polls the network API on a fixed interval and publishes an immutable
//! [`Snapshot`] whenever the block changes. On each attempt:
//! 1. Fetch the current block; if its id matches the published snapshot,
//!    nothing else happens.
//! 2. Otherwise fetch algorithms/wasms, the player's record, the player's
//!    benchmarks/proofs/frauds and the challenges concurrently.
//! 3. Refresh the per-challenge difficulty samplers from the new block data.
//! 4. Publish the assembled snapshot.
//!
//! A failure at any step keeps the existing snapshot and is retried on the
//! next interval.

use crate::config::MasterConfig;
use crate::difficulty::DifficultySampler;
use crate::model::{
    Algorithm, Benchmark, Block, Challenge, Difficulty, Fraud, NameIndex, Player, Proof, Snapshot,
    Wasm,
};
use crate::state::MasterState;
use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

// ============================================================================
// NETWORK API CLIENT
// ============================================================================

#[derive(Debug, Deserialize)]
struct GetBlockResponse {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct GetAlgorithmsResponse {
    algorithms: Vec<Algorithm>,
    wasms: Vec<Wasm>,
}

#[derive(Debug, Deserialize)]
struct GetPlayersResponse {
    players: Vec<Player>,
}

#[derive(Debug, Deserialize)]
struct GetBenchmarksResponse {
    benchmarks: Vec<Benchmark>,
    proofs: Vec<Proof>,
    frauds: Vec<Fraud>,
}

#[derive(Debug, Deserialize)]
struct GetChallengesResponse {
    challenges: Vec<Challenge>,
}

/// Read-only HTTP client for the network API.
pub struct NetworkClient {
    base_url: String,
    client: reqwest::Client,
}

impl NetworkClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path_and_query);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("error {} fetching {}", resp.status(), url));
        }
        Ok(resp.json().await?)
    }

    pub async fn get_block(&self) -> Result<Block> {
        let resp: GetBlockResponse = self.get_json("get-block").await?;
        Ok(resp.block)
    }

    async fn get_algorithms(&self, block_id: &str) -> Result<GetAlgorithmsResponse> {
        self.get_json(&format!("get-algorithms?block_id={}", block_id))
            .await
    }

    async fn get_players(&self, block_id: &str) -> Result<GetPlayersResponse> {
        self.get_json(&format!(
            "get-players?player_type=benchmarker&block_id={}",
            block_id
        ))
        .await
    }

    async fn get_benchmarks(&self, player_id: &str, block_id: &str) -> Result<GetBenchmarksResponse> {
        self.get_json(&format!(
            "get-benchmarks?player_id={}&block_id={}",
            player_id, block_id
        ))
        .await
    }

    async fn get_challenges(&self, block_id: &str) -> Result<GetChallengesResponse> {
        self.get_json(&format!("get-challenges?block_id={}", block_id))
            .await
    }
}

// ============================================================================
// REFRESH LOOP
// ============================================================================

/// Periodic snapshot refresh over the shared state.
pub struct SnapshotFetcher {
    config: Arc<MasterConfig>,
    state: Arc<MasterState>,
    client: NetworkClient,
    shutdown_rx: watch::Receiver<bool>,
}

impl SnapshotFetcher {
    pub fn new(
        config: Arc<MasterConfig>,
        state: Arc<MasterState>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let client = NetworkClient::new(&config.api_url);
        Self {
            config,
            state,
            client,
            shutdown_rx,
        }
    }

    /// Run until shutdown. Fetch failures are logged and retried on the next
    /// interval; the previous snapshot stays published throughout.
    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.fetcher.interval_ms));

        info!(
            "starting snapshot fetcher (interval: {} ms)",
            self.config.fetcher.interval_ms
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!("snapshot refresh failed: {}", e);
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("snapshot fetcher received shutdown signal, stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One refresh attempt. Returns whether a new snapshot was published.
    pub async fn refresh(&self) -> Result<bool> {
        let block = self.client.get_block().await?;

        if let Some(current) = self.state.snapshot().await {
            if current.block.id == block.id {
                debug!("no new block data");
                return Ok(false);
            }
        }

        info!(
            "new block {} at height {}, fetching network state",
            block.id, block.details.height
        );

        let (algorithms_resp, players_resp, benchmarks_resp, challenges_resp) = tokio::try_join!(
            self.client.get_algorithms(&block.id),
            self.client.get_players(&block.id),
            self.client.get_benchmarks(&self.config.player_id, &block.id),
            self.client.get_challenges(&block.id),
        )?;

        let algorithms: HashMap<String, Algorithm> = algorithms_resp
            .algorithms
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        let wasms: HashMap<String, Wasm> = algorithms_resp
            .wasms
            .into_iter()
            .map(|w| (w.algorithm_id.clone(), w))
            .collect();
        let player = players_resp
            .players
            .into_iter()
            .find(|p| p.id == self.config.player_id);
        let benchmarks: HashMap<String, Benchmark> = benchmarks_resp
            .benchmarks
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect();
        let proofs: HashMap<String, Proof> = benchmarks_resp
            .proofs
            .into_iter()
            .map(|p| (p.benchmark_id.clone(), p))
            .collect();
        let frauds: HashMap<String, Fraud> = benchmarks_resp
            .frauds
            .into_iter()
            .map(|f| (f.benchmark_id.clone(), f))
            .collect();
        let challenges: HashMap<String, Challenge> = challenges_resp
            .challenges
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let names = NameIndex::build(&challenges, &algorithms);

        // Validate every sampler input before touching any sampler, so a bad
        // challenge never leaves the samplers half-refreshed.
        let mut sampler_updates: Vec<(String, Vec<i32>, Vec<Difficulty>)> = Vec::new();
        for challenge in challenges.values() {
            let Some(block_data) = &challenge.block_data else {
                continue;
            };
            let parameters = block
                .config
                .difficulty
                .parameters
                .get(&challenge.id)
                .ok_or_else(|| {
                    anyhow!(
                        "block {} has no difficulty parameters for challenge {}",
                        block.id,
                        challenge.id
                    )
                })?;
            let min_difficulty: Vec<i32> = parameters.iter().map(|p| p.min_value).collect();
            sampler_updates.push((
                challenge.id.clone(),
                min_difficulty,
                block_data.qualifier_difficulties.clone(),
            ));
        }

        {
            let mut samplers = self.state.samplers.write().await;
            for (challenge_id, min_difficulty, qualifiers) in sampler_updates {
                debug!("updating difficulty sampler for {}", challenge_id);
                samplers
                    .entry(challenge_id)
                    .or_insert_with(DifficultySampler::new)
                    .update_with_block_data(min_difficulty, &qualifiers);
            }
        }

        let height = block.details.height;
        self.state
            .publish_snapshot(Snapshot {
                block,
                challenges,
                algorithms,
                wasms,
                player,
                benchmarks,
                proofs,
                frauds,
                names,
            })
            .await;

        info!("published snapshot for block at height {}", height);
        Ok(true)
    }
}
