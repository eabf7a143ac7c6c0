//! Dispatch Server
//!
//! The worker-facing HTTP surface of the master:
//! - `GET /jobs` - the full `available` map, verbatim. Every worker sees
//!   every available job; no pagination, no filtering.
//! - `POST /solutions_data/{benchmark_id}` - merge a batch of solutions into
//!   a job and feed the challenge's difficulty sampler.
//! - `GET /health` - liveness probe.
//!
//! Submissions are accepted for jobs in `available` or `pending_benchmark`:
//! workers race the scheduler's expiry transition, and solutions that arrive
//! just after it are still wanted. Neither endpoint ever changes job-store
//! membership.

use crate::model::{Job, SolutionData};
use crate::state::MasterState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(state: Arc<MasterState>) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/solutions_data/:benchmark_id", post(submit_solutions))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve the dispatch surface until the process exits.
pub async fn serve(state: Arc<MasterState>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("dispatch server listening on {}", addr);
    info!("  GET  /jobs                          - list available jobs");
    info!("  POST /solutions_data/:benchmark_id  - submit solutions");
    info!("  GET  /health                        - health check");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// GET /jobs - side-effect-free dump of the available job set.
async fn list_jobs(State(state): State<Arc<MasterState>>) -> Json<HashMap<String, Job>> {
    let store = state.jobs.read().await;
    Json(store.available.clone())
}

/// POST /solutions_data/{benchmark_id}
///
/// Body: JSON object mapping stringified nonce to one solution record.
/// Nonces merge last-writer-wins into the job; the sampler is fed the count
/// of nonces in this call (not a cumulative total). The body is parsed by
/// hand so every malformed payload is a 400, and a miss in both live maps is
/// a 404 with nothing mutated.
async fn submit_solutions(
    State(state): State<Arc<MasterState>>,
    Path(benchmark_id): Path<String>,
    body: String,
) -> (StatusCode, &'static str) {
    let solutions: HashMap<u64, SolutionData> = match serde_json::from_str(&body) {
        Ok(solutions) => solutions,
        Err(e) => {
            warn!("rejected solutions for job {}: {}", benchmark_id, e);
            return (StatusCode::BAD_REQUEST, "Invalid solution data");
        }
    };
    let num_solutions = solutions.len() as u64;

    let (challenge_id, difficulty) = {
        let mut store = state.jobs.write().await;
        let Some(job) = store.live_job_mut(&benchmark_id) else {
            warn!("job {} not found", benchmark_id);
            return (StatusCode::NOT_FOUND, "Job not found");
        };
        info!(
            "received {} solutions for job {}",
            num_solutions, benchmark_id
        );
        job.solutions_data.extend(solutions);
        (job.settings.challenge_id.clone(), job.settings.difficulty)
    };

    let mut samplers = state.samplers.write().await;
    match samplers.get_mut(&challenge_id) {
        Some(sampler) => sampler.update_with_solutions(difficulty, num_solutions),
        // The solutions are the valuable payload; a missing sampler only
        // costs this observation.
        None => warn!("no difficulty sampler for challenge {}", challenge_id),
    }

    (StatusCode::OK, "OK")
}
