//! Service banner and health.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub status: &'static str,
    pub mode: &'static str,
}

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when store and queue are reachable and at least one worker is live.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub store: &'static str,
    pub queue: &'static str,
    /// Live workers, most recently seen first.
    pub workers: Vec<String>,
}

/// GET /
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        status: "Sieve image analysis API running",
        mode: "cpu",
    })
}

/// GET /health -- reachability of store and queue plus live workers.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let liveness = Duration::from_secs(state.config.worker_liveness_secs);
    let (store, queue, workers) = tokio::join!(
        state.store.ping(),
        state.queue.ping(),
        state.workers.live_workers(liveness),
    );

    let workers = workers.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to list live workers");
        Vec::new()
    });
    let healthy = store.is_ok() && queue.is_ok() && !workers.is_empty();

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store: reachability(store.is_ok()),
        queue: reachability(queue.is_ok()),
        workers,
    })
}

fn reachability(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}
