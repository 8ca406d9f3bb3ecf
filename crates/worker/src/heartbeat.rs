//! Periodic liveness heartbeats, one per worker process.

use std::sync::Arc;
use std::time::Duration;

use sieve_core::store::WorkerRegistry;
use tokio_util::sync::CancellationToken;

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Upsert a heartbeat for `worker` every `interval` until `cancel` fires.
///
/// Failures are logged and retried on the next tick.
pub async fn run(
    registry: Arc<dyn WorkerRegistry>,
    worker: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker = %worker, "Heartbeat stopped");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = registry.heartbeat(&worker).await {
                    tracing::warn!(worker = %worker, error = %e, "Heartbeat failed");
                }
            }
        }
    }
}
