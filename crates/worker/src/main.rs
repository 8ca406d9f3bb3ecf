//! `sieve-worker` -- image analysis worker process.
//!
//! Consumes jobs from the PostgreSQL-backed queue, runs the analysis
//! pipeline, and writes progress and results to the `jobs` table. See
//! [`WorkerConfig::from_env`] for the environment variables it reads.

use std::sync::Arc;
use std::time::Duration;

use sieve_core::store::{JobQueue, ResultStore, WorkerRegistry};
use sieve_db::{PgJobQueue, PgResultStore, PgWorkerRegistry};
use sieve_worker::analyzer::{Analyzer, ImageAnalyzer};
use sieve_worker::config::WorkerConfig;
use sieve_worker::{heartbeat, Worker};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sieve_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        worker = %config.name,
        concurrency = config.concurrency,
        max_attempts = config.retry.max_attempts,
        soft_limit_secs = config.retry.soft_time_limit.as_secs(),
        hard_limit_secs = config.retry.hard_time_limit.as_secs(),
        lease_secs = config.lease.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = sieve_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    sieve_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    sieve_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let store: Arc<dyn ResultStore> = Arc::new(PgResultStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone()));
    let registry: Arc<dyn WorkerRegistry> = Arc::new(PgWorkerRegistry::new(pool));

    // --- Analyzer (built once, shared read-only) ---
    let analyzer: Arc<dyn Analyzer> = Arc::new(ImageAnalyzer::new(
        config.face_detector.clone(),
        config.text_extractor.clone(),
    ));
    let models = analyzer.model_info();
    tracing::info!(
        face = %models.face,
        ocr = %models.ocr,
        nsfw = %models.nsfw,
        device = %models.device,
        "Analyzer initialized",
    );

    // --- Heartbeat + worker instances ---
    let cancel = CancellationToken::new();

    let heartbeat_handle = tokio::spawn(heartbeat::run(
        Arc::clone(&registry),
        config.name.clone(),
        config.heartbeat_interval,
        cancel.clone(),
    ));

    let mut handles = Vec::with_capacity(config.concurrency);
    for i in 0..config.concurrency {
        let worker = Worker::new(
            config.instance_name(i),
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&analyzer),
        )
        .with_policy(config.retry.clone())
        .with_lease(config.lease)
        .with_poll_interval(config.poll_interval);

        let token = cancel.clone();
        handles.push(tokio::spawn(async move { worker.run(token).await }));
    }

    shutdown_signal().await;
    tracing::info!("Shutdown requested, finishing in-flight attempts");
    cancel.cancel();

    // Each instance finishes its current attempt, bounded by the hard limit.
    let drain = config.retry.hard_time_limit + Duration::from_secs(5);
    for handle in handles {
        if tokio::time::timeout(drain, handle).await.is_err() {
            tracing::warn!("Worker instance did not stop in time");
        }
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;

    tracing::info!("Worker shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
