//! PostgreSQL-backed store and queue behaviour.
//!
//! These need a live database (`DATABASE_URL`); run with
//! `cargo test -p sieve-db -- --ignored`.

use std::time::Duration;

use chrono::Utc;
use sieve_core::analysis::{AnalysisResult, ModelInfo};
use sieve_core::job::{JobMessage, JobRecord, JobStatus};
use sieve_core::stage::Stage;
use sieve_core::store::{JobQueue, ResultStore, StoreError, WorkerRegistry};
use sieve_db::{PgJobQueue, PgResultStore, PgWorkerRegistry};
use sqlx::PgPool;
use uuid::Uuid;

fn payload(path: &str) -> AnalysisResult {
    AnalysisResult {
        image_path: path.to_string(),
        nsfw: false,
        nsfw_score: 0.012,
        faces_detected: 1,
        ocr_text: "HELLO WORLD".into(),
        blur_score: 231.4,
        quality_score: 1.0,
        processing_time: 0.82,
        model: ModelInfo {
            face: "opencv-dnn".into(),
            ocr: "easyocr".into(),
            nsfw: "heuristic-v1".into(),
            device: "cpu".into(),
        },
    }
}

async fn pending(store: &PgResultStore) -> JobRecord {
    let rec = JobRecord::new_pending(Uuid::new_v4(), "/uploads/a.png", Utc::now());
    store.insert_pending(&rec).await.unwrap();
    rec
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn lifecycle_round_trips_through_postgres(pool: PgPool) {
    let store = PgResultStore::new(pool);
    let rec = pending(&store).await;

    let stored = store.get(rec.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), JobStatus::Pending);
    assert_eq!(stored.attempt, 0);

    let running = store.start_attempt(rec.id).await.unwrap().unwrap();
    assert_eq!(running.status(), JobStatus::Running);
    assert_eq!(running.attempt, 1);

    assert!(store
        .record_progress(rec.id, Stage::FaceDetection)
        .await
        .unwrap());
    let progress = store.get(rec.id).await.unwrap().unwrap();
    assert_eq!(progress.step(), Some(Stage::FaceDetection));

    assert!(store.complete(rec.id, &payload("/uploads/a.png")).await.unwrap());
    let done = store.get(rec.id).await.unwrap().unwrap();
    assert_eq!(done.payload(), Some(&payload("/uploads/a.png")));
    assert!(done.error().is_none());
    assert!(done.completed_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn terminal_rows_reject_further_writes(pool: PgPool) {
    let store = PgResultStore::new(pool);
    let rec = pending(&store).await;
    store.start_attempt(rec.id).await.unwrap();
    assert!(store.fail(rec.id, "Invalid image").await.unwrap());

    assert!(!store
        .record_progress(rec.id, Stage::Finalizing)
        .await
        .unwrap());
    assert!(!store.complete(rec.id, &payload("x")).await.unwrap());
    assert!(store.start_attempt(rec.id).await.unwrap().is_none());

    let failed = store.get(rec.id).await.unwrap().unwrap();
    let err = failed.error().unwrap();
    assert_eq!(err.message, "Invalid image");
    assert_eq!(err.attempt, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_ids_are_rejected(pool: PgPool) {
    let store = PgResultStore::new(pool);
    let rec = pending(&store).await;
    let err = store.insert_pending(&rec).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(id) if id == rec.id));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn queue_claims_are_exclusive_and_releasable(pool: PgPool) {
    let store = PgResultStore::new(pool.clone());
    let queue = PgJobQueue::new(pool);
    let rec = pending(&store).await;

    queue
        .enqueue(&JobMessage {
            job_id: rec.id,
            image_path: rec.image_path.clone(),
        })
        .await
        .unwrap();

    let lease = Duration::from_secs(60);
    let first = queue.claim("w1", lease).await.unwrap().unwrap();
    assert_eq!(first.message.job_id, rec.id);
    assert_eq!(first.delivery_count, 1);
    assert!(queue.claim("w2", lease).await.unwrap().is_none());

    queue.release(&first, Duration::ZERO).await.unwrap();
    let second = queue.claim("w2", lease).await.unwrap().unwrap();
    assert_eq!(second.tag, first.tag);
    assert_eq!(second.delivery_count, 2);

    // The first claim's token is stale now.
    queue.ack(&first).await.unwrap();
    assert!(queue.claim("w3", Duration::from_millis(1)).await.unwrap().is_none());

    queue.ack(&second).await.unwrap();
    queue.release(&second, Duration::ZERO).await.unwrap();
    assert!(queue.claim("w3", lease).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn discarding_pending_job_drops_its_message(pool: PgPool) {
    let store = PgResultStore::new(pool.clone());
    let queue = PgJobQueue::new(pool);
    let rec = pending(&store).await;
    queue
        .enqueue(&JobMessage {
            job_id: rec.id,
            image_path: rec.image_path.clone(),
        })
        .await
        .unwrap();

    assert!(store.discard_pending(rec.id).await.unwrap());
    assert!(store.get(rec.id).await.unwrap().is_none());
    assert!(queue
        .claim("w1", Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn heartbeats_report_live_workers(pool: PgPool) {
    let registry = PgWorkerRegistry::new(pool);
    registry.heartbeat("worker-a").await.unwrap();
    registry.heartbeat("worker-a").await.unwrap();

    let live = registry
        .live_workers(Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(live, vec!["worker-a".to_string()]);
}
