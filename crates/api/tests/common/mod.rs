#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sieve_api::config::ServerConfig;
use sieve_api::router::build_app_router;
use sieve_api::state::AppState;
use sieve_core::job::JobMessage;
use sieve_core::memory::{InMemoryJobQueue, InMemoryResultStore, InMemoryWorkerRegistry};
use sieve_core::store::{Delivery, JobQueue, StoreError};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "sieve-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(upload_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        upload_dir: upload_dir.to_path_buf(),
        max_upload_bytes: 1024 * 1024,
        worker_liveness_secs: 30,
    }
}

/// In-process app plus handles on its stores.
pub struct TestApp {
    pub app: Router,
    pub store: Arc<InMemoryResultStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub workers: Arc<InMemoryWorkerRegistry>,
    pub upload_dir: TempDir,
}

/// Build the full application router (same middleware stack as production)
/// over in-memory stores and a temporary upload directory.
pub fn build_test_app() -> TestApp {
    let queue = Arc::new(InMemoryJobQueue::new());
    build_test_app_with_queue(queue.clone(), queue)
}

/// Like [`build_test_app`], but the app enqueues through `queue_impl`.
pub fn build_test_app_with_queue(
    queue_impl: Arc<dyn JobQueue>,
    queue: Arc<InMemoryJobQueue>,
) -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let config = test_config(upload_dir.path());
    let store = Arc::new(InMemoryResultStore::new());
    let workers = Arc::new(InMemoryWorkerRegistry::new());

    let state = AppState {
        store: store.clone(),
        queue: queue_impl,
        workers: workers.clone(),
        config: Arc::new(config.clone()),
    };

    TestApp {
        app: build_app_router(state, &config),
        store,
        queue,
        workers,
        upload_dir,
    }
}

/// A queue that is always down.
pub struct UnavailableQueue;

#[async_trait]
impl JobQueue for UnavailableQueue {
    async fn enqueue(&self, _: &JobMessage) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn claim(&self, _: &str, _: Duration) -> Result<Option<Delivery>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ack(&self, _: &Delivery) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn release(&self, _: &Delivery, _: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Multipart body with a single `file` field.
pub fn multipart_body(filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Like [`post_multipart`] but without a `content-length` header, the way a
/// chunked client sends it. Size limits then apply while the body streams.
pub async fn post_multipart_unsized(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn upload(app: Router, filename: &str, bytes: &[u8]) -> Response<Body> {
    post_multipart(app, "/jobs", multipart_body(filename, bytes)).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
