use axum::{routing::get, Router};

use crate::handlers::system;
use crate::state::AppState;

/// Banner and health check, mounted at the root.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(system::banner))
        .route("/health", get(system::health_check))
}
