//! Worker pool for image analysis jobs.
//!
//! A worker process runs one or more [`runner::Worker`] instances against the
//! shared result store and queue, plus a heartbeat task for liveness.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod pipeline;
pub mod runner;

pub use analyzer::{Analyzer, ImageAnalyzer};
pub use error::WorkerError;
pub use runner::{Outcome, Worker};
