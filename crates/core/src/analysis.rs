//! Analyzer payload and failure types.
//!
//! The payload shape is part of the polling contract: it is returned verbatim
//! as `result` once a job succeeds.

use serde::{Deserialize, Serialize};

/// Score above which the skin-tone heuristic flags an image as sensitive.
pub const NSFW_THRESHOLD: f64 = 0.25;

/// Device label reported by the built-in analyzer.
pub const DEVICE_CPU: &str = "cpu";

/// Model identifiers used for each analysis concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub face: String,
    pub ocr: String,
    pub nsfw: String,
    pub device: String,
}

/// Immutable result of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub image_path: String,
    pub nsfw: bool,
    pub nsfw_score: f64,
    pub faces_detected: u32,
    pub ocr_text: String,
    pub blur_score: f64,
    /// Always within `0.0..=1.0`.
    pub quality_score: f64,
    /// Wall-clock seconds spent in the pipeline, rounded to 2 decimals.
    pub processing_time: f64,
    pub model: ModelInfo,
}

/// A failure raised by an analyzer stage, already classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// Likely to succeed on retry (dependency unavailable, resource contention).
    #[error("{0}")]
    Transient(String),

    /// Retrying will not help (missing file, undecodable image, bad output).
    #[error("{0}")]
    Permanent(String),
}

impl AnalysisError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
