//! The analyzer seam.
//!
//! The worker treats analysis as a black box split into named stages purely
//! so progress can be reported between them. Implementations must be
//! idempotent for a given input: retries call every stage again from the
//! start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use sieve_core::analysis::{AnalysisError, ModelInfo};

pub mod detector;
pub mod heuristics;
pub mod image_analyzer;

pub use image_analyzer::ImageAnalyzer;

/// Decoded (and possibly downscaled) image handed between stages.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub pixels: Arc<RgbImage>,
}

impl LoadedImage {
    pub fn new(path: impl Into<PathBuf>, pixels: RgbImage) -> Self {
        Self {
            path: path.into(),
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Content-sensitivity stage output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityScore {
    pub score: f64,
    pub flagged: bool,
}

/// Quality stage output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    pub blur: f64,
    /// Within `0.0..=1.0`.
    pub quality: f64,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn load(&self, path: &Path) -> Result<LoadedImage, AnalysisError>;

    async fn score_sensitivity(
        &self,
        image: &LoadedImage,
    ) -> Result<SensitivityScore, AnalysisError>;

    async fn detect_faces(&self, image: &LoadedImage) -> Result<u32, AnalysisError>;

    async fn extract_text(&self, image: &LoadedImage) -> Result<String, AnalysisError>;

    async fn score_quality(&self, image: &LoadedImage) -> Result<QualityScore, AnalysisError>;

    fn model_info(&self) -> ModelInfo;
}

/// Run a CPU-bound closure off the async runtime. A panic inside `f` is
/// reported as a permanent failure instead of tearing down the worker.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        if e.is_panic() {
            AnalysisError::permanent(crate::runner::PANIC_MESSAGE)
        } else {
            AnalysisError::transient(format!("Analyzer task cancelled: {e}"))
        }
    })?
}
