//! Built-in analyzer: heuristic scoring in-process, faces and text through
//! external detector commands.
//!
//! Built once at worker startup and shared read-only across instances.
//!
//! The heuristics score the downscaled pixels. Detector commands are handed
//! the uploaded file as-is and do their own resizing.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use sieve_core::analysis::{round_to, AnalysisError, ModelInfo, DEVICE_CPU, NSFW_THRESHOLD};

use super::detector::{DetectorCommand, FaceOutput, TextOutput};
use super::{blocking, heuristics, Analyzer, LoadedImage, QualityScore, SensitivityScore};

/// Model label for the skin-tone heuristic.
pub const NSFW_MODEL: &str = "heuristic-v1";

/// Model label reported for a stage with no detector configured.
pub const MODEL_NONE: &str = "none";

/// Model labels reported when a detector command is configured.
pub const FACE_MODEL: &str = "external-face-detector";
pub const OCR_MODEL: &str = "external-ocr";

#[derive(Debug, Clone, Default)]
pub struct ImageAnalyzer {
    face_detector: Option<DetectorCommand>,
    text_extractor: Option<DetectorCommand>,
}

impl ImageAnalyzer {
    pub fn new(
        face_detector: Option<DetectorCommand>,
        text_extractor: Option<DetectorCommand>,
    ) -> Self {
        Self {
            face_detector,
            text_extractor,
        }
    }
}

#[async_trait]
impl Analyzer for ImageAnalyzer {
    async fn load(&self, path: &Path) -> Result<LoadedImage, AnalysisError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AnalysisError::permanent("Image not found"));
            }
            Err(e) => {
                return Err(AnalysisError::transient(format!(
                    "Failed to read image: {e}"
                )));
            }
        };

        let path = path.to_path_buf();
        blocking(move || {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|_| AnalysisError::permanent("Invalid image"))?;
            let pixels = heuristics::downscale(decoded.to_rgb8());
            Ok(LoadedImage::new(path, pixels))
        })
        .await
    }

    async fn score_sensitivity(
        &self,
        image: &LoadedImage,
    ) -> Result<SensitivityScore, AnalysisError> {
        let pixels = image.pixels.clone();
        let ratio = blocking(move || Ok(heuristics::skin_ratio(&pixels))).await?;
        Ok(SensitivityScore {
            score: round_to(ratio, 3),
            flagged: ratio > NSFW_THRESHOLD,
        })
    }

    async fn detect_faces(&self, image: &LoadedImage) -> Result<u32, AnalysisError> {
        match &self.face_detector {
            Some(cmd) => {
                let out: FaceOutput = cmd.run("face detector", &image.path).await?;
                Ok(out.faces)
            }
            None => Ok(0),
        }
    }

    async fn extract_text(&self, image: &LoadedImage) -> Result<String, AnalysisError> {
        match &self.text_extractor {
            Some(cmd) => {
                let out: TextOutput = cmd.run("text extractor", &image.path).await?;
                Ok(out.text.trim().to_string())
            }
            None => Ok(String::new()),
        }
    }

    async fn score_quality(&self, image: &LoadedImage) -> Result<QualityScore, AnalysisError> {
        let pixels = image.pixels.clone();
        let blur = blocking(move || Ok(heuristics::laplacian_variance(&pixels))).await?;
        Ok(QualityScore {
            blur: round_to(blur, 2),
            quality: heuristics::quality_score(blur, image.width(), image.height()),
        })
    }

    fn model_info(&self) -> ModelInfo {
        let label = |configured: bool, name: &str| {
            let name = if configured { name } else { MODEL_NONE };
            name.to_string()
        };
        ModelInfo {
            face: label(self.face_detector.is_some(), FACE_MODEL),
            ocr: label(self.text_extractor.is_some(), OCR_MODEL),
            nsfw: NSFW_MODEL.to_string(),
            device: DEVICE_CPU.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, img: &RgbImage) -> std::path::PathBuf {
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_file_is_permanent() {
        let analyzer = ImageAnalyzer::default();
        let err = analyzer
            .load(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::permanent("Image not found"));
    }

    #[tokio::test]
    async fn undecodable_file_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = ImageAnalyzer::default().load(&path).await.unwrap_err();
        assert_eq!(err, AnalysisError::permanent("Invalid image"));
    }

    #[tokio::test]
    async fn large_image_is_downscaled_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "wide.png", &RgbImage::new(2000, 1000));

        let loaded = ImageAnalyzer::default().load(&path).await.unwrap();
        assert_eq!((loaded.width(), loaded.height()), (1280, 640));
        assert_eq!(loaded.path, path);
    }

    #[tokio::test]
    async fn skin_toned_image_is_flagged() {
        let analyzer = ImageAnalyzer::default();
        let img = LoadedImage::new("/tmp/x.png", RgbImage::from_pixel(8, 8, Rgb([224, 172, 105])));
        let s = analyzer.score_sensitivity(&img).await.unwrap();
        assert!(s.flagged);
        assert_eq!(s.score, 1.0);
    }

    #[tokio::test]
    async fn unconfigured_detectors_report_nothing() {
        let analyzer = ImageAnalyzer::default();
        let img = LoadedImage::new("/tmp/x.png", RgbImage::new(4, 4));
        assert_eq!(analyzer.detect_faces(&img).await.unwrap(), 0);
        assert_eq!(analyzer.extract_text(&img).await.unwrap(), "");

        let info = analyzer.model_info();
        assert_eq!(info.face, MODEL_NONE);
        assert_eq!(info.ocr, MODEL_NONE);
        assert_eq!(info.nsfw, NSFW_MODEL);
        assert_eq!(info.device, "cpu");
    }

    #[tokio::test]
    async fn quality_stays_in_unit_range() {
        let analyzer = ImageAnalyzer::default();
        let checker = RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let q = analyzer
            .score_quality(&LoadedImage::new("/tmp/x.png", checker))
            .await
            .unwrap();
        assert!(q.blur > 0.0);
        assert!((0.0..=1.0).contains(&q.quality));
        assert_eq!(q.quality, 1.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn configured_detectors_are_invoked() {
        let dir = tempfile::tempdir().unwrap();
        let faces = dir.path().join("faces.sh");
        std::fs::write(&faces, "#!/bin/sh\necho '{\"faces\": 1, \"model\": \"opencv-dnn\"}'\n")
            .unwrap();
        let ocr = dir.path().join("ocr.sh");
        std::fs::write(&ocr, "#!/bin/sh\necho '{\"text\": \" SALE TODAY \"}'\n").unwrap();

        let analyzer = ImageAnalyzer::new(
            DetectorCommand::parse(&format!("sh {}", faces.display())),
            DetectorCommand::parse(&format!("sh {}", ocr.display())),
        );

        let img = LoadedImage::new(dir.path().join("x.png"), RgbImage::new(4, 4));
        assert_eq!(analyzer.detect_faces(&img).await.unwrap(), 1);
        assert_eq!(analyzer.extract_text(&img).await.unwrap(), "SALE TODAY");

        let info = analyzer.model_info();
        assert_eq!(info.face, "external-face-detector");
        assert_eq!(info.ocr, "external-ocr");
    }
}
