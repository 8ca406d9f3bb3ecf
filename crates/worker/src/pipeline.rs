//! One analysis attempt: the stages in canonical order, with a progress
//! write before each and the soft deadline enforced at every boundary.

use std::future::Future;
use std::path::Path;

use sieve_core::analysis::{round_to, AnalysisError, AnalysisResult};
use sieve_core::stage::Stage;
use sieve_core::store::{ResultStore, StoreError};
use sieve_core::types::JobId;
use tokio::time::Instant;

use crate::analyzer::Analyzer;

pub const SOFT_LIMIT_MESSAGE: &str = "soft time limit exceeded";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Analysis(AnalysisError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The record went terminal (or vanished) under us; nothing more to write.
    #[error("Job record is no longer in flight")]
    Abandoned,
}

impl PipelineError {
    fn soft_limit() -> Self {
        Self::Analysis(AnalysisError::permanent(SOFT_LIMIT_MESSAGE))
    }
}

pub struct Pipeline<'a> {
    store: &'a dyn ResultStore,
    analyzer: &'a dyn Analyzer,
    job_id: JobId,
    soft_deadline: Instant,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn ResultStore,
        analyzer: &'a dyn Analyzer,
        job_id: JobId,
        soft_deadline: Instant,
    ) -> Self {
        Self {
            store,
            analyzer,
            job_id,
            soft_deadline,
        }
    }

    /// Run every stage and assemble the payload. Does not write the terminal
    /// state; that is the caller's job.
    pub async fn run(&self, image_path: &str) -> Result<AnalysisResult, PipelineError> {
        let started = Instant::now();

        let image = self
            .stage(Stage::LoadingImage, self.analyzer.load(Path::new(image_path)))
            .await?;
        let sensitivity = self
            .stage(
                Stage::ContentSensitivity,
                self.analyzer.score_sensitivity(&image),
            )
            .await?;
        let faces = self
            .stage(Stage::FaceDetection, self.analyzer.detect_faces(&image))
            .await?;
        let text = self
            .stage(Stage::TextExtraction, self.analyzer.extract_text(&image))
            .await?;
        let quality = self
            .stage(Stage::QualityScoring, self.analyzer.score_quality(&image))
            .await?;

        self.stage(Stage::Finalizing, async {
            Ok::<_, AnalysisError>(AnalysisResult {
                image_path: image_path.to_string(),
                nsfw: sensitivity.flagged,
                nsfw_score: sensitivity.score,
                faces_detected: faces,
                ocr_text: text,
                blur_score: quality.blur,
                quality_score: quality.quality,
                processing_time: round_to(started.elapsed().as_secs_f64(), 2),
                model: self.analyzer.model_info(),
            })
        })
        .await
    }

    async fn stage<T, F>(&self, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, AnalysisError>>,
    {
        if Instant::now() >= self.soft_deadline {
            return Err(PipelineError::soft_limit());
        }
        if !self.store.record_progress(self.job_id, stage).await? {
            return Err(PipelineError::Abandoned);
        }
        tracing::debug!(job_id = %self.job_id, step = %stage, "Stage started");

        match tokio::time::timeout_at(self.soft_deadline, work).await {
            Ok(result) => result.map_err(PipelineError::Analysis),
            Err(_) => Err(PipelineError::soft_limit()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use image::RgbImage;
    use sieve_core::analysis::ModelInfo;
    use sieve_core::job::JobRecord;
    use sieve_core::memory::InMemoryResultStore;

    use super::*;
    use crate::analyzer::{LoadedImage, QualityScore, SensitivityScore};

    /// Succeeds instantly, except for an optional slow stage.
    #[derive(Default)]
    struct StubAnalyzer {
        slow_faces: Option<Duration>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl StubAnalyzer {
        fn called(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }
    }

    #[async_trait]
    impl Analyzer for StubAnalyzer {
        async fn load(&self, path: &Path) -> Result<LoadedImage, AnalysisError> {
            self.called("load");
            Ok(LoadedImage::new(path, RgbImage::new(400, 300)))
        }

        async fn score_sensitivity(
            &self,
            _: &LoadedImage,
        ) -> Result<SensitivityScore, AnalysisError> {
            self.called("sensitivity");
            Ok(SensitivityScore {
                score: 0.1,
                flagged: false,
            })
        }

        async fn detect_faces(&self, _: &LoadedImage) -> Result<u32, AnalysisError> {
            self.called("faces");
            if let Some(d) = self.slow_faces {
                tokio::time::sleep(d).await;
            }
            Ok(2)
        }

        async fn extract_text(&self, _: &LoadedImage) -> Result<String, AnalysisError> {
            self.called("text");
            Ok("OPEN".into())
        }

        async fn score_quality(&self, _: &LoadedImage) -> Result<QualityScore, AnalysisError> {
            self.called("quality");
            Ok(QualityScore {
                blur: 42.0,
                quality: 0.72,
            })
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                face: "stub".into(),
                ocr: "stub".into(),
                nsfw: "stub".into(),
                device: "cpu".into(),
            }
        }
    }

    async fn running_job(store: &InMemoryResultStore) -> JobId {
        let rec = JobRecord::new_pending(uuid::Uuid::new_v4(), "/uploads/x.png", Utc::now());
        store.insert_pending(&rec).await.unwrap();
        store.start_attempt(rec.id).await.unwrap();
        rec.id
    }

    #[tokio::test(start_paused = true)]
    async fn assembles_payload_from_every_stage() {
        let store = InMemoryResultStore::new();
        let analyzer = StubAnalyzer::default();
        let id = running_job(&store).await;

        let deadline = Instant::now() + Duration::from_secs(10);
        let result = Pipeline::new(&store, &analyzer, id, deadline)
            .run("/uploads/x.png")
            .await
            .unwrap();

        assert_eq!(result.image_path, "/uploads/x.png");
        assert_eq!(result.faces_detected, 2);
        assert_eq!(result.ocr_text, "OPEN");
        assert_eq!(result.quality_score, 0.72);
        assert!(!result.nsfw);
        assert_eq!(
            *analyzer.calls.lock().unwrap(),
            vec!["load", "sensitivity", "faces", "text", "quality"]
        );

        let rec = store.get(id).await.unwrap().unwrap();
        assert_eq!(rec.step(), Some(Stage::Finalizing));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stage_hits_soft_limit() {
        let store = InMemoryResultStore::new();
        let analyzer = StubAnalyzer {
            slow_faces: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let id = running_job(&store).await;

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = Pipeline::new(&store, &analyzer, id, deadline)
            .run("/uploads/x.png")
            .await
            .unwrap_err();

        assert_matches!(err, PipelineError::Analysis(e) if e == AnalysisError::permanent(SOFT_LIMIT_MESSAGE));
        // Never reached text extraction.
        assert!(!analyzer.calls.lock().unwrap().contains(&"text"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_stops_before_first_stage() {
        let store = InMemoryResultStore::new();
        let analyzer = StubAnalyzer::default();
        let id = running_job(&store).await;

        let err = Pipeline::new(&store, &analyzer, id, Instant::now())
            .run("/uploads/x.png")
            .await
            .unwrap_err();

        assert_matches!(err, PipelineError::Analysis(_));
        assert!(analyzer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_record_abandons_pipeline() {
        let store = InMemoryResultStore::new();
        let analyzer = StubAnalyzer::default();
        let id = running_job(&store).await;
        store.fail(id, "cancelled elsewhere").await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let err = Pipeline::new(&store, &analyzer, id, deadline)
            .run("/uploads/x.png")
            .await
            .unwrap_err();

        assert_matches!(err, PipelineError::Abandoned);
        assert!(analyzer.calls.lock().unwrap().is_empty());
    }
}
