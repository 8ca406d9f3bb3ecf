//! Pipeline stage catalogue.
//!
//! The worker reports `PROGRESS(step)` before each stage starts. Stage order
//! is fixed; a poller observing steps within one attempt always sees a prefix
//! of [`Stage::ALL`].

use std::fmt;

/// One named step of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    LoadingImage,
    ContentSensitivity,
    FaceDetection,
    TextExtraction,
    QualityScoring,
    Finalizing,
}

impl Stage {
    /// Canonical execution order.
    pub const ALL: [Stage; 6] = [
        Stage::LoadingImage,
        Stage::ContentSensitivity,
        Stage::FaceDetection,
        Stage::TextExtraction,
        Stage::QualityScoring,
        Stage::Finalizing,
    ];

    /// Human-readable label written to the result store.
    pub fn label(self) -> &'static str {
        match self {
            Stage::LoadingImage => "loading image",
            Stage::ContentSensitivity => "content-sensitivity scoring",
            Stage::FaceDetection => "face detection",
            Stage::TextExtraction => "text extraction",
            Stage::QualityScoring => "quality scoring",
            Stage::Finalizing => "finalizing",
        }
    }

    /// Parse a stored label back into a stage.
    pub fn from_label(label: &str) -> Option<Stage> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Zero-based position in [`Stage::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_label(stage.label()), Some(stage));
        }
        assert_eq!(Stage::from_label("warming up"), None);
    }

    #[test]
    fn index_follows_canonical_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
        assert!(Stage::LoadingImage < Stage::Finalizing);
    }
}
