//! External detector commands (face detection, OCR).
//!
//! A detector is an executable invoked as `<program> [args...] <image_path>`
//! that prints one JSON object on stdout:
//!
//! - face detector: `{"faces": 2}`
//! - text extractor: `{"text": "HELLO"}`
//!
//! Extra keys are ignored. Failing to spawn the process or a non-zero exit
//! is treated as a transient dependency failure; unparseable output is
//! permanent.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use sieve_core::analysis::AnalysisError;
use tokio::process::Command;

/// A configured detector executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DetectorCommand {
    /// Parse a whitespace-separated command line, e.g.
    /// `python3 scripts/detect_faces.py`. Returns `None` for blank input.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Run the detector against `image_path` and decode its JSON output.
    pub async fn run<T: DeserializeOwned>(
        &self,
        what: &str,
        image_path: &Path,
    ) -> Result<T, AnalysisError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AnalysisError::transient(format!("Failed to run {what}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::transient(format!(
                "{what} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim())
            .map_err(|e| AnalysisError::permanent(format!("Invalid {what} output: {e}")))
    }
}

/// Face detector response.
#[derive(Debug, Deserialize)]
pub struct FaceOutput {
    pub faces: u32,
}

/// Text extractor response.
#[derive(Debug, Deserialize)]
pub struct TextOutput {
    pub text: String,
}
