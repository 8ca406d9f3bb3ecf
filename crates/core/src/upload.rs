//! Upload validation and naming.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::types::JobId;

/// Accepted image extensions (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Validate an uploaded filename and return its normalized extension.
pub fn validate_image_filename(filename: &str) -> Result<String, CoreError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(CoreError::Validation(
            "Unsupported file type. Use JPG, PNG, or WEBP.".into(),
        ))
    }
}

/// Destination for an upload: `<dir>/<job_id>.<ext>`.
pub fn upload_path(dir: &Path, job_id: JobId, ext: &str) -> PathBuf {
    dir.join(format!("{job_id}.{ext}"))
}
