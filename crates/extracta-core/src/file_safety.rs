//! Upload name sanitizing and upload parameter validation.
//!
//! Uploaded files are stored as `<uploads>/<id>_<sanitized name>`, so the
//! sanitized name must never contain path separators or shell-hostile
//! characters.

use crate::defaults::{FALLBACK_UPLOAD_NAME, OUTPUT_FORMAT};
use crate::models::{AudioFormat, Quality};
use crate::Result;

/// Sanitize a client-supplied file name for storage.
///
/// Strips any path component, replaces spaces with `_`, replaces every
/// character outside `[A-Za-z0-9._-]` with `_`, and falls back to
/// `video.bin` when nothing usable remains.
pub fn sanitize_upload_name(filename: &str) -> String {
    // Remove path components
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c,
            '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    // "." and ".." would resolve to directories once joined.
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return FALLBACK_UPLOAD_NAME.to_string();
    }
    sanitized
}

/// Validate the declared output format. Empty means the default (`mp3`).
pub fn parse_output_format(raw: Option<&str>) -> Result<AudioFormat> {
    match raw.map(str::trim) {
        None | Some("") => OUTPUT_FORMAT.parse(),
        Some(value) => value.parse(),
    }
}

/// Validate the declared quality tier. Empty means the default (`medium`).
pub fn parse_quality(raw: Option<&str>) -> Result<Quality> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Quality::default()),
        Some(value) => value.parse(),
    }
}

/// Storage name for an upload belonging to `job_id`.
pub fn upload_file_name(job_id: &uuid::Uuid, original_name: &str) -> String {
    format!("{}_{}", job_id, sanitize_upload_name(original_name))
}
