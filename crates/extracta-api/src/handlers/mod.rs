//! HTTP handlers.

pub mod files;
pub mod jobs;
pub mod upload;
pub mod ws;

use uuid::Uuid;

use crate::ApiError;

/// Parse a job id from the path; malformed ids are reported as unknown jobs.
pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("job {raw}")))
}
