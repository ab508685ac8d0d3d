//! Job listing, polling and stage triggers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use extracta_core::defaults::RECENT_JOBS_LIMIT;
use extracta_core::{download_url, transcript_url, Job, ProgressEvent, TriggerOutcome};

use super::parse_job_id;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

/// One entry of the recent-jobs listing.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub file_name: String,
    pub format: String,
    pub quality: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: ProgressEvent,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            file_name: job.input.original_name.clone(),
            format: job.format.clone(),
            quality: job.quality.as_str().to_string(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            progress: ProgressEvent::current(job),
        }
    }
}

/// Recently updated jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(RECENT_JOBS_LIMIT);
    let jobs: Vec<JobSummary> = state
        .orchestrator
        .recent(limit)
        .iter()
        .map(JobSummary::from)
        .collect();
    Json(jobs)
}

/// Point-in-time progress for clients that cannot hold a WebSocket.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProgressEvent>, ApiError> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(state.orchestrator.snapshot(job_id)?))
}

/// Queue audio extraction.
///
/// # Returns
/// - 202 `started` when a worker was spawned
/// - 202 `already_processing` while extraction is queued or running
/// - 200 `already_completed` with the download URL
/// - 404 for an unknown job
pub async fn start_extraction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&id)?;
    let response = match state.orchestrator.trigger_extraction(job_id)? {
        TriggerOutcome::Started => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "started", "job_id": job_id })),
        ),
        TriggerOutcome::AlreadyActive => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "already_processing" })),
        ),
        TriggerOutcome::AlreadyCompleted => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "already_completed",
                "download_url": download_url(&job_id),
            })),
        ),
    };
    Ok(response)
}

/// Queue transcription of the extracted audio.
///
/// # Returns
/// - 202 `transcription_started` when a worker was spawned
/// - 202 `transcription_already_processing` while transcription is queued or running
/// - 200 `transcription_already_completed` with both transcript URLs
/// - 409 if extraction has not completed
/// - 404 for an unknown job
pub async fn start_transcription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&id)?;
    let response = match state.orchestrator.trigger_transcription(job_id)? {
        TriggerOutcome::Started => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "transcription_started", "job_id": job_id })),
        ),
        TriggerOutcome::AlreadyActive => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "transcription_already_processing" })),
        ),
        TriggerOutcome::AlreadyCompleted => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "transcription_already_completed",
                "transcript_txt_url": transcript_url(&job_id, "txt"),
                "transcript_srt_url": transcript_url(&job_id, "srt"),
            })),
        ),
    };
    Ok(response)
}
