//! Progress events delivered to job observers.
//!
//! Events are never stored: each one is computed fresh from a [`Job`]
//! snapshot, so the live stream, the initial subscription snapshot and the
//! poll endpoint all share one shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Job, Stage, StageStatus};

/// Human-readable messages attached to lifecycle events.
pub mod messages {
    pub const EXTRACTION_QUEUED: &str = "extraction queued";
    pub const EXTRACTION_COMPLETED: &str = "extraction completed";
    pub const EXTRACTION_FAILED: &str = "extraction failed";
    pub const TRANSCRIPTION_QUEUED: &str = "transcription queued";
    pub const TRANSCRIPTION_COMPLETED: &str = "transcription completed";
    pub const TRANSCRIPTION_FAILED: &str = "transcription failed";
}

/// A point-in-time view of one stage of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_txt_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_srt_url: Option<String>,
}

impl ProgressEvent {
    /// Build the event for `stage` of `job`.
    pub fn for_stage(job: &Job, stage: Stage, message: Option<&str>) -> Self {
        let record = job.stage(stage);
        let completed = record.status == StageStatus::Completed;
        let (download_url, transcript_txt_url, transcript_srt_url) = match stage {
            Stage::Extraction if completed => (Some(download_url(&job.id)), None, None),
            Stage::Transcription if completed => (
                None,
                Some(transcript_url(&job.id, "txt")),
                Some(transcript_url(&job.id, "srt")),
            ),
            _ => (None, None, None),
        };

        Self {
            id: job.id,
            stage,
            status: record.status,
            progress: record.progress,
            message: message.map(str::to_string),
            error: (!record.error.is_empty()).then(|| record.error.clone()),
            download_url,
            transcript_txt_url,
            transcript_srt_url,
        }
    }

    /// The event describing where the job currently stands.
    ///
    /// Reports transcription once it has left `not_started`, else extraction.
    pub fn current(job: &Job) -> Self {
        Self::for_stage(job, current_stage(job), None)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The stage an observer should be shown for `job`.
pub fn current_stage(job: &Job) -> Stage {
    if job.transcription.status == StageStatus::NotStarted {
        Stage::Extraction
    } else {
        Stage::Transcription
    }
}

/// Download location of the extraction output.
pub fn download_url(id: &Uuid) -> String {
    format!("/download/{id}")
}

/// Download location of a transcript (`txt` or `srt`).
pub fn transcript_url(id: &Uuid, format: &str) -> String {
    format!("/transcript/{id}?format={format}")
}
