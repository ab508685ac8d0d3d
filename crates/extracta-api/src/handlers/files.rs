//! Artifact downloads.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use extracta_core::{ArtifactKind, StageStatus};

use super::parse_job_id;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct TranscriptQuery {
    pub format: Option<String>,
}

/// Extracted audio as an attachment; 409 until extraction has completed.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.orchestrator.job(parse_job_id(&id)?)?;
    if job.extraction.status != StageStatus::Completed {
        return Err(ApiError::Conflict("audio is not ready yet".into()));
    }
    let artifact = job
        .extraction
        .artifact(ArtifactKind::Audio)
        .ok_or_else(|| ApiError::NotFound("audio file not found".into()))?;

    serve_attachment(&artifact.path, &artifact.name).await
}

/// Transcript (`txt` unless `format=srt`) as an attachment; 409 until
/// transcription has completed.
pub async fn transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TranscriptQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.orchestrator.job(parse_job_id(&id)?)?;
    if job.transcription.status != StageStatus::Completed {
        return Err(ApiError::Conflict("transcript is not ready yet".into()));
    }

    let kind = match query.format.as_deref().map(str::trim) {
        Some(f) if f.eq_ignore_ascii_case("srt") => ArtifactKind::TranscriptSrt,
        _ => ArtifactKind::TranscriptTxt,
    };
    let artifact = job
        .transcription
        .artifact(kind)
        .ok_or_else(|| ApiError::NotFound("transcript file not found".into()))?;
    serve_attachment(&artifact.path, &artifact.name).await
}

async fn serve_attachment(
    path: &FsPath,
    name: &str,
) -> Result<(StatusCode, HeaderMap, Body), ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{name} not found")))?;
    let size = file.metadata().await?.len();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type(path)));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
            .map_err(|e| ApiError::Internal(format!("invalid attachment name: {e}")))?,
    );

    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))))
}

fn content_type(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "txt" => "text/plain; charset=utf-8",
        "srt" => "application/x-subrip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(FsPath::new("out/a.mp3")), "audio/mpeg");
        assert_eq!(content_type(FsPath::new("out/a.FLAC")), "audio/flac");
        assert_eq!(content_type(FsPath::new("out/a_transcript.srt")), "application/x-subrip");
        assert_eq!(content_type(FsPath::new("out/a")), "application/octet-stream");
    }
}
