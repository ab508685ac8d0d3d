//! Video upload.

use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use extracta_core::{
    parse_output_format, parse_quality, sanitize_upload_name, upload_file_name, InputFile, Job,
};

use crate::{ApiError, AppState};

/// Response for an accepted upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub file_name: String,
    pub format: String,
    pub quality: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub extract_url: String,
    pub ws_url: String,
}

struct SavedUpload {
    path: PathBuf,
    file_name: String,
    size_bytes: u64,
}

/// Accept a video and register a job for it.
///
/// # Multipart Fields
/// - `video`: the input file (required)
/// - `format`: mp3, wav, aac, flac or ogg (optional, default mp3)
/// - `quality`: low, medium, high or original (optional, default medium)
///
/// # Returns
/// - 201 Created with the new job id
/// - 400 Bad Request if the video is missing or empty, or a parameter is invalid
/// - 413 Payload Too Large if the video exceeds the upload limit
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = Uuid::now_v7();
    let mut saved: Option<SavedUpload> = None;
    let mut format: Option<String> = None;
    let mut quality: Option<String> = None;

    let result = async {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("video") if saved.is_none() => {
                    saved = Some(save_video(&state, job_id, field).await?);
                }
                Some("format") => format = Some(field.text().await?),
                Some("quality") => quality = Some(field.text().await?),
                _ => {}
            }
        }
        Ok::<(), ApiError>(())
    }
    .await;

    let validated = result.and_then(|()| {
        let format = parse_output_format(format.as_deref())?;
        let quality = parse_quality(quality.as_deref())?;
        Ok((format, quality))
    });

    let (format, quality) = match validated {
        Ok(params) => params,
        Err(e) => {
            if let Some(upload) = &saved {
                discard(&upload.path).await;
            }
            return Err(e);
        }
    };

    let upload = saved.ok_or_else(|| ApiError::BadRequest("video file is required".into()))?;
    if upload.size_bytes == 0 {
        discard(&upload.path).await;
        return Err(ApiError::BadRequest("video file is empty".into()));
    }

    let job = Job::with_id(
        job_id,
        InputFile {
            path: upload.path,
            original_name: upload.file_name.clone(),
        },
        format.as_str(),
        quality,
        Utc::now(),
    );
    let created_at = job.created_at;
    state.orchestrator.submit(job);

    info!(
        %job_id,
        file = %upload.file_name,
        format = format.as_str(),
        quality = quality.as_str(),
        size_bytes = upload.size_bytes,
        "Upload saved"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            job_id,
            file_name: upload.file_name,
            format: format.as_str().to_string(),
            quality: quality.as_str().to_string(),
            size_bytes: upload.size_bytes,
            created_at,
            extract_url: format!("/extract/{job_id}"),
            ws_url: format!("/ws/{job_id}"),
        }),
    ))
}

/// Stream the `video` field to the uploads directory, enforcing the size limit.
async fn save_video(
    state: &AppState,
    job_id: Uuid,
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<SavedUpload, ApiError> {
    let original = field.file_name().unwrap_or_default().to_string();
    let file_name = sanitize_upload_name(&original);
    let uploads_dir = &state.config.uploads_dir;
    let limit = state.config.max_upload_bytes;

    tokio::fs::create_dir_all(uploads_dir).await?;
    let path = uploads_dir.join(upload_file_name(&job_id, &original));
    let mut file = tokio::fs::File::create(&path).await?;

    let mut size_bytes: u64 = 0;
    let written = async {
        while let Some(chunk) = field.chunk().await? {
            size_bytes += chunk.len() as u64;
            if size_bytes > limit {
                return Err(ApiError::PayloadTooLarge(format!(
                    "video exceeds the upload limit of {limit} bytes"
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = written {
        drop(file);
        discard(&path).await;
        return Err(e);
    }

    Ok(SavedUpload {
        path,
        file_name,
        size_bytes,
    })
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Could not remove rejected upload");
    }
}
