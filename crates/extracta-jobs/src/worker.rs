//! Stage worker: runs one accepted trigger to a terminal state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use extracta_core::events::messages;
use extracta_core::{ArtifactKind, Error, Job, ProgressEvent, Result, Stage};

use crate::broadcaster::ProgressBroadcaster;
use crate::handler::{ExecutionContext, StageAdapter, StageContext};
use crate::registry::JobRegistry;

/// Everything a spawned stage run needs, detached from the orchestrator.
pub(crate) struct StageWorker {
    pub registry: Arc<JobRegistry>,
    pub broadcaster: ProgressBroadcaster,
    pub adapter: Arc<dyn StageAdapter>,
    pub outputs_dir: PathBuf,
    pub timeout: Duration,
    pub token: CancellationToken,
}

impl StageWorker {
    fn stage(&self) -> Stage {
        self.adapter.stage()
    }

    /// Drive the stage from `queued` to `completed` or `failed`.
    pub async fn run(self, job_id: Uuid) {
        let start = Instant::now();
        let stage = self.stage();
        info!(%job_id, %stage, tool = self.adapter.name(), "Stage started");

        match self.execute(job_id).await {
            Ok(()) => self.complete(job_id, start),
            Err(e) => self.fail(job_id, e, start),
        }
    }

    async fn execute(&self, job_id: Uuid) -> Result<()> {
        let stage = self.stage();

        tokio::fs::create_dir_all(&self.outputs_dir)
            .await
            .map_err(|e| Error::Internal(format!("failed to create outputs dir: {e}")))?;

        let job = self.record(
            job_id,
            |job| {
                let planned = job.planned_artifacts(stage, &self.outputs_dir);
                job.start_processing(stage, planned, Utc::now())?;
                Ok(job.clone())
            },
            None,
        )?;

        let input = stage_input(&job, stage)?;
        let artifacts = job.stage(stage).artifacts.clone();
        let execution = ExecutionContext::new(self.token.clone(), self.timeout);

        let registry = self.registry.clone();
        let broadcaster = self.broadcaster.clone();
        let ctx = StageContext::new(job, input, artifacts, execution).with_progress_callback(
            move |percent, _status, message| {
                let update = broadcaster.publish_with(job_id, || {
                    registry.mutate(job_id, |job| {
                        job.record_progress(stage, percent, Utc::now())?;
                        Ok(((), Some(ProgressEvent::for_stage(job, stage, Some(message)))))
                    })
                });
                if let Err(e) = update {
                    debug!(%job_id, %stage, error = %e, "Dropped progress update");
                }
            },
        );

        self.adapter.run(ctx).await
    }

    fn complete(&self, job_id: Uuid, start: Instant) {
        let stage = self.stage();
        let message = match stage {
            Stage::Extraction => messages::EXTRACTION_COMPLETED,
            Stage::Transcription => messages::TRANSCRIPTION_COMPLETED,
        };

        let update = self.record(job_id, |job| job.complete(stage, Utc::now()), Some(message));

        match update {
            Ok(()) => {
                info!(
                    %job_id,
                    %stage,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Stage completed successfully"
                );
            }
            Err(e) => warn!(%job_id, %stage, error = %e, "Could not record stage completion"),
        }
    }

    fn fail(&self, job_id: Uuid, error: Error, start: Instant) {
        let stage = self.stage();
        let message = match stage {
            Stage::Extraction => messages::EXTRACTION_FAILED,
            Stage::Transcription => messages::TRANSCRIPTION_FAILED,
        };
        let error_text = error.to_string();

        let update = self.record(
            job_id,
            |job| job.fail(stage, &error_text, Utc::now()),
            Some(message),
        );

        let duration_ms = start.elapsed().as_millis() as u64;
        if error.is_cancellation() {
            warn!(%job_id, %stage, error = %error_text, duration_ms, "Stage cancelled");
        } else {
            error!(%job_id, %stage, error = %error_text, duration_ms, "Stage failed");
        }

        if let Err(e) = update {
            warn!(%job_id, %stage, error = %e, "Could not record stage failure");
        }
    }

    /// Apply `change` to the job and publish the resulting stage event.
    ///
    /// Both happen under the broadcaster lock, so a later trigger's events
    /// can never be overtaken by this one.
    fn record<T, F>(&self, job_id: Uuid, change: F, message: Option<&str>) -> Result<T>
    where
        F: FnOnce(&mut Job) -> Result<T>,
    {
        let stage = self.stage();
        self.broadcaster.publish_with(job_id, || {
            self.registry.mutate(job_id, |job| {
                let value = change(&mut *job)?;
                Ok((value, Some(ProgressEvent::for_stage(job, stage, message))))
            })
        })
    }
}

/// The file a stage reads: the upload for extraction, its audio for transcription.
fn stage_input(job: &Job, stage: Stage) -> Result<PathBuf> {
    match stage {
        Stage::Extraction => Ok(job.input.path.clone()),
        Stage::Transcription => job
            .extraction
            .artifact(ArtifactKind::Audio)
            .map(|a| a.path.clone())
            .ok_or_else(|| {
                Error::ArtifactMissing("extracted audio not found for transcription".to_string())
            }),
    }
}
