//! Stage state machine.
//!
//! ```text
//! not_started | uploaded | failed --trigger--> queued --start--> processing
//! processing --complete--> completed
//! queued | processing --fail--> failed
//! ```
//!
//! Every transition builds a new [`StageRecord`] and swaps it in, so a
//! rejected transition leaves the job exactly as it was.

use chrono::{DateTime, Utc};

use crate::defaults::PROGRESS_QUEUED;
use crate::models::{Artifact, Job, Stage, StageRecord, StageStatus};
use crate::{Error, Result};

/// Result of asking a stage to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The stage moved to `queued`; the caller must spawn a worker.
    Started,
    /// A worker already owns the stage. Nothing changed.
    AlreadyActive,
    /// The stage already finished successfully. Nothing changed.
    AlreadyCompleted,
}

impl Job {
    /// Move `stage` to `queued` if nothing prevents it.
    ///
    /// Transcription additionally requires a completed extraction. Re-running
    /// extraction discards any previous transcription since its input is
    /// about to be regenerated.
    pub fn trigger(&mut self, stage: Stage, now: DateTime<Utc>) -> Result<TriggerOutcome> {
        if stage == Stage::Transcription && self.extraction.status != StageStatus::Completed {
            return Err(Error::Conflict(format!(
                "extraction for job {} is not completed (status: {})",
                self.id, self.extraction.status
            )));
        }

        let current = self.stage(stage);
        if current.status.is_active() {
            return Ok(TriggerOutcome::AlreadyActive);
        }
        if current.status == StageStatus::Completed {
            return Ok(TriggerOutcome::AlreadyCompleted);
        }

        let queued = StageRecord {
            status: StageStatus::Queued,
            progress: PROGRESS_QUEUED,
            error: String::new(),
            artifacts: current.artifacts.clone(),
            created_at: current.created_at,
            updated_at: now,
        };
        self.replace(stage, queued, now);

        if stage == Stage::Extraction {
            let reset = StageRecord::new(StageStatus::NotStarted, now);
            self.replace(Stage::Transcription, reset, now);
        }
        Ok(TriggerOutcome::Started)
    }

    /// `queued -> processing`, recording where the stage will write its output.
    pub fn start_processing(
        &mut self,
        stage: Stage,
        artifacts: Vec<Artifact>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let current = self.expect_status(stage, &[StageStatus::Queued], "start")?;
        let next = StageRecord {
            status: StageStatus::Processing,
            progress: current.progress.max(PROGRESS_QUEUED),
            error: String::new(),
            artifacts,
            created_at: current.created_at,
            updated_at: now,
        };
        self.replace(stage, next, now);
        Ok(())
    }

    /// Record an intermediate progress value for a processing stage.
    ///
    /// Values are clamped to `1..=100` and never move backwards within a run.
    pub fn record_progress(&mut self, stage: Stage, percent: u8, now: DateTime<Utc>) -> Result<()> {
        let current = self.expect_status(stage, &[StageStatus::Processing], "report progress")?;
        let next = StageRecord {
            progress: percent.clamp(PROGRESS_QUEUED, 100).max(current.progress),
            updated_at: now,
            ..current.clone()
        };
        self.replace(stage, next, now);
        Ok(())
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, stage: Stage, now: DateTime<Utc>) -> Result<()> {
        let current = self.expect_status(stage, &[StageStatus::Processing], "complete")?;
        let next = StageRecord {
            status: StageStatus::Completed,
            progress: 100,
            error: String::new(),
            updated_at: now,
            ..current.clone()
        };
        self.replace(stage, next, now);
        Ok(())
    }

    /// `queued | processing -> failed`, storing the error text.
    pub fn fail(&mut self, stage: Stage, error: &str, now: DateTime<Utc>) -> Result<()> {
        let current = self.expect_status(
            stage,
            &[StageStatus::Queued, StageStatus::Processing],
            "fail",
        )?;
        let next = StageRecord {
            status: StageStatus::Failed,
            progress: 0,
            error: error.to_string(),
            updated_at: now,
            ..current.clone()
        };
        self.replace(stage, next, now);
        Ok(())
    }

    fn expect_status(
        &self,
        stage: Stage,
        allowed: &[StageStatus],
        action: &str,
    ) -> Result<&StageRecord> {
        let current = self.stage(stage);
        if allowed.contains(&current.status) {
            Ok(current)
        } else {
            Err(Error::Conflict(format!(
                "cannot {action} {stage} for job {} while {}",
                self.id, current.status
            )))
        }
    }

    fn replace(&mut self, stage: Stage, record: StageRecord, now: DateTime<Utc>) {
        match stage {
            Stage::Extraction => self.extraction = record,
            Stage::Transcription => self.transcription = record,
        }
        self.updated_at = now;
    }
}
