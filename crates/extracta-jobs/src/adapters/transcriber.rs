//! WhisperAdapter: transcribes the extracted audio with whisper.cpp.
//!
//! whisper-cli gives no machine-readable progress, so progress is
//! synthesized from a ticker that creeps towards (but never reaches)
//! completion while the process runs.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use extracta_core::defaults::{
    TRANSCRIPTION_PROGRESS_CEILING, TRANSCRIPTION_PROGRESS_START, TRANSCRIPTION_PROGRESS_STEP,
};
use extracta_core::{ArtifactKind, Error, Result, Stage, StageStatus};

use super::process;
use crate::config::TranscriberConfig;
use crate::handler::{StageAdapter, StageContext};

const TOOL: &str = "whisper-cli";

pub struct WhisperAdapter {
    config: TranscriberConfig,
}

impl WhisperAdapter {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    async fn model(&self) -> Result<&Path> {
        let model = self
            .config
            .model
            .as_deref()
            .ok_or_else(|| Error::ProcessLaunch("whisper model is not configured".to_string()))?;
        if !tokio::fs::try_exists(model).await.unwrap_or(false) {
            return Err(Error::ProcessLaunch(format!(
                "whisper model not found at {}",
                model.display()
            )));
        }
        Ok(model)
    }
}

/// whisper-cli arguments; outputs land at `<base>.txt` and `<base>.srt`.
pub fn whisper_args(model: &Path, input: &Path, output_base: &Path, language: &str) -> Vec<String> {
    let mut args = vec!["-m".to_string(), model.to_string_lossy().into_owned()];
    args.extend(["-f".to_string(), input.to_string_lossy().into_owned()]);
    args.extend(["-of".to_string(), output_base.to_string_lossy().into_owned()]);
    args.extend(["-otxt", "-osrt", "-l"].map(String::from));
    args.push(language.to_string());
    args
}

/// Next synthesized progress value after a tick.
pub fn next_tick_progress(current: u8) -> u8 {
    if current < TRANSCRIPTION_PROGRESS_CEILING {
        current + TRANSCRIPTION_PROGRESS_STEP
    } else {
        current
    }
}

/// Output base shared by the planned transcript files.
fn output_base(txt: &Path) -> PathBuf {
    txt.with_extension("")
}

enum Step {
    Exited(std::io::Result<ExitStatus>),
    Stopped(Error),
    Tick,
}

#[async_trait]
impl StageAdapter for WhisperAdapter {
    fn stage(&self) -> Stage {
        Stage::Transcription
    }

    fn name(&self) -> &'static str {
        TOOL
    }

    async fn run(&self, ctx: StageContext) -> Result<()> {
        let job_id = ctx.job.id;
        let model = self.model().await?;
        let txt = ctx.artifact_path(ArtifactKind::TranscriptTxt)?.to_path_buf();
        let srt = ctx.artifact_path(ArtifactKind::TranscriptSrt)?.to_path_buf();
        let base = output_base(&txt);

        ctx.report_progress(1, StageStatus::Processing, "starting transcription");

        let args = whisper_args(model, &ctx.input, &base, &self.config.language);
        debug!(%job_id, ?args, "Starting whisper-cli");

        let mut cmd = process::command(&self.config.whisper_bin);
        cmd.args(&args);
        let mut child = process::spawn(&mut cmd, TOOL)?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("whisper-cli stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("whisper-cli stderr not captured".to_string()))?;
        let output = tokio::spawn(process::collect_output(stdout, stderr));

        // interval_at panics on a zero period.
        let tick = self.config.tick.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = TRANSCRIPTION_PROGRESS_START;

        let status = loop {
            let step = tokio::select! {
                status = child.wait() => Step::Exited(status),
                reason = ctx.execution().done() => Step::Stopped(reason),
                _ = ticker.tick() => Step::Tick,
            };

            match step {
                Step::Exited(status) => break status?,
                Step::Stopped(reason) => {
                    process::terminate(&mut child, pid).await;
                    output.abort();
                    return Err(reason);
                }
                Step::Tick => {
                    progress = next_tick_progress(progress);
                    ctx.report_progress(progress, StageStatus::Processing, "transcribing audio");
                }
            }
        };

        if !status.success() {
            process::kill_group(pid);
            let combined = process::drain(output, ctx.execution()).await?.unwrap_or_default();
            let diagnostic = process::compact_log_line(&combined);
            return Err(process::execution_error(TOOL, diagnostic, status));
        }
        output.abort();

        for (path, label) in [(&txt, "TXT"), (&srt, "SRT")] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(Error::ArtifactMissing(format!(
                    "{label} transcript was not generated at {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.model().await.is_ok())
    }
}
