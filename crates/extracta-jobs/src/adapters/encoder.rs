//! FfmpegAdapter: extracts the audio track of the uploaded input.
//!
//! Progress is the ratio of encoded time (`out_time_ms` on ffmpeg's
//! `-progress pipe:1` stream) to the duration reported by ffprobe. Without a
//! duration only the start and `progress=end` are reported.

use std::path::Path;
use std::process::ExitStatus;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use extracta_core::{ArtifactKind, Error, Result, Stage, StageStatus};

use super::codec::encoder_args;
use super::process;
use crate::config::EncoderConfig;
use crate::handler::{ExecutionContext, StageAdapter, StageContext};

const TOOL: &str = "ffmpeg";

pub struct FfmpegAdapter {
    config: EncoderConfig,
}

impl FfmpegAdapter {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Media duration in seconds via ffprobe.
    async fn probe_duration(&self, input: &Path, execution: &ExecutionContext) -> Result<f64> {
        let mut cmd = process::command(&self.config.ffprobe_bin);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input);

        let child = process::spawn(&mut cmd, "ffprobe")
            .map_err(|e| Error::Probe(e.to_string()))?;

        // kill_on_drop reaps the probe if the run is cancelled first.
        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| Error::Probe(format!("ffprobe failed: {e}")))?,
            reason = execution.done() => return Err(reason),
        };

        if !output.status.success() {
            return Err(Error::Probe(format!("ffprobe exited with {}", output.status)));
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// ffmpeg arguments for encoding `input` into `output`.
pub fn ffmpeg_args(input: &Path, output: &Path, format: &str, quality: &str) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-vn".to_string(),
    ];
    args.extend(encoder_args(format, quality));
    args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Parse ffprobe's bare duration output.
fn parse_duration(stdout: &str) -> Result<f64> {
    let raw = stdout.trim();
    if raw.is_empty() {
        return Err(Error::Probe("empty duration response".to_string()));
    }
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(Error::Probe(format!("invalid duration from ffprobe: {raw:?}"))),
    }
}

/// Map one `-progress` line to a percentage, if it carries one.
///
/// `out_time_ms` is in microseconds despite its name.
pub fn parse_progress_line(line: &str, duration_secs: Option<f64>) -> Option<u8> {
    let line = line.trim();
    if line.starts_with("progress=end") {
        return Some(100);
    }

    let micros = line.strip_prefix("out_time_ms=")?.trim().parse::<f64>().ok()?;
    let total = duration_secs.filter(|d| *d > 0.0)?;
    let ratio = (micros / 1_000_000.0 / total).clamp(0.0, 1.0);
    Some((ratio * 100.0) as u8)
}

enum Exit {
    Finished(std::io::Result<ExitStatus>),
    Stopped(Error),
}

#[async_trait]
impl StageAdapter for FfmpegAdapter {
    fn stage(&self) -> Stage {
        Stage::Extraction
    }

    fn name(&self) -> &'static str {
        TOOL
    }

    async fn run(&self, ctx: StageContext) -> Result<()> {
        let job_id = ctx.job.id;
        let output = ctx.artifact_path(ArtifactKind::Audio)?.to_path_buf();

        let duration = match self.probe_duration(&ctx.input, ctx.execution()).await {
            Ok(secs) => {
                debug!(%job_id, duration_secs = secs, "Probed input duration");
                Some(secs)
            }
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                warn!(%job_id, error = %e, "Could not probe duration, progress will be coarse");
                None
            }
        };

        let args = ffmpeg_args(
            &ctx.input,
            &output,
            &ctx.job.format,
            ctx.job.quality.as_str(),
        );
        debug!(%job_id, ?args, "Starting ffmpeg");

        ctx.report_progress(0, StageStatus::Processing, "starting extraction");

        let mut cmd = process::command(&self.config.ffmpeg_bin);
        cmd.args(&args);
        let mut child = process::spawn(&mut cmd, TOOL)?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stderr not captured".to_string()))?;
        let diagnostics = tokio::spawn(process::last_line(stderr));

        let exit = {
            let drive = async {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    if let Some(percent) = parse_progress_line(&line, duration) {
                        let message = if percent == 100 {
                            "finalizing output"
                        } else {
                            "extracting audio"
                        };
                        ctx.report_progress(percent, StageStatus::Processing, message);
                    }
                }
                child.wait().await
            };

            tokio::select! {
                status = drive => Exit::Finished(status),
                reason = ctx.execution().done() => Exit::Stopped(reason),
            }
        };

        let status = match exit {
            Exit::Finished(status) => status?,
            Exit::Stopped(reason) => {
                process::terminate(&mut child, pid).await;
                diagnostics.abort();
                return Err(reason);
            }
        };

        if !status.success() {
            // Leftover descendants would keep stderr open and outlive the run.
            process::kill_group(pid);
            let diagnostic = process::drain(diagnostics, ctx.execution()).await?.flatten();
            return Err(process::execution_error(TOOL, diagnostic, status));
        }
        diagnostics.abort();

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(Error::ArtifactMissing(format!(
                "ffmpeg produced no output at {}",
                output.display()
            )));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut cmd = process::command(&self.config.ffmpeg_bin);
        cmd.arg("-version");
        match cmd.output().await {
            Ok(output) => Ok(output.status.success()),
            Err(_) => Ok(false),
        }
    }
}
