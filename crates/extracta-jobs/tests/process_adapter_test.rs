//! Integration tests for the ffmpeg and whisper adapters.
//!
//! The real tools are replaced by small shell scripts that mimic their
//! command-line contract, so these tests exercise process spawning, progress
//! parsing, deadlines and diagnostics end to end.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use extracta_jobs::{
    EncoderConfig, FfmpegAdapter, InputFile, Job, JobOrchestrator, NoOpAdapter,
    OrchestratorConfig, ProgressEvent, Quality, Stage, StageAdapter, StageStatus, Subscription,
    TranscriberConfig, WhisperAdapter,
};
use tempfile::TempDir;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn probe_ok(dir: &Path) -> String {
    write_script(dir, "ffprobe", "echo 100.000000")
}

fn uploaded_job(dir: &Path) -> Job {
    let input = dir.join("talk.mp4");
    std::fs::write(&input, b"video").unwrap();
    Job::new(
        InputFile {
            path: input,
            original_name: "talk.mp4".to_string(),
        },
        "mp3",
        Quality::Medium,
    )
}

fn config(dir: &TempDir) -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_outputs_dir(dir.path().join("outputs"))
        .with_subscriber_buffer(256)
}

fn with_extractor(config: OrchestratorConfig, encoder: EncoderConfig) -> JobOrchestrator {
    JobOrchestrator::new(
        config,
        Arc::new(FfmpegAdapter::new(encoder)),
        Arc::new(NoOpAdapter::new(Stage::Transcription)),
    )
    .unwrap()
}

fn with_transcriber(config: OrchestratorConfig, transcriber: TranscriberConfig) -> JobOrchestrator {
    JobOrchestrator::new(
        config,
        Arc::new(NoOpAdapter::new(Stage::Extraction)),
        Arc::new(WhisperAdapter::new(transcriber)),
    )
    .unwrap()
}

/// Receive events until `stage` reaches a terminal status.
async fn until_terminal(sub: &mut Subscription, stage: Stage) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(15), sub.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("subscription closed");
        let done = event.stage == stage && event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

async fn run_extraction(orchestrator: &JobOrchestrator, job: Job) -> Vec<ProgressEvent> {
    let job_id = orchestrator.submit(job);
    let mut sub = orchestrator.subscribe(job_id).unwrap();
    orchestrator.trigger_extraction(job_id).unwrap();
    until_terminal(&mut sub, Stage::Extraction).await
}

async fn run_transcription(orchestrator: &JobOrchestrator, job: Job) -> Vec<ProgressEvent> {
    let job_id = orchestrator.submit(job);
    let mut sub = orchestrator.subscribe(job_id).unwrap();
    orchestrator.trigger_extraction(job_id).unwrap();
    until_terminal(&mut sub, Stage::Extraction).await;
    orchestrator.trigger_transcription(job_id).unwrap();
    until_terminal(&mut sub, Stage::Transcription).await
}

/// Shell fragment that backgrounds a grandchild which drops `marker` after a second.
fn grandchild(marker: &Path, redirect: &str) -> String {
    format!(r#"(sleep 1; touch "{}") {redirect} &"#, marker.display())
}

/// Assert the grandchild never got to drop its marker.
async fn assert_grandchild_killed(marker: &Path) {
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "grandchild outlived the stage");
}

fn model_file(dir: &Path) -> PathBuf {
    let model = dir.join("ggml-base.bin");
    std::fs::write(&model, b"model").unwrap();
    model
}

// ============================================================================
// FFMPEG
// ============================================================================

#[tokio::test]
async fn test_ffmpeg_reports_ratio_progress_and_completes() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("ffmpeg.args");
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        &format!(
            r#"echo "$@" > "{args}"
for arg in "$@"; do out="$arg"; done
echo "out_time_ms=50000000"
echo "progress=continue"
printf 'audio' > "$out"
echo "out_time_ms=100000000"
echo "progress=end""#,
            args = args_file.display()
        ),
    );
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(probe_ok(dir.path()));
    let orchestrator = with_extractor(config(&dir), encoder);

    let job = uploaded_job(dir.path());
    let job_id = job.id;
    let events = run_extraction(&orchestrator, job).await;

    assert!(events
        .iter()
        .any(|e| e.status == StageStatus::Processing && e.progress == 50));
    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(last.download_url, Some(format!("/download/{job_id}")));

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(args.contains("-vn -f mp3 -codec:a libmp3lame -b:a 192k"));
    assert!(args.contains("-progress pipe:1 -nostats"));

    let job = orchestrator.job(job_id).unwrap();
    assert_eq!(
        std::fs::read_to_string(&job.extraction.artifacts[0].path).unwrap(),
        "audio"
    );
}

#[tokio::test]
async fn test_ffmpeg_failure_carries_last_stderr_line() {
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        r#"echo "ffmpeg version n6.1" >&2
echo "talk.mp4: Invalid data found when processing input" >&2
echo "" >&2
exit 1"#,
    );
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(probe_ok(dir.path()));
    let orchestrator = with_extractor(config(&dir), encoder);

    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Failed);
    assert_eq!(last.progress, 0);
    assert_eq!(
        last.error.as_deref(),
        Some("Process execution error: ffmpeg failed: talk.mp4: Invalid data found when processing input")
    );
}

#[tokio::test]
async fn test_ffmpeg_silent_failure_reports_exit_status() {
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", "exit 3");
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(probe_ok(dir.path()));
    let orchestrator = with_extractor(config(&dir), encoder);

    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    let error = events.last().unwrap().error.clone().unwrap();
    assert!(error.contains("ffmpeg failed ("), "unexpected error: {error}");
}

#[tokio::test]
async fn test_probe_failure_still_completes() {
    let dir = TempDir::new().unwrap();
    let ffprobe = write_script(dir.path(), "ffprobe", "echo 'no such file' >&2; exit 1");
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        r#"for arg in "$@"; do out="$arg"; done
echo "out_time_ms=50000000"
printf 'audio' > "$out"
echo "progress=end""#,
    );
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(ffprobe);
    let orchestrator = with_extractor(config(&dir), encoder);

    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    assert!(!events.iter().any(|e| e.progress == 50));
    assert_eq!(events.last().unwrap().status, StageStatus::Completed);
}

#[tokio::test]
async fn test_ffmpeg_without_output_is_artifact_missing() {
    let dir = TempDir::new().unwrap();
    let ffmpeg = write_script(dir.path(), "ffmpeg", r#"echo "progress=end""#);
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(probe_ok(dir.path()));
    let orchestrator = with_extractor(config(&dir), encoder);

    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    let error = events.last().unwrap().error.clone().unwrap();
    assert!(error.starts_with("Artifact missing:"), "unexpected error: {error}");
}

#[tokio::test]
async fn test_ffmpeg_killed_at_deadline() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("alive");
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        &format!("{}\nsleep 30", grandchild(&marker, "")),
    );
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(probe_ok(dir.path()));
    let orchestrator = with_extractor(
        config(&dir).with_extraction_timeout(Duration::from_millis(300)),
        encoder,
    );

    let started = std::time::Instant::now();
    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Failed);
    let error = last.error.as_deref().unwrap();
    assert!(error.starts_with("Cancelled: deadline"), "unexpected error: {error}");
    assert_grandchild_killed(&marker).await;
}

#[tokio::test]
async fn test_ffmpeg_exit_does_not_wait_on_inherited_stderr() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("alive");
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        &format!(
            "echo boom >&2\n{}\nexit 1",
            grandchild(&marker, ">/dev/null")
        ),
    );
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(ffmpeg)
        .with_ffprobe_bin(probe_ok(dir.path()));
    let orchestrator = with_extractor(
        config(&dir).with_extraction_timeout(Duration::from_secs(30)),
        encoder,
    );

    let started = std::time::Instant::now();
    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    assert!(started.elapsed() < Duration::from_secs(3));

    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Failed);
    assert_eq!(
        last.error.as_deref(),
        Some("Process execution error: ffmpeg failed: boom")
    );
    assert_grandchild_killed(&marker).await;
}

#[tokio::test]
async fn test_missing_ffmpeg_binary_is_launch_error() {
    let dir = TempDir::new().unwrap();
    let encoder = EncoderConfig::default()
        .with_ffmpeg_bin(dir.path().join("no-ffmpeg").to_string_lossy())
        .with_ffprobe_bin(probe_ok(dir.path()));
    let adapter = FfmpegAdapter::new(encoder.clone());
    assert!(!adapter.health_check().await.unwrap());

    let orchestrator = with_extractor(config(&dir), encoder);
    let events = run_extraction(&orchestrator, uploaded_job(dir.path())).await;
    let error = events.last().unwrap().error.clone().unwrap();
    assert!(error.starts_with("Process launch error:"), "unexpected error: {error}");
}

// ============================================================================
// WHISPER
// ============================================================================

const WHISPER_OUTPUT_BASE: &str = r#"base=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-of" ]; then base="$2"; fi
  shift
done"#;

#[tokio::test]
async fn test_whisper_writes_transcripts_and_ticks() {
    let dir = TempDir::new().unwrap();
    let whisper = write_script(
        dir.path(),
        "whisper-cli",
        &format!(
            r#"{WHISPER_OUTPUT_BASE}
sleep 0.4
echo "hello world" > "$base.txt"
printf '1\n00:00:00,000 --> 00:00:01,000\nhello world\n' > "$base.srt""#
        ),
    );
    let transcriber = TranscriberConfig::default()
        .with_whisper_bin(whisper)
        .with_model(model_file(dir.path()))
        .with_tick(Duration::from_millis(50));
    let orchestrator = with_transcriber(config(&dir), transcriber);

    let job = uploaded_job(dir.path());
    let job_id = job.id;
    let events = run_transcription(&orchestrator, job).await;

    let ticks: Vec<u8> = events
        .iter()
        .filter(|e| e.stage == Stage::Transcription && e.status == StageStatus::Processing)
        .map(|e| e.progress)
        .collect();
    assert!(ticks.contains(&12), "ticks: {ticks:?}");
    assert!(ticks.iter().all(|p| *p <= 96 || *p == 100));

    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(
        last.transcript_srt_url,
        Some(format!("/transcript/{job_id}?format=srt"))
    );

    let job = orchestrator.job(job_id).unwrap();
    let txt = &job.transcription.artifacts[0].path;
    assert_eq!(std::fs::read_to_string(txt).unwrap(), "hello world\n");
}

#[tokio::test]
async fn test_whisper_missing_srt_is_artifact_missing() {
    let dir = TempDir::new().unwrap();
    let whisper = write_script(
        dir.path(),
        "whisper-cli",
        &format!(
            r#"{WHISPER_OUTPUT_BASE}
echo "hello" > "$base.txt""#
        ),
    );
    let transcriber = TranscriberConfig::default()
        .with_whisper_bin(whisper)
        .with_model(model_file(dir.path()));
    let orchestrator = with_transcriber(config(&dir), transcriber);

    let events = run_transcription(&orchestrator, uploaded_job(dir.path())).await;
    let error = events.last().unwrap().error.clone().unwrap();
    assert!(
        error.starts_with("Artifact missing: SRT transcript"),
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn test_whisper_failure_carries_diagnostic() {
    let dir = TempDir::new().unwrap();
    let whisper = write_script(
        dir.path(),
        "whisper-cli",
        r#"echo "whisper_init_from_file: loading model" >&2
echo "whisper_init_from_file: failed to load model" >&2
exit 2"#,
    );
    let transcriber = TranscriberConfig::default()
        .with_whisper_bin(whisper)
        .with_model(model_file(dir.path()));
    let orchestrator = with_transcriber(config(&dir), transcriber);

    let events = run_transcription(&orchestrator, uploaded_job(dir.path())).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Failed);
    assert!(last
        .error
        .as_deref()
        .unwrap()
        .ends_with("whisper-cli failed: whisper_init_from_file: failed to load model"));
}

#[tokio::test]
async fn test_whisper_killed_at_deadline() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("alive");
    let whisper = write_script(
        dir.path(),
        "whisper-cli",
        &format!("{}\nwait", grandchild(&marker, "")),
    );
    let transcriber = TranscriberConfig::default()
        .with_whisper_bin(whisper)
        .with_model(model_file(dir.path()));
    let orchestrator = with_transcriber(
        config(&dir).with_transcription_timeout(Duration::from_millis(300)),
        transcriber,
    );

    let started = std::time::Instant::now();
    let events = run_transcription(&orchestrator, uploaded_job(dir.path())).await;
    assert!(started.elapsed() < Duration::from_secs(3));

    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Failed);
    let error = last.error.as_deref().unwrap();
    assert!(error.starts_with("Cancelled: deadline"), "unexpected error: {error}");
    assert_grandchild_killed(&marker).await;
}

#[tokio::test]
async fn test_whisper_killed_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("alive");
    let whisper = write_script(
        dir.path(),
        "whisper-cli",
        &format!("{}\nwait", grandchild(&marker, "")),
    );
    let transcriber = TranscriberConfig::default()
        .with_whisper_bin(whisper)
        .with_model(model_file(dir.path()));
    let orchestrator = with_transcriber(config(&dir), transcriber);

    let job_id = orchestrator.submit(uploaded_job(dir.path()));
    let mut sub = orchestrator.subscribe(job_id).unwrap();
    orchestrator.trigger_extraction(job_id).unwrap();
    until_terminal(&mut sub, Stage::Extraction).await;
    orchestrator.trigger_transcription(job_id).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    orchestrator.shutdown().await;
    let events = until_terminal(&mut sub, Stage::Transcription).await;
    let last = events.last().unwrap();
    assert_eq!(last.status, StageStatus::Failed);
    assert_eq!(last.error.as_deref(), Some("Cancelled: job cancelled"));
    assert_grandchild_killed(&marker).await;
}

#[tokio::test]
async fn test_whisper_exit_does_not_wait_on_inherited_stderr() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("alive");
    let whisper = write_script(
        dir.path(),
        "whisper-cli",
        &format!(
            "echo \"failed to load model\" >&2\n{}\nexit 2",
            grandchild(&marker, ">/dev/null")
        ),
    );
    let transcriber = TranscriberConfig::default()
        .with_whisper_bin(whisper)
        .with_model(model_file(dir.path()));
    let orchestrator = with_transcriber(
        config(&dir).with_transcription_timeout(Duration::from_secs(30)),
        transcriber,
    );

    let started = std::time::Instant::now();
    let events = run_transcription(&orchestrator, uploaded_job(dir.path())).await;
    assert!(started.elapsed() < Duration::from_secs(3));

    let last = events.last().unwrap();
    assert_eq!(
        last.error.as_deref(),
        Some("Process execution error: whisper-cli failed: failed to load model")
    );
    assert_grandchild_killed(&marker).await;
}

#[tokio::test]
async fn test_whisper_without_model_fails_to_launch() {
    let dir = TempDir::new().unwrap();
    let whisper = write_script(dir.path(), "whisper-cli", "exit 0");
    let orchestrator = with_transcriber(
        config(&dir),
        TranscriberConfig::default().with_whisper_bin(whisper),
    );

    let events = run_transcription(&orchestrator, uploaded_job(dir.path())).await;
    assert_eq!(
        events.last().unwrap().error.as_deref(),
        Some("Process launch error: whisper model is not configured")
    );
}
