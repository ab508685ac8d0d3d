//! Centralized default constants for extracta.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration structs in the other crates fall back to these when the
//! corresponding environment variable is unset or unparsable.

// =============================================================================
// SERVER
// =============================================================================

/// Default bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8080;

/// Maximum accepted upload size in bytes (500 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Number of jobs returned by the recent-jobs listing.
pub const RECENT_JOBS_LIMIT: usize = 10;

/// WebSocket ping interval in seconds.
pub const WS_PING_INTERVAL_SECS: u64 = 30;

/// Grace period for draining in-flight HTTP requests on shutdown.
pub const SHUTDOWN_GRACE_SECS: u64 = 15;

// =============================================================================
// STORAGE
// =============================================================================

/// Directory for uploaded inputs.
pub const UPLOADS_DIR: &str = "uploads";

/// Directory for extraction and transcription artifacts.
pub const OUTPUTS_DIR: &str = "outputs";

/// Fallback name for uploads whose name sanitizes to nothing.
pub const FALLBACK_UPLOAD_NAME: &str = "video.bin";

// =============================================================================
// EXTRACTION
// =============================================================================

/// Encoder binary.
pub const FFMPEG_BIN: &str = "ffmpeg";

/// Duration probe binary.
pub const FFPROBE_BIN: &str = "ffprobe";

/// Output format when none is declared.
pub const OUTPUT_FORMAT: &str = "mp3";

/// Quality tier when none is declared.
pub const OUTPUT_QUALITY: &str = "medium";

/// Deadline for one extraction run in seconds (30 minutes).
pub const EXTRACTION_TIMEOUT_SECS: u64 = 30 * 60;

// =============================================================================
// TRANSCRIPTION
// =============================================================================

/// Speech-to-text binary (whisper.cpp CLI).
pub const WHISPER_BIN: &str = "whisper-cli";

/// Language hint passed to the transcriber.
pub const WHISPER_LANGUAGE: &str = "auto";

/// Deadline for one transcription run in seconds (45 minutes).
pub const TRANSCRIPTION_TIMEOUT_SECS: u64 = 45 * 60;

/// Interval between synthesized transcription progress ticks in milliseconds.
pub const TRANSCRIPTION_TICK_MS: u64 = 2_000;

/// First value reported once the transcriber is running.
pub const TRANSCRIPTION_PROGRESS_START: u8 = 5;

/// Increment per synthesized tick.
pub const TRANSCRIPTION_PROGRESS_STEP: u8 = 7;

/// Ticks stop incrementing once this value is reached.
pub const TRANSCRIPTION_PROGRESS_CEILING: u8 = 90;

/// Suffix appended to the job id to form the transcript output base.
pub const TRANSCRIPT_BASE_SUFFIX: &str = "_transcript";

// =============================================================================
// PROCESS DIAGNOSTICS
// =============================================================================

/// Maximum characters of a diagnostic line kept in an error message.
pub const DIAGNOSTIC_MAX_CHARS: usize = 220;

/// How long to keep reading a tool's output pipes after it has exited.
pub const OUTPUT_DRAIN_GRACE_MS: u64 = 500;

// =============================================================================
// PROGRESS
// =============================================================================

/// Progress recorded when a stage is queued.
pub const PROGRESS_QUEUED: u8 = 1;

/// Per-subscriber event queue capacity before the subscriber is evicted.
pub const SUBSCRIBER_BUFFER: usize = 64;

// =============================================================================
// REAPER
// =============================================================================

/// Interval between reaper sweeps in seconds (30 minutes).
pub const CLEANUP_INTERVAL_SECS: u64 = 30 * 60;

/// Idle time after which a job is reaped, in seconds (24 hours).
pub const JOB_TTL_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_UPLOADS_DIR: &str = "UPLOADS_DIR";
pub const ENV_OUTPUTS_DIR: &str = "OUTPUTS_DIR";
pub const ENV_MAX_UPLOAD_BYTES: &str = "MAX_UPLOAD_BYTES";
pub const ENV_FFMPEG_BIN: &str = "FFMPEG_BIN";
pub const ENV_FFPROBE_BIN: &str = "FFPROBE_BIN";
pub const ENV_WHISPER_BIN: &str = "WHISPER_BIN";
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";
pub const ENV_WHISPER_LANGUAGE: &str = "WHISPER_LANGUAGE";
pub const ENV_EXTRACTION_TIMEOUT_SECS: &str = "EXTRACTION_TIMEOUT_SECS";
pub const ENV_TRANSCRIPTION_TIMEOUT_SECS: &str = "TRANSCRIPTION_TIMEOUT_SECS";
pub const ENV_CLEANUP_INTERVAL_SECS: &str = "CLEANUP_INTERVAL_SECS";
pub const ENV_JOB_TTL_SECS: &str = "JOB_TTL_SECS";
pub const ENV_SUBSCRIBER_BUFFER: &str = "SUBSCRIBER_BUFFER";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_deadline_longer_than_extraction() {
        assert!(TRANSCRIPTION_TIMEOUT_SECS > EXTRACTION_TIMEOUT_SECS);
    }

    #[test]
    fn test_synthesized_progress_stays_below_completion() {
        let max = TRANSCRIPTION_PROGRESS_CEILING as u16 + TRANSCRIPTION_PROGRESS_STEP as u16;
        assert!(max < 100);
    }

    #[test]
    fn test_reaper_defaults_positive() {
        assert!(CLEANUP_INTERVAL_SECS > 0);
        assert!(JOB_TTL_SECS > CLEANUP_INTERVAL_SECS);
    }
}
