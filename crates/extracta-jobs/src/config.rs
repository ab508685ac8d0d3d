//! Configuration for the job engine.
//!
//! Every struct reads its values from the environment via `from_env()` and
//! falls back to the constants in [`extracta_core::defaults`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use extracta_core::defaults;

/// Read and parse an environment variable, falling back to `default`.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Configuration for the extraction adapter.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Encoder binary.
    pub ffmpeg_bin: String,
    /// Duration probe binary.
    pub ffprobe_bin: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: defaults::FFMPEG_BIN.to_string(),
            ffprobe_bin: defaults::FFPROBE_BIN.to_string(),
        }
    }
}

impl EncoderConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FFMPEG_BIN` | `ffmpeg` | Encoder binary |
    /// | `FFPROBE_BIN` | `ffprobe` | Duration probe binary |
    pub fn from_env() -> Self {
        Self {
            ffmpeg_bin: env_string(defaults::ENV_FFMPEG_BIN, defaults::FFMPEG_BIN),
            ffprobe_bin: env_string(defaults::ENV_FFPROBE_BIN, defaults::FFPROBE_BIN),
        }
    }

    pub fn with_ffmpeg_bin(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    pub fn with_ffprobe_bin(mut self, bin: impl Into<String>) -> Self {
        self.ffprobe_bin = bin.into();
        self
    }
}

/// Configuration for the transcription adapter.
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// Speech-to-text binary.
    pub whisper_bin: String,
    /// Model file. Transcription refuses to start without one.
    pub model: Option<PathBuf>,
    /// Language hint, `auto` for detection.
    pub language: String,
    /// Interval between synthesized progress ticks.
    pub tick: Duration,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            whisper_bin: defaults::WHISPER_BIN.to_string(),
            model: None,
            language: defaults::WHISPER_LANGUAGE.to_string(),
            tick: Duration::from_millis(defaults::TRANSCRIPTION_TICK_MS),
        }
    }
}

impl TranscriberConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WHISPER_BIN` | `whisper-cli` | Speech-to-text binary |
    /// | `WHISPER_MODEL` | unset | Path to the model file |
    /// | `WHISPER_LANGUAGE` | `auto` | Language hint |
    pub fn from_env() -> Self {
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            whisper_bin: env_string(defaults::ENV_WHISPER_BIN, defaults::WHISPER_BIN),
            model,
            language: env_string(defaults::ENV_WHISPER_LANGUAGE, defaults::WHISPER_LANGUAGE),
            ..Self::default()
        }
    }

    pub fn with_whisper_bin(mut self, bin: impl Into<String>) -> Self {
        self.whisper_bin = bin.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<PathBuf>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

/// Configuration for the stale-job reaper.
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// Time between sweeps. Zero disables the reaper.
    pub interval: Duration,
    /// Idle time after which a job is removed. Zero disables the reaper.
    pub ttl: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(defaults::CLEANUP_INTERVAL_SECS),
            ttl: Duration::from_secs(defaults::JOB_TTL_SECS),
        }
    }
}

impl ReaperConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CLEANUP_INTERVAL_SECS` | `1800` | Time between sweeps |
    /// | `JOB_TTL_SECS` | `86400` | Idle time before a job is reaped |
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(env_or(
                defaults::ENV_CLEANUP_INTERVAL_SECS,
                defaults::CLEANUP_INTERVAL_SECS,
            )),
            ttl: Duration::from_secs(env_or(defaults::ENV_JOB_TTL_SECS, defaults::JOB_TTL_SECS)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether sweeps should run at all.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero() && !self.ttl.is_zero()
    }
}

/// Configuration for the job orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory receiving stage artifacts.
    pub outputs_dir: PathBuf,
    /// Deadline for one extraction run.
    pub extraction_timeout: Duration,
    /// Deadline for one transcription run.
    pub transcription_timeout: Duration,
    /// Per-subscriber event queue capacity.
    pub subscriber_buffer: usize,
    /// Jobs idle this long are hidden from lookups. Zero disables expiry.
    pub job_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            outputs_dir: PathBuf::from(defaults::OUTPUTS_DIR),
            extraction_timeout: Duration::from_secs(defaults::EXTRACTION_TIMEOUT_SECS),
            transcription_timeout: Duration::from_secs(defaults::TRANSCRIPTION_TIMEOUT_SECS),
            subscriber_buffer: defaults::SUBSCRIBER_BUFFER,
            job_ttl: Duration::from_secs(defaults::JOB_TTL_SECS),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OUTPUTS_DIR` | `outputs` | Artifact directory |
    /// | `EXTRACTION_TIMEOUT_SECS` | `1800` | Extraction deadline |
    /// | `TRANSCRIPTION_TIMEOUT_SECS` | `2700` | Transcription deadline |
    /// | `SUBSCRIBER_BUFFER` | `64` | Per-observer queue capacity |
    /// | `JOB_TTL_SECS` | `86400` | Idle time before a job expires |
    pub fn from_env() -> Self {
        Self {
            outputs_dir: PathBuf::from(env_string(
                defaults::ENV_OUTPUTS_DIR,
                defaults::OUTPUTS_DIR,
            )),
            extraction_timeout: Duration::from_secs(env_or(
                defaults::ENV_EXTRACTION_TIMEOUT_SECS,
                defaults::EXTRACTION_TIMEOUT_SECS,
            )),
            transcription_timeout: Duration::from_secs(env_or(
                defaults::ENV_TRANSCRIPTION_TIMEOUT_SECS,
                defaults::TRANSCRIPTION_TIMEOUT_SECS,
            )),
            subscriber_buffer: env_or(defaults::ENV_SUBSCRIBER_BUFFER, defaults::SUBSCRIBER_BUFFER)
                .max(1),
            job_ttl: Duration::from_secs(env_or(defaults::ENV_JOB_TTL_SECS, defaults::JOB_TTL_SECS)),
        }
    }

    pub fn with_outputs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.outputs_dir = dir.into();
        self
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub fn with_transcription_timeout(mut self, timeout: Duration) -> Self {
        self.transcription_timeout = timeout;
        self
    }

    pub fn with_subscriber_buffer(mut self, capacity: usize) -> Self {
        self.subscriber_buffer = capacity.max(1);
        self
    }

    pub fn with_job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = ttl;
        self
    }
}
