//! Job and stage data model.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{defaults, Error};

// =============================================================================
// STAGES
// =============================================================================

/// One of the two independent phases of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Transcription,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Transcription => "transcription",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    /// Input stored, extraction not yet triggered. Equivalent to `NotStarted`.
    Uploaded,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl StageStatus {
    /// Queued or processing: a worker owns the stage.
    pub fn is_active(&self) -> bool {
        matches!(self, StageStatus::Queued | StageStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::Uploaded => "uploaded",
            StageStatus::Queued => "queued",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FORMAT / QUALITY
// =============================================================================

/// Audio container/codec families the encoder table knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Aac,
    Flac,
    Ogg,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Aac,
        AudioFormat::Flac,
        AudioFormat::Ogg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "aac" => Ok(AudioFormat::Aac),
            "flac" => Ok(AudioFormat::Flac),
            "ogg" => Ok(AudioFormat::Ogg),
            other => Err(Error::InvalidInput(format!(
                "unsupported output format: {other:?}"
            ))),
        }
    }
}

/// Quality tier; the codec table decides what each tier means per codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
    Original,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Low,
        Quality::Medium,
        Quality::High,
        Quality::Original,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Original => "original",
        }
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "original" => Ok(Quality::Original),
            other => Err(Error::InvalidInput(format!("unsupported quality: {other:?}"))),
        }
    }
}

// =============================================================================
// ARTIFACTS
// =============================================================================

/// What an output file on disk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Audio,
    TranscriptTxt,
    TranscriptSrt,
}

/// An output file produced (or planned) by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// File name offered to downloaders.
    pub name: String,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { kind, path, name }
    }
}

// =============================================================================
// JOB
// =============================================================================

/// Per-stage state. Always replaced as a whole by the transition functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageStatus,
    pub progress: u8,
    /// Last error message, empty if none.
    pub error: String,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(status: StageStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            progress: 0,
            error: String::new(),
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

/// The uploaded input a job works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub path: PathBuf,
    pub original_name: String,
}

/// A media-processing job with two independent stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub input: InputFile,
    /// Declared output format, lowercased. Unknown values encode as passthrough.
    pub format: String,
    pub quality: Quality,
    pub extraction: StageRecord,
    pub transcription: StageRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a freshly uploaded job with a new time-ordered id.
    pub fn new(input: InputFile, format: impl Into<String>, quality: Quality) -> Self {
        Self::with_id(Uuid::now_v7(), input, format, quality, Utc::now())
    }

    pub fn with_id(
        id: Uuid,
        input: InputFile,
        format: impl Into<String>,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            input,
            format: format.into().trim().to_lowercase(),
            quality,
            extraction: StageRecord::new(StageStatus::Uploaded, now),
            transcription: StageRecord::new(StageStatus::NotStarted, now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::Extraction => &self.extraction,
            Stage::Transcription => &self.transcription,
        }
    }

    /// Name of the extraction output file, `<id>.<format>`.
    pub fn output_name(&self) -> String {
        let ext = self.format.trim_start_matches('.');
        let ext = if ext.is_empty() {
            defaults::OUTPUT_FORMAT
        } else {
            ext
        };
        format!("{}.{}", self.id, ext)
    }

    /// Planned output files for a stage rooted at `outputs_dir`.
    pub fn planned_artifacts(&self, stage: Stage, outputs_dir: &Path) -> Vec<Artifact> {
        match stage {
            Stage::Extraction => vec![Artifact::new(
                ArtifactKind::Audio,
                outputs_dir.join(self.output_name()),
            )],
            Stage::Transcription => {
                let base = self.transcript_base(outputs_dir);
                vec![
                    Artifact::new(ArtifactKind::TranscriptTxt, with_suffix(&base, ".txt")),
                    Artifact::new(ArtifactKind::TranscriptSrt, with_suffix(&base, ".srt")),
                ]
            }
        }
    }

    /// Output base handed to the transcriber; it appends `.txt` / `.srt`.
    pub fn transcript_base(&self, outputs_dir: &Path) -> PathBuf {
        outputs_dir.join(format!("{}{}", self.id, defaults::TRANSCRIPT_BASE_SUFFIX))
    }

    /// Every file this job references on disk.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(4);
        if !self.input.path.as_os_str().is_empty() {
            paths.push(self.input.path.clone());
        }
        paths.extend(
            self.extraction
                .artifacts
                .iter()
                .chain(self.transcription.artifacts.iter())
                .map(|a| a.path.clone()),
        );
        paths
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut os = base.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
