//! # extracta-jobs
//!
//! Job engine for extracta.
//!
//! This crate provides:
//! - An in-memory job registry with atomic, state-machine-checked mutations
//! - Stage adapters driving ffmpeg (extraction) and whisper-cli (transcription)
//! - Per-job progress fan-out to any number of observers
//! - A reaper that removes stale jobs and their files
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use extracta_jobs::{
//!     EncoderConfig, FfmpegAdapter, JobOrchestrator, OrchestratorConfig, TranscriberConfig,
//!     WhisperAdapter,
//! };
//!
//! let orchestrator = JobOrchestrator::new(
//!     OrchestratorConfig::from_env(),
//!     Arc::new(FfmpegAdapter::new(EncoderConfig::from_env())),
//!     Arc::new(WhisperAdapter::new(TranscriberConfig::from_env())),
//! )?;
//!
//! let job_id = orchestrator.submit(job);
//! let mut events = orchestrator.subscribe(job_id)?;
//! orchestrator.trigger_extraction(job_id)?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?} {}%", event.status, event.progress);
//! }
//!
//! // Graceful shutdown
//! orchestrator.shutdown().await;
//! ```

pub mod adapters;
pub mod broadcaster;
pub mod config;
pub mod handler;
pub mod orchestrator;
pub mod reaper;
pub mod registry;
mod worker;

// Re-export core types
pub use extracta_core::*;

pub use adapters::{FfmpegAdapter, WhisperAdapter};
pub use broadcaster::{ProgressBroadcaster, Subscription};
pub use config::{EncoderConfig, OrchestratorConfig, ReaperConfig, TranscriberConfig};
pub use handler::{ExecutionContext, NoOpAdapter, ProgressCallback, StageAdapter, StageContext};
pub use orchestrator::JobOrchestrator;
pub use reaper::Reaper;
pub use registry::JobRegistry;
