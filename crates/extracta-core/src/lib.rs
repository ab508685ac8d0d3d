//! # extracta-core
//!
//! Core types, the stage state machine and error definitions for extracta.
//!
//! This crate provides the foundational data structures that the job engine
//! (`extracta-jobs`) and the HTTP surface (`extracta-api`) depend on. It does
//! no I/O.

pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod models;
pub mod stage;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{download_url, transcript_url, ProgressEvent};
pub use file_safety::{parse_output_format, parse_quality, sanitize_upload_name, upload_file_name};
pub use models::*;
pub use stage::TriggerOutcome;
