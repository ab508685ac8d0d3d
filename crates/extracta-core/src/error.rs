//! Error types for extracta.

use thiserror::Error;

/// Result type alias using extracta's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for extracta operations.
///
/// The first three variants are surfaced synchronously to the caller that
/// triggered them and never change job state. The process-related variants
/// are recorded on the failing stage and broadcast to observers.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown or expired job
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stage precondition violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External binary missing or could not be started
    #[error("Process launch error: {0}")]
    ProcessLaunch(String),

    /// External process exited unsuccessfully
    #[error("Process execution error: {0}")]
    ProcessExecution(String),

    /// Deadline expiry or explicit cancellation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Duration probe failed (non-fatal)
    #[error("Probe error: {0}")]
    Probe(String),

    /// Process reported success but an expected output file is absent
    #[error("Artifact missing: {0}")]
    ArtifactMissing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from cancellation rather than a tool failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("job abc".to_string());
        assert_eq!(err.to_string(), "Not found: job abc");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("extraction not completed".to_string());
        assert_eq!(err.to_string(), "Conflict: extraction not completed");
    }

    #[test]
    fn test_error_display_process_execution() {
        let err = Error::ProcessExecution("ffmpeg failed: bad input".to_string());
        assert_eq!(
            err.to_string(),
            "Process execution error: ffmpeg failed: bad input"
        );
    }

    #[test]
    fn test_error_display_cancelled() {
        let err = Error::Cancelled("deadline exceeded".to_string());
        assert_eq!(err.to_string(), "Cancelled: deadline exceeded");
    }

    #[test]
    fn test_error_display_artifact_missing() {
        let err = Error::ArtifactMissing("transcript.srt".to_string());
        assert_eq!(err.to_string(), "Artifact missing: transcript.srt");
    }

    #[test]
    fn test_cancellation_is_distinct_from_execution_failure() {
        assert!(Error::Cancelled("x".into()).is_cancellation());
        assert!(!Error::ProcessExecution("x".into()).is_cancellation());
        assert!(!Error::ProcessLaunch("x".into()).is_cancellation());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
