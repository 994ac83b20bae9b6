/// Error taxonomy for backup and restore pipelines
///
/// Every failure keeps its precise kind until the HTTP boundary, where it is
/// collapsed into one of a handful of fixed user-facing messages.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Message returned to clients when a required field is missing
pub const REQUIRED_FIELDS_MESSAGE: &str =
    "Container name, root password, and database name are required";
pub const CONNECTION_FAILED_MESSAGE: &str = "Database connection failed";
pub const BACKUP_FAILED_MESSAGE: &str = "Backup failed";
pub const RESTORE_FAILED_MESSAGE: &str = "Restore failed";

fn pretty(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

/// Failure reported by the container runtime API
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct RuntimeError {
    pub operation: &'static str,
    pub message: String,
}

impl RuntimeError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Request rejected before any runtime call was made
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("no file was uploaded")]
    MissingArtifact,

    #[error("uploaded file not found at {0}")]
    ArtifactNotFound(PathBuf),
}

/// Connectivity test failed or the runtime could not be reached
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("database rejected the connection test")]
    Rejected,

    #[error("connection test produced no output")]
    NoOutput,

    #[error("connection test timed out after {}", pretty(.0))]
    TimedOut(Duration),
}

/// Dump or restore command failed while running
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("exec stream failed: {0}")]
    Stream(RuntimeError),

    #[error("failed to write dump output: {0}")]
    Sink(#[source] io::Error),

    #[error("failed to compress dump: {0}")]
    Compression(#[source] io::Error),

    #[error("exec session timed out after {}", pretty(.0))]
    TimedOut(Duration),
}

/// Archive construction or upload failed
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("failed to build archive for {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("uploaded file has no usable name: {0}")]
    InvalidName(PathBuf),

    #[error(transparent)]
    Upload(#[from] RuntimeError),

    #[error("archive upload timed out after {}", pretty(.0))]
    TimedOut(Duration),
}

/// Best-effort removal of a temporary artifact failed. Logged, never escalated.
#[derive(Debug, thiserror::Error)]
#[error("failed to remove {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl CleanupError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Cleanup
    }
}

/// Coarse classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Connection,
    Execution,
    Packaging,
    Cleanup,
}

/// Which pipeline a failure belongs to, for picking the public message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Restore,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Connection(_) => ErrorKind::Connection,
            PipelineError::Execution(_) => ErrorKind::Execution,
            PipelineError::Packaging(_) => ErrorKind::Packaging,
        }
    }

    /// True when the caller sent a bad request rather than the pipeline failing
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Fixed message safe to show to API clients
    pub fn public_message(&self, operation: Operation) -> &'static str {
        match (self.kind(), operation) {
            (ErrorKind::Validation, _) => REQUIRED_FIELDS_MESSAGE,
            (_, Operation::Backup) => BACKUP_FAILED_MESSAGE,
            (_, Operation::Restore) => RESTORE_FAILED_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_survive_conversion() {
        let err: PipelineError = ConnectionError::Rejected.into();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(!err.is_client_error());

        let err: PipelineError = ValidationError::MissingField("containerName").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_public_messages_are_generic() {
        let err: PipelineError = ExecutionError::TimedOut(Duration::from_secs(5)).into();
        assert_eq!(err.public_message(Operation::Backup), "Backup failed");
        assert_eq!(err.public_message(Operation::Restore), "Restore failed");

        let err: PipelineError = ValidationError::MissingArtifact.into();
        assert_eq!(err.public_message(Operation::Restore), REQUIRED_FIELDS_MESSAGE);
    }

    #[test]
    fn test_timeout_message_is_human_readable() {
        let err = ConnectionError::TimedOut(Duration::from_secs(90));
        assert_eq!(err.to_string(), "connection test timed out after 1m 30s");
    }
}
