use thiserror::Error;

/// Errors that can occur when reading or writing checkpoints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("Checkpoint is corrupt: {0}")]
    Corrupt(String),
    #[error("Checkpoint belongs to stage {found}, expected {expected}")]
    StageMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
