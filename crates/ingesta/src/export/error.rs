use std::fmt::Display;
use std::path::Path;

use ingesta_core::checkpoint::CheckpointError;
use thiserror::Error;

/// Errors surfaced by the Table Scanner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Retries exhausted on throttling or timeouts. The cursor is unchanged.
    #[error("Source still throttled after {attempts} attempts: {reason}")]
    Throttled { attempts: u32, reason: String },
    /// The source returned data that cannot be interpreted. Not retried.
    #[error("Scan returned malformed data: {0}")]
    ScanCorrupt(String),
    #[error("Scan failed: {0}")]
    ScanFailed(String),
}

/// Errors that stop an export run. The last checkpoint stays valid.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Failed to persist {path}: {reason}")]
    PersistFailure { path: String, reason: String },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Key schema unavailable for {table}: {reason}")]
    KeySchema { table: String, reason: String },

    #[error("Segment {seq} does not match the checkpoint: {reason}")]
    Inconsistent { seq: u64, reason: String },
}

impl ExportError {
    pub fn persist(path: &Path, reason: impl Display) -> Self {
        ExportError::PersistFailure {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
