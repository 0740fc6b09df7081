use ingesta_core::checkpoint::CheckpointError;
use thiserror::Error;

/// Errors surfaced by the Import Reader.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The segment has no completion marker yet. Retry after the export
    /// stage has sealed it.
    #[error("Segment {seq} is not sealed yet")]
    IncompleteSegment { seq: u64 },

    #[error("Malformed record in segment {segment} at offset {offset}: {reason}")]
    RecordMalformed {
        segment: u64,
        offset: u64,
        reason: String,
    },

    #[error("Segment {seq} is corrupt: {reason}")]
    SegmentCorrupt { seq: u64, reason: String },

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ImportError {
    /// Whether the condition clears once the export stage makes progress.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ImportError::IncompleteSegment { .. })
    }
}

/// Errors that stop an ingest run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Some batches exhausted their retries. Everything else was loaded.
    #[error("{failed_records} records in {failed_batches} batches failed to load into {table}")]
    LoadPartialFailure {
        table: String,
        failed_batches: usize,
        failed_records: u64,
    },

    #[error("No key schema recorded for {table}; run the export first or pass --key")]
    MissingKeySchema { table: String },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Batch worker failed: {0}")]
    Worker(String),

    #[error("Failed to apply retention to {path}: {reason}")]
    Retention { path: String, reason: String },
}

/// Result type for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;
