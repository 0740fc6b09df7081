use thiserror::Error;

/// Errors reported by a source store when scanning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Capacity or rate limit hit; the same request may be retried.
    #[error("Source throttled: {0}")]
    Throttled(String),
    /// The call did not complete in time; retried like a throttle.
    #[error("Source call timed out: {0}")]
    Timeout(String),
    /// The response could not be interpreted as items.
    #[error("Malformed scan response: {0}")]
    Malformed(String),
    #[error("Source request failed: {0}")]
    Failed(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Throttled(_) | SourceError::Timeout(_))
    }
}

/// Errors reported by a destination store when writing a batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Capacity exceeded, throttling, timeouts or server errors.
    #[error("Destination temporarily unavailable: {0}")]
    Transient(String),
    /// The request itself is invalid; retrying cannot succeed.
    #[error("Destination rejected batch: {0}")]
    Rejected(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Result type for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Result type for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;
