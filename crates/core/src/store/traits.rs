use async_trait::async_trait;

use crate::item::{Item, KeySchema};
use crate::page::{Cursor, ScanRequest};

use super::{SinkResult, SourceResult};

/// The raw result of a single scan call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub items: Vec<Item>,
    pub next: Option<Cursor>,
}

/// A table that can be read page by page.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Issues one scan request.
    async fn scan(&self, request: &ScanRequest) -> SourceResult<ScanOutput>;

    /// Returns the key schema of a table.
    async fn key_schema(&self, table: &str) -> SourceResult<KeySchema>;
}

/// What a destination did with a batch.
///
/// Items the destination did not get to are handed back so the caller can
/// retry only those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub unprocessed: Vec<Item>,
}

impl WriteOutcome {
    pub fn complete() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

/// A table that accepts batched, idempotent upserts keyed by primary key.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Largest batch the destination accepts in one call.
    fn max_batch_size(&self) -> usize;

    /// Upserts every item in the batch.
    async fn upsert_batch(&self, table: &str, items: &[Item]) -> SinkResult<WriteOutcome>;
}
