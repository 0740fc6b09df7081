//! Pure pieces of the ingest stage: batch preparation, load accounting and
//! the commit watermark.

use std::collections::{BTreeMap, HashSet};

use crate::checkpoint::IngestCursor;
use crate::item::{Item, PrimaryKey};

/// An item read back from a segment, with its key and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedRecord {
    pub item: Item,
    pub key: PrimaryKey,
    pub segment: u64,
    pub offset: u64,
}

impl SourcedRecord {
    /// Position immediately after this record.
    pub fn next_position(&self) -> IngestCursor {
        IngestCursor::new(self.segment, self.offset + 1)
    }
}

/// Collapse records sharing a primary key so that the last one in submission
/// order wins. Surviving records keep their relative order.
pub fn collapse_duplicate_keys(records: Vec<SourcedRecord>) -> Vec<SourcedRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut kept: Vec<SourcedRecord> = records
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.key.clone()))
        .collect();
    kept.reverse();
    kept
}

/// A batch that could not be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    /// 1-based batch number in submission order.
    pub index: u64,
    pub keys: Vec<PrimaryKey>,
    pub reason: String,
}

/// Outcome of loading a record stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadResult {
    pub written: u64,
    pub skipped: u64,
    pub failed: Vec<FailedBatch>,
    pub batches: u64,
}

impl LoadResult {
    pub fn failed_records(&self) -> u64 {
        self.failed.iter().map(|b| b.keys.len() as u64).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks which batches have committed and yields the highest position
/// covered by a contiguous prefix of successful batches.
///
/// A failed batch stops the watermark for the rest of the run, so a restart
/// replays it and everything after it.
#[derive(Debug, Clone, Default)]
pub struct CommitTracker {
    next: u64,
    done: BTreeMap<u64, Option<IngestCursor>>,
    watermark: Option<IngestCursor>,
}

impl CommitTracker {
    /// Batches are numbered from 1.
    pub fn new() -> Self {
        Self {
            next: 1,
            done: BTreeMap::new(),
            watermark: None,
        }
    }

    pub fn watermark(&self) -> Option<IngestCursor> {
        self.watermark
    }

    /// Record a successful batch ending at `end`. Returns the new watermark if
    /// it moved.
    pub fn committed(&mut self, index: u64, end: IngestCursor) -> Option<IngestCursor> {
        self.done.insert(index, Some(end));
        self.advance()
    }

    /// Record a batch that exhausted its retries.
    pub fn failed(&mut self, index: u64) {
        self.done.insert(index, None);
    }

    fn advance(&mut self) -> Option<IngestCursor> {
        let before = self.watermark;
        while let Some(Some(end)) = self.done.get(&self.next).copied() {
            self.done.remove(&self.next);
            self.watermark = Some(end);
            self.next += 1;
        }
        if self.watermark != before {
            self.watermark
        } else {
            None
        }
    }
}
