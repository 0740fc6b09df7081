use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::page::Cursor;

use super::{CheckpointError, Result};

/// Pipeline stage that owns a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Export,
    Ingest,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Export => "export",
            Stage::Ingest => "ingest",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress marker of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    pub cursor: String,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(stage: Stage, cursor: impl Into<String>) -> Self {
        Self {
            stage,
            cursor: cursor.into(),
            updated_at: Utc::now(),
        }
    }

    /// Verify the checkpoint belongs to `stage`.
    pub fn expect_stage(self, stage: Stage) -> Result<Self> {
        if self.stage == stage {
            Ok(self)
        } else {
            Err(CheckpointError::StageMismatch {
                expected: stage.as_str(),
                found: self.stage.as_str(),
            })
        }
    }
}

/// Export progress: where scanning resumes and how much of the open
/// segment is durable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportCursor {
    /// Continuation token after the last durably written page. `None` before
    /// the first page.
    pub scan_cursor: Option<Cursor>,
    /// Sequence number of the open segment.
    pub segment: u64,
    /// Durable length of the open segment file.
    pub segment_bytes: u64,
    /// Records in the open segment.
    pub segment_records: u64,
    /// Pages written so far.
    pub pages: u64,
    /// Records written so far, across all segments.
    pub records: u64,
    /// The terminal page has been written; only sealing remains.
    #[serde(default)]
    pub scan_complete: bool,
}

impl ExportCursor {
    pub fn first_segment() -> Self {
        Self {
            segment: 1,
            ..Self::default()
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(cursor: &str) -> Result<Self> {
        serde_json::from_str(cursor).map_err(|e| CheckpointError::Corrupt(e.to_string()))
    }
}

/// Ingest progress: the first record not known to be committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngestCursor {
    pub segment: u64,
    pub offset: u64,
}

impl IngestCursor {
    pub fn new(segment: u64, offset: u64) -> Self {
        Self { segment, offset }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(cursor: &str) -> Result<Self> {
        serde_json::from_str(cursor).map_err(|e| CheckpointError::Corrupt(e.to_string()))
    }
}
