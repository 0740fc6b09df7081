//! Segment file format.
//!
//! A segment is a sequence of newline-terminated lines. Every line but the
//! last is one item in DynamoDB-JSON. A sealed segment ends with a marker line
//! `#SEALED {..}` carrying its sequence number, record count and the last scan
//! cursor flushed into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{encode_item, Item, KeySchema};
use crate::page::Cursor;

/// Prefix of the completion marker line.
pub const SEALED_PREFIX: &str = "#SEALED ";

/// Contents of the completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTrailer {
    pub seq: u64,
    pub records: u64,
    pub last_cursor: Option<Cursor>,
}

/// Encode one item as a segment line, including the newline.
pub fn encode_record_line(item: &Item) -> String {
    let mut line = encode_item(item);
    line.push('\n');
    line
}

/// Encode a completion marker line, including the newline.
pub fn encode_trailer(trailer: &SegmentTrailer) -> String {
    let body = serde_json::to_string(trailer).unwrap_or_default();
    format!("{SEALED_PREFIX}{body}\n")
}

/// Whether a line is a completion marker.
pub fn is_trailer_line(line: &str) -> bool {
    line.starts_with(SEALED_PREFIX)
}

/// Parse a completion marker line. Returns `None` if the line is not a valid
/// marker.
pub fn decode_trailer(line: &str) -> Option<SegmentTrailer> {
    let body = line.trim_end().strip_prefix(SEALED_PREFIX)?;
    serde_json::from_str(body).ok()
}

/// Size thresholds at which the open segment is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLimits {
    pub max_records: u64,
    pub max_bytes: u64,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            max_records: 100_000,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl SegmentLimits {
    /// Whether a segment with this content must be sealed before the next page.
    pub fn is_full(&self, records: u64, bytes: u64) -> bool {
        records >= self.max_records || bytes >= self.max_bytes
    }
}

/// A sealed segment as recorded in the export manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub seq: u64,
    pub records: u64,
    pub bytes: u64,
}

/// Written once the export of a table has fully completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub table: String,
    pub key_schema: KeySchema,
    pub segments: Vec<SegmentDescriptor>,
    pub pages: u64,
    pub records: u64,
    pub completed_at: DateTime<Utc>,
}
