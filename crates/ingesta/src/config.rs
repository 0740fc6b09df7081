//! Stage configuration.
//!
//! Defaults here match the CLI defaults in `main.rs`; the binary fills these
//! structs from flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use ingesta_core::item::KeySchema;
use ingesta_core::retry::RetryPolicy;
use ingesta_core::segment::SegmentLimits;

/// Default location of the shared data volume.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// What to do with a record whose primary key is missing or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Strictness {
    /// Log and count the record, keep going.
    #[default]
    Skip,
    /// Stop the run at the first bad record.
    Abort,
}

/// What happens to sealed segments after a fully successful ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Retention {
    #[default]
    Keep,
    /// Move to `<table>/archive/`.
    Archive,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub data_dir: PathBuf,
    /// Items requested per scan call.
    pub page_limit: u32,
    pub filter: Option<String>,
    /// Overrides key schema discovery on the source.
    pub key_schema: Option<KeySchema>,
    pub segment_limits: SegmentLimits,
    pub retry: RetryPolicy,
    /// Budget for a single scan call.
    pub call_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            page_limit: 100,
            filter: None,
            key_schema: None,
            segment_limits: SegmentLimits::default(),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    /// Destination table; `None` writes to a table named like the source.
    pub dest_table: Option<String>,
    /// Prepended to the source table name when `dest_table` is not set.
    pub dest_prefix: Option<String>,
    /// Overrides the key schema recorded by the export.
    pub key_schema: Option<KeySchema>,
    /// Records per batch, further capped by the destination's own limit.
    pub batch_size: usize,
    /// Batches in flight at once.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Budget for a single batch call.
    pub call_timeout: Duration,
    pub strictness: Strictness,
    pub retention: Retention,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dest_table: None,
            dest_prefix: None,
            key_schema: None,
            batch_size: 25,
            concurrency: 4,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
            strictness: Strictness::default(),
            retention: Retention::default(),
        }
    }
}

impl IngestConfig {
    pub fn dest_table_for(&self, source_table: &str) -> String {
        match (&self.dest_table, &self.dest_prefix) {
            (Some(table), _) => table.clone(),
            (None, Some(prefix)) => format!("{prefix}{source_table}"),
            (None, None) => source_table.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let export = ExportConfig::default();
        assert_eq!(export.page_limit, 100);
        assert_eq!(export.segment_limits.max_records, 100_000);
        assert_eq!(export.call_timeout, Duration::from_secs(30));

        let ingest = IngestConfig::default();
        assert_eq!(ingest.batch_size, 25);
        assert_eq!(ingest.concurrency, 4);
        assert_eq!(ingest.strictness, Strictness::Skip);
        assert_eq!(ingest.retention, Retention::Keep);
    }

    #[test]
    fn test_dest_table_defaults_to_source() {
        let mut config = IngestConfig::default();
        assert_eq!(config.dest_table_for("users"), "users");

        config.dest_prefix = Some("staging-".to_string());
        assert_eq!(config.dest_table_for("users"), "staging-users");

        config.dest_table = Some("users-copy".to_string());
        assert_eq!(config.dest_table_for("users"), "users-copy");
    }
}
