//! One ingest run for one table.

use std::fmt;
use std::sync::Arc;

use ingesta_core::checkpoint::{CheckpointStore, IngestCursor, Stage};
use ingesta_core::item::KeySchema;
use ingesta_core::load::FailedBatch;
use ingesta_core::store::TableSink;

use super::error::{ImportError, IngestError, Result};
use super::loader::{IngestLoader, LoadStop};
use super::reader::ImportReader;
use super::retention::apply_retention;
use crate::config::IngestConfig;
use crate::layout::TableLayout;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// Every exported record is loaded; the ingest checkpoint was cleared.
    Completed,
    /// Some batches failed; see `IngestReport::failed`.
    PartialFailure,
    /// Stopped at a segment that is still being written.
    NotReady,
    /// All sealed segments are loaded but the export has not finished.
    ExportIncomplete,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub table: String,
    pub dest_table: String,
    pub status: IngestStatus,
    pub written: u64,
    pub skipped: u64,
    pub batches: u64,
    pub failed: Vec<FailedBatch>,
    /// Ingest checkpoint left behind; `None` after completion.
    pub checkpoint: Option<IngestCursor>,
}

impl IngestReport {
    pub fn failed_records(&self) -> u64 {
        self.failed.iter().map(|b| b.keys.len() as u64).sum()
    }

    /// Turn a partial failure into `LoadPartialFailure`.
    pub fn ensure_loaded(&self) -> Result<()> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(IngestError::LoadPartialFailure {
                table: self.dest_table.clone(),
                failed_batches: self.failed.len(),
                failed_records: self.failed_records(),
            })
        }
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {:?}, written={} skipped={} failed={} batches={}",
            self.table,
            self.dest_table,
            self.status,
            self.written,
            self.skipped,
            self.failed_records(),
            self.batches
        )?;
        match &self.checkpoint {
            Some(cursor) => write!(f, " checkpoint={}", cursor.encode()),
            None => write!(f, " checkpoint=none"),
        }
    }
}

/// Load the sealed segments of `table` into the destination, resuming from
/// the ingest checkpoint in `checkpoints` if one exists.
pub async fn run_ingest(
    sink: Arc<dyn TableSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    table: &str,
    config: &IngestConfig,
    shutdown: &Shutdown,
) -> Result<IngestReport> {
    let layout = TableLayout::new(&config.data_dir, table);
    let dest_table = config.dest_table_for(table);

    let manifest = layout
        .read_manifest()
        .await
        .map_err(|e| import_io(&layout.manifest_path(), e))?;
    let key_schema = resolve_key_schema(&layout, config, manifest.as_ref().map(|m| &m.key_schema))
        .await?;

    let start = match checkpoints.read(Stage::Ingest).await? {
        Some(checkpoint) => {
            let cursor = IngestCursor::decode(&checkpoint.cursor)?;
            tracing::info!(
                table,
                segment = cursor.segment,
                offset = cursor.offset,
                "Resuming ingest from checkpoint"
            );
            Some(cursor)
        }
        None => None,
    };

    let reader = ImportReader::new(layout.clone(), key_schema, config.strictness);
    let loader = IngestLoader::new(sink, checkpoints.clone(), dest_table.as_str())
        .with_batch_size(config.batch_size)
        .with_concurrency(config.concurrency)
        .with_retry(config.retry.clone())
        .with_call_timeout(config.call_timeout);

    let events = reader.records(start.unwrap_or(IngestCursor::new(1, 0)));
    let outcome = loader.load(events, shutdown).await?;

    let status = match &outcome.stop {
        LoadStop::Import(e) if !e.is_not_ready() => return Err(e.clone().into()),
        _ if !outcome.result.failed.is_empty() => IngestStatus::PartialFailure,
        LoadStop::Cancelled => IngestStatus::Cancelled,
        LoadStop::Import(_) => IngestStatus::NotReady,
        LoadStop::Exhausted if manifest.is_none() => IngestStatus::ExportIncomplete,
        LoadStop::Exhausted => IngestStatus::Completed,
    };

    let checkpoint = if status == IngestStatus::Completed {
        apply_retention(&layout, config.retention).await?;
        checkpoints.clear(Stage::Ingest).await?;
        None
    } else {
        outcome.checkpoint.or(start)
    };

    let report = IngestReport {
        table: table.to_string(),
        dest_table,
        status,
        written: outcome.result.written,
        skipped: outcome.result.skipped,
        batches: outcome.result.batches,
        failed: outcome.result.failed,
        checkpoint,
    };

    tracing::info!(
        table,
        dest = %report.dest_table,
        status = ?report.status,
        written = report.written,
        skipped = report.skipped,
        failed = report.failed_records(),
        batches = report.batches,
        "Ingest finished"
    );
    Ok(report)
}

fn import_io(path: &std::path::Path, e: std::io::Error) -> IngestError {
    IngestError::Import(ImportError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// The key schema from the CLI wins, then the manifest, then the schema the
/// export recorded when it started.
async fn resolve_key_schema(
    layout: &TableLayout,
    config: &IngestConfig,
    from_manifest: Option<&KeySchema>,
) -> Result<KeySchema> {
    if let Some(schema) = &config.key_schema {
        return Ok(schema.clone());
    }
    if let Some(schema) = from_manifest {
        return Ok(schema.clone());
    }
    layout
        .read_key_schema()
        .await
        .map_err(|e| import_io(&layout.key_schema_path(), e))?
        .ok_or_else(|| IngestError::MissingKeySchema {
            table: layout.table().to_string(),
        })
}
