//! One export run for one table.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio_stream::StreamExt;

use ingesta_core::checkpoint::{CheckpointStore, Stage};
use ingesta_core::item::KeySchema;
use ingesta_core::segment::{ExportManifest, SegmentDescriptor, SegmentState};
use ingesta_core::store::TableSource;

use super::error::{ExportError, Result};
use super::scanner::Scanner;
use super::writer::ExportWriter;
use crate::config::ExportConfig;
use crate::layout::{read_trailer, TableLayout};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Completed,
    /// A manifest already existed and there was no export in progress.
    AlreadyComplete,
    /// Stopped between pages; the checkpoint allows resuming.
    Cancelled,
}

/// Counts for one run. `pages_scanned` and `records_exported` cover this run
/// only; the totals include pages persisted by earlier, interrupted runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub table: String,
    pub status: ExportStatus,
    pub pages_scanned: u64,
    pub records_exported: u64,
    pub total_pages: u64,
    pub total_records: u64,
    pub segments: u64,
    /// Export checkpoint left behind, if the run did not complete.
    pub checkpoint: Option<String>,
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:?}, pages={} records={} (total pages={} records={}) segments={}",
            self.table,
            self.status,
            self.pages_scanned,
            self.records_exported,
            self.total_pages,
            self.total_records,
            self.segments
        )?;
        match &self.checkpoint {
            Some(cursor) => write!(f, " checkpoint={cursor}"),
            None => write!(f, " checkpoint=none"),
        }
    }
}

/// Export `table` into `<data_dir>/<table>/segments`, resuming from the
/// export checkpoint in `checkpoints` if one exists.
pub async fn run_export(
    source: Arc<dyn TableSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    table: &str,
    config: &ExportConfig,
    shutdown: &Shutdown,
) -> Result<ExportReport> {
    let layout = TableLayout::new(&config.data_dir, table);
    let in_progress = checkpoints.read(Stage::Export).await?.is_some();

    if !in_progress {
        if let Some(manifest) = read_manifest(&layout).await? {
            tracing::info!(
                table,
                records = manifest.records,
                segments = manifest.segments.len(),
                "Export already complete"
            );
            return Ok(ExportReport {
                table: table.to_string(),
                status: ExportStatus::AlreadyComplete,
                pages_scanned: 0,
                records_exported: 0,
                total_pages: manifest.pages,
                total_records: manifest.records,
                segments: manifest.segments.len() as u64,
                checkpoint: None,
            });
        }
    }

    let key_schema = resolve_key_schema(source.as_ref(), &layout, config).await?;

    let mut writer = ExportWriter::open(
        layout.clone(),
        config.segment_limits,
        checkpoints.clone(),
    )
    .await?;
    let start = writer.state().clone();

    if !start.scan_complete {
        let scanner = Scanner::new(source, table)
            .with_filter(config.filter.clone())
            .with_limit(config.page_limit)
            .with_retry(config.retry.clone())
            .with_call_timeout(config.call_timeout);

        let pages = scanner.pages(start.scan_cursor.clone());
        tokio::pin!(pages);

        while let Some(page) = pages.next().await {
            writer.write_page(&page?).await?;

            if shutdown.is_triggered() && !writer.state().scan_complete {
                let state = writer.state().clone();
                tracing::warn!(table, pages = state.pages, "Export cancelled at page boundary");
                return Ok(ExportReport {
                    table: table.to_string(),
                    status: ExportStatus::Cancelled,
                    pages_scanned: state.pages - start.pages,
                    records_exported: state.records - start.records,
                    total_pages: state.pages,
                    total_records: state.records,
                    segments: state.segment.saturating_sub(1),
                    checkpoint: Some(state.encode()),
                });
            }
        }
    }

    let done = writer.finish().await?;
    let segments = sealed_segments(&layout).await?;
    let manifest = ExportManifest {
        table: table.to_string(),
        key_schema,
        segments,
        pages: done.pages,
        records: done.records,
        completed_at: Utc::now(),
    };
    layout
        .write_manifest(&manifest)
        .await
        .map_err(|e| ExportError::persist(&layout.manifest_path(), e))?;
    checkpoints.clear(Stage::Export).await?;

    tracing::info!(
        table,
        pages = done.pages,
        records = done.records,
        segments = manifest.segments.len(),
        "Export complete"
    );

    Ok(ExportReport {
        table: table.to_string(),
        status: ExportStatus::Completed,
        pages_scanned: done.pages - start.pages,
        records_exported: done.records - start.records,
        total_pages: done.pages,
        total_records: done.records,
        segments: manifest.segments.len() as u64,
        checkpoint: None,
    })
}

async fn read_manifest(layout: &TableLayout) -> Result<Option<ExportManifest>> {
    layout
        .read_manifest()
        .await
        .map_err(|e| ExportError::persist(&layout.manifest_path(), e))
}

/// Use the configured key schema, the one recorded by an earlier run, or ask
/// the source, in that order. The result is recorded for the ingest stage.
async fn resolve_key_schema(
    source: &dyn TableSource,
    layout: &TableLayout,
    config: &ExportConfig,
) -> Result<KeySchema> {
    let schema = match &config.key_schema {
        Some(schema) => schema.clone(),
        None => match layout
            .read_key_schema()
            .await
            .map_err(|e| ExportError::persist(&layout.key_schema_path(), e))?
        {
            Some(schema) => schema,
            None => source
                .key_schema(layout.table())
                .await
                .map_err(|e| ExportError::KeySchema {
                    table: layout.table().to_string(),
                    reason: e.to_string(),
                })?,
        },
    };

    layout
        .ensure_dirs()
        .await
        .map_err(|e| ExportError::persist(&layout.root(), e))?;
    layout
        .write_key_schema(&schema)
        .await
        .map_err(|e| ExportError::persist(&layout.key_schema_path(), e))?;
    Ok(schema)
}

/// Describe every sealed segment on disk from its completion marker.
async fn sealed_segments(layout: &TableLayout) -> Result<Vec<SegmentDescriptor>> {
    let files = layout
        .list_segments()
        .await
        .map_err(|e| ExportError::persist(&layout.segments_dir(), e))?;

    let mut segments = Vec::new();
    for file in files.into_iter().filter(|f| f.state == SegmentState::Sealed) {
        let trailer = read_trailer(&file.path)
            .await
            .map_err(|e| ExportError::persist(&file.path, e))?
            .ok_or_else(|| ExportError::Inconsistent {
                seq: file.seq,
                reason: "sealed segment has no completion marker".to_string(),
            })?;
        let bytes = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| ExportError::persist(&file.path, e))?
            .len();
        segments.push(SegmentDescriptor {
            seq: file.seq,
            records: trailer.records,
            bytes,
        });
    }
    Ok(segments)
}
