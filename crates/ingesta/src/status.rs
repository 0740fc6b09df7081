//! `ingesta status`: where each stage stands for a table.

use std::fmt;

use anyhow::{Context, Result};

use ingesta_core::checkpoint::{Checkpoint, CheckpointStore, ExportCursor, IngestCursor, Stage};
use ingesta_core::segment::{ExportManifest, SegmentState};

use crate::checkpoint::FileCheckpointStore;
use crate::layout::TableLayout;

#[derive(Debug, Clone)]
pub struct TableStatus {
    pub table: String,
    pub export: Option<Checkpoint>,
    pub ingest: Option<Checkpoint>,
    pub manifest: Option<ExportManifest>,
    pub sealed_segments: usize,
    pub partial_segments: usize,
}

pub async fn table_status(layout: &TableLayout) -> Result<TableStatus> {
    let store = FileCheckpointStore::new(layout.checkpoints_dir());
    let export = store
        .read(Stage::Export)
        .await
        .context("Failed to read export checkpoint")?;
    let ingest = store
        .read(Stage::Ingest)
        .await
        .context("Failed to read ingest checkpoint")?;
    let manifest = layout
        .read_manifest()
        .await
        .with_context(|| format!("Failed to read {}", layout.manifest_path().display()))?;
    let segments = layout.list_segments().await?;

    Ok(TableStatus {
        table: layout.table().to_string(),
        export,
        ingest,
        manifest,
        sealed_segments: segments
            .iter()
            .filter(|s| s.state == SegmentState::Sealed)
            .count(),
        partial_segments: segments
            .iter()
            .filter(|s| s.state == SegmentState::Partial)
            .count(),
    })
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.table)?;

        match &self.manifest {
            Some(m) => writeln!(
                f,
                "  export:   complete ({} records, {} segments, {})",
                m.records,
                m.segments.len(),
                m.completed_at.to_rfc3339()
            )?,
            None => match self.export.as_ref().map(|c| ExportCursor::decode(&c.cursor)) {
                Some(Ok(cursor)) => writeln!(
                    f,
                    "  export:   in progress (segment {}, {} pages, {} records)",
                    cursor.segment, cursor.pages, cursor.records
                )?,
                Some(Err(e)) => writeln!(f, "  export:   unreadable checkpoint ({e})")?,
                None => writeln!(f, "  export:   not started")?,
            },
        }

        match self.ingest.as_ref().map(|c| IngestCursor::decode(&c.cursor)) {
            Some(Ok(cursor)) => writeln!(
                f,
                "  ingest:   in progress (segment {}, offset {})",
                cursor.segment, cursor.offset
            )?,
            Some(Err(e)) => writeln!(f, "  ingest:   unreadable checkpoint ({e})")?,
            None => writeln!(f, "  ingest:   no checkpoint")?,
        }

        write!(
            f,
            "  segments: {} sealed, {} partial",
            self.sealed_segments, self.partial_segments
        )
    }
}
