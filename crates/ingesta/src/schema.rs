//! `ingesta schema`: Glue column definitions inferred from exported segments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

use ingesta_core::item::decode_item;
use ingesta_core::schema::{GlueColumn, SchemaBuilder};
use ingesta_core::segment::{is_trailer_line, SegmentState};

use crate::fsutil;
use crate::layout::TableLayout;

#[derive(Debug, Clone)]
pub struct SchemaReport {
    pub table: String,
    pub path: PathBuf,
    pub records: u64,
    pub skipped: u64,
    pub columns: Vec<GlueColumn>,
}

/// Infer the schema of every record in the table's sealed segments and write
/// it to `<data_dir>/schemas/<table>_schema.json`.
pub async fn generate_schema(layout: &TableLayout) -> Result<SchemaReport> {
    let segments = layout
        .list_segments()
        .await
        .with_context(|| format!("Failed to list segments of {}", layout.table()))?;

    let mut builder = SchemaBuilder::new();
    let mut records = 0;
    let mut skipped = 0;

    for segment in segments.iter().filter(|s| s.state == SegmentState::Sealed) {
        let file = fs::File::open(&segment.path)
            .await
            .with_context(|| format!("Failed to open {}", segment.path.display()))?;
        let mut lines = BufReader::new(file).lines();

        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("Failed to read {}", segment.path.display()))?
        {
            if is_trailer_line(&line) {
                break;
            }
            match decode_item(&line) {
                Ok(item) => {
                    builder.observe(&item);
                    records += 1;
                }
                Err(e) => {
                    tracing::warn!(segment = segment.seq, error = %e, "Skipping undecodable record");
                    skipped += 1;
                }
            }
        }
    }

    let columns = builder.build();
    let path = layout.schema_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(&columns)?;
    fsutil::write_atomic(&path, &body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(
        table = layout.table(),
        columns = columns.len(),
        records,
        path = %path.display(),
        "Schema written"
    );

    Ok(SchemaReport {
        table: layout.table().to_string(),
        path,
        records,
        skipped,
        columns,
    })
}
