//! What happens to sealed segments once they are fully ingested.

use tokio::fs;

use ingesta_core::segment::SegmentState;

use super::error::{IngestError, Result};
use crate::config::Retention;
use crate::fsutil;
use crate::layout::TableLayout;

fn retention_error(path: &std::path::Path, e: impl ToString) -> IngestError {
    IngestError::Retention {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Archive or delete every sealed segment of the table. Returns the number of
/// segments affected.
pub async fn apply_retention(layout: &TableLayout, retention: Retention) -> Result<usize> {
    if retention == Retention::Keep {
        return Ok(0);
    }

    let segments = layout
        .list_segments()
        .await
        .map_err(|e| retention_error(&layout.segments_dir(), e))?;
    let sealed: Vec<_> = segments
        .into_iter()
        .filter(|s| s.state == SegmentState::Sealed)
        .collect();

    if retention == Retention::Archive {
        let archive = layout.archive_dir();
        fs::create_dir_all(&archive)
            .await
            .map_err(|e| retention_error(&archive, e))?;
        for segment in &sealed {
            let Some(name) = segment.path.file_name() else {
                continue;
            };
            let target = archive.join(name);
            fs::rename(&segment.path, &target)
                .await
                .map_err(|e| retention_error(&segment.path, e))?;
        }
        fsutil::sync_dir(&archive).await;
    } else {
        for segment in &sealed {
            fsutil::remove_if_exists(&segment.path)
                .await
                .map_err(|e| retention_error(&segment.path, e))?;
        }
    }
    fsutil::sync_dir(&layout.segments_dir()).await;

    tracing::info!(
        table = layout.table(),
        segments = sealed.len(),
        policy = ?retention,
        "Retention applied"
    );
    Ok(sealed.len())
}
