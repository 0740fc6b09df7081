//! Append-only segment writer with flush-then-checkpoint progress.
//!
//! Every page is appended to the open `.partial` segment and fsynced before
//! the export checkpoint records the new durable length. Resuming truncates
//! the partial file back to that length, so a torn page write is discarded
//! and replayed byte for byte.

use std::io::SeekFrom;
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use ingesta_core::checkpoint::{CheckpointStore, ExportCursor, Stage};
use ingesta_core::page::Page;
use ingesta_core::segment::{
    encode_record_line, encode_trailer, SegmentDescriptor, SegmentLimits, SegmentState,
    SegmentTrailer,
};

use super::error::{ExportError, Result};
use crate::fsutil;
use crate::layout::TableLayout;

pub struct ExportWriter {
    layout: TableLayout,
    limits: SegmentLimits,
    checkpoints: Arc<dyn CheckpointStore>,
    state: ExportCursor,
    file: Option<File>,
}

impl ExportWriter {
    /// Open the writer at the last export checkpoint, or start a new export
    /// when there is none. A new export removes leftover segment files.
    pub async fn open(
        layout: TableLayout,
        limits: SegmentLimits,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        layout
            .ensure_dirs()
            .await
            .map_err(|e| ExportError::persist(&layout.segments_dir(), e))?;

        let resumed = match checkpoints.read(Stage::Export).await? {
            Some(checkpoint) => Some(ExportCursor::decode(&checkpoint.cursor)?),
            None => None,
        };

        let mut writer = Self {
            layout,
            limits,
            checkpoints,
            state: resumed.clone().unwrap_or_else(ExportCursor::first_segment),
            file: None,
        };

        match resumed {
            Some(state) => {
                tracing::info!(
                    table = writer.layout.table(),
                    segment = state.segment,
                    pages = state.pages,
                    records = state.records,
                    "Resuming export from checkpoint"
                );
                writer.recover().await?;
            }
            None => {
                writer.discard_leftovers().await?;
                writer.checkpoint().await?;
            }
        }

        Ok(writer)
    }

    /// Progress as of the last checkpoint.
    pub fn state(&self) -> &ExportCursor {
        &self.state
    }

    /// Append a page and checkpoint past it. Seals the open segment when it
    /// reaches its limits.
    pub async fn write_page(&mut self, page: &Page) -> Result<()> {
        if !page.is_empty() {
            let chunk: String = page.items.iter().map(encode_record_line).collect();
            let path = self.layout.partial_path(self.state.segment);
            let file = self.partial_file().await?;

            file.write_all(chunk.as_bytes())
                .await
                .map_err(|e| ExportError::persist(&path, e))?;
            file.flush()
                .await
                .map_err(|e| ExportError::persist(&path, e))?;
            file.sync_data()
                .await
                .map_err(|e| ExportError::persist(&path, e))?;

            self.state.segment_bytes += chunk.len() as u64;
            self.state.segment_records += page.len() as u64;
        }

        self.state.records += page.len() as u64;
        self.state.pages += 1;
        self.state.scan_cursor = page.next.clone();
        self.state.scan_complete = page.is_last();
        self.checkpoint().await?;

        tracing::debug!(
            table = self.layout.table(),
            page = self.state.pages,
            items = page.len(),
            segment = self.state.segment,
            segment_records = self.state.segment_records,
            "Page persisted"
        );

        if self
            .limits
            .is_full(self.state.segment_records, self.state.segment_bytes)
        {
            self.seal().await?;
        }
        Ok(())
    }

    /// Seal the open segment if it holds any records. Returns the final state.
    pub async fn finish(mut self) -> Result<ExportCursor> {
        self.seal().await?;
        Ok(self.state)
    }

    /// Write the completion marker, fsync, rename to the sealed name and
    /// checkpoint the next segment number.
    pub async fn seal(&mut self) -> Result<Option<SegmentDescriptor>> {
        let seq = self.state.segment;
        let partial = self.layout.partial_path(seq);
        let sealed = self.layout.sealed_path(seq);

        if self.state.segment_records == 0 {
            self.file = None;
            fsutil::remove_if_exists(&partial)
                .await
                .map_err(|e| ExportError::persist(&partial, e))?;
            return Ok(None);
        }

        let trailer = encode_trailer(&SegmentTrailer {
            seq,
            records: self.state.segment_records,
            last_cursor: self.state.scan_cursor.clone(),
        });

        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open_partial().await?,
        };
        file.write_all(trailer.as_bytes())
            .await
            .map_err(|e| ExportError::persist(&partial, e))?;
        file.flush()
            .await
            .map_err(|e| ExportError::persist(&partial, e))?;
        file.sync_all()
            .await
            .map_err(|e| ExportError::persist(&partial, e))?;
        drop(file);

        fs::rename(&partial, &sealed)
            .await
            .map_err(|e| ExportError::persist(&sealed, e))?;
        fsutil::sync_dir(&self.layout.segments_dir()).await;

        let descriptor = SegmentDescriptor {
            seq,
            records: self.state.segment_records,
            bytes: self.state.segment_bytes + trailer.len() as u64,
        };
        tracing::info!(
            table = self.layout.table(),
            segment = seq,
            records = descriptor.records,
            bytes = descriptor.bytes,
            "Segment sealed"
        );

        self.advance_segment().await?;
        Ok(Some(descriptor))
    }

    async fn checkpoint(&self) -> Result<()> {
        self.checkpoints
            .write(Stage::Export, &self.state.encode())
            .await?;
        Ok(())
    }

    async fn advance_segment(&mut self) -> Result<()> {
        self.state.segment += 1;
        self.state.segment_bytes = 0;
        self.state.segment_records = 0;
        self.checkpoint().await
    }

    async fn partial_file(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            self.file = Some(self.open_partial().await?);
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(ExportError::Inconsistent {
                seq: self.state.segment,
                reason: "open segment handle missing".to_string(),
            }),
        }
    }

    /// Open (or create) the partial file positioned at the checkpointed
    /// length, dropping anything written after it.
    async fn open_partial(&self) -> Result<File> {
        let path = self.layout.partial_path(self.state.segment);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| ExportError::persist(&path, e))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| ExportError::persist(&path, e))?
            .len();
        if len < self.state.segment_bytes {
            return Err(ExportError::Inconsistent {
                seq: self.state.segment,
                reason: format!(
                    "file has {len} bytes, checkpoint expects {}",
                    self.state.segment_bytes
                ),
            });
        }
        if len > self.state.segment_bytes {
            tracing::warn!(
                table = self.layout.table(),
                segment = self.state.segment,
                discarded = len - self.state.segment_bytes,
                "Truncating bytes written after the last checkpoint"
            );
            file.set_len(self.state.segment_bytes)
                .await
                .map_err(|e| ExportError::persist(&path, e))?;
            file.sync_all()
                .await
                .map_err(|e| ExportError::persist(&path, e))?;
        }

        file.seek(SeekFrom::End(0))
            .await
            .map_err(|e| ExportError::persist(&path, e))?;
        fsutil::sync_dir(&self.layout.segments_dir()).await;
        Ok(file)
    }

    /// Reconcile the files on disk with a resumed checkpoint.
    async fn recover(&mut self) -> Result<()> {
        let seq = self.state.segment;
        let partial = self.layout.partial_path(seq);
        let sealed = self.layout.sealed_path(seq);

        if !fsutil::exists(&partial).await && fsutil::exists(&sealed).await {
            // Crashed after the rename but before the next checkpoint.
            tracing::info!(
                table = self.layout.table(),
                segment = seq,
                "Segment already sealed, moving to the next one"
            );
            return self.advance_segment().await;
        }

        if !fsutil::exists(&partial).await && self.state.segment_bytes > 0 {
            return Err(ExportError::Inconsistent {
                seq,
                reason: format!("{} is missing", partial.display()),
            });
        }

        if self
            .limits
            .is_full(self.state.segment_records, self.state.segment_bytes)
        {
            self.seal().await?;
        }
        Ok(())
    }

    /// Remove segment files from an earlier export that never recorded a
    /// checkpoint here.
    async fn discard_leftovers(&self) -> Result<()> {
        let leftovers = self
            .layout
            .list_segments()
            .await
            .map_err(|e| ExportError::persist(&self.layout.segments_dir(), e))?;

        for segment in leftovers {
            tracing::warn!(
                table = self.layout.table(),
                segment = segment.seq,
                partial = segment.state == SegmentState::Partial,
                "Removing segment left over from an earlier export"
            );
            fsutil::remove_if_exists(&segment.path)
                .await
                .map_err(|e| ExportError::persist(&segment.path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::layout::read_trailer;
    use ingesta_core::item::Item;
    use ingesta_core::page::Cursor;

    fn page(index: u64, from: usize, to: usize, next: Option<&str>) -> Page {
        Page {
            index,
            items: (from..to)
                .map(|i| Item::new().with("pk", format!("k{i:03}")))
                .collect(),
            next: next.map(Cursor::new),
        }
    }

    fn limits(max_records: u64) -> SegmentLimits {
        SegmentLimits {
            max_records,
            max_bytes: u64::MAX,
        }
    }

    #[tokio::test]
    async fn test_single_segment_sealed_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store.clone())
            .await
            .unwrap();
        writer.write_page(&page(0, 0, 100, Some("100"))).await.unwrap();
        writer.write_page(&page(1, 100, 150, None)).await.unwrap();
        let state = writer.finish().await.unwrap();

        assert_eq!(state.records, 150);
        assert!(state.scan_complete);
        assert!(!fsutil::exists(&layout.partial_path(1)).await);

        let trailer = read_trailer(&layout.sealed_path(1)).await.unwrap().unwrap();
        assert_eq!(trailer.records, 150);
        assert_eq!(trailer.last_cursor, None);
    }

    #[tokio::test]
    async fn test_rollover_at_record_limit() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(100), store)
            .await
            .unwrap();
        writer.write_page(&page(0, 0, 100, Some("100"))).await.unwrap();
        writer.write_page(&page(1, 100, 130, None)).await.unwrap();
        writer.finish().await.unwrap();

        let first = read_trailer(&layout.sealed_path(1)).await.unwrap().unwrap();
        let second = read_trailer(&layout.sealed_path(2)).await.unwrap().unwrap();
        assert_eq!((first.records, second.records), (100, 30));
        assert_eq!(first.last_cursor, Some(Cursor::new("100")));
    }

    #[tokio::test]
    async fn test_checkpoint_follows_each_page() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store.clone())
            .await
            .unwrap();
        writer.write_page(&page(0, 0, 10, Some("10"))).await.unwrap();

        let on_disk = fs::metadata(layout.partial_path(1)).await.unwrap().len();
        let history = store.history(Stage::Export).await;
        let last = ExportCursor::decode(history.last().unwrap()).unwrap();
        assert_eq!(last.segment_bytes, on_disk);
        assert_eq!(last.scan_cursor, Some(Cursor::new("10")));
    }

    #[tokio::test]
    async fn test_write_failure_keeps_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store.clone())
            .await
            .unwrap();
        let before = store.history(Stage::Export).await;
        fs::create_dir(layout.partial_path(1)).await.unwrap();

        let err = writer
            .write_page(&page(0, 0, 10, Some("10")))
            .await
            .unwrap_err();

        match err {
            ExportError::PersistFailure { path, .. } => {
                assert!(path.ends_with("t-000001.jsonl.partial"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.history(Stage::Export).await, before);
        let last = ExportCursor::decode(before.last().unwrap()).unwrap();
        assert_eq!((last.pages, last.records), (0, 0));
        assert_eq!(writer.state().pages, 0);
    }

    #[tokio::test]
    async fn test_resume_truncates_torn_write() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store.clone())
            .await
            .unwrap();
        writer.write_page(&page(0, 0, 10, Some("10"))).await.unwrap();
        let durable = writer.state().segment_bytes;
        drop(writer);

        let mut file = OpenOptions::new()
            .append(true)
            .open(layout.partial_path(1))
            .await
            .unwrap();
        file.write_all(b"{\"pk\":{\"S\":\"tor").await.unwrap();
        drop(file);

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store)
            .await
            .unwrap();
        assert_eq!(writer.state().segment_bytes, durable);
        writer.write_page(&page(1, 10, 20, None)).await.unwrap();
        writer.finish().await.unwrap();

        let contents = fs::read_to_string(layout.sealed_path(1)).await.unwrap();
        assert!(!contents.contains("\"tor"));
        assert_eq!(contents.lines().count(), 21);
    }

    #[tokio::test]
    async fn test_resume_after_rename_before_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store.clone())
            .await
            .unwrap();
        writer.write_page(&page(0, 0, 10, Some("10"))).await.unwrap();
        let before_seal = writer.state().encode();
        writer.seal().await.unwrap();
        drop(writer);

        // Roll the checkpoint back as if the process died right after rename.
        store.write(Stage::Export, &before_seal).await.unwrap();

        let writer = ExportWriter::open(layout.clone(), limits(1000), store)
            .await
            .unwrap();
        assert_eq!(writer.state().segment, 2);
        assert_eq!(writer.state().segment_bytes, 0);
        assert!(fsutil::exists(&layout.sealed_path(1)).await);
    }

    #[tokio::test]
    async fn test_fresh_export_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        layout.ensure_dirs().await.unwrap();
        fs::write(layout.sealed_path(7), b"stale").await.unwrap();

        let store = Arc::new(InMemoryCheckpointStore::new());
        let writer = ExportWriter::open(layout.clone(), limits(1000), store.clone())
            .await
            .unwrap();

        assert!(layout.list_segments().await.unwrap().is_empty());
        assert_eq!(writer.state().segment, 1);
        assert!(store.read(Stage::Export).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_export_seals_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "t");
        let store = Arc::new(InMemoryCheckpointStore::new());

        let mut writer = ExportWriter::open(layout.clone(), limits(1000), store)
            .await
            .unwrap();
        writer.write_page(&page(0, 0, 0, None)).await.unwrap();
        let state = writer.finish().await.unwrap();

        assert_eq!(state.records, 0);
        assert_eq!(state.pages, 1);
        assert!(layout.list_segments().await.unwrap().is_empty());
    }
}
