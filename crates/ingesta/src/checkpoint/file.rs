//! Checkpoints as small JSON files, one per stage, replaced atomically.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use ingesta_core::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, Result, Stage};

use crate::fsutil;

/// Stores `<dir>/export.json` and `<dir>/ingest.json`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{}.json", stage.as_str()))
    }
}

fn io_error(path: &Path, e: impl ToString) -> CheckpointError {
    CheckpointError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self, stage: Stage) -> Result<Option<Checkpoint>> {
        let path = self.path(stage);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", path.display())))?;
        checkpoint.expect_stage(stage).map(Some)
    }

    async fn write(&self, stage: Stage, cursor: &str) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::new(stage, cursor);
        let path = self.path(stage);
        let bytes = serde_json::to_vec(&checkpoint).map_err(|e| io_error(&path, e))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        fsutil::write_atomic(&path, &bytes)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::trace!(stage = %stage, cursor, "Checkpoint written");
        Ok(checkpoint)
    }

    async fn clear(&self, stage: Stage) -> Result<()> {
        let path = self.path(stage);
        fsutil::remove_if_exists(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        fsutil::sync_dir(&self.dir).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert_eq!(store.read(Stage::Export).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));

        store.write(Stage::Ingest, "first").await.unwrap();
        let written = store.write(Stage::Ingest, "second").await.unwrap();

        let read = store.read(Stage::Ingest).await.unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(read.cursor, "second");
        assert_eq!(store.read(Stage::Export).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.write(Stage::Export, "c").await.unwrap();
        store.clear(Stage::Export).await.unwrap();
        store.clear(Stage::Export).await.unwrap();

        assert_eq!(store.read(Stage::Export).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        fs::write(store.path(Stage::Export), b"{not json").await.unwrap();

        assert!(matches!(
            store.read(Stage::Export).await,
            Err(CheckpointError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_file_of_other_stage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let foreign = serde_json::to_vec(&Checkpoint::new(Stage::Ingest, "x")).unwrap();
        fs::write(store.path(Stage::Export), foreign).await.unwrap();

        assert!(matches!(
            store.read(Stage::Export).await,
            Err(CheckpointError::StageMismatch { .. })
        ));
    }
}
