//! In-memory checkpoint store for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use ingesta_core::checkpoint::{Checkpoint, CheckpointStore, Result, Stage};

/// Keeps the current checkpoint of each stage plus every cursor ever written,
/// so tests can assert on the sequence of progress points.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    current: Arc<RwLock<HashMap<Stage, Checkpoint>>>,
    history: Arc<RwLock<Vec<(Stage, String)>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursors written for `stage`, oldest first.
    pub async fn history(&self, stage: Stage) -> Vec<String> {
        self.history
            .read()
            .await
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, cursor)| cursor.clone())
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn read(&self, stage: Stage) -> Result<Option<Checkpoint>> {
        Ok(self.current.read().await.get(&stage).cloned())
    }

    async fn write(&self, stage: Stage, cursor: &str) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::new(stage, cursor);
        self.current.write().await.insert(stage, checkpoint.clone());
        self.history.write().await.push((stage, cursor.to_string()));
        Ok(checkpoint)
    }

    async fn clear(&self, stage: Stage) -> Result<()> {
        self.current.write().await.remove(&stage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stages_are_independent() {
        let store = InMemoryCheckpointStore::new();
        store.write(Stage::Export, "e1").await.unwrap();
        store.write(Stage::Ingest, "i1").await.unwrap();
        store.write(Stage::Export, "e2").await.unwrap();
        store.clear(Stage::Ingest).await.unwrap();

        assert_eq!(
            store.read(Stage::Export).await.unwrap().unwrap().cursor,
            "e2"
        );
        assert_eq!(store.read(Stage::Ingest).await.unwrap(), None);
        assert_eq!(store.history(Stage::Export).await, vec!["e1", "e2"]);
    }
}
