use async_trait::async_trait;

use super::{Checkpoint, Result, Stage};

/// Storage for per-stage checkpoints.
///
/// Each stage is the only writer of its own checkpoint; other stages only read
/// it. `write` replaces the previous value atomically.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Reads the checkpoint of a stage, if any.
    async fn read(&self, stage: Stage) -> Result<Option<Checkpoint>>;

    /// Replaces the checkpoint of a stage.
    async fn write(&self, stage: Stage, cursor: &str) -> Result<Checkpoint>;

    /// Removes the checkpoint of a stage after it completed.
    async fn clear(&self, stage: Stage) -> Result<()>;
}
