mod error;
mod traits;
mod types;

pub use error::{CheckpointError, Result};
pub use traits::CheckpointStore;
pub use types::{Checkpoint, ExportCursor, IngestCursor, Stage};
