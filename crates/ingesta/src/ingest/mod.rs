//! Ingest stage: sealed segments -> Import Reader -> Ingest Loader -> destination.

mod error;
mod loader;
mod reader;
mod retention;
mod runner;

pub use error::{ImportError, IngestError, Result};
pub use loader::{IngestLoader, LoadOutcome, LoadStop};
pub use reader::{ImportEvent, ImportReader};
pub use retention::apply_retention;
pub use runner::{run_ingest, IngestReport, IngestStatus};
