mod error;
mod traits;

pub use error::{SinkError, SinkResult, SourceError, SourceResult};
pub use traits::{ScanOutput, TableSink, TableSource, WriteOutcome};
