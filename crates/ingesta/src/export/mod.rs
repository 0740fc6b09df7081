//! Export stage: Table Scanner -> Export Writer -> sealed segments.

mod error;
mod runner;
mod scanner;
mod writer;

pub use error::{ExportError, Result, ScanError};
pub use runner::{run_export, ExportReport, ExportStatus};
pub use scanner::Scanner;
pub use writer::ExportWriter;
