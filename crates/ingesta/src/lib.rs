//! Export DynamoDB tables to durable segment files and ingest them into a
//! destination table, resuming either stage after a crash.
//!
//! The pure model lives in `ingesta_core`; this crate does the I/O.

pub mod checkpoint;
pub mod config;
pub mod export;
pub mod fsutil;
pub mod ingest;
pub mod layout;
pub mod retry;
pub mod schema;
pub mod shutdown;
pub mod status;
pub mod storage;

pub use config::{ExportConfig, IngestConfig, Retention, Strictness};
pub use export::{run_export, ExportReport, ExportStatus};
pub use ingest::{run_ingest, IngestReport, IngestStatus};
