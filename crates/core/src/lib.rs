//! Core types and pure logic for the ingesta export/ingest pipeline.
//!
//! Everything in this crate is free of I/O. Storage backends, the file system
//! and the network live in the `ingesta` crate behind the traits defined here.

pub mod checkpoint;
pub mod item;
pub mod load;
pub mod page;
pub mod retry;
pub mod schema;
pub mod segment;
pub mod store;
