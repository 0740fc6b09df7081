//! Checkpoint store backends.

mod file;
mod inmemory;

pub use file::FileCheckpointStore;
pub use inmemory::InMemoryCheckpointStore;
