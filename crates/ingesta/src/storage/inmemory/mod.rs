//! In-memory source and sink for testing.
//!
//! Both are deterministic and support injecting the failures the pipeline
//! must survive: throttling, hard failures, malformed responses, unprocessed
//! items and slow calls.

mod sink;
mod source;

pub use sink::InMemorySink;
pub use source::InMemorySource;
