//! Source and destination store backends.
//!
//! - `dynamodb`: `aws-sdk-dynamodb` implementations used in production.
//! - `inmemory`: deterministic implementations with fault injection, used by
//!   tests and local dry runs.

pub mod dynamodb;
pub mod inmemory;

pub use dynamodb::{AwsConfig, DynamoDbSink, DynamoDbSource};
pub use inmemory::{InMemorySink, InMemorySource};
