//! DynamoDB backend using `aws-sdk-dynamodb`.

mod client;
mod conversions;
mod error;
mod sink;
mod source;

pub use client::{create_client, AwsConfig};
pub use conversions::{
    attributes_to_item, cursor_from_key, cursor_to_key, item_to_attributes, value_to_attribute,
};
pub use error::ConversionError;
pub use sink::{DynamoDbSink, MAX_BATCH_WRITE_ITEMS};
pub use source::DynamoDbSource;
