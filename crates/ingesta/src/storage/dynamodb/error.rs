//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `SourceError` and `SinkError` from
//! `ingesta_core::store`. Throughput, request-limit and internal errors are
//! transient; everything else fails the call.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use ingesta_core::store::{SinkError, SourceError};
use thiserror::Error;

/// An attribute or cursor that has no item representation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unsupported attribute value: {0}")]
pub struct ConversionError(pub String);

impl From<ConversionError> for SourceError {
    fn from(err: ConversionError) -> Self {
        SourceError::Malformed(err.0)
    }
}

impl From<ConversionError> for SinkError {
    fn from(err: ConversionError) -> Self {
        SinkError::Rejected(err.0)
    }
}

/// Error codes that arrive as unmodeled errors but mean "slow down".
fn is_throttling_code(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("ThrottlingException" | "Throttling" | "ServiceUnavailable" | "RequestLimitExceeded")
    )
}

/// The request never got a service answer: timeouts, connection failures,
/// unparseable responses.
fn transport_failure<E, R>(err: &SdkError<E, R>) -> Option<String> {
    match err {
        SdkError::TimeoutError(_) => Some("request timed out".to_string()),
        SdkError::DispatchFailure(_) => Some("request dispatch failed".to_string()),
        SdkError::ResponseError(_) => Some("response could not be read".to_string()),
        _ => None,
    }
}

/// Map a Scan SDK error to SourceError.
pub fn map_scan_error<R: Debug + Send + Sync + 'static>(err: SdkError<ScanError, R>) -> SourceError {
    if let Some(reason) = transport_failure(&err) {
        return SourceError::Timeout(format!("Scan {reason}"));
    }
    match err.into_service_error() {
        ScanError::ProvisionedThroughputExceededException(_) => {
            SourceError::Throttled("Throughput exceeded, please retry".to_string())
        }
        ScanError::RequestLimitExceeded(_) => {
            SourceError::Throttled("Request limit exceeded, please retry".to_string())
        }
        ScanError::InternalServerError(_) => {
            SourceError::Throttled("DynamoDB internal server error".to_string())
        }
        ScanError::ResourceNotFoundException(_) => {
            SourceError::Failed("Table not found".to_string())
        }
        err if is_throttling_code(err.code()) => {
            SourceError::Throttled(format!("Scan throttled: {}", err.code().unwrap_or_default()))
        }
        err => SourceError::Failed(format!("Scan failed: {:?}", err)),
    }
}

/// Map a DescribeTable SDK error to SourceError.
pub fn map_describe_table_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DescribeTableError, R>,
    table: &str,
) -> SourceError {
    if let Some(reason) = transport_failure(&err) {
        return SourceError::Timeout(format!("DescribeTable {reason}"));
    }
    match err.into_service_error() {
        DescribeTableError::ResourceNotFoundException(_) => {
            SourceError::Failed(format!("Table not found: {table}"))
        }
        DescribeTableError::InternalServerError(_) => {
            SourceError::Throttled("DynamoDB internal server error".to_string())
        }
        err if is_throttling_code(err.code()) => SourceError::Throttled(format!(
            "DescribeTable throttled: {}",
            err.code().unwrap_or_default()
        )),
        err => SourceError::Failed(format!("DescribeTable failed: {:?}", err)),
    }
}

/// Map a BatchWriteItem SDK error to SinkError.
pub fn map_batch_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchWriteItemError, R>,
) -> SinkError {
    if let Some(reason) = transport_failure(&err) {
        return SinkError::Transient(format!("BatchWriteItem {reason}"));
    }
    match err.into_service_error() {
        BatchWriteItemError::ProvisionedThroughputExceededException(_) => {
            SinkError::Transient("Throughput exceeded, please retry".to_string())
        }
        BatchWriteItemError::RequestLimitExceeded(_) => {
            SinkError::Transient("Request limit exceeded, please retry".to_string())
        }
        BatchWriteItemError::InternalServerError(_) => {
            SinkError::Transient("DynamoDB internal server error".to_string())
        }
        BatchWriteItemError::ItemCollectionSizeLimitExceededException(_) => {
            SinkError::Rejected("Item collection size limit exceeded".to_string())
        }
        BatchWriteItemError::ResourceNotFoundException(_) => {
            SinkError::Rejected("Table not found".to_string())
        }
        err if is_throttling_code(err.code()) => SinkError::Transient(format!(
            "BatchWriteItem throttled: {}",
            err.code().unwrap_or_default()
        )),
        err => SinkError::Rejected(format!("BatchWriteItem failed: {:?}", err)),
    }
}
