//! Scan-based `TableSource`.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::KeyType;
use aws_sdk_dynamodb::Client;

use ingesta_core::item::KeySchema;
use ingesta_core::page::ScanRequest;
use ingesta_core::store::{ScanOutput, SourceError, SourceResult, TableSource};

use super::conversions::{attributes_to_item, cursor_from_key, cursor_to_key};
use super::error::{map_describe_table_error, map_scan_error};

/// Reads a DynamoDB table with `Scan`, one page per call.
#[derive(Debug, Clone)]
pub struct DynamoDbSource {
    client: Client,
}

impl DynamoDbSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableSource for DynamoDbSource {
    async fn scan(&self, request: &ScanRequest) -> SourceResult<ScanOutput> {
        let limit = i32::try_from(request.limit).unwrap_or(i32::MAX);
        let mut scan = self
            .client
            .scan()
            .table_name(&request.table)
            .limit(limit);

        if let Some(filter) = &request.filter {
            scan = scan.filter_expression(filter);
        }
        if let Some(start) = &request.start {
            scan = scan.set_exclusive_start_key(Some(cursor_to_key(start)?));
        }

        let output = scan.send().await.map_err(map_scan_error)?;

        let items = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(attributes_to_item)
            .collect::<Result<Vec<_>, _>>()?;

        let next = match output.last_evaluated_key {
            Some(key) if !key.is_empty() => Some(cursor_from_key(key)?),
            _ => None,
        };

        tracing::trace!(table = %request.table, items = items.len(), more = next.is_some(), "Scan page received");
        Ok(ScanOutput { items, next })
    }

    async fn key_schema(&self, table: &str) -> SourceResult<KeySchema> {
        let response = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| map_describe_table_error(e, table))?;

        let description = response
            .table()
            .ok_or_else(|| SourceError::Malformed(format!("DescribeTable {table}: no table")))?;

        let mut partition_key = None;
        let mut sort_key = None;
        for element in description.key_schema() {
            match element.key_type() {
                KeyType::Hash => partition_key = Some(element.attribute_name().to_string()),
                KeyType::Range => sort_key = Some(element.attribute_name().to_string()),
                other => {
                    return Err(SourceError::Malformed(format!(
                        "DescribeTable {table}: unknown key type {other:?}"
                    )))
                }
            }
        }

        let partition_key = partition_key.ok_or_else(|| {
            SourceError::Malformed(format!("DescribeTable {table}: no partition key"))
        })?;
        let schema = KeySchema::new(partition_key);
        Ok(match sort_key {
            Some(sk) => schema.with_sort_key(sk),
            None => schema,
        })
    }
}
