//! BatchWriteItem-based `TableSink`.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client;

use ingesta_core::item::Item;
use ingesta_core::store::{SinkError, SinkResult, TableSink, WriteOutcome};

use super::conversions::{attributes_to_item, item_to_attributes};
use super::error::map_batch_write_error;

/// DynamoDB's limit on write requests per `BatchWriteItem` call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Writes items with `BatchWriteItem` put requests, which replace any item
/// with the same primary key.
#[derive(Debug, Clone)]
pub struct DynamoDbSink {
    client: Client,
}

impl DynamoDbSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableSink for DynamoDbSink {
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_WRITE_ITEMS
    }

    async fn upsert_batch(&self, table: &str, items: &[Item]) -> SinkResult<WriteOutcome> {
        if items.is_empty() {
            return Ok(WriteOutcome::complete());
        }
        if items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(SinkError::Rejected(format!(
                "Batch of {} exceeds the limit of {MAX_BATCH_WRITE_ITEMS}",
                items.len()
            )));
        }

        let write_requests = items
            .iter()
            .map(|item| {
                let put = PutRequest::builder()
                    .set_item(Some(item_to_attributes(item)))
                    .build()
                    .map_err(|e| SinkError::Rejected(format!("Invalid put request: {e}")))?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<SinkResult<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table, write_requests)
            .send()
            .await
            .map_err(map_batch_write_error)?;

        let unprocessed = output
            .unprocessed_items
            .and_then(|mut pending| pending.remove(table))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|request| request.put_request)
            .map(|put| attributes_to_item(put.item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WriteOutcome { unprocessed })
    }
}
