//! Paginated, throttle-aware reads of a source table.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::Stream;

use ingesta_core::page::{Cursor, Page, ScanRequest};
use ingesta_core::retry::RetryPolicy;
use ingesta_core::store::{ScanOutput, SourceError, TableSource};

use super::error::ScanError;
use crate::retry::{jittered_delay, pause};

/// Issues one scan request per page, retrying throttles and timeouts with
/// backoff. Holds no state between pages except the cursor.
pub struct Scanner {
    source: Arc<dyn TableSource>,
    table: String,
    filter: Option<String>,
    limit: u32,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Scanner {
    pub fn new(source: Arc<dyn TableSource>, table: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
            filter: None,
            limit: 100,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Lazy sequence of pages starting at `start` (or the beginning of the
    /// table). Ends after the page without a continuation token, or at the
    /// first error.
    pub fn pages(
        &self,
        start: Option<Cursor>,
    ) -> impl Stream<Item = Result<Page, ScanError>> + Send + '_ {
        async_stream::try_stream! {
            let mut cursor = start;
            let mut index = 0;
            loop {
                let output = self.fetch(cursor.take()).await?;
                let page = Page {
                    index,
                    items: output.items,
                    next: output.next,
                };
                index += 1;
                cursor = page.next.clone();
                let last = page.is_last();

                yield page;

                if last {
                    break;
                }
            }
        }
    }

    async fn fetch(&self, start: Option<Cursor>) -> Result<ScanOutput, ScanError> {
        let request = ScanRequest {
            table: self.table.clone(),
            filter: self.filter.clone(),
            limit: self.limit,
            start,
        };

        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, self.source.scan(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(format!(
                    "no response within {}ms",
                    self.call_timeout.as_millis()
                ))),
            };

            let err = match result {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(match err {
                    SourceError::Malformed(reason) => ScanError::ScanCorrupt(reason),
                    other => ScanError::ScanFailed(other.to_string()),
                });
            }
            if !self.retry.should_retry(attempt) {
                return Err(ScanError::Throttled {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let delay = jittered_delay(&self.retry, attempt);
            tracing::warn!(
                table = %self.table,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Scan call failed, retrying"
            );
            pause(delay).await;
            attempt += 1;
        }
    }
}
