use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use ingesta_core::item::{Item, KeySchema};
use ingesta_core::page::{Cursor, ScanRequest};
use ingesta_core::store::{ScanOutput, SourceError, SourceResult, TableSource};

#[derive(Debug, Clone)]
struct SourceTable {
    schema: KeySchema,
    items: Vec<Item>,
}

#[derive(Debug, Default)]
struct SourceFaults {
    throttles: u32,
    fail_at_page: Option<u64>,
    malformed_at_page: Option<u64>,
    latency: Option<Duration>,
}

/// Serves items in insertion order. The cursor is the offset of the next item.
///
/// Pages are counted over the lifetime of the source, so `fail_at_page(2)`
/// fails whichever call would serve the third page, whatever cursor it
/// carries.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: Arc<HashMap<String, SourceTable>>,
    faults: Arc<Mutex<SourceFaults>>,
    calls: Arc<AtomicU64>,
    pages_served: Arc<AtomicU64>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Must be called before the source is shared.
    pub fn with_table(mut self, name: &str, schema: KeySchema, items: Vec<Item>) -> Self {
        Arc::make_mut(&mut self.tables).insert(name.to_string(), SourceTable { schema, items });
        self
    }

    /// The next `n` scan calls fail with a throttling error.
    pub async fn throttle_next(&self, n: u32) {
        self.faults.lock().await.throttles = n;
    }

    /// Every call that would serve page number `page` (0-based) fails hard.
    pub async fn fail_at_page(&self, page: u64) {
        self.faults.lock().await.fail_at_page = Some(page);
    }

    /// Every call that would serve page number `page` returns garbage.
    pub async fn malformed_at_page(&self, page: u64) {
        self.faults.lock().await.malformed_at_page = Some(page);
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.faults.lock().await.latency = Some(latency);
    }

    pub async fn clear_faults(&self) {
        *self.faults.lock().await = SourceFaults::default();
    }

    /// Scan calls received, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pages_served(&self) -> u64 {
        self.pages_served.load(Ordering::SeqCst)
    }

    async fn injected_fault(&self) -> Option<SourceError> {
        let mut faults = self.faults.lock().await;
        let page = self.pages_served.load(Ordering::SeqCst);

        if faults.throttles > 0 {
            faults.throttles -= 1;
            return Some(SourceError::Throttled("injected throttle".to_string()));
        }
        if faults.fail_at_page == Some(page) {
            return Some(SourceError::Failed(format!("injected failure at page {page}")));
        }
        if faults.malformed_at_page == Some(page) {
            return Some(SourceError::Malformed(format!(
                "injected malformed response at page {page}"
            )));
        }
        None
    }
}

#[async_trait]
impl TableSource for InMemorySource {
    async fn scan(&self, request: &ScanRequest) -> SourceResult<ScanOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.faults.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(fault) = self.injected_fault().await {
            return Err(fault);
        }
        if request.filter.is_some() {
            return Err(SourceError::Failed(
                "Filter expressions are not supported in memory".to_string(),
            ));
        }

        let table = self
            .tables
            .get(&request.table)
            .ok_or_else(|| SourceError::Failed(format!("Table not found: {}", request.table)))?;

        let start = match &request.start {
            Some(cursor) => cursor
                .as_str()
                .parse::<usize>()
                .map_err(|_| SourceError::Failed(format!("Invalid cursor: {cursor}")))?,
            None => 0,
        };
        let start = start.min(table.items.len());
        let end = start
            .saturating_add(request.limit.max(1) as usize)
            .min(table.items.len());

        let items = table.items[start..end].to_vec();
        let next = (end < table.items.len()).then(|| Cursor::new(end.to_string()));

        self.pages_served.fetch_add(1, Ordering::SeqCst);
        Ok(ScanOutput { items, next })
    }

    async fn key_schema(&self, table: &str) -> SourceResult<KeySchema> {
        self.tables
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| SourceError::Failed(format!("Table not found: {table}")))
    }
}
