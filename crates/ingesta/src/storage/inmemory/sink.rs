use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use ingesta_core::item::{Item, KeySchema, PrimaryKey};
use ingesta_core::store::{SinkError, SinkResult, TableSink, WriteOutcome};

#[derive(Debug, Default)]
struct SinkFaults {
    poisoned: HashSet<PrimaryKey>,
    rejected: HashSet<PrimaryKey>,
    transient: u32,
    unprocessed: u32,
    latency: Duration,
}

#[derive(Debug, Clone)]
struct SinkTable {
    schema: KeySchema,
    rows: HashMap<PrimaryKey, Item>,
}

/// Destination table keyed by primary key; a put replaces the stored item.
#[derive(Debug, Clone)]
pub struct InMemorySink {
    max_batch_size: usize,
    tables: Arc<RwLock<HashMap<String, SinkTable>>>,
    faults: Arc<Mutex<SinkFaults>>,
    calls: Arc<AtomicU64>,
    puts: Arc<AtomicU64>,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            max_batch_size: 25,
            tables: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(Mutex::new(SinkFaults::default())),
            calls: Arc::new(AtomicU64::new(0)),
            puts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub async fn create_table(&self, name: &str, schema: KeySchema) {
        self.tables.write().await.insert(
            name.to_string(),
            SinkTable {
                schema,
                rows: HashMap::new(),
            },
        );
    }

    /// Any batch containing `key` fails with a transient error, forever.
    pub async fn poison_key(&self, key: PrimaryKey) {
        self.faults.lock().await.poisoned.insert(key);
    }

    /// Any batch containing `key` is rejected as invalid.
    pub async fn reject_key(&self, key: PrimaryKey) {
        self.faults.lock().await.rejected.insert(key);
    }

    /// The next `n` calls fail with a transient error.
    pub async fn fail_next(&self, n: u32) {
        self.faults.lock().await.transient = n;
    }

    /// The next `n` calls leave the last item of the batch unprocessed.
    pub async fn leave_unprocessed(&self, n: u32) {
        self.faults.lock().await.unprocessed = n;
    }

    /// Every call waits `latency` before touching the table.
    pub async fn delay_calls(&self, latency: Duration) {
        self.faults.lock().await.latency = latency;
    }

    pub async fn clear_faults(&self) {
        *self.faults.lock().await = SinkFaults::default();
    }

    /// Batch calls received, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Item puts applied, counting overwrites.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    pub async fn get(&self, table: &str, key: &PrimaryKey) -> Option<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .and_then(|t| t.rows.get(key).cloned())
    }

    /// All stored items ordered by their key's display form.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Vec::new();
        };
        let mut rows: Vec<_> = t.rows.iter().collect();
        rows.sort_by_key(|(key, _)| key.to_string());
        rows.into_iter().map(|(_, item)| item.clone()).collect()
    }
}

#[async_trait]
impl TableSink for InMemorySink {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn upsert_batch(&self, table: &str, items: &[Item]) -> SinkResult<WriteOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.faults.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if items.len() > self.max_batch_size {
            return Err(SinkError::Rejected(format!(
                "Batch of {} exceeds the limit of {}",
                items.len(),
                self.max_batch_size
            )));
        }

        let mut tables = self.tables.write().await;
        let target = tables
            .get_mut(table)
            .ok_or_else(|| SinkError::Rejected(format!("Table not found: {table}")))?;

        let keyed = items
            .iter()
            .map(|item| {
                item.primary_key(&target.schema)
                    .map(|key| (key, item))
                    .map_err(|e| SinkError::Rejected(e.to_string()))
            })
            .collect::<SinkResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        if let Some((key, _)) = keyed.iter().find(|(key, _)| !seen.insert(key.clone())) {
            return Err(SinkError::Rejected(format!(
                "Provided list of item keys contains duplicates: {key}"
            )));
        }

        let mut leave_last = false;
        {
            let mut faults = self.faults.lock().await;
            if let Some((key, _)) = keyed.iter().find(|(k, _)| faults.rejected.contains(k)) {
                return Err(SinkError::Rejected(format!("injected rejection of {key}")));
            }
            if let Some((key, _)) = keyed.iter().find(|(k, _)| faults.poisoned.contains(k)) {
                return Err(SinkError::Transient(format!("injected failure on {key}")));
            }
            if faults.transient > 0 {
                faults.transient -= 1;
                return Err(SinkError::Transient("injected throughput exceeded".to_string()));
            }
            if faults.unprocessed > 0 && keyed.len() > 1 {
                faults.unprocessed -= 1;
                leave_last = true;
            }
        }

        let mut unprocessed = Vec::new();
        let count = keyed.len();
        for (i, (key, item)) in keyed.into_iter().enumerate() {
            if leave_last && i + 1 == count {
                unprocessed.push(item.clone());
                continue;
            }
            target.rows.insert(key, item.clone());
            self.puts.fetch_add(1, Ordering::SeqCst);
        }

        Ok(WriteOutcome { unprocessed })
    }
}
