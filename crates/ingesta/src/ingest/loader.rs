//! Batched, bounded-concurrency upserts with a contiguous commit watermark.
//!
//! Batches run on a `JoinSet` while the main task keeps reading. Only the main
//! task touches the ingest checkpoint: it advances it to the end of the
//! longest prefix of committed batches, so a failed or in-flight batch is
//! always replayed after a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_stream::{Stream, StreamExt};

use ingesta_core::checkpoint::{CheckpointStore, IngestCursor, Stage};
use ingesta_core::item::{Item, PrimaryKey};
use ingesta_core::load::{
    collapse_duplicate_keys, CommitTracker, FailedBatch, LoadResult, SourcedRecord,
};
use ingesta_core::retry::RetryPolicy;
use ingesta_core::store::{SinkError, TableSink};

use super::error::{ImportError, IngestError, Result};
use super::reader::ImportEvent;
use crate::retry::{jittered_delay, pause};
use crate::shutdown::Shutdown;

/// Why the loader stopped reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStop {
    /// The record stream ended.
    Exhausted,
    /// Shutdown was requested; in-flight batches were drained.
    Cancelled,
    /// The reader stopped with an error; batches read before it were loaded.
    Import(ImportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub result: LoadResult,
    pub stop: LoadStop,
    /// Ingest checkpoint after the run, if it moved.
    pub checkpoint: Option<IngestCursor>,
}

/// Keys and reason of a batch that could not be committed.
type BatchOutcome = std::result::Result<(), (Vec<PrimaryKey>, String)>;

/// What a batch worker reports back.
struct BatchReport {
    index: u64,
    end: IngestCursor,
    records: u64,
    outcome: BatchOutcome,
}

pub struct IngestLoader {
    sink: Arc<dyn TableSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    table: String,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl IngestLoader {
    pub fn new(
        sink: Arc<dyn TableSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        table: impl Into<String>,
    ) -> Self {
        let batch_size = sink.max_batch_size().max(1);
        Self {
            sink,
            checkpoints,
            table: table.into(),
            batch_size,
            concurrency: 4,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Records per batch, capped at what the destination accepts.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, self.sink.max_batch_size().max(1));
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
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

    /// Load every record of `events` into the destination table.
    ///
    /// Failed batches are collected in the result and do not stop the load.
    /// Checkpoint failures and worker panics do.
    pub async fn load<S>(&self, events: S, shutdown: &Shutdown) -> Result<LoadOutcome>
    where
        S: Stream<Item = std::result::Result<ImportEvent, ImportError>>,
    {
        tokio::pin!(events);

        let mut run = LoadRun::new(self);
        let mut pending: Vec<SourcedRecord> = Vec::with_capacity(self.batch_size);
        let mut stop = LoadStop::Exhausted;

        loop {
            if shutdown.is_triggered() {
                tracing::warn!(
                    table = %self.table,
                    in_flight = run.in_flight.len(),
                    "Ingest cancelled, draining in-flight batches"
                );
                stop = LoadStop::Cancelled;
                break;
            }

            let Some(event) = events.next().await else {
                break;
            };
            match event {
                Ok(ImportEvent::Record(record)) => {
                    pending.push(record);
                    if pending.len() >= self.batch_size {
                        run.submit(std::mem::take(&mut pending)).await?;
                    }
                }
                Ok(ImportEvent::Skipped { .. }) => run.result.skipped += 1,
                Err(e) => {
                    stop = LoadStop::Import(e);
                    break;
                }
            }
        }

        if stop != LoadStop::Cancelled && !pending.is_empty() {
            run.submit(pending).await?;
        }
        run.drain().await?;

        Ok(LoadOutcome {
            checkpoint: run.tracker.watermark(),
            result: run.result,
            stop,
        })
    }
}

/// Mutable state of one `load` call, owned by the main task.
struct LoadRun<'a> {
    loader: &'a IngestLoader,
    in_flight: JoinSet<BatchReport>,
    tracker: CommitTracker,
    result: LoadResult,
}

impl<'a> LoadRun<'a> {
    fn new(loader: &'a IngestLoader) -> Self {
        Self {
            loader,
            in_flight: JoinSet::new(),
            tracker: CommitTracker::new(),
            result: LoadResult::default(),
        }
    }

    async fn submit(&mut self, records: Vec<SourcedRecord>) -> Result<()> {
        let Some(end) = records.last().map(SourcedRecord::next_position) else {
            return Ok(());
        };

        while self.in_flight.len() >= self.loader.concurrency {
            self.settle_next().await?;
        }

        self.result.batches += 1;
        let index = self.result.batches;
        let sink = self.loader.sink.clone();
        let table = self.loader.table.clone();
        let retry = self.loader.retry.clone();
        let call_timeout = self.loader.call_timeout;

        tracing::debug!(table = %table, batch = index, records = records.len(), "Submitting batch");
        self.in_flight.spawn(async move {
            write_batch(sink, table, records, retry, call_timeout, index, end).await
        });
        Ok(())
    }

    async fn drain(&mut self) -> Result<()> {
        while !self.in_flight.is_empty() {
            self.settle_next().await?;
        }
        Ok(())
    }

    async fn settle_next(&mut self) -> Result<()> {
        let Some(joined) = self.in_flight.join_next().await else {
            return Ok(());
        };
        let report = joined.map_err(|e| IngestError::Worker(e.to_string()))?;

        match report.outcome {
            Ok(()) => {
                self.result.written += report.records;
                if let Some(watermark) = self.tracker.committed(report.index, report.end) {
                    self.loader
                        .checkpoints
                        .write(Stage::Ingest, &watermark.encode())
                        .await?;
                    tracing::debug!(
                        table = %self.loader.table,
                        batch = report.index,
                        segment = watermark.segment,
                        offset = watermark.offset,
                        "Ingest checkpoint advanced"
                    );
                }
            }
            Err((keys, reason)) => {
                self.tracker.failed(report.index);
                tracing::error!(
                    table = %self.loader.table,
                    batch = report.index,
                    records = keys.len(),
                    reason = %reason,
                    "Batch failed"
                );
                self.result.failed.push(FailedBatch {
                    index: report.index,
                    keys,
                    reason,
                });
            }
        }
        Ok(())
    }
}

/// Upsert one batch, retrying transient errors and unprocessed items.
async fn write_batch(
    sink: Arc<dyn TableSink>,
    table: String,
    records: Vec<SourcedRecord>,
    retry: RetryPolicy,
    call_timeout: Duration,
    index: u64,
    end: IngestCursor,
) -> BatchReport {
    let submitted = records.len() as u64;
    let collapsed = collapse_duplicate_keys(records);
    let keys: Vec<PrimaryKey> = collapsed.iter().map(|r| r.key.clone()).collect();
    let mut remaining: Vec<Item> = collapsed.into_iter().map(|r| r.item).collect();

    let report = |outcome: BatchOutcome| BatchReport {
        index,
        end,
        records: submitted,
        outcome,
    };

    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(call_timeout, sink.upsert_batch(&table, &remaining))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SinkError::Transient(format!(
                "no response within {}ms",
                call_timeout.as_millis()
            ))),
        };

        let reason = match result {
            Ok(outcome) if outcome.is_complete() => return report(Ok(())),
            Ok(outcome) => {
                let reason = format!("{} items unprocessed", outcome.unprocessed.len());
                remaining = outcome.unprocessed;
                reason
            }
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return report(Err((keys, e.to_string()))),
        };

        if !retry.should_retry(attempt) {
            return report(Err((
                keys,
                format!("retries exhausted after {attempt} attempts: {reason}"),
            )));
        }

        let delay = jittered_delay(&retry, attempt);
        tracing::warn!(
            table = %table,
            batch = index,
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Batch write incomplete, retrying"
        );
        pause(delay).await;
        attempt += 1;
    }
}
