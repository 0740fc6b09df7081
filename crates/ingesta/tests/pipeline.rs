//! Export and ingest runs against the in-memory source and sink, with the
//! data volume in a temporary directory.

use std::path::Path;
use std::sync::Arc;

use tokio_stream::StreamExt;

use ingesta::checkpoint::FileCheckpointStore;
use ingesta::export::ExportError;
use ingesta::ingest::{ImportEvent, ImportReader};
use ingesta::layout::TableLayout;
use ingesta::shutdown::{self, Shutdown};
use ingesta::storage::{InMemorySink, InMemorySource};
use ingesta::{
    run_export, run_ingest, ExportConfig, ExportReport, ExportStatus, IngestConfig, IngestReport,
    IngestStatus, Retention, Strictness,
};
use ingesta_core::checkpoint::IngestCursor;
use ingesta_core::item::{Item, KeySchema};
use ingesta_core::retry::RetryPolicy;
use ingesta_core::segment::SegmentLimits;

const TABLE: &str = "users";

fn items(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            Item::new()
                .with("pk", format!("user#{i:04}"))
                .with("n", i as i64)
                .with("name", format!("User {i}"))
        })
        .collect()
}

fn source(items: Vec<Item>) -> InMemorySource {
    InMemorySource::new().with_table(TABLE, KeySchema::new("pk"), items)
}

async fn sink() -> InMemorySink {
    let sink = InMemorySink::new();
    sink.create_table(TABLE, KeySchema::new("pk")).await;
    sink
}

fn export_config(data_dir: &Path, max_records: u64) -> ExportConfig {
    ExportConfig {
        data_dir: data_dir.to_path_buf(),
        page_limit: 100,
        segment_limits: SegmentLimits {
            max_records,
            ..SegmentLimits::default()
        },
        retry: RetryPolicy::immediate(3),
        ..ExportConfig::default()
    }
}

fn ingest_config(data_dir: &Path) -> IngestConfig {
    IngestConfig {
        data_dir: data_dir.to_path_buf(),
        retry: RetryPolicy::immediate(3),
        ..IngestConfig::default()
    }
}

fn checkpoints(data_dir: &Path) -> Arc<FileCheckpointStore> {
    Arc::new(FileCheckpointStore::new(
        TableLayout::new(data_dir, TABLE).checkpoints_dir(),
    ))
}

async fn export(
    source: &InMemorySource,
    config: &ExportConfig,
    shutdown: &Shutdown,
) -> Result<ExportReport, ExportError> {
    run_export(
        Arc::new(source.clone()),
        checkpoints(&config.data_dir),
        TABLE,
        config,
        shutdown,
    )
    .await
}

async fn ingest(sink: &InMemorySink, config: &IngestConfig) -> IngestReport {
    run_ingest(
        Arc::new(sink.clone()),
        checkpoints(&config.data_dir),
        TABLE,
        config,
        &Shutdown::never(),
    )
    .await
    .unwrap()
}

/// File names and contents of every segment file, in name order.
async fn segment_files(data_dir: &Path) -> Vec<(String, Vec<u8>)> {
    let layout = TableLayout::new(data_dir, TABLE);
    let mut files = Vec::new();
    for segment in layout.list_segments().await.unwrap() {
        let name = segment
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        files.push((name, tokio::fs::read(&segment.path).await.unwrap()));
    }
    files
}

#[tokio::test]
async fn test_export_then_ingest_250_items() {
    let dir = tempfile::tempdir().unwrap();
    let source = source(items(250));

    let report = export(&source, &export_config(dir.path(), 100_000), &Shutdown::never())
        .await
        .unwrap();
    assert_eq!(report.status, ExportStatus::Completed);
    assert_eq!(report.pages_scanned, 3);
    assert_eq!(report.records_exported, 250);
    assert_eq!(report.segments, 1);
    assert_eq!(source.pages_served(), 3);

    let layout = TableLayout::new(dir.path(), TABLE);
    let reader = ImportReader::new(layout.clone(), KeySchema::new("pk"), Strictness::Skip);
    let events: Vec<_> = reader
        .records(IngestCursor::new(1, 0))
        .collect::<Result<Vec<_>, _>>()
        .await
        .unwrap();
    let read: Vec<_> = events
        .into_iter()
        .map(|event| match event {
            ImportEvent::Record(record) => record.item,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(read, items(250));

    let sink = sink().await;
    let report = ingest(&sink, &ingest_config(dir.path())).await;
    assert_eq!(report.status, IngestStatus::Completed);
    assert_eq!(report.written, 250);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.batches, 10);
    assert!(report.failed.is_empty());
    assert_eq!(report.checkpoint, None);
    assert_eq!(sink.items(TABLE).await, items(250));
}

#[tokio::test]
async fn test_export_resumes_after_crash_with_identical_segments() {
    let uninterrupted = tempfile::tempdir().unwrap();
    export(
        &source(items(570)),
        &export_config(uninterrupted.path(), 200),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let crashed = tempfile::tempdir().unwrap();
    let config = export_config(crashed.path(), 200);
    let flaky = source(items(570));
    flaky.fail_at_page(4).await;
    assert!(export(&flaky, &config, &Shutdown::never()).await.is_err());

    flaky.clear_faults().await;
    let report = export(&flaky, &config, &Shutdown::never()).await.unwrap();
    assert_eq!(report.status, ExportStatus::Completed);
    assert_eq!(report.pages_scanned, 2);
    assert_eq!(report.total_records, 570);

    let expected = segment_files(uninterrupted.path()).await;
    assert_eq!(expected.len(), 3);
    assert_eq!(segment_files(crashed.path()).await, expected);
}

#[tokio::test]
async fn test_export_discards_torn_page_on_resume() {
    let dir = tempfile::tempdir().unwrap();
    let config = export_config(dir.path(), 100_000);
    let flaky = source(items(250));
    flaky.fail_at_page(1).await;
    assert!(export(&flaky, &config, &Shutdown::never()).await.is_err());

    let partial = TableLayout::new(dir.path(), TABLE).partial_path(1);
    let mut torn = tokio::fs::read(&partial).await.unwrap();
    torn.extend_from_slice(b"{\"pk\":{\"S\":\"user#01");
    tokio::fs::write(&partial, torn).await.unwrap();

    flaky.clear_faults().await;
    export(&flaky, &config, &Shutdown::never()).await.unwrap();

    let sink = sink().await;
    let report = ingest(&sink, &ingest_config(dir.path())).await;
    assert_eq!(report.status, IngestStatus::Completed);
    assert_eq!(report.written, 250);
    assert_eq!(sink.items(TABLE).await, items(250));
}

#[tokio::test]
async fn test_second_export_is_already_complete() {
    let dir = tempfile::tempdir().unwrap();
    let config = export_config(dir.path(), 100_000);
    let source = source(items(40));

    export(&source, &config, &Shutdown::never()).await.unwrap();
    let again = export(&source, &config, &Shutdown::never()).await.unwrap();

    assert_eq!(again.status, ExportStatus::AlreadyComplete);
    assert_eq!(again.total_records, 40);
    assert_eq!(source.pages_served(), 1);
}

#[tokio::test]
async fn test_failed_batch_holds_checkpoint_and_replays() {
    let dir = tempfile::tempdir().unwrap();
    export(
        &source(items(250)),
        &export_config(dir.path(), 100_000),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let sink = sink().await;
    let poisoned = items(250)[80].primary_key(&KeySchema::new("pk")).unwrap();
    sink.poison_key(poisoned.clone()).await;

    let config = ingest_config(dir.path());
    let report = ingest(&sink, &config).await;
    assert_eq!(report.status, IngestStatus::PartialFailure);
    assert_eq!(report.written, 225);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 4);
    assert_eq!(report.failed[0].keys.len(), 25);
    assert!(report.failed[0].keys.contains(&poisoned));
    assert_eq!(report.checkpoint, Some(IngestCursor::new(1, 75)));
    assert!(report.ensure_loaded().is_err());
    assert_eq!(sink.len(TABLE).await, 225);

    sink.clear_faults().await;
    let retry = ingest(&sink, &config).await;
    assert_eq!(retry.status, IngestStatus::Completed);
    assert_eq!(retry.written, 175);
    assert_eq!(retry.batches, 7);
    assert_eq!(sink.items(TABLE).await, items(250));
}

#[tokio::test]
async fn test_malformed_record_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = items(30);
    data[10] = Item::new().with("name", "no key");
    export(
        &source(data.clone()),
        &export_config(dir.path(), 100_000),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let layout = TableLayout::new(dir.path(), TABLE);
    let reader = ImportReader::new(layout, KeySchema::new("pk"), Strictness::Skip);
    let skipped: Vec<_> = reader
        .records(IngestCursor::new(1, 0))
        .filter_map(|event| match event {
            Ok(ImportEvent::Skipped {
                segment, offset, ..
            }) => Some((segment, offset)),
            _ => None,
        })
        .collect()
        .await;
    assert_eq!(skipped, vec![(1, 10)]);

    let sink = sink().await;
    let report = ingest(&sink, &ingest_config(dir.path())).await;
    assert_eq!(report.status, IngestStatus::Completed);
    assert_eq!(report.written, 29);
    assert_eq!(report.skipped, 1);

    data.remove(10);
    assert_eq!(sink.items(TABLE).await, data);
}

#[tokio::test]
async fn test_malformed_record_aborts_when_strict() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = items(30);
    data[10] = Item::new().with("name", "no key");
    export(
        &source(data),
        &export_config(dir.path(), 100_000),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let config = IngestConfig {
        strictness: Strictness::Abort,
        ..ingest_config(dir.path())
    };
    let result = run_ingest(
        Arc::new(sink().await),
        checkpoints(dir.path()),
        TABLE,
        &config,
        &Shutdown::never(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_partial_segment_is_not_ingested() {
    let dir = tempfile::tempdir().unwrap();
    let config = export_config(dir.path(), 150);
    let flaky = source(items(250));
    flaky.fail_at_page(1).await;
    assert!(export(&flaky, &config, &Shutdown::never()).await.is_err());

    let sink = sink().await;
    let report = ingest(&sink, &ingest_config(dir.path())).await;
    assert_eq!(report.status, IngestStatus::NotReady);
    assert_eq!(report.written, 0);
    assert_eq!(sink.len(TABLE).await, 0);

    flaky.clear_faults().await;
    export(&flaky, &config, &Shutdown::never()).await.unwrap();
    let report = ingest(&sink, &ingest_config(dir.path())).await;
    assert_eq!(report.status, IngestStatus::Completed);
    assert_eq!(report.written, 250);
}

#[tokio::test]
async fn test_ingest_before_export_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let config = export_config(dir.path(), 100);
    let flaky = source(items(250));
    flaky.fail_at_page(2).await;
    assert!(export(&flaky, &config, &Shutdown::never()).await.is_err());

    let sink = sink().await;
    let ingest_config = ingest_config(dir.path());
    let report = ingest(&sink, &ingest_config).await;
    assert_eq!(report.status, IngestStatus::ExportIncomplete);
    assert_eq!(report.written, 200);
    assert_eq!(report.checkpoint, Some(IngestCursor::new(2, 100)));

    flaky.clear_faults().await;
    export(&flaky, &config, &Shutdown::never()).await.unwrap();
    let report = ingest(&sink, &ingest_config).await;
    assert_eq!(report.status, IngestStatus::Completed);
    assert_eq!(report.written, 50);
    assert_eq!(sink.items(TABLE).await, items(250));
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    export(
        &source(items(120)),
        &export_config(dir.path(), 100_000),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let sink = sink().await;
    ingest(&sink, &ingest_config(dir.path())).await;
    let again = ingest(&sink, &ingest_config(dir.path())).await;

    assert_eq!(again.status, IngestStatus::Completed);
    assert_eq!(again.written, 120);
    assert_eq!(sink.len(TABLE).await, 120);
    assert_eq!(sink.puts(), 240);
}

#[tokio::test]
async fn test_archive_retention_after_ingest() {
    let dir = tempfile::tempdir().unwrap();
    export(
        &source(items(250)),
        &export_config(dir.path(), 100),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let config = IngestConfig {
        retention: Retention::Archive,
        ..ingest_config(dir.path())
    };
    ingest(&sink().await, &config).await;

    let layout = TableLayout::new(dir.path(), TABLE);
    assert!(layout.list_segments().await.unwrap().is_empty());
    let mut archived = tokio::fs::read_dir(layout.archive_dir()).await.unwrap();
    let mut count = 0;
    while archived.next_entry().await.unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_cancelled_export_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let config = export_config(dir.path(), 100_000);
    let source = source(items(250));

    let (trigger, cancelled) = shutdown::channel();
    trigger.trigger();
    let report = export(&source, &config, &cancelled).await.unwrap();
    assert_eq!(report.status, ExportStatus::Cancelled);
    assert_eq!(report.pages_scanned, 1);
    assert!(report.checkpoint.is_some());

    let report = export(&source, &config, &Shutdown::never()).await.unwrap();
    assert_eq!(report.status, ExportStatus::Completed);
    assert_eq!(report.pages_scanned, 2);
    assert_eq!(report.total_records, 250);
}

#[tokio::test]
async fn test_cancelled_ingest_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    export(
        &source(items(50)),
        &export_config(dir.path(), 100_000),
        &Shutdown::never(),
    )
    .await
    .unwrap();

    let (trigger, cancelled) = shutdown::channel();
    trigger.trigger();
    let sink = sink().await;
    let report = run_ingest(
        Arc::new(sink.clone()),
        checkpoints(dir.path()),
        TABLE,
        &ingest_config(dir.path()),
        &cancelled,
    )
    .await
    .unwrap();

    assert_eq!(report.status, IngestStatus::Cancelled);
    assert_eq!(report.written, 0);
    assert_eq!(sink.calls(), 0);
}
