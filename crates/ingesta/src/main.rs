use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ingesta::checkpoint::FileCheckpointStore;
use ingesta::config::{ExportConfig, IngestConfig, Retention, Strictness, DEFAULT_DATA_DIR};
use ingesta::layout::TableLayout;
use ingesta::shutdown::{self, Shutdown};
use ingesta::storage::dynamodb::create_client;
use ingesta::storage::{AwsConfig, DynamoDbSink, DynamoDbSource};
use ingesta::{run_export, run_ingest, ExportStatus, IngestStatus};
use ingesta_core::item::KeySchema;
use ingesta_core::retry::RetryPolicy;
use ingesta_core::segment::SegmentLimits;

/// Ingesta - Export DynamoDB tables to /data and load them into another table
#[derive(Parser, Debug)]
#[command(name = "ingesta")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory shared by the export and ingest stages
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR, env = "DATA_DIR")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan source tables into sealed segment files
    Export(ExportArgs),
    /// Load sealed segments into the destination table
    Ingest(IngestArgs),
    /// Write Glue column definitions inferred from exported segments
    Schema(TablesArgs),
    /// Show checkpoints and segments per table
    Status(TablesArgs),
}

#[derive(Args, Debug)]
struct TablesArgs {
    /// Source table names (repeat or comma-separate)
    #[arg(
        long = "table",
        env = "SOURCE_TABLES",
        value_delimiter = ',',
        required = true
    )]
    tables: Vec<String>,
}

#[derive(Args, Debug)]
struct AwsArgs {
    /// Custom DynamoDB endpoint (for local DynamoDB)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// AWS region
    #[arg(long, default_value = "us-east-1", env = "AWS_REGION")]
    region: String,
}

impl AwsArgs {
    fn config(&self) -> AwsConfig {
        AwsConfig {
            endpoint_url: self.endpoint_url.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct RetryArgs {
    /// Delay before the first retry, in milliseconds
    #[arg(long, default_value_t = 100)]
    retry_base_ms: u64,

    /// Growth factor between retries
    #[arg(long, default_value_t = 2.0)]
    retry_multiplier: f64,

    /// Upper bound for a single retry delay, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    retry_max_ms: u64,

    /// Attempts per call, including the first one
    #[arg(long, default_value_t = 8)]
    max_attempts: u32,

    /// Fraction of each delay that is randomized
    #[arg(long, default_value_t = 0.5)]
    retry_jitter: f64,

    /// Timeout for a single call to DynamoDB, in seconds
    #[arg(long, default_value_t = 30)]
    call_timeout_secs: u64,
}

impl RetryArgs {
    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.retry_max_ms),
            max_attempts: self.max_attempts.max(1),
            jitter: self.retry_jitter,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    tables: TablesArgs,

    /// Key attributes as "pk" or "pk,sk"; discovered with DescribeTable if omitted
    #[arg(long, value_parser = parse_key_schema)]
    key: Option<KeySchema>,

    /// Scan filter expression
    #[arg(long)]
    filter: Option<String>,

    /// Items requested per scan call
    #[arg(long, default_value_t = 100)]
    page_size: u32,

    /// Seal a segment once it holds this many records
    #[arg(long, default_value_t = 100_000)]
    segment_max_records: u64,

    /// Seal a segment once it reaches this many bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    segment_max_bytes: u64,

    #[command(flatten)]
    retry: RetryArgs,

    #[command(flatten)]
    aws: AwsArgs,
}

#[derive(Args, Debug)]
struct IngestArgs {
    #[command(flatten)]
    tables: TablesArgs,

    /// Destination table (single source table only)
    #[arg(long, env = "DEST_TABLE")]
    dest_table: Option<String>,

    /// Prefix added to each source table name to get its destination
    #[arg(long, env = "DEST_TABLE_PREFIX")]
    dest_prefix: Option<String>,

    /// Key attributes as "pk" or "pk,sk"; read from the export if omitted
    #[arg(long, value_parser = parse_key_schema)]
    key: Option<KeySchema>,

    /// Records per BatchWriteItem call (at most 25)
    #[arg(long, default_value_t = 25)]
    batch_size: usize,

    /// Batches in flight at once
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// What to do with records that have no valid primary key
    #[arg(long, value_enum, default_value_t = Strictness::Skip)]
    strictness: Strictness,

    /// What to do with segments after a complete ingest
    #[arg(long, value_enum, default_value_t = Retention::Keep, env = "RETENTION")]
    retention: Retention,

    #[command(flatten)]
    retry: RetryArgs,

    #[command(flatten)]
    aws: AwsArgs,
}

fn parse_key_schema(s: &str) -> Result<KeySchema, String> {
    KeySchema::parse(s).ok_or_else(|| format!("expected \"pk\" or \"pk,sk\", got {s:?}"))
}

/// How a run ended, ordered by how much it should dominate the exit code when
/// several tables are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Outcome {
    Success,
    NotReady,
    PartialFailure,
    Failed,
    Cancelled,
}

impl Outcome {
    fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::from(1),
            Outcome::PartialFailure => ExitCode::from(2),
            Outcome::NotReady => ExitCode::from(75),
            Outcome::Cancelled => ExitCode::from(130),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ingesta=info,ingesta_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let (trigger, shutdown) = shutdown::channel();
    shutdown::install_signal_handlers(trigger);

    let result = match &cli.command {
        Command::Export(args) => export(&cli.data_dir, args, &shutdown).await,
        Command::Ingest(args) => ingest(&cli.data_dir, args, &shutdown).await,
        Command::Schema(args) => schema(&cli.data_dir, args).await,
        Command::Status(args) => status(&cli.data_dir, args).await,
    };

    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "Run failed");
            Outcome::Failed.exit_code()
        }
    }
}

fn checkpoint_store(data_dir: &std::path::Path, table: &str) -> Arc<FileCheckpointStore> {
    Arc::new(FileCheckpointStore::new(
        TableLayout::new(data_dir, table).checkpoints_dir(),
    ))
}

async fn export(
    data_dir: &std::path::Path,
    args: &ExportArgs,
    shutdown: &Shutdown,
) -> Result<Outcome> {
    let aws = args.aws.config();
    tracing::info!(endpoint = %aws.target_display(), "Connecting to source");
    let source = Arc::new(DynamoDbSource::new(create_client(&aws).await));

    let config = ExportConfig {
        data_dir: data_dir.to_path_buf(),
        page_limit: args.page_size,
        filter: args.filter.clone(),
        key_schema: args.key.clone(),
        segment_limits: SegmentLimits {
            max_records: args.segment_max_records,
            max_bytes: args.segment_max_bytes,
        },
        retry: args.retry.policy(),
        call_timeout: args.retry.call_timeout(),
    };

    let mut worst = Outcome::Success;
    for table in &args.tables.tables {
        if shutdown.is_triggered() {
            return Ok(Outcome::Cancelled);
        }

        let checkpoints = checkpoint_store(data_dir, table);
        let outcome = match run_export(source.clone(), checkpoints, table, &config, shutdown).await
        {
            Ok(report) => {
                println!("{report}");
                match report.status {
                    ExportStatus::Completed | ExportStatus::AlreadyComplete => Outcome::Success,
                    ExportStatus::Cancelled => Outcome::Cancelled,
                }
            }
            Err(e) => {
                tracing::error!(table = %table, error = %e, "Export failed");
                Outcome::Failed
            }
        };
        worst = worst.max(outcome);
    }
    Ok(worst)
}

async fn ingest(
    data_dir: &std::path::Path,
    args: &IngestArgs,
    shutdown: &Shutdown,
) -> Result<Outcome> {
    if args.dest_table.is_some() && args.tables.tables.len() > 1 {
        bail!("--dest-table can only be used with a single source table; use --dest-prefix");
    }

    let aws = args.aws.config();
    tracing::info!(endpoint = %aws.target_display(), "Connecting to destination");
    let sink = Arc::new(DynamoDbSink::new(create_client(&aws).await));

    let config = IngestConfig {
        data_dir: data_dir.to_path_buf(),
        dest_table: args.dest_table.clone(),
        dest_prefix: args.dest_prefix.clone(),
        key_schema: args.key.clone(),
        batch_size: args.batch_size,
        concurrency: args.concurrency,
        retry: args.retry.policy(),
        call_timeout: args.retry.call_timeout(),
        strictness: args.strictness,
        retention: args.retention,
    };

    let mut worst = Outcome::Success;
    for table in &args.tables.tables {
        if shutdown.is_triggered() {
            return Ok(Outcome::Cancelled);
        }

        let checkpoints = checkpoint_store(data_dir, table);
        let outcome = match run_ingest(sink.clone(), checkpoints, table, &config, shutdown).await {
            Ok(report) => {
                println!("{report}");
                if let Err(e) = report.ensure_loaded() {
                    tracing::error!(table = %table, error = %e, "Ingest incomplete");
                }
                match report.status {
                    IngestStatus::Completed => Outcome::Success,
                    IngestStatus::PartialFailure => Outcome::PartialFailure,
                    IngestStatus::NotReady | IngestStatus::ExportIncomplete => Outcome::NotReady,
                    IngestStatus::Cancelled => Outcome::Cancelled,
                }
            }
            Err(e) => {
                tracing::error!(table = %table, error = %e, "Ingest failed");
                Outcome::Failed
            }
        };
        worst = worst.max(outcome);
    }
    Ok(worst)
}

async fn schema(data_dir: &std::path::Path, args: &TablesArgs) -> Result<Outcome> {
    let mut worst = Outcome::Success;
    for table in &args.tables {
        match ingesta::schema::generate_schema(&TableLayout::new(data_dir, table)).await {
            Ok(report) => println!(
                "{}: {} columns from {} records -> {}",
                report.table,
                report.columns.len(),
                report.records,
                report.path.display()
            ),
            Err(e) => {
                tracing::error!(table = %table, error = format!("{e:#}"), "Schema generation failed");
                worst = Outcome::Failed;
            }
        }
    }
    Ok(worst)
}

async fn status(data_dir: &std::path::Path, args: &TablesArgs) -> Result<Outcome> {
    for table in &args.tables {
        let status = ingesta::status::table_status(&TableLayout::new(data_dir, table)).await?;
        println!("{status}");
    }
    Ok(Outcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_tables_from_list() {
        let cli = Cli::try_parse_from([
            "ingesta",
            "--data-dir",
            "/tmp/data",
            "export",
            "--table",
            "users,orders",
            "--key",
            "PK,SK",
        ])
        .unwrap();

        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.tables.tables, vec!["users", "orders"]);
        assert_eq!(args.key, Some(KeySchema::new("PK").with_sort_key("SK")));
        assert_eq!(args.page_size, 100);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/data"));
    }

    #[test]
    fn test_cli_ingest_defaults() {
        let cli =
            Cli::try_parse_from(["ingesta", "ingest", "--table", "users", "--retention", "archive"])
                .unwrap();
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.batch_size, 25);
        assert_eq!(args.concurrency, 4);
        assert_eq!(args.strictness, Strictness::Skip);
        assert_eq!(args.retention, Retention::Archive);
        assert_eq!(args.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(Cli::try_parse_from(["ingesta", "export", "--table", "t", "--key", "a,b,c"]).is_err());
    }

    #[test]
    fn test_worst_outcome_wins() {
        assert_eq!(Outcome::Success.max(Outcome::NotReady), Outcome::NotReady);
        assert_eq!(Outcome::PartialFailure.max(Outcome::Failed), Outcome::Failed);
        assert_eq!(Outcome::Failed.max(Outcome::Cancelled), Outcome::Cancelled);
    }
}
