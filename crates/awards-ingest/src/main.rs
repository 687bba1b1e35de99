//! NSF award loader - main entry point

use anyhow::{Context, Result};
use awards_common::logging::{init_logging, LogConfig, LogLevel};
use awards_ingest::config::IngestConfig;
use awards_ingest::db;
use awards_ingest::ingest::{
    read_award, AwardParser, AwardStore, IngestOrchestrator, IngestSummary, MemoryAwardStore,
    PgAwardStore, TextExtractor,
};
use awards_ingest::storage::{LocalSource, ObjectSource, Storage};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "awards-ingest", version, about = "Load NSF award abstracts into Postgres")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest every award file under a prefix
    Run {
        /// Source prefix (overrides S3_DIRECTORY)
        #[arg(long)]
        prefix: Option<String>,

        /// Files per batch transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Batches processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Read files from this directory instead of S3
        #[arg(long)]
        local_dir: Option<PathBuf>,

        /// Write to an in-memory store instead of Postgres
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the award tables
    InitSchema,

    /// Truncate every award table
    Reset {
        /// Confirm the truncation
        #[arg(long)]
        yes: bool,
    },

    /// Row counts of the award tables
    Status,

    /// Parse one local file and print the record as JSON
    Parse {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default()
        .with_file_prefix("awards-ingest")
        .merge_env()
        .unwrap_or_else(|e| {
            eprintln!("Ignoring invalid logging settings: {e:#}");
            LogConfig::default().with_file_prefix("awards-ingest")
        });
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }

    let _log_guard = init_logging(&log_config).unwrap_or_else(|e| {
        eprintln!("Logging disabled: {e:#}");
        None
    });

    if let Err(e) = execute_command(cli.command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn execute_command(command: Commands) -> Result<()> {
    let mut config = IngestConfig::load()?;

    match command {
        Commands::Run {
            prefix,
            batch_size,
            concurrency,
            local_dir,
            dry_run,
        } => {
            if let Some(prefix) = prefix {
                config.pipeline.source_prefix = prefix;
            }
            if let Some(batch_size) = batch_size {
                config.pipeline.batch_size = batch_size;
            }
            if let Some(concurrency) = concurrency {
                config.pipeline.concurrency = concurrency;
            }
            config.validate()?;

            let source: Arc<dyn ObjectSource> = match local_dir {
                Some(dir) => {
                    info!(dir = %dir.display(), "Reading award files from local directory");
                    Arc::new(LocalSource::new(dir))
                }
                None => Arc::new(Storage::new(config.storage.clone()).await?),
            };

            let summary = if dry_run {
                warn!("Dry run: records are written to an in-memory store only");
                run_with(source, Arc::new(MemoryAwardStore::new()), &config).await?
            } else {
                let pool = db::create_pool(&config.database).await?;
                run_with(source, Arc::new(PgAwardStore::new(pool)), &config).await?
            };

            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }

        Commands::InitSchema => {
            config.validate()?;
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            println!("Schema ready");
            Ok(())
        }

        Commands::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to truncate without --yes");
            }
            config.validate()?;
            let pool = db::create_pool(&config.database).await?;
            db::truncate_all(&pool).await?;
            println!("All award tables truncated");
            Ok(())
        }

        Commands::Status => {
            config.validate()?;
            let pool = db::create_pool(&config.database).await?;
            for (table, count) in db::table_counts(&pool).await? {
                println!("{table:<26} {count}");
            }
            Ok(())
        }

        Commands::Parse { file } => {
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let extractor = match config.pipeline.source_encoding.as_deref() {
                Some(label) => TextExtractor::with_encoding(label)
                    .with_context(|| format!("Unknown source encoding '{label}'"))?,
                None => TextExtractor::new(),
            };
            let parser = AwardParser::new()?;

            let key = file.display().to_string();
            let outcome = read_award(&extractor, &parser, &key, &raw)?;
            let warnings: Vec<String> = outcome.warnings.iter().map(ToString::to_string).collect();

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "record": outcome.record,
                    "warnings": warnings,
                }))?
            );
            Ok(())
        }
    }
}

async fn run_with<S: AwardStore + 'static>(
    source: Arc<dyn ObjectSource>,
    store: Arc<S>,
    config: &IngestConfig,
) -> Result<IngestSummary> {
    let orchestrator = IngestOrchestrator::new(source, store, config.pipeline.clone())?;
    let summary = orchestrator.run().await?;

    if summary.records_failed > 0 || summary.batches_failed > 0 {
        warn!(
            records_failed = summary.records_failed,
            batches_failed = summary.batches_failed,
            "Ingestion finished with failures"
        );
    }
    Ok(summary)
}
