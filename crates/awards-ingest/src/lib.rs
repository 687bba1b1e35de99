//! NSF Awards Loader
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads NSF award abstracts from an S3 bucket (or a local directory tree)
//! into a normalized Postgres schema.
//!
//! # Overview
//!
//! - **Sources**: S3 via `aws-sdk-s3`, or a directory via `walkdir`
//! - **Parsing**: label/value award text with per-field fault tolerance
//! - **Storage**: idempotent upserts keyed on award number and entity natural keys
//! - **Configuration**: environment-based, see [`config::IngestConfig`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use awards_ingest::config::PipelineConfig;
//! use awards_ingest::ingest::{IngestOrchestrator, MemoryAwardStore};
//! use awards_ingest::storage::LocalSource;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let source = Arc::new(LocalSource::new("./data"));
//! let store = Arc::new(MemoryAwardStore::new());
//! let orchestrator = IngestOrchestrator::new(source, store, PipelineConfig::default())?;
//! let summary = orchestrator.run().await?;
//! println!("{} awards committed", summary.records_succeeded);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod ingest;
pub mod storage;

pub use config::IngestConfig;
