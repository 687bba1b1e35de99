//! Configuration management

use awards_common::error::{env_or, first_env};
use serde::{Deserialize, Serialize};

use crate::db::DbConfig;
use crate::storage::config::StorageConfig;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Source prefix used when neither the CLI nor the environment names one.
pub const DEFAULT_SOURCE_PREFIX: &str = "Part1/awards_1990/awd_1990_00";

/// Source keys per batch, one transaction per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Upper bound for the derived worker count.
pub const MAX_DEFAULT_CONCURRENCY: usize = 32;

/// Key suffixes skipped before fetching.
pub const DEFAULT_SKIP_SUFFIXES: &[&str] = &[".html"];

/// Everything the loader needs, built once and passed down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DbConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

/// Batching and worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source_prefix: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub skip_suffixes: Vec<String>,
    /// WHATWG encoding label that bypasses detection
    pub source_encoding: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_prefix: DEFAULT_SOURCE_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: default_concurrency(),
            skip_suffixes: DEFAULT_SKIP_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            source_encoding: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            source_prefix: first_env(&["S3_DIRECTORY", "INGEST_SOURCE_PREFIX"])
                .unwrap_or(defaults.source_prefix),
            batch_size: env_or("INGEST_BATCH_SIZE", defaults.batch_size)?,
            concurrency: env_or("INGEST_CONCURRENCY", defaults.concurrency)?,
            skip_suffixes: first_env(&["INGEST_SKIP_SUFFIXES"])
                .map(|raw| parse_suffixes(&raw))
                .unwrap_or(defaults.skip_suffixes),
            source_encoding: first_env(&["INGEST_SOURCE_ENCODING"]),
        })
    }

    pub fn should_skip(&self, key: &str) -> bool {
        self.skip_suffixes.iter().any(|suffix| key.ends_with(suffix.as_str()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }
        if self.concurrency == 0 {
            anyhow::bail!("Concurrency must be greater than 0");
        }
        Ok(())
    }
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment, and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DbConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
        })
    }

    /// Checks shared by every command; the S3 bucket is checked by the S3 source
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.pipeline.validate()?;

        if (self.database.max_connections as usize) < self.pipeline.concurrency {
            tracing::warn!(
                max_connections = self.database.max_connections,
                concurrency = self.pipeline.concurrency,
                "Pool is smaller than the worker count; workers will wait for connections"
            );
        }

        Ok(())
    }
}

/// Available parallelism plus four, capped
pub fn default_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores + 4).min(MAX_DEFAULT_CONCURRENCY)
}

fn parse_suffixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
