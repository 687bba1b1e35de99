use awards_common::error::{env_or, first_env};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default database URL for local development
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/nsf_awards_db";

/// Tables written by the pipeline, junctions first
pub const PIPELINE_TABLES: [&str; 10] = [
    "award_investigators",
    "award_sponsors",
    "award_programs",
    "award_field_applications",
    "program_refs",
    "investigators",
    "sponsors",
    "nsf_programs",
    "field_applications",
    "nsf_awards",
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Database configuration error: {0}. Check DATABASE_URL or RDS_ENDPOINT.")]
    Config(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

impl DbConfig {
    /// `DATABASE_URL`, or a URL assembled from the RDS-style variables
    pub fn from_env() -> DbResult<Self> {
        let defaults = Self::default();
        let url = match first_env(&["DATABASE_URL"]) {
            Some(url) => url,
            None => match first_env(&["RDS_ENDPOINT"]) {
                Some(host) => rds_url(&host)?,
                None => defaults.url,
            },
        };

        Ok(Self {
            url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections)
                .map_err(|e| DbError::Config(e.to_string()))?,
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections)
                .map_err(|e| DbError::Config(e.to_string()))?,
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT", defaults.connect_timeout_secs)
                .map_err(|e| DbError::Config(e.to_string()))?,
        })
    }
}

fn rds_url(host: &str) -> DbResult<String> {
    let port: u16 = env_or("DB_PORT", 5432).map_err(|e| DbError::Config(e.to_string()))?;
    let name = first_env(&["DB_NAME"]).unwrap_or_else(|| "nsf_awards_db".to_string());
    let user = first_env(&["DB_USER"]).unwrap_or_else(|| "awarddbuser".to_string());
    let password = first_env(&["DB_PASSWORD"])
        .ok_or_else(|| DbError::Config("DB_PASSWORD must be set with RDS_ENDPOINT".to_string()))?;
    Ok(format!("postgresql://{user}:{password}@{host}:{port}/{name}"))
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(
        max_connections = config.max_connections,
        "Database pool created"
    );
    Ok(pool)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Schema migrations applied");
    Ok(())
}

/// Empty every pipeline table and reset the id sequences
pub async fn truncate_all(pool: &PgPool) -> DbResult<()> {
    let statement = format!(
        "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
        PIPELINE_TABLES.join(", ")
    );
    sqlx::query(&statement).execute(pool).await?;
    info!("Truncated {} tables", PIPELINE_TABLES.len());
    Ok(())
}

/// Row count per pipeline table
pub async fn table_counts(pool: &PgPool) -> DbResult<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(PIPELINE_TABLES.len());
    for table in PIPELINE_TABLES {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await?;
        counts.push((table, count));
    }
    Ok(counts)
}
