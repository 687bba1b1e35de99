//! Error taxonomy for the award pipeline
//!
//! Field-level problems are [`FieldWarning`] values: they null a single field
//! and are logged, never propagated. File-level problems ([`ExtractError`],
//! [`IngestError`]) skip one source file. Store failures ([`StoreError`]) are
//! wrapped by the upsert engine into [`UpsertError`] at batch or record level.

use thiserror::Error;

/// Text extraction failures (per file, the file is skipped)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Encoding could not be determined")]
    EncodingUndetermined,

    #[error("Failed to decode content as {encoding}")]
    Decode { encoding: String },
}

/// Field-level parse problems; the affected field is left null
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldWarning {
    #[error("Pattern not found for {field}")]
    PatternMissing { field: &'static str },

    #[error("Sponsor block not found or malformed")]
    MalformedSponsorBlock,

    #[error("Could not parse date for {field}: '{value}'")]
    DateParse { field: &'static str, value: String },

    #[error("Could not parse amount for {field}: '{value}'")]
    CurrencyParse { field: &'static str, value: String },
}

/// Per-file and listing failures surfaced by the orchestrator
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{key}: {source}")]
    Extract {
        key: String,
        #[source]
        source: ExtractError,
    },

    #[error("{key}: no award fields found, not an award file")]
    EmptyRecord { key: String },

    #[error("{key}: award number missing")]
    MissingAwardNumber { key: String },

    #[error("Failed to list objects under '{prefix}': {message}")]
    Listing { prefix: String, message: String },

    #[error("Failed to fetch '{key}': {message}")]
    Fetch { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures of a single atomic store write
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("No id resolved for {kind} '{key}'")]
    UnresolvedKey { kind: &'static str, key: String },

    #[error("Store state is unavailable: {0}")]
    Poisoned(String),
}

/// Upsert failures at the two transactional tiers
#[derive(Error, Debug)]
pub enum UpsertError {
    /// The whole-batch transaction failed and was rolled back
    #[error("Batch upsert of {records} records failed: {source}")]
    Batch {
        records: usize,
        #[source]
        source: StoreError,
    },

    /// A single-record fallback transaction failed and was rolled back
    #[error("Upsert of award {award_number} failed: {source}")]
    Record {
        award_number: String,
        #[source]
        source: StoreError,
    },
}
