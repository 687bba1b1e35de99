//! Award ingestion pipeline
//!
//! # Architecture
//!
//! - **extractor**: raw bytes to text, with encoding detection
//! - **parser**: text to [`ParsedRecord`], one independent pattern per field
//! - **normalizer**: multi-valued fields to sub-entities, batch deduplication
//! - **store**: atomic batch writes (Postgres, in-memory)
//! - **upsert**: batch transaction with per-record fallback
//! - **orchestrator**: listing, batching, and the bounded worker pool
//!
//! Data flows `ObjectSource -> TextExtractor -> AwardParser -> NormalizedBatch
//! -> AwardStore`.

pub mod error;
pub mod extractor;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod parser;
pub mod store;
pub mod upsert;

pub use error::{ExtractError, FieldWarning, IngestError, StoreError, UpsertError};
pub use extractor::TextExtractor;
pub use models::{
    BatchReport, CodedEntry, IngestSummary, Investigator, ParseOutcome, ParsedRecord, Sponsor,
    UpsertOutcome, WriteStats,
};
pub use normalizer::NormalizedBatch;
pub use orchestrator::{read_award, IngestOrchestrator};
pub use parser::AwardParser;
pub use store::{AwardStore, MemoryAwardStore, PgAwardStore};
pub use upsert::BatchUpsertEngine;
