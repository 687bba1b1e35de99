//! Destination store abstraction
//!
//! A store applies one [`NormalizedBatch`] per call, atomically: either every
//! row of the batch is persisted or none is. The upsert engine builds its
//! batch/record fallback on top of that guarantee.

use async_trait::async_trait;

use super::error::StoreError;
use super::models::WriteStats;
use super::normalizer::NormalizedBatch;

mod memory;
mod postgres;

pub use memory::{MemoryAwardStore, MemoryState, StoredAward};
pub use postgres::PgAwardStore;

/// Largest value accepted by `NUMERIC(15, 2)` is just below 10^13
pub const AMOUNT_LIMIT: i64 = 10_000_000_000_000;

#[async_trait]
pub trait AwardStore: Send + Sync {
    /// Apply the whole batch in a single transaction
    async fn write_batch(&self, batch: &NormalizedBatch) -> Result<WriteStats, StoreError>;
}
