//! Batch upsert engine
//!
//! Two transactional tiers: the whole batch is written in one transaction;
//! if that fails it is rolled back and every record is retried in its own
//! transaction, so one bad record cannot take its siblings down with it.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::UpsertError;
use super::models::{ParsedRecord, UpsertOutcome};
use super::normalizer::NormalizedBatch;
use super::store::AwardStore;

pub struct BatchUpsertEngine<S: AwardStore> {
    store: Arc<S>,
}

impl<S: AwardStore> Clone for BatchUpsertEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AwardStore> BatchUpsertEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upsert `records`; never fails as a whole, failures are counted
    pub async fn upsert(&self, records: &[ParsedRecord]) -> UpsertOutcome {
        let batch = NormalizedBatch::from_records(records);
        if batch.is_empty() {
            return UpsertOutcome::default();
        }

        match self.store.write_batch(&batch).await {
            Ok(stats) => {
                info!(awards = stats.awards, links = stats.links, "Batch committed");
                UpsertOutcome {
                    committed: batch.len(),
                    stats,
                    ..Default::default()
                }
            }
            Err(source) => {
                let err = UpsertError::Batch {
                    records: batch.len(),
                    source,
                };
                warn!(error = %err, "Falling back to per-record upserts");
                self.upsert_individually(records).await
            }
        }
    }

    async fn upsert_individually(&self, records: &[ParsedRecord]) -> UpsertOutcome {
        let mut outcome = UpsertOutcome {
            used_fallback: true,
            ..Default::default()
        };

        // one transaction per distinct award, last copy wins as in the batch path
        let deduped = NormalizedBatch::from_records(records);
        for award in &deduped.awards {
            let copies: Vec<ParsedRecord> = records
                .iter()
                .filter(|r| r.award_number.as_deref() == Some(award.award_number.as_str()))
                .cloned()
                .collect();
            let batch = NormalizedBatch::from_records(&copies);

            match self.store.write_batch(&batch).await {
                Ok(stats) => {
                    outcome.committed += 1;
                    outcome.stats.add(&stats);
                }
                Err(source) => {
                    let err = UpsertError::Record {
                        award_number: award.award_number.clone(),
                        source,
                    };
                    error!(error = %err, "Record rolled back");
                    outcome.failed += 1;
                    outcome.failed_awards.push(award.award_number.clone());
                }
            }
        }

        info!(
            committed = outcome.committed,
            failed = outcome.failed,
            "Per-record fallback finished"
        );
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::store::{MemoryAwardStore, AMOUNT_LIMIT};
    use bigdecimal::BigDecimal;

    fn record(number: &str, amount: i64) -> ParsedRecord {
        ParsedRecord {
            award_number: Some(number.to_string()),
            expected_total_amount: Some(BigDecimal::from(amount)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_batch_commits_once() {
        let engine = BatchUpsertEngine::new(Arc::new(MemoryAwardStore::new()));
        let outcome = engine
            .upsert(&[record("9000001", 10), record("9000002", 20)])
            .await;

        assert_eq!(outcome.committed, 2);
        assert!(!outcome.used_fallback);
        assert_eq!(engine.store().write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_bad_record_is_isolated() {
        let engine = BatchUpsertEngine::new(Arc::new(MemoryAwardStore::new()));
        let outcome = engine
            .upsert(&[
                record("9000001", 10),
                record("9000002", AMOUNT_LIMIT),
                record("9000003", 30),
            ])
            .await;

        assert!(outcome.used_fallback);
        assert_eq!(outcome.committed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failed_awards, vec!["9000002".to_string()]);
        // one batch attempt plus one per record
        assert_eq!(engine.store().write_attempts(), 4);

        let state = engine.store().snapshot().unwrap();
        assert!(state.awards.contains_key("9000001"));
        assert!(!state.awards.contains_key("9000002"));
        assert!(state.awards.contains_key("9000003"));
    }

    #[tokio::test]
    async fn test_empty_input_is_a_no_op() {
        let engine = BatchUpsertEngine::new(Arc::new(MemoryAwardStore::new()));
        let outcome = engine.upsert(&[]).await;
        assert_eq!(outcome, UpsertOutcome::default());
        assert_eq!(engine.store().write_attempts(), 0);
    }
}
