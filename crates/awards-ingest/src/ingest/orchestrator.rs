//! Ingestion orchestrator
//!
//! Lists the source keys, cuts them into fixed-size batches, and runs one
//! task per batch on a bounded pool. Each task fetches, decodes, and parses
//! its files, then hands the surviving records to the upsert engine. A
//! failure inside one batch, including a panic, never stops the others.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::error::IngestError;
use super::extractor::TextExtractor;
use super::models::{BatchReport, IngestSummary, ParseOutcome, ParsedRecord};
use super::parser::AwardParser;
use super::store::AwardStore;
use super::upsert::BatchUpsertEngine;
use crate::config::PipelineConfig;
use crate::storage::ObjectSource;

/// Decode and parse one source file.
///
/// A file in which no label matched at all is `EmptyRecord`.
pub fn read_award(
    extractor: &TextExtractor,
    parser: &AwardParser,
    key: &str,
    raw: &[u8],
) -> Result<ParseOutcome, IngestError> {
    let extracted = extractor.extract(raw).map_err(|source| IngestError::Extract {
        key: key.to_string(),
        source,
    })?;

    let outcome = parser.parse(&extracted.text);
    if outcome.record.is_empty() {
        return Err(IngestError::EmptyRecord {
            key: key.to_string(),
        });
    }
    Ok(outcome)
}

enum KeyOutcome {
    Record(Box<ParsedRecord>),
    Skipped,
    FetchFailed,
}

/// Everything one batch task needs, cheap to clone into the task
struct BatchWorker<S: AwardStore> {
    source: Arc<dyn ObjectSource>,
    engine: BatchUpsertEngine<S>,
    parser: Arc<AwardParser>,
    extractor: Arc<TextExtractor>,
    config: Arc<PipelineConfig>,
}

impl<S: AwardStore> Clone for BatchWorker<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            engine: self.engine.clone(),
            parser: Arc::clone(&self.parser),
            extractor: Arc::clone(&self.extractor),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: AwardStore> BatchWorker<S> {
    async fn process(self, batch_index: usize, keys: Vec<String>) -> BatchReport {
        let mut report = BatchReport {
            batch_index,
            keys: keys.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(keys.len());

        for key in &keys {
            match self.load(key).await {
                KeyOutcome::Record(record) => records.push(*record),
                KeyOutcome::Skipped => report.skipped += 1,
                KeyOutcome::FetchFailed => report.fetch_failures += 1,
            }
        }

        report.parsed = records.len();
        if records.is_empty() {
            warn!(keys = keys.len(), "No usable records in batch, skipping upsert");
            return report;
        }

        report.upsert = self.engine.upsert(&records).await;
        info!(
            parsed = report.parsed,
            committed = report.upsert.committed,
            failed = report.upsert.failed,
            skipped = report.skipped,
            "Batch finished"
        );
        report
    }

    async fn load(&self, key: &str) -> KeyOutcome {
        if self.config.should_skip(key) {
            debug!(key, "Skipping by suffix");
            return KeyOutcome::Skipped;
        }

        let raw = match self.source.fetch(key).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = IngestError::Fetch {
                    key: key.to_string(),
                    message: format!("{e:#}"),
                };
                warn!(error = %err, "Skipping file");
                return KeyOutcome::FetchFailed;
            }
        };

        let outcome = match read_award(&self.extractor, &self.parser, key, &raw) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "Skipping file");
                return KeyOutcome::Skipped;
            }
        };

        for warning in &outcome.warnings {
            warn!(key, %warning, "Field not extracted");
        }

        if outcome.record.award_key().is_none() {
            let err = IngestError::MissingAwardNumber {
                key: key.to_string(),
            };
            warn!(error = %err, "Skipping file");
            return KeyOutcome::Skipped;
        }

        KeyOutcome::Record(Box::new(outcome.record))
    }
}

/// Drives a full ingestion run over one object source and one store
pub struct IngestOrchestrator<S: AwardStore> {
    worker: BatchWorker<S>,
}

impl<S: AwardStore + 'static> IngestOrchestrator<S> {
    pub fn new(
        source: Arc<dyn ObjectSource>,
        store: Arc<S>,
        config: PipelineConfig,
    ) -> Result<Self, IngestError> {
        config
            .validate()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        let parser = AwardParser::new().map_err(|e| IngestError::Config(e.to_string()))?;
        let extractor = match config.source_encoding.as_deref() {
            Some(label) => TextExtractor::with_encoding(label).map_err(|_| {
                IngestError::Config(format!("Unknown source encoding '{label}'"))
            })?,
            None => TextExtractor::new(),
        };

        Ok(Self {
            worker: BatchWorker {
                source,
                engine: BatchUpsertEngine::new(store),
                parser: Arc::new(parser),
                extractor: Arc::new(extractor),
                config: Arc::new(config),
            },
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.worker.config
    }

    pub fn store(&self) -> &S {
        self.worker.engine.store()
    }

    /// Ingest everything under the configured prefix
    pub async fn run(&self) -> Result<IngestSummary, IngestError> {
        let prefix = self.worker.config.source_prefix.clone();
        self.run_prefix(&prefix).await
    }

    /// Ingest everything under `prefix`; only a listing failure is an error
    pub async fn run_prefix(&self, prefix: &str) -> Result<IngestSummary, IngestError> {
        let keys = self
            .worker
            .source
            .list_keys(prefix)
            .await
            .map_err(|e| IngestError::Listing {
                prefix: prefix.to_string(),
                message: format!("{e:#}"),
            })?;

        let mut summary = IngestSummary {
            keys_listed: keys.len(),
            ..Default::default()
        };
        if keys.is_empty() {
            warn!(prefix, "No source files found");
            return Ok(summary);
        }

        let batch_size = self.worker.config.batch_size;
        let concurrency = self.worker.config.concurrency;
        let total = keys.len().div_ceil(batch_size);
        info!(
            prefix,
            keys = keys.len(),
            batches = total,
            concurrency,
            "Starting ingestion"
        );

        let batches: Vec<Vec<String>> = keys.chunks(batch_size).map(<[String]>::to_vec).collect();
        let mut tasks = stream::iter(batches.into_iter().enumerate().map(|(index, keys)| {
            let worker = self.worker.clone();
            let span = info_span!("batch", index, total);
            tokio::spawn(worker.process(index, keys).instrument(span))
        }))
        .buffer_unordered(concurrency);

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(report) => summary.absorb(&report),
                Err(e) => {
                    error!(error = %e, "Batch task aborted");
                    summary.batches += 1;
                    summary.batches_failed += 1;
                }
            }
        }

        info!(
            batches = summary.batches,
            succeeded = summary.records_succeeded,
            failed = summary.records_failed,
            skipped = summary.files_skipped,
            "Ingestion finished"
        );
        Ok(summary)
    }
}
