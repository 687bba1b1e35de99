//! End-to-end ingestion over in-memory sources and stores

mod common;

use awards_ingest::config::PipelineConfig;
use awards_ingest::ingest::{IngestError, IngestOrchestrator, MemoryAwardStore};
use awards_ingest::storage::ObjectSource;
use bigdecimal::BigDecimal;
use common::{award_text, init_test_tracing, MemorySource, FULL_AWARD};
use std::sync::Arc;

const PREFIX: &str = "Part1/awards_1990/awd_1990_00";

fn config(batch_size: usize, concurrency: usize) -> PipelineConfig {
    PipelineConfig {
        source_prefix: PREFIX.to_string(),
        batch_size,
        concurrency,
        ..Default::default()
    }
}

fn key(name: &str) -> String {
    format!("{PREFIX}/{name}")
}

fn orchestrator(
    source: MemorySource,
    store: Arc<MemoryAwardStore>,
    config: PipelineConfig,
) -> IngestOrchestrator<MemoryAwardStore> {
    let source: Arc<dyn ObjectSource> = Arc::new(source);
    IngestOrchestrator::new(source, store, config).unwrap()
}

fn sample_source(count: usize) -> MemorySource {
    (0..count).fold(MemorySource::new(), |source, i| {
        let number = format!("90000{i:02}");
        source.with(
            &key(&format!("a{number}.txt")),
            award_text(&number, "Principal Investigator", "$10,000"),
        )
    })
}

#[tokio::test]
async fn test_full_run_commits_every_award() {
    init_test_tracing();
    let store = Arc::new(MemoryAwardStore::new());
    let summary = orchestrator(sample_source(7), store.clone(), config(3, 2))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.keys_listed, 7);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.records_succeeded, 7);
    assert_eq!(summary.records_failed, 0);
    assert_eq!(summary.batches_fell_back, 0);

    let state = store.snapshot().unwrap();
    assert_eq!(state.awards.len(), 7);
    // shared entities collapse across batches
    assert_eq!(state.investigators.len(), 1);
    assert_eq!(state.sponsors.len(), 1);
    assert_eq!(state.programs.len(), 1);
    assert_eq!(state.field_applications.len(), 1);
    assert_eq!(state.award_investigators.len(), 7);
    assert_eq!(state.award_sponsors.len(), 7);
}

#[tokio::test]
async fn test_reingestion_is_idempotent_except_program_refs() {
    init_test_tracing();
    let store = Arc::new(MemoryAwardStore::new());
    let first = orchestrator(sample_source(4), store.clone(), config(10, 1));
    first.run().await.unwrap();
    let before = store.snapshot().unwrap();

    let second = orchestrator(sample_source(4), store.clone(), config(10, 1));
    second.run().await.unwrap();
    let after = store.snapshot().unwrap();

    assert_eq!(before.awards, after.awards);
    assert_eq!(before.investigators, after.investigators);
    assert_eq!(before.sponsors, after.sponsors);
    assert_eq!(before.award_investigators, after.award_investigators);
    assert_eq!(before.award_sponsors, after.award_sponsors);
    assert_eq!(before.award_programs, after.award_programs);
    assert_eq!(before.award_field_applications, after.award_field_applications);
    // owned references are appended on every ingestion
    assert_eq!(after.program_refs.len(), before.program_refs.len() * 2);
}

#[tokio::test]
async fn test_reingestion_updates_role_without_duplicating_link() {
    let store = Arc::new(MemoryAwardStore::new());
    let first = MemorySource::new().with(
        &key("a9000001.txt"),
        award_text("9000001", "Principal Investigator", "$1,000"),
    );
    orchestrator(first, store.clone(), config(10, 1)).run().await.unwrap();

    let second = MemorySource::new().with(
        &key("a9000001.txt"),
        award_text("9000001", "Former Principal Investigator", "$2,000"),
    );
    orchestrator(second, store.clone(), config(10, 1)).run().await.unwrap();

    let state = store.snapshot().unwrap();
    assert_eq!(state.award_investigators.len(), 1);
    assert_eq!(
        state.role_of("9000001", "Jane Doe"),
        Some("Former Principal Investigator")
    );
    assert_eq!(
        state.awards["9000001"].row.expected_total_amount,
        Some(BigDecimal::from(2000))
    );
}

#[tokio::test]
async fn test_one_malformed_record_of_n() {
    init_test_tracing();
    let store = Arc::new(MemoryAwardStore::new());
    let source = sample_source(4).with(
        &key("a9000099.txt"),
        award_text("9000099", "Principal Investigator", "$99,999,999,999,999"),
    );

    let summary = orchestrator(source, store.clone(), config(10, 1))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.batches, 1);
    assert_eq!(summary.batches_fell_back, 1);
    assert_eq!(summary.records_succeeded, 4);
    assert_eq!(summary.records_failed, 1);

    let state = store.snapshot().unwrap();
    assert_eq!(state.awards.len(), 4);
    assert!(!state.awards.contains_key("9000099"));
}

#[tokio::test]
async fn test_skips_are_counted_not_fatal() {
    init_test_tracing();
    let store = Arc::new(MemoryAwardStore::new());
    let source = MemorySource::new()
        .with(&key("a9000006.txt"), FULL_AWARD)
        .with(&key("index.html"), "<html>Title : not an award</html>")
        .with(&key("notes.txt"), "nothing to see here")
        .with(&key("blank.txt"), "")
        .with(&key("orphan.txt"), "Title       : No number on this one\n")
        .with_broken(&key("a9000007.txt"));

    let summary = orchestrator(source, store.clone(), config(10, 2))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.keys_listed, 6);
    assert_eq!(summary.files_processed, 6);
    // html suffix, no labels, undecodable empty body, missing award number
    assert_eq!(summary.files_skipped, 4);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.records_succeeded, 1);
    assert!(store.snapshot().unwrap().awards.contains_key("9000006"));
}

#[tokio::test]
async fn test_panicking_batch_does_not_stop_the_run() {
    init_test_tracing();
    let store = Arc::new(MemoryAwardStore::new());
    let source = sample_source(2).with_panicking(&key("a9000050.txt"));

    let summary = orchestrator(source, store.clone(), config(1, 2))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.records_succeeded, 2);
    assert_eq!(store.snapshot().unwrap().awards.len(), 2);
}

#[tokio::test]
async fn test_batch_without_usable_records_is_skipped() {
    let store = Arc::new(MemoryAwardStore::new());
    let source = MemorySource::new()
        .with(&key("a.txt"), "junk")
        .with(&key("b.txt"), "more junk");

    let summary = orchestrator(source, store.clone(), config(10, 1))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.batches, 1);
    assert_eq!(summary.records_parsed, 0);
    assert_eq!(store.write_attempts(), 0);
}

#[tokio::test]
async fn test_empty_prefix_listing() {
    let store = Arc::new(MemoryAwardStore::new());
    let summary = orchestrator(sample_source(3), store.clone(), config(10, 1))
        .run_prefix("Part2/")
        .await
        .unwrap();

    assert_eq!(summary.keys_listed, 0);
    assert_eq!(summary.batches, 0);
}

#[tokio::test]
async fn test_listing_failure_is_an_error() {
    let store = Arc::new(MemoryAwardStore::new());
    let source = sample_source(2).with_listing_failure();

    let result = orchestrator(source, store, config(10, 1)).run().await;
    assert!(matches!(result, Err(IngestError::Listing { .. })));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let source: Arc<dyn ObjectSource> = Arc::new(MemorySource::new());
    let result = IngestOrchestrator::new(source, Arc::new(MemoryAwardStore::new()), config(0, 1));
    assert!(matches!(result, Err(IngestError::Config(_))));
}

#[tokio::test]
async fn test_forced_encoding_decode_failure_skips_file() {
    let store = Arc::new(MemoryAwardStore::new());
    let source = MemorySource::new()
        .with(&key("a9000006.txt"), FULL_AWARD)
        .with(&key("latin.txt"), b"Award Number: 9000123\nTitle : Montr\xe9al\n".to_vec());
    let config = PipelineConfig {
        source_encoding: Some("utf-8".to_string()),
        ..config(10, 1)
    };

    let summary = orchestrator(source, store.clone(), config).run().await.unwrap();
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.records_succeeded, 1);
}

#[tokio::test]
async fn test_summary_counts_cover_every_file() {
    init_test_tracing();
    let store = Arc::new(MemoryAwardStore::new());
    let source = sample_source(2)
        .with(&key("blanked.txt"), "Title : T\nAward Number: \u{FFFD}\n")
        .with(&key("nul.txt"), "Title : T\nAward Number: \0\u{FFFD}  \n")
        .with(
            &key("a9000099.txt"),
            award_text("9000099", "Principal Investigator", "$99,999,999,999,999"),
        );

    let summary = orchestrator(source, store.clone(), config(10, 1))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.files_processed, 5);
    assert_eq!(summary.files_skipped, 2);
    assert_eq!(summary.records_parsed, 3);
    assert_eq!(
        summary.files_processed,
        summary.files_skipped + summary.fetch_failures + summary.records_parsed
    );
    assert_eq!(
        summary.records_parsed,
        summary.records_succeeded + summary.records_failed
    );
    assert_eq!(summary.records_succeeded, 2);
    assert_eq!(summary.records_failed, 1);
}
