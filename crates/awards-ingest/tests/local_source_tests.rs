//! Directory-tree source and a dry run over it

mod common;

use awards_ingest::config::PipelineConfig;
use awards_ingest::ingest::{IngestOrchestrator, MemoryAwardStore};
use awards_ingest::storage::{LocalSource, ObjectSource};
use common::{award_text, FULL_AWARD};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn award_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let awards = dir.path().join("Part1/awards_1990/awd_1990_00");
    fs::create_dir_all(&awards).unwrap();
    fs::write(awards.join("a9000006.txt"), FULL_AWARD).unwrap();
    fs::write(
        awards.join("a9000007.txt"),
        award_text("9000007", "Principal Investigator", "$5,000"),
    )
    .unwrap();
    fs::write(awards.join("index.html"), "<html></html>").unwrap();

    let other = dir.path().join("Part1/awards_1990/awd_1990_01");
    fs::create_dir_all(&other).unwrap();
    fs::write(
        other.join("a9000100.txt"),
        award_text("9000100", "Principal Investigator", "$5,000"),
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn test_keys_are_relative_and_prefix_filtered() {
    let dir = award_tree();
    let source = LocalSource::new(dir.path());

    let keys = source.list_keys("Part1/awards_1990/awd_1990_00").await.unwrap();
    assert_eq!(
        keys,
        vec![
            "Part1/awards_1990/awd_1990_00/a9000006.txt",
            "Part1/awards_1990/awd_1990_00/a9000007.txt",
            "Part1/awards_1990/awd_1990_00/index.html",
        ]
    );

    let all = source.list_keys("").await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_fetch_reads_bytes() {
    let dir = award_tree();
    let source = LocalSource::new(dir.path());

    let bytes = source
        .fetch("Part1/awards_1990/awd_1990_00/a9000006.txt")
        .await
        .unwrap();
    assert_eq!(bytes, FULL_AWARD.as_bytes());
    assert!(source.fetch("Part1/missing.txt").await.is_err());
}

#[tokio::test]
async fn test_dry_run_over_directory() {
    let dir = award_tree();
    let source: Arc<dyn ObjectSource> = Arc::new(LocalSource::new(dir.path()));
    let store = Arc::new(MemoryAwardStore::new());

    let orchestrator =
        IngestOrchestrator::new(source, store.clone(), PipelineConfig::default()).unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.keys_listed, 3);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.records_succeeded, 2);

    let state = store.snapshot().unwrap();
    assert!(state.awards.contains_key("9000006"));
    assert!(state.awards.contains_key("9000007"));
    assert!(!state.awards.contains_key("9000100"));
}
