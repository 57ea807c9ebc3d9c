//! Integration tests for the durable catalog.
//!
//! ## Test Categories
//!
//! 1. **Durability**: entries survive reopening the catalog
//! 2. **Upsert**: last registration wins, repeats are no-ops
//! 3. **Missing vs empty**: both read as "no rows"
//! 4. **Concurrency**: distinct keys, same key
//! 5. **Drop**: by name, by name and partition

use std::sync::Arc;

use futures::future::join_all;
use proptest::prelude::*;

use shardline_catalog::{FileRef, FsCatalog, MemoryCatalog, PartitionCatalog};

// ============================================================================
// Test Helpers
// ============================================================================

fn refs(names: &[&str]) -> Vec<FileRef> {
    names.iter().map(|n| FileRef::new(*n)).collect()
}

async fn open(dir: &tempfile::TempDir) -> FsCatalog {
    FsCatalog::open(dir.path()).await.expect("open catalog")
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let catalog = open(&dir).await;
        catalog.register("etl@0", 0, &refs(&["a.jsonl", "b.jsonl"])).await.unwrap();
        catalog.register("etl@0", 1, &refs(&["c.jsonl"])).await.unwrap();
    }

    let catalog = open(&dir).await;
    assert_eq!(
        catalog.lookup("etl@0", 0).await.unwrap(),
        refs(&["a.jsonl", "b.jsonl"])
    );
    assert_eq!(catalog.partitions("etl@0").await.unwrap(), vec![0, 1]);
    assert_eq!(catalog.names().await.unwrap(), vec!["etl@0".to_string()]);
}

// ============================================================================
// Upsert
// ============================================================================

#[tokio::test]
async fn test_upsert_keeps_latest() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(&dir).await;

    catalog.register("etl@1", 3, &refs(&["old.jsonl"])).await.unwrap();
    catalog.register("etl@1", 3, &refs(&["new1.jsonl", "new2.jsonl"])).await.unwrap();

    assert_eq!(
        catalog.lookup("etl@1", 3).await.unwrap(),
        refs(&["new1.jsonl", "new2.jsonl"])
    );
    assert_eq!(catalog.partitions("etl@1").await.unwrap(), vec![3]);
}

#[tokio::test]
async fn test_repeated_registration_is_observably_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(&dir).await;
    let files = refs(&["x.jsonl"]);

    catalog.register("etl@0", 0, &files).await.unwrap();
    let first = std::fs::read(dir.path().join("etl@0").join("0.json")).unwrap();
    catalog.register("etl@0", 0, &files).await.unwrap();
    let second = std::fs::read(dir.path().join("etl@0").join("0.json")).unwrap();

    assert_eq!(first, second);
    assert_eq!(catalog.lookup("etl@0", 0).await.unwrap(), files);
}

// ============================================================================
// Missing vs Empty
// ============================================================================

#[tokio::test]
async fn test_missing_partition_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(&dir).await;
    catalog.register("etl@0", 1, &[]).await.unwrap();

    // absent and registered-empty are the same to a reader
    assert_eq!(catalog.lookup("etl@0", 0).await.unwrap(), Vec::<FileRef>::new());
    assert_eq!(catalog.lookup("etl@0", 1).await.unwrap(), Vec::<FileRef>::new());
    assert_eq!(catalog.lookup("never@9", 0).await.unwrap(), Vec::<FileRef>::new());

    // only presence-aware reads tell them apart
    assert!(catalog.get("etl@0", 0).await.unwrap().is_none());
    assert_eq!(catalog.get("etl@0", 1).await.unwrap(), Some(vec![]));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_keys_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(open(&dir).await);

    let writes = (0..32).map(|part| {
        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            let files = vec![FileRef::new(format!("{part}.jsonl"))];
            catalog.register("etl@2", part, &files).await
        })
    });
    for result in join_all(writes).await {
        result.unwrap().unwrap();
    }

    assert_eq!(catalog.partitions("etl@2").await.unwrap(), (0..32).collect::<Vec<_>>());
    for part in 0..32 {
        assert_eq!(
            catalog.lookup("etl@2", part).await.unwrap(),
            vec![FileRef::new(format!("{part}.jsonl"))]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_key_last_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(open(&dir).await);

    let candidates: Vec<Vec<FileRef>> = (0..16)
        .map(|i| vec![FileRef::new(format!("w{i}-a")), FileRef::new(format!("w{i}-b"))])
        .collect();

    let writes = candidates.iter().cloned().map(|files| {
        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move { catalog.register("etl@0", 0, &files).await })
    });
    for result in join_all(writes).await {
        result.unwrap().unwrap();
    }

    let stored = catalog.lookup("etl@0", 0).await.unwrap();
    assert!(candidates.contains(&stored), "torn write: {stored:?}");
}

// ============================================================================
// Drop
// ============================================================================

#[tokio::test]
async fn test_drop_by_name_and_partition() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(&dir).await;
    for part in 0..3 {
        catalog.register("etl@1", part, &refs(&["f"])).await.unwrap();
    }
    catalog.register("etl@2", 0, &refs(&["g"])).await.unwrap();

    assert_eq!(catalog.unregister("etl@1", Some(2)).await.unwrap(), 1);
    assert!(catalog.get("etl@1", 2).await.unwrap().is_none());
    assert_eq!(catalog.unregister("etl@1", None).await.unwrap(), 2);
    assert_eq!(catalog.unregister("etl@1", None).await.unwrap(), 0);
    assert_eq!(catalog.names().await.unwrap(), vec!["etl@2".to_string()]);
}

#[tokio::test]
async fn test_names_with_awkward_characters() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(&dir).await;

    catalog.register("team/etl@0", 0, &refs(&["a"])).await.unwrap();
    catalog.register("team etl@0", 0, &refs(&["b"])).await.unwrap();

    assert_eq!(
        catalog.names().await.unwrap(),
        vec!["team etl@0".to_string(), "team/etl@0".to_string()]
    );
    assert_eq!(catalog.lookup("team/etl@0", 0).await.unwrap(), refs(&["a"]));
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// After any sequence of registrations, each key holds its last list.
    #[test]
    fn prop_memory_catalog_last_registration_wins(
        ops in prop::collection::vec((0usize..4, prop::collection::vec("[a-z]{1,6}", 0..4)), 1..20)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let catalog = MemoryCatalog::new();
            let mut expected = std::collections::HashMap::new();
            for (part, names) in &ops {
                let files: Vec<FileRef> = names.iter().map(|n| FileRef::new(n.as_str())).collect();
                catalog.register("prop@0", *part, &files).await.unwrap();
                expected.insert(*part, files);
            }
            for (part, files) in expected {
                prop_assert_eq!(catalog.lookup("prop@0", part).await.unwrap(), files);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
