//! In-memory partition catalog.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use common_error::ShardlineResult;

use crate::catalog::{PartitionCatalog, PartitionKey};
use crate::file_ref::FileRef;

/// Process-local catalog backed by a hash map.
///
/// One map-wide lock guards every key. No `.await` happens while it is
/// held: file lists are cloned before the write lock is taken, so a
/// writer blocks others only for one map insert or removal. Registrations
/// of distinct keys therefore serialize briefly but never wait on I/O.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: RwLock<HashMap<PartitionKey, Vec<FileRef>>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the catalog has no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PartitionCatalog for MemoryCatalog {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn register(&self, name: &str, part: usize, files: &[FileRef]) -> ShardlineResult<()> {
        let key = PartitionKey::new(name, part);
        let files = files.to_vec();
        self.entries.write().await.insert(key, files);
        Ok(())
    }

    async fn unregister(&self, name: &str, part: Option<usize>) -> ShardlineResult<usize> {
        let mut entries = self.entries.write().await;
        let removed = match part {
            Some(part) => usize::from(entries.remove(&PartitionKey::new(name, part)).is_some()),
            None => {
                let before = entries.len();
                entries.retain(|key, _| key.name != name);
                before - entries.len()
            }
        };
        Ok(removed)
    }

    async fn get(&self, name: &str, part: usize) -> ShardlineResult<Option<Vec<FileRef>>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&PartitionKey::new(name, part))
            .cloned())
    }

    async fn partitions(&self, name: &str) -> ShardlineResult<Vec<usize>> {
        let mut parts: Vec<usize> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|key| key.name == name)
            .map(|key| key.partition)
            .collect();
        parts.sort_unstable();
        Ok(parts)
    }

    async fn names(&self) -> ShardlineResult<Vec<String>> {
        let names: BTreeSet<String> = self
            .entries
            .read()
            .await
            .keys()
            .map(|key| key.name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> Vec<FileRef> {
        names.iter().map(|n| FileRef::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_register_is_upsert() {
        let catalog = MemoryCatalog::new();

        catalog.register("etl@0", 0, &refs(&["a", "b"])).await.unwrap();
        catalog.register("etl@0", 0, &refs(&["c"])).await.unwrap();

        assert_eq!(catalog.lookup("etl@0", 0).await.unwrap(), refs(&["c"]));
        assert_eq!(catalog.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_and_empty_both_read_as_no_rows() {
        let catalog = MemoryCatalog::new();
        catalog.register("etl@0", 1, &[]).await.unwrap();

        assert!(catalog.lookup("etl@0", 0).await.unwrap().is_empty());
        assert!(catalog.lookup("etl@0", 1).await.unwrap().is_empty());

        assert_eq!(catalog.get("etl@0", 0).await.unwrap(), None);
        assert_eq!(catalog.get("etl@0", 1).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_unregister() {
        let catalog = MemoryCatalog::new();
        for part in 0..3 {
            catalog.register("etl@1", part, &refs(&["x"])).await.unwrap();
        }
        catalog.register("other@0", 0, &refs(&["y"])).await.unwrap();

        assert_eq!(catalog.unregister("etl@1", Some(1)).await.unwrap(), 1);
        assert_eq!(catalog.unregister("etl@1", Some(1)).await.unwrap(), 0);
        assert_eq!(catalog.partitions("etl@1").await.unwrap(), vec![0, 2]);

        assert_eq!(catalog.unregister("etl@1", None).await.unwrap(), 2);
        assert_eq!(catalog.names().await.unwrap(), vec!["other@0".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_all_land() {
        let catalog = std::sync::Arc::new(MemoryCatalog::new());

        let mut tasks = Vec::new();
        for part in 0..64 {
            let catalog = catalog.clone();
            tasks.push(tokio::spawn(async move {
                let file = FileRef::new(format!("f{part}"));
                catalog.register("etl@0", part, &[file]).await.unwrap();
                // Interleave reads with the other writers.
                catalog.partitions("etl@0").await.unwrap()
            }));
        }
        for task in tasks {
            assert!(!task.await.unwrap().is_empty());
        }

        assert_eq!(catalog.len().await, 64);
        assert_eq!(catalog.partitions("etl@0").await.unwrap(), (0..64).collect::<Vec<_>>());
        assert_eq!(catalog.lookup("etl@0", 17).await.unwrap(), refs(&["f17"]));
    }
}
