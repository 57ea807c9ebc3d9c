//! The partition catalog contract.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common_error::ShardlineResult;

use crate::file_ref::FileRef;

/// Composite catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Generation name (`name@stage_index`).
    pub name: String,
    /// Partition index within the generation.
    pub partition: usize,
}

impl PartitionKey {
    /// Create a key.
    pub fn new(name: impl Into<String>, partition: usize) -> Self {
        Self {
            name: name.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.partition)
    }
}

/// Durable mapping `(name, partition) -> ordered file list`.
///
/// # Contract
///
/// - `register` is an upsert and has committed by the time it returns.
/// - Reads observe the latest committed write for a key.
/// - Registrations to different keys do not block each other; registrations
///   to the same key serialize, last writer wins.
#[async_trait]
pub trait PartitionCatalog: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Persist (or replace) the file list of `(name, part)`.
    async fn register(&self, name: &str, part: usize, files: &[FileRef]) -> ShardlineResult<()>;

    /// Remove one partition, or every partition of `name` when `part` is `None`.
    ///
    /// Returns the number of entries removed.
    async fn unregister(&self, name: &str, part: Option<usize>) -> ShardlineResult<usize>;

    /// The registered file list, or `None` if nothing is registered.
    async fn get(&self, name: &str, part: usize) -> ShardlineResult<Option<Vec<FileRef>>>;

    /// The registered file list; an absent entry reads as empty.
    async fn lookup(&self, name: &str, part: usize) -> ShardlineResult<Vec<FileRef>> {
        Ok(self.get(name, part).await?.unwrap_or_default())
    }

    /// Registered partition indices of `name`, ascending.
    async fn partitions(&self, name: &str) -> ShardlineResult<Vec<usize>>;

    /// Names with at least one registered partition, sorted.
    async fn names(&self) -> ShardlineResult<Vec<String>>;
}
