//! Filesystem-backed partition catalog.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use common_error::{ShardlineError, ShardlineResult};

use crate::catalog::PartitionCatalog;
use crate::file_ref::FileRef;

// ============================================================================
// Partition Record
// ============================================================================

/// On-disk record of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Record format version.
    pub version: u32,
    /// Generation name.
    pub name: String,
    /// Partition index.
    pub partition: usize,
    /// Ordered file list.
    pub files: Vec<FileRef>,
}

impl PartitionRecord {
    /// Current record format version.
    pub const VERSION: u32 = 1;

    fn new(name: &str, partition: usize, files: &[FileRef]) -> Self {
        Self {
            version: Self::VERSION,
            name: name.to_string(),
            partition,
            files: files.to_vec(),
        }
    }
}

// ============================================================================
// Lock Table
// ============================================================================

/// Locks of one generation name.
///
/// Partition writers share `dir` and queue on their partition's mutex;
/// removing the whole name takes `dir` exclusively.
#[derive(Debug, Default)]
struct NameLocks {
    dir: tokio::sync::RwLock<()>,
    parts: Mutex<HashMap<usize, Arc<tokio::sync::Mutex<()>>>>,
}

impl NameLocks {
    fn part(&self, part: usize) -> Arc<tokio::sync::Mutex<()>> {
        let mut parts = self.parts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(parts.entry(part).or_default())
    }

    /// Drop the table's entry for `part` unless someone else holds it.
    fn release(&self, part: usize, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut parts = self.parts.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            parts.remove(&part);
        }
    }
}

// ============================================================================
// Filesystem Catalog
// ============================================================================

/// Durable catalog storing one JSON record per partition.
///
/// Layout:
/// ```text
/// <root>/
/// └── <escaped name>/
///     ├── 0.json
///     └── 1.json
/// ```
///
/// A write lands in a uniquely named temporary file which is synced and
/// then renamed over the record, so readers see either the previous or the
/// new list. Writers of the same key queue on a per-key lock, and removing
/// a whole name excludes every writer of that name. Lock entries live only
/// while an operation holds them.
#[derive(Debug)]
pub struct FsCatalog {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<NameLocks>>>,
}

impl FsCatalog {
    /// Open (creating if needed) a catalog rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> ShardlineResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            ShardlineError::catalog(format!(
                "Failed to create catalog dir {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Catalog root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn name_dir(&self, name: &str) -> PathBuf {
        self.root.join(escape_name(name))
    }

    fn record_path(&self, name: &str, part: usize) -> PathBuf {
        self.name_dir(name).join(format!("{part}.json"))
    }

    fn name_locks(&self, name: &str) -> Arc<NameLocks> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    fn release_name(&self, name: &str, name_locks: Arc<NameLocks>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = name_locks
            .parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if idle && Arc::strong_count(&name_locks) == 2 {
            locks.remove(name);
        }
    }

    /// Run `op` holding the locks for `name/part`, or for the whole name
    /// when `part` is `None`.
    async fn locked<F: Future>(&self, name: &str, part: Option<usize>, op: F) -> F::Output {
        let name_locks = self.name_locks(name);
        let output = match part {
            Some(part) => {
                let _dir = name_locks.dir.read().await;
                let lock = name_locks.part(part);
                let output = {
                    let _guard = lock.lock().await;
                    op.await
                };
                name_locks.release(part, lock);
                output
            }
            None => {
                let _dir = name_locks.dir.write().await;
                op.await
            }
        };
        self.release_name(name, name_locks);
        output
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn read_record(&self, name: &str, part: usize) -> ShardlineResult<Option<PartitionRecord>> {
        let path = self.record_path(name, part);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ShardlineError::catalog(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let record: PartitionRecord = serde_json::from_slice(&content).map_err(|e| {
            ShardlineError::catalog(format!("Failed to parse {}: {e}", path.display()))
        })?;

        if record.version != PartitionRecord::VERSION {
            return Err(ShardlineError::catalog(format!(
                "Record version mismatch in {}: expected {}, got {}",
                path.display(),
                PartitionRecord::VERSION,
                record.version
            )));
        }
        if record.name != name || record.partition != part {
            return Err(ShardlineError::catalog(format!(
                "Record {} holds {}/{}, expected {name}/{part}",
                path.display(),
                record.name,
                record.partition
            )));
        }
        Ok(Some(record))
    }

    async fn write_record(&self, record: &PartitionRecord) -> ShardlineResult<()> {
        let dir = self.name_dir(&record.name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ShardlineError::catalog(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let content = serde_json::to_vec_pretty(record)?;
        let tmp_path = dir.join(format!(
            ".{}.{}.tmp",
            record.partition,
            Uuid::new_v4().simple()
        ));
        let final_path = self.record_path(&record.name, record.partition);

        let mut file = tokio::fs::File::create(&tmp_path).await.map_err(|e| {
            ShardlineError::catalog(format!("Failed to create {}: {e}", tmp_path.display()))
        })?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(ShardlineError::catalog(format!(
                "Failed to commit {}: {e}",
                final_path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PartitionCatalog for FsCatalog {
    fn backend(&self) -> &'static str {
        "fs"
    }

    async fn register(&self, name: &str, part: usize, files: &[FileRef]) -> ShardlineResult<()> {
        let record = PartitionRecord::new(name, part, files);
        self.locked(name, Some(part), self.write_record(&record))
            .await?;
        debug!("catalog: registered {name}/{part} ({} files)", files.len());
        Ok(())
    }

    async fn unregister(&self, name: &str, part: Option<usize>) -> ShardlineResult<usize> {
        match part {
            Some(part) => {
                let remove = async {
                    match tokio::fs::remove_file(self.record_path(name, part)).await {
                        Ok(()) => Ok(1),
                        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
                        Err(e) => Err(ShardlineError::catalog(format!(
                            "Failed to remove {name}/{part}: {e}"
                        ))),
                    }
                };
                self.locked(name, Some(part), remove).await
            }
            None => {
                let remove = async {
                    let removed = self.partitions(name).await?.len();
                    match tokio::fs::remove_dir_all(self.name_dir(name)).await {
                        Ok(()) => Ok(removed),
                        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
                        Err(e) => Err(ShardlineError::catalog(format!(
                            "Failed to remove {name}: {e}"
                        ))),
                    }
                };
                self.locked(name, None, remove).await
            }
        }
    }

    async fn get(&self, name: &str, part: usize) -> ShardlineResult<Option<Vec<FileRef>>> {
        Ok(self.read_record(name, part).await?.map(|r| r.files))
    }

    async fn partitions(&self, name: &str) -> ShardlineResult<Vec<usize>> {
        let dir = self.name_dir(name);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ShardlineError::catalog(format!(
                    "Failed to list {}: {e}",
                    dir.display()
                )))
            }
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(part) = stem.parse::<usize>() {
                parts.push(part);
            }
        }
        parts.sort_unstable();
        Ok(parts)
    }

    async fn names(&self) -> ShardlineResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            ShardlineError::catalog(format!("Failed to list {}: {e}", self.root.display()))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().and_then(unescape_name) else {
                continue;
            };
            if !self.partitions(&name).await?.is_empty() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

// ============================================================================
// Name Escaping
// ============================================================================

/// Map a generation name onto a single path component.
///
/// ASCII alphanumerics, `@`, `_` and `-` pass through; every other byte
/// becomes `%XX`.
fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'@' | b'_' | b'-') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn unescape_name(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

// ============================================================================
// Tests
// ============================================================================
