//! File store abstraction.

use std::io::ErrorKind;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, BufWriter};

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;

/// Boxed writer handed out by a [`FileStore`].
pub type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed buffered reader handed out by a [`FileStore`].
pub type BoxedRead = Box<dyn AsyncBufRead + Send + Unpin>;

/// Where shard files live.
///
/// Remote object storage is reached through its own implementation of
/// this trait; the engine and stages only see [`FileRef`]s.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create (truncating) the file, including missing parent directories.
    ///
    /// The file is complete once the writer has been shut down.
    async fn create(&self, file: &FileRef) -> ShardlineResult<BoxedWrite>;

    /// Open the file for reading.
    async fn open(&self, file: &FileRef) -> ShardlineResult<BoxedRead>;

    /// Whether the file exists.
    async fn exists(&self, file: &FileRef) -> ShardlineResult<bool>;
}

/// Local filesystem store.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    fn local_path(file: &FileRef) -> ShardlineResult<&std::path::Path> {
        file.local_path().ok_or_else(|| {
            ShardlineError::not_implemented(format!(
                "local file store cannot reach remote reference {file}"
            ))
        })
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn create(&self, file: &FileRef) -> ShardlineResult<BoxedWrite> {
        let path = Self::local_path(file)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ShardlineError::storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let handle = tokio::fs::File::create(path).await.map_err(|e| {
            ShardlineError::storage(format!("Failed to create {}: {e}", path.display()))
        })?;
        Ok(Box::new(BufWriter::new(handle)))
    }

    async fn open(&self, file: &FileRef) -> ShardlineResult<BoxedRead> {
        let path = Self::local_path(file)?;
        let handle = tokio::fs::File::open(path).await.map_err(|e| {
            ShardlineError::storage(format!("Failed to open {}: {e}", path.display()))
        })?;
        Ok(Box::new(BufReader::new(handle)))
    }

    async fn exists(&self, file: &FileRef) -> ShardlineResult<bool> {
        let path = Self::local_path(file)?;
        match tokio::fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_create_makes_parent_dirs() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let file = FileRef::from_path(&tmp_dir.path().join("etl@0").join("x.jsonl"));

        let mut writer = LocalFileStore.create(&file).await.unwrap();
        writer.write_all(b"hello\n").await.unwrap();
        writer.shutdown().await.unwrap();

        assert!(LocalFileStore.exists(&file).await.unwrap());
        let mut content = String::new();
        LocalFileStore
            .open(&file)
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "hello\n");
    }

    #[tokio::test]
    async fn test_remote_refs_are_rejected() {
        let file = FileRef::new("s3://bucket/key.jsonl");
        assert!(matches!(
            LocalFileStore.create(&file).await,
            Err(ShardlineError::NotImplemented(_))
        ));
        assert!(LocalFileStore.exists(&file).await.is_err());
    }
}
