//! Size-bounded shard writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;

use crate::format::RowFormat;
use crate::row::{Row, Schema};
use crate::store::{BoxedWrite, FileStore};

/// The shard currently receiving rows.
struct OpenShard {
    name: FileRef,
    sink: BoxedWrite,
    bytes: u64,
}

/// Accumulates the rows of one partition into size-bounded files.
///
/// A shard is opened lazily on the first `append` after construction or
/// after the previous shard was finalized. Once a shard's written size
/// exceeds the threshold it is finalized; the row that crossed the
/// threshold stays whole in that shard.
///
/// File names are returned relative to the writer's directory, in creation
/// order.
pub struct ShardWriter {
    store: Arc<dyn FileStore>,
    format: Arc<dyn RowFormat>,
    dir: PathBuf,
    schema: Option<Schema>,
    threshold: u64,
    files: Vec<FileRef>,
    current: Option<OpenShard>,
    rows_written: u64,
    buf: Vec<u8>,
}

impl ShardWriter {
    /// Create a writer producing files under `dir`.
    pub fn new(
        store: Arc<dyn FileStore>,
        format: Arc<dyn RowFormat>,
        dir: impl Into<PathBuf>,
        threshold: u64,
    ) -> Self {
        Self {
            store,
            format,
            dir: dir.into(),
            schema: None,
            threshold,
            files: Vec::new(),
            current: None,
            rows_written: 0,
            buf: Vec::new(),
        }
    }

    /// Validate every appended row against `schema`.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shard files created so far, in creation order.
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Rows appended so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Whether a shard is currently open.
    pub fn has_open_shard(&self) -> bool {
        self.current.is_some()
    }

    /// Write one row.
    pub async fn append(&mut self, row: &Row) -> ShardlineResult<()> {
        if let Some(schema) = &self.schema {
            schema.validate(row)?;
        }
        self.buf.clear();
        self.format.encode_row(row, &mut self.buf)?;

        if self.current.is_none() {
            self.open_shard().await?;
        }
        let shard = self
            .current
            .as_mut()
            .ok_or_else(|| ShardlineError::internal("shard writer has no open shard"))?;

        shard.sink.write_all(&self.buf).await.map_err(|e| {
            ShardlineError::storage(format!("Failed to write shard {}: {e}", shard.name))
        })?;
        shard.bytes += self.buf.len() as u64;
        self.rows_written += 1;

        if shard.bytes > self.threshold {
            self.finish_shard().await?;
        }
        Ok(())
    }

    /// Finalize the open shard, if any.
    pub async fn close(&mut self) -> ShardlineResult<()> {
        self.finish_shard().await
    }

    /// Close and return the created files.
    pub async fn finish(mut self) -> ShardlineResult<Vec<FileRef>> {
        self.close().await?;
        Ok(self.files)
    }

    async fn open_shard(&mut self) -> ShardlineResult<()> {
        let name = FileRef::new(format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            self.format.extension()
        ));
        let path = name.resolve(&self.dir);
        let sink = self.store.create(&path).await?;

        debug!("shard writer: opened {path}");
        self.files.push(name.clone());
        self.current = Some(OpenShard {
            name,
            sink,
            bytes: 0,
        });
        Ok(())
    }

    async fn finish_shard(&mut self) -> ShardlineResult<()> {
        let Some(mut shard) = self.current.take() else {
            return Ok(());
        };
        shard.sink.flush().await?;
        shard.sink.shutdown().await.map_err(|e| {
            ShardlineError::storage(format!("Failed to finalize shard {}: {e}", shard.name))
        })?;
        debug!(
            "shard writer: finalized {} ({} bytes)",
            shard.name, shard.bytes
        );
        Ok(())
    }
}

impl std::fmt::Debug for ShardWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardWriter")
            .field("dir", &self.dir)
            .field("threshold", &self.threshold)
            .field("files", &self.files)
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}
