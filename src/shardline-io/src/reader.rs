//! Sequential row reader over a partition's files.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, Lines};

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;

use crate::format::RowFormat;
use crate::row::Row;
use crate::store::{BoxedRead, FileStore};

/// Reads rows from an ordered list of files, file by file.
pub struct RowReader {
    store: Arc<dyn FileStore>,
    format: Arc<dyn RowFormat>,
    pending: VecDeque<FileRef>,
    current: Option<(FileRef, Lines<BoxedRead>)>,
}

impl RowReader {
    /// Create a reader over `files` (already resolved).
    pub fn new(store: Arc<dyn FileStore>, format: Arc<dyn RowFormat>, files: Vec<FileRef>) -> Self {
        Self {
            store,
            format,
            pending: files.into(),
            current: None,
        }
    }

    /// Next row, or `None` once every file is exhausted.
    pub async fn next_row(&mut self) -> ShardlineResult<Option<Row>> {
        loop {
            if self.current.is_none() {
                let Some(file) = self.pending.pop_front() else {
                    return Ok(None);
                };
                let reader = self.store.open(&file).await?;
                self.current = Some((file, reader.lines()));
            }

            if let Some((file, lines)) = self.current.as_mut() {
                let line = lines.next_line().await.map_err(|e| {
                    ShardlineError::storage(format!("Failed to read {file}: {e}"))
                })?;
                match line {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let row = self.format.decode_row(&line).map_err(|e| {
                            ShardlineError::format(format!("{file}: {e}"))
                        })?;
                        return Ok(Some(row));
                    }
                    None => self.current = None,
                }
            }
        }
    }
}

/// Read every row of `files` into memory, in order.
pub async fn read_all_rows(
    store: &dyn FileStore,
    format: &dyn RowFormat,
    files: &[FileRef],
) -> ShardlineResult<Vec<Row>> {
    let mut rows = Vec::new();
    for file in files {
        let mut lines = store.open(file).await?.lines();
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                rows.push(format.decode_row(&line)?);
            }
        }
    }
    Ok(rows)
}
