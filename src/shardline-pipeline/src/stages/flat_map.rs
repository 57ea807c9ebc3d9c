use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use common_error::ShardlineResult;
use shardline_catalog::FileRef;
use shardline_io::{Row, Schema};

use crate::context::StageContext;
use crate::stage::{MappedStage, PipelineStage};

/// User function applied to each input row.
pub type RowFn = Arc<dyn Fn(Row) -> ShardlineResult<Vec<Row>> + Send + Sync>;

/// Maps every input row to zero or more output rows.
///
/// Rows are read in input file order; the outputs of one row are written
/// before the next row is read.
#[derive(Clone)]
pub struct FlatMap {
    name: String,
    schema: Schema,
    func: RowFn,
}

impl FlatMap {
    pub fn new<F>(schema: Schema, func: F) -> Self
    where
        F: Fn(Row) -> ShardlineResult<Vec<Row>> + Send + Sync + 'static,
    {
        Self {
            name: "FlatMap".to_string(),
            schema,
            func: Arc::new(func),
        }
    }

    /// Name shown in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for FlatMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatMap")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MappedStage for FlatMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ShardlineResult<()> {
        self.schema.check()
    }

    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[FileRef],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<FileRef>> {
        let mut reader = ctx.row_reader(inputs.to_vec());
        let mut writer = ctx.shard_writer(output_dir).with_schema(self.schema.clone());
        while let Some(row) = reader.next_row().await? {
            for out in (self.func)(row)? {
                writer.append(&out).await?;
            }
        }
        writer.finish().await
    }
}

impl From<FlatMap> for PipelineStage {
    fn from(stage: FlatMap) -> Self {
        PipelineStage::mapped(stage)
    }
}
