use std::path::Path;

use async_trait::async_trait;

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;
use shardline_io::{Row, Schema};

use crate::context::StageContext;
use crate::stage::{MappedStage, PipelineStage};

/// Writes a fixed set of rows, ignoring its inputs.
///
/// Usually the first stage of a pipeline, where it runs for the single
/// seed partition.
#[derive(Debug, Clone)]
pub struct Const {
    schema: Schema,
    rows: Vec<Row>,
}

impl Const {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

#[async_trait]
impl MappedStage for Const {
    fn name(&self) -> &str {
        "Const"
    }

    fn validate(&self) -> ShardlineResult<()> {
        self.schema.check()?;
        for (i, row) in self.rows.iter().enumerate() {
            self.schema
                .validate(row)
                .map_err(|e| ShardlineError::config(format!("Const row {i}: {e}")))?;
        }
        Ok(())
    }

    async fn run(
        &self,
        ctx: &StageContext,
        _inputs: &[FileRef],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<FileRef>> {
        let mut writer = ctx.shard_writer(output_dir).with_schema(self.schema.clone());
        for row in &self.rows {
            writer.append(row).await?;
        }
        writer.finish().await
    }
}

impl From<Const> for PipelineStage {
    fn from(stage: Const) -> Self {
        PipelineStage::mapped(stage)
    }
}
