use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;

use crate::context::StageContext;
use crate::exec::CommandSpec;
use crate::stage::{MappedStage, PipelineStage};

/// Runs a query through the external SQL engine.
///
/// The partition's input files are exposed to the query as a view named
/// `input`; the query result becomes one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sql {
    query: String,
}

impl Sql {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// The engine invocation for `inputs`.
    pub fn command(
        &self,
        engine_path: &str,
        format_name: &str,
        inputs: &[FileRef],
    ) -> ShardlineResult<CommandSpec> {
        let inputs = inputs
            .iter()
            .map(|f| format_s3_uri(f.as_str()))
            .collect::<ShardlineResult<Vec<_>>>()?;
        let source = match inputs.as_slice() {
            [] => {
                return Err(ShardlineError::stage(self.name(), "no input files"));
            }
            [single] => single.clone(),
            many => format!("{{{}}}", many.join(",")),
        };
        let table_fn = if source.contains("http://") { "s3" } else { "file" };
        let view = format!("create view input as select * from {table_fn}('{source}', '{format_name}')");

        Ok(CommandSpec::new(engine_path)
            .args(["--query", view.as_str()])
            .args(["--query", self.query.as_str()])
            .args(["--output-format", format_name]))
    }
}

/// Rewrite `s3://bucket/key` as the bucket's HTTP endpoint. Other
/// locators are returned unchanged.
pub fn format_s3_uri(uri: &str) -> ShardlineResult<String> {
    let Some(rest) = uri.strip_prefix("s3://") else {
        return Ok(uri.to_string());
    };
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() => {
            Ok(format!("http://{bucket}.s3.amazonaws.com/{key}"))
        }
        _ => Err(ShardlineError::invalid_parameter(format!(
            "Invalid S3 URI: {uri}. Expected format: s3://<bucket>/<key>"
        ))),
    }
}

#[async_trait]
impl MappedStage for Sql {
    fn name(&self) -> &str {
        "Sql"
    }

    fn validate(&self) -> ShardlineResult<()> {
        if self.query.trim().is_empty() {
            return Err(ShardlineError::config("Sql stage has an empty query"));
        }
        Ok(())
    }

    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[FileRef],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<FileRef>> {
        let command = self.command(
            &ctx.config.external.sql_engine_path,
            ctx.format.sql_format_name(),
            inputs,
        )?;
        let name = format!("{}.{}", Uuid::new_v4().simple(), ctx.format.extension());
        let path = output_dir.join(&name);
        if let Err(e) = ctx.executor.execute(&command, Some(&path)).await {
            // The engine may have streamed part of a result before failing.
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to remove {}: {remove_err}", path.display());
                }
            }
            return Err(e);
        }
        Ok(vec![FileRef::new(name)])
    }
}

impl From<Sql> for PipelineStage {
    fn from(stage: Sql) -> Self {
        PipelineStage::mapped(stage)
    }
}
