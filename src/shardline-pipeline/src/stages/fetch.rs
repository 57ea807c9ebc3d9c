use std::path::Path;

use async_trait::async_trait;

use common_config::ExternalConfig;
use common_error::ShardlineResult;
use shardline_catalog::FileRef;

use crate::context::StageContext;
use crate::exec::CommandTemplate;
use crate::stage::{MappedStage, PipelineStage};

/// Runs an external fetch program for one partition.
///
/// The program writes its results under the output directory and prints
/// one output file reference per line. Its output depends only on its
/// inputs, so completed partitions are skipped on re-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    template: CommandTemplate,
}

impl Fetch {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }

    /// `<fetch_program> {output_dir} {inputs}`.
    pub fn from_config(config: &ExternalConfig) -> Self {
        Self::new(CommandTemplate::new(config.fetch_program.clone()))
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }
}

#[async_trait]
impl MappedStage for Fetch {
    fn name(&self) -> &str {
        "Fetch"
    }

    fn validate(&self) -> ShardlineResult<()> {
        self.template.validate()
    }

    fn memoizable(&self) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[FileRef],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<FileRef>> {
        let command = self.template.expand(output_dir, inputs);
        let output = ctx.executor.execute(&command, None).await?;
        Ok(output.stdout_lines().into_iter().map(FileRef::new).collect())
    }
}

impl From<Fetch> for PipelineStage {
    fn from(stage: Fetch) -> Self {
        PipelineStage::mapped(stage)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use common_config::ShardlineConfig;

    #[tokio::test]
    async fn test_fetch_collects_stdout_lines() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(ShardlineConfig::default());
        // `sh -c '...' sh <output_dir> <inputs...>` echoes one name per input.
        let template = CommandTemplate::new("sh").with_args([
            "-c",
            "shift; for f in \"$@\"; do echo \"$(basename \"$f\").out\"; done",
            "sh",
            "{output_dir}",
            "{inputs}",
        ]);
        let stage = Fetch::new(template);
        assert!(stage.memoizable());
        assert!(PipelineStage::from(stage.clone()).is_memoized());

        let files = stage
            .run(
                &ctx,
                &[FileRef::new("/in/a.jsonl"), FileRef::new("/in/b.jsonl")],
                tmp_dir.path(),
            )
            .await
            .unwrap();
        assert_eq!(files, vec![FileRef::new("a.jsonl.out"), FileRef::new("b.jsonl.out")]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(ShardlineConfig::default());
        let stage = Fetch::new(CommandTemplate::new("false").with_args(Vec::<String>::new()));
        assert!(stage.run(&ctx, &[], tmp_dir.path()).await.is_err());
    }

    #[test]
    fn test_fetch_from_config() {
        let stage = Fetch::from_config(&ExternalConfig::default());
        assert_eq!(stage.template().program, "superfetch");
        assert!(stage.validate().is_ok());
    }
}
