use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;

use crate::context::StageContext;
use crate::exec::{wait_for_job, CommandTemplate};
use crate::stage::{AggregateStage, PipelineStage};

/// Fans a fetch program out over the job queue, one job per partition.
///
/// All jobs are submitted before any is awaited. Each job is polled with
/// the configured interval, bounded by the configured job timeout. The
/// stdout lines of job `p` become output partition `p`. The first failure
/// or timeout cancels every job not yet collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiFetch {
    template: CommandTemplate,
}

impl MultiFetch {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl AggregateStage for MultiFetch {
    fn name(&self) -> &str {
        "MultiFetch"
    }

    fn validate(&self) -> ShardlineResult<()> {
        self.template.validate()
    }

    async fn run_all(
        &self,
        ctx: &StageContext,
        inputs: &[Vec<FileRef>],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<Vec<FileRef>>> {
        let mut jobs = Vec::with_capacity(inputs.len());
        for files in inputs {
            let command = self.template.expand(output_dir, files);
            jobs.push(ctx.jobs.submit(command).await?);
        }
        info!("MultiFetch submitted {} jobs", jobs.len());

        let external = &ctx.config.external;
        let poll_interval = Duration::from_millis(external.job_poll_interval_ms);
        let timeout = Duration::from_secs(external.job_timeout_secs);

        let mut outputs = Vec::with_capacity(jobs.len());
        for (part, &job) in jobs.iter().enumerate() {
            let stdout = match wait_for_job(ctx.jobs.as_ref(), job, poll_interval, timeout).await {
                Ok(stdout) => stdout,
                Err(e) => {
                    for &pending in &jobs[part..] {
                        ctx.jobs.cancel(pending).await?;
                    }
                    return Err(match e {
                        ShardlineError::JobFailed(msg) => {
                            ShardlineError::job_failed(format!("part {part}: {msg}"))
                        }
                        other => other,
                    });
                }
            };
            let files: Vec<FileRef> = stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(FileRef::new)
                .collect();
            debug!("MultiFetch part {part} produced {} files", files.len());
            outputs.push(files);
        }
        Ok(outputs)
    }
}

impl From<MultiFetch> for PipelineStage {
    fn from(stage: MultiFetch) -> Self {
        PipelineStage::aggregate(stage)
    }
}
