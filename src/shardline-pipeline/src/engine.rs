//! Pipeline engine.
//!
//! The engine walks the stages of a [`Pipeline`] in order. Stage `i`
//! reads generation `name@{i-1}` from the catalog and writes generation
//! `name@i`:
//!
//! ```text
//! partition_count = 1                 (one seed partition, no inputs)
//! for each stage i:
//!   Aggregate: run_all(all partitions of name@{i-1}) -> k lists
//!              register (name@i, 0..k); partition_count = k
//!   Mapped:    for p in 0..partition_count:
//!                skip if memoized and (name@i, p) is registered
//!                run(files of (name@{i-1}, p)); register (name@i, p)
//! ```
//!
//! Stage `i + 1` starts only after every partition of stage `i` is
//! registered. A failure aborts the run; partitions registered before it
//! stay in the catalog, which is what lets a re-run skip them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::{FileRef, GenerationId};

use crate::context::PipelineContext;
use crate::stage::{AggregateStage, MappedStage, PipelineStage, StageCapability, StageKind};

// ============================================================================
// Pipeline
// ============================================================================

/// A named, ordered list of stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Into<PipelineStage>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Generation written by stage `index`.
    pub fn generation(&self, index: usize) -> GenerationId {
        GenerationId::new(self.name.clone(), index)
    }

    /// Check the pipeline and every stage's configuration.
    pub fn validate(&self) -> ShardlineResult<()> {
        common_error::ensure!(!self.name.is_empty(), "pipeline name must not be empty");
        if self.name.contains(['/', '@']) {
            common_error::config_err!(
                "pipeline name '{}' must not contain '/' or '@'",
                self.name
            );
        }
        common_error::ensure!(
            !self.stages.is_empty(),
            format!("pipeline '{}' has no stages", self.name)
        );
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|e| {
                let detail = match e {
                    ShardlineError::ConfigError(msg) => msg,
                    other => other.to_string(),
                };
                ShardlineError::config(format!("stage {i} ({}): {detail}", stage.name()))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// What one stage did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub generation: GenerationId,
    pub stage: String,
    pub kind: StageCapability,
    /// Partitions (or aggregate invocations) actually run.
    pub executed: usize,
    /// Partitions skipped because they were already registered.
    pub skipped: usize,
    pub output_partitions: usize,
    pub elapsed: Duration,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Generation written by the last stage.
    pub generation: GenerationId,
    /// Partition count of that generation.
    pub partition_count: usize,
    pub stages: Vec<StageReport>,
}

impl PipelineOutcome {
    /// Total partitions skipped across all stages.
    pub fn skipped(&self) -> usize {
        self.stages.iter().map(|s| s.skipped).sum()
    }
}

enum PartitionOutcome {
    Executed,
    Skipped,
    Abandoned,
}

// ============================================================================
// Engine
// ============================================================================

/// Runs pipelines against one context.
#[derive(Debug, Clone)]
pub struct PipelineEngine {
    ctx: PipelineContext,
}

impl PipelineEngine {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run every stage of `pipeline`.
    ///
    /// Configuration is validated before any partition work. The first
    /// stage failure aborts the run and is returned as a `StageError`.
    pub async fn run(&self, pipeline: &Pipeline) -> ShardlineResult<PipelineOutcome> {
        self.ctx.config().validate()?;
        pipeline.validate()?;
        info!(
            "Running pipeline '{}' ({} stages, {} catalog)",
            pipeline.name(),
            pipeline.stages().len(),
            self.ctx.catalog.backend()
        );

        let mut partition_count = 1;
        let mut previous: Option<GenerationId> = None;
        let mut reports = Vec::with_capacity(pipeline.stages().len());

        for (index, stage) in pipeline.stages().iter().enumerate() {
            let generation = pipeline.generation(index);
            let start = Instant::now();
            info!(
                "Stage {index} ({}) -> {generation}: {partition_count} input partitions",
                stage.name()
            );

            let result = match stage.kind() {
                StageKind::Aggregate(aggregate) => {
                    self.run_aggregate(aggregate.as_ref(), &generation, previous.as_ref(), partition_count)
                        .await
                        .map(|count| (1, 0, count))
                }
                StageKind::Mapped(mapped) => self
                    .run_mapped(
                        mapped.as_ref(),
                        stage.is_memoized(),
                        &generation,
                        previous.as_ref(),
                        partition_count,
                    )
                    .await
                    .map(|(executed, skipped)| (executed, skipped, partition_count)),
            };
            let (executed, skipped, output_partitions) = result.map_err(|e| {
                warn!("Stage {index} ({}) failed: {e}", stage.name());
                e
            })?;

            let report = StageReport {
                generation: generation.clone(),
                stage: stage.name().to_string(),
                kind: stage.capability(),
                executed,
                skipped,
                output_partitions,
                elapsed: start.elapsed(),
            };
            info!(
                "Stage {index} ({}) done: {executed} run, {skipped} skipped, {output_partitions} partitions in {:?}",
                report.stage, report.elapsed
            );
            reports.push(report);

            partition_count = output_partitions;
            previous = Some(generation);
        }

        let generation = previous
            .ok_or_else(|| ShardlineError::internal("pipeline finished without a generation"))?;
        Ok(PipelineOutcome {
            generation,
            partition_count,
            stages: reports,
        })
    }

    /// Blocking wrapper around [`run`](Self::run). Must not be called from
    /// inside an async runtime.
    pub fn run_blocking(&self, pipeline: &Pipeline) -> ShardlineResult<PipelineOutcome> {
        common_runtime::block_on_result(self.run(pipeline))
    }

    /// Explicitly remove one partition, or all partitions, of a generation.
    ///
    /// The engine itself never drops anything.
    pub async fn drop_generation(
        &self,
        generation: &GenerationId,
        part: Option<usize>,
    ) -> ShardlineResult<usize> {
        let removed = self
            .ctx
            .catalog
            .unregister(&generation.to_string(), part)
            .await?;
        info!("Dropped {removed} partitions of {generation}");
        Ok(removed)
    }

    /// Files of `(previous, part)`, resolved against its directory. The
    /// seed partition has no inputs.
    async fn input_files(
        &self,
        previous: Option<&GenerationId>,
        part: usize,
    ) -> ShardlineResult<Vec<FileRef>> {
        let Some(previous) = previous else {
            return Ok(Vec::new());
        };
        let dir = previous.output_dir(self.ctx.repo_dir());
        let files = self.ctx.catalog.lookup(&previous.to_string(), part).await?;
        Ok(files.iter().map(|f| f.resolve(&dir)).collect())
    }

    async fn run_aggregate(
        &self,
        stage: &dyn AggregateStage,
        generation: &GenerationId,
        previous: Option<&GenerationId>,
        partition_count: usize,
    ) -> ShardlineResult<usize> {
        let mut inputs = Vec::with_capacity(partition_count);
        for part in 0..partition_count {
            inputs.push(self.input_files(previous, part).await?);
        }

        let output_dir = generation.output_dir(self.ctx.repo_dir());
        let outputs = stage
            .run_all(&self.ctx.stage, &inputs, &output_dir)
            .await
            .map_err(|e| e.in_stage(stage.name()))?;

        let name = generation.to_string();
        for (part, files) in outputs.iter().enumerate() {
            self.ctx.catalog.register(&name, part, files).await?;
            debug!("Registered {generation} part {part}: {} files", files.len());
        }
        Ok(outputs.len())
    }

    async fn run_mapped(
        &self,
        stage: &dyn MappedStage,
        memoize: bool,
        generation: &GenerationId,
        previous: Option<&GenerationId>,
        partition_count: usize,
    ) -> ShardlineResult<(usize, usize)> {
        let output_dir = generation.output_dir(self.ctx.repo_dir());
        let output_dir = output_dir.as_path();
        let parallelism = self.ctx.config().execution.parallelism.max(1);
        let failed = AtomicBool::new(false);
        let failed = &failed;

        // After a failure no new partition starts; those already running
        // finish before the error is returned.
        let mut results = stream::iter(0..partition_count)
            .map(|part| async move {
                if failed.load(Ordering::Acquire) {
                    return Ok(PartitionOutcome::Abandoned);
                }
                let outcome = self
                    .run_partition(stage, memoize, generation, previous, part, output_dir)
                    .await;
                if outcome.is_err() {
                    failed.store(true, Ordering::Release);
                }
                outcome
            })
            .buffer_unordered(parallelism);

        let (mut executed, mut skipped) = (0, 0);
        let mut first_error = None;
        while let Some(result) = results.next().await {
            match result {
                Ok(PartitionOutcome::Executed) => executed += 1,
                Ok(PartitionOutcome::Skipped) => skipped += 1,
                Ok(PartitionOutcome::Abandoned) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok((executed, skipped)),
        }
    }

    async fn run_partition(
        &self,
        stage: &dyn MappedStage,
        memoize: bool,
        generation: &GenerationId,
        previous: Option<&GenerationId>,
        part: usize,
        output_dir: &Path,
    ) -> ShardlineResult<PartitionOutcome> {
        let name = generation.to_string();
        if memoize && self.ctx.catalog.get(&name, part).await?.is_some() {
            debug!("{generation} part {part} already registered, skipping");
            return Ok(PartitionOutcome::Skipped);
        }

        let inputs = self.input_files(previous, part).await?;
        let outputs = stage
            .run(&self.ctx.stage, &inputs, output_dir)
            .await
            .map_err(|e| e.in_stage(stage.name()))?;
        self.ctx.catalog.register(&name, part, &outputs).await?;
        debug!(
            "{generation} part {part}: {} inputs -> {} files",
            inputs.len(),
            outputs.len()
        );
        Ok(PartitionOutcome::Executed)
    }
}
