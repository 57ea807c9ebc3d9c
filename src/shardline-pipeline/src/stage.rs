//! Stage contract.
//!
//! A stage transforms the file lists of one generation into the file lists
//! of the next. Two capabilities exist:
//!
//! ```text
//! Mapped:    one partition's inputs  -> one partition's outputs
//! Aggregate: every partition's inputs -> any number of output partitions
//! ```
//!
//! Stages return output file locators; bare names are interpreted relative
//! to the stage's output directory. The engine owns the catalog: stages
//! never register their outputs themselves.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use common_error::ShardlineResult;
use shardline_catalog::FileRef;

use crate::context::StageContext;

/// A stage that runs once per partition.
#[async_trait]
pub trait MappedStage: Send + Sync {
    /// Name for logs and errors.
    fn name(&self) -> &str;

    /// Check configuration before any stage of the pipeline runs.
    fn validate(&self) -> ShardlineResult<()> {
        Ok(())
    }

    /// Whether a partition that already has catalog outputs may be skipped.
    fn memoizable(&self) -> bool {
        false
    }

    /// Transform one partition's input files into output files under
    /// `output_dir`.
    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[FileRef],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<FileRef>>;
}

/// A stage that sees every partition at once.
#[async_trait]
pub trait AggregateStage: Send + Sync {
    /// Name for logs and errors.
    fn name(&self) -> &str;

    /// Check configuration before any stage of the pipeline runs.
    fn validate(&self) -> ShardlineResult<()> {
        Ok(())
    }

    /// Transform all partitions' input files. The length of the result is
    /// the next generation's partition count.
    async fn run_all(
        &self,
        ctx: &StageContext,
        inputs: &[Vec<FileRef>],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<Vec<FileRef>>>;
}

/// The capability of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageCapability {
    Mapped,
    Aggregate,
}

impl fmt::Display for StageCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapped => write!(f, "mapped"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// A stage of either capability.
#[derive(Clone)]
pub enum StageKind {
    Mapped(Arc<dyn MappedStage>),
    Aggregate(Arc<dyn AggregateStage>),
}

/// A stage as placed in a pipeline.
#[derive(Clone)]
pub struct PipelineStage {
    kind: StageKind,
    memoize: bool,
}

impl PipelineStage {
    /// Wrap a mapped stage; memoization follows the stage's default.
    pub fn mapped(stage: impl MappedStage + 'static) -> Self {
        let memoize = stage.memoizable();
        Self {
            kind: StageKind::Mapped(Arc::new(stage)),
            memoize,
        }
    }

    /// Wrap an aggregate stage. Aggregate stages always re-run.
    pub fn aggregate(stage: impl AggregateStage + 'static) -> Self {
        Self {
            kind: StageKind::Aggregate(Arc::new(stage)),
            memoize: false,
        }
    }

    /// Override memoization. Has no effect on aggregate stages.
    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            StageKind::Mapped(stage) => stage.name(),
            StageKind::Aggregate(stage) => stage.name(),
        }
    }

    pub fn capability(&self) -> StageCapability {
        match self.kind {
            StageKind::Mapped(_) => StageCapability::Mapped,
            StageKind::Aggregate(_) => StageCapability::Aggregate,
        }
    }

    /// Whether completed partitions are skipped on re-run.
    pub fn is_memoized(&self) -> bool {
        self.memoize && self.capability() == StageCapability::Mapped
    }

    pub fn validate(&self) -> ShardlineResult<()> {
        match &self.kind {
            StageKind::Mapped(stage) => stage.validate(),
            StageKind::Aggregate(stage) => stage.validate(),
        }
    }
}

impl fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name())
            .field("capability", &self.capability())
            .field("memoize", &self.memoize)
            .finish()
    }
}
