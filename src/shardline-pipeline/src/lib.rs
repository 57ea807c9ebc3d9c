//! Stage contract, shuffle routing and the pipeline engine.
//!
//! A [`Pipeline`] is an ordered list of stages. Running it with a
//! [`PipelineEngine`] materializes one generation per stage and records
//! every partition's files in the partition catalog.
//!
//! ```text
//! Pipeline("etl")
//!   Const        -> etl@0   (1 partition)
//!   Shuffle(a,4) -> etl@1   (4 partitions)
//!   Fetch        -> etl@2   (4 partitions, memoized)
//! ```

pub mod context;
pub mod engine;
pub mod exec;
pub mod routing;
pub mod stage;
pub mod stages;

pub use context::{PipelineContext, StageContext};
pub use engine::{Pipeline, PipelineEngine, PipelineOutcome, StageReport};
pub use exec::{
    CommandExecutor, CommandOutput, CommandSpec, CommandTemplate, JobQueue, JobStatus,
    LocalJobQueue, ProcessExecutor,
};
pub use routing::{assign, stable_hash, ShuffleRouter};
pub use stage::{AggregateStage, MappedStage, PipelineStage, StageCapability, StageKind};
pub use stages::{Const, Fetch, FlatMap, MultiFetch, Shuffle, Sql};
