//! Shardline - partitioned batch pipelines with a durable partition catalog.
//!
//! A pipeline is an ordered list of stages. Each stage materializes one
//! generation (`name@i`) of partitioned files, and the partition catalog
//! records which files make up each partition so that interrupted runs can
//! resume where they stopped.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export member crates
pub use common_config as config;
pub use common_error as error;
pub use common_runtime as runtime;
pub use shardline_catalog as catalog;
pub use shardline_io as io;
pub use shardline_pipeline as pipeline;

pub use common_config::ShardlineConfig;
pub use common_error::{ShardlineError, ShardlineResult};
pub use shardline_pipeline::{Pipeline, PipelineContext, PipelineEngine, PipelineOutcome};

/// Shardline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
