//! Execution contexts handed to stages and to the engine.

use std::path::Path;
use std::sync::Arc;

use common_config::ShardlineConfig;
use common_error::ShardlineResult;
use shardline_catalog::{CatalogProvider, FileRef, PartitionCatalog};
use shardline_io::{FileStore, JsonLinesFormat, LocalFileStore, RowFormat, RowReader, ShardWriter};

use crate::exec::{CommandExecutor, JobQueue, LocalJobQueue, ProcessExecutor};

// ============================================================================
// Stage Context
// ============================================================================

/// Resources a stage may use while running.
///
/// The context is read-only to stages and shared by every partition
/// invocation of a run.
#[derive(Clone)]
pub struct StageContext {
    /// Storage for shard files.
    pub store: Arc<dyn FileStore>,
    /// Row encoding of shard files.
    pub format: Arc<dyn RowFormat>,
    /// Runner for external commands.
    pub executor: Arc<dyn CommandExecutor>,
    /// Queue for fanned-out external jobs.
    pub jobs: Arc<dyn JobQueue>,
    /// Runtime configuration.
    pub config: Arc<ShardlineConfig>,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("format", &self.format.extension())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StageContext {
    /// Local files, JSON lines, local processes.
    pub fn new(config: ShardlineConfig) -> Self {
        let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor);
        let jobs = Arc::new(LocalJobQueue::new(
            Arc::clone(&executor),
            config.external.max_concurrent_jobs,
        ));
        Self {
            store: Arc::new(LocalFileStore),
            format: Arc::new(JsonLinesFormat),
            executor,
            jobs,
            config: Arc::new(config),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_format(mut self, format: Arc<dyn RowFormat>) -> Self {
        self.format = format;
        self
    }

    /// Replace the executor. The job queue keeps its own executor.
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_job_queue(mut self, jobs: Arc<dyn JobQueue>) -> Self {
        self.jobs = jobs;
        self
    }

    /// A shard writer for `dir` using the configured threshold.
    pub fn shard_writer(&self, dir: &Path) -> ShardWriter {
        ShardWriter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.format),
            dir,
            self.config.writer.shard_size_bytes,
        )
    }

    /// A reader over `files`, in order.
    pub fn row_reader(&self, files: Vec<FileRef>) -> RowReader {
        RowReader::new(Arc::clone(&self.store), Arc::clone(&self.format), files)
    }
}

// ============================================================================
// Pipeline Context
// ============================================================================

/// Everything a pipeline run needs: the catalog plus the stage context.
#[derive(Clone)]
pub struct PipelineContext {
    pub catalog: Arc<dyn PartitionCatalog>,
    pub stage: StageContext,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("catalog", &self.catalog.backend())
            .field("stage", &self.stage)
            .finish()
    }
}

impl PipelineContext {
    pub fn new(catalog: Arc<dyn PartitionCatalog>, stage: StageContext) -> Self {
        Self { catalog, stage }
    }

    /// Open the configured catalog and build default stage resources.
    pub async fn from_config(config: ShardlineConfig) -> ShardlineResult<Self> {
        config.validate()?;
        let catalog = CatalogProvider::open(&config.catalog).await?;
        Ok(Self::new(catalog, StageContext::new(config)))
    }

    pub fn config(&self) -> &ShardlineConfig {
        &self.stage.config
    }

    /// Root directory of generation outputs.
    pub fn repo_dir(&self) -> &Path {
        &self.stage.config.repo_dir
    }
}
