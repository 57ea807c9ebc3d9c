//! Configuration management for shardline.
//!
//! Provides runtime configuration for the partition catalog, the pipeline
//! engine, the shard writer and the external collaborators (SQL engine,
//! fetch command, job queue). Loaded from TOML; every section is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use common_error::{ShardlineError, ShardlineResult};

/// Default shard size threshold: roughly 100 MB per output file.
pub const DEFAULT_SHARD_SIZE_BYTES: u64 = 100_000_000;

/// Global shardline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardlineConfig {
    /// Root directory holding one output directory per generation.
    pub repo_dir: PathBuf,
    /// Partition catalog configuration.
    pub catalog: CatalogConfig,
    /// Engine configuration.
    pub execution: ExecutionConfig,
    /// Shard writer configuration.
    pub writer: WriterConfig,
    /// External collaborators.
    pub external: ExternalConfig,
}

impl Default for ShardlineConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("./shardline_data"),
            catalog: CatalogConfig::default(),
            execution: ExecutionConfig::default(),
            writer: WriterConfig::default(),
            external: ExternalConfig::default(),
        }
    }
}

impl ShardlineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> ShardlineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShardlineError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text and validate it.
    pub fn from_toml(content: &str) -> ShardlineResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the repository directory.
    pub fn with_repo_dir(mut self, repo_dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = repo_dir.into();
        self
    }

    /// Set the catalog configuration.
    pub fn with_catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set the number of partitions a mapped stage may run at once.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.execution.parallelism = parallelism;
        self
    }

    /// Set the shard size threshold.
    pub fn with_shard_size(mut self, bytes: u64) -> Self {
        self.writer.shard_size_bytes = bytes;
        self
    }

    /// Set the external collaborator configuration.
    pub fn with_external(mut self, external: ExternalConfig) -> Self {
        self.external = external;
        self
    }

    /// Check value ranges. Called before any pipeline work starts.
    pub fn validate(&self) -> ShardlineResult<()> {
        if self.execution.parallelism == 0 {
            return Err(ShardlineError::config("execution.parallelism must be >= 1"));
        }
        if self.writer.shard_size_bytes == 0 {
            return Err(ShardlineError::config("writer.shard_size_bytes must be > 0"));
        }
        if self.external.job_poll_interval_ms == 0 {
            return Err(ShardlineError::config(
                "external.job_poll_interval_ms must be > 0",
            ));
        }
        if self.external.max_concurrent_jobs == 0 {
            return Err(ShardlineError::config(
                "external.max_concurrent_jobs must be >= 1",
            ));
        }
        if let CatalogConfig::Fs { path } = &self.catalog {
            if path.as_os_str().is_empty() {
                return Err(ShardlineError::config("catalog.path must not be empty"));
            }
        }
        Ok(())
    }
}

/// Partition catalog backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// Process-local catalog, lost on exit.
    Memory,
    /// Durable catalog stored as one JSON record per partition.
    Fs {
        /// Catalog root directory.
        path: PathBuf,
    },
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl CatalogConfig {
    /// Create a filesystem catalog configuration.
    pub fn fs(path: impl Into<PathBuf>) -> Self {
        Self::Fs { path: path.into() }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum concurrent partition invocations inside one mapped stage.
    pub parallelism: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

/// Shard writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// A shard is closed once its written size exceeds this many bytes.
    pub shard_size_bytes: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            shard_size_bytes: DEFAULT_SHARD_SIZE_BYTES,
        }
    }
}

/// External collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Path of the external SQL engine binary.
    pub sql_engine_path: String,
    /// Path of the fetch program used by fetch stages.
    pub fetch_program: String,
    /// Wait per poll of a queued job.
    pub job_poll_interval_ms: u64,
    /// Upper bound on the total wait for one queued job.
    pub job_timeout_secs: u64,
    /// Jobs the local queue runs at once.
    pub max_concurrent_jobs: usize,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            sql_engine_path: "clickhouse".to_string(),
            fetch_program: "superfetch".to_string(),
            job_poll_interval_ms: 10_000,
            job_timeout_secs: 5 * 24 * 60 * 60,
            max_concurrent_jobs: 4,
        }
    }
}
