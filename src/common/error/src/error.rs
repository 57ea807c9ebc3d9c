//! Core error types for shardline.

use thiserror::Error;

/// Result type alias using `ShardlineError`.
pub type ShardlineResult<T> = std::result::Result<T, ShardlineError>;

/// Core error type for shardline operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShardlineError {
    /// Malformed or missing pipeline/stage configuration.
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// A stage's `run`/`run_all` call failed.
    #[error("StageError: {stage}: {message}")]
    StageError {
        /// Stage name.
        stage: String,
        /// Failure description.
        message: String,
    },

    /// Partition catalog failure.
    #[error("CatalogError: {0}")]
    CatalogError(String),

    /// File store failure.
    #[error("StorageError: {0}")]
    StorageError(String),

    /// Row encode/decode or schema failure.
    #[error("FormatError: {0}")]
    FormatError(String),

    /// Column not found in a row.
    #[error("ColumnNotFound: {0}")]
    ColumnNotFound(String),

    /// External command could not be spawned or exited unsuccessfully.
    #[error("ExternalCommand: {0}")]
    ExternalCommand(String),

    /// A queued job reported failure or produced no result.
    #[error("JobFailed: {0}")]
    JobFailed(String),

    /// A bounded wait expired.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Feature not yet implemented.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Internal error (bug in shardline).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TomlError: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl ShardlineError {
    /// Create a new `ConfigError`.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new `StageError` attributed to `stage`.
    pub fn stage<S: Into<String>, M: Into<String>>(stage: S, msg: M) -> Self {
        Self::StageError {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Create a new `CatalogError`.
    pub fn catalog<S: Into<String>>(msg: S) -> Self {
        Self::CatalogError(msg.into())
    }

    /// Create a new `StorageError`.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create a new `FormatError`.
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::FormatError(msg.into())
    }

    /// Create a new `ExternalCommand` error.
    pub fn external_command<S: Into<String>>(msg: S) -> Self {
        Self::ExternalCommand(msg.into())
    }

    /// Create a new `JobFailed` error.
    pub fn job_failed<S: Into<String>>(msg: S) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Create a new `Timeout` error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new `NotImplemented` error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this error was raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }

    /// Wrap any error as a failure of `stage`, keeping stage errors as they are.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            err @ Self::StageError { .. } => err,
            other => Self::stage(stage, other.to_string()),
        }
    }
}

/// Ensure a condition holds, returning a `ConfigError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::ShardlineError::$variant(format!($($msg)*)));
        }
    };
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::ShardlineError::ConfigError($msg.to_string()));
        }
    };
}

/// Return early with a `ConfigError`.
#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        return Err($crate::ShardlineError::ConfigError(format!($($arg)*)))
    };
}
