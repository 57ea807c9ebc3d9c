//! File references and generation identifiers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use common_error::{ShardlineError, ShardlineResult};

// ============================================================================
// File Reference
// ============================================================================

/// Opaque locator of one file belonging to a partition.
///
/// Either a bare path, resolved against the directory of the generation
/// that produced it, or a URI with an explicit scheme (`s3://bucket/key`)
/// naming remote object storage. File contents are never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    /// Create a file reference.
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Create a reference to a local path.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// The raw locator string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URI scheme, if the reference carries one.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once("://")?;
        let mut chars = scheme.chars();
        let first = chars.next()?;
        if first.is_ascii_alphabetic()
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            Some(scheme)
        } else {
            None
        }
    }

    /// Whether this reference names remote object storage.
    pub fn is_remote(&self) -> bool {
        self.scheme().is_some()
    }

    /// Local filesystem path of this reference, if it is not remote.
    pub fn local_path(&self) -> Option<&Path> {
        if self.is_remote() {
            None
        } else {
            Some(Path::new(&self.0))
        }
    }

    /// Resolve against `base_dir`.
    ///
    /// Remote and absolute references are returned unchanged; bare
    /// references are joined onto `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> Self {
        match self.local_path() {
            Some(path) if path.is_relative() => Self::from_path(&base_dir.join(path)),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FileRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Generation Identifier
// ============================================================================

/// Identifier of the dataset generation produced by one pipeline stage.
///
/// Rendered as `name@stage_index`; that string is the catalog name of the
/// generation and the name of its output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationId {
    /// Pipeline (dataset) name.
    pub name: String,
    /// Index of the stage that produced this generation.
    pub stage_index: usize,
}

impl GenerationId {
    /// Create a generation identifier.
    pub fn new(name: impl Into<String>, stage_index: usize) -> Self {
        Self {
            name: name.into(),
            stage_index,
        }
    }

    /// Parse `name@stage_index`. The last `@` separates the index.
    pub fn parse(s: &str) -> ShardlineResult<Self> {
        let (name, index) = s.rsplit_once('@').ok_or_else(|| {
            ShardlineError::invalid_parameter(format!("generation '{s}' has no '@<index>' suffix"))
        })?;
        let stage_index = index.parse::<usize>().map_err(|e| {
            ShardlineError::invalid_parameter(format!("generation '{s}' has a bad index: {e}"))
        })?;
        if name.is_empty() {
            return Err(ShardlineError::invalid_parameter(format!(
                "generation '{s}' has an empty name"
            )));
        }
        Ok(Self::new(name, stage_index))
    }

    /// The generation produced by the following stage.
    pub fn next(&self) -> Self {
        Self::new(self.name.clone(), self.stage_index + 1)
    }

    /// Output directory of this generation under `repo_dir`.
    pub fn output_dir(&self, repo_dir: &Path) -> PathBuf {
        repo_dir.join(self.to_string())
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.stage_index)
    }
}

// ============================================================================
// Tests
// ============================================================================
