//! Shuffle routing.
//!
//! Rows are routed by hashing the canonical text of their key column with
//! XXH64 (seed 0). The hash depends only on the bytes of the key, so a key
//! lands in the same partition on every run and on every machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use twox_hash::XxHash64;

use common_error::{ShardlineError, ShardlineResult};
use shardline_io::{canonical_string, Row};

/// Seed of the routing hash. Changing it reshuffles every key.
pub const ROUTING_SEED: u64 = 0;

/// Process-independent 64-bit hash.
pub fn stable_hash(bytes: &[u8]) -> u64 {
    XxHash64::oneshot(ROUTING_SEED, bytes)
}

/// Partition index in `[0, num_partitions)` for one key value.
pub fn assign(key: &Value, num_partitions: usize) -> ShardlineResult<usize> {
    if num_partitions == 0 {
        return Err(ShardlineError::invalid_parameter(
            "cannot route into zero partitions",
        ));
    }
    let hash = stable_hash(canonical_string(key).as_bytes());
    Ok((hash % num_partitions as u64) as usize)
}

/// Routes rows to partitions by one key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleRouter {
    key: String,
    num_partitions: usize,
}

impl ShuffleRouter {
    /// Create a router; `num_partitions` must be positive.
    pub fn new(key: impl Into<String>, num_partitions: usize) -> ShardlineResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ShardlineError::invalid_parameter("shuffle key is empty"));
        }
        if num_partitions == 0 {
            return Err(ShardlineError::invalid_parameter(
                "shuffle needs at least one partition",
            ));
        }
        Ok(Self {
            key,
            num_partitions,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Destination partition of `row`.
    ///
    /// A row without the key column is a `ColumnNotFound` error. A null key
    /// routes like any other value.
    pub fn route(&self, row: &Row) -> ShardlineResult<usize> {
        let value = row
            .get(&self.key)
            .ok_or_else(|| ShardlineError::ColumnNotFound(self.key.clone()))?;
        assign(value, self.num_partitions)
    }
}

// ============================================================================
// Tests
// ============================================================================
