//! Async runtime utilities for shardline.
//!
//! The libraries are async end to end; these helpers give synchronous
//! callers (the CLI, tests without a runtime) a way in.

use std::future::Future;

use common_error::{ShardlineError, ShardlineResult};
use tokio::runtime::Runtime;

/// Create a multi-threaded Tokio runtime.
pub fn get_runtime() -> ShardlineResult<Runtime> {
    Runtime::new().map_err(|e| ShardlineError::internal(format!("Failed to create runtime: {e}")))
}

/// Block on a future using a fresh runtime.
pub fn block_on<F: Future>(future: F) -> ShardlineResult<F::Output> {
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// Block on a fallible future, flattening the runtime error into the result.
pub fn block_on_result<F, T>(future: F) -> ShardlineResult<T>
where
    F: Future<Output = ShardlineResult<T>>,
{
    block_on(future)?
}
