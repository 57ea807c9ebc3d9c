//! Error types and result aliases for shardline.
//!
//! Every crate in the workspace reports failures through [`ShardlineError`]
//! and propagates them with `?`; nothing retries on the caller's behalf.

mod error;

pub use error::{ShardlineError, ShardlineResult};
