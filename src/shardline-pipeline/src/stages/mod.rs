//! Built-in stages.
//!
//! | Stage | Capability | Memoized |
//! |---|---|---|
//! | [`Const`] | mapped | no |
//! | [`FlatMap`] | mapped | no |
//! | [`Sql`] | mapped | no |
//! | [`Fetch`] | mapped | yes |
//! | [`Shuffle`] | aggregate | no |
//! | [`MultiFetch`] | aggregate | no |

mod constant;
mod fetch;
mod flat_map;
mod multi_fetch;
mod shuffle;
mod sql;

pub use constant::Const;
pub use fetch::Fetch;
pub use flat_map::{FlatMap, RowFn};
pub use multi_fetch::MultiFetch;
pub use shuffle::Shuffle;
pub use sql::{format_s3_uri, Sql};
