//! Row I/O for shardline stages.
//!
//! - [`Row`] / [`Schema`]: the row model stages exchange
//! - [`RowFormat`]: how rows become bytes ([`JsonLinesFormat`] by default)
//! - [`FileStore`]: where bytes go ([`LocalFileStore`] by default)
//! - [`ShardWriter`]: materializes one partition as size-bounded files
//! - [`RowReader`]: reads a partition's files back in order

mod format;
mod reader;
mod row;
mod store;
mod writer;

pub use format::{JsonLinesFormat, RowFormat};
pub use reader::{read_all_rows, RowReader};
pub use row::{canonical_string, DataType, Field, Row, Schema};
pub use store::{BoxedRead, BoxedWrite, FileStore, LocalFileStore};
pub use writer::ShardWriter;
