//! Partition catalog for shardline.
//!
//! The catalog durably records, per `(generation name, partition index)`,
//! the ordered list of files that make up that partition:
//!
//! ```text
//! etl@0 / 0  ->  [a1b2.jsonl]
//! etl@1 / 0  ->  [c3d4.jsonl, e5f6.jsonl]
//! etl@1 / 1  ->  [s3://bucket/out/0001.jsonl]
//! ```
//!
//! - Registration is an upsert: the latest write for a key wins and is
//!   visible to every later reader.
//! - A missing entry reads as an empty file list, i.e. "no rows". Only
//!   [`PartitionCatalog::get`] tells the two apart.
//! - Entries are removed only by an explicit [`PartitionCatalog::unregister`].
//!
//! Two backends ship with the crate: [`MemoryCatalog`] for tests and
//! one-shot runs, and [`FsCatalog`] which keeps one JSON record per
//! partition on disk.

mod catalog;
mod file_ref;
mod fs;
mod memory;
mod provider;

pub use catalog::{PartitionCatalog, PartitionKey};
pub use file_ref::{FileRef, GenerationId};
pub use fs::{FsCatalog, PartitionRecord};
pub use memory::MemoryCatalog;
pub use provider::CatalogProvider;
