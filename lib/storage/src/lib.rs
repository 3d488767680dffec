//! Persisted partition sets.
//!
//! A set is a directory holding one data file per partition, named from the
//! zero-padded partition index, and a `manifest.json` recording the schema,
//! key field names, partitioner bounds, data file names in index order, row
//! counts and checksums.

pub mod manifest;
pub mod reader;
pub mod writer;

pub use manifest::{partition_file_name, Manifest, PartitionEntry, FORMAT_VERSION, MANIFEST_FILE};
pub use reader::{PartitionIter, PartitionSetReader};
pub use writer::write_rvd;

use rvd_core::{Rvd, RvdContext};
use std::path::Path;

/// Opens the set in `dir` and loads it.
pub fn read_rvd<P: AsRef<Path>>(ctx: &RvdContext, dir: P) -> rvd_core::Result<Rvd> {
    PartitionSetReader::open(dir)?.read_rvd(ctx)
}

pub(crate) fn storage_error(e: anyhow::Error) -> rvd_core::Error {
    rvd_core::Error::Storage(format!("{:#}", e))
}
