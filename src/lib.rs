//! # RVD
//!
//! Range-partitioned, key-ordered row collections.
//!
//! An RVD keeps every partition a contiguous, non-overlapping slice of the
//! key space, sorted by the full key. Arbitrary partitioned input is brought
//! into that form by the cheapest valid strategy, from reusing partitions
//! as they are to a full shuffle, and ordered joins then run partition by
//! partition without a shuffle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rvd::prelude::*;
//! use std::sync::Arc;
//!
//! let ctx = RvdContext::new(RvdConfig::default()).unwrap();
//! let schema = Arc::new(RowSchema::new(
//!     vec![
//!         Field::new("chrom", DataType::String),
//!         Field::new("pos", DataType::Int32),
//!         Field::new("allele", DataType::String),
//!     ],
//!     2,
//! ).unwrap());
//!
//! let left = Rvd::from_partitions(&ctx, schema.clone(), 1, vec![
//!     vec![row!["chr1", 100, "A"], row!["chr1", 200, "B"]],
//!     vec![row!["chr2", 50, "C"]],
//! ]).unwrap();
//! let right = Rvd::from_partitions(&ctx, schema, 1, vec![
//!     vec![row!["chr1", 100, "A"], row!["chr2", 50, "X"]],
//! ]).unwrap();
//!
//! let zipped = left.ordered_zip_join(&ctx, &right, 2).unwrap();
//! assert_eq!(zipped.count(), 3);
//!
//! write_rvd(&ctx, &left, std::path::Path::new("./data/left")).unwrap();
//! let back = read_rvd(&ctx, "./data/left").unwrap();
//! assert_eq!(back.count(), 3);
//! ```
//!
//! ## Crate Structure
//!
//! - [`rvd-core`](https://docs.rs/rvd-core) - Data model, partitioner, coercion, repartitioning, joins
//! - [`rvd-storage`](https://docs.rs/rvd-storage) - Persisted partition sets (manifest + data files)

// Re-export core types
pub use rvd_core::{
    key, row,
    CoalesceOutcome, CoalesceShortfall, CoercionPath,
    DataType, Field, Interval, IntervalSet, Key, KeyType, Row, RowSchema, Value,
    JoinType, ZipJoined, ZipRow,
    PartitionInfo, RangePartitioner, Rvd, RvdConfig, RvdContext, Sortedness,
    RowCollection,
    set_validation, validation_enabled,
    Error, Result,
};

// Re-export storage
pub use rvd_storage::{read_rvd, write_rvd, Manifest, PartitionSetReader};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        key, row,
        DataType, Field, Interval, Key, Row, RowSchema, Value,
        JoinType, RangePartitioner, Rvd, RvdConfig, RvdContext,
        CoercionPath, Sortedness,
        read_rvd, write_rvd,
        Error, Result,
    };
}
