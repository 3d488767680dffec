//! # RVD Core
//!
//! Core library for RVD, range-partitioned key-ordered row collections.
//!
//! This crate provides the data model and the algorithms built on it:
//!
//! - [`RowSchema`], [`Row`], [`Key`] - Field layout with an ordered key prefix
//! - [`RangePartitioner`] - Key-range bounds, one per partition
//! - [`PartitionInfo`] - Single-pass sortedness classification and key sampling
//! - [`Rvd`] - Schema, partitioner and partitioned rows kept in agreement
//! - [`coercer`] - Cheapest valid layout for arbitrary partitioned input
//! - [`join`] - Merge, distinct and zip joins on a shared key prefix
//!
//! ## Example
//!
//! ```rust
//! use rvd_core::{row, DataType, Field, RowSchema, Rvd, RvdContext};
//! use std::sync::Arc;
//!
//! let ctx = RvdContext::sequential();
//! let schema = Arc::new(RowSchema::new(
//!     vec![
//!         Field::new("chrom", DataType::String),
//!         Field::new("pos", DataType::Int32),
//!         Field::new("allele", DataType::String),
//!     ],
//!     2,
//! ).unwrap());
//!
//! let rvd = Rvd::from_partitions(&ctx, schema, 1, vec![
//!     vec![row!["chr2", 50, "C"]],
//!     vec![row!["chr1", 100, "A"], row!["chr1", 200, "B"]],
//! ]).unwrap();
//!
//! assert_eq!(rvd.count(), 3);
//! assert_eq!(rvd.partition(0)[0], row!["chr1", 100, "A"]);
//! ```

pub mod error;
pub mod value;
pub mod row;
pub mod schema;
pub mod interval;
pub mod partitioner;
pub mod sortedness;
pub mod arena;
pub mod codec;
pub mod exec;
pub mod context;
pub mod repartition;
pub mod coercer;
pub mod join;
pub mod rvd;

pub use error::{Error, Result};
pub use value::{DataType, Value};
pub use row::{Key, KeyOrdering, Row};
pub use schema::{Field, KeyType, RowSchema};
pub use interval::{Interval, IntervalSet};
pub use partitioner::RangePartitioner;
pub use sortedness::{PartitionInfo, Sortedness};
pub use arena::{Region, TaskContext};
pub use codec::{EncodedRow, RowCodec};
pub use exec::{Broadcast, RowCollection, TaskRunner};
pub use context::{set_validation, validation_enabled, RvdConfig, RvdContext};
pub use coercer::CoercionPath;
pub use join::{JoinType, ZipJoined, ZipRow};
pub use rvd::{CoalesceOutcome, CoalesceShortfall, Rvd};
