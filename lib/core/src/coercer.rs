//! Turns arbitrary partitioned rows into a valid partitioner and layout.
//!
//! One sampling pass classifies every partition; the cheapest strategy that
//! yields a valid result is then chosen from the aggregated statistics:
//!
//! 1. no rows: an empty result with no bounds;
//! 2. every partition sorted on the full key with disjoint key ranges: the
//!    partitions are reused, only reordered;
//! 3. sorted partitions whose ranges touch at shared keys: a local
//!    repartition onto strictified bounds;
//! 4. partitions sorted on the partition key with ranges that are valid once
//!    coarsened to it: a local repartition followed by a per-partition sort;
//! 5. anything else: a full shuffle onto bounds taken from the key samples.

use crate::codec::RowCodec;
use crate::context::RvdContext;
use crate::exec::RowCollection;
use crate::interval::Interval;
use crate::partitioner::RangePartitioner;
use crate::repartition::{local_repartition, shuffle_repartition, sort_partitions};
use crate::row::Key;
use crate::schema::{KeyType, RowSchema};
use crate::sortedness::{global_sortedness, partition_seed, samples_per_partition, PartitionInfo, Sortedness};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which coercion branch produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoercionPath {
    Empty,
    /// Partitions reused as they are, possibly reordered.
    AsIs,
    LocalRepartition,
    /// Local repartition plus a per-partition sort on the full key.
    LocalSort,
    Shuffle,
}

impl fmt::Display for CoercionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoercionPath::Empty => "empty",
            CoercionPath::AsIs => "as-is",
            CoercionPath::LocalRepartition => "local repartition",
            CoercionPath::LocalSort => "local repartition and sort",
            CoercionPath::Shuffle => "shuffle",
        })
    }
}

/// A coercion plan derived from partition statistics alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Empty,
    AsIs {
        order: Vec<usize>,
        partitioner: RangePartitioner,
    },
    LocalRepartition {
        order: Vec<usize>,
        source: RangePartitioner,
        target: RangePartitioner,
    },
    LocalSort {
        order: Vec<usize>,
        source: RangePartitioner,
        target: RangePartitioner,
    },
    Shuffle {
        target: RangePartitioner,
    },
}

impl Strategy {
    pub fn path(&self) -> CoercionPath {
        match self {
            Strategy::Empty => CoercionPath::Empty,
            Strategy::AsIs { .. } => CoercionPath::AsIs,
            Strategy::LocalRepartition { .. } => CoercionPath::LocalRepartition,
            Strategy::LocalSort { .. } => CoercionPath::LocalSort,
            Strategy::Shuffle { .. } => CoercionPath::Shuffle,
        }
    }
}

/// Picks a strategy for data keyed by `key_type` and partitioned on its
/// first `partition_key_len` fields. `infos` may come in any order.
///
/// `current` is the partitioner the data is believed to follow already; it
/// is kept, empty partitions included, when every partition is sorted and
/// lies within its own bound.
pub fn choose_strategy(
    key_type: &KeyType,
    partition_key_len: usize,
    infos: &[PartitionInfo],
    current: Option<&RangePartitioner>,
) -> Result<Strategy> {
    if partition_key_len > key_type.len() {
        return Err(Error::SchemaMismatch(format!(
            "partition key length {} exceeds key type {}",
            partition_key_len, key_type
        )));
    }

    let mut nonempty: Vec<&PartitionInfo> = infos.iter().filter(|i| !i.is_empty()).collect();
    if nonempty.is_empty() {
        return Ok(Strategy::Empty);
    }
    if let Some(partitioner) = current {
        if fits(partitioner, key_type, infos) {
            return Ok(Strategy::AsIs {
                order: (0..infos.len()).collect(),
                partitioner: partitioner.clone(),
            });
        }
    }
    nonempty.sort_by(|a, b| {
        a.min
            .cmp(&b.min)
            .then_with(|| a.max.cmp(&b.max))
            .then_with(|| a.partition_index.cmp(&b.partition_index))
    });
    let order: Vec<usize> = nonempty.iter().map(|i| i.partition_index).collect();
    let intervals: Vec<Interval> = nonempty.iter().filter_map(|i| i.interval()).collect();
    let sortedness = global_sortedness(nonempty.iter().copied());
    let key_len = key_type.len();

    if sortedness == Sortedness::KSorted {
        if RangePartitioner::is_valid_disjoint(&intervals) {
            let partitioner = RangePartitioner::new(key_type.clone(), intervals)?;
            return Ok(Strategy::AsIs { order, partitioner });
        }
        if let Ok(source) =
            RangePartitioner::with_overlap(key_type.clone(), intervals.clone(), key_len)
        {
            let target = source.strictify();
            return Ok(Strategy::LocalRepartition {
                order,
                source,
                target,
            });
        }
    }

    if sortedness >= Sortedness::TSorted {
        let coarsened: Vec<Interval> = intervals
            .iter()
            .map(|i| i.coarsen(partition_key_len))
            .collect();
        if let Ok(source) = RangePartitioner::with_overlap(
            key_type.prefix(partition_key_len),
            coarsened,
            partition_key_len,
        ) {
            let target = source.strictify();
            return Ok(Strategy::LocalSort {
                order,
                source,
                target,
            });
        }
    }

    let target = partitioner_from_samples(key_type, partition_key_len, infos)?;
    Ok(Strategy::Shuffle { target })
}

fn fits(partitioner: &RangePartitioner, key_type: &KeyType, infos: &[PartitionInfo]) -> bool {
    partitioner.is_strict()
        && partitioner.num_partitions() == infos.len()
        && partitioner.check_compatible(key_type).is_ok()
        && infos.iter().all(|info| {
            info.sortedness == Sortedness::KSorted
                && info.partition_index < infos.len()
                && info.interval().map_or(true, |iv| {
                    partitioner.range_bounds()[info.partition_index].contains_interval(&iv)
                })
        })
}

/// A disjoint partitioner on the partition key whose split points are
/// quantiles of the pooled samples. Split points that collapse onto each
/// other or onto the minimum yield fewer partitions.
pub fn partitioner_from_samples(
    key_type: &KeyType,
    partition_key_len: usize,
    infos: &[PartitionInfo],
) -> Result<RangePartitioner> {
    let pk_type = key_type.prefix(partition_key_len);
    let min = infos.iter().filter_map(|i| i.min.as_ref()).min();
    let max = infos.iter().filter_map(|i| i.max.as_ref()).max();
    let (Some(min), Some(max)) = (min, max) else {
        return Ok(RangePartitioner::empty(pk_type));
    };
    let min = min.truncate(partition_key_len);
    let max = max.truncate(partition_key_len);

    let mut samples: Vec<Key> = infos
        .iter()
        .flat_map(|i| i.samples.iter().map(|k| k.truncate(partition_key_len)))
        .collect();
    samples.sort();

    let n = infos.len().max(1);
    let mut splits: Vec<Key> = Vec::with_capacity(n);
    if !samples.is_empty() {
        for j in 1..n {
            let s = &samples[(j * samples.len() / n).min(samples.len() - 1)];
            if *s > min && *s <= max && splits.last().map_or(true, |last| s > last) {
                splits.push(s.clone());
            }
        }
    }

    let mut points = Vec::with_capacity(splits.len() + 1);
    points.push(min);
    points.extend(splits);
    let mut bounds: Vec<Interval> = points
        .windows(2)
        .map(|w| Interval::half_open(w[0].clone(), w[1].clone()))
        .collect();
    if let Some(last) = points.last() {
        bounds.push(Interval::closed(last.clone(), max));
    }
    RangePartitioner::new(pk_type, bounds)
}

/// Computes statistics for every partition. All sampling tasks finish
/// before this returns.
pub fn partition_infos(
    ctx: &RvdContext,
    rows: &RowCollection,
    key_len: usize,
    partition_key_len: usize,
) -> Result<Vec<PartitionInfo>> {
    let config = ctx.config();
    let per_partition = samples_per_partition(
        rows.num_partitions(),
        config.samples_per_partition,
        config.max_sample_size,
    );
    let seed = config.seed;
    rows.run_partitions(ctx.runner(), |task, part| {
        let index = task.partition_index();
        Ok(PartitionInfo::compute(
            index,
            part,
            key_len,
            partition_key_len,
            per_partition,
            partition_seed(seed, index),
        ))
    })
}

/// Result of [`coerce`]: the rows laid out under `partitioner`.
#[derive(Debug, Clone)]
pub struct Coerced {
    pub partitioner: RangePartitioner,
    pub rows: RowCollection,
    pub path: CoercionPath,
}

/// Coerces `rows` of `schema` into key order under a range partitioner on
/// the first `partition_key_len` key fields (or a longer prefix).
pub fn coerce(
    ctx: &RvdContext,
    schema: &Arc<RowSchema>,
    partition_key_len: usize,
    rows: RowCollection,
    current: Option<&RangePartitioner>,
) -> Result<Coerced> {
    let key_type = schema.key_type();
    let key_len = schema.key_len();
    let infos = partition_infos(ctx, &rows, key_len, partition_key_len)?;

    let empty = infos.iter().filter(|i| i.is_empty()).count();
    if empty > 0 && empty < infos.len() {
        warn!("dropping {} empty partitions of {}", empty, infos.len());
    }
    if let Some(info) = infos.iter().find(|i| i.context.is_some()) {
        debug!(
            "partition {}: {}",
            info.partition_index,
            info.context.as_deref().unwrap_or_default()
        );
    }

    let strategy = choose_strategy(&key_type, partition_key_len, &infos, current)?;
    let path = strategy.path();
    debug!(
        "coercing {} partitions ({}): {}",
        infos.len(),
        global_sortedness(&infos),
        path
    );

    let runner = ctx.runner();
    let (partitioner, rows) = match strategy {
        Strategy::Empty => (RangePartitioner::empty(key_type), RowCollection::empty()),
        Strategy::AsIs { order, partitioner } => (partitioner, rows.select(&order)),
        Strategy::LocalRepartition {
            order,
            source,
            target,
        } => {
            let moved = local_repartition(runner, &rows.select(&order), &source, &target)?;
            (target, moved)
        }
        Strategy::LocalSort {
            order,
            source,
            target,
        } => {
            let moved = local_repartition(runner, &rows.select(&order), &source, &target)?;
            (target, sort_partitions(runner, &moved, key_len, false)?)
        }
        Strategy::Shuffle { target } => {
            let codec = RowCodec::new(Arc::clone(schema));
            let (shuffled, widened) =
                shuffle_repartition(runner, &codec, &rows, &target, key_len, false)?;
            (widened, shuffled)
        }
    };
    Ok(Coerced {
        partitioner,
        rows,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use crate::schema::Field;
    use crate::value::DataType;

    fn key_type() -> KeyType {
        KeyType::new(vec![
            Field::new("k", DataType::Int32),
            Field::new("v", DataType::Int32),
        ])
    }

    fn info(index: usize, min: Key, max: Key, sortedness: Sortedness) -> PartitionInfo {
        PartitionInfo {
            partition_index: index,
            size: 10,
            samples: vec![min.clone(), max.clone()],
            min: Some(min),
            max: Some(max),
            sortedness,
            context: None,
        }
    }

    #[test]
    fn test_empty_input() {
        let empty = PartitionInfo::compute(0, &[], 2, 1, 20, 0);
        assert_eq!(choose_strategy(&key_type(), 1, &[empty], None).unwrap(), Strategy::Empty);
        assert_eq!(choose_strategy(&key_type(), 1, &[], None).unwrap(), Strategy::Empty);
    }

    #[test]
    fn test_disjoint_sorted_partitions_are_reordered() {
        let infos = vec![
            info(0, key![20, 0], key![25, 0], Sortedness::KSorted),
            info(1, key![1, 0], key![10, 0], Sortedness::KSorted),
        ];
        match choose_strategy(&key_type(), 1, &infos, None).unwrap() {
            Strategy::AsIs { order, partitioner } => {
                assert_eq!(order, vec![1, 0]);
                assert_eq!(partitioner.num_partitions(), 2);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_touching_sorted_partitions_repartition_locally() {
        let infos = vec![
            info(0, key![1, 0], key![5, 0], Sortedness::KSorted),
            info(1, key![5, 0], key![9, 0], Sortedness::KSorted),
        ];
        let strategy = choose_strategy(&key_type(), 2, &infos, None).unwrap();
        assert_eq!(strategy.path(), CoercionPath::LocalRepartition);
    }

    #[test]
    fn test_tsorted_with_valid_coarsening_sorts_locally() {
        let infos = vec![
            info(0, key![1, 3], key![5, 0], Sortedness::TSorted),
            info(1, key![5, 7], key![9, 0], Sortedness::KSorted),
        ];
        match choose_strategy(&key_type(), 1, &infos, None).unwrap() {
            Strategy::LocalSort { target, .. } => {
                assert!(target.is_strict());
                assert_eq!(target.key_len(), 1);
                assert_eq!(target.num_partitions(), 2);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_tsorted_partitions_shuffle() {
        let infos = vec![
            info(0, key![1, 0], key![10, 0], Sortedness::TSorted),
            info(1, key![5, 0], key![15, 0], Sortedness::TSorted),
            info(2, key![20, 0], key![25, 0], Sortedness::TSorted),
            info(3, key![30, 0], key![40, 0], Sortedness::TSorted),
        ];
        match choose_strategy(&key_type(), 1, &infos, None).unwrap() {
            Strategy::Shuffle { target } => {
                assert!(target.num_partitions() >= 1);
                assert!(RangePartitioner::is_valid_disjoint(target.range_bounds()));
                assert_eq!(target.range(), Some(Interval::closed(key![1], key![40])));
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_current_partitioner_kept_when_rows_fit() {
        let current = RangePartitioner::new(
            key_type().prefix(1),
            vec![
                Interval::half_open(key![0], key![10]),
                Interval::half_open(key![10], key![20]),
                Interval::closed(key![20], key![30]),
            ],
        )
        .unwrap();
        let mut infos = vec![
            info(0, key![1, 0], key![9, 9], Sortedness::KSorted),
            PartitionInfo::compute(1, &[], 2, 1, 20, 0),
            info(2, key![20, 0], key![25, 0], Sortedness::KSorted),
        ];
        match choose_strategy(&key_type(), 1, &infos, Some(&current)).unwrap() {
            Strategy::AsIs { order, partitioner } => {
                assert_eq!(order, vec![0, 1, 2]);
                assert_eq!(partitioner, current);
            }
            other => panic!("unexpected strategy {:?}", other),
        }

        // Outside its bound: the observed ranges replace the current bounds.
        infos[2].max = Some(key![31, 0]);
        match choose_strategy(&key_type(), 1, &infos, Some(&current)).unwrap() {
            Strategy::AsIs { order, partitioner } => {
                assert_eq!(order, vec![0, 2]);
                assert_ne!(partitioner, current);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_sample_partitioner_dedups_splits() {
        let mut infos = vec![info(0, key![1, 0], key![1, 9], Sortedness::Unsorted)];
        infos[0].samples = vec![key![1, 0]; 8];
        infos.push(info(1, key![1, 0], key![2, 0], Sortedness::Unsorted));
        let p = partitioner_from_samples(&key_type(), 1, &infos).unwrap();
        assert_eq!(p.num_partitions(), 1);
        assert_eq!(p.range_bounds()[0], Interval::closed(key![1], key![2]));
    }
}
