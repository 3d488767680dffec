//! Redistribution of partitioned rows onto a new partitioner.
//!
//! The local path re-slices neighbouring source partitions and keeps their
//! row order. The shuffle path routes every row by key and sorts on receipt.

use crate::exec::{Broadcast, RowCollection, TaskRunner};
use crate::codec::RowCodec;
use crate::partitioner::RangePartitioner;
use crate::row::{KeyOrdering, Row};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Re-slices `rows`, laid out by `source`, into the bounds of `target`.
/// Each new partition concatenates, in source order, the rows of the source
/// partitions overlapping its bound that `target` assigns to it. Rows outside
/// every target bound are dropped.
pub fn local_repartition(
    runner: &TaskRunner,
    rows: &RowCollection,
    source: &RangePartitioner,
    target: &RangePartitioner,
) -> Result<RowCollection> {
    if source.num_partitions() != rows.num_partitions() {
        return Err(Error::InvalidArgument(format!(
            "partitioner has {} bounds for {} partitions",
            source.num_partitions(),
            rows.num_partitions()
        )));
    }
    if !target.key_type().is_prefix_of(source.key_type()) {
        return Err(Error::SchemaMismatch(format!(
            "cannot repartition {} onto {} without a shuffle",
            source.key_type(),
            target.key_type()
        )));
    }

    let inputs: Vec<(usize, Vec<Arc<Vec<Row>>>)> = target
        .range_bounds()
        .iter()
        .enumerate()
        .map(|(i, bound)| {
            let sources = source.overlapping(bound);
            (i, sources.into_iter().map(|j| rows.shared_partition(j)).collect())
        })
        .collect();
    debug!(
        "local repartition: {} -> {} partitions",
        rows.num_partitions(),
        target.num_partitions()
    );

    let key_len = target.key_len();
    let target = Broadcast::new(target.clone());
    let parts = runner.run(inputs, |_, (i, sources)| {
        Ok(sources
            .iter()
            .flat_map(|p| p.iter())
            .filter(|r| target.contains(r.key_slice(key_len)) == Some(i))
            .cloned()
            .collect())
    })?;
    Ok(RowCollection::new(parts))
}

/// Routes every row to a partition of `target` and sorts each received
/// partition by the first `key_len` fields.
///
/// With `filter`, rows outside every bound are dropped and `target` is
/// returned unchanged. Without it, such rows go to the nearest partition at
/// or above them (the last one past the end) and the returned partitioner
/// has its bounds widened to cover what each partition received.
pub fn shuffle_repartition(
    runner: &TaskRunner,
    codec: &RowCodec,
    rows: &RowCollection,
    target: &RangePartitioner,
    key_len: usize,
    filter: bool,
) -> Result<(RowCollection, RangePartitioner)> {
    let n = target.num_partitions();
    if n == 0 {
        if filter || rows.count() == 0 {
            return Ok((RowCollection::empty(), target.clone()));
        }
        return Err(Error::InvalidPartitioner(format!(
            "cannot route {} rows into a partitioner without bounds",
            rows.count()
        )));
    }
    debug!(
        "shuffle: {} -> {} partitions (filter: {})",
        rows.num_partitions(),
        n,
        filter
    );

    let pk_len = target.key_len();
    let bounds = Broadcast::new(target.clone());
    let shuffled = rows.shuffle_to(runner, codec, n, |row| {
        let key = row.key_slice(pk_len);
        if filter {
            bounds.contains(key)
        } else {
            Some(bounds.lower_bound(key).min(n - 1))
        }
    })?;
    let sorted = sort_partitions(runner, &shuffled, key_len, true)?;

    if filter {
        return Ok((sorted, target.clone()));
    }
    let widened = bounds.updated(|p| {
        let mut p = p.clone();
        for (i, part) in sorted.partitions().enumerate() {
            if let (Some(first), Some(last)) = (part.first(), part.last()) {
                p.widen(i, &first.key(key_len), &last.key(key_len));
            }
        }
        p
    });
    debug!("shuffle bounds at version {}", widened.version());
    Ok((sorted, RangePartitioner::clone(&widened)))
}

/// Sorts every partition by the first `key_len` fields. The unstable sort
/// does not keep the arrival order of rows with equal keys.
pub fn sort_partitions(
    runner: &TaskRunner,
    rows: &RowCollection,
    key_len: usize,
    stable: bool,
) -> Result<RowCollection> {
    let ord = KeyOrdering::new(key_len);
    rows.map_partitions(runner, |_, part| {
        let mut part = part.to_vec();
        if stable {
            part.sort_by(|a, b| ord.compare_rows(a, b));
        } else {
            part.sort_unstable_by(|a, b| ord.compare_rows(a, b));
        }
        Ok(part)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::schema::{Field, RowSchema};
    use crate::value::DataType;
    use crate::{key, row};

    fn schema() -> Arc<RowSchema> {
        Arc::new(
            RowSchema::new(
                vec![
                    Field::new("chrom", DataType::String),
                    Field::new("pos", DataType::Int32),
                    Field::new("id", DataType::String),
                ],
                2,
            )
            .unwrap(),
        )
    }

    fn source() -> (RowCollection, RangePartitioner) {
        let rows = RowCollection::new(vec![
            vec![row!["chr1", 1, "a"], row!["chr1", 5, "b"]],
            vec![row!["chr1", 9, "c"], row!["chr2", 3, "d"]],
            vec![row!["chr3", 1, "e"]],
        ]);
        let p = RangePartitioner::new(
            schema().key_type(),
            vec![
                Interval::closed(key!["chr1", 1], key!["chr1", 5]),
                Interval::closed(key!["chr1", 9], key!["chr2", 3]),
                Interval::closed(key!["chr3", 1], key!["chr3", 1]),
            ],
        )
        .unwrap();
        (rows, p)
    }

    #[test]
    fn test_local_repartition_by_chromosome() {
        let (rows, p) = source();
        let target = RangePartitioner::new(
            schema().key_type().prefix(1),
            vec![
                Interval::point(key!["chr1"]),
                Interval::point(key!["chr2"]),
                Interval::point(key!["chr3"]),
            ],
        )
        .unwrap();
        let out = local_repartition(&TaskRunner::sequential(), &rows, &p, &target).unwrap();
        assert_eq!(out.count_per_partition(), vec![3, 1, 1]);
        assert_eq!(
            out.partition(0),
            &[row!["chr1", 1, "a"], row!["chr1", 5, "b"], row!["chr1", 9, "c"]]
        );
    }

    #[test]
    fn test_local_repartition_rejects_longer_key() {
        let (rows, p) = source();
        let coarse = p.coarsen(1).strictify();
        let coarse_rows = local_repartition(&TaskRunner::sequential(), &rows, &p, &coarse).unwrap();
        let res = local_repartition(&TaskRunner::sequential(), &coarse_rows, &coarse, &p);
        assert!(matches!(res, Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_shuffle_sorts_and_widens() {
        let (rows, _) = source();
        let codec = RowCodec::new(schema());
        let target = RangePartitioner::new(
            schema().key_type().prefix(1),
            vec![Interval::half_open(key!["chr1"], key!["chr2"])],
        )
        .unwrap();
        let runner = TaskRunner::parallel(Some(2)).unwrap();

        let (out, widened) = shuffle_repartition(&runner, &codec, &rows, &target, 2, false).unwrap();
        assert_eq!(out.count(), 5);
        assert!(KeyOrdering::new(2).is_sorted(out.partition(0)));
        assert_eq!(widened.range_bounds()[0], Interval::closed(key!["chr1"], key!["chr3"]));

        let (filtered, same) = shuffle_repartition(&runner, &codec, &rows, &target, 2, true).unwrap();
        assert_eq!(filtered.count(), 3);
        assert_eq!(same, target);
    }
}
