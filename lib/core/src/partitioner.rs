//! Range partitioners: the authoritative mapping from keys to partitions.
//!
//! A partitioner is an ordered sequence of non-empty intervals over a
//! partition key type, one per partition. Bounds are disjoint unless the
//! partitioner was built with a non-zero `allowed_overlap`, in which case two
//! adjacent partitions may share keys that agree on the first
//! `allowed_overlap` fields of the boundary.

use crate::interval::{Interval, IntervalSet};
use crate::row::Key;
use crate::schema::KeyType;
use crate::value::Value;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePartitioner {
    key_type: KeyType,
    range_bounds: Vec<Interval>,
    allowed_overlap: usize,
}

impl RangePartitioner {
    /// Builds a partitioner with strictly disjoint bounds.
    pub fn new(key_type: KeyType, range_bounds: Vec<Interval>) -> Result<Self> {
        Self::with_overlap(key_type, range_bounds, 0)
    }

    pub fn with_overlap(
        key_type: KeyType,
        range_bounds: Vec<Interval>,
        allowed_overlap: usize,
    ) -> Result<Self> {
        if allowed_overlap > key_type.len() {
            return Err(Error::InvalidPartitioner(format!(
                "allowed overlap {} exceeds key length {}",
                allowed_overlap,
                key_type.len()
            )));
        }
        for bound in &range_bounds {
            key_type.check_key(&bound.start)?;
            key_type.check_key(&bound.end)?;
            if bound.is_empty() {
                return Err(Error::InvalidPartitioner(format!("empty range bound {}", bound)));
            }
        }
        for (i, pair) in range_bounds.windows(2).enumerate() {
            if !Self::adjacent_valid(&pair[0], &pair[1], allowed_overlap) {
                return Err(Error::InvalidPartitioner(format!(
                    "range bounds {} (partition {}) and {} (partition {}) are out of order or overlap",
                    pair[0],
                    i,
                    pair[1],
                    i + 1
                )));
            }
        }
        Ok(Self {
            key_type,
            range_bounds,
            allowed_overlap,
        })
    }

    pub fn empty(key_type: KeyType) -> Self {
        Self {
            key_type,
            range_bounds: Vec::new(),
            allowed_overlap: 0,
        }
    }

    fn adjacent_valid(left: &Interval, right: &Interval, allowed_overlap: usize) -> bool {
        if allowed_overlap == 0 {
            return left.right() <= right.left();
        }
        left.left() <= right.left()
            && left.end.truncate(allowed_overlap) <= right.start.truncate(allowed_overlap)
    }

    /// Whether `bounds` would form a disjoint partitioner in their current order.
    pub fn is_valid_disjoint(bounds: &[Interval]) -> bool {
        bounds.iter().all(|b| !b.is_empty())
            && bounds.windows(2).all(|w| w[0].right() <= w[1].left())
    }

    /// Builds a disjoint partitioner over the first `partition_key_len` fields
    /// of `key_type` from arbitrary, possibly overlapping bounds. Bounds are
    /// coarsened to the partition key, sorted, and overlapping bounds are
    /// merged into their hull.
    pub fn generate(
        key_type: &KeyType,
        partition_key_len: usize,
        bounds: impl IntoIterator<Item = Interval>,
    ) -> Result<Self> {
        if partition_key_len > key_type.len() {
            return Err(Error::SchemaMismatch(format!(
                "partition key length {} exceeds key type {}",
                partition_key_len, key_type
            )));
        }
        let merged = IntervalSet::new(bounds.into_iter().map(|b| b.coarsen(partition_key_len)));
        Self::new(key_type.prefix(partition_key_len), merged.intervals().to_vec())
    }

    #[inline]
    pub fn key_type(&self) -> &KeyType {
        &self.key_type
    }

    #[inline]
    pub fn key_len(&self) -> usize {
        self.key_type.len()
    }

    #[inline]
    pub fn num_partitions(&self) -> usize {
        self.range_bounds.len()
    }

    #[inline]
    pub fn range_bounds(&self) -> &[Interval] {
        &self.range_bounds
    }

    #[inline]
    pub fn allowed_overlap(&self) -> usize {
        self.allowed_overlap
    }

    #[inline]
    pub fn is_strict(&self) -> bool {
        self.allowed_overlap == 0
    }

    /// Fails with `SchemaMismatch` unless this partitioner's key type is
    /// isomorphic to the leading fields of `dataset_key`.
    pub fn check_compatible(&self, dataset_key: &KeyType) -> Result<()> {
        if self.key_type.is_prefix_of(dataset_key) {
            Ok(())
        } else {
            Err(Error::SchemaMismatch(format!(
                "partitioner key type {} is not isomorphic to a prefix of {}",
                self.key_type, dataset_key
            )))
        }
    }

    /// The hull of all bounds.
    pub fn range(&self) -> Option<Interval> {
        let first = self.range_bounds.first()?;
        Some(self.range_bounds[1..].iter().fold(first.clone(), |acc, b| acc.hull(b)))
    }

    /// The first partition whose bound contains `key`.
    pub fn contains(&self, key: &[Value]) -> Option<usize> {
        // Right endpoints are only monotone for disjoint bounds.
        let start = if self.is_strict() { self.lower_bound(key) } else { 0 };
        self.range_bounds[start..]
            .iter()
            .take_while(|b| !b.is_above(key))
            .position(|b| b.contains(key))
            .map(|i| start + i)
    }

    /// Index of the first partition not entirely below `key`.
    pub fn lower_bound(&self, key: &[Value]) -> usize {
        self.range_bounds.partition_point(|b| b.is_below(key))
    }

    /// Index of the first partition entirely above `key`.
    pub fn upper_bound(&self, key: &[Value]) -> usize {
        self.range_bounds.partition_point(|b| !b.is_above(key))
    }

    /// Partitions whose bounds may contain `key`.
    pub fn partition_range(&self, key: &[Value]) -> Range<usize> {
        self.lower_bound(key)..self.upper_bound(key)
    }

    /// Partitions whose bounds overlap `interval`.
    pub fn query_interval(&self, interval: &Interval) -> Range<usize> {
        let start = self
            .range_bounds
            .partition_point(|b| b.right() <= interval.left());
        let end = self
            .range_bounds
            .partition_point(|b| b.left() < interval.right());
        let range = start..end.max(start);
        let first = range.clone().find(|&i| self.range_bounds[i].overlaps(interval));
        match first {
            Some(s) => s..range.end,
            None => range.end..range.end,
        }
    }

    pub fn overlaps(&self, interval: &Interval) -> bool {
        !self.overlapping(interval).is_empty()
    }

    /// Indices of every partition whose bound overlaps `interval`, also for
    /// partitioners with overlapping bounds.
    pub fn overlapping(&self, interval: &Interval) -> Vec<usize> {
        if self.is_strict() {
            return self.query_interval(interval).collect();
        }
        let end = self
            .range_bounds
            .partition_point(|b| b.left() < interval.right());
        (0..end)
            .filter(|&i| self.range_bounds[i].overlaps(interval))
            .collect()
    }

    /// Projects every bound onto the first `len` key fields. The result may
    /// overlap on shared boundary keys.
    pub fn coarsen(&self, len: usize) -> RangePartitioner {
        if len >= self.key_len() {
            return self.clone();
        }
        let allowed_overlap = if self.allowed_overlap == 0 {
            len
        } else {
            self.allowed_overlap.min(len)
        };
        RangePartitioner {
            key_type: self.key_type.prefix(len),
            range_bounds: self.range_bounds.iter().map(|b| b.coarsen(len)).collect(),
            allowed_overlap,
        }
    }

    /// Relabels key fields without changing any bound.
    pub fn rename(&self, names: &HashMap<String, String>) -> RangePartitioner {
        RangePartitioner {
            key_type: self.key_type.rename(names),
            range_bounds: self.range_bounds.clone(),
            allowed_overlap: self.allowed_overlap,
        }
    }

    /// Trims overlapping bounds into strictly disjoint ones. A bound that lies
    /// entirely inside its predecessor is dropped, so the result may have
    /// fewer partitions.
    pub fn strictify(&self) -> RangePartitioner {
        if self.is_strict() {
            return self.clone();
        }
        let mut bounds: Vec<Interval> = Vec::with_capacity(self.range_bounds.len());
        for bound in &self.range_bounds {
            let trimmed = match bounds.last() {
                Some(prev) if bound.left() < prev.right() => Interval::new(
                    prev.end.clone(),
                    bound.end.clone(),
                    !prev.includes_end,
                    bound.includes_end,
                ),
                _ => bound.clone(),
            };
            if !trimmed.is_empty() {
                bounds.push(trimmed);
            }
        }
        RangePartitioner {
            key_type: self.key_type.clone(),
            range_bounds: bounds,
            allowed_overlap: 0,
        }
    }

    /// Merges runs of adjacent partitions. `new_part_end[j]` is the last old
    /// partition index folded into new partition `j`; it must be strictly
    /// increasing and end at `num_partitions() - 1`.
    pub fn coalesce_range_bounds(&self, new_part_end: &[usize]) -> Result<RangePartitioner> {
        let valid = new_part_end.windows(2).all(|w| w[0] < w[1])
            && new_part_end.last().map_or(self.range_bounds.is_empty(), |&e| {
                e + 1 == self.range_bounds.len()
            });
        if !valid {
            return Err(Error::InvalidArgument(format!(
                "invalid partition ends {:?} for {} partitions",
                new_part_end,
                self.num_partitions()
            )));
        }
        let mut start = 0;
        let bounds = new_part_end
            .iter()
            .map(|&end| {
                let hull = self.range_bounds[start + 1..=end]
                    .iter()
                    .fold(self.range_bounds[start].clone(), |acc, b| acc.hull(b));
                start = end + 1;
                hull
            })
            .collect();
        RangePartitioner::with_overlap(self.key_type.clone(), bounds, self.allowed_overlap)
    }

    /// Keeps only the partitions at `indices`, which must be strictly increasing.
    pub fn subset(&self, indices: &[usize]) -> Result<RangePartitioner> {
        if indices.windows(2).any(|w| w[0] >= w[1])
            || indices.last().is_some_and(|&i| i >= self.num_partitions())
        {
            return Err(Error::InvalidArgument(format!(
                "partition subset {:?} is not increasing within 0..{}",
                indices,
                self.num_partitions()
            )));
        }
        Ok(RangePartitioner {
            key_type: self.key_type.clone(),
            range_bounds: indices.iter().map(|&i| self.range_bounds[i].clone()).collect(),
            allowed_overlap: self.allowed_overlap,
        })
    }

    /// Replaces bound `index` with its hull with `[min, max]`.
    pub(crate) fn widen(&mut self, index: usize, min: &Key, max: &Key) {
        let observed = Interval::closed(min.truncate(self.key_len()), max.truncate(self.key_len()));
        self.range_bounds[index] = self.range_bounds[index].hull(&observed);
    }

    /// Whether every bound is strictly ordered after the previous one.
    pub fn is_ordered(&self) -> bool {
        self.range_bounds
            .windows(2)
            .all(|w| Self::adjacent_valid(&w[0], &w[1], self.allowed_overlap))
    }

    /// Stretches the first and last bounds so the hull covers `interval`.
    pub fn extend_to_cover(&self, interval: &Interval) -> Result<RangePartitioner> {
        let n = self.range_bounds.len();
        if n == 0 {
            return Err(Error::InvalidPartitioner(
                "cannot extend a partitioner without bounds".into(),
            ));
        }
        self.key_type.check_key(&interval.start)?;
        self.key_type.check_key(&interval.end)?;
        let mut bounds = self.range_bounds.clone();
        if interval.left() < bounds[0].left() {
            bounds[0].start = interval.start.clone();
            bounds[0].includes_start = interval.includes_start;
        }
        if interval.right() > bounds[n - 1].right() {
            bounds[n - 1].end = interval.end.clone();
            bounds[n - 1].includes_end = interval.includes_end;
        }
        RangePartitioner::with_overlap(self.key_type.clone(), bounds, self.allowed_overlap)
    }

    /// Clips every bound to the parts covered by `intervals`. Bounds that
    /// become empty are dropped, together with their partitions; the kept
    /// indices are returned alongside.
    pub fn intersect(&self, intervals: &IntervalSet) -> (RangePartitioner, Vec<usize>) {
        let mut kept = Vec::new();
        let mut bounds = Vec::new();
        for (i, bound) in self.range_bounds.iter().enumerate() {
            let clipped = intervals
                .intervals()
                .iter()
                .filter_map(|iv| bound.intersect(iv))
                .reduce(|acc, iv| acc.hull(&iv))
                .map(|iv| iv.coarsen(self.key_len()));
            if let Some(b) = clipped {
                kept.push(i);
                bounds.push(b);
            }
        }
        let partitioner = RangePartitioner {
            key_type: self.key_type.clone(),
            range_bounds: bounds,
            allowed_overlap: self.allowed_overlap,
        };
        (partitioner, kept)
    }
}

impl fmt::Display for RangePartitioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangePartitioner {} [", self.key_type)?;
        for (i, b) in self.range_bounds.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", b)?;
        }
        f.write_str("]")
    }
}
