//! The public dataset handle.
//!
//! An [`Rvd`] pairs a [`RowSchema`] and a [`RangePartitioner`] with the
//! partitioned rows they describe. Every partition is sorted by the full key
//! and holds only keys inside its partition bound. Values are immutable:
//! every operation returns a new `Rvd` sharing untouched partitions.

use crate::codec::RowCodec;
use crate::coercer::{self, CoercionPath};
use crate::context::RvdContext;
use crate::exec::RowCollection;
use crate::interval::{Interval, IntervalSet};
use crate::join::{self, JoinType, ZipJoined};
use crate::partitioner::RangePartitioner;
use crate::repartition::{local_repartition, shuffle_repartition};
use crate::row::{KeyOrdering, Row};
use crate::schema::RowSchema;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A coalesce produced fewer partitions than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalesceShortfall {
    pub requested: usize,
    pub achieved: usize,
}

impl fmt::Display for CoalesceShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {} partitions, coalesced to {}",
            self.requested, self.achieved
        )
    }
}

#[derive(Debug, Clone)]
pub struct CoalesceOutcome {
    pub rvd: Rvd,
    pub shortfall: Option<CoalesceShortfall>,
}

#[derive(Debug, Clone)]
pub struct Rvd {
    schema: Arc<RowSchema>,
    partitioner: Arc<RangePartitioner>,
    rows: RowCollection,
}

impl Rvd {
    /// Assembles an RVD from parts that already satisfy its invariants.
    /// Partition counts and key types are always checked; row order and
    /// bounds only when validation is on.
    pub fn new(
        ctx: &RvdContext,
        schema: Arc<RowSchema>,
        partitioner: RangePartitioner,
        rows: RowCollection,
    ) -> Result<Self> {
        partitioner.check_compatible(&schema.key_type())?;
        if partitioner.num_partitions() != rows.num_partitions() {
            return Err(Error::InvalidArgument(format!(
                "partitioner has {} bounds for {} partitions",
                partitioner.num_partitions(),
                rows.num_partitions()
            )));
        }
        let rvd = Self {
            schema,
            partitioner: Arc::new(partitioner),
            rows,
        };
        if ctx.should_validate() {
            rvd.validate(ctx)?;
        }
        Ok(rvd)
    }

    /// No partitions and no bounds.
    pub fn empty(schema: Arc<RowSchema>) -> Self {
        let partitioner = RangePartitioner::empty(schema.key_type());
        Self {
            schema,
            partitioner: Arc::new(partitioner),
            rows: RowCollection::empty(),
        }
    }

    /// Brings arbitrary partitioned rows into canonical form, partitioned on
    /// at least the first `partition_key_len` key fields.
    pub fn coerce(
        ctx: &RvdContext,
        schema: Arc<RowSchema>,
        partition_key_len: usize,
        rows: RowCollection,
    ) -> Result<Self> {
        Ok(Self::coerce_with_path(ctx, schema, partition_key_len, rows)?.0)
    }

    /// [`Rvd::coerce`], also reporting which strategy ran.
    pub fn coerce_with_path(
        ctx: &RvdContext,
        schema: Arc<RowSchema>,
        partition_key_len: usize,
        rows: RowCollection,
    ) -> Result<(Self, CoercionPath)> {
        let coerced = coercer::coerce(ctx, &schema, partition_key_len, rows, None)?;
        let rvd = Rvd::new(ctx, schema, coerced.partitioner, coerced.rows)?;
        Ok((rvd, coerced.path))
    }

    pub fn from_partitions(
        ctx: &RvdContext,
        schema: Arc<RowSchema>,
        partition_key_len: usize,
        partitions: Vec<Vec<Row>>,
    ) -> Result<Self> {
        Self::coerce(ctx, schema, partition_key_len, RowCollection::new(partitions))
    }

    /// Coerces this RVD's rows again, keeping the current partitioner when
    /// the rows still fit it.
    pub fn recoerce(&self, ctx: &RvdContext) -> Result<(Self, CoercionPath)> {
        let pk_len = self.partitioner.key_len().min(self.key_len());
        let coerced = coercer::coerce(
            ctx,
            &self.schema,
            pk_len,
            self.rows.clone(),
            Some(&self.partitioner),
        )?;
        let rvd = Rvd::new(ctx, Arc::clone(&self.schema), coerced.partitioner, coerced.rows)?;
        Ok((rvd, coerced.path))
    }

    #[inline]
    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    #[inline]
    pub fn partitioner(&self) -> &RangePartitioner {
        &self.partitioner
    }

    #[inline]
    pub fn rows(&self) -> &RowCollection {
        &self.rows
    }

    #[inline]
    pub fn key_len(&self) -> usize {
        self.schema.key_len()
    }

    #[inline]
    pub fn num_partitions(&self) -> usize {
        self.rows.num_partitions()
    }

    #[inline]
    pub fn partition(&self, index: usize) -> &[Row] {
        self.rows.partition(index)
    }

    /// Checks every invariant: bounds ordered, rows conforming to the
    /// schema, sorted by the full key and inside their partition bound.
    pub fn validate(&self, ctx: &RvdContext) -> Result<()> {
        self.partitioner.check_compatible(&self.schema.key_type())?;
        if !self.partitioner.is_ordered() {
            return Err(Error::InvalidPartitioner(format!(
                "bounds out of order: {}",
                self.partitioner
            )));
        }
        let key_len = self.key_len();
        let ord = KeyOrdering::new(key_len);
        let schema = &self.schema;
        let bounds = self.partitioner.range_bounds();
        self.rows.run_partitions(ctx.runner(), |task, part| {
            let index = task.partition_index();
            let bound = &bounds[index];
            for (n, row) in part.iter().enumerate() {
                schema.check_row(row)?;
                if n > 0 && ord.compare_rows(&part[n - 1], row) == Ordering::Greater {
                    return Err(Error::ordering(
                        index,
                        &row.key(key_len),
                        format!("follows larger key {}", part[n - 1].key(key_len)),
                    ));
                }
                if !bound.contains(row.key_slice(key_len)) {
                    return Err(Error::ordering(
                        index,
                        &row.key(key_len),
                        format!("outside partition bound {}", bound),
                    ));
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Moves the rows onto `target`, dropping rows outside its bounds. Without
    /// `shuffle`, `target` must be keyed by a prefix of the current
    /// partition key.
    pub fn repartition(&self, ctx: &RvdContext, target: RangePartitioner, shuffle: bool) -> Result<Self> {
        target.check_compatible(&self.schema.key_type())?;
        let rows = if shuffle {
            let codec = RowCodec::new(Arc::clone(&self.schema));
            shuffle_repartition(ctx.runner(), &codec, &self.rows, &target, self.key_len(), true)?.0
        } else {
            local_repartition(ctx.runner(), &self.rows, &self.partitioner, &target)?
        };
        Rvd::new(ctx, Arc::clone(&self.schema), target, rows)
    }

    fn interval_set(&self, intervals: impl IntoIterator<Item = Interval>) -> Result<IntervalSet> {
        let key_type = self.schema.key_type();
        let intervals: Vec<Interval> = intervals.into_iter().collect();
        for interval in &intervals {
            key_type.check_key(&interval.start)?;
            key_type.check_key(&interval.end)?;
        }
        Ok(IntervalSet::new(intervals))
    }

    /// Keeps the rows whose key lies in one of `intervals`. Partitions that
    /// cannot hold such a key are skipped without being read.
    pub fn filter_to_intervals(
        &self,
        ctx: &RvdContext,
        intervals: impl IntoIterator<Item = Interval>,
    ) -> Result<Self> {
        let set = self.interval_set(intervals)?;
        let (partitioner, kept) = self.partitioner.intersect(&set);
        debug!(
            "interval filter keeps {} of {} partitions",
            kept.len(),
            self.num_partitions()
        );
        let key_len = self.key_len();
        let rows = self
            .rows
            .select(&kept)
            .filter(ctx.runner(), |r| set.contains(r.key_slice(key_len)))?;
        Rvd::new(ctx, Arc::clone(&self.schema), partitioner, rows)
    }

    /// Drops the rows whose key lies in one of `intervals`, and every
    /// partition whose bound they cover entirely.
    pub fn filter_out_intervals(
        &self,
        ctx: &RvdContext,
        intervals: impl IntoIterator<Item = Interval>,
    ) -> Result<Self> {
        let set = self.interval_set(intervals)?;
        let kept: Vec<usize> = self
            .partitioner
            .range_bounds()
            .iter()
            .enumerate()
            .filter(|(_, b)| !set.covers(b))
            .map(|(i, _)| i)
            .collect();
        let partitioner = self.partitioner.subset(&kept)?;
        let key_len = self.key_len();
        let rows = self
            .rows
            .select(&kept)
            .filter(ctx.runner(), |r| !set.contains(r.key_slice(key_len)))?;
        Rvd::new(ctx, Arc::clone(&self.schema), partitioner, rows)
    }

    /// Applies a key-preserving transformation to every partition.
    pub fn map_partitions<F>(&self, ctx: &RvdContext, f: F) -> Result<Self>
    where
        F: Fn(&[Row]) -> Result<Vec<Row>> + Sync + Send,
    {
        self.map_partitions_with_schema(ctx, Arc::clone(&self.schema), f)
    }

    /// Like [`Rvd::map_partitions`] for transformations that change the
    /// value fields. The key fields must keep their types.
    pub fn map_partitions_with_schema<F>(&self, ctx: &RvdContext, schema: Arc<RowSchema>, f: F) -> Result<Self>
    where
        F: Fn(&[Row]) -> Result<Vec<Row>> + Sync + Send,
    {
        if !schema.key_type().is_isomorphic(&self.schema.key_type()) {
            return Err(Error::SchemaMismatch(format!(
                "key {} cannot change to {}",
                self.schema.key_type(),
                schema.key_type()
            )));
        }
        let rows = self.rows.map_partitions(ctx.runner(), |_, part| f(part))?;
        Rvd::new(ctx, schema, (*self.partitioner).clone(), rows)
    }

    pub fn filter<P>(&self, ctx: &RvdContext, pred: P) -> Result<Self>
    where
        P: Fn(&Row) -> bool + Sync + Send,
    {
        let rows = self.rows.filter(ctx.runner(), pred)?;
        Rvd::new(ctx, Arc::clone(&self.schema), (*self.partitioner).clone(), rows)
    }

    pub fn count_per_partition(&self) -> Vec<usize> {
        self.rows.count_per_partition()
    }

    pub fn count(&self) -> usize {
        self.rows.count()
    }

    /// All rows in key order.
    pub fn collect(&self) -> Vec<Row> {
        self.rows.collect()
    }

    /// The first `n` rows in key order.
    pub fn head(&self, ctx: &RvdContext, n: usize) -> Result<Self> {
        let mut remaining = n;
        let mut kept = Vec::new();
        let mut parts = Vec::new();
        for (i, count) in self.count_per_partition().into_iter().enumerate() {
            if remaining == 0 {
                break;
            }
            kept.push(i);
            if count <= remaining {
                parts.push(self.rows.shared_partition(i));
                remaining -= count;
            } else {
                parts.push(Arc::new(self.rows.partition(i)[..remaining].to_vec()));
                remaining = 0;
            }
        }
        let partitioner = self.partitioner.subset(&kept)?;
        Rvd::new(
            ctx,
            Arc::clone(&self.schema),
            partitioner,
            RowCollection::from_shared(parts),
        )
    }

    /// The partitions at strictly increasing `indices`.
    pub fn subset_partitions(&self, ctx: &RvdContext, indices: &[usize]) -> Result<Self> {
        let partitioner = self.partitioner.subset(indices)?;
        Rvd::new(
            ctx,
            Arc::clone(&self.schema),
            partitioner,
            self.rows.select(indices),
        )
    }

    /// Merges adjacent partitions into at most `max_partitions` of roughly
    /// equal row counts. Nothing is shuffled. When split points collapse the
    /// result has fewer partitions and carries a [`CoalesceShortfall`].
    pub fn coalesce(&self, ctx: &RvdContext, max_partitions: usize) -> Result<CoalesceOutcome> {
        if max_partitions == 0 {
            return Err(Error::InvalidArgument("cannot coalesce to zero partitions".into()));
        }
        let n = self.num_partitions();
        if n <= max_partitions {
            return Ok(CoalesceOutcome {
                rvd: self.clone(),
                shortfall: None,
            });
        }

        let mut cumulative = Vec::with_capacity(n);
        let mut total = 0;
        for count in self.count_per_partition() {
            total += count;
            cumulative.push(total);
        }
        let mut ends: Vec<usize> = Vec::with_capacity(max_partitions);
        for j in 1..max_partitions {
            let target = total * j / max_partitions;
            let end = cumulative.partition_point(|&c| c < target).min(n - 1);
            if ends.last().map_or(true, |&last| end > last) {
                ends.push(end);
            }
        }
        if ends.last() != Some(&(n - 1)) {
            ends.push(n - 1);
        }

        let shortfall = (ends.len() < max_partitions).then(|| CoalesceShortfall {
            requested: max_partitions,
            achieved: ends.len(),
        });
        if let Some(s) = &shortfall {
            warn!("coalesce shortfall: {}", s);
        }
        Ok(CoalesceOutcome {
            rvd: self.merge_partitions(ctx, &ends)?,
            shortfall,
        })
    }

    /// Merges runs of equally many adjacent partitions, ignoring row counts.
    pub fn naive_coalesce(&self, ctx: &RvdContext, max_partitions: usize) -> Result<Self> {
        if max_partitions == 0 {
            return Err(Error::InvalidArgument("cannot coalesce to zero partitions".into()));
        }
        let n = self.num_partitions();
        if n <= max_partitions {
            return Ok(self.clone());
        }
        let per = n.div_ceil(max_partitions);
        let ends: Vec<usize> = (1..=n.div_ceil(per)).map(|g| (g * per).min(n) - 1).collect();
        self.merge_partitions(ctx, &ends)
    }

    fn merge_partitions(&self, ctx: &RvdContext, ends: &[usize]) -> Result<Self> {
        let partitioner = self.partitioner.coalesce_range_bounds(ends)?;
        let mut start = 0;
        let groups: Vec<Vec<Arc<Vec<Row>>>> = ends
            .iter()
            .map(|&end| {
                let group = (start..=end).map(|i| self.rows.shared_partition(i)).collect();
                start = end + 1;
                group
            })
            .collect();
        let parts = ctx.runner().run(groups, |_, group| {
            Ok(group.iter().flat_map(|p| p.iter().cloned()).collect::<Vec<Row>>())
        })?;
        Rvd::new(ctx, Arc::clone(&self.schema), partitioner, RowCollection::new(parts))
    }

    /// Narrows the key to its first `len` fields without moving rows.
    pub fn truncate_key(&self, ctx: &RvdContext, len: usize) -> Result<Self> {
        if len == 0 || len > self.key_len() {
            return Err(Error::InvalidArgument(format!(
                "cannot truncate a {}-field key to {} fields",
                self.key_len(),
                len
            )));
        }
        let schema = Arc::new(self.schema.with_key_len(len)?);
        let partitioner = self.partitioner.coarsen(len);
        Rvd::new(ctx, schema, partitioner, self.rows.clone())
    }

    /// Relabels fields in the schema and the partitioner alike.
    pub fn rename(&self, ctx: &RvdContext, names: &HashMap<String, String>) -> Result<Self> {
        let schema = Arc::new(self.schema.rename(names)?);
        let partitioner = self.partitioner.rename(names);
        Rvd::new(ctx, schema, partitioner, self.rows.clone())
    }

    pub fn ordered_join(
        &self,
        ctx: &RvdContext,
        right: &Rvd,
        join_key_len: usize,
        join_type: JoinType,
    ) -> Result<Self> {
        join::ordered_join(ctx, self, right, join_key_len, join_type)
    }

    pub fn ordered_join_distinct(
        &self,
        ctx: &RvdContext,
        right: &Rvd,
        join_key_len: usize,
        join_type: JoinType,
    ) -> Result<Self> {
        join::ordered_join_distinct(ctx, self, right, join_key_len, join_type)
    }

    pub fn ordered_zip_join(&self, ctx: &RvdContext, right: &Rvd, join_key_len: usize) -> Result<ZipJoined> {
        join::ordered_zip_join(ctx, self, right, join_key_len)
    }
}
