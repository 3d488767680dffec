//! In-process execution substrate.
//!
//! [`RowCollection`] provides the partitioned-collection primitive the rest
//! of the crate is written against: partition-wise map, filter, zip, keyed
//! shuffle and collect. Every partition runs as one sequential task on the
//! [`TaskRunner`]; tasks share nothing but read-only [`Broadcast`] values.

use crate::arena::TaskContext;
use crate::codec::{EncodedRow, RowCodec};
use crate::row::Row;
use crate::{Error, Result};
use bytes::Bytes;
use rayon::prelude::*;
use std::ops::Deref;
use std::sync::Arc;

/// A read-only value replicated to every task. Updates produce a new
/// version and never touch the value other tasks hold.
#[derive(Debug)]
pub struct Broadcast<T> {
    value: Arc<T>,
    version: u64,
}

impl<T> Broadcast<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
            version: 0,
        }
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// A new version derived from the current value.
    pub fn updated(&self, f: impl FnOnce(&T) -> T) -> Broadcast<T> {
        Broadcast {
            value: Arc::new(f(&self.value)),
            version: self.version + 1,
        }
    }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            version: self.version,
        }
    }
}

impl<T> Deref for Broadcast<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Runs one task per partition, either on a rayon pool or inline.
#[derive(Debug, Clone, Default)]
pub struct TaskRunner {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl TaskRunner {
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// A pool with `threads` workers, or rayon's default when `None`.
    pub fn parallel(threads: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("rvd-task-{}", i));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build task pool: {}", e)))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Runs `f` once per input with a fresh [`TaskContext`]. Results keep
    /// input order; the first failing task fails the whole run.
    pub fn run<T, R, F>(&self, inputs: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(&mut TaskContext, T) -> Result<R> + Sync + Send,
    {
        let task = |(i, input): (usize, T)| {
            let mut ctx = TaskContext::new(i);
            f(&mut ctx, input)
        };
        match &self.pool {
            None => inputs.into_iter().enumerate().map(task).collect(),
            Some(pool) => pool.install(|| inputs.into_par_iter().enumerate().map(task).collect()),
        }
    }
}

/// Partitioned rows held in memory. Partitions are shared, so reordering or
/// subsetting partitions never copies rows.
#[derive(Debug, Clone, Default)]
pub struct RowCollection {
    partitions: Vec<Arc<Vec<Row>>>,
}

impl RowCollection {
    pub fn new(partitions: Vec<Vec<Row>>) -> Self {
        Self {
            partitions: partitions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_shared(partitions: Vec<Arc<Vec<Row>>>) -> Self {
        Self { partitions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    #[inline]
    pub fn partition(&self, index: usize) -> &[Row] {
        &self.partitions[index]
    }

    #[inline]
    pub fn shared_partition(&self, index: usize) -> Arc<Vec<Row>> {
        Arc::clone(&self.partitions[index])
    }

    pub fn partitions(&self) -> impl Iterator<Item = &[Row]> {
        self.partitions.iter().map(|p| p.as_slice())
    }

    /// A collection made of the partitions at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> RowCollection {
        RowCollection {
            partitions: indices.iter().map(|&i| Arc::clone(&self.partitions[i])).collect(),
        }
    }

    pub fn map_partitions<F>(&self, runner: &TaskRunner, f: F) -> Result<RowCollection>
    where
        F: Fn(&mut TaskContext, &[Row]) -> Result<Vec<Row>> + Sync + Send,
    {
        Ok(RowCollection::new(self.run_partitions(runner, f)?))
    }

    /// Runs `f` on every partition and returns the per-partition results.
    pub fn run_partitions<R, F>(&self, runner: &TaskRunner, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&mut TaskContext, &[Row]) -> Result<R> + Sync + Send,
    {
        runner.run(self.partitions.clone(), |ctx, part| f(ctx, &part))
    }

    pub fn filter<P>(&self, runner: &TaskRunner, pred: P) -> Result<RowCollection>
    where
        P: Fn(&Row) -> bool + Sync + Send,
    {
        self.map_partitions(runner, |_, rows| {
            Ok(rows.iter().filter(|r| pred(r)).cloned().collect())
        })
    }

    /// Runs `f` on partition pairs with the same index.
    pub fn zip_partitions<R, F>(&self, other: &RowCollection, runner: &TaskRunner, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&mut TaskContext, &[Row], &[Row]) -> Result<R> + Sync + Send,
    {
        if self.num_partitions() != other.num_partitions() {
            return Err(Error::InvalidArgument(format!(
                "cannot zip {} partitions with {}",
                self.num_partitions(),
                other.num_partitions()
            )));
        }
        let pairs: Vec<_> = self
            .partitions
            .iter()
            .cloned()
            .zip(other.partitions.iter().cloned())
            .collect();
        runner.run(pairs, |ctx, (l, r)| f(ctx, &l, &r))
    }

    /// Sends every row to the partition chosen by `route`, dropping rows it
    /// routes nowhere. Rows cross the shuffle encoded. Each destination
    /// receives its rows grouped by source partition, in source order.
    pub fn shuffle_to<F>(
        &self,
        runner: &TaskRunner,
        codec: &RowCodec,
        num_targets: usize,
        route: F,
    ) -> Result<RowCollection>
    where
        F: Fn(&Row) -> Option<usize> + Sync + Send,
    {
        let sent: Vec<Vec<Vec<EncodedRow>>> = self.run_partitions(runner, |ctx, rows| {
            // One contiguous buffer per destination; rows are sliced out of it at the end.
            let mut buffers: Vec<(Vec<u8>, Vec<usize>)> = vec![(Vec::new(), Vec::new()); num_targets];
            for row in rows {
                let Some(target) = route(row) else { continue };
                if target >= num_targets {
                    return Err(Error::InvalidArgument(format!(
                        "row {} routed to partition {} of {}",
                        row, target, num_targets
                    )));
                }
                let region = ctx.region();
                region.reset();
                codec.encode_into(row, region.scratch())?;
                let (buf, ends) = &mut buffers[target];
                buf.extend_from_slice(region.scratch());
                ends.push(buf.len());
            }
            Ok(buffers
                .into_iter()
                .map(|(buf, ends)| {
                    let bytes = Bytes::from(buf);
                    let mut start = 0;
                    ends.into_iter()
                        .map(|end| {
                            let row = EncodedRow::from(bytes.slice(start..end));
                            start = end;
                            row
                        })
                        .collect()
                })
                .collect())
        })?;

        let mut received: Vec<Vec<EncodedRow>> = vec![Vec::new(); num_targets];
        for buckets in sent {
            for (target, bucket) in buckets.into_iter().enumerate() {
                received[target].extend(bucket);
            }
        }

        let decoded = runner.run(received, |_, encoded| {
            encoded
                .iter()
                .map(|e| codec.decode(e.as_bytes()))
                .collect::<Result<Vec<Row>>>()
        })?;
        Ok(RowCollection::new(decoded))
    }

    pub fn count_per_partition(&self) -> Vec<usize> {
        self.partitions.iter().map(|p| p.len()).collect()
    }

    pub fn count(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    pub fn collect(&self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.count());
        for p in &self.partitions {
            rows.extend(p.iter().cloned());
        }
        rows
    }
}
