//! Single-pass partition statistics used to choose a coercion strategy.

use crate::row::{Key, KeyOrdering, Row};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// How ordered a partition is. Variants are declared worst first so the
/// global classification of a dataset is the minimum over its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sortedness {
    Unsorted,
    /// Sorted on the partition key prefix only.
    TSorted,
    /// Sorted on the full key.
    KSorted,
}

impl fmt::Display for Sortedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sortedness::Unsorted => "UNSORTED",
            Sortedness::TSorted => "TSORTED",
            Sortedness::KSorted => "KSORTED",
        })
    }
}

/// Number of keys sampled from each of `num_partitions` partitions.
pub fn samples_per_partition(num_partitions: usize, per_partition: usize, max_total: usize) -> usize {
    if num_partitions == 0 {
        return 0;
    }
    num_partitions.saturating_mul(per_partition).min(max_total) / num_partitions
}

/// Deterministic sampling seed for one partition.
#[inline]
pub fn partition_seed(seed: u64, partition_index: usize) -> u64 {
    seed ^ (partition_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Summary of one partition: key range, sortedness and a key sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition_index: usize,
    pub size: usize,
    pub min: Option<Key>,
    pub max: Option<Key>,
    pub samples: Vec<Key>,
    pub sortedness: Sortedness,
    /// First out-of-order pair, for diagnostics.
    pub context: Option<String>,
}

impl PartitionInfo {
    /// Scans `rows` once. Keys are the first `key_len` fields; TSORTED is
    /// judged on the first `partition_key_len` fields.
    pub fn compute(
        partition_index: usize,
        rows: &[Row],
        key_len: usize,
        partition_key_len: usize,
        sample_size: usize,
        seed: u64,
    ) -> Self {
        let full = KeyOrdering::new(key_len);
        let partial = KeyOrdering::new(partition_key_len);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut samples: Vec<Key> = Vec::with_capacity(sample_size.min(rows.len()));
        let mut sortedness = Sortedness::KSorted;
        let mut context = None;
        let mut min: Option<&Row> = None;
        let mut max: Option<&Row> = None;

        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                let prev = &rows[i - 1];
                if sortedness > Sortedness::Unsorted
                    && full.compare_rows(prev, row) == Ordering::Greater
                {
                    let next = if partial.compare_rows(prev, row) == Ordering::Greater {
                        Sortedness::Unsorted
                    } else {
                        Sortedness::TSorted
                    };
                    if next < sortedness {
                        if context.is_none() {
                            context = Some(format!(
                                "out-of-order keys at row {}: {} followed by {}",
                                i,
                                prev.key(key_len),
                                row.key(key_len)
                            ));
                        }
                        sortedness = next;
                    }
                }
            }

            if min.map_or(true, |m| full.compare_rows(row, m) == Ordering::Less) {
                min = Some(row);
            }
            if max.map_or(true, |m| full.compare_rows(row, m) == Ordering::Greater) {
                max = Some(row);
            }

            if sample_size > 0 {
                if samples.len() < sample_size {
                    samples.push(row.key(key_len));
                } else {
                    let j = rng.random_range(0..=i);
                    if j < sample_size {
                        samples[j] = row.key(key_len);
                    }
                }
            }
        }

        Self {
            partition_index,
            size: rows.len(),
            min: min.map(|r| r.key(key_len)),
            max: max.map(|r| r.key(key_len)),
            samples,
            sortedness,
            context,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The closed interval `[min, max]`, absent for empty partitions.
    pub fn interval(&self) -> Option<crate::Interval> {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => Some(crate::Interval::closed(min.clone(), max.clone())),
            _ => None,
        }
    }
}

/// Worst classification across partitions; empty input counts as KSORTED.
pub fn global_sortedness<'a>(infos: impl IntoIterator<Item = &'a PartitionInfo>) -> Sortedness {
    infos
        .into_iter()
        .map(|i| i.sortedness)
        .min()
        .unwrap_or(Sortedness::KSorted)
}
