//! Key intervals with prefix endpoints.
//!
//! An endpoint is a (possibly partial) key plus a sign. A partial key with
//! sign `-1` sits just below every key extending it, sign `+1` just above.
//! Row keys are compared as endpoints with sign `0`. This lets a bound over a
//! short partition key be compared against full row keys directly.

use crate::row::Key;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A borrowed interval endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub point: &'a [Value],
    pub sign: i8,
}

impl<'a> Endpoint<'a> {
    #[inline]
    pub fn new(point: &'a [Value], sign: i8) -> Self {
        Self { point, sign }
    }

    /// A row key, positioned exactly at its value.
    #[inline]
    pub fn key(point: &'a [Value]) -> Self {
        Self { point, sign: 0 }
    }
}

impl PartialEq for Endpoint<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Endpoint<'_> {}

impl PartialOrd for Endpoint<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Endpoint<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let n = self.point.len().min(other.point.len());
        match self.point[..n].cmp(&other.point[..n]) {
            Ordering::Equal => {}
            c => return c,
        }
        match self.point.len().cmp(&other.point.len()) {
            Ordering::Equal => self.sign.cmp(&other.sign),
            // `self` is a strict prefix of `other`.
            Ordering::Less => {
                if self.sign > 0 {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            Ordering::Greater => {
                if other.sign > 0 {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
        }
    }
}

/// A key range with independently inclusive or exclusive endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: Key,
    pub end: Key,
    pub includes_start: bool,
    pub includes_end: bool,
}

impl Interval {
    pub fn new(start: Key, end: Key, includes_start: bool, includes_end: bool) -> Self {
        Self {
            start,
            end,
            includes_start,
            includes_end,
        }
    }

    /// `[start, end]`
    pub fn closed(start: Key, end: Key) -> Self {
        Self::new(start, end, true, true)
    }

    /// `[start, end)`
    pub fn half_open(start: Key, end: Key) -> Self {
        Self::new(start, end, true, false)
    }

    /// `[key, key]`
    pub fn point(key: Key) -> Self {
        Self::closed(key.clone(), key)
    }

    #[inline]
    pub fn left(&self) -> Endpoint<'_> {
        Endpoint::new(self.start.values(), if self.includes_start { -1 } else { 1 })
    }

    #[inline]
    pub fn right(&self) -> Endpoint<'_> {
        Endpoint::new(self.end.values(), if self.includes_end { 1 } else { -1 })
    }

    pub fn is_empty(&self) -> bool {
        self.left() >= self.right()
    }

    pub fn contains(&self, key: &[Value]) -> bool {
        let k = Endpoint::key(key);
        self.left() < k && k < self.right()
    }

    /// Every key of the interval is strictly below `key`.
    #[inline]
    pub fn is_below(&self, key: &[Value]) -> bool {
        self.right() < Endpoint::key(key)
    }

    /// Every key of the interval is strictly above `key`.
    #[inline]
    pub fn is_above(&self, key: &[Value]) -> bool {
        self.left() > Endpoint::key(key)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.left() < other.right() && other.left() < self.right()
    }

    pub fn contains_interval(&self, other: &Interval) -> bool {
        self.left() <= other.left() && other.right() <= self.right()
    }

    /// The smallest interval containing both.
    pub fn hull(&self, other: &Interval) -> Interval {
        let (start, includes_start) = if self.left() <= other.left() {
            (self.start.clone(), self.includes_start)
        } else {
            (other.start.clone(), other.includes_start)
        };
        let (end, includes_end) = if self.right() >= other.right() {
            (self.end.clone(), self.includes_end)
        } else {
            (other.end.clone(), other.includes_end)
        };
        Interval::new(start, end, includes_start, includes_end)
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let (start, includes_start) = if self.left() >= other.left() {
            (self.start.clone(), self.includes_start)
        } else {
            (other.start.clone(), other.includes_start)
        };
        let (end, includes_end) = if self.right() <= other.right() {
            (self.end.clone(), self.includes_end)
        } else {
            (other.end.clone(), other.includes_end)
        };
        let i = Interval::new(start, end, includes_start, includes_end);
        (!i.is_empty()).then_some(i)
    }

    /// Projects the interval onto the first `len` key fields. Truncated
    /// endpoints become inclusive, so the result contains the original.
    pub fn coarsen(&self, len: usize) -> Interval {
        let (start, includes_start) = if self.start.len() > len {
            (self.start.truncate(len), true)
        } else {
            (self.start.clone(), self.includes_start)
        };
        let (end, includes_end) = if self.end.len() > len {
            (self.end.truncate(len), true)
        } else {
            (self.end.clone(), self.includes_end)
        };
        Interval::new(start, end, includes_start, includes_end)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}-{}{}",
            if self.includes_start { "[" } else { "(" },
            self.start,
            self.end,
            if self.includes_end { "]" } else { ")" }
        )
    }
}

/// A sorted list of disjoint intervals supporting logarithmic membership tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Drops empty intervals, sorts the rest and merges overlapping ones.
    pub fn new(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut sorted: Vec<Interval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
        sorted.sort_by(|a, b| a.left().cmp(&b.left()));
        let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
        for interval in sorted {
            match merged.last_mut() {
                Some(last) if last.overlaps(&interval) => *last = last.hull(&interval),
                _ => merged.push(interval),
            }
        }
        Self { intervals: merged }
    }

    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, key: &[Value]) -> bool {
        let i = self.intervals.partition_point(|iv| iv.is_below(key));
        self.intervals.get(i).is_some_and(|iv| iv.contains(key))
    }

    pub fn overlaps(&self, interval: &Interval) -> bool {
        let i = self
            .intervals
            .partition_point(|iv| iv.right() <= interval.left());
        self.intervals.get(i).is_some_and(|iv| iv.overlaps(interval))
    }

    /// Whether some member interval contains all of `interval`.
    pub fn covers(&self, interval: &Interval) -> bool {
        let i = self
            .intervals
            .partition_point(|iv| iv.right() <= interval.left());
        self.intervals
            .get(i)
            .is_some_and(|iv| iv.contains_interval(interval))
    }
}
