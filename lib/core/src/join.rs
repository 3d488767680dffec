//! Order-preserving joins on a shared key prefix.
//!
//! Both sides are first re-sliced onto one common partitioner without a
//! shuffle; each partition pair is then merged by a sequential task. Within
//! a run of equal keys the left side drives iteration and right rows follow
//! in arrival order.

use crate::context::RvdContext;
use crate::exec::RowCollection;
use crate::partitioner::RangePartitioner;
use crate::repartition::local_repartition;
use crate::row::{Key, KeyOrdering, Row};
use crate::rvd::Rvd;
use crate::schema::{KeyType, RowSchema};
use crate::value::Value;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinType {
    #[inline]
    fn keeps_left(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Outer)
    }

    #[inline]
    fn keeps_right(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Outer)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Outer => "outer",
        })
    }
}

/// One record of a zip join: the key and whichever sides carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipRow {
    pub key: Key,
    pub left: Option<Row>,
    pub right: Option<Row>,
}

/// Zip join output, partitioned like the aligned inputs.
#[derive(Debug, Clone)]
pub struct ZipJoined {
    key_type: KeyType,
    partitioner: RangePartitioner,
    partitions: Vec<Vec<ZipRow>>,
}

impl ZipJoined {
    pub fn key_type(&self) -> &KeyType {
        &self.key_type
    }

    pub fn partitioner(&self) -> &RangePartitioner {
        &self.partitioner
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition(&self, index: usize) -> &[ZipRow] {
        &self.partitions[index]
    }

    pub fn count(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    pub fn collect(&self) -> Vec<ZipRow> {
        self.partitions.iter().flatten().cloned().collect()
    }
}

/// Output layout of a row join: the join key fields, then the remaining left
/// fields, then the remaining right fields. The result is keyed by the join key.
pub fn join_schema(left: &RowSchema, right: &RowSchema, join_key_len: usize) -> Result<RowSchema> {
    let mut fields = left.fields().to_vec();
    fields.extend(right.fields()[join_key_len..].iter().cloned());
    RowSchema::new(fields, join_key_len)
}

fn check_join_key(left: &Rvd, right: &Rvd, join_key_len: usize) -> Result<KeyType> {
    if join_key_len == 0 {
        return Err(Error::InvalidArgument("join key must have at least one field".into()));
    }
    if join_key_len > left.key_len() || join_key_len > right.key_len() {
        return Err(Error::SchemaMismatch(format!(
            "join key length {} exceeds key of {} or {}",
            join_key_len,
            left.schema().key_type(),
            right.schema().key_type()
        )));
    }
    let key_type = left.schema().key_type().prefix(join_key_len);
    if !key_type.is_isomorphic(&right.schema().key_type().prefix(join_key_len)) {
        return Err(Error::SchemaMismatch(format!(
            "join keys {} and {} differ",
            key_type,
            right.schema().key_type().prefix(join_key_len)
        )));
    }
    Ok(key_type)
}

/// Re-slices both sides onto a disjoint partitioner covering both, over the
/// longest prefix of the join key both partitioners can be coarsened to.
fn align(
    ctx: &RvdContext,
    left: &Rvd,
    right: &Rvd,
    key_type: &KeyType,
) -> Result<(RangePartitioner, RowCollection, RowCollection)> {
    let len = key_type
        .len()
        .min(left.partitioner().key_len())
        .min(right.partitioner().key_len());
    let bounds = left
        .partitioner()
        .coarsen(len)
        .range_bounds()
        .iter()
        .chain(right.partitioner().coarsen(len).range_bounds())
        .cloned()
        .collect::<Vec<_>>();
    let common = RangePartitioner::generate(key_type, len, bounds)?;
    debug!(
        "aligning {} and {} partitions onto {}",
        left.num_partitions(),
        right.num_partitions(),
        common.num_partitions()
    );
    let l = local_repartition(ctx.runner(), left.rows(), left.partitioner(), &common)?;
    let r = local_repartition(ctx.runner(), right.rows(), right.partitioner(), &common)?;
    Ok((common, l, r))
}

fn joined_row(key: &[Value], left: Option<&Row>, left_len: usize, right: Option<&Row>, right_len: usize) -> Row {
    let j = key.len();
    let mut values = Vec::with_capacity(left_len + right_len - j);
    values.extend_from_slice(key);
    match left {
        Some(l) => values.extend_from_slice(&l.values()[j..]),
        None => values.resize(left_len, Value::Null),
    }
    match right {
        Some(r) => values.extend_from_slice(&r.values()[j..]),
        None => values.resize(left_len + right_len - j, Value::Null),
    }
    Row::new(values)
}

/// End of the run of rows equal to `rows[start]` on the join key.
fn run_end(ord: KeyOrdering, rows: &[Row], start: usize) -> usize {
    let first = &rows[start];
    start + rows[start..]
        .iter()
        .take_while(|r| ord.compare_rows(first, r) == Ordering::Equal)
        .count()
}

/// Sort-merge join of two partitions sorted on the first `join_key_len`
/// fields. Equal keys produce the full cross product, left-major.
pub fn merge_join(
    left: &[Row],
    right: &[Row],
    join_key_len: usize,
    left_len: usize,
    right_len: usize,
    join_type: JoinType,
) -> Vec<Row> {
    let ord = KeyOrdering::new(join_key_len);
    let mut out = Vec::with_capacity(left.len().max(right.len()));
    let (mut i, mut k) = (0, 0);
    while i < left.len() || k < right.len() {
        let cmp = match (left.get(i), right.get(k)) {
            (Some(l), Some(r)) => ord.compare_rows(l, r),
            (Some(_), None) => Ordering::Less,
            _ => Ordering::Greater,
        };
        match cmp {
            Ordering::Less => {
                if join_type.keeps_left() {
                    let l = &left[i];
                    out.push(joined_row(l.key_slice(join_key_len), Some(l), left_len, None, right_len));
                }
                i += 1;
            }
            Ordering::Greater => {
                if join_type.keeps_right() {
                    let r = &right[k];
                    out.push(joined_row(r.key_slice(join_key_len), None, left_len, Some(r), right_len));
                }
                k += 1;
            }
            Ordering::Equal => {
                let (ie, ke) = (run_end(ord, left, i), run_end(ord, right, k));
                for l in &left[i..ie] {
                    for r in &right[k..ke] {
                        out.push(joined_row(l.key_slice(join_key_len), Some(l), left_len, Some(r), right_len));
                    }
                }
                i = ie;
                k = ke;
            }
        }
    }
    out
}

/// Merge join that pairs every left row with at most one right row, the
/// first right row with its key. Only `Inner` and `Left` apply.
pub fn merge_join_distinct(
    left: &[Row],
    right: &[Row],
    join_key_len: usize,
    left_len: usize,
    right_len: usize,
    join_type: JoinType,
) -> Vec<Row> {
    let ord = KeyOrdering::new(join_key_len);
    let mut out = Vec::with_capacity(left.len());
    let mut k = 0;
    for l in left {
        while k < right.len() && ord.compare_rows(&right[k], l) == Ordering::Less {
            k += 1;
        }
        let matched = right
            .get(k)
            .filter(|r| ord.compare_rows(r, l) == Ordering::Equal);
        if matched.is_some() || join_type.keeps_left() {
            out.push(joined_row(l.key_slice(join_key_len), Some(l), left_len, matched, right_len));
        }
    }
    out
}

/// Full outer merge with one record per key. Rows sharing a key on one side
/// are paired positionally with the other side's rows of that key.
pub fn merge_zip(left: &[Row], right: &[Row], join_key_len: usize) -> Vec<ZipRow> {
    let ord = KeyOrdering::new(join_key_len);
    let mut out = Vec::with_capacity(left.len().max(right.len()));
    let (mut i, mut k) = (0, 0);
    while i < left.len() || k < right.len() {
        let cmp = match (left.get(i), right.get(k)) {
            (Some(l), Some(r)) => ord.compare_rows(l, r),
            (Some(_), None) => Ordering::Less,
            _ => Ordering::Greater,
        };
        let (ie, ke) = match cmp {
            Ordering::Less => (run_end(ord, left, i), k),
            Ordering::Greater => (i, run_end(ord, right, k)),
            Ordering::Equal => (run_end(ord, left, i), run_end(ord, right, k)),
        };
        let key = if ie > i {
            left[i].key(join_key_len)
        } else {
            right[k].key(join_key_len)
        };
        for n in 0..(ie - i).max(ke - k) {
            out.push(ZipRow {
                key: key.clone(),
                left: left[i..ie].get(n).cloned(),
                right: right[k..ke].get(n).cloned(),
            });
        }
        i = ie;
        k = ke;
    }
    out
}

/// Joins `left` and `right` on their first `join_key_len` key fields.
pub fn ordered_join(
    ctx: &RvdContext,
    left: &Rvd,
    right: &Rvd,
    join_key_len: usize,
    join_type: JoinType,
) -> Result<Rvd> {
    let key_type = check_join_key(left, right, join_key_len)?;
    let schema = Arc::new(join_schema(left.schema(), right.schema(), join_key_len)?);
    let (partitioner, l, r) = align(ctx, left, right, &key_type)?;
    let (left_len, right_len) = (left.schema().len(), right.schema().len());
    let parts = l.zip_partitions(&r, ctx.runner(), |_, lp, rp| {
        Ok(merge_join(lp, rp, join_key_len, left_len, right_len, join_type))
    })?;
    Rvd::new(ctx, schema, partitioner, RowCollection::new(parts))
}

/// Like [`ordered_join`] for a right side with at most one row per join key.
/// Duplicate right keys are not detected; only the first one matches.
pub fn ordered_join_distinct(
    ctx: &RvdContext,
    left: &Rvd,
    right: &Rvd,
    join_key_len: usize,
    join_type: JoinType,
) -> Result<Rvd> {
    if !matches!(join_type, JoinType::Inner | JoinType::Left) {
        return Err(Error::InvalidArgument(format!(
            "distinct join does not support {} joins",
            join_type
        )));
    }
    let key_type = check_join_key(left, right, join_key_len)?;
    let schema = Arc::new(join_schema(left.schema(), right.schema(), join_key_len)?);
    let (partitioner, l, r) = align(ctx, left, right, &key_type)?;
    let (left_len, right_len) = (left.schema().len(), right.schema().len());
    let parts = l.zip_partitions(&r, ctx.runner(), |_, lp, rp| {
        Ok(merge_join_distinct(lp, rp, join_key_len, left_len, right_len, join_type))
    })?;
    Rvd::new(ctx, schema, partitioner, RowCollection::new(parts))
}

/// One record per join key present on either side.
pub fn ordered_zip_join(
    ctx: &RvdContext,
    left: &Rvd,
    right: &Rvd,
    join_key_len: usize,
) -> Result<ZipJoined> {
    let key_type = check_join_key(left, right, join_key_len)?;
    let (partitioner, l, r) = align(ctx, left, right, &key_type)?;
    let partitions = l.zip_partitions(&r, ctx.runner(), |_, lp, rp| Ok(merge_zip(lp, rp, join_key_len)))?;
    Ok(ZipJoined {
        key_type,
        partitioner,
        partitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn left() -> Vec<Row> {
        vec![row![1, "a"], row![2, "b"], row![2, "c"], row![4, "d"]]
    }

    fn right() -> Vec<Row> {
        vec![row![2, "x"], row![2, "y"], row![3, "z"]]
    }

    #[test]
    fn test_inner_cross_product_is_left_major() {
        let out = merge_join(&left(), &right(), 1, 2, 2, JoinType::Inner);
        assert_eq!(
            out,
            vec![
                row![2, "b", "x"],
                row![2, "b", "y"],
                row![2, "c", "x"],
                row![2, "c", "y"],
            ]
        );
    }

    #[test]
    fn test_outer_fills_missing_side() {
        let out = merge_join(&left(), &right(), 1, 2, 2, JoinType::Outer);
        assert_eq!(out.len(), 7);
        assert_eq!(out[0], Row::new(vec![Value::from(1), Value::from("a"), Value::Null]));
        assert_eq!(out[5], Row::new(vec![Value::from(3), Value::Null, Value::from("z")]));
        assert_eq!(out[6], Row::new(vec![Value::from(4), Value::from("d"), Value::Null]));

        let right_only = merge_join(&left(), &right(), 1, 2, 2, JoinType::Right);
        assert_eq!(right_only.len(), 5);
        let left_only = merge_join(&left(), &right(), 1, 2, 2, JoinType::Left);
        assert_eq!(left_only.len(), 6);
    }

    #[test]
    fn test_distinct_takes_first_match() {
        let out = merge_join_distinct(&left(), &right(), 1, 2, 2, JoinType::Left);
        assert_eq!(out.len(), 4);
        assert_eq!(out[1], row![2, "b", "x"]);
        assert_eq!(out[2], row![2, "c", "x"]);
        assert_eq!(out[3], Row::new(vec![Value::from(4), Value::from("d"), Value::Null]));
        assert_eq!(merge_join_distinct(&left(), &right(), 1, 2, 2, JoinType::Inner).len(), 2);
    }

    #[test]
    fn test_zip_one_record_per_key() {
        let out = merge_zip(&[row![1, "a"], row![3, "c"]], &[row![3, "x"], row![5, "y"]], 1);
        let keys: Vec<_> = out.iter().map(|z| z.key.clone()).collect();
        assert_eq!(keys, vec![crate::key![1], crate::key![3], crate::key![5]]);
        assert!(out[0].left.is_some() && out[0].right.is_none());
        assert!(out[1].left.is_some() && out[1].right.is_some());
        assert!(out[2].left.is_none() && out[2].right.is_some());
    }

    #[test]
    fn test_zip_pairs_duplicates_positionally() {
        let out = merge_zip(&left(), &right(), 1);
        let twos: Vec<_> = out.iter().filter(|z| z.key == crate::key![2]).collect();
        assert_eq!(twos.len(), 2);
        assert_eq!(twos[0].right, Some(row![2, "x"]));
        assert_eq!(twos[1].left, Some(row![2, "c"]));
    }
}
