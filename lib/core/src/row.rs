use crate::value::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// A decoded row: one value per schema field, key fields first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    #[inline]
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// The first `len` values, borrowed.
    #[inline]
    pub fn key_slice(&self, len: usize) -> &[Value] {
        &self.values[..len.min(self.values.len())]
    }

    /// The first `len` values as an owned key.
    #[inline]
    pub fn key(&self, len: usize) -> Key {
        Key::from_slice(self.key_slice(len))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tuple(f, &self.values)
    }
}

/// Builds a [`Row`] from anything convertible into [`Value`].
#[macro_export]
macro_rules! row {
    ($($v:expr),* $(,)?) => {
        $crate::Row::new(vec![$($crate::Value::from($v)),*])
    };
}

/// Builds a [`Key`] from anything convertible into [`Value`].
#[macro_export]
macro_rules! key {
    ($($v:expr),* $(,)?) => {
        $crate::Key::new(vec![$($crate::Value::from($v)),*])
    };
}

/// A tuple of key values. Keys of different lengths compare lexicographically,
/// so a strict prefix sorts before all of its extensions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Key(SmallVec<[Value; 4]>);

impl Key {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(SmallVec::from_vec(values))
    }

    #[must_use]
    pub fn from_slice(values: &[Value]) -> Self {
        Self(values.iter().cloned().collect())
    }

    #[inline]
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// The first `len` fields of this key.
    #[must_use]
    pub fn truncate(&self, len: usize) -> Key {
        Key::from_slice(&self.0[..len.min(self.0.len())])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tuple(f, &self.0)
    }
}

fn write_tuple(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    f.write_str("(")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", v)?;
    }
    f.write_str(")")
}

/// Lexicographic order restricted to the first `len` key fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOrdering {
    len: usize,
}

impl KeyOrdering {
    #[inline]
    pub const fn new(len: usize) -> Self {
        Self { len }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        let a = &a[..self.len.min(a.len())];
        let b = &b[..self.len.min(b.len())];
        a.cmp(b)
    }

    #[inline]
    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        self.compare(a.values(), b.values())
    }

    /// Whether `rows` is non-decreasing under this ordering.
    pub fn is_sorted(&self, rows: &[Row]) -> bool {
        rows.windows(2)
            .all(|w| self.compare_rows(&w[0], &w[1]) != Ordering::Greater)
    }
}
