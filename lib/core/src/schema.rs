//! Row layout and key designation.
//!
//! A [`RowSchema`] is an ordered list of named, typed fields whose first `k`
//! fields form the key. The field lookup table is computed once at
//! construction so per-row code never resolves names.

use crate::row::{Key, Row};
use crate::value::DataType;
use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)
    }
}

/// The typed fields of a (partition) key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyType {
    fields: Vec<Field>,
}

impl KeyType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// The key type of the first `len` fields.
    pub fn prefix(&self, len: usize) -> KeyType {
        KeyType::new(self.fields[..len.min(self.fields.len())].to_vec())
    }

    /// Field-for-field type equality, ignoring names.
    pub fn is_isomorphic(&self, other: &KeyType) -> bool {
        self.fields.len() == other.fields.len() && self.is_prefix_of(other)
    }

    /// Whether the types of `self` are a prefix of the types of `other`, ignoring names.
    pub fn is_prefix_of(&self, other: &KeyType) -> bool {
        self.fields.len() <= other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.data_type == b.data_type)
    }

    /// Checks that `key` is a (possibly partial) key of this type.
    pub fn check_key(&self, key: &Key) -> Result<()> {
        if key.len() > self.fields.len() {
            return Err(Error::SchemaMismatch(format!(
                "key {} has {} fields, key type {} has {}",
                key,
                key.len(),
                self,
                self.fields.len()
            )));
        }
        for (value, field) in key.values().iter().zip(&self.fields) {
            if !value.conforms_to(field.data_type) {
                return Err(Error::SchemaMismatch(format!(
                    "key {} does not conform to key type {} at field '{}'",
                    key, self, field.name
                )));
            }
        }
        Ok(())
    }

    /// Relabels fields according to `names`; fields absent from the map keep their name.
    pub fn rename(&self, names: &HashMap<String, String>) -> KeyType {
        KeyType::new(
            self.fields
                .iter()
                .map(|f| Field::new(names.get(&f.name).unwrap_or(&f.name).clone(), f.data_type))
                .collect(),
        )
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", field)?;
        }
        f.write_str("]")
    }
}

/// Ordered field layout with a key prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaRepr", into = "SchemaRepr")]
pub struct RowSchema {
    fields: Vec<Field>,
    key_len: usize,
    index: AHashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct SchemaRepr {
    fields: Vec<Field>,
    key: Vec<String>,
}

impl TryFrom<SchemaRepr> for RowSchema {
    type Error = Error;

    fn try_from(repr: SchemaRepr) -> Result<Self> {
        let schema = RowSchema::new(repr.fields, repr.key.len())?;
        let names = schema.key_names();
        if names.iter().zip(&repr.key).any(|(a, b)| *a != b.as_str()) {
            return Err(Error::SchemaMismatch(format!(
                "key fields {:?} are not a prefix of the field list",
                repr.key
            )));
        }
        Ok(schema)
    }
}

impl From<RowSchema> for SchemaRepr {
    fn from(schema: RowSchema) -> Self {
        let key = schema.key_names().into_iter().map(String::from).collect();
        SchemaRepr {
            fields: schema.fields,
            key,
        }
    }
}

impl PartialEq for RowSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.key_len == other.key_len
    }
}

impl Eq for RowSchema {}

impl RowSchema {
    /// Creates a schema whose first `key_len` fields are the key.
    pub fn new(fields: Vec<Field>, key_len: usize) -> Result<Self> {
        if key_len > fields.len() {
            return Err(Error::SchemaMismatch(format!(
                "key length {} exceeds field count {}",
                key_len,
                fields.len()
            )));
        }
        let mut index = AHashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), i).is_some() {
                return Err(Error::SchemaMismatch(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self {
            fields,
            key_len,
            index,
        })
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn key_type(&self) -> KeyType {
        KeyType::new(self.fields[..self.key_len].to_vec())
    }

    pub fn key_names(&self) -> Vec<&str> {
        self.fields[..self.key_len]
            .iter()
            .map(|f| f.name.as_str())
            .collect()
    }

    #[inline]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    /// The same fields keyed by a shorter prefix.
    pub fn with_key_len(&self, key_len: usize) -> Result<RowSchema> {
        RowSchema::new(self.fields.clone(), key_len)
    }

    /// Relabels fields; fields absent from `names` keep their name.
    pub fn rename(&self, names: &HashMap<String, String>) -> Result<RowSchema> {
        let fields = self
            .fields
            .iter()
            .map(|f| Field::new(names.get(&f.name).unwrap_or(&f.name).clone(), f.data_type))
            .collect();
        RowSchema::new(fields, self.key_len)
    }

    /// The non-key fields.
    pub fn value_fields(&self) -> &[Field] {
        &self.fields[self.key_len..]
    }

    /// Checks arity and per-field types of `row`.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.fields.len() {
            return Err(Error::SchemaMismatch(format!(
                "row {} has {} fields, schema has {}",
                row,
                row.len(),
                self.fields.len()
            )));
        }
        for (value, field) in row.values().iter().zip(&self.fields) {
            if !value.conforms_to(field.data_type) {
                return Err(Error::SchemaMismatch(format!(
                    "value {} does not conform to field {}",
                    value, field
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RowSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if i < self.key_len {
                f.write_str("*")?;
            }
            write!(f, "{}", field)?;
        }
        f.write_str("}")
    }
}
