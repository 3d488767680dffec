use crate::row::Row;
use crate::schema::RowSchema;
use crate::value::Value;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;

/// An opaque encoded row. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedRow(Bytes);

impl EncodedRow {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncodedRow {
    fn from(bytes: Vec<u8>) -> Self {
        EncodedRow(Bytes::from(bytes))
    }
}

impl From<Bytes> for EncodedRow {
    fn from(bytes: Bytes) -> Self {
        EncodedRow(bytes)
    }
}

/// Encodes and decodes rows of one schema. Used whenever rows cross a
/// shuffle or are persisted.
#[derive(Debug, Clone)]
pub struct RowCodec {
    schema: Arc<RowSchema>,
}

impl RowCodec {
    pub fn new(schema: Arc<RowSchema>) -> Self {
        Self { schema }
    }

    #[inline]
    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }

    pub fn encode(&self, row: &Row) -> Result<EncodedRow> {
        let mut buf = Vec::with_capacity(16 * row.len());
        self.encode_into(row, &mut buf)?;
        Ok(EncodedRow::from(buf))
    }

    /// Appends the encoding of `row` to `buf`.
    pub fn encode_into(&self, row: &Row, buf: &mut Vec<u8>) -> Result<()> {
        self.schema.check_row(row)?;
        bincode::serialize_into(buf, row.values()).map_err(|e| Error::Codec(e.to_string()))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Row> {
        let values: Vec<Value> =
            bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))?;
        let row = Row::new(values);
        self.schema.check_row(&row)?;
        Ok(row)
    }
}
