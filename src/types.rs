//! Core data model: scalar types, column buffers, rows, schemas, chunks.
//!
//! A [`ColumnVector`] is a named, typed, append-only buffer holding packed
//! little-endian values. Fixed-width types occupy `row_count * size` bytes;
//! strings are stored as repeated `(u32 length, bytes)` records in insertion
//! order, so random access on a string column is O(n) in the index.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{DbError, DbResult};

/// Rows per chunk produced by the scan operator; the last chunk may be smaller.
pub const BATCH_SIZE: usize = 1024;

/// Upper bound on a single string value, in bytes.
pub const MAX_STRING_LENGTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum DataType {
    #[strum(serialize = "INT")]
    #[serde(rename = "INT")]
    Int,
    #[strum(serialize = "STRING")]
    #[serde(rename = "STRING")]
    String,
    #[strum(serialize = "BOOL")]
    #[serde(rename = "BOOL")]
    Bool,
    #[strum(serialize = "DECIMAL")]
    #[serde(rename = "DECIMAL")]
    Decimal,
}

impl DataType {
    /// On-disk width for fixed-width types; `None` for STRING.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            DataType::Int => Some(4),
            DataType::String => None,
            DataType::Bool => Some(1),
            DataType::Decimal => Some(8),
        }
    }

    /// Ordinal written into the column file header. Matches declaration order.
    pub fn ordinal(self) -> u32 {
        match self {
            DataType::Int => 0,
            DataType::String => 1,
            DataType::Bool => 2,
            DataType::Decimal => 3,
        }
    }

    pub fn from_ordinal(ordinal: u32) -> Option<DataType> {
        match ordinal {
            0 => Some(DataType::Int),
            1 => Some(DataType::String),
            2 => Some(DataType::Bool),
            3 => Some(DataType::Decimal),
            _ => None,
        }
    }

    /// Stringified default used when INSERT omits a column.
    pub fn default_value(self) -> &'static str {
        match self {
            DataType::Int => "0",
            DataType::String => "",
            DataType::Bool => "false",
            DataType::Decimal => "0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JoinType {
    #[strum(serialize = "INNER")]
    Inner,
    #[strum(serialize = "LEFT OUTER")]
    LeftOuter,
    #[strum(serialize = "RIGHT OUTER")]
    RightOuter,
    #[strum(serialize = "FULL OUTER")]
    FullOuter,
}

/// A named, typed, append-only column buffer.
///
/// Invariant: `row_count` equals the logical number of values and `data.len()`
/// derives deterministically from the type and the value stream.
#[derive(Debug, Clone)]
pub struct ColumnVector {
    pub name: String,
    pub data_type: DataType,
    pub data: Vec<u8>,
    pub row_count: usize,
}

impl ColumnVector {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            data: Vec::new(),
            row_count: 0,
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.row_count = 0;
    }

    pub fn reserve(&mut self, rows: usize) {
        if let Some(size) = self.data_type.fixed_size() {
            self.data.reserve(rows * size);
        }
    }

    pub fn append_int(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
        self.row_count += 1;
    }

    pub fn append_decimal(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
        self.row_count += 1;
    }

    pub fn append_bool(&mut self, value: bool) {
        self.data.push(value as u8);
        self.row_count += 1;
    }

    pub fn append_string(&mut self, value: &str) -> DbResult<()> {
        if value.len() > MAX_STRING_LENGTH {
            return Err(DbError::InvalidArgument(format!(
                "String value exceeds {} bytes",
                MAX_STRING_LENGTH
            )));
        }
        self.data
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.data.extend_from_slice(value.as_bytes());
        self.row_count += 1;
        Ok(())
    }

    /// Appends row `index` of `source`, which must share this column's type.
    pub fn append_from(&mut self, source: &ColumnVector, index: usize) -> DbResult<()> {
        match self.data_type {
            DataType::Int => self.append_int(source.get_int(index)),
            DataType::String => self.append_string(&source.get_string(index))?,
            DataType::Bool => self.append_bool(source.get_bool(index)),
            DataType::Decimal => self.append_decimal(source.get_decimal(index)),
        }
        Ok(())
    }

    pub fn get_int(&self, index: usize) -> i32 {
        let offset = index * 4;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        i32::from_le_bytes(buf)
    }

    pub fn get_decimal(&self, index: usize) -> f64 {
        let offset = index * 8;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        f64::from_le_bytes(buf)
    }

    pub fn get_bool(&self, index: usize) -> bool {
        self.data[index] != 0
    }

    /// Walks the length-prefixed records from offset 0. O(n) in `index`.
    pub fn get_string(&self, index: usize) -> String {
        let (offset, length) = self.string_record(index);
        String::from_utf8_lossy(&self.data[offset..offset + length]).into_owned()
    }

    fn string_record(&self, index: usize) -> (usize, usize) {
        let mut offset = 0usize;
        for _ in 0..index {
            let length = self.string_length_at(offset);
            offset += 4 + length;
        }
        let length = self.string_length_at(offset);
        (offset + 4, length)
    }

    fn string_length_at(&self, offset: usize) -> usize {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf) as usize
    }
}

/// A value vector indexed positionally over a schema; every value is carried
/// in stringified form until typed at the storage or evaluation boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub values: Vec<String>,
}

impl Row {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }
}

/// Parallel-vector table schema. `column_names` order is authoritative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub column_names: Vec<String>,
    pub column_types: Vec<DataType>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            column_names: Vec::new(),
            column_types: Vec::new(),
        }
    }

    pub fn add_column(&mut self, name: impl Into<String>, data_type: DataType) {
        self.column_names.push(name.into());
        self.column_types.push(data_type);
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Linear case-insensitive scan.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.column_names
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn get_column_type(&self, name: &str) -> Option<DataType> {
        self.get_column_index(name).map(|i| self.column_types[i])
    }
}

/// A batch of column vectors with identical row counts; the unit of dataflow
/// between operators. An empty chunk (`row_count == 0`) signals end-of-stream.
#[derive(Debug, Clone, Default)]
pub struct DataChunk {
    pub columns: Vec<ColumnVector>,
    pub row_count: usize,
}

impl DataChunk {
    pub fn clear(&mut self) {
        self.columns.clear();
        self.row_count = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn add_column(&mut self, column: ColumnVector) {
        if self.columns.is_empty() {
            self.row_count = column.row_count;
        }
        self.columns.push(column);
    }

    /// Case-insensitive lookup by the qualified `table.column` name.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}
