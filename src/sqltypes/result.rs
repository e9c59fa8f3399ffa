//! Result sets returned by shards and by the router

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// One result row
pub type Row = Vec<Value>;

/// Column type families reported by shard servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Null,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Decimal,
    VarChar,
    VarBinary,
    Char,
    Text,
    Blob,
    Date,
    Datetime,
    Timestamp,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Null => "NULL",
            FieldType::Int8 => "INT8",
            FieldType::Int16 => "INT16",
            FieldType::Int32 => "INT32",
            FieldType::Int64 => "INT64",
            FieldType::Uint64 => "UINT64",
            FieldType::Float32 => "FLOAT32",
            FieldType::Float64 => "FLOAT64",
            FieldType::Decimal => "DECIMAL",
            FieldType::VarChar => "VARCHAR",
            FieldType::VarBinary => "VARBINARY",
            FieldType::Char => "CHAR",
            FieldType::Text => "TEXT",
            FieldType::Blob => "BLOB",
            FieldType::Date => "DATE",
            FieldType::Datetime => "DATETIME",
            FieldType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column name as reported by the shard
    pub name: String,
    /// Column type
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A (possibly partial) query result.
///
/// In streaming mode every chunk is a `QueryResult`; only the first chunk
/// of a stream carries `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column descriptors
    pub fields: Vec<Field>,
    /// Rows in the order they were produced
    pub rows: Vec<Row>,
    /// Rows affected (DML) or rows returned (SELECT)
    pub rows_affected: u64,
    /// Last auto-increment id generated by an insert, 0 if none
    pub insert_id: u64,
}

impl QueryResult {
    /// Creates an empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a fields-only result
    pub fn with_fields(fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Returns true if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
