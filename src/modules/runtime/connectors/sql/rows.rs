//! Row materialisation from SQL driver cursors

use serde_json::Value;
use switchyard_types::Row;

/// A driver-neutral cell value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw bytes; rendered as UTF-8 text
    Bytes(Vec<u8>),
    /// 16-byte identifier; rendered in canonical hyphenated form
    Uuid([u8; 16]),
    Json(Value),
}

impl SqlValue {
    /// Convert to the JSON value placed in a row
    pub fn into_json(self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(b),
            SqlValue::Int(i) => Value::Number(i.into()),
            SqlValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s),
            SqlValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            SqlValue::Uuid(raw) => Value::String(uuid::Uuid::from_bytes(raw).hyphenated().to_string()),
            SqlValue::Json(v) => v,
        }
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map(SqlValue::Text).unwrap_or(SqlValue::Null)
    }
}

/// A forward-only result cursor
pub trait RowCursor {
    /// Column names, in result order
    fn columns(&self) -> &[String];

    /// Next row of values, or `None` when exhausted
    fn next_row(&mut self) -> Option<Vec<SqlValue>>;
}

/// A cursor over rows already fetched into memory
#[derive(Debug, Clone, Default)]
pub struct VecCursor {
    columns: Vec<String>,
    rows: std::collections::VecDeque<Vec<SqlValue>>,
}

impl VecCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Option<Vec<SqlValue>> {
        self.rows.pop_front()
    }
}

/// Drain a cursor into rows keyed by column name
///
/// Row order follows the cursor. Every column appears in every row; a short
/// row is padded with nulls.
pub fn rows_to_mappings(cursor: &mut dyn RowCursor) -> Vec<Row> {
    let columns: Vec<String> = cursor.columns().to_vec();
    let mut rows = Vec::new();

    while let Some(values) = cursor.next_row() {
        let mut values = values.into_iter();
        let row: Row = columns
            .iter()
            .map(|column| {
                let value = values.next().unwrap_or(SqlValue::Null);
                (column.clone(), value.into_json())
            })
            .collect();
        rows.push(row);
    }

    rows
}
