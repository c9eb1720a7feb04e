//! Result table types for sql-fanout.
//!
//! Defines the structures used to represent materialized query results.

use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;

/// Text format used for timestamps everywhere a value is rendered.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A fully materialized result set from one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Column names, unique under case-insensitive comparison.
    pub columns: Vec<String>,

    /// Rows of data, each aligned with `columns`.
    pub rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table from driver-reported column names and rows.
    ///
    /// Empty names become `Column<N>` (1-based position) and names that
    /// collide case-insensitively with an earlier column receive the smallest
    /// numeric suffix that makes them unique.
    pub fn with_data<S: Into<String>>(columns: impl IntoIterator<Item = S>, rows: Vec<Row>) -> Self {
        Self {
            columns: unique_column_names(columns),
            rows,
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Case-insensitive comparison key for a column name.
pub fn column_key(name: &str) -> String {
    name.to_lowercase()
}

fn unique_column_names<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for (position, column) in columns.into_iter().enumerate() {
        let mut name: String = column.into();
        if name.is_empty() {
            name = format!("Column{}", position + 1);
        }
        if seen.contains(&column_key(&name)) {
            name = next_free_name(&name, |candidate| seen.contains(&column_key(candidate)));
        }
        seen.insert(column_key(&name));
        names.push(name);
    }

    names
}

/// Returns `base` followed by the smallest suffix `1, 2, ...` for which
/// `taken` is false.
pub(crate) fn next_free_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// A row of data, positionally aligned with its table's columns.
pub type Row = Vec<Value>;

/// A single scalar value from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text value. Also carries exact decimals, binary data (hex) and
    /// offset-aware timestamps.
    Text(String),

    /// Date and time without offset.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Culture-invariant text form used for CSV fields. NULL is empty.
    pub fn to_field_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Hex text form for binary column data (`0x0AFF`).
    pub fn binary(bytes: &[u8]) -> Self {
        let mut out = String::with_capacity(2 + bytes.len() * 2);
        out.push_str("0x");
        for b in bytes {
            out.push_str(&format!("{b:02X}"));
        }
        Value::Text(out)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.to_field_string()),
        }
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
