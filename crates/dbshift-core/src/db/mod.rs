//! The driver boundary.
//!
//! Everything that talks to a live database goes through [`QueryRunner`].
//! The runner owns one connection for its whole lifetime, so a transaction
//! started on it covers every later statement until commit or rollback.

use std::future::Future;
use std::pin::Pin;

use crate::dialect::Dialect;
use crate::error::{Result, ShiftError};

/// Boxed future returned by [`QueryRunner`] methods.
pub type QueryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A single database connection with transaction control.
pub trait QueryRunner: Send {
    /// Dialect spoken by the connection.
    fn dialect(&self) -> Dialect;

    /// Run a query and collect its rows.
    fn query<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> QueryFuture<'a, Vec<Row>>;

    /// Run a statement, returning the affected row count.
    fn execute<'a>(&'a mut self, sql: &'a str) -> QueryFuture<'a, u64>;

    fn start_transaction(&mut self) -> QueryFuture<'_, ()>;

    fn commit_transaction(&mut self) -> QueryFuture<'_, ()>;

    fn rollback_transaction(&mut self) -> QueryFuture<'_, ()>;

    fn is_transaction_active(&self) -> bool;

    /// Return the connection. Later calls fail with `InvalidState`.
    fn release(&mut self) -> QueryFuture<'_, ()>;
}

/// A bound parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form of a scalar; `None` for NULL and bytes that are not UTF-8.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone()).ok(),
        }
    }

    /// Integer value, parsing text where a catalog reports numbers as strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean value, accepting the spellings catalogs use (`YES`, `t`, `1`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "t" | "true" | "1" | "on" => Some(true),
                "no" | "n" | "f" | "false" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row. Column lookup ignores case, since catalogs disagree on
/// the case of their column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create a new row from column names and values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Optional text cell; NULL and missing columns are `None`.
    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::to_text)
    }

    /// Required text cell.
    pub fn get_string(&self, column: &str) -> Result<String> {
        self.get_str(column).ok_or_else(|| missing(column))
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    /// Required integer cell.
    pub fn require_i64(&self, column: &str) -> Result<i64> {
        self.get_i64(column).ok_or_else(|| missing(column))
    }
}

fn missing(column: &str) -> ShiftError {
    ShiftError::Database(format!("column '{}' missing or NULL in result row", column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_ignores_case() {
        let row = Row::from_pairs([("COLUMN_NAME", Value::from("id"))]);
        assert_eq!(row.get_str("column_name").as_deref(), Some("id"));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_catalog_booleans() {
        let row = Row::from_pairs([
            ("is_nullable", Value::from("YES")),
            ("notnull", Value::Int(1)),
            ("deferrable", Value::from("f")),
        ]);
        assert_eq!(row.get_bool("is_nullable"), Some(true));
        assert_eq!(row.get_bool("notnull"), Some(true));
        assert_eq!(row.get_bool("deferrable"), Some(false));
    }

    #[test]
    fn test_numbers_from_text() {
        let row = Row::from_pairs([("len", Value::from("50")), ("n", Value::Null)]);
        assert_eq!(row.get_i64("len"), Some(50));
        assert_eq!(row.get_i64("n"), None);
        assert!(row.require_i64("n").is_err());
    }
}
