//! Raw rows returned by the store boundary.
//!
//! A `Row` is an ordered list of named column values. Entity decoders pull
//! typed values out of it; any failure is a `RowError`, which callers treat
//! as a malformed record and skip.

use crate::entity::DbId;
use thiserror::Error;

/// Errors that can occur while decoding a row
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RowError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{0}' is null")]
    NullColumn(String),

    #[error("column '{column}' is not {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("column '{column}' is invalid: {reason}")]
    Invalid { column: String, reason: String },
}

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

/// Values above `i64::MAX` have no integer form in the store and become
/// `Null`, which equals no key
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Null, Value::Integer)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row of named column values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    fn value(&self, column: &str) -> Result<&Value, RowError> {
        self.get(column)
            .ok_or_else(|| RowError::MissingColumn(column.to_string()))
    }

    /// Required database ID (non-null, positive)
    pub fn id(&self, column: &str) -> Result<DbId, RowError> {
        self.opt_id(column)?
            .ok_or_else(|| RowError::NullColumn(column.to_string()))
    }

    /// Optional database ID; NULL and 0 both mean "no reference"
    pub fn opt_id(&self, column: &str) -> Result<Option<DbId>, RowError> {
        match self.opt_int(column)? {
            None | Some(0) => Ok(None),
            Some(v) if v < 0 => Err(RowError::Invalid {
                column: column.to_string(),
                reason: format!("negative identifier {}", v),
            }),
            Some(v) => Ok(Some(v as DbId)),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, RowError> {
        self.opt_int(column)?
            .ok_or_else(|| RowError::NullColumn(column.to_string()))
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, RowError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(*v)),
            _ => Err(RowError::TypeMismatch {
                column: column.to_string(),
                expected: "an integer",
            }),
        }
    }

    pub fn opt_real(&self, column: &str) -> Result<Option<f64>, RowError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Real(v) => Ok(Some(*v)),
            Value::Integer(v) => Ok(Some(*v as f64)),
            _ => Err(RowError::TypeMismatch {
                column: column.to_string(),
                expected: "a number",
            }),
        }
    }

    /// Boolean flag stored as 0/1; NULL reads as false
    pub fn flag(&self, column: &str) -> Result<bool, RowError> {
        Ok(self.opt_int(column)?.unwrap_or(0) != 0)
    }

    pub fn text(&self, column: &str) -> Result<String, RowError> {
        self.opt_text(column)?
            .ok_or_else(|| RowError::NullColumn(column.to_string()))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, RowError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            _ => Err(RowError::TypeMismatch {
                column: column.to_string(),
                expected: "text",
            }),
        }
    }
}
