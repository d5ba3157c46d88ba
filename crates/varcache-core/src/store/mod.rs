//! Store Boundary
//!
//! The adaptor layer never talks to a database directly. It hands a `Select`
//! (table, columns, constraint) to a `Store` and gets raw rows back.
//!
//! ```text
//! Store (trait)
//! └── SqliteStore (rusqlite, schema in schema.rs)
//! ```

pub mod schema;
pub mod sqlite;

use crate::error::StoreError;
use crate::row::{Row, Value};
use std::sync::Arc;

pub use schema::STORE_SCHEMA_VERSION;
pub use sqlite::{SqliteOptions, SqliteStore};

/// Row constraint of a `Select`
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row of the table
    All,
    /// Rows whose `column` equals one of `values`
    In {
        column: &'static str,
        values: Vec<Value>,
    },
}

/// A read against one table
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub filter: Filter,
}

impl Select {
    /// Select every row of a table
    pub fn all(table: &'static str, columns: &[&'static str]) -> Self {
        Self {
            table,
            columns: columns.to_vec(),
            filter: Filter::All,
        }
    }

    /// Select rows whose `column` is in `values`
    pub fn where_in<V: Into<Value>>(
        table: &'static str,
        columns: &[&'static str],
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            table,
            columns: columns.to_vec(),
            filter: Filter::In {
                column,
                values: values.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Number of keys in the constraint (0 for `Filter::All`)
    pub fn key_count(&self) -> usize {
        match &self.filter {
            Filter::All => 0,
            Filter::In { values, .. } => values.len(),
        }
    }
}

/// The store boundary: executes a select and returns raw rows.
///
/// Implementations must be safe to call from several threads at once.
pub trait Store: Send + Sync {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        (**self).execute(select)
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        (**self).execute(select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_where_in() {
        let select = Select::where_in("variation", &["variation_id", "name"], "variation_id", [
            1u64, 2, 3,
        ]);
        assert_eq!(select.key_count(), 3);
        assert_eq!(select.columns, vec!["variation_id", "name"]);
        match select.filter {
            Filter::In { column, values } => {
                assert_eq!(column, "variation_id");
                assert_eq!(values[2], Value::Integer(3));
            }
            Filter::All => panic!("expected IN filter"),
        }
    }

    #[test]
    fn test_select_all() {
        let select = Select::all("source", &["source_id"]);
        assert_eq!(select.key_count(), 0);
        assert_eq!(select.filter, Filter::All);
    }
}
