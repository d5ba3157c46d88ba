//! SQLite Store Connection
//!
//! This module provides a wrapper around rusqlite implementing the `Store`
//! boundary. Statement text is built here and nowhere else; the adaptor
//! layer only describes what it wants through `Select`.

use crate::error::StoreError;
use crate::row::{Row, Value};
use crate::store::schema::{
    KNOWN_TABLES, SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_TABLES, STORE_SCHEMA_VERSION,
};
use crate::store::{Filter, Select, Store};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

/// Connection settings for `SqliteStore`
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
    /// Open the database read-only
    pub read_only: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            read_only: false,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Only plain identifiers are ever spliced into statement text
fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn check_select(select: &Select) -> Result<(), StoreError> {
    if !KNOWN_TABLES.contains(&select.table) {
        return Err(StoreError::unavailable(format!(
            "unknown table '{}'",
            select.table
        )));
    }
    let filter_column = match &select.filter {
        Filter::All => None,
        Filter::In { column, .. } => Some(*column),
    };
    if let Some(bad) = select
        .columns
        .iter()
        .copied()
        .chain(filter_column)
        .find(|c| !is_identifier(c))
    {
        return Err(StoreError::unavailable(format!(
            "invalid column name '{}'",
            bad
        )));
    }
    if select.columns.is_empty() {
        return Err(StoreError::unavailable(format!(
            "select on '{}' names no columns",
            select.table
        )));
    }
    Ok(())
}

/// Build the statement text for a select
fn select_sql(select: &Select) -> String {
    let mut sql = format!(
        "SELECT {} FROM {}",
        select.columns.join(", "),
        select.table
    );
    if let Filter::In { column, values } = &select.filter {
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        sql.push_str(&format!(" WHERE {} IN ({})", column, placeholders.join(", ")));
    }
    // Stable row order, leading with the first selected column
    sql.push_str(&format!(" ORDER BY {}", select.columns.join(", ")));
    sql
}

/// A `Store` backed by one SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open an existing store
    pub fn open(path: &Path, options: &SqliteOptions) -> Result<Self, StoreError> {
        let conn = if options.read_only {
            Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?
        } else {
            Connection::open(path)?
        };
        Self::configure_connection(&conn, options)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };

        if let Some(version) = store.get_meta("schema_version")? {
            if version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: STORE_SCHEMA_VERSION.to_string(),
                    found: version,
                });
            }
        }

        debug!("Opened variation store at {:?}", path);
        Ok(store)
    }

    /// Create a new store with schema
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn, &SqliteOptions::default())?;
        Self::create_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.set_meta("schema_version", STORE_SCHEMA_VERSION)?;

        debug!("Created variation store at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.set_meta("schema_version", STORE_SCHEMA_VERSION)?;
        Ok(store)
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA_CREATE_TABLES)?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
        Ok(())
    }

    /// Configure connection with read-mostly settings
    fn configure_connection(conn: &Connection, options: &SqliteOptions) -> Result<(), StoreError> {
        conn.busy_timeout(options.busy_timeout)?;
        if !options.read_only {
            // WAL lets readers proceed while a seeding writer holds the database
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        // Increase cache size (negative value = KB)
        conn.pragma_update(None, "cache_size", -64000)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    /// Path of the database file (None for in-memory stores)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Metadata Operations
    // =========================================================================

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT meta_value FROM meta WHERE meta_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO meta (meta_key, meta_value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Insert one row into a table
    pub fn insert_row(&self, table: &'static str, row: &Row) -> Result<(), StoreError> {
        self.insert_rows(table, std::slice::from_ref(row))
    }

    /// Insert multiple rows in a transaction
    pub fn insert_rows(&self, table: &'static str, rows: &[Row]) -> Result<(), StoreError> {
        if !KNOWN_TABLES.contains(&table) {
            return Err(StoreError::unavailable(format!("unknown table '{}'", table)));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for row in rows {
            let columns: Vec<&str> = row.iter().map(|(c, _)| c).collect();
            if let Some(bad) = columns.iter().find(|c| !is_identifier(c)) {
                return Err(StoreError::unavailable(format!(
                    "invalid column name '{}'",
                    bad
                )));
            }
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(row.iter().map(|(_, v)| v)))?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        check_select(select)?;

        let params: &[Value] = match &select.filter {
            Filter::All => &[],
            Filter::In { values, .. } if values.is_empty() => return Ok(Vec::new()),
            Filter::In { values, .. } => values,
        };

        let sql = select_sql(select);
        trace!("Executing: {}", sql);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (i, column) in select.columns.iter().enumerate() {
                out.push(*column, from_value_ref(row.get_ref(i)?));
            }
            result.push(out);
        }
        Ok(result)
    }
}
