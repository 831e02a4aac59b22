//! SQLite Driver
//!
//! Implements `Driver` for SQLite using rusqlite. Every statement is prepared,
//! bound with named parameters and released before the call returns.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;

use super::sql::Driver;
use super::{AdapterError, AdapterResult, Bind, SqlValue};
use crate::engine::config::ConnectionConfig;
use crate::engine::Row;

pub struct SqliteDriver {
    conn: Connection,
    database: Option<String>,
}

impl SqliteDriver {
    pub fn open(path: &Path) -> AdapterResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AdapterError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| AdapterError::Connection(e.to_string()))?;
        let driver = Self {
            conn,
            database: None,
        };
        driver.init(true)?;
        Ok(driver)
    }

    pub fn in_memory() -> AdapterResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| AdapterError::Connection(e.to_string()))?;
        let driver = Self {
            conn,
            database: None,
        };
        driver.init(false)?;
        Ok(driver)
    }

    /// Wrap a live connection the caller already opened
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            database: None,
        }
    }

    pub fn connect(config: &ConnectionConfig) -> AdapterResult<Self> {
        let mut driver = if config.host.is_empty() || config.host == ":memory:" {
            Self::in_memory()?
        } else {
            Self::open(Path::new(&config.host))?
        };
        driver.database = config.database.clone();
        Ok(driver)
    }

    fn init(&self, file_backed: bool) -> AdapterResult<()> {
        if file_backed {
            let _: String = self
                .conn
                .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
                .map_err(|e| AdapterError::Connection(e.to_string()))?;
        }
        self.conn
            .execute_batch("PRAGMA foreign_keys=ON")
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Underlying connection, for callers that need rusqlite directly
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Convert a rusqlite ValueRef to serde_json Value
    fn value_ref_to_json(val: ValueRef<'_>) -> Value {
        match val {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => json!(i),
            ValueRef::Real(f) => json!(f),
            ValueRef::Text(t) => json!(String::from_utf8_lossy(t).to_string()),
            ValueRef::Blob(b) => json!(String::from_utf8_lossy(b).to_string()),
        }
    }
}

/// `:name` prefixed pairs, as rusqlite expects named parameters
fn named_params(binds: &[Bind]) -> Vec<(String, &SqlValue)> {
    binds
        .iter()
        .map(|b| (format!(":{}", b.name), &b.value))
        .collect()
}

impl Driver for SqliteDriver {
    fn execute(&self, statement: &str, binds: &[Bind]) -> AdapterResult<u64> {
        let named = named_params(binds);
        let params: Vec<(&str, &dyn ToSql)> = named
            .iter()
            .map(|(name, value)| (name.as_str(), *value as &dyn ToSql))
            .collect();

        let mut stmt = self.conn.prepare(statement)?;
        let affected = stmt.execute(params.as_slice())?;
        Ok(affected as u64)
    }

    fn query(&self, statement: &str, binds: &[Bind]) -> AdapterResult<Vec<Row>> {
        let named = named_params(binds);
        let params: Vec<(&str, &dyn ToSql)> = named
            .iter()
            .map(|(name, value)| (name.as_str(), *value as &dyn ToSql))
            .collect();

        let mut stmt = self.conn.prepare(statement)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query(params.as_slice())?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in column_names.iter().enumerate() {
                let value = Self::value_ref_to_json(row.get_ref(i)?);
                record.insert(name.clone(), value);
            }
            results.push(record);
        }
        Ok(results)
    }

    fn last_insert_id(&self) -> Value {
        json!(self.conn.last_insert_rowid())
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Sql::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Sql::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Sql::Integer(*b as i64)),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_named_binds_roundtrip() {
        let driver = SqliteDriver::in_memory().unwrap();
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, flag INTEGER)", &[])
            .unwrap();
        let affected = driver
            .execute(
                "INSERT INTO t (name, flag) VALUES (:name0, :flag1)",
                &[
                    Bind::new("name0", SqlValue::Text("zero".into())),
                    Bind::new("flag1", SqlValue::Bool(true)),
                ],
            )
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(driver.last_insert_id(), json!(1));

        let rows = driver
            .query(
                "SELECT * FROM t WHERE name = :name0",
                &[Bind::new("name0", SqlValue::Text("zero".into()))],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["flag"], json!(1));
        assert_eq!(rows[0]["name"], json!("zero"));
    }

    #[test]
    fn test_bad_statement_is_error() {
        let driver = SqliteDriver::in_memory().unwrap();
        let err = driver.query("SELECT * FROM missing", &[]).unwrap_err();
        assert!(matches!(err, AdapterError::Statement(_)));
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("app.db");
        let driver = SqliteDriver::open(&path).unwrap();
        driver.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        assert!(path.exists());

        let reopened = SqliteDriver::connect(
            &ConnectionConfig::new(path.to_string_lossy()).database("main"),
        )
        .unwrap();
        assert_eq!(reopened.database(), Some("main"));
        assert!(reopened.query("SELECT * FROM t", &[]).unwrap().is_empty());
    }
}
