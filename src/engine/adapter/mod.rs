//! Database Adapter Layer
//!
//! Provides a trait-based abstraction over the storage backends the mapper
//! can run against. SQL backends go through `SqlAdapter` with a pluggable
//! `Dialect`; the file-backed document store goes through `DocumentAdapter`.

pub mod dialect;
pub mod document;
pub mod sql;
pub mod sqlite;

pub use dialect::{Dialect, LiveColumn, Mysql, Sqlite, SqlDialect};
pub use document::DocumentAdapter;
pub use sql::{Driver, SqlAdapter};
pub use sqlite::SqliteDriver;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::rc::Rc;
use thiserror::Error;

use super::collection::Collection;
use super::config::{AdapterKind, ConnectionConfig, DatabaseConfig};
use super::log::QueryLog;
use super::nosql::NoSqlError;
use super::query::Query;
use super::schema::{FieldDef, FieldType};
use super::Row;

/// Universal result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Backend contract shared by every adapter.
///
/// Writes report failure through `Err`; `Ok(false)` means the statement ran
/// but had nothing to do.
pub trait Adapter {
    fn kind(&self) -> AdapterKind;

    /// Insert one record, returning its identity. `primary_key` names the
    /// field the backend generates when the record carries none.
    fn create(&self, source: &str, primary_key: &str, data: &Row) -> AdapterResult<Value>;

    /// Execute a query and hydrate the results through its mapper
    fn read(&self, query: &Query) -> AdapterResult<Collection>;

    /// `Ok(false)` when no record matched
    fn update(
        &self,
        source: &str,
        primary_key: &str,
        data: &Row,
        conditions: &Row,
    ) -> AdapterResult<bool>;

    fn delete(&self, source: &str, primary_key: &str, conditions: &Row) -> AdapterResult<bool>;

    /// Remove every record and reset identity sequences
    fn truncate(&self, source: &str) -> AdapterResult<bool>;

    fn drop(&self, source: &str) -> AdapterResult<bool>;

    fn create_database(&self, name: &str) -> AdapterResult<bool>;

    fn drop_database(&self, name: &str) -> AdapterResult<bool>;

    /// Reconcile the declared fields with the live source
    fn migrate(&self, source: &str, fields: &[FieldDef]) -> AdapterResult<MigrationReport>;

    /// Backend-native literal quoting for contexts without parameter binding
    fn escape(&self, raw: &str) -> String;

    /// Raw statement returning rows, for backends that have statements
    fn raw_rows(&self, statement: &str, binds: &[Bind]) -> AdapterResult<Vec<Row>> {
        let _ = binds;
        Err(AdapterError::Unsupported(format!(
            "{} adapter cannot run raw statement: {}",
            self.kind_name(),
            statement
        )))
    }

    fn kind_name(&self) -> &'static str {
        match self.kind() {
            AdapterKind::Sqlite => "sqlite",
            AdapterKind::Mysql => "mysql",
            AdapterKind::Document => "document",
        }
    }

    fn date_format(&self) -> &'static str {
        "%Y-%m-%d"
    }

    fn time_format(&self) -> &'static str {
        "%H:%M:%S"
    }

    fn datetime_format(&self) -> &'static str {
        "%Y-%m-%d %H:%M:%S"
    }

    /// Storage form of a temporal field value. Unix timestamps are rendered
    /// with the adapter's format for the field type; anything else is kept.
    fn temporal_value(&self, field_type: FieldType, value: &Value) -> Value {
        format_temporal(
            field_type,
            value,
            self.date_format(),
            self.time_format(),
            self.datetime_format(),
        )
    }

    /// Caller-facing form of a stored temporal value
    fn read_temporal(&self, field_type: FieldType, value: &Value) -> Value {
        let _ = field_type;
        value.clone()
    }
}

/// Render an integer Unix timestamp with the format matching the field type
pub fn format_temporal(
    field_type: FieldType,
    value: &Value,
    date: &str,
    time: &str,
    datetime: &str,
) -> Value {
    let format = match field_type {
        FieldType::Date => date,
        FieldType::Time => time,
        FieldType::Datetime => datetime,
        _ => return value.clone(),
    };
    match value.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        Some(dt) => Value::String(dt.naive_utc().format(format).to_string()),
        None => value.clone(),
    }
}

/// Parse a temporal string with the given formats into a Unix timestamp.
/// Date-only values land on midnight, time-only values on 1970-01-01.
pub fn parse_timestamp(raw: &str, date: &str, time: &str, datetime: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, datetime) {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, date) {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
    }
    if let Ok(t) = NaiveTime::parse_from_str(raw, time) {
        return NaiveDate::from_ymd_opt(1970, 1, 1).map(|d| d.and_time(t).and_utc().timestamp());
    }
    None
}

/// SQL value for parameterized queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl SqlValue {
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::from(*i),
            SqlValue::Real(f) => Value::from(*f),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

/// A named parameter; statements reference it as `:name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bind {
    pub name: String,
    pub value: SqlValue,
}

impl Bind {
    pub fn new(name: &str, value: SqlValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// What a `migrate` call did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub created: bool,
    pub added: Vec<String>,
    pub altered: Vec<String>,
    /// Changed columns the backend cannot alter in place
    pub skipped: Vec<String>,
    pub statements: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements that altered an existing source
    pub fn alter_count(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| s.trim_start().to_uppercase().starts_with("ALTER"))
            .count()
    }
}

/// Database adapter errors
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unsupported by this adapter: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for AdapterError {
    fn from(e: rusqlite::Error) -> Self {
        AdapterError::Statement(e.to_string())
    }
}

impl From<NoSqlError> for AdapterError {
    fn from(e: NoSqlError) -> Self {
        match e {
            NoSqlError::Io(e) => AdapterError::Io(e),
            NoSqlError::Json(e) => AdapterError::Json(e),
            NoSqlError::StoreNotFound(path) => {
                AdapterError::Connection(format!("Document store not found: {}", path.display()))
            }
            NoSqlError::InvalidCollectionName(msg) => AdapterError::Schema(msg),
            other => AdapterError::Statement(other.to_string()),
        }
    }
}

/// Write adapter plus the optional read replica
#[derive(Clone)]
pub struct AdapterSet {
    pub write: Rc<dyn Adapter>,
    pub read: Option<Rc<dyn Adapter>>,
}

/// Build the adapters a configuration describes. Failures are immediate.
pub fn connect(config: &DatabaseConfig, log: Rc<dyn QueryLog>) -> AdapterResult<AdapterSet> {
    let write = connect_one(config.adapter, &config.connection, log.clone())?;
    let read = config
        .read
        .as_ref()
        .map(|read| connect_one(config.adapter, read, log.clone()))
        .transpose()?;
    Ok(AdapterSet { write, read })
}

fn connect_one(
    kind: AdapterKind,
    connection: &ConnectionConfig,
    log: Rc<dyn QueryLog>,
) -> AdapterResult<Rc<dyn Adapter>> {
    tracing::debug!(adapter = ?kind, host = %connection.host, "connecting");
    match kind {
        AdapterKind::Sqlite => {
            let driver = SqliteDriver::connect(connection)?;
            Ok(Rc::new(SqlAdapter::new(driver, Box::new(Sqlite), log)))
        }
        AdapterKind::Document => Ok(Rc::new(DocumentAdapter::open(connection, log)?)),
        AdapterKind::Mysql => Err(AdapterError::Connection(format!(
            "No MySQL driver is bundled; cannot connect to '{}'",
            connection.host
        ))),
    }
}
