//! SQL Dialects
//!
//! Everything backend-specific about SQL text lives behind the `Dialect`
//! trait: identifier quoting, type mapping, column/table DDL, live schema
//! inspection and LIMIT rendering. A new backend plugs in here without the
//! query builder knowing about it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::{Bind, SqlValue};
use crate::engine::schema::{FieldDef, FieldType};
use crate::engine::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Sqlite,
    Mysql,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Mysql => write!(f, "mysql"),
        }
    }
}

/// A column as the live database reports it
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub name: String,
    pub col_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary: bool,
}

/// Literal text of a declared default, as a database would report it
pub fn default_literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Strip quoting from a reported default; `NULL` means none
fn normalize_live_default(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.eq_ignore_ascii_case("null") {
        return None;
    }
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
        .unwrap_or_else(|| raw.to_string());
    Some(unquoted)
}

/// Lowercase, single-spaced, integer display widths removed
fn normalize_type(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let collapsed = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    let is_int_family = ["tinyint", "smallint", "mediumint", "bigint", "int"]
        .iter()
        .any(|t| collapsed.starts_with(t));
    if !is_int_family {
        return collapsed;
    }
    match (collapsed.find('('), collapsed.find(')')) {
        (Some(open), Some(close)) if open < close => {
            format!("{}{}", &collapsed[..open], &collapsed[close + 1..])
        }
        _ => collapsed,
    }
}

fn live_str<'a>(row: &'a Row, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| row.get(*k).and_then(Value::as_str))
}

fn live_flag(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

pub trait Dialect {
    fn kind(&self) -> SqlDialect;

    /// Quote an identifier (table or column name)
    fn quote_ident(&self, name: &str) -> String;

    fn escape(&self, raw: &str) -> String {
        format!("'{}'", raw.replace('\'', "''"))
    }

    /// Column type for a field, including length and sign
    fn map_type(&self, field: &FieldDef) -> String;

    /// Rendered DEFAULT literal
    fn render_default(&self, field: &FieldDef) -> Option<String> {
        let value = field.default.as_ref()?;
        let literal = default_literal(value)?;
        match value {
            Value::Number(_) | Value::Bool(_) => Some(literal),
            _ => Some(self.escape(&literal)),
        }
    }

    fn render_field_create_syntax(&self, field: &FieldDef) -> String;

    /// CREATE statements for a table whose columns are already rendered
    fn render_table_create_syntax(
        &self,
        table: &str,
        fields: &[FieldDef],
        columns: &[String],
    ) -> Vec<String>;

    fn render_field_alter_syntax(&self, field: &FieldDef, add: bool) -> String;

    /// ALTER statements for rendered column changes. `added` are the fields
    /// being introduced, for any key clauses they carry.
    fn render_table_alter_syntax(
        &self,
        table: &str,
        added: &[&FieldDef],
        columns: &[String],
    ) -> Vec<String>;

    /// Whether existing columns can be changed in place
    fn supports_modify(&self) -> bool;

    /// Statement listing the live columns of a table
    fn inspect_columns(&self, database: Option<&str>, table: &str) -> (String, Vec<Bind>);

    fn parse_live_column(&self, row: &Row) -> Option<LiveColumn>;

    /// Whether the declared field no longer matches its live column
    fn column_differs(&self, field: &FieldDef, live: &LiveColumn) -> bool {
        let declared_default = field.default.as_ref().and_then(default_literal);
        normalize_type(&self.map_type(field)) != normalize_type(&live.col_type)
            || declared_default != normalize_live_default(live.default.as_deref())
    }

    /// Table holding identity sequences, if the backend keeps one
    fn sequence_table(&self) -> Option<&'static str> {
        None
    }

    fn render_truncate(&self, table: &str, reset_sequence: bool) -> Vec<String>;

    fn render_drop(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(table))
    }

    fn render_create_database(&self, name: &str) -> Option<String>;

    fn render_drop_database(&self, name: &str) -> Option<String>;

    /// LIMIT value meaning "no limit", for offset-only queries
    fn unbounded_limit(&self) -> &'static str;

    fn render_limit(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {}", l)),
            (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
            (None, Some(o)) => Some(format!("LIMIT {} OFFSET {}", self.unbounded_limit(), o)),
        }
    }
}

/// SQLite: executable through `SqliteDriver`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Sqlite {
    fn index_name(prefix: &str, table: &str, field: &str) -> String {
        format!("{}_{}_{}", prefix, table, field)
    }

    fn index_statement(&self, table: &str, field: &FieldDef) -> Option<String> {
        let (keyword, prefix) = if field.unique && !field.primary {
            ("UNIQUE INDEX", "uniq")
        } else if field.indexed && !field.primary {
            ("INDEX", "idx")
        } else {
            return None;
        };
        Some(format!(
            "CREATE {} IF NOT EXISTS {} ON {} ({})",
            keyword,
            self.quote_ident(&Self::index_name(prefix, table, &field.name)),
            self.quote_ident(table),
            self.quote_ident(&field.name)
        ))
    }
}

impl Dialect for Sqlite {
    fn kind(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn map_type(&self, field: &FieldDef) -> String {
        match field.field_type {
            t if t.is_string() => match field.effective_length() {
                Some(len) => format!("VARCHAR({})", len),
                None => "VARCHAR".into(),
            },
            FieldType::Int => "INTEGER".into(),
            FieldType::Bool => "TINYINT(1)".into(),
            FieldType::Float | FieldType::Double => "REAL".into(),
            _ => "TEXT".into(),
        }
    }

    fn render_field_create_syntax(&self, field: &FieldDef) -> String {
        let name = self.quote_ident(&field.name);
        if field.primary && field.auto_increment {
            return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name);
        }

        let mut def = format!("{} {}", name, self.map_type(field));
        if field.primary {
            def.push_str(" PRIMARY KEY");
        } else if !field.allows_null() {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = self.render_default(field) {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }

    fn render_table_create_syntax(
        &self,
        table: &str,
        fields: &[FieldDef],
        columns: &[String],
    ) -> Vec<String> {
        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.quote_ident(table),
            columns.join(",\n  ")
        )];
        statements.extend(fields.iter().filter_map(|f| self.index_statement(table, f)));
        statements
    }

    fn render_field_alter_syntax(&self, field: &FieldDef, add: bool) -> String {
        // Added columns cannot carry PRIMARY KEY or UNIQUE, and NOT NULL
        // needs a default to fill existing rows.
        let mut def = format!("{} {}", self.quote_ident(&field.name), self.map_type(field));
        let default = self.render_default(field);
        if !field.allows_null() && default.is_some() {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        if add {
            format!("ADD COLUMN {}", def)
        } else {
            format!("MODIFY {}", def)
        }
    }

    fn render_table_alter_syntax(
        &self,
        table: &str,
        added: &[&FieldDef],
        columns: &[String],
    ) -> Vec<String> {
        let mut statements: Vec<String> = columns
            .iter()
            .map(|column| format!("ALTER TABLE {} {}", self.quote_ident(table), column))
            .collect();
        statements.extend(added.iter().filter_map(|f| self.index_statement(table, f)));
        statements
    }

    fn supports_modify(&self) -> bool {
        false
    }

    fn inspect_columns(&self, _database: Option<&str>, table: &str) -> (String, Vec<Bind>) {
        (format!("PRAGMA table_info({})", self.quote_ident(table)), Vec::new())
    }

    fn parse_live_column(&self, row: &Row) -> Option<LiveColumn> {
        Some(LiveColumn {
            name: live_str(row, &["name"])?.to_string(),
            col_type: live_str(row, &["type"]).unwrap_or_default().to_string(),
            nullable: !live_flag(row, "notnull"),
            default: live_str(row, &["dflt_value"]).map(String::from),
            primary: live_flag(row, "pk"),
        })
    }

    fn sequence_table(&self) -> Option<&'static str> {
        Some("sqlite_sequence")
    }

    fn render_truncate(&self, table: &str, reset_sequence: bool) -> Vec<String> {
        let mut statements = vec![format!("DELETE FROM {}", self.quote_ident(table))];
        if reset_sequence {
            statements.push(format!(
                "DELETE FROM sqlite_sequence WHERE name = {}",
                self.escape(table)
            ));
        }
        statements
    }

    fn render_create_database(&self, _name: &str) -> Option<String> {
        None
    }

    fn render_drop_database(&self, _name: &str) -> Option<String> {
        None
    }

    fn unbounded_limit(&self) -> &'static str {
        "-1"
    }
}

/// MySQL: statement rendering and live inspection through
/// `information_schema`
#[derive(Debug, Clone)]
pub struct Mysql {
    pub engine: String,
    pub charset: String,
    pub collate: String,
}

impl Default for Mysql {
    fn default() -> Self {
        Self {
            engine: "InnoDB".into(),
            charset: "utf8".into(),
            collate: "utf8_unicode_ci".into(),
        }
    }
}

impl Mysql {
    fn key_clauses(&self, field: &FieldDef) -> Vec<String> {
        let name = self.quote_ident(&field.name);
        if field.unique && !field.primary {
            vec![format!("UNIQUE KEY {} ({})", name, name)]
        } else if field.indexed && !field.primary {
            vec![format!("KEY {} ({})", name, name)]
        } else {
            Vec::new()
        }
    }
}

impl Dialect for Mysql {
    fn kind(&self) -> SqlDialect {
        SqlDialect::Mysql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn escape(&self, raw: &str) -> String {
        format!("'{}'", raw.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn map_type(&self, field: &FieldDef) -> String {
        let base = match field.field_type {
            FieldType::String
            | FieldType::Email
            | FieldType::Url
            | FieldType::Tel
            | FieldType::Password => "varchar",
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::Bool => "tinyint",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Time => "time",
            FieldType::Relation => "text",
        };
        let mut syntax = match field.effective_length() {
            Some(len) => format!("{}({})", base, len),
            None => base.to_string(),
        };
        let numeric = matches!(
            field.field_type,
            FieldType::Int | FieldType::Float | FieldType::Double
        );
        if numeric && field.is_unsigned() {
            syntax.push_str(" unsigned");
        }
        syntax
    }

    fn render_field_create_syntax(&self, field: &FieldDef) -> String {
        let mut syntax = format!("{} {}", self.quote_ident(&field.name), self.map_type(field));
        if field.field_type.is_string() || field.field_type == FieldType::Text {
            syntax.push_str(&format!(" COLLATE {}", self.collate));
        }
        let nullable = field.allows_null();
        if !nullable {
            syntax.push_str(" NOT NULL");
        }
        match self.render_default(field) {
            Some(default) => syntax.push_str(&format!(" DEFAULT {}", default)),
            None if nullable => syntax.push_str(" DEFAULT NULL"),
            None => {}
        }
        if field.primary && field.auto_increment {
            syntax.push_str(" AUTO_INCREMENT");
        }
        syntax
    }

    fn render_default(&self, field: &FieldDef) -> Option<String> {
        let literal = default_literal(field.default.as_ref()?)?;
        Some(self.escape(&literal))
    }

    fn render_table_create_syntax(
        &self,
        table: &str,
        fields: &[FieldDef],
        columns: &[String],
    ) -> Vec<String> {
        let mut syntax = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}",
            self.quote_ident(table),
            columns.join(",\n")
        );
        for field in fields {
            if field.primary {
                syntax.push_str(&format!("\n, PRIMARY KEY({})", self.quote_ident(&field.name)));
            }
            for clause in self.key_clauses(field) {
                syntax.push_str(&format!("\n, {}", clause));
            }
        }
        syntax.push_str(&format!(
            "\n) ENGINE={} DEFAULT CHARSET={} COLLATE={}",
            self.engine, self.charset, self.collate
        ));
        vec![syntax]
    }

    fn render_field_alter_syntax(&self, field: &FieldDef, add: bool) -> String {
        let prefix = if add { "ADD COLUMN" } else { "MODIFY" };
        format!("{} {}", prefix, self.render_field_create_syntax(field))
    }

    fn render_table_alter_syntax(
        &self,
        table: &str,
        added: &[&FieldDef],
        columns: &[String],
    ) -> Vec<String> {
        let mut clauses = columns.to_vec();
        for field in added {
            clauses.extend(self.key_clauses(field).into_iter().map(|k| format!("ADD {}", k)));
        }
        vec![format!(
            "ALTER TABLE {}\n{}",
            self.quote_ident(table),
            clauses.join(",\n")
        )]
    }

    fn supports_modify(&self) -> bool {
        true
    }

    fn inspect_columns(&self, database: Option<&str>, table: &str) -> (String, Vec<Bind>) {
        let mut binds = vec![Bind::new("table_name", SqlValue::Text(table.to_string()))];
        let schema = match database {
            Some(db) => {
                binds.push(Bind::new("table_schema", SqlValue::Text(db.to_string())));
                ":table_schema"
            }
            None => "DATABASE()",
        };
        (
            format!(
                "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY \
                 FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = :table_name \
                 ORDER BY ORDINAL_POSITION",
                schema
            ),
            binds,
        )
    }

    fn parse_live_column(&self, row: &Row) -> Option<LiveColumn> {
        Some(LiveColumn {
            name: live_str(row, &["COLUMN_NAME", "column_name"])?.to_string(),
            col_type: live_str(row, &["COLUMN_TYPE", "column_type"])
                .unwrap_or_default()
                .to_string(),
            nullable: live_str(row, &["IS_NULLABLE", "is_nullable"]) == Some("YES"),
            default: live_str(row, &["COLUMN_DEFAULT", "column_default"]).map(String::from),
            primary: live_str(row, &["COLUMN_KEY", "column_key"]) == Some("PRI"),
        })
    }

    fn render_truncate(&self, table: &str, _reset_sequence: bool) -> Vec<String> {
        vec![format!("TRUNCATE TABLE {}", self.quote_ident(table))]
    }

    fn render_create_database(&self, name: &str) -> Option<String> {
        Some(format!("CREATE DATABASE {}", self.quote_ident(name)))
    }

    fn render_drop_database(&self, name: &str) -> Option<String> {
        Some(format!("DROP DATABASE {}", self.quote_ident(name)))
    }

    fn unbounded_limit(&self) -> &'static str {
        "18446744073709551615"
    }
}
