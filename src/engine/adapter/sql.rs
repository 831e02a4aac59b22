//! SQL Adapter
//!
//! One adapter for every SQL backend: statement text comes from a `Dialect`,
//! execution goes through a `Driver`, and every executed statement is written
//! to the query log first.

use serde_json::Value;
use std::rc::Rc;

use super::dialect::{Dialect, LiveColumn, SqlDialect};
use super::{Adapter, AdapterError, AdapterResult, Bind, MigrationReport};
use crate::engine::collection::Collection;
use crate::engine::condition::SqlConditionRenderer;
use crate::engine::config::AdapterKind;
use crate::engine::log::QueryLog;
use crate::engine::query::Query;
use crate::engine::schema::{FieldDef, FieldType};
use crate::engine::Row;

/// Opaque connection handle an `SqlAdapter` executes through
pub trait Driver {
    /// Run a statement that returns no rows; yields the affected row count
    fn execute(&self, statement: &str, binds: &[Bind]) -> AdapterResult<u64>;

    fn query(&self, statement: &str, binds: &[Bind]) -> AdapterResult<Vec<Row>>;

    /// Identity generated by the last insert on this connection
    fn last_insert_id(&self) -> Value;

    /// Database name, when the connection was given one
    fn database(&self) -> Option<&str> {
        None
    }
}

pub struct SqlAdapter<D: Driver> {
    driver: D,
    dialect: Box<dyn Dialect>,
    log: Rc<dyn QueryLog>,
}

impl<D: Driver> SqlAdapter<D> {
    pub fn new(driver: D, dialect: Box<dyn Dialect>, log: Rc<dyn QueryLog>) -> Self {
        Self {
            driver,
            dialect,
            log,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn execute(&self, statement: &str, binds: &[Bind]) -> AdapterResult<u64> {
        self.log.record(statement, binds);
        self.driver.execute(statement, binds)
    }

    fn fetch(&self, statement: &str, binds: &[Bind]) -> AdapterResult<Vec<Row>> {
        self.log.record(statement, binds);
        self.driver.query(statement, binds)
    }

    /// SELECT statement and binds for a query
    pub fn render_select(&self, query: &Query) -> (String, Vec<Bind>) {
        let quote = |name: &str| self.dialect.quote_ident(name);
        let mut renderer = SqlConditionRenderer::new(&quote);

        let fields = if query.fields().is_empty() {
            "*".to_string()
        } else {
            query
                .fields()
                .iter()
                .map(|f| if f == "*" { f.clone() } else { renderer.column(f) })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", fields, renderer.column(query.source()));

        let conditions = renderer.groups(query.conditions());
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }

        if !query.grouping().is_empty() {
            let group: Vec<String> = query.grouping().iter().map(|g| renderer.column(g)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&group.join(", "));
        }

        if !query.ordering().is_empty() {
            let order: Vec<String> = query
                .ordering()
                .iter()
                .map(|(field, dir)| format!("{} {}", renderer.column(field), dir))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self
            .dialect
            .render_limit(query.limit_value(), query.offset_value())
        {
            sql.push(' ');
            sql.push_str(&limit);
        }

        (sql, renderer.into_binds())
    }

    /// Live columns of a table; empty when the table does not exist
    pub fn live_columns(&self, table: &str) -> AdapterResult<Vec<LiveColumn>> {
        let (statement, binds) = self.dialect.inspect_columns(self.driver.database(), table);
        let rows = self.fetch(&statement, &binds)?;
        Ok(rows
            .iter()
            .filter_map(|row| self.dialect.parse_live_column(row))
            .collect())
    }

    fn run_all(&self, statements: &[String]) -> AdapterResult<()> {
        for statement in statements {
            self.execute(statement, &[])?;
        }
        Ok(())
    }
}

impl<D: Driver> Adapter for SqlAdapter<D> {
    fn kind(&self) -> AdapterKind {
        match self.dialect.kind() {
            SqlDialect::Sqlite => AdapterKind::Sqlite,
            SqlDialect::Mysql => AdapterKind::Mysql,
        }
    }

    fn create(&self, source: &str, primary_key: &str, data: &Row) -> AdapterResult<Value> {
        let quote = |name: &str| self.dialect.quote_ident(name);
        let mut renderer = SqlConditionRenderer::new(&quote);

        let statement = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", renderer.column(source))
        } else {
            let mut columns = Vec::with_capacity(data.len());
            let mut placeholders = Vec::with_capacity(data.len());
            for (field, value) in data {
                columns.push(renderer.column(field));
                placeholders.push(renderer.bind(field, value));
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                renderer.column(source),
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        self.execute(&statement, renderer.binds())?;
        match data.get(primary_key) {
            Some(given) if !given.is_null() => Ok(given.clone()),
            _ => Ok(self.driver.last_insert_id()),
        }
    }

    fn read(&self, query: &Query) -> AdapterResult<Collection> {
        let (statement, binds) = self.render_select(query);
        let rows = self.fetch(&statement, &binds)?;
        Ok(query.mapper().collection(rows))
    }

    fn update(
        &self,
        source: &str,
        _primary_key: &str,
        data: &Row,
        conditions: &Row,
    ) -> AdapterResult<bool> {
        if data.is_empty() {
            return Ok(false);
        }

        let quote = |name: &str| self.dialect.quote_ident(name);
        let mut renderer = SqlConditionRenderer::new(&quote);

        let mut assignments = Vec::with_capacity(data.len());
        for (field, value) in data {
            let placeholder = renderer.bind(field, value);
            assignments.push(format!("{} = {}", renderer.column(field), placeholder));
        }

        let mut statement = format!(
            "UPDATE {} SET {}",
            renderer.column(source),
            assignments.join(", ")
        );
        let where_sql = renderer.conditions(conditions);
        if !where_sql.is_empty() {
            statement.push_str(" WHERE ");
            statement.push_str(&where_sql);
        }

        let affected = self.execute(&statement, renderer.binds())?;
        Ok(affected > 0)
    }

    fn delete(&self, source: &str, _primary_key: &str, conditions: &Row) -> AdapterResult<bool> {
        if conditions.is_empty() {
            return Err(AdapterError::Statement(format!(
                "Refusing to delete from '{}' without conditions; use truncate",
                source
            )));
        }

        let quote = |name: &str| self.dialect.quote_ident(name);
        let mut renderer = SqlConditionRenderer::new(&quote);
        let where_sql = renderer.conditions(conditions);
        let statement = format!("DELETE FROM {} WHERE {}", renderer.column(source), where_sql);

        self.execute(&statement, renderer.binds())?;
        Ok(true)
    }

    fn truncate(&self, source: &str) -> AdapterResult<bool> {
        let reset_sequence = match self.dialect.sequence_table() {
            Some(table) => !self.live_columns(table)?.is_empty(),
            None => false,
        };
        self.run_all(&self.dialect.render_truncate(source, reset_sequence))?;
        Ok(true)
    }

    fn drop(&self, source: &str) -> AdapterResult<bool> {
        self.execute(&self.dialect.render_drop(source), &[])?;
        Ok(true)
    }

    fn create_database(&self, name: &str) -> AdapterResult<bool> {
        let statement = self.dialect.render_create_database(name).ok_or_else(|| {
            AdapterError::Unsupported(format!("{} cannot create databases", self.dialect.kind()))
        })?;
        self.execute(&statement, &[])?;
        Ok(true)
    }

    fn drop_database(&self, name: &str) -> AdapterResult<bool> {
        let statement = self.dialect.render_drop_database(name).ok_or_else(|| {
            AdapterError::Unsupported(format!("{} cannot drop databases", self.dialect.kind()))
        })?;
        self.execute(&statement, &[])?;
        Ok(true)
    }

    fn migrate(&self, source: &str, fields: &[FieldDef]) -> AdapterResult<MigrationReport> {
        let declared: Vec<FieldDef> = fields
            .iter()
            .filter(|f| f.field_type != FieldType::Relation)
            .cloned()
            .collect();
        let live = self.live_columns(source)?;
        let mut report = MigrationReport::default();

        if live.is_empty() {
            let columns: Vec<String> = declared
                .iter()
                .map(|f| self.dialect.render_field_create_syntax(f))
                .collect();
            let statements = self
                .dialect
                .render_table_create_syntax(source, &declared, &columns);
            self.run_all(&statements)?;

            tracing::info!(source = %source, columns = declared.len(), "created source");
            report.created = true;
            report.statements = statements;
            return Ok(report);
        }

        let mut columns = Vec::new();
        let mut added: Vec<&FieldDef> = Vec::new();
        for field in &declared {
            match live.iter().find(|c| c.name == field.name) {
                None => {
                    columns.push(self.dialect.render_field_alter_syntax(field, true));
                    added.push(field);
                    report.added.push(field.name.clone());
                }
                Some(column) if self.dialect.column_differs(field, column) => {
                    if self.dialect.supports_modify() {
                        columns.push(self.dialect.render_field_alter_syntax(field, false));
                        report.altered.push(field.name.clone());
                    } else {
                        tracing::warn!(
                            source = %source,
                            column = %field.name,
                            live_type = %column.col_type,
                            declared_type = %self.dialect.map_type(field),
                            "column differs but cannot be altered in place; skipping"
                        );
                        report.skipped.push(field.name.clone());
                    }
                }
                Some(_) => {}
            }
        }

        if columns.is_empty() {
            tracing::debug!(source = %source, "schema up to date");
            return Ok(report);
        }

        let statements = self
            .dialect
            .render_table_alter_syntax(source, &added, &columns);
        self.run_all(&statements)?;
        tracing::info!(
            source = %source,
            added = report.added.len(),
            altered = report.altered.len(),
            "altered source"
        );
        report.statements = statements;
        Ok(report)
    }

    fn escape(&self, raw: &str) -> String {
        self.dialect.escape(raw)
    }

    fn raw_rows(&self, statement: &str, binds: &[Bind]) -> AdapterResult<Vec<Row>> {
        self.fetch(statement, binds)
    }
}
