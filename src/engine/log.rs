//! Query log sinks
//!
//! Adapters write every executed statement and its bound parameters to an
//! injected `QueryLog`. The core never reads back from it.

use std::cell::RefCell;

use super::adapter::Bind;

pub trait QueryLog {
    fn record(&self, statement: &str, params: &[Bind]);
}

/// Emits one `tracing` debug event per statement
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingQueryLog;

impl QueryLog for TracingQueryLog {
    fn record(&self, statement: &str, params: &[Bind]) {
        tracing::debug!(
            target: "datamapper::query",
            statement = %statement,
            params = ?params,
            "executing statement"
        );
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullQueryLog;

impl QueryLog for NullQueryLog {
    fn record(&self, _statement: &str, _params: &[Bind]) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub statement: String,
    pub params: Vec<Bind>,
}

/// Append-only in-memory log, inspectable for diagnostics and tests
#[derive(Debug, Default)]
pub struct MemoryQueryLog {
    entries: RefCell<Vec<LoggedQuery>>,
}

impl MemoryQueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LoggedQuery> {
        self.entries.borrow().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|e| e.statement.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn last(&self) -> Option<LoggedQuery> {
        self.entries.borrow().last().cloned()
    }
}

impl QueryLog for MemoryQueryLog {
    fn record(&self, statement: &str, params: &[Bind]) {
        self.entries.borrow_mut().push(LoggedQuery {
            statement: statement.to_string(),
            params: params.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::SqlValue;

    #[test]
    fn test_memory_log_appends() {
        let log = MemoryQueryLog::new();
        assert!(log.is_empty());

        log.record("SELECT 1", &[]);
        log.record(
            "SELECT * FROM t WHERE id = :id0",
            &[Bind::new("id0", SqlValue::Integer(2))],
        );

        assert_eq!(log.len(), 2);
        let last = log.last().unwrap();
        assert_eq!(last.params[0].name, "id0");
        assert_eq!(log.statements()[0], "SELECT 1");
    }
}
