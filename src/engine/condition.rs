//! Condition translation
//!
//! Turns backend-neutral condition maps into predicate fragments with bound
//! parameters. Keys are `<column>` or `<column>:<op>`; see [`parse_key`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::adapter::{Bind, SqlValue};
use super::error::{Error, Result};
use super::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Not,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Like,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token.to_ascii_lowercase().as_str() {
            "eq" | "=" => Operator::Eq,
            "ne" | "!=" | "<>" => Operator::Ne,
            "not" => Operator::Not,
            "gt" | ">" => Operator::Gt,
            "gte" | ">=" => Operator::Gte,
            "lt" | "<" => Operator::Lt,
            "lte" | "<=" => Operator::Lte,
            "in" => Operator::In,
            "like" => Operator::Like,
            _ => return None,
        };
        Some(op)
    }

    /// SQL comparison for a scalar right-hand side
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq | Operator::In => "=",
            Operator::Ne | Operator::Not => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
        }
    }

    fn negates_set(&self) -> bool {
        matches!(self, Operator::Not | Operator::Ne)
    }
}

/// Split a condition key into column and operator.
///
/// Only the text after the last `:` is considered, and only when it is a
/// known operator token. Anything else is part of the column, so
/// expressions like `SQRT(id)` or `data::text` are left intact.
pub fn parse_key(key: &str) -> (&str, Option<Operator>) {
    if let Some((column, suffix)) = key.rsplit_once(':') {
        if !column.is_empty() {
            if let Some(op) = Operator::from_token(suffix.trim()) {
                return (column.trim_end(), Some(op));
            }
        }
    }
    (key, None)
}

/// `[A-Za-z_][A-Za-z0-9_]*`, optionally dot-qualified
pub fn is_identifier(column: &str) -> bool {
    !column.is_empty()
        && column.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Column with every non-alphanumeric byte replaced by `_`
pub fn sanitize_param(column: &str) -> String {
    let name: String = column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() {
        "p".to_string()
    } else {
        name
    }
}

/// What a single `key => value` pair means once parsed
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<'a> {
    IsNull {
        column: &'a str,
    },
    Compare {
        column: &'a str,
        op: Operator,
        value: &'a Value,
    },
    InSet {
        column: &'a str,
        values: &'a [Value],
        negated: bool,
    },
}

impl<'a> Predicate<'a> {
    pub fn resolve(key: &'a str, value: &'a Value) -> Self {
        let (column, op) = parse_key(key);
        match value {
            Value::Null => Predicate::IsNull { column },
            Value::Array(values) => Predicate::InSet {
                column,
                values,
                negated: op.is_some_and(|o| o.negates_set()),
            },
            _ => Predicate::Compare {
                column,
                op: op.unwrap_or(Operator::Eq),
                value,
            },
        }
    }

    pub fn column(&self) -> &'a str {
        match self {
            Predicate::IsNull { column }
            | Predicate::Compare { column, .. }
            | Predicate::InSet { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => write!(f, "AND"),
            Combinator::Or => write!(f, "OR"),
        }
    }
}

/// One `where` call: its conditions, how they join each other, and how the
/// group joins whatever came before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub conditions: Row,
    #[serde(rename = "type", default)]
    pub inner: Combinator,
    #[serde(rename = "setType", default)]
    pub outer: Combinator,
}

impl ConditionGroup {
    pub fn new(conditions: Row, inner: Combinator, outer: Combinator) -> Self {
        Self {
            conditions,
            inner,
            outer,
        }
    }

    pub fn and(conditions: Row) -> Self {
        Self::new(conditions, Combinator::And, Combinator::And)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn predicates(&self) -> impl Iterator<Item = Predicate<'_>> {
        self.conditions
            .iter()
            .map(|(k, v)| Predicate::resolve(k, v))
    }
}

/// Read a condition payload. An array of `{conditions, type, setType}`
/// objects yields explicit groups; a flat object is one implicit AND group.
pub fn groups_from_value(value: &Value) -> Result<Vec<ConditionGroup>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) if map.get("conditions").is_some_and(Value::is_object) => {
            Ok(vec![serde_json::from_value(value.clone())?])
        }
        Value::Object(map) => Ok(vec![ConditionGroup::and(map.clone())]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) if map.contains_key("conditions") => {
                    Ok(serde_json::from_value(item.clone())?)
                }
                Value::Object(map) => Ok(ConditionGroup::and(map.clone())),
                other => Err(Error::config(format!(
                    "Condition group must be an object, got {}",
                    other
                ))),
            })
            .collect(),
        other => Err(Error::config(format!(
            "Conditions must be an object or a list of groups, got {}",
            other
        ))),
    }
}

/// Renders predicates to SQL, collecting bound parameters.
///
/// The parameter counter is shared by everything rendered through one
/// instance, so SET values and WHERE values of a single statement never
/// collide.
pub struct SqlConditionRenderer<'q> {
    quote: &'q dyn Fn(&str) -> String,
    counter: usize,
    binds: Vec<Bind>,
}

impl<'q> SqlConditionRenderer<'q> {
    pub fn new(quote: &'q dyn Fn(&str) -> String) -> Self {
        Self {
            quote,
            counter: 0,
            binds: Vec::new(),
        }
    }

    /// Quoted identifier, or the expression verbatim
    pub fn column(&self, column: &str) -> String {
        if is_identifier(column) {
            column
                .split('.')
                .map(|part| (self.quote)(part))
                .collect::<Vec<_>>()
                .join(".")
        } else {
            column.to_string()
        }
    }

    /// `p<counter>_<column>`; the counter leads so no two binds can collide
    fn param_name(&mut self, column: &str) -> String {
        let name = format!("p{}_{}", self.counter, sanitize_param(column));
        self.counter += 1;
        name
    }

    /// Bind one value and return its placeholder
    pub fn bind(&mut self, column: &str, value: &Value) -> String {
        let name = self.param_name(column);
        self.binds.push(Bind::new(&name, SqlValue::from(value)));
        format!(":{}", name)
    }

    fn bind_set(&mut self, column: &str, values: &[Value]) -> Vec<String> {
        let base = self.param_name(column);
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let name = format!("{}_{}", base, i);
                self.binds.push(Bind::new(&name, SqlValue::from(value)));
                format!(":{}", name)
            })
            .collect()
    }

    pub fn predicate(&mut self, predicate: &Predicate<'_>) -> String {
        match predicate {
            Predicate::IsNull { column } => format!("{} IS NULL", self.column(column)),
            Predicate::Compare { column, op, value } => {
                let placeholder = self.bind(column, value);
                format!("{} {} {}", self.column(column), op.sql(), placeholder)
            }
            Predicate::InSet {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let placeholders = self.bind_set(column, values).join(", ");
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", self.column(column), keyword, placeholders)
            }
        }
    }

    /// Groups in insertion order; the first rendered group has no leading
    /// combinator and empty groups are skipped
    pub fn groups(&mut self, groups: &[ConditionGroup]) -> String {
        let mut sql = String::new();
        for group in groups.iter().filter(|g| !g.is_empty()) {
            let parts: Vec<String> = group
                .predicates()
                .map(|p| self.predicate(&p))
                .collect();
            let joined = parts.join(&format!(" {} ", group.inner));
            if sql.is_empty() {
                sql = format!("({})", joined);
            } else {
                sql = format!("{} {} ({})", sql, group.outer, joined);
            }
        }
        sql
    }

    /// A flat map as a single AND group
    pub fn conditions(&mut self, conditions: &Row) -> String {
        self.groups(&[ConditionGroup::and(conditions.clone())])
    }

    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    pub fn into_binds(self) -> Vec<Bind> {
        self.binds
    }
}
