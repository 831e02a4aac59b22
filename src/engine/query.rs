//! Query builder
//!
//! Accumulates fields, source, condition groups, ordering, grouping and
//! limits, then hands itself to the mapper's read adapter. The last result is
//! cached until a builder call changes the query.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::fmt;

use super::collection::Collection;
use super::condition::{groups_from_value, Combinator, ConditionGroup};
use super::entity::Entity;
use super::error::Result;
use super::mapper::Mapper;
use super::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Case-insensitive; anything but `desc` sorts ascending
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    mapper: Mapper,
    fields: Vec<String>,
    source: String,
    conditions: Vec<ConditionGroup>,
    order: Vec<(String, SortDirection)>,
    group: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    result: OnceCell<Collection>,
}

impl Query {
    pub fn new(mapper: Mapper) -> Self {
        let source = mapper.source().to_string();
        Self {
            mapper,
            fields: Vec::new(),
            source,
            conditions: Vec::new(),
            order: Vec::new(),
            group: Vec::new(),
            limit: None,
            offset: None,
            result: OnceCell::new(),
        }
    }

    fn changed(mut self) -> Self {
        self.result = OnceCell::new();
        self
    }

    /// Replace the field list. Conditions are kept.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self.changed()
    }

    pub fn from(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self.changed()
    }

    /// Append a condition group with explicit combinators
    pub fn where_with(mut self, conditions: Row, inner: Combinator, outer: Combinator) -> Self {
        self.conditions
            .push(ConditionGroup::new(conditions, inner, outer));
        self.changed()
    }

    pub fn where_clause(self, conditions: Row) -> Self {
        self.where_with(conditions, Combinator::And, Combinator::And)
    }

    pub fn and_where(self, conditions: Row) -> Self {
        self.where_with(conditions, Combinator::And, Combinator::And)
    }

    pub fn or_where(self, conditions: Row) -> Self {
        self.where_with(conditions, Combinator::And, Combinator::Or)
    }

    /// Append groups from a JSON payload: a flat object is one AND group,
    /// an array holds `{conditions, type, setType}` records
    pub fn where_value(mut self, payload: &Value) -> Result<Self> {
        self.conditions.extend(groups_from_value(payload)?);
        Ok(self.changed())
    }

    /// Ordering an already ordered field replaces its direction in place
    pub fn order(mut self, field: &str, direction: SortDirection) -> Self {
        match self.order.iter_mut().find(|(f, _)| f == field) {
            Some(entry) => entry.1 = direction,
            None => self.order.push((field.to_string(), direction)),
        }
        self.changed()
    }

    pub fn group(mut self, fields: &[&str]) -> Self {
        self.group.extend(fields.iter().map(|f| f.to_string()));
        self.changed()
    }

    /// `limit(None, None)` removes both clauses
    pub fn limit(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self.changed()
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn conditions(&self) -> &[ConditionGroup] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[(String, SortDirection)] {
        &self.order
    }

    pub fn grouping(&self) -> &[String] {
        &self.group
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Whether a result is cached for the current builder state
    pub fn is_executed(&self) -> bool {
        self.result.get().is_some()
    }

    /// Run through the read adapter, or return the cached result
    pub fn execute(&self) -> Result<&Collection> {
        if let Some(result) = self.result.get() {
            return Ok(result);
        }
        let collection = self.mapper.adapter_read().read(self)?;
        Ok(self.result.get_or_init(|| collection))
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.execute()?.len())
    }

    pub fn first(&self) -> Result<Option<&Entity>> {
        Ok(self.execute()?.first())
    }

    pub fn iter(&self) -> Result<std::slice::Iter<'_, Entity>> {
        Ok(self.execute()?.iter())
    }

    pub(crate) fn cached_mut(&mut self) -> Option<&mut Collection> {
        self.result.get_mut()
    }

    /// Take the result, executing first if needed
    pub fn into_collection(self) -> Result<Collection> {
        self.execute()?;
        Ok(self.result.into_inner().unwrap_or_default())
    }
}
