//! Filter documents for the document store
//!
//! Filters are Mongo-style JSON: `{"status": {"$in": [3, 4]}}`,
//! `{"$or": [{...}, {...}]}`. Comparisons against a missing or null field
//! never match, except an explicit `null` equality.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::document::Document;
use super::error::{NoSqlError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// SQL LIKE pattern with `%` and `_`
    Like(String),
    Exists(bool),
}

impl FilterOp {
    fn parse(op: &str, value: &Value) -> Result<Self> {
        let list = |v: &Value| match v {
            Value::Array(items) => Ok(items.clone()),
            other => Err(NoSqlError::Filter(format!("{} expects an array, got {}", op, other))),
        };
        Ok(match op {
            "$eq" => FilterOp::Eq(value.clone()),
            "$ne" => FilterOp::Ne(value.clone()),
            "$gt" => FilterOp::Gt(value.clone()),
            "$gte" => FilterOp::Gte(value.clone()),
            "$lt" => FilterOp::Lt(value.clone()),
            "$lte" => FilterOp::Lte(value.clone()),
            "$in" => FilterOp::In(list(value)?),
            "$nin" => FilterOp::NotIn(list(value)?),
            "$like" => match value {
                Value::String(s) => FilterOp::Like(s.clone()),
                other => FilterOp::Like(other.to_string()),
            },
            "$exists" => FilterOp::Exists(value.as_bool().unwrap_or(true)),
            other => return Err(NoSqlError::Filter(format!("unknown operator {}", other))),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { field: String, op: FilterOp },
}

impl Filter {
    pub fn field(field: &str, op: FilterOp) -> Self {
        Filter::Field {
            field: field.to_string(),
            op,
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::field(field, FilterOp::Eq(value.into()))
    }

    /// Parse a filter document
    pub fn parse(doc: &Value) -> Result<Self> {
        match doc {
            Value::Object(map) => Self::parse_map(map),
            other => Err(NoSqlError::Filter(format!("filter must be an object, got {}", other))),
        }
    }

    fn parse_map(map: &Map<String, Value>) -> Result<Self> {
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$and" | "$or" => {
                    let Value::Array(items) = value else {
                        return Err(NoSqlError::Filter(format!("{} expects an array", key)));
                    };
                    let parts = items.iter().map(Self::parse).collect::<Result<Vec<_>>>()?;
                    clauses.push(if key == "$and" {
                        Filter::And(parts)
                    } else {
                        Filter::Or(parts)
                    });
                }
                k if k.starts_with('$') => {
                    return Err(NoSqlError::Filter(format!("unknown operator {}", k)));
                }
                field => match value {
                    Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                        for (op, operand) in ops {
                            clauses.push(Self::field(field, FilterOp::parse(op, operand)?));
                        }
                    }
                    other => clauses.push(Self::field(field, FilterOp::Eq(other.clone()))),
                },
            }
        }
        Ok(match clauses.len() {
            0 => Filter::All,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        })
    }

    /// Check if a document matches this filter
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::And(parts) => parts.iter().all(|p| p.matches(doc)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(doc)),
            Filter::Field { field, op } => op_matches(op, doc.get(field)),
        }
    }
}

fn op_matches(op: &FilterOp, value: Option<&Value>) -> bool {
    let present = value.filter(|v| !v.is_null());

    match (op, present) {
        (FilterOp::Exists(should_exist), _) => value.is_some() == *should_exist,
        (FilterOp::Eq(Value::Null), actual) => actual.is_none(),
        (_, None) => false,
        (FilterOp::Eq(expected), Some(actual)) => values_equal(actual, expected),
        (FilterOp::Ne(expected), Some(actual)) => !values_equal(actual, expected),
        (FilterOp::Gt(expected), Some(actual)) => {
            compare_values(actual, expected) == Some(Ordering::Greater)
        }
        (FilterOp::Gte(expected), Some(actual)) => {
            matches!(compare_values(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        (FilterOp::Lt(expected), Some(actual)) => {
            compare_values(actual, expected) == Some(Ordering::Less)
        }
        (FilterOp::Lte(expected), Some(actual)) => {
            matches!(compare_values(actual, expected), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOp::In(values), Some(actual)) => values.iter().any(|v| values_equal(actual, v)),
        (FilterOp::NotIn(values), Some(actual)) => !values.iter().any(|v| values_equal(actual, v)),
        (FilterOp::Like(pattern), Some(actual)) => match actual {
            Value::String(s) => like_matches(pattern, s),
            other => like_matches(pattern, &other.to_string()),
        },
    }
}

/// Compare two JSON values
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// ASCII case-insensitive LIKE
fn like_matches(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let t: Vec<char> = text.to_ascii_lowercase().chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((bp, bt)) = backtrack {
            pi = bp + 1;
            ti = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

/// Filter plus ordering and paging, applied to a set of documents
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub filter: Filter,
    /// Field and descending flag, in priority order
    pub sort: Vec<(String, bool)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self {
            filter: Filter::All,
            sort: Vec::new(),
            skip: 0,
            limit: None,
        }
    }
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, field: &str, desc: bool) -> Self {
        self.sort.push((field.to_string(), desc));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut results: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .collect();

        if !self.sort.is_empty() {
            results.sort_by(|a, b| {
                for (field, desc) in &self.sort {
                    let ordering = match (a.get(field), b.get(field)) {
                        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    let ordering = if *desc { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let results = results.into_iter().skip(self.skip);
        match self.limit {
            Some(n) => results.take(n).collect(),
            None => results.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn test_filter_eq() {
        let d = doc(json!({"name": "Alice", "age": 30}));
        assert!(Filter::eq("name", "Alice").matches(&d));
        assert!(!Filter::eq("name", "Bob").matches(&d));
        assert!(Filter::eq("age", 30.0).matches(&d));
    }

    #[test]
    fn test_parse_nested() {
        let filter = Filter::parse(&json!({
            "$or": [
                {"$and": [{"status": {"$in": [3, 4, 5]}}]},
                {"$and": [{"name": {"$like": "al%"}}]}
            ]
        }))
        .unwrap();
        assert!(filter.matches(&doc(json!({"status": 4, "name": "Zed"}))));
        assert!(filter.matches(&doc(json!({"status": 9, "name": "Alice"}))));
        assert!(!filter.matches(&doc(json!({"status": 9, "name": "Bob"}))));
    }

    #[test]
    fn test_null_semantics() {
        let is_null = Filter::parse(&json!({"deleted_at": null})).unwrap();
        assert!(is_null.matches(&doc(json!({"id": 1}))));
        assert!(is_null.matches(&doc(json!({"deleted_at": null}))));
        assert!(!is_null.matches(&doc(json!({"deleted_at": "2024-01-01"}))));

        let nin = Filter::parse(&json!({"status": {"$nin": [1]}})).unwrap();
        assert!(!nin.matches(&doc(json!({"status": null}))));
        assert!(nin.matches(&doc(json!({"status": 2}))));
    }

    #[test]
    fn test_unknown_operator() {
        assert!(Filter::parse(&json!({"a": {"$regex": "x"}})).is_err());
        assert!(Filter::parse(&json!(["a"])).is_err());
    }

    #[test]
    fn test_like() {
        assert!(like_matches("a%", "abc"));
        assert!(like_matches("%b%", "abc"));
        assert!(like_matches("a_c", "ABC"));
        assert!(!like_matches("a_c", "abbc"));
        assert!(like_matches("%", ""));
    }

    #[test]
    fn test_find_sort_skip_limit() {
        let docs = vec![
            doc(json!({"name": "Alice", "age": 30})),
            doc(json!({"name": "Bob", "age": 25})),
            doc(json!({"name": "Charlie", "age": 35})),
        ];

        let results = FindQuery::new(Filter::field("age", FilterOp::Gte(json!(25))))
            .sort("age", true)
            .skip(1)
            .limit(1)
            .execute(docs);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("name"), Some(&json!("Alice")));
    }
}
