//! Document Adapter
//!
//! Runs mapper operations against the file-backed document store. Condition
//! groups become Mongo-style filter documents; the store is schemaless, so
//! migration always succeeds without doing anything.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{format_temporal, parse_timestamp, Adapter, AdapterError, AdapterResult, MigrationReport};
use crate::engine::collection::Collection;
use crate::engine::condition::{is_identifier, Combinator, ConditionGroup, Operator, Predicate};
use crate::engine::config::{AdapterKind, ConnectionConfig};
use crate::engine::log::QueryLog;
use crate::engine::nosql::document::identity_key;
use crate::engine::nosql::{Document, DocumentStore, Filter, FindQuery, NoSqlError};
use crate::engine::query::{Query, SortDirection};
use crate::engine::schema::{FieldDef, FieldType};
use crate::engine::Row;

pub const DEFAULT_DATABASE: &str = "default";

pub struct DocumentAdapter {
    root: PathBuf,
    store: DocumentStore,
    log: Rc<dyn QueryLog>,
}

impl DocumentAdapter {
    /// `host` is the store root; `database` names the store beneath it.
    /// Documents are keyed by the primary key of the mapper writing them.
    pub fn open(config: &ConnectionConfig, log: Rc<dyn QueryLog>) -> AdapterResult<Self> {
        if config.host.trim().is_empty() {
            return Err(AdapterError::Connection(
                "Document store root must be given as host".into(),
            ));
        }

        let root = PathBuf::from(&config.host);
        std::fs::create_dir_all(&root).map_err(|e| {
            AdapterError::Connection(format!("Cannot create store root {}: {}", root.display(), e))
        })?;

        let database = config.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        let store = DocumentStore::open_or_create(&root, database)
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        Ok(Self { root, store, log })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    fn record(&self, source: &str, op: &str, payload: &Value) {
        self.log
            .record(&format!("db.{}.{}({})", source, op, payload), &[]);
    }

    fn matching(&self, source: &str, filter: &Value) -> AdapterResult<Vec<Document>> {
        if !self.store.collection_exists(source) {
            return Ok(Vec::new());
        }
        let find = FindQuery::new(Filter::parse(filter)?);
        Ok(self.store.collection(source)?.find(&find)?)
    }

    fn filter_for(conditions: &Row) -> AdapterResult<Value> {
        filter_document(&[ConditionGroup::and(conditions.clone())])
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn predicate_document(predicate: &Predicate<'_>) -> AdapterResult<Value> {
    let column = predicate.column();
    if !is_identifier(column) {
        return Err(AdapterError::Unsupported(format!(
            "expression condition '{}' on a document store",
            column
        )));
    }

    Ok(match predicate {
        Predicate::IsNull { .. } => single(column, Value::Null),
        Predicate::Compare { op, value, .. } => {
            let op = match op {
                Operator::Eq | Operator::In => "$eq",
                Operator::Ne | Operator::Not => "$ne",
                Operator::Gt => "$gt",
                Operator::Gte => "$gte",
                Operator::Lt => "$lt",
                Operator::Lte => "$lte",
                Operator::Like => "$like",
            };
            single(column, single(op, (*value).clone()))
        }
        Predicate::InSet {
            values, negated, ..
        } => {
            let op = if *negated { "$nin" } else { "$in" };
            single(column, single(op, Value::Array(values.to_vec())))
        }
    })
}

/// Translate condition groups into a filter document.
///
/// Groups joined by AND bind tighter than groups joined by OR, so the result
/// is an `$or` of `$and` runs, matching how the SQL rendering reads.
pub fn filter_document(groups: &[ConditionGroup]) -> AdapterResult<Value> {
    let mut runs: Vec<Vec<Value>> = Vec::new();

    for group in groups.iter().filter(|g| !g.is_empty()) {
        let clauses = group
            .predicates()
            .map(|p| predicate_document(&p))
            .collect::<AdapterResult<Vec<_>>>()?;
        let key = match group.inner {
            Combinator::And => "$and",
            Combinator::Or => "$or",
        };
        let doc = single(key, Value::Array(clauses));

        match runs.last_mut() {
            Some(run) if group.outer == Combinator::And => run.push(doc),
            _ => runs.push(vec![doc]),
        }
    }

    Ok(match runs.len() {
        0 => Value::Object(Map::new()),
        1 => single("$and", Value::Array(runs.remove(0))),
        _ => single(
            "$or",
            Value::Array(
                runs.into_iter()
                    .map(|run| single("$and", Value::Array(run)))
                    .collect(),
            ),
        ),
    })
}

impl Adapter for DocumentAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Document
    }

    fn create(&self, source: &str, primary_key: &str, data: &Row) -> AdapterResult<Value> {
        self.record(source, "insert", &Value::Object(data.clone()));
        let collection = self.store.collection_or_create(source)?;
        Ok(collection.insert(Document::new(data.clone()), primary_key)?)
    }

    fn read(&self, query: &Query) -> AdapterResult<Collection> {
        if !query.grouping().is_empty() {
            return Err(AdapterError::Unsupported(format!(
                "GROUP BY {} on a document store",
                query.grouping().join(", ")
            )));
        }

        let filter = filter_document(query.conditions())?;
        let mut find = FindQuery::new(Filter::parse(&filter)?);
        for (field, direction) in query.ordering() {
            if !is_identifier(field) {
                return Err(AdapterError::Unsupported(format!(
                    "expression ordering '{}' on a document store",
                    field
                )));
            }
            find = find.sort(field, *direction == SortDirection::Desc);
        }
        if let Some(offset) = query.offset_value() {
            find = find.skip(offset as usize);
        }
        if let Some(limit) = query.limit_value() {
            find = find.limit(limit as usize);
        }

        self.record(query.source(), "find", &filter);

        let docs = if self.store.collection_exists(query.source()) {
            self.store.collection(query.source())?.find(&find)?
        } else {
            Vec::new()
        };
        let rows = docs.iter().map(|d| d.project(query.fields())).collect();
        Ok(query.mapper().collection(rows))
    }

    fn update(
        &self,
        source: &str,
        primary_key: &str,
        data: &Row,
        conditions: &Row,
    ) -> AdapterResult<bool> {
        if data.is_empty() {
            return Ok(false);
        }

        let filter = Self::filter_for(conditions)?;
        self.record(source, "update", &single("$set", Value::Object(data.clone())));

        let docs = self.matching(source, &filter)?;
        if docs.is_empty() {
            return Ok(false);
        }

        let collection = self.store.collection(source)?;
        for mut doc in docs {
            let old_identity = doc.get(primary_key).cloned().unwrap_or(Value::Null);
            doc.merge(data);
            let new_identity = doc.get(primary_key).cloned().unwrap_or(Value::Null);
            if new_identity != old_identity {
                if collection.contains(&new_identity)? {
                    return Err(NoSqlError::DuplicateId(identity_key(&new_identity)?).into());
                }
                collection.delete(&old_identity)?;
            }
            collection.replace(&new_identity, &doc)?;
        }
        Ok(true)
    }

    fn delete(&self, source: &str, primary_key: &str, conditions: &Row) -> AdapterResult<bool> {
        if conditions.is_empty() {
            return Err(AdapterError::Statement(format!(
                "Refusing to delete from '{}' without conditions; use truncate",
                source
            )));
        }

        let filter = Self::filter_for(conditions)?;
        self.record(source, "remove", &filter);

        let docs = self.matching(source, &filter)?;
        if docs.is_empty() {
            return Ok(true);
        }

        let collection = self.store.collection(source)?;
        for doc in docs {
            let identity = doc.get(primary_key).cloned().unwrap_or(Value::Null);
            collection.delete(&identity)?;
        }
        Ok(true)
    }

    fn truncate(&self, source: &str) -> AdapterResult<bool> {
        self.record(source, "truncate", &Value::Null);
        if self.store.collection_exists(source) {
            self.store.collection(source)?.truncate()?;
        }
        Ok(true)
    }

    fn drop(&self, source: &str) -> AdapterResult<bool> {
        self.record(source, "drop", &Value::Null);
        if !self.store.collection_exists(source) {
            return Ok(false);
        }
        self.store.drop_collection(source)?;
        Ok(true)
    }

    fn create_database(&self, name: &str) -> AdapterResult<bool> {
        self.log.record(&format!("createDatabase({})", name), &[]);
        DocumentStore::create(&self.root, name)?;
        Ok(true)
    }

    fn drop_database(&self, name: &str) -> AdapterResult<bool> {
        self.log.record(&format!("dropDatabase({})", name), &[]);
        DocumentStore::destroy(&self.root, name)?;
        Ok(true)
    }

    fn migrate(&self, source: &str, _fields: &[FieldDef]) -> AdapterResult<MigrationReport> {
        tracing::debug!(source = %source, "document store is schemaless; nothing to migrate");
        Ok(MigrationReport::default())
    }

    fn escape(&self, raw: &str) -> String {
        Value::String(raw.to_string()).to_string()
    }

    /// Temporal values are stored as Unix timestamps
    fn temporal_value(&self, field_type: FieldType, value: &Value) -> Value {
        if !field_type.is_temporal() {
            return value.clone();
        }
        match value {
            Value::String(s) => parse_timestamp(
                s,
                self.date_format(),
                self.time_format(),
                self.datetime_format(),
            )
            .map(Value::from)
            .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        }
    }

    fn read_temporal(&self, field_type: FieldType, value: &Value) -> Value {
        format_temporal(
            field_type,
            value,
            self.date_format(),
            self.time_format(),
            self.datetime_format(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::log::MemoryQueryLog;
    use serde_json::json;
    use tempfile::tempdir;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_filter_document_precedence() {
        let groups = vec![
            ConditionGroup::and(row(json!({"a": 1}))),
            ConditionGroup::new(row(json!({"b": [1, 2]})), Combinator::And, Combinator::Or),
            ConditionGroup::new(row(json!({"c:gt": 3})), Combinator::And, Combinator::And),
        ];
        assert_eq!(
            filter_document(&groups).unwrap(),
            json!({"$or": [
                {"$and": [{"$and": [{"a": {"$eq": 1}}]}]},
                {"$and": [
                    {"$and": [{"b": {"$in": [1, 2]}}]},
                    {"$and": [{"c": {"$gt": 3}}]}
                ]}
            ]})
        );
    }

    #[test]
    fn test_filter_document_rejects_expressions() {
        let groups = vec![ConditionGroup::and(row(json!({"SQRT(id):<": 3})))];
        assert!(matches!(
            filter_document(&groups),
            Err(AdapterError::Unsupported(_))
        ));
    }

    #[test]
    fn test_create_update_delete() {
        let dir = tempdir().unwrap();
        let log = Rc::new(MemoryQueryLog::new());
        let config = ConnectionConfig::new(dir.path().to_string_lossy()).database("blog");
        let adapter = DocumentAdapter::open(&config, log.clone()).unwrap();

        let id = adapter.create("posts", "id", &row(json!({"title": "a", "status": 1}))).unwrap();
        assert_eq!(id, json!(1));
        adapter.create("posts", "id", &row(json!({"title": "b", "status": 2}))).unwrap();

        assert!(adapter
            .update("posts", "id", &row(json!({"status": 5})), &row(json!({"id": 1})))
            .unwrap());
        assert!(!adapter
            .update("posts", "id", &row(json!({"status": 5})), &row(json!({"id": 9})))
            .unwrap());
        let doc = adapter.store().collection("posts").unwrap().get(&json!(1)).unwrap();
        assert_eq!(doc.get("status"), Some(&json!(5)));
        assert_eq!(doc.get("title"), Some(&json!("a")));

        assert!(adapter.delete("posts", "id", &row(json!({"status:lt": 5}))).unwrap());
        assert_eq!(adapter.store().collection("posts").unwrap().count().unwrap(), 1);
        assert!(adapter.delete("posts", "id", &Row::new()).is_err());

        assert!(log.statements()[0].starts_with("db.posts.insert("));
    }

    #[test]
    fn test_documents_keyed_by_primary_key() {
        let dir = tempdir().unwrap();
        let config = ConnectionConfig::new(dir.path().to_string_lossy());
        let adapter = DocumentAdapter::open(&config, Rc::new(MemoryQueryLog::new())).unwrap();

        let id = adapter.create("notes", "note_id", &row(json!({"title": "a"}))).unwrap();
        assert_eq!(id, json!(1));
        let doc = adapter.store().collection("notes").unwrap().get(&id).unwrap();
        assert_eq!(doc.get("note_id"), Some(&json!(1)));
        assert_eq!(doc.get("id"), None);

        assert!(adapter
            .update("notes", "note_id", &row(json!({"title": "b"})), &row(json!({"note_id": 1})))
            .unwrap());
        let doc = adapter.store().collection("notes").unwrap().get(&id).unwrap();
        assert_eq!(doc.get("title"), Some(&json!("b")));
    }

    #[test]
    fn test_identity_change_refuses_existing_key() {
        let dir = tempdir().unwrap();
        let config = ConnectionConfig::new(dir.path().to_string_lossy());
        let adapter = DocumentAdapter::open(&config, Rc::new(MemoryQueryLog::new())).unwrap();

        adapter.create("posts", "id", &row(json!({"title": "a"}))).unwrap();
        adapter.create("posts", "id", &row(json!({"title": "b"}))).unwrap();

        let err = adapter
            .update("posts", "id", &row(json!({"id": 2})), &row(json!({"id": 1})))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Statement(_)));

        let posts = adapter.store().collection("posts").unwrap();
        assert_eq!(posts.get(&json!(1)).unwrap().get("title"), Some(&json!("a")));
        assert_eq!(posts.get(&json!(2)).unwrap().get("title"), Some(&json!("b")));

        assert!(adapter
            .update("posts", "id", &row(json!({"id": 7})), &row(json!({"id": 1})))
            .unwrap());
        assert!(!posts.contains(&json!(1)).unwrap());
        assert_eq!(posts.get(&json!(7)).unwrap().get("title"), Some(&json!("a")));
    }

    #[test]
    fn test_database_admin_and_migrate() {
        let dir = tempdir().unwrap();
        let config = ConnectionConfig::new(dir.path().to_string_lossy());
        let adapter = DocumentAdapter::open(&config, Rc::new(MemoryQueryLog::new())).unwrap();

        assert!(adapter.create_database("archive").unwrap());
        assert!(dir.path().join("archive").is_dir());
        assert!(adapter.drop_database("archive").unwrap());
        assert!(!dir.path().join("archive").exists());

        let report = adapter.migrate("posts", &[FieldDef::int("id").primary()]).unwrap();
        assert!(report.is_noop());
        assert!(!adapter.drop("never_created").unwrap());
    }

    #[test]
    fn test_temporal_values_become_timestamps() {
        let dir = tempdir().unwrap();
        let config = ConnectionConfig::new(dir.path().to_string_lossy());
        let adapter = DocumentAdapter::open(&config, Rc::new(MemoryQueryLog::new())).unwrap();

        assert_eq!(
            adapter.temporal_value(FieldType::Date, &json!("1970-01-02")),
            json!(86_400)
        );
        assert_eq!(
            adapter.temporal_value(FieldType::String, &json!("1970-01-02")),
            json!("1970-01-02")
        );
        assert_eq!(
            adapter.read_temporal(FieldType::Date, &json!(86_400)),
            json!("1970-01-02")
        );
    }

    #[test]
    fn test_open_requires_root() {
        let err = DocumentAdapter::open(&ConnectionConfig::default(), Rc::new(MemoryQueryLog::new()));
        assert!(matches!(err, Err(AdapterError::Connection(_))));
    }
}
