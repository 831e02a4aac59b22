//! Mapper
//!
//! Binds one schema to its adapters. Reads go through the read adapter when
//! one is configured; every write goes through the primary adapter.
//!
//! A mapper is not meant to be shared across threads; it is `!Send` and
//! callers synchronize externally if they need to.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::adapter::{self, Adapter, AdapterResult, AdapterSet, Bind, MigrationReport};
use super::collection::Collection;
use super::condition::parse_key;
use super::config::DatabaseConfig;
use super::entity::{Accessors, Entity};
use super::error::{Error, Result, ValidationErrors};
use super::log::QueryLog;
use super::query::Query;
use super::relation::{HasMany, HasOne, Relation};
use super::schema::{FieldDef, FieldType, RelationDef, RelationKind, RelationValue, Schema};
use super::validation::{Required, Rule};
use super::Row;

#[derive(Clone)]
pub struct Mapper {
    inner: Rc<MapperInner>,
}

struct MapperInner {
    schema: Schema,
    primary_key: String,
    adapters: AdapterSet,
    accessors: Rc<Accessors>,
    related: RefCell<HashMap<String, Mapper>>,
    errors: RefCell<ValidationErrors>,
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("source", &self.source())
            .field("primary_key", &self.primary_key())
            .field("adapter", &self.adapter().kind())
            .field("read_replica", &self.inner.adapters.read.is_some())
            .finish()
    }
}

/// Empty values persist as NULL. Zero, `"0"` and `false` are data.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => s != "0" && !s.eq_ignore_ascii_case("false"),
        Value::Null => false,
        _ => true,
    }
}

impl Mapper {
    /// Validate the schema and the schemas of its relation targets
    pub fn new(schema: Schema, adapters: AdapterSet) -> Result<Self> {
        schema.validate()?;
        for (name, relation) in schema.relations() {
            if let Some(target) = relation.target {
                target().validate().map_err(|e| {
                    Error::config(format!("Target of relation '{}' is invalid: {}", name, e))
                })?;
            }
        }
        Ok(Self::assemble(schema, adapters))
    }

    /// Single adapter used for reads and writes
    pub fn with_adapter(schema: Schema, adapter: Rc<dyn Adapter>) -> Result<Self> {
        Self::new(
            schema,
            AdapterSet {
                write: adapter,
                read: None,
            },
        )
    }

    pub fn connect(schema: Schema, config: &DatabaseConfig, log: Rc<dyn QueryLog>) -> Result<Self> {
        let adapters = adapter::connect(config, log)?;
        Self::new(schema, adapters)
    }

    fn assemble(schema: Schema, adapters: AdapterSet) -> Self {
        let primary_key = schema
            .primary_key()
            .map(|f| f.name.clone())
            .unwrap_or_default();
        let accessors = Rc::new(schema.accessors().clone());
        Self {
            inner: Rc::new(MapperInner {
                schema,
                primary_key,
                adapters,
                accessors,
                related: RefCell::new(HashMap::new()),
                errors: RefCell::new(ValidationErrors::new()),
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn source(&self) -> &str {
        self.inner.schema.source()
    }

    pub fn primary_key(&self) -> &str {
        &self.inner.primary_key
    }

    pub fn fields(&self) -> &[FieldDef] {
        self.inner.schema.fields()
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.inner.adapters
    }

    /// Primary adapter; all writes use it
    pub fn adapter(&self) -> &dyn Adapter {
        self.inner.adapters.write.as_ref()
    }

    /// Read replica when configured, else the primary adapter
    pub fn adapter_read(&self) -> &dyn Adapter {
        self.inner
            .adapters
            .read
            .as_deref()
            .unwrap_or_else(|| self.inner.adapters.write.as_ref())
    }

    pub fn date_format(&self) -> &'static str {
        self.adapter().date_format()
    }

    pub fn time_format(&self) -> &'static str {
        self.adapter().time_format()
    }

    pub fn datetime_format(&self) -> &'static str {
        self.adapter().datetime_format()
    }

    /// A new, not yet loaded entity
    pub fn entity(&self) -> Entity {
        Entity::new().with_accessors(self.inner.accessors.clone())
    }

    pub fn select(&self) -> Query {
        Query::new(self.clone())
    }

    pub fn all(&self, conditions: Row) -> Query {
        if conditions.is_empty() {
            self.select()
        } else {
            self.select().where_clause(conditions)
        }
    }

    pub fn first(&self, conditions: Row) -> Result<Option<Entity>> {
        let collection = self.all(conditions).limit(Some(1), None).into_collection()?;
        Ok(collection.into_iter().next())
    }

    /// Look up by primary key
    pub fn get(&self, id: impl Into<Value>) -> Result<Option<Entity>> {
        let mut conditions = Row::new();
        conditions.insert(self.primary_key().to_string(), id.into());
        self.first(conditions)
    }

    /// Raw statement through the read adapter, hydrated as entities
    pub fn query(&self, statement: &str, binds: &[Bind]) -> Result<Collection> {
        let rows = self.adapter_read().raw_rows(statement, binds)?;
        Ok(self.collection(rows))
    }

    /// Hydrate raw rows
    pub fn collection(&self, rows: Vec<Row>) -> Collection {
        let mut collection = Collection::keyed(self.primary_key());
        for row in rows {
            collection.push(self.hydrate(row));
        }
        collection
    }

    fn hydrate(&self, mut row: Row) -> Entity {
        for field in self.fields() {
            if let Some(value) = row.get_mut(&field.name) {
                let loaded = self.loaded_value(field, value);
                *value = loaded;
            }
        }
        let mut entity = Entity::from_row(row).with_accessors(self.inner.accessors.clone());
        self.bind_relations(&mut entity);
        entity
    }

    fn loaded_value(&self, field: &FieldDef, value: &Value) -> Value {
        match field.field_type {
            FieldType::Bool if !value.is_null() => Value::Bool(truthy(value)),
            t if t.is_temporal() => self.adapter_read().read_temporal(t, value),
            _ => value.clone(),
        }
    }

    fn storage_value(&self, field: &FieldDef, value: &Value) -> Value {
        if is_empty_value(value) {
            return Value::Null;
        }
        match field.field_type {
            FieldType::Bool => Value::Bool(truthy(value)),
            t if t.is_temporal() => self.adapter().temporal_value(t, value),
            _ => value.clone(),
        }
    }

    /// Mapper for a relation target, built once and shared by every entity
    fn related_mapper(&self, name: &str, relation: &RelationDef) -> Option<Mapper> {
        if let Some(mapper) = self.inner.related.borrow().get(name) {
            return Some(mapper.clone());
        }
        let target = relation.target?;
        let mapper = Mapper::assemble(target(), self.inner.adapters.clone());
        self.inner
            .related
            .borrow_mut()
            .insert(name.to_string(), mapper.clone());
        Some(mapper)
    }

    /// Mapper of the named relation's target
    pub fn relation_mapper(&self, name: &str) -> Result<Mapper> {
        self.schema()
            .relation(name)
            .and_then(|def| self.related_mapper(name, def))
            .ok_or_else(|| Error::RelationNotFound(format!("{}.{}", self.source(), name)))
    }

    fn bound_value(entity: &Entity, value: &RelationValue) -> Value {
        match value {
            RelationValue::Field(field) => entity.value(field).cloned().unwrap_or(Value::Null),
            RelationValue::Literal(literal) => literal.clone(),
        }
    }

    fn bind_relations(&self, entity: &mut Entity) {
        let relations = self
            .schema()
            .relations()
            .iter()
            .filter_map(|(name, def)| {
                let target = self.related_mapper(name, def)?;

                let mut conditions = Row::new();
                for (column, value) in &def.conditions {
                    conditions.insert(column.clone(), Self::bound_value(entity, value));
                }

                let mut query = target.all(conditions);
                for (field, direction) in &def.order {
                    query = query.order(field, *direction);
                }

                let relation = match def.kind {
                    RelationKind::HasMany => Relation::HasMany(HasMany::new(query)),
                    RelationKind::HasOne => Relation::HasOne(HasOne::new(query)),
                };
                Some((name.clone(), relation))
            })
            .collect();
        entity.set_relations(relations);
    }

    /// Keep an adapter failure on the mapper before handing it back
    fn record<T>(&self, result: AdapterResult<T>) -> Result<T> {
        result.map_err(|e| {
            let message = e.to_string();
            let field = self
                .fields()
                .iter()
                .find(|f| {
                    message.contains(&format!("{}.{}", self.source(), f.name))
                        || message.contains(&format!("'{}'", f.name))
                })
                .map(|f| f.name.clone());
            let mut errors = self.inner.errors.borrow_mut();
            match field {
                Some(field) => errors.add(&field, message),
                None => errors.add_base(message),
            }
            Error::Adapter(e)
        })
    }

    /// Run required checks and attached rules, replacing previous errors
    pub fn validate(&self, entity: &Entity) -> bool {
        let mut errors = ValidationErrors::new();
        let values = entity.to_array();

        for field in self.fields() {
            if field.field_type == FieldType::Relation {
                continue;
            }
            let value = values.get(&field.name).unwrap_or(&Value::Null);
            if field.required && !Required.check(value) {
                errors.add(&field.name, Required.message(&field.name));
                continue;
            }
            for rule in self.schema().rules_for(&field.name) {
                if !rule.check(value) {
                    errors.add(&field.name, rule.message(&field.name));
                }
            }
        }

        let valid = errors.is_empty();
        *self.inner.errors.borrow_mut() = errors;
        valid
    }

    pub fn errors(&self) -> ValidationErrors {
        self.inner.errors.borrow().clone()
    }

    pub fn field_errors(&self, field: &str) -> Vec<String> {
        self.inner
            .errors
            .borrow()
            .get(field)
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        !self.inner.errors.borrow().is_empty()
    }

    /// Add an error by hand, e.g. from a custom check
    pub fn error(&self, field: &str, message: impl Into<String>) {
        self.inner.errors.borrow_mut().add(field, message);
    }

    pub fn clear_errors(&self) {
        self.inner.errors.borrow_mut().clear();
    }

    /// Primary-key value the backend knows the entity by
    fn identity(&self, entity: &Entity) -> Option<Value> {
        let pk = self.primary_key();
        entity
            .original(pk)
            .filter(|v| !is_empty_value(v))
            .or_else(|| entity.value(pk).filter(|v| !is_empty_value(v)))
            .cloned()
    }

    fn identity_conditions(&self, entity: &Entity, action: &str) -> Result<Row> {
        let id = self.identity(entity).ok_or_else(|| {
            Error::config(format!(
                "Cannot {} a '{}' entity without a '{}' value",
                action,
                self.source(),
                self.primary_key()
            ))
        })?;
        let mut conditions = Row::new();
        conditions.insert(self.primary_key().to_string(), id);
        Ok(conditions)
    }

    /// Declared fields of the merged view. Missing fields fall back to their
    /// default; an empty primary key is left for the backend to generate.
    fn insert_payload(&self, entity: &Entity) -> Row {
        let values = entity.to_array();
        let mut data = Row::new();
        for field in self.fields() {
            if field.field_type == FieldType::Relation {
                continue;
            }
            let value = match values.get(&field.name) {
                Some(value) => self.storage_value(field, value),
                None => match &field.default {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            if field.primary && value.is_null() {
                continue;
            }
            data.insert(field.name.clone(), value);
        }
        data
    }

    /// Declared fields of the dirty set only
    fn update_payload(&self, entity: &Entity) -> Row {
        entity
            .data_modified()
            .iter()
            .filter_map(|(name, value)| {
                let field = self.schema().field(name)?;
                if field.field_type == FieldType::Relation {
                    return None;
                }
                Some((name.clone(), self.storage_value(field, value)))
            })
            .collect()
    }

    pub fn insert(&self, entity: &mut Entity) -> Result<Value> {
        if !self.validate(entity) {
            return Err(Error::Validation(self.errors()));
        }

        let data = self.insert_payload(entity);
        let id = self.record(self.adapter().create(self.source(), self.primary_key(), &data))?;
        tracing::debug!(source = %self.source(), id = %id, "inserted");

        entity.set_clean(self.primary_key(), id.clone());
        entity.commit();
        self.bind_relations(entity);
        self.save_pending(entity)?;
        Ok(id)
    }

    /// Submit the dirty set. Nothing dirty is a successful no-op.
    pub fn update(&self, entity: &mut Entity) -> Result<bool> {
        let conditions = self.identity_conditions(entity, "update")?;
        if !self.validate(entity) {
            return Err(Error::Validation(self.errors()));
        }

        let data = self.update_payload(entity);
        let updated = if data.is_empty() {
            true
        } else {
            self.record(self.adapter().update(
                self.source(),
                self.primary_key(),
                &data,
                &conditions,
            ))?
        };

        let rebind = data.keys().any(|k| {
            self.schema().relations().iter().any(|(_, def)| {
                def.conditions
                    .iter()
                    .any(|(_, v)| matches!(v, RelationValue::Field(f) if f == k))
            })
        });
        entity.commit();
        if rebind {
            self.bind_relations(entity);
        }
        self.save_pending(entity)?;
        Ok(updated)
    }

    /// Update a loaded entity that has a primary key, insert anything else
    pub fn save(&self, entity: &mut Entity) -> Result<bool> {
        if entity.is_loaded() && self.identity(entity).is_some() {
            self.update(entity)
        } else {
            self.insert(entity).map(|_| true)
        }
    }

    fn save_child(&self, parent: &Entity, name: &str, child: &mut Entity) -> Result<()> {
        let def = self
            .schema()
            .relation(name)
            .ok_or_else(|| Error::RelationNotFound(format!("{}.{}", self.source(), name)))?;
        let target = self.relation_mapper(name)?;

        for (key, value) in &def.conditions {
            let (column, _) = parse_key(key);
            child.set(column, Self::bound_value(parent, value));
        }
        target.save(child)?;
        Ok(())
    }

    /// Save attached children. A failing child and the ones after it stay
    /// attached.
    fn save_pending(&self, parent: &mut Entity) -> Result<()> {
        let mut pending = parent.take_pending().into_iter();
        while let Some((name, mut child)) = pending.next() {
            if let Err(e) = self.save_child(parent, &name, &mut child) {
                parent.attach(&name, child);
                for (rest_name, rest) in pending {
                    parent.attach(&rest_name, rest);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Delete the record behind an entity
    pub fn destroy(&self, entity: &Entity) -> Result<bool> {
        let conditions = self.identity_conditions(entity, "delete")?;
        self.delete(conditions)
    }

    pub fn delete(&self, conditions: Row) -> Result<bool> {
        self.record(self.adapter().delete(self.source(), self.primary_key(), &conditions))
    }

    pub fn truncate_datasource(&self) -> Result<bool> {
        self.record(self.adapter().truncate(self.source()))
    }

    pub fn drop_datasource(&self) -> Result<bool> {
        self.record(self.adapter().drop(self.source()))
    }

    /// Reconcile declared fields with the live source
    pub fn migrate(&self) -> Result<MigrationReport> {
        let report = self.record(self.adapter().migrate(self.source(), self.fields()))?;
        tracing::info!(
            source = %self.source(),
            created = report.created,
            added = report.added.len(),
            altered = report.altered.len(),
            skipped = report.skipped.len(),
            "migrated"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::connect;
    use crate::engine::log::NullQueryLog;
    use crate::engine::validation::Email;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn users() -> Schema {
        Schema::builder("users")
            .field(FieldDef::int("id").primary().serial())
            .field(FieldDef::string("name").required())
            .field(FieldDef::string("email"))
            .field(FieldDef::bool("active").default_value(true))
            .rule("email", Email)
            .build()
    }

    fn mapper(schema: Schema) -> Mapper {
        let adapters = connect(&DatabaseConfig::sqlite_memory(), Rc::new(NullQueryLog)).unwrap();
        let mapper = Mapper::new(schema, adapters).unwrap();
        mapper.migrate().unwrap();
        mapper
    }

    #[test]
    fn test_empty_value_rules() {
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!("0")));
        assert!(!is_empty_value(&json!(false)));
    }

    #[test]
    fn test_new_rejects_invalid_schema() {
        let adapters = connect(&DatabaseConfig::sqlite_memory(), Rc::new(NullQueryLog)).unwrap();
        let schema = Schema::builder("users").field(FieldDef::string("name")).build();
        assert!(matches!(Mapper::new(schema, adapters), Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_blocks_write() {
        let users = mapper(users());
        let mut user = users.entity();
        user.set("email", "not-an-email");

        let err = users.save(&mut user).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(users.field_errors("name").len(), 1);
        assert_eq!(users.field_errors("email").len(), 1);
        assert_eq!(users.select().count().unwrap(), 0);
    }

    #[test]
    fn test_insert_applies_defaults_and_bool_hydration() {
        let users = mapper(users());
        let mut user = users.entity();
        user.set("name", "ada");
        user.set("email", "");

        let id = users.insert(&mut user).unwrap();
        assert_eq!(id, json!(1));
        assert!(user.is_loaded());
        assert_eq!(user.value("id"), Some(&json!(1)));

        let loaded = users.get(1).unwrap().unwrap();
        assert_eq!(loaded.get("active"), Some(json!(true)));
        assert_eq!(loaded.get("email"), Some(json!(null)));
    }

    #[test]
    fn test_update_without_changes_is_noop() {
        let users = mapper(users());
        let mut user = users.entity();
        user.set("name", "ada");
        users.save(&mut user).unwrap();

        assert!(users.update(&mut user).unwrap());
        user.set("name", "grace");
        assert!(users.save(&mut user).unwrap());
        assert_eq!(
            users.get(1).unwrap().unwrap().get("name"),
            Some(json!("grace"))
        );
    }

    #[test]
    fn test_statement_errors_accumulate() {
        let schema = Schema::builder("accounts")
            .field(FieldDef::int("id").primary().serial())
            .field(FieldDef::string("login").unique())
            .build();
        let accounts = mapper(schema);

        let mut first = accounts.entity();
        first.set("login", "root");
        accounts.save(&mut first).unwrap();

        let mut second = accounts.entity();
        second.set("login", "root");
        let err = accounts.save(&mut second).unwrap_err();
        assert!(matches!(err, Error::Adapter(_)));
        assert!(accounts.has_errors());
        assert_eq!(accounts.field_errors("login").len(), 1);
    }

    #[test]
    fn test_destroy_requires_identity() {
        let users = mapper(users());
        assert!(users.destroy(&users.entity()).is_err());

        let mut user = users.entity();
        user.set("name", "ada");
        users.save(&mut user).unwrap();
        assert!(users.destroy(&user).unwrap());
        assert!(users.get(1).unwrap().is_none());
    }

    #[test]
    fn test_unknown_fields_are_not_written() {
        let users = mapper(users());
        let mut user = Entity::from(row(json!({"name": "ada", "nickname": "countess"})));
        users.insert(&mut user).unwrap();
        let loaded = users.get(1).unwrap().unwrap();
        assert!(!loaded.has("nickname"));
    }
}
