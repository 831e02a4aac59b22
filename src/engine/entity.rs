//! Entity
//!
//! One record in memory. Writes before the entity is loaded form its base
//! data; writes after go to the dirty set, which is all an update submits.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::relation::{HasMany, HasOne, Relation};
use super::Row;

pub type Getter = Rc<dyn Fn(&Entity) -> Option<Value>>;
pub type Setter = Rc<dyn Fn(&mut Entity, Value)>;

/// Per-field accessor table consulted before the default get/set path
#[derive(Clone, Default)]
pub struct Accessors {
    getters: HashMap<String, Getter>,
    setters: HashMap<String, Setter>,
}

impl Accessors {
    pub fn getter(&mut self, field: &str, getter: impl Fn(&Entity) -> Option<Value> + 'static) {
        self.getters.insert(field.to_string(), Rc::new(getter));
    }

    pub fn setter(&mut self, field: &str, setter: impl Fn(&mut Entity, Value) + 'static) {
        self.setters.insert(field.to_string(), Rc::new(setter));
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty() && self.setters.is_empty()
    }
}

impl fmt::Debug for Accessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<&String> = self.getters.keys().collect();
        let mut setters: Vec<&String> = self.setters.keys().collect();
        getters.sort();
        setters.sort();
        f.debug_struct("Accessors")
            .field("getters", &getters)
            .field("setters", &setters)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct Entity {
    data: Row,
    modified: Row,
    loaded: bool,
    accessors: Option<Rc<Accessors>>,
    /// Fields whose accessor is currently running
    active: RefCell<Vec<String>>,
    relations: Vec<(String, Relation)>,
    /// Children attached for cascade save, keyed by relation name
    pending: Vec<(String, Entity)>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("data", &self.data)
            .field("modified", &self.modified)
            .field("loaded", &self.loaded)
            .field(
                "relations",
                &self.relations.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Entity {
    /// A new record; writes form its base data until it is marked loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// A record hydrated from a backend row, loaded from the start
    pub fn from_row(row: Row) -> Self {
        Self {
            data: row,
            loaded: true,
            ..Self::default()
        }
    }

    pub fn with_accessors(mut self, accessors: Rc<Accessors>) -> Self {
        if !accessors.is_empty() {
            self.accessors = Some(accessors);
        }
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    fn enter(&self, field: &str) -> bool {
        let mut active = self.active.borrow_mut();
        if active.iter().any(|f| f == field) {
            return false;
        }
        active.push(field.to_string());
        true
    }

    fn leave(&self, field: &str) {
        self.active.borrow_mut().retain(|f| f != field);
    }

    /// Field value, through its getter when one is registered. A getter
    /// reading its own field gets the stored value.
    pub fn get(&self, field: &str) -> Option<Value> {
        let getter = self
            .accessors
            .as_ref()
            .and_then(|a| a.getters.get(field))
            .cloned();

        if let Some(getter) = getter {
            if self.enter(field) {
                let value = getter(self);
                self.leave(field);
                return value;
            }
        }
        self.value(field).cloned()
    }

    /// Stored value, bypassing accessors
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.modified.get(field).or_else(|| self.data.get(field))
    }

    /// Base value, ignoring the dirty set
    pub fn original(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        let setter = self
            .accessors
            .as_ref()
            .and_then(|a| a.setters.get(field))
            .cloned();

        if let Some(setter) = setter {
            if self.enter(field) {
                setter(self, value);
                self.leave(field);
                return;
            }
        }
        self.store(field, value);
    }

    fn store(&mut self, field: &str, value: Value) {
        if self.loaded {
            self.modified.insert(field.to_string(), value);
        } else {
            self.data.insert(field.to_string(), value);
        }
    }

    /// Assign several fields through `set`
    pub fn fill(&mut self, values: Row) {
        for (field, value) in values {
            self.set(&field, value);
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.modified.contains_key(field) || self.data.contains_key(field)
    }

    /// Base data overlaid by the dirty set
    pub fn to_array(&self) -> Row {
        let mut merged = self.data.clone();
        for (field, value) in &self.modified {
            merged.insert(field.clone(), value.clone());
        }
        merged
    }

    /// The dirty set: exactly what an update submits
    pub fn data_modified(&self) -> &Row {
        &self.modified
    }

    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Fold the dirty set into the base data after a successful write
    pub fn commit(&mut self) {
        let modified = std::mem::take(&mut self.modified);
        for (field, value) in modified {
            self.data.insert(field, value);
        }
        self.loaded = true;
    }

    /// Set a stored value without marking it dirty
    pub(crate) fn set_clean(&mut self, field: &str, value: Value) {
        self.modified.remove(field);
        self.data.insert(field.to_string(), value);
    }

    pub(crate) fn set_relations(&mut self, relations: Vec<(String, Relation)>) {
        self.relations = relations;
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Relation> {
        self.relations
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_many(&self, name: &str) -> Option<&HasMany> {
        match self.relation(name) {
            Some(Relation::HasMany(rel)) => Some(rel),
            _ => None,
        }
    }

    pub fn has_one(&self, name: &str) -> Option<&HasOne> {
        match self.relation(name) {
            Some(Relation::HasOne(rel)) => Some(rel),
            _ => None,
        }
    }

    /// Writable view of a has-one relation, for forwarding `set`
    pub fn has_one_mut(&mut self, name: &str) -> Option<&mut HasOne> {
        match self.relation_mut(name) {
            Some(Relation::HasOne(rel)) => Some(rel),
            _ => None,
        }
    }

    /// Queue a child for the named relation; saving this entity saves the
    /// child with the relation's keys filled from this entity
    pub fn attach(&mut self, relation: &str, child: Entity) {
        self.pending.push((relation.to_string(), child));
    }

    pub fn pending(&self) -> &[(String, Entity)] {
        &self.pending
    }

    pub(crate) fn take_pending(&mut self) -> Vec<(String, Entity)> {
        std::mem::take(&mut self.pending)
    }
}

impl From<Row> for Entity {
    fn from(row: Row) -> Self {
        let mut entity = Entity::new();
        entity.fill(row);
        entity
    }
}
