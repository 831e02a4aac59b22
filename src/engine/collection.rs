//! Result collections
//!
//! An ordered set of entities plus the primary-key values seen in it.

use serde_json::Value;
use std::ops::{Index, IndexMut};

use super::entity::Entity;
use super::Row;

#[derive(Debug, Clone, Default)]
pub struct Collection {
    entities: Vec<Entity>,
    primary_key: Option<String>,
}

fn is_empty_identity(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty collection that reads identities from the given key field
    pub fn keyed(primary_key: &str) -> Self {
        Self {
            primary_key: Some(primary_key.to_string()),
            ..Self::default()
        }
    }

    pub fn from_entities(primary_key: &str, entities: Vec<Entity>) -> Self {
        let mut collection = Self::keyed(primary_key);
        for entity in entities {
            collection.push(entity);
        }
        collection
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    /// Replace the entity at `index`, returning the previous one
    pub fn set(&mut self, index: usize, entity: Entity) -> Option<Entity> {
        let slot = self.entities.get_mut(index)?;
        Some(std::mem::replace(slot, entity))
    }

    pub fn remove(&mut self, index: usize) -> Option<Entity> {
        if index >= self.entities.len() {
            return None;
        }
        Some(self.entities.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn first(&self) -> Option<&Entity> {
        self.entities.first()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.entities.iter_mut()
    }

    /// Distinct, non-empty primary-key values in result order, read from
    /// the entities as they are now
    pub fn identities(&self) -> Vec<Value> {
        let Some(key) = &self.primary_key else {
            return Vec::new();
        };
        let mut identities: Vec<Value> = Vec::new();
        for id in self.entities.iter().filter_map(|e| e.value(key)) {
            if !is_empty_identity(id) && !identities.contains(id) {
                identities.push(id.clone());
            }
        }
        identities
    }

    /// One field from every entity; missing values come back as null
    pub fn pluck(&self, field: &str) -> Vec<Value> {
        self.entities
            .iter()
            .map(|e| e.get(field).unwrap_or(Value::Null))
            .collect()
    }

    /// `{key: value}` over every entity. Later entities win on repeated keys.
    pub fn to_map(&self, key: &str, value: &str) -> Row {
        let mut map = Row::new();
        for entity in &self.entities {
            let k = match entity.get(key) {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => continue,
                Some(other) => other.to_string(),
            };
            map.insert(k, entity.get(value).unwrap_or(Value::Null));
        }
        map
    }

    pub fn to_rows(&self) -> Vec<Row> {
        self.entities.iter().map(Entity::to_array).collect()
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.entities
    }
}

impl Index<usize> for Collection {
    type Output = Entity;

    fn index(&self, index: usize) -> &Entity {
        &self.entities[index]
    }
}

impl IndexMut<usize> for Collection {
    fn index_mut(&mut self, index: usize) -> &mut Entity {
        &mut self.entities[index]
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        Entity::from_row(value.as_object().unwrap().clone())
    }

    fn sample() -> Collection {
        Collection::from_entities(
            "id",
            vec![
                entity(json!({"id": 1, "name": "a"})),
                entity(json!({"id": 2, "name": "b"})),
                entity(json!({"id": 1, "name": "c"})),
                entity(json!({"id": null, "name": "d"})),
                entity(json!({"id": "", "name": "e"})),
            ],
        )
    }

    #[test]
    fn test_identities_are_deduplicated() {
        let c = sample();
        assert_eq!(c.len(), 5);
        assert_eq!(c.identities(), &[json!(1), json!(2)]);
    }

    #[test]
    fn test_iteration_restarts() {
        let c = sample();
        let first: Vec<_> = c.iter().map(|e| e.get("name")).collect();
        let second: Vec<_> = (&c).into_iter().map(|e| e.get("name")).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pluck_and_to_map() {
        let c = sample();
        assert_eq!(c.pluck("name")[1], json!("b"));
        let map = c.to_map("id", "name");
        assert_eq!(map.get("1"), Some(&json!("c")));
        assert_eq!(map.get("2"), Some(&json!("b")));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_set_and_remove_update_identities() {
        let mut c = sample();
        c.set(1, entity(json!({"id": 7, "name": "z"}))).unwrap();
        assert_eq!(c.identities(), &[json!(1), json!(7)]);
        assert_eq!(c[1].get("name"), Some(json!("z")));

        c.remove(1).unwrap();
        assert_eq!(c.identities(), &[json!(1)]);
        assert!(c.remove(10).is_none());

        c[0].set("name", "renamed");
        assert_eq!(c.first().unwrap().get("name"), Some(json!("renamed")));
    }

    #[test]
    fn test_identities_follow_mutable_access() {
        let mut c = sample();
        c[1].set("id", 9);
        assert_eq!(c.identities(), &[json!(1), json!(9)]);

        if let Some(e) = c.get_mut(0) {
            e.set("id", 4);
        }
        assert_eq!(c.identities(), &[json!(4), json!(9), json!(1)]);
    }
}
