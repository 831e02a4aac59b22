//! Relations
//!
//! Each hydrated entity gets its own relation objects, built with that
//! entity's key values. Nothing runs until the relation is first read; the
//! result is then kept for the life of the relation.

use serde_json::Value;

use super::collection::Collection;
use super::entity::Entity;
use super::error::Result;
use super::mapper::Mapper;
use super::query::{Query, SortDirection};
use super::schema::RelationKind;

#[derive(Debug, Clone)]
pub enum Relation {
    HasMany(HasMany),
    HasOne(HasOne),
}

impl Relation {
    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::HasMany(_) => RelationKind::HasMany,
            Relation::HasOne(_) => RelationKind::HasOne,
        }
    }

    pub fn query(&self) -> &Query {
        match self {
            Relation::HasMany(rel) => rel.query(),
            Relation::HasOne(rel) => rel.query(),
        }
    }

    /// Mapper of the related records
    pub fn mapper(&self) -> &Mapper {
        self.query().mapper()
    }

    pub fn is_resolved(&self) -> bool {
        self.query().is_executed()
    }
}

/// Every related record matching the bound conditions
#[derive(Debug, Clone)]
pub struct HasMany {
    query: Query,
}

impl HasMany {
    pub fn new(query: Query) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The resolved collection; the same one on every call
    pub fn all(&self) -> Result<&Collection> {
        self.query.execute()
    }

    pub fn count(&self) -> Result<usize> {
        self.query.count()
    }

    pub fn first(&self) -> Result<Option<&Entity>> {
        self.query.first()
    }

    pub fn get(&self, index: usize) -> Result<Option<&Entity>> {
        Ok(self.all()?.get(index))
    }

    pub fn iter(&self) -> Result<std::slice::Iter<'_, Entity>> {
        self.query.iter()
    }

    /// A fresh query over the same records with extra ordering. The memoized
    /// result of this relation is left alone.
    pub fn order(&self, field: &str, direction: SortDirection) -> Query {
        self.query.clone().limit(None, None).order(field, direction)
    }

    /// Copy of the underlying query for further refinement
    pub fn refine(&self) -> Query {
        self.query.clone()
    }
}

/// At most one related record
#[derive(Debug, Clone)]
pub struct HasOne {
    query: Query,
}

impl HasOne {
    pub fn new(query: Query) -> Self {
        Self {
            query: query.limit(Some(1), None),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn entity(&self) -> Result<Option<&Entity>> {
        self.query.first()
    }

    pub fn entity_mut(&mut self) -> Result<Option<&mut Entity>> {
        self.query.execute()?;
        Ok(self.query.cached_mut().and_then(|c| c.get_mut(0)))
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.entity()?.is_some())
    }

    /// Field of the related record; null when there is none
    pub fn get(&self, field: &str) -> Result<Value> {
        Ok(self
            .entity()?
            .and_then(|e| e.get(field))
            .unwrap_or(Value::Null))
    }

    /// Set a field on the related record; `false` when there is none
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<bool> {
        match self.entity_mut()? {
            Some(entity) => {
                entity.set(field, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
