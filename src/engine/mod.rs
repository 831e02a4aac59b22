// DataMapper Engine - Core module structure
pub mod adapter;
pub mod collection;
pub mod condition;
pub mod config;
pub mod entity;
pub mod error;
pub mod log;
pub mod mapper;
pub mod nosql;
pub mod pager;
pub mod query;
pub mod relation;
pub mod schema;
pub mod validation;

/// A record, row, or condition map. Keys keep insertion order.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use collection::Collection;
pub use entity::Entity;
pub use error::{Error, Result};
pub use mapper::Mapper;
pub use query::{Query, SortDirection};
pub use schema::{FieldDef, FieldType, RelationDef, Schema};
