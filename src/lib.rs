//! DataMapper - backend-neutral data mapper
//!
//! Maps records to entities, builds queries from condition maps such as
//! `{"status:in": [3, 4, 5]}`, and reconciles declared fields with the live
//! schema. SQLite runs through `rusqlite`; a file-backed JSON document store
//! runs the same mapper code through Mongo-style filters.
//!
//! ```no_run
//! use datamapper::{DatabaseConfig, FieldDef, Mapper, Schema, TracingQueryLog};
//! use serde_json::json;
//! use std::rc::Rc;
//!
//! fn posts() -> Schema {
//!     Schema::builder("posts")
//!         .field(FieldDef::int("id").primary().serial())
//!         .field(FieldDef::string("title").required())
//!         .field(FieldDef::int("status"))
//!         .build()
//! }
//!
//! # fn main() -> datamapper::Result<()> {
//! let config = DatabaseConfig::sqlite_memory();
//! let mapper = Mapper::connect(posts(), &config, Rc::new(TracingQueryLog))?;
//! mapper.migrate()?;
//!
//! let mut post = mapper.entity();
//! post.set("title", "Hello");
//! post.set("status", 3);
//! mapper.save(&mut post)?;
//!
//! let conditions = json!({"status:gte": 3}).as_object().cloned().unwrap_or_default();
//! assert_eq!(mapper.all(conditions).count()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod engine;

pub use engine::adapter::{
    connect, Adapter, AdapterError, AdapterResult, AdapterSet, Bind, DocumentAdapter,
    MigrationReport, SqlAdapter, SqlValue, SqliteDriver,
};
pub use engine::collection::Collection;
pub use engine::condition::{Combinator, ConditionGroup};
pub use engine::config::{AdapterKind, ConfigError, ConnectionConfig, DatabaseConfig};
pub use engine::entity::{Accessors, Entity};
pub use engine::error::{Error, Result, ValidationErrors};
pub use engine::log::{MemoryQueryLog, NullQueryLog, QueryLog, TracingQueryLog};
pub use engine::mapper::Mapper;
pub use engine::pager::Pager;
pub use engine::query::{Query, SortDirection};
pub use engine::relation::{HasMany, HasOne, Relation};
pub use engine::schema::{FieldDef, FieldType, Length, RelationDef, RelationKind, Schema};
pub use engine::validation::{Alpha, AlphaNumeric, Email, Numeric, Required, Rule};
pub use engine::Row;
