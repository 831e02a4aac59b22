//! Document Store Engine
//!
//! A versioned, file-backed JSON document store:
//! - one directory per database, one sub-directory per collection
//! - one `<identity>.json` file per document
//! - integer identity sequences kept in each collection's `_meta.json`
//! - Mongo-style filter documents for reads, updates and deletes

pub mod collection;
pub mod document;
pub mod error;
pub mod filter;
pub mod meta;
pub mod storage;

pub use collection::Collection;
pub use document::Document;
pub use error::NoSqlError;
pub use filter::{Filter, FilterOp, FindQuery};
pub use meta::{Meta, SequenceMeta};
pub use storage::DocumentStore;
