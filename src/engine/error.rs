//! Error Types
//!
//! Two channels: construction-time failures (`Config`, connection errors)
//! surface from constructors, while runtime write failures come back from
//! `save`/`insert`/`update`/`delete` and are also accumulated on the mapper.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use thiserror::Error;

use super::adapter::AdapterError;
use super::config::ConfigError;

/// Key used for errors that cannot be attributed to a single field
pub const BASE_ERROR_KEY: &str = "_base";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Relation not defined: {0}")]
    RelationNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Messages keyed by field name, in insertion order per field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    messages: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.messages
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.add(BASE_ERROR_KEY, message);
    }

    pub fn extend(&mut self, other: &ValidationErrors) {
        for (field, messages) in &other.messages {
            for message in messages {
                self.add(field, message.clone());
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.messages.get(field).map(|m| m.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// All messages flattened, field order then insertion order
    pub fn messages(&self) -> Vec<String> {
        self.messages.values().flatten().cloned().collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}
