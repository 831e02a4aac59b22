//! Collection management for the document store

use serde_json::Value;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use super::document::{identity_key, Document};
use super::error::{NoSqlError, Result};
use super::filter::FindQuery;
use super::meta::SequenceMeta;

/// A directory of `<identity>.json` documents
pub struct Collection {
    pub name: String,
    path: PathBuf,
}

impl Collection {
    /// Open an existing collection
    pub fn open(base_path: &Path, name: &str) -> Result<Self> {
        let path = base_path.join(name);

        if !path.is_dir() {
            return Err(NoSqlError::CollectionNotFound(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    /// Open, creating the directory on first use
    pub fn open_or_create(base_path: &Path, name: &str) -> Result<Self> {
        validate_collection_name(name)?;

        let path = base_path.join(name);
        if !path.exists() {
            fs::create_dir_all(&path)?;
            SequenceMeta::new().save(&path)?;
        }

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    fn doc_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{}.json", key))
    }

    /// Insert a document, filling `identity_field` from the sequence when
    /// absent. Returns the identity.
    pub fn insert(&self, mut doc: Document, identity_field: &str) -> Result<Value> {
        let mut sequence = SequenceMeta::load(&self.path)?;

        let identity = match doc.get(identity_field) {
            Some(value) if !value.is_null() => {
                if let Some(id) = value.as_i64() {
                    sequence.observe(id);
                }
                value.clone()
            }
            _ => {
                let id = Value::from(sequence.advance());
                doc.set(identity_field, id.clone());
                id
            }
        };

        let key = identity_key(&identity)?;
        let doc_path = self.doc_path(&key);
        if doc_path.exists() {
            return Err(NoSqlError::DuplicateId(key));
        }

        fs::write(doc_path, serde_json::to_string_pretty(&doc)?)?;
        sequence.save(&self.path)?;
        Ok(identity)
    }

    pub fn get(&self, identity: &Value) -> Result<Document> {
        let key = identity_key(identity)?;
        let doc_path = self.doc_path(&key);

        if !doc_path.exists() {
            return Err(NoSqlError::DocumentNotFound(key));
        }

        let content = fs::read_to_string(doc_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn contains(&self, identity: &Value) -> Result<bool> {
        Ok(self.doc_path(&identity_key(identity)?).exists())
    }

    /// Write a document back under the identity it was stored with
    pub fn replace(&self, identity: &Value, doc: &Document) -> Result<()> {
        let key = identity_key(identity)?;
        fs::write(self.doc_path(&key), serde_json::to_string_pretty(doc)?)?;
        Ok(())
    }

    pub fn delete(&self, identity: &Value) -> Result<()> {
        let key = identity_key(identity)?;
        let doc_path = self.doc_path(&key);

        if !doc_path.exists() {
            return Err(NoSqlError::DocumentNotFound(key));
        }

        fs::remove_file(doc_path)?;
        Ok(())
    }

    /// List all document keys
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();

            if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    let name = stem.to_string_lossy();
                    // Skip system files
                    if !name.starts_with('_') {
                        keys.push(name.to_string());
                    }
                }
            }
        }

        // Numeric identities sort numerically rather than by file name
        keys.sort_by(|a, b| match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            _ => a.cmp(b),
        });
        Ok(keys)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.list_keys()?.len())
    }

    /// All documents, ordered by identity
    pub fn all(&self) -> Result<Vec<Document>> {
        let keys = self.list_keys()?;
        let mut docs = Vec::with_capacity(keys.len());

        for key in keys {
            let content = fs::read_to_string(self.doc_path(&key))?;
            docs.push(serde_json::from_str(&content)?);
        }
        Ok(docs)
    }

    pub fn find(&self, query: &FindQuery) -> Result<Vec<Document>> {
        Ok(query.execute(self.all()?))
    }

    /// Remove every document and restart the sequence
    pub fn truncate(&self) -> Result<usize> {
        let keys = self.list_keys()?;
        for key in &keys {
            fs::remove_file(self.doc_path(key))?;
        }
        SequenceMeta::new().save(&self.path)?;
        Ok(keys.len())
    }

    /// Drop this collection
    pub fn drop(self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NoSqlError::InvalidCollectionName("name cannot be empty".to_string()));
    }

    if name.starts_with('_') {
        return Err(NoSqlError::InvalidCollectionName(
            "name cannot start with underscore".to_string(),
        ));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(NoSqlError::InvalidCollectionName(format!(
            "'{}' must be alphanumeric",
            name
        )));
    }

    Ok(())
}
