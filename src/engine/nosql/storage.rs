//! Document Store
//!
//! Main entry point for the document store: one directory per database
//! holding a `_meta.json` and one sub-directory per collection.

use std::fs;
use std::path::{Path, PathBuf};

use super::collection::Collection;
use super::error::{NoSqlError, Result};
use super::meta::Meta;

pub struct DocumentStore {
    base_path: PathBuf,
    meta: Meta,
}

impl DocumentStore {
    /// Open an existing store at `root/database`
    pub fn open(root: &Path, database: &str) -> Result<Self> {
        let base_path = root.join(database);

        if !base_path.is_dir() {
            return Err(NoSqlError::StoreNotFound(base_path));
        }

        let meta = Meta::load(&base_path)?;
        Ok(Self { base_path, meta })
    }

    /// Create a new store at `root/database`
    pub fn create(root: &Path, database: &str) -> Result<Self> {
        let base_path = root.join(database);
        fs::create_dir_all(&base_path)?;

        let meta = Meta::new();
        meta.save(&base_path)?;

        Ok(Self { base_path, meta })
    }

    pub fn open_or_create(root: &Path, database: &str) -> Result<Self> {
        if root.join(database).join(super::meta::META_FILE).exists() {
            Self::open(root, database)
        } else {
            Self::create(root, database)
        }
    }

    /// Remove a whole store from disk
    pub fn destroy(root: &Path, database: &str) -> Result<()> {
        let base_path = root.join(database);
        if !base_path.is_dir() {
            return Err(NoSqlError::StoreNotFound(base_path));
        }
        fs::remove_dir_all(base_path)?;
        Ok(())
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Open an existing collection
    pub fn collection(&self, name: &str) -> Result<Collection> {
        Collection::open(&self.base_path, name)
    }

    /// Open a collection, creating it on first write
    pub fn collection_or_create(&self, name: &str) -> Result<Collection> {
        Collection::open_or_create(&self.base_path, name)
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.base_path.join(name).is_dir()
    }

    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut collections = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();

            if path.is_dir() {
                if let Some(name) = path.file_name() {
                    let name_str = name.to_string_lossy();
                    if !name_str.starts_with('.') && !name_str.starts_with('_') {
                        collections.push(name_str.to_string());
                    }
                }
            }
        }

        collections.sort();
        Ok(collections)
    }

    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.collection(name)?.drop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::nosql::Document;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_store_lifecycle() {
        let dir = tempdir().unwrap();

        let store = DocumentStore::create(dir.path(), "blog").unwrap();
        assert!(store.list_collections().unwrap().is_empty());

        let posts = store.collection_or_create("posts").unwrap();
        let doc = Document::new(json!({"title": "hello"}).as_object().unwrap().clone());
        posts.insert(doc, "id").unwrap();
        assert!(store.collection_exists("posts"));
        assert_eq!(store.list_collections().unwrap(), vec!["posts"]);

        store.drop_collection("posts").unwrap();
        assert!(!store.collection_exists("posts"));
    }

    #[test]
    fn test_store_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = DocumentStore::create(dir.path(), "blog").unwrap();
            let col = store.collection_or_create("test").unwrap();
            col.insert(Document::new(json!({"x": 1}).as_object().unwrap().clone()), "id")
                .unwrap();
        }

        {
            let store = DocumentStore::open(dir.path(), "blog").unwrap();
            assert_eq!(store.collection("test").unwrap().count().unwrap(), 1);
        }

        DocumentStore::destroy(dir.path(), "blog").unwrap();
        assert!(matches!(
            DocumentStore::open(dir.path(), "blog"),
            Err(NoSqlError::StoreNotFound(_))
        ));
    }
}
