//! Meta information for the document store format
//!
//! The store root and every collection carry a `_meta.json`. The root one
//! pins the format version; the collection one holds the identity sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::error::{NoSqlError, Result};

/// Current format version written by this store
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Minimum format version we can read
pub const MIN_FORMAT_VERSION: u32 = 1;

pub const META_FILE: &str = "_meta.json";

/// Store-level meta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub engine: String,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Meta {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            engine: "datamapper-documents".to_string(),
            format_version: CURRENT_FORMAT_VERSION,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn load(base_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(base_path.join(META_FILE))?;
        let meta: Meta = serde_json::from_str(&content)?;

        if meta.format_version < MIN_FORMAT_VERSION || meta.format_version > CURRENT_FORMAT_VERSION {
            return Err(NoSqlError::UnsupportedFormatVersion {
                found: meta.format_version,
                min: MIN_FORMAT_VERSION,
                max: CURRENT_FORMAT_VERSION,
            });
        }

        Ok(meta)
    }

    pub fn save(&self, base_path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(base_path.join(META_FILE), content)?;
        Ok(())
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection-level meta: the next integer identity to hand out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMeta {
    pub next_id: i64,
    pub modified_at: DateTime<Utc>,
}

impl SequenceMeta {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            modified_at: Utc::now(),
        }
    }

    /// Missing file means a fresh sequence
    pub fn load(path: &Path) -> Result<Self> {
        let file = path.join(META_FILE);
        if !file.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(file)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.join(META_FILE), content)?;
        Ok(())
    }

    /// Take the next identity
    pub fn advance(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.modified_at = Utc::now();
        id
    }

    /// Keep the sequence ahead of an identity supplied by the caller
    pub fn observe(&mut self, id: i64) {
        if id >= self.next_id {
            self.next_id = id + 1;
            self.modified_at = Utc::now();
        }
    }
}

impl Default for SequenceMeta {
    fn default() -> Self {
        Self::new()
    }
}
