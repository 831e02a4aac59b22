//! DataMapper Configuration Module
//! Handles loading connection settings from a JSON file

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Which adapter a configuration targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Sqlite,
    Mysql,
    Document,
}

/// Connection inputs shared by every adapter.
///
/// `host` is a file path (or `:memory:`) for SQLite and the store root for the
/// document adapter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub adapter: AdapterKind,
    pub connection: ConnectionConfig,
    /// Optional read replica; reads prefer it, writes never use it
    #[serde(default)]
    pub read: Option<ConnectionConfig>,
}

impl DatabaseConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: DatabaseConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn sqlite_memory() -> Self {
        Self {
            adapter: AdapterKind::Sqlite,
            connection: ConnectionConfig::new(":memory:"),
            read: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_roundtrip_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("database.json");

        let config = DatabaseConfig {
            adapter: AdapterKind::Document,
            connection: ConnectionConfig::new(dir.path().to_string_lossy())
                .database("blog")
                .option("timeout", 5),
            read: None,
        };
        config.save(&path).unwrap();

        let loaded = DatabaseConfig::load(&path).unwrap();
        assert_eq!(loaded.adapter, AdapterKind::Document);
        assert_eq!(loaded.connection.database.as_deref(), Some("blog"));
        assert_eq!(loaded.connection.options.get("timeout"), Some(&serde_json::json!(5)));
    }

    #[test]
    fn test_config_missing_file() {
        let dir = tempdir().unwrap();
        let err = DatabaseConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_config_minimal_json() {
        let config: DatabaseConfig = serde_json::from_str(
            r#"{"adapter": "sqlite", "connection": {"host": ":memory:"}}"#,
        )
        .unwrap();
        assert_eq!(config.adapter, AdapterKind::Sqlite);
        assert!(config.read.is_none());
        assert!(config.connection.options.is_empty());
    }
}
