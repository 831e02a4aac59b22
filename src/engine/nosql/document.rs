//! Document representation for the document store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{NoSqlError, Result};

/// A stored document: its fields plus bookkeeping timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_created_at")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "_modified_at")]
    pub modified_at: DateTime<Utc>,

    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(data: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            modified_at: now,
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.data.insert(field.to_string(), value);
        self.modified_at = Utc::now();
    }

    /// Overlay the given fields onto the document
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (field, value) in patch {
            self.data.insert(field.clone(), value.clone());
        }
        self.modified_at = Utc::now();
    }

    /// Keep only the listed fields
    pub fn project(&self, fields: &[String]) -> Map<String, Value> {
        if fields.is_empty() || fields.iter().any(|f| f == "*") {
            return self.data.clone();
        }
        fields
            .iter()
            .filter_map(|f| self.data.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }
}

/// File stem for an identity value
pub fn identity_key(value: &Value) -> Result<String> {
    let key = match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(NoSqlError::InvalidIdentity(other.to_string())),
    };
    let valid = !key.is_empty()
        && !key.starts_with('_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(NoSqlError::InvalidIdentity(key));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_roundtrip_keeps_fields_flat() {
        let doc = Document::new(json!({"id": 1, "name": "test"}).as_object().unwrap().clone());
        let text = serde_json::to_string(&doc).unwrap();
        let parsed: Document = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.get("name"), Some(&json!("test")));
        assert!(!parsed.data.contains_key("_created_at"));
    }

    #[test]
    fn test_project() {
        let doc = Document::new(json!({"id": 1, "name": "a", "age": 3}).as_object().unwrap().clone());
        let projected = doc.project(&["name".to_string()]);
        assert_eq!(projected.len(), 1);
        assert_eq!(doc.project(&[]).len(), 3);
    }

    #[test]
    fn test_identity_key() {
        assert_eq!(identity_key(&json!(12)).unwrap(), "12");
        assert_eq!(identity_key(&json!("abc-1")).unwrap(), "abc-1");
        assert!(identity_key(&json!("../etc")).is_err());
        assert!(identity_key(&json!(1.5)).is_err());
        assert!(identity_key(&json!(null)).is_err());
    }
}
