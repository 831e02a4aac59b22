//! Mapper schema declarations
//!
//! A `Schema` is the statically declared field table of one mapper: its
//! source name, its fields, its relations and any per-field validation
//! rules. It is built once and handed to `Mapper::new`, which validates it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::entity::{Accessors, Entity};
use super::error::{Error, Result};
use super::query::SortDirection;
use super::validation::Rule;

/// Declared field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Email,
    Url,
    Tel,
    Password,
    Text,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "boolean")]
    Bool,
    Float,
    Double,
    Date,
    Datetime,
    Time,
    Relation,
}

impl FieldType {
    /// Types stored as short strings
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Email | FieldType::Url | FieldType::Tel | FieldType::Password
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Datetime | FieldType::Time)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Tel => "tel",
            FieldType::Password => "password",
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Time => "time",
            FieldType::Relation => "relation",
        };
        write!(f, "{}", name)
    }
}

/// Column length, either a size or a precision/scale pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Length {
    Size(u32),
    Precision(u32, u32),
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Size(n) => write!(f, "{}", n),
            Length::Precision(p, s) => write!(f, "{},{}", p, s),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Length>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true", alias = "null")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<bool>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, alias = "index")]
    pub indexed: bool,
    #[serde(default, alias = "serial")]
    pub auto_increment: bool,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            default: None,
            length: None,
            required: false,
            nullable: true,
            unsigned: None,
            primary: false,
            unique: false,
            indexed: false,
            auto_increment: false,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn int(name: &str) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn bool(name: &str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn datetime(name: &str) -> Self {
        Self::new(name, FieldType::Datetime)
    }

    pub fn time(name: &str) -> Self {
        Self::new(name, FieldType::Time)
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn serial(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = Some(unsigned);
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(Length::Size(length));
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.length = Some(Length::Precision(precision, scale));
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Declared length, or the type default
    pub fn effective_length(&self) -> Option<Length> {
        self.length.or(match self.field_type {
            t if t.is_string() => Some(Length::Size(255)),
            FieldType::Int => Some(Length::Size(10)),
            FieldType::Float => Some(Length::Precision(10, 2)),
            FieldType::Bool => Some(Length::Size(1)),
            _ => None,
        })
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned
            .unwrap_or(matches!(self.field_type, FieldType::Int))
    }

    /// Column may hold NULL
    pub fn allows_null(&self) -> bool {
        self.nullable && !self.required && !self.primary
    }
}

/// Relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    HasOne,
    HasMany,
}

/// Right-hand side of a relation condition
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// `entity.<field>` - bound to the owning entity's field value
    Field(String),
    Literal(Value),
}

impl RelationValue {
    pub fn parse(value: &Value) -> Self {
        match value.as_str().and_then(|s| s.strip_prefix("entity.")) {
            Some(field) => RelationValue::Field(field.to_string()),
            None => RelationValue::Literal(value.clone()),
        }
    }
}

/// Static constructor of a relation's target schema
pub type SchemaFn = fn() -> Schema;

#[derive(Debug, Clone)]
pub struct RelationDef {
    pub kind: RelationKind,
    pub target: Option<SchemaFn>,
    /// Name the target was declared with, kept for error messages
    pub target_name: Option<String>,
    pub conditions: Vec<(String, RelationValue)>,
    pub order: Vec<(String, SortDirection)>,
}

impl RelationDef {
    pub fn has_many(target: SchemaFn) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn has_one(target: SchemaFn) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    fn new(kind: RelationKind, target: SchemaFn) -> Self {
        Self {
            kind,
            target: Some(target),
            target_name: None,
            conditions: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Add a condition; values written as `entity.<field>` bind to the owner
    pub fn on(mut self, remote_column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.conditions
            .push((remote_column.to_string(), RelationValue::parse(&value)));
        self
    }

    pub fn order(mut self, field: &str, direction: SortDirection) -> Self {
        self.order.push((field.to_string(), direction));
        self
    }

    /// Parse the declaration form
    /// `{"relation": "HasMany", "mapper": "...", "where": {...}, "order": {...}}`.
    /// The target must be bound afterwards with `SchemaBuilder::bind_relation`.
    pub fn from_json(name: &str, value: &Value) -> Result<Self> {
        let kind: RelationKind = value
            .get("relation")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| Error::config(format!("Relation '{}' has no 'relation' kind", name)))?;

        let conditions = match value.get("where") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), RelationValue::parse(v)))
                .collect(),
            _ => {
                return Err(Error::config(format!(
                    "Relation '{}' must define a 'where' map",
                    name
                )))
            }
        };

        let mut order = Vec::new();
        if let Some(Value::Object(map)) = value.get("order") {
            for (field, dir) in map {
                let dir = dir.as_str().unwrap_or("ASC");
                order.push((field.clone(), SortDirection::parse(dir)));
            }
        }

        Ok(Self {
            kind,
            target: None,
            target_name: value.get("mapper").and_then(Value::as_str).map(String::from),
            conditions,
            order,
        })
    }
}

/// Immutable metadata of one mapper
#[derive(Clone)]
pub struct Schema {
    source: String,
    fields: Vec<FieldDef>,
    relations: Vec<(String, RelationDef)>,
    rules: Vec<(String, Rc<dyn Rule>)>,
    accessors: Accessors,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("source", &self.source)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("rules", &self.rules.iter().map(|(f, r)| (f, r.name())).collect::<Vec<_>>())
            .field("accessors", &self.accessors)
            .finish()
    }
}

impl Schema {
    pub fn builder(source: &str) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                source: source.to_string(),
                fields: Vec::new(),
                relations: Vec::new(),
                rules: Vec::new(),
                accessors: Accessors::default(),
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_exists(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary)
    }

    pub fn relations(&self) -> &[(String, RelationDef)] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub fn rules_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Rc<dyn Rule>> + 'a {
        self.rules
            .iter()
            .filter(move |(f, _)| f == field)
            .map(|(_, r)| r)
    }

    pub fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    /// Fail-fast checks run by `Mapper::new`
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(Error::config("Source name must be defined"));
        }
        if self.fields.is_empty() {
            return Err(Error::config(format!(
                "Fields for source '{}' must be defined",
                self.source
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::config("Field names cannot be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::config(format!("Field '{}' declared twice", field.name)));
            }
        }

        let primaries = self.fields.iter().filter(|f| f.primary).count();
        if primaries != 1 {
            return Err(Error::config(format!(
                "Source '{}' must declare exactly one primary field, found {}",
                self.source, primaries
            )));
        }

        for (name, relation) in &self.relations {
            if seen.contains(name.as_str()) {
                return Err(Error::config(format!(
                    "Relation '{}' collides with a field of the same name",
                    name
                )));
            }
            if relation.target.is_none() {
                return Err(Error::config(format!(
                    "Relation '{}' has no target mapper bound{}",
                    name,
                    relation
                        .target_name
                        .as_ref()
                        .map(|t| format!(" (declared as '{}')", t))
                        .unwrap_or_default()
                )));
            }
            if relation.conditions.is_empty() {
                return Err(Error::config(format!("Relation '{}' has no conditions", name)));
            }
            for (_, value) in &relation.conditions {
                if let RelationValue::Field(field) = value {
                    if !seen.contains(field.as_str()) {
                        return Err(Error::config(format!(
                            "Relation '{}' references unknown field 'entity.{}'",
                            name, field
                        )));
                    }
                }
            }
        }

        for (field, _) in &self.rules {
            if !seen.contains(field.as_str()) {
                return Err(Error::config(format!("Rule attached to unknown field '{}'", field)));
            }
        }

        Ok(())
    }
}

pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldDef) -> Self {
        self.schema.fields.push(field);
        self
    }

    pub fn relation(mut self, name: &str, relation: RelationDef) -> Self {
        self.schema.relations.push((name.to_string(), relation));
        self
    }

    pub fn rule(mut self, field: &str, rule: impl Rule + 'static) -> Self {
        self.schema.rules.push((field.to_string(), Rc::new(rule)));
        self
    }

    /// Custom read path for one field
    pub fn getter(mut self, field: &str, getter: impl Fn(&Entity) -> Option<Value> + 'static) -> Self {
        self.schema.accessors.getter(field, getter);
        self
    }

    /// Custom write path for one field
    pub fn setter(mut self, field: &str, setter: impl Fn(&mut Entity, Value) + 'static) -> Self {
        self.schema.accessors.setter(field, setter);
        self
    }

    /// Read a declaration map `{field: {type, default, ...}}`. Relation-typed
    /// entries are pulled out of the field set into the relation list.
    pub fn fields_json(mut self, declarations: &Map<String, Value>) -> Result<Self> {
        for (name, decl) in declarations {
            let is_relation = decl.get("type").and_then(Value::as_str) == Some("relation");
            if is_relation {
                let relation = RelationDef::from_json(name, decl)?;
                self.schema.relations.push((name.clone(), relation));
            } else {
                let mut field: FieldDef = serde_json::from_value(decl.clone())?;
                field.name = name.clone();
                self.schema.fields.push(field);
            }
        }
        Ok(self)
    }

    /// Supply the target of a relation declared through `fields_json`
    pub fn bind_relation(mut self, name: &str, target: SchemaFn) -> Self {
        if let Some((_, relation)) = self.schema.relations.iter_mut().find(|(n, _)| n == name) {
            relation.target = Some(target);
        }
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}
