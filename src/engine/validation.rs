//! Validation rules
//!
//! Each rule is an independent predicate over a single value. Rules other
//! than `Required` accept empty values so they compose with it per field.

use serde_json::Value;

pub trait Rule {
    fn name(&self) -> &'static str;

    fn check(&self, value: &Value) -> bool;

    fn message(&self, field: &str) -> String {
        format!("Field '{}' failed the '{}' rule", field, self.name())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim_end().is_empty(),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Required;

impl Rule for Required {
    fn name(&self) -> &'static str {
        "required"
    }

    fn check(&self, value: &Value) -> bool {
        !is_blank(value)
    }

    fn message(&self, field: &str) -> String {
        format!("Required field '{}' was left blank", field)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Alpha;

impl Rule for Alpha {
    fn name(&self) -> &'static str {
        "alpha"
    }

    fn check(&self, value: &Value) -> bool {
        if is_blank(value) {
            return true;
        }
        as_text(value).is_some_and(|s| s.chars().all(char::is_alphabetic))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlphaNumeric;

impl Rule for AlphaNumeric {
    fn name(&self) -> &'static str {
        "alpha_numeric"
    }

    fn check(&self, value: &Value) -> bool {
        if is_blank(value) {
            return true;
        }
        as_text(value).is_some_and(|s| s.chars().all(char::is_alphanumeric))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Numeric;

impl Rule for Numeric {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn check(&self, value: &Value) -> bool {
        match value {
            Value::Number(_) => true,
            Value::String(s) if s.trim_end().is_empty() => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
            Value::Null => true,
            _ => false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Email;

impl Rule for Email {
    fn name(&self) -> &'static str {
        "email"
    }

    fn check(&self, value: &Value) -> bool {
        if is_blank(value) {
            return true;
        }
        match value {
            Value::String(s) => looks_like_email(s),
            _ => false,
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || s.chars().any(char::is_whitespace) {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
