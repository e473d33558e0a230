//! Tree-structured key/value records used for persistence.
//!
//! A record has a type tag, a flat set of named scalar properties and an
//! ordered list of child records. It serializes to JSON through serde.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            PropertyValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Float(v) => Some(*v as i64),
            PropertyValue::Bool(v) => Some(*v as i64),
            PropertyValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(v: usize) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTree {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StateTree>,
}

impl StateTree {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn has_type(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Fail unless this record carries the expected type tag.
    pub fn expect_type(&self, kind: &str) -> Result<()> {
        if self.has_type(kind) {
            Ok(())
        } else {
            Err(Error::WrongRecordType {
                expected: kind.to_string(),
                found: self.kind.clone(),
            })
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn get_f32_or(&self, key: &str, default: f32) -> f32 {
        self.get(key)
            .and_then(PropertyValue::as_f64)
            .map(|v| v as f32)
            .unwrap_or(default)
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(PropertyValue::as_i64)
            .unwrap_or(default)
    }

    pub fn add_child(&mut self, child: StateTree) {
        self.children.push(child);
    }

    pub fn children_of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a StateTree> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
