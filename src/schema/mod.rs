//! Declarative schemas: JSON-Schema-like documents with presentation hints.
//!
//! A schema arrives from the schema source as a JSON object with
//! `properties`, `required`, conditional `allOf`/`if`/`then`/`else`
//! clauses and the `x-jsf-*` extension keys. [`modifier`] applies caller
//! overrides on top before the field resolver turns it into descriptors.

pub mod modifier;

pub use modifier::{FieldOverride, FieldPath, SchemaOverrides, modify};

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Extension keys recognised in schema documents.
pub mod keys {
    pub const PROPERTIES: &str = "properties";
    pub const REQUIRED: &str = "required";
    pub const ITEMS: &str = "items";
    pub const ALL_OF: &str = "allOf";
    pub const IF: &str = "if";
    pub const THEN: &str = "then";
    pub const ELSE: &str = "else";
    pub const PRESENTATION: &str = "x-jsf-presentation";
    pub const ORDER: &str = "x-jsf-order";
    pub const LOGIC: &str = "x-jsf-logic";
    pub const LOGIC_VALIDATIONS: &str = "x-jsf-logic-validations";
}

/// A server-provided declarative schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DeclarativeSchema(Map<String, Value>);

impl DeclarativeSchema {
    /// Wrap a JSON value. The root must be an object.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SchemaError::NotAnObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    /// Parse a schema from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Read and parse a schema file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// The root object.
    pub fn root(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn root_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Root-level `properties`, in declaration order.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.0.get(keys::PROPERTIES).and_then(Value::as_object)
    }

    /// A root-level property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().and_then(|p| p.get(name))
    }

    /// Root-level `x-jsf-order`, if declared.
    pub fn order(&self) -> Option<Vec<String>> {
        string_list(self.0.get(keys::ORDER)?)
    }

    /// Root-level `x-jsf-logic` block.
    pub fn logic(&self) -> Option<&Map<String, Value>> {
        self.0.get(keys::LOGIC).and_then(Value::as_object)
    }
}

impl TryFrom<Value> for DeclarativeSchema {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<DeclarativeSchema> for Value {
    fn from(schema: DeclarativeSchema) -> Self {
        Value::Object(schema.0)
    }
}

/// Read a JSON array of strings; non-string entries are skipped.
pub(crate) fn string_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    })
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
