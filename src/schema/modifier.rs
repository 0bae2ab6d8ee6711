//! Schema modifier: applies caller overrides to a base schema.
//!
//! Overrides are addressed by field path (`work_address.city`,
//! `work_address[city]`) and may set the title, description, hidden flag or
//! arbitrary presentation hints. Paths that do not exist in the schema are
//! skipped so one override set can serve several schema versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{DeclarativeSchema, keys};
use crate::error::SchemaError;

/// Per-field override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Force the field out of rendering, validation and the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// Merged key-by-key into the field's `x-jsf-presentation`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub presentation: Map<String, Value>,
}

/// A full set of overrides for one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaOverrides {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldOverride>,
    /// Replaces the root `x-jsf-order` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
}

impl SchemaOverrides {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.order.is_none()
    }

    /// Add an override for `path`.
    pub fn with_field(mut self, path: impl Into<String>, over: FieldOverride) -> Self {
        self.fields.insert(path.into(), over);
        self
    }

    /// Replace the root field order.
    pub fn with_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = Some(order.into_iter().map(Into::into).collect());
        self
    }
}

/// A parsed dotted/bracket field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse `a.b`, `a[b]` or `a[b].c`.
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::InvalidPath {
            path: raw.to_string(),
        };

        // Rewrite bracket segments as dotted ones, then split.
        let mut dotted = String::with_capacity(raw.len());
        let mut in_bracket = false;
        let mut just_closed = false;
        for c in raw.chars() {
            if just_closed && !matches!(c, '.' | '[') {
                return Err(invalid());
            }
            just_closed = false;
            match c {
                '[' if !in_bracket => {
                    in_bracket = true;
                    dotted.push('.');
                }
                ']' if in_bracket => {
                    in_bracket = false;
                    just_closed = true;
                }
                '[' | ']' => return Err(invalid()),
                '.' if in_bracket => return Err(invalid()),
                _ => dotted.push(c),
            }
        }
        if in_bracket {
            return Err(invalid());
        }

        let segments: Vec<String> = dotted.split('.').map(String::from).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid());
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Dotted form (`a.b.c`).
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

/// Apply `overrides` to `base`, returning a new schema. `base` is untouched.
pub fn modify(base: &DeclarativeSchema, overrides: &SchemaOverrides) -> DeclarativeSchema {
    let mut schema = base.clone();

    for (raw_path, over) in &overrides.fields {
        let path = match FieldPath::parse(raw_path) {
            Ok(path) => path,
            Err(e) => {
                debug!(path = %raw_path, error = %e, "Skipping override with malformed path");
                continue;
            }
        };

        match field_node_mut(schema.root_mut(), path.segments()) {
            Some(node) => apply_override(node, over),
            None => debug!(path = %raw_path, "Skipping override for unknown field"),
        }
    }

    if let Some(order) = &overrides.order {
        schema.root_mut().insert(
            keys::ORDER.to_string(),
            Value::Array(order.iter().cloned().map(Value::String).collect()),
        );
    }

    schema
}

/// Walk `properties` (descending through array `items`) to the field node.
fn field_node_mut<'a>(
    root: &'a mut Map<String, Value>,
    segments: &[String],
) -> Option<&'a mut Map<String, Value>> {
    let (first, rest) = segments.split_first()?;
    let node = root
        .get_mut(keys::PROPERTIES)?
        .as_object_mut()?
        .get_mut(first)?
        .as_object_mut()?;

    if rest.is_empty() {
        return Some(node);
    }

    if node.contains_key(keys::ITEMS) && !node.contains_key(keys::PROPERTIES) {
        let items = node.get_mut(keys::ITEMS)?.as_object_mut()?;
        return field_node_mut(items, rest);
    }
    field_node_mut(node, rest)
}

fn apply_override(node: &mut Map<String, Value>, over: &FieldOverride) {
    if let Some(title) = &over.title {
        node.insert("title".to_string(), Value::String(title.clone()));
    }
    if let Some(description) = &over.description {
        node.insert("description".to_string(), Value::String(description.clone()));
    }

    if over.hidden.is_none() && over.presentation.is_empty() {
        return;
    }

    let presentation = node
        .entry(keys::PRESENTATION.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !presentation.is_object() {
        *presentation = Value::Object(Map::new());
    }
    if let Value::Object(hints) = presentation {
        for (key, value) in &over.presentation {
            hints.insert(key.clone(), value.clone());
        }
        if let Some(hidden) = over.hidden {
            hints.insert("hidden".to_string(), Value::Bool(hidden));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base() -> DeclarativeSchema {
        DeclarativeSchema::from_value(json!({
            "properties": {
                "name": {"title": "Full name", "type": "string"},
                "email": {
                    "title": "Email",
                    "type": "string",
                    "x-jsf-presentation": {"inputType": "text"}
                },
                "work_address": {
                    "title": "Work address",
                    "type": "object",
                    "properties": {
                        "city": {"title": "City", "type": "string"}
                    }
                },
                "dependents": {
                    "type": "array",
                    "items": {
                        "properties": {"relation": {"title": "Relation", "type": "string"}}
                    }
                }
            },
            "x-jsf-order": ["name", "email", "work_address", "dependents"]
        }))
        .unwrap()
    }

    #[test]
    fn parses_paths() {
        assert_eq!(FieldPath::parse("a").unwrap().segments(), ["a"]);
        assert_eq!(FieldPath::parse("a.b.c").unwrap().segments(), ["a", "b", "c"]);
        assert_eq!(FieldPath::parse("a[b]").unwrap().segments(), ["a", "b"]);
        assert_eq!(FieldPath::parse("a[b].c").unwrap().dotted(), "a.b.c");
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a.").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("a[b").is_err());
        assert!(FieldPath::parse("[b]").is_err());
        assert!(FieldPath::parse("a]").is_err());
    }

    #[test]
    fn sets_title_and_description() {
        let overrides = SchemaOverrides::default().with_field(
            "email",
            FieldOverride {
                title: Some("Personal email".into()),
                description: Some("Used for the invite".into()),
                ..Default::default()
            },
        );

        let modified = modify(&base(), &overrides);
        let email = modified.property("email").unwrap();
        assert_eq!(email["title"], "Personal email");
        assert_eq!(email["description"], "Used for the invite");
        assert_eq!(email["x-jsf-presentation"]["inputType"], "text");
    }

    #[test]
    fn reaches_nested_and_array_children() {
        let overrides = SchemaOverrides::default()
            .with_field(
                "work_address.city",
                FieldOverride {
                    title: Some("Town".into()),
                    ..Default::default()
                },
            )
            .with_field(
                "dependents[relation]",
                FieldOverride {
                    hidden: Some(true),
                    ..Default::default()
                },
            );

        let modified = modify(&base(), &overrides);
        let value = serde_json::to_value(&modified).unwrap();
        assert_eq!(value["properties"]["work_address"]["properties"]["city"]["title"], "Town");
        assert_eq!(
            value["properties"]["dependents"]["items"]["properties"]["relation"]
                ["x-jsf-presentation"]["hidden"],
            true
        );
    }

    #[test]
    fn merges_presentation_hints() {
        let mut presentation = Map::new();
        presentation.insert("inputType".into(), json!("textarea"));
        presentation.insert("placeholder".into(), json!("you@example.com"));
        let overrides = SchemaOverrides::default().with_field(
            "email",
            FieldOverride {
                presentation,
                ..Default::default()
            },
        );

        let modified = modify(&base(), &overrides);
        let hints = &modified.property("email").unwrap()["x-jsf-presentation"];
        assert_eq!(hints["inputType"], "textarea");
        assert_eq!(hints["placeholder"], "you@example.com");
    }

    #[test]
    fn unknown_and_malformed_paths_are_ignored() {
        let overrides = SchemaOverrides::default()
            .with_field(
                "not_in_this_version",
                FieldOverride {
                    title: Some("x".into()),
                    ..Default::default()
                },
            )
            .with_field(
                "work_address..city",
                FieldOverride {
                    title: Some("x".into()),
                    ..Default::default()
                },
            );

        let original = base();
        assert_eq!(modify(&original, &overrides), original);
    }

    #[test]
    fn does_not_mutate_base_and_is_deterministic() {
        let original = base();
        let snapshot = original.clone();
        let overrides = SchemaOverrides::default()
            .with_field(
                "name",
                FieldOverride {
                    title: Some("Legal name".into()),
                    ..Default::default()
                },
            )
            .with_order(["email", "name"]);

        let first = modify(&original, &overrides);
        let second = modify(&original, &overrides);
        assert_eq!(original, snapshot);
        assert_eq!(first, second);
        assert_eq!(first.order().unwrap(), ["email", "name"]);
    }
}
