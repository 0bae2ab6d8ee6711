//! Field resolver: turns a declarative schema into a [`FieldSet`].
//!
//! Fields come out in `x-jsf-order` order (undeclared fields follow in
//! declaration order). Root and fieldset-level `if`/`then`/`else` clauses are
//! kept as [`ConditionalClause`]s so visibility and requiredness can be
//! recomputed in place when a governing value changes.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::rules::{FieldRule, is_blank};
use super::set::FieldSet;
use super::{ChangeEffect, FieldDescriptor, FieldOption, InputType, JsonType};
use crate::error::SchemaError;
use crate::schema::{DeclarativeSchema, keys, string_list};

/// Presentation keys the resolver interprets itself.
const INTERPRETED_HINTS: &[&str] = &["inputType", "hidden", "options", "currency", "description"];

/// Resolve a schema into an ordered, annotated field set.
pub fn resolve(schema: &DeclarativeSchema) -> Result<FieldSet, SchemaError> {
    let (fields, clauses) = resolve_object(schema.root(), "")?;
    Ok(FieldSet::new(fields, clauses))
}

fn resolve_object(
    node: &Map<String, Value>,
    path: &str,
) -> Result<(Vec<FieldDescriptor>, Vec<ConditionalClause>), SchemaError> {
    let properties = match node.get(keys::PROPERTIES) {
        None => return Ok((Vec::new(), Vec::new())),
        Some(Value::Object(props)) => props,
        Some(_) => {
            return Err(SchemaError::Malformed {
                path: display_path(path),
                reason: "`properties` must be an object".to_string(),
            });
        }
    };

    let required: HashSet<String> = node
        .get(keys::REQUIRED)
        .and_then(string_list)
        .unwrap_or_default()
        .into_iter()
        .collect();

    let mut fields = Vec::with_capacity(properties.len());
    for (name, prop) in properties {
        let child_path = join(path, name);
        match prop {
            Value::Object(prop) => {
                fields.push(resolve_field(name, prop, required.contains(name), &child_path)?);
            }
            Value::Bool(false) => debug!(field = %child_path, "Property disabled by schema"),
            _ => debug!(field = %child_path, "Skipping non-object property"),
        }
    }

    if let Some(order) = node.get(keys::ORDER).and_then(string_list) {
        sort_by_order(&mut fields, &order);
    }

    let clauses = collect_clauses(node);
    for clause in &clauses {
        for governing in clause.governing_fields() {
            if let Some(field) = fields.iter_mut().find(|f| f.name == governing)
                && field.on_change.is_none()
            {
                field.on_change = Some(ChangeEffect::Recompute);
            }
        }
    }
    bind_currency_selectors(&mut fields, path);

    Ok((fields, clauses))
}

/// A money field whose `currency` hint names a sibling field takes its
/// currency from that field's value instead of a fixed code.
fn bind_currency_selectors(fields: &mut [FieldDescriptor], path: &str) {
    let bindings: Vec<(usize, usize)> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.input_type == InputType::Money)
        .filter_map(|(money, field)| {
            let name = field.currency.as_deref()?;
            let selector = fields
                .iter()
                .position(|f| f.name == name && f.input_type != InputType::Money)?;
            Some((money, selector))
        })
        .collect();

    for (money, selector) in bindings {
        let target = join(path, &fields[money].name);
        fields[money].currency = fields[selector].default.as_ref().and_then(Value::as_str).map(String::from);
        debug!(field = %target, selector = %fields[selector].name, "Money field follows a currency selector");
        fields[selector].on_change = Some(ChangeEffect::RetargetConversion { field: target });
    }
}

fn resolve_field(
    name: &str,
    node: &Map<String, Value>,
    required: bool,
    path: &str,
) -> Result<FieldDescriptor, SchemaError> {
    let hints = node
        .get(keys::PRESENTATION)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let json_type = JsonType::from_schema(node).unwrap_or_else(|| {
        if node.contains_key(keys::PROPERTIES) {
            JsonType::Object
        } else {
            JsonType::String
        }
    });

    let mut options = options_from_schema(node);
    let input_type = match hints.get("inputType").and_then(Value::as_str) {
        Some(tag) => InputType::from_tag(tag).unwrap_or_else(|| {
            debug!(field = %path, tag, "Unknown inputType, using type default");
            default_input(json_type, node, !options.is_empty())
        }),
        None => default_input(json_type, node, !options.is_empty()),
    };

    if let Some(custom) = hints.get("options") {
        if input_type.has_options() {
            options = options_from_list(custom);
        } else {
            debug!(field = %path, %input_type, "Ignoring options override on non-choice field");
        }
    }

    let mut rule = FieldRule::from_schema(node, json_type, input_type);
    if !options.is_empty() {
        rule.allowed = options.iter().map(|o| o.value.clone()).collect();
    }

    let (children, clauses) = if json_type == JsonType::Object {
        resolve_object(node, path)?
    } else {
        (Vec::new(), Vec::new())
    };

    let description = node
        .get("description")
        .or_else(|| hints.get("description"))
        .and_then(Value::as_str)
        .map(String::from);

    let force_hidden = hints.get("hidden").and_then(Value::as_bool).unwrap_or(false);
    let currency = hints.get("currency").and_then(Value::as_str).map(String::from);
    let presentation: Map<String, Value> = hints
        .into_iter()
        .filter(|(k, _)| !INTERPRETED_HINTS.contains(&k.as_str()))
        .collect();

    Ok(FieldDescriptor {
        name: name.to_string(),
        label: node
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string(),
        description,
        input_type,
        json_type,
        required: required && !force_hidden,
        is_visible: !force_hidden,
        options,
        rule,
        on_change: None,
        children,
        currency,
        default: node.get("default").or_else(|| node.get("const")).cloned(),
        presentation,
        revision: 0,
        base_required: required,
        force_hidden,
        clauses,
    })
}

fn default_input(json_type: JsonType, node: &Map<String, Value>, has_options: bool) -> InputType {
    match json_type {
        JsonType::Object => InputType::Fieldset,
        JsonType::Boolean => InputType::Checkbox,
        JsonType::Integer | JsonType::Number => InputType::Number,
        JsonType::Array => InputType::Select,
        JsonType::String if node.get("format").and_then(Value::as_str) == Some("date") => {
            InputType::Date
        }
        JsonType::String if has_options => InputType::Select,
        JsonType::String => InputType::Text,
    }
}

/// Options from `oneOf`/`anyOf`/`enum`, looking inside `items` for arrays.
fn options_from_schema(node: &Map<String, Value>) -> Vec<FieldOption> {
    let items = node.get(keys::ITEMS).and_then(Value::as_object);
    let lookup = |key: &str| node.get(key).or_else(|| items.and_then(|i| i.get(key)));

    if let Some(list) = lookup("oneOf").or_else(|| lookup("anyOf")) {
        return options_from_list(list);
    }
    lookup("enum")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| FieldOption::new(v.clone(), label_of(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts `{const, title}` schema entries and `{value, label}` override entries.
fn options_from_list(list: &Value) -> Vec<FieldOption> {
    let Some(entries) = list.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let entry = entry.as_object()?;
            let value = entry.get("const").or_else(|| entry.get("value"))?.clone();
            let label = entry
                .get("title")
                .or_else(|| entry.get("label"))
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| label_of(&value));
            let meta = entry
                .get(keys::PRESENTATION)
                .and_then(|p| p.get("meta"))
                .or_else(|| entry.get("meta"))
                .or_else(|| entry.get("description"))
                .cloned();
            Some(FieldOption { value, label, meta })
        })
        .collect()
}

fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sort_by_order(fields: &mut [FieldDescriptor], order: &[String]) {
    let rank = |name: &str| order.iter().position(|o| o == name).unwrap_or(usize::MAX);
    // Stable sort keeps declaration order among unlisted fields.
    fields.sort_by_key(|f| rank(&f.name));
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() { "<root>".to_string() } else { path.to_string() }
}

// ── Conditionals ────────────────────────────────────────────────────

/// How a governing field's value is matched.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Matcher {
    Const(Value),
    AnyOf(Vec<Value>),
    Present,
    Not(Box<Matcher>),
}

impl Matcher {
    fn parse(node: &Value) -> Option<Self> {
        let node = node.as_object()?;
        if let Some(value) = node.get("const") {
            return Some(Self::Const(value.clone()));
        }
        if let Some(values) = node.get("enum").and_then(Value::as_array) {
            return Some(Self::AnyOf(values.clone()));
        }
        if let Some(inner) = node.get("not") {
            return Self::parse(inner).map(|m| Self::Not(Box::new(m)));
        }
        None
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        let present = value.filter(|v| !is_blank(v));
        match self {
            Self::Const(expected) => present == Some(expected),
            Self::AnyOf(allowed) => present.is_some_and(|v| allowed.contains(v)),
            Self::Present => present.is_some(),
            Self::Not(inner) => present.is_some() && !inner.matches(value),
        }
    }
}

/// What a branch of a conditional does to sibling fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Branch {
    pub required: Vec<String>,
    pub hidden: Vec<String>,
}

impl Branch {
    fn parse(node: Option<&Value>) -> Self {
        let Some(node) = node.and_then(Value::as_object) else {
            return Self::default();
        };
        let required = node
            .get(keys::REQUIRED)
            .and_then(string_list)
            .unwrap_or_default();
        let hidden = node
            .get(keys::PROPERTIES)
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, v)| matches!(v, Value::Bool(false)))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        Self { required, hidden }
    }
}

/// One `if`/`then`/`else` clause over the fields of a single level.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConditionalClause {
    pub conditions: Vec<(String, Matcher)>,
    pub then_branch: Branch,
    pub else_branch: Branch,
}

impl ConditionalClause {
    fn parse(node: &Map<String, Value>) -> Option<Self> {
        let condition = node.get(keys::IF)?.as_object()?;

        let mut conditions: Vec<(String, Matcher)> = condition
            .get(keys::PROPERTIES)
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, m)| Matcher::parse(m).map(|m| (name.clone(), m)))
                    .collect()
            })
            .unwrap_or_default();

        for name in condition
            .get(keys::REQUIRED)
            .and_then(string_list)
            .unwrap_or_default()
        {
            if !conditions.iter().any(|(n, _)| *n == name) {
                conditions.push((name, Matcher::Present));
            }
        }

        if conditions.is_empty() {
            debug!("Skipping conditional without usable conditions");
            return None;
        }

        Some(Self {
            conditions,
            then_branch: Branch::parse(node.get(keys::THEN)),
            else_branch: Branch::parse(node.get(keys::ELSE)),
        })
    }

    /// Whether every condition holds for `values`.
    pub fn holds(&self, values: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(name, matcher)| matcher.matches(values.get(name)))
    }

    pub fn governing_fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(name, _)| name.as_str())
    }

    /// `(active, inactive)` branches for `values`.
    pub fn branches(&self, values: &Map<String, Value>) -> (&Branch, &Branch) {
        if self.holds(values) {
            (&self.then_branch, &self.else_branch)
        } else {
            (&self.else_branch, &self.then_branch)
        }
    }
}

fn collect_clauses(node: &Map<String, Value>) -> Vec<ConditionalClause> {
    let mut clauses: Vec<ConditionalClause> = node
        .get(keys::ALL_OF)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_object)
                .filter_map(ConditionalClause::parse)
                .collect()
        })
        .unwrap_or_default();
    clauses.extend(ConditionalClause::parse(node));
    clauses
}
