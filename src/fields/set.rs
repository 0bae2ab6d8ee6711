//! The resolved field collection of one form.
//!
//! Descriptors are mutated in place when upstream values change so a
//! renderer holding on to unaffected fields keeps their identity; each
//! changed descriptor gets its `revision` bumped.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::resolver::ConditionalClause;
use super::rules::{is_blank, money_minor_units, numeric};
use super::{ChangeEffect, FieldDescriptor, FieldOption, InputType, JsonType};

/// Ordered field descriptors plus the conditionals that govern them.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FieldSet {
    fields: Vec<FieldDescriptor>,
    #[serde(skip)]
    clauses: Vec<ConditionalClause>,
    /// Values last passed to [`FieldSet::apply_values`].
    #[serde(skip)]
    values: Map<String, Value>,
}

impl FieldSet {
    pub(crate) fn new(fields: Vec<FieldDescriptor>, clauses: Vec<ConditionalClause>) -> Self {
        let mut set = Self {
            fields,
            clauses,
            values: Map::new(),
        };
        set.recompute(false);
        set
    }

    /// Build a set from hand-made descriptors, with no conditionals.
    pub fn from_fields(fields: Vec<FieldDescriptor>) -> Self {
        Self::new(fields, Vec::new())
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A root-level field by name.
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A field by dotted path (`work_address.city`).
    pub fn find(&self, path: &str) -> Option<&FieldDescriptor> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut FieldDescriptor> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.iter_mut().find(|f| f.name == first)?;
        for segment in segments {
            current = current.children.iter_mut().find(|c| c.name == segment)?;
        }
        Some(current)
    }

    /// Root-level fields currently taking part in validation and the payload.
    pub fn visible(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_visible)
    }

    /// Money fields anywhere in the set, as dotted paths.
    pub fn money_fields(&self) -> Vec<(String, &FieldDescriptor)> {
        fn walk<'a>(fields: &'a [FieldDescriptor], prefix: &str, out: &mut Vec<(String, &'a FieldDescriptor)>) {
            for field in fields {
                let path = join(prefix, &field.name);
                if field.input_type == InputType::Money {
                    out.push((path.clone(), field));
                }
                walk(&field.children, &path, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.fields, "", &mut out);
        out
    }

    /// Dotted path of the field whose value picks the currency of the money
    /// field at `money_path`.
    pub fn currency_selector(&self, money_path: &str) -> Option<String> {
        fn walk(fields: &[FieldDescriptor], prefix: &str, money_path: &str) -> Option<String> {
            fields.iter().find_map(|field| {
                let path = join(prefix, &field.name);
                match &field.on_change {
                    Some(ChangeEffect::RetargetConversion { field: target }) if target == money_path => Some(path),
                    _ => walk(&field.children, &path, money_path),
                }
            })
        }
        walk(&self.fields, "", money_path)
    }

    /// The values last applied.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Recompute visibility and requiredness for `values`.
    ///
    /// Returns the dotted paths of descriptors that changed.
    pub fn apply_values(&mut self, values: &Map<String, Value>) -> Vec<String> {
        self.values = values.clone();
        self.recompute(true)
    }

    fn recompute(&mut self, bump: bool) -> Vec<String> {
        let mut changed = Vec::new();
        apply_level(&mut self.fields, &self.clauses, &self.values, "", bump, &mut changed);
        changed
    }

    /// Replace the options of a choice field in place.
    pub fn set_options(&mut self, path: &str, options: Vec<FieldOption>) -> bool {
        let Some(field) = self.find_mut(path) else {
            return false;
        };
        if !field.input_type.has_options() {
            debug!(field = %path, input_type = %field.input_type, "Not a choice field, ignoring options");
            return false;
        }
        if field.options == options {
            return false;
        }
        field.rule.allowed = options.iter().map(|o| o.value.clone()).collect();
        field.options = options;
        field.bump();
        true
    }

    /// Force a field hidden (or release it back to its conditionals).
    pub fn set_visible(&mut self, path: &str, visible: bool) -> bool {
        let Some(field) = self.find_mut(path) else {
            return false;
        };
        if field.force_hidden == !visible {
            return false;
        }
        field.force_hidden = !visible;
        let changed = self.recompute(true);
        changed.iter().any(|p| p == path)
    }

    /// Change the currency of a money field in place.
    pub fn set_currency(&mut self, path: &str, currency: &str) -> bool {
        let Some(field) = self.find_mut(path) else {
            return false;
        };
        if field.input_type != InputType::Money || field.currency.as_deref() == Some(currency) {
            return false;
        }
        field.currency = Some(currency.to_string());
        field.bump();
        true
    }

    /// Human label for an error key: dotted path, then leaf name, then the key itself.
    pub fn label_for(&self, key: &str) -> String {
        if let Some(field) = self.find(key) {
            return field.label.clone();
        }
        fn by_name<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
            fields
                .iter()
                .find(|f| f.name == name)
                .or_else(|| fields.iter().find_map(|f| by_name(&f.children, name)))
        }
        let leaf = key.rsplit('.').next().unwrap_or(key);
        by_name(&self.fields, leaf)
            .map(|f| f.label.clone())
            .unwrap_or_else(|| key.to_string())
    }

    /// Default values declared by the schema, for visible fields.
    pub fn defaults(&self) -> Map<String, Value> {
        fn walk(fields: &[FieldDescriptor]) -> Map<String, Value> {
            let mut out = Map::new();
            for field in fields.iter().filter(|f| f.is_visible) {
                if field.input_type == InputType::Fieldset {
                    let nested = walk(&field.children);
                    if !nested.is_empty() {
                        out.insert(field.name.clone(), Value::Object(nested));
                    }
                } else if let Some(default) = &field.default {
                    out.insert(field.name.clone(), default.clone());
                }
            }
            out
        }
        walk(&self.fields)
    }

    /// Build the submission payload from raw form values.
    ///
    /// Hidden fields are dropped, money amounts become minor units, numbers
    /// and checkboxes are coerced, and fieldsets recurse.
    pub fn parse_values(&self, values: &Map<String, Value>) -> Map<String, Value> {
        parse_level(&self.fields, values)
    }
}

fn apply_level(
    fields: &mut [FieldDescriptor],
    clauses: &[ConditionalClause],
    values: &Map<String, Value>,
    prefix: &str,
    bump: bool,
    changed: &mut Vec<String>,
) {
    let mut required: HashSet<&str> = HashSet::new();
    let mut hidden: HashSet<&str> = HashSet::new();
    let mut conditionally_required: HashSet<&str> = HashSet::new();

    for clause in clauses {
        let (active, inactive) = clause.branches(values);
        required.extend(active.required.iter().map(String::as_str));
        hidden.extend(active.hidden.iter().map(String::as_str));
        conditionally_required.extend(inactive.required.iter().map(String::as_str));
    }

    for field in fields.iter_mut() {
        let name = field.name.as_str();
        // Only required when some other condition holds: hide until it does.
        let dormant = conditionally_required.contains(name)
            && !required.contains(name)
            && !field.base_required;
        let visible = !field.force_hidden && !hidden.contains(name) && !dormant;
        let is_required = visible && (field.base_required || required.contains(name));

        let path = join(prefix, &field.name);
        if field.is_visible != visible || field.required != is_required {
            field.is_visible = visible;
            field.required = is_required;
            if bump {
                field.bump();
            }
            changed.push(path.clone());
        }

        if !field.children.is_empty() {
            let empty = Map::new();
            let nested = values
                .get(&field.name)
                .and_then(Value::as_object)
                .unwrap_or(&empty);
            let clauses = std::mem::take(&mut field.clauses);
            apply_level(&mut field.children, &clauses, nested, &path, bump, changed);
            field.clauses = clauses;
        }
    }
}

fn parse_level(fields: &[FieldDescriptor], values: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields.iter().filter(|f| f.is_visible) {
        let raw = values.get(&field.name);

        if field.input_type == InputType::Fieldset {
            if let Some(Value::Object(nested)) = raw {
                out.insert(field.name.clone(), Value::Object(parse_level(&field.children, nested)));
            }
            continue;
        }

        let raw = match raw {
            Some(v) if !is_blank(v) => v,
            _ => {
                if field.input_type == InputType::Hidden
                    && let Some(default) = &field.default
                {
                    out.insert(field.name.clone(), default.clone());
                }
                continue;
            }
        };

        if let Some(parsed) = coerce(field, raw) {
            out.insert(field.name.clone(), parsed);
        } else {
            debug!(field = %field.name, "Dropping value that does not fit the field type");
        }
    }
    out
}

fn coerce(field: &FieldDescriptor, raw: &Value) -> Option<Value> {
    if field.input_type == InputType::Money {
        return money_minor_units(raw).map(|minor| Value::Number(minor.into()));
    }
    match field.json_type {
        JsonType::Integer => {
            if let Some(n) = raw.as_i64() {
                return Some(Value::Number(n.into()));
            }
            let n = numeric(raw)?;
            // i64::MAX as f64 rounds up to 2^63, which is already out of range.
            let in_range = n >= i64::MIN as f64 && n < i64::MAX as f64;
            (n.fract() == 0.0 && in_range).then(|| Value::Number((n as i64).into()))
        }
        JsonType::Number => {
            if raw.is_number() {
                return Some(raw.clone());
            }
            numeric(raw).and_then(Number::from_f64).map(Value::Number)
        }
        JsonType::Boolean => match raw {
            Value::Bool(_) => Some(raw.clone()),
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => Some(raw.clone()),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fields::resolve;
    use crate::schema::DeclarativeSchema;

    fn seniority_set() -> FieldSet {
        resolve(
            &DeclarativeSchema::from_value(json!({
                "properties": {
                    "name": {"title": "Full name", "type": "string"},
                    "has_seniority_date": {
                        "title": "Has seniority date?",
                        "type": "string",
                        "oneOf": [{"const": "yes", "title": "Yes"}, {"const": "no", "title": "No"}],
                        "x-jsf-presentation": {"inputType": "radio"}
                    },
                    "seniority_date": {"title": "Seniority date", "type": "string", "format": "date"},
                    "salary": {"type": "integer", "x-jsf-presentation": {"inputType": "money", "currency": "EUR"}},
                    "hours": {"type": "integer"},
                    "remote": {"type": "boolean"},
                    "work_address": {
                        "type": "object",
                        "properties": {
                            "city": {"title": "City", "type": "string"},
                            "has_state": {"type": "string", "enum": ["yes", "no"]},
                            "state": {"title": "State", "type": "string"}
                        },
                        "allOf": [{
                            "if": {"properties": {"has_state": {"const": "yes"}}},
                            "then": {"required": ["state"]}
                        }]
                    }
                },
                "required": ["name", "has_seniority_date"],
                "allOf": [{
                    "if": {"properties": {"has_seniority_date": {"const": "yes"}}, "required": ["has_seniority_date"]},
                    "then": {"required": ["seniority_date"]},
                    "else": {"properties": {"seniority_date": false}}
                }]
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn toggling_governing_field_recomputes_visibility() {
        let mut set = seniority_set();
        let field = set.get("seniority_date").unwrap();
        assert!(!field.is_visible && !field.required);

        let changed = set.apply_values(&values(json!({"has_seniority_date": "yes"})));
        assert_eq!(changed, ["seniority_date"]);
        let field = set.get("seniority_date").unwrap();
        assert!(field.is_visible && field.required);
        assert_eq!(field.revision, 1);

        set.apply_values(&values(json!({"has_seniority_date": "no"})));
        let field = set.get("seniority_date").unwrap();
        assert!(!field.is_visible);
        assert!(!field.required);
        assert_eq!(field.revision, 2);
    }

    #[test]
    fn unaffected_fields_keep_their_revision() {
        let mut set = seniority_set();
        set.apply_values(&values(json!({"has_seniority_date": "yes", "name": "Ada"})));
        assert_eq!(set.get("name").unwrap().revision, 0);
        assert_eq!(set.get("has_seniority_date").unwrap().revision, 0);
    }

    #[test]
    fn nested_conditionals() {
        let mut set = seniority_set();
        assert!(!set.find("work_address.state").unwrap().is_visible);

        let changed = set.apply_values(&values(json!({"work_address": {"has_state": "yes"}})));
        assert_eq!(changed, ["work_address.state"]);
        let state = set.find("work_address.state").unwrap();
        assert!(state.is_visible && state.required);
    }

    #[test]
    fn parse_values_builds_payload() {
        let mut set = seniority_set();
        let raw = values(json!({
            "name": "Ada",
            "has_seniority_date": "no",
            "seniority_date": "2020-01-01",
            "salary": "45,000.50",
            "hours": "40",
            "remote": "true",
            "work_address": {"city": "Lisbon", "state": "ignored"},
            "unknown": "dropped"
        }));
        set.apply_values(&raw);

        let payload = set.parse_values(&raw);
        assert_eq!(
            Value::Object(payload),
            json!({
                "name": "Ada",
                "has_seniority_date": "no",
                "salary": 4_500_050,
                "hours": 40,
                "remote": true,
                "work_address": {"city": "Lisbon"}
            })
        );
    }

    #[test]
    fn out_of_range_numbers_are_dropped() {
        let mut set = seniority_set();
        let raw = values(json!({
            "name": "Ada",
            "salary": "1000000000000000000000000000",
            "hours": "1e30"
        }));
        set.apply_values(&raw);

        let payload = set.parse_values(&raw);
        assert_eq!(Value::Object(payload), json!({"name": "Ada"}));

        let raw = values(json!({"hours": i64::MAX}));
        assert_eq!(set.parse_values(&raw)["hours"], json!(i64::MAX));
    }

    #[test]
    fn set_options_and_currency_in_place() {
        let mut set = seniority_set();
        assert!(set.set_options(
            "has_seniority_date",
            vec![FieldOption::new("yes", "Yes"), FieldOption::new("no", "No"), FieldOption::new("later", "Later")]
        ));
        let field = set.get("has_seniority_date").unwrap();
        assert_eq!(field.options.len(), 3);
        assert_eq!(field.rule.allowed.len(), 3);
        assert_eq!(field.revision, 1);

        assert!(!set.set_options("name", vec![FieldOption::new("x", "X")]));
        assert!(!set.set_options("nope", Vec::new()));

        assert!(set.set_currency("salary", "USD"));
        assert!(!set.set_currency("salary", "USD"));
        assert_eq!(set.get("salary").unwrap().currency.as_deref(), Some("USD"));
        assert!(!set.set_currency("name", "USD"));
    }

    #[test]
    fn set_visible_forces_hidden() {
        let mut set = seniority_set();
        assert!(set.set_visible("name", false));
        let name = set.get("name").unwrap();
        assert!(!name.is_visible && !name.required);
        assert!(set.set_visible("name", true));
        assert!(set.get("name").unwrap().required);
    }

    #[test]
    fn labels_fall_back_to_key() {
        let set = seniority_set();
        assert_eq!(set.label_for("name"), "Full name");
        assert_eq!(set.label_for("work_address.city"), "City");
        assert_eq!(set.label_for("city"), "City");
        assert_eq!(set.label_for("tax_id"), "tax_id");
    }

    #[test]
    fn money_fields_and_defaults() {
        let set = FieldSet::from_fields(vec![
            FieldDescriptor::new("salary", "Salary", InputType::Money),
            FieldDescriptor {
                default: Some(json!("EUR")),
                ..FieldDescriptor::new("currency", "Currency", InputType::Select)
            },
        ]);
        let money: Vec<String> = set.money_fields().into_iter().map(|(p, _)| p).collect();
        assert_eq!(money, ["salary"]);
        assert_eq!(Value::Object(set.defaults()), json!({"currency": "EUR"}));
    }
}
