//! Per-field validation rules derived from declared schema constraints.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{InputType, JsonType};
use crate::money;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

/// Why a value failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Required,
    Type,
    Minimum,
    Maximum,
    MinLength,
    MaxLength,
    Pattern,
    Format,
    OneOf,
    /// A cross-field logic rule failed.
    Logic,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::Type => "type",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::MinLength => "min_length",
            Self::MaxLength => "max_length",
            Self::Pattern => "pattern",
            Self::Format => "format",
            Self::OneOf => "one_of",
            Self::Logic => "logic",
        };
        write!(f, "{s}")
    }
}

/// String formats the engine checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringFormat {
    Date,
    Email,
}

/// Composable validation rule for a single field.
///
/// Money fields compare `minimum`/`maximum` in minor units; the value itself
/// may be a display string or a number.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldRule {
    pub json_type: JsonType,
    pub money: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<StringFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip)]
    regex: Option<Regex>,
    /// Permitted values; empty means unrestricted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,
}

impl FieldRule {
    /// A rule with only the type constraint.
    pub fn for_type(json_type: JsonType, input_type: InputType) -> Self {
        Self {
            json_type,
            money: input_type == InputType::Money,
            format: (input_type == InputType::Date).then_some(StringFormat::Date),
            ..Default::default()
        }
    }

    /// Read the declared constraints of a schema node.
    pub fn from_schema(node: &Map<String, Value>, json_type: JsonType, input_type: InputType) -> Self {
        let mut rule = Self::for_type(json_type, input_type);

        rule.minimum = node.get("minimum").and_then(Value::as_f64);
        rule.maximum = node.get("maximum").and_then(Value::as_f64);
        rule.min_length = node.get("minLength").and_then(Value::as_u64).map(|n| n as usize);
        rule.max_length = node.get("maxLength").and_then(Value::as_u64).map(|n| n as usize);

        match node.get("format").and_then(Value::as_str) {
            Some("date") => rule.format = Some(StringFormat::Date),
            Some("email") => rule.format = Some(StringFormat::Email),
            _ => {}
        }

        if let Some(pattern) = node.get("pattern").and_then(Value::as_str) {
            match Regex::new(pattern) {
                Ok(re) => {
                    rule.pattern = Some(pattern.to_string());
                    rule.regex = Some(re);
                }
                Err(e) => debug!(pattern, error = %e, "Ignoring invalid pattern"),
            }
        }

        rule
    }

    /// Check one value. Returns the first failure, if any.
    pub fn check(&self, value: Option<&Value>, required: bool) -> Option<(IssueKind, String)> {
        let value = match value {
            Some(v) if !is_blank(v) => v,
            _ if required => return Some((IssueKind::Required, "Required field".to_string())),
            _ => return None,
        };

        match self.json_type {
            JsonType::String => self.check_string(value),
            JsonType::Integer | JsonType::Number if self.money => self.check_money(value),
            JsonType::Integer | JsonType::Number => self.check_number(value),
            JsonType::Boolean => (!value.is_boolean())
                .then(|| (IssueKind::Type, "Must be true or false".to_string())),
            JsonType::Array => self.check_array(value),
            JsonType::Object => (!value.is_object())
                .then(|| (IssueKind::Type, "Must be a group of values".to_string())),
        }
    }

    fn check_string(&self, value: &Value) -> Option<(IssueKind, String)> {
        let Some(text) = value.as_str() else {
            return Some((IssueKind::Type, "Must be text".to_string()));
        };

        if let Some(issue) = self.check_allowed(value) {
            return Some(issue);
        }

        match self.format {
            Some(StringFormat::Date) if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_err() => {
                return Some((IssueKind::Format, "Must be a date (YYYY-MM-DD)".to_string()));
            }
            Some(StringFormat::Email) if !EMAIL_RE.is_match(text) => {
                return Some((IssueKind::Format, "Please enter a valid email address".to_string()));
            }
            _ => {}
        }

        let len = text.chars().count();
        if let Some(min) = self.min_length.filter(|min| len < *min) {
            return Some((
                IssueKind::MinLength,
                format!("Please insert at least {min} characters"),
            ));
        }
        if let Some(max) = self.max_length.filter(|max| len > *max) {
            return Some((
                IssueKind::MaxLength,
                format!("Please insert up to {max} characters"),
            ));
        }
        if let Some(re) = &self.regex
            && !re.is_match(text)
        {
            return Some((IssueKind::Pattern, "Invalid format".to_string()));
        }
        None
    }

    fn check_number(&self, value: &Value) -> Option<(IssueKind, String)> {
        let Some(number) = numeric(value) else {
            return Some((IssueKind::Type, "Must be a number".to_string()));
        };
        if self.json_type == JsonType::Integer && number.fract() != 0.0 {
            return Some((IssueKind::Type, "Must be a whole number".to_string()));
        }
        if let Some(issue) = self.check_allowed(value) {
            return Some(issue);
        }
        if let Some(min) = self.minimum.filter(|min| number < *min) {
            return Some((IssueKind::Minimum, format!("Must be at least {min}")));
        }
        if let Some(max) = self.maximum.filter(|max| number > *max) {
            return Some((IssueKind::Maximum, format!("Must be no more than {max}")));
        }
        None
    }

    fn check_money(&self, value: &Value) -> Option<(IssueKind, String)> {
        let Some(minor) = money_minor_units(value) else {
            return Some((IssueKind::Type, "Must be an amount".to_string()));
        };
        if let Some(min) = self.minimum.filter(|min| (minor as f64) < *min) {
            return Some((
                IssueKind::Minimum,
                format!("Must be at least {}", money::format_minor(min as i64)),
            ));
        }
        if let Some(max) = self.maximum.filter(|max| (minor as f64) > *max) {
            return Some((
                IssueKind::Maximum,
                format!("Must be no more than {}", money::format_minor(max as i64)),
            ));
        }
        None
    }

    fn check_array(&self, value: &Value) -> Option<(IssueKind, String)> {
        let Some(items) = value.as_array() else {
            return Some((IssueKind::Type, "Must be a list".to_string()));
        };
        if self.allowed.is_empty() {
            return None;
        }
        items
            .iter()
            .find(|item| !self.allowed.contains(item))
            .map(|item| (IssueKind::OneOf, format!("The option {} is not valid.", display(item))))
    }

    fn check_allowed(&self, value: &Value) -> Option<(IssueKind, String)> {
        if self.allowed.is_empty() || self.allowed.contains(value) {
            return None;
        }
        Some((
            IssueKind::OneOf,
            format!("The option {} is not valid.", display(value)),
        ))
    }
}

/// Empty strings, nulls and empty lists count as "no value".
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// A number, or a string holding one.
pub(crate) fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A money field's raw value (display string or decimal number) in minor units.
pub(crate) fn money_minor_units(value: &Value) -> Option<money::MinorUnits> {
    match value {
        Value::String(s) => money::parse_display(s),
        Value::Number(n) => money::parse_display(&n.to_string()),
        _ => None,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rule(node: Value, json_type: JsonType, input: InputType) -> FieldRule {
        FieldRule::from_schema(node.as_object().unwrap(), json_type, input)
    }

    #[test]
    fn required_and_blank_values() {
        let r = FieldRule::for_type(JsonType::String, InputType::Text);
        assert_eq!(r.check(None, true).unwrap().0, IssueKind::Required);
        assert_eq!(r.check(Some(&json!("  ")), true).unwrap().0, IssueKind::Required);
        assert!(r.check(None, false).is_none());
        assert!(r.check(Some(&json!("")), false).is_none());
        assert!(r.check(Some(&json!("Ada")), true).is_none());
    }

    #[test]
    fn string_constraints() {
        let r = rule(
            json!({"minLength": 2, "maxLength": 4, "pattern": "^[A-Z]+$"}),
            JsonType::String,
            InputType::Text,
        );
        assert_eq!(r.check(Some(&json!("A")), false).unwrap().0, IssueKind::MinLength);
        assert_eq!(r.check(Some(&json!("ABCDE")), false).unwrap().0, IssueKind::MaxLength);
        assert_eq!(r.check(Some(&json!("abc")), false).unwrap().0, IssueKind::Pattern);
        assert_eq!(r.check(Some(&json!(12)), false).unwrap().0, IssueKind::Type);
        assert!(r.check(Some(&json!("ABC")), false).is_none());
    }

    #[test]
    fn formats() {
        let date = rule(json!({"format": "date"}), JsonType::String, InputType::Text);
        assert!(date.check(Some(&json!("2024-02-29")), true).is_none());
        assert_eq!(date.check(Some(&json!("2023-02-29")), true).unwrap().0, IssueKind::Format);

        let email = rule(json!({"format": "email"}), JsonType::String, InputType::Text);
        assert!(email.check(Some(&json!("ada@example.com")), true).is_none());
        assert_eq!(email.check(Some(&json!("ada@")), true).unwrap().0, IssueKind::Format);
    }

    #[test]
    fn numbers() {
        let r = rule(json!({"minimum": 1, "maximum": 60}), JsonType::Integer, InputType::Number);
        assert!(r.check(Some(&json!(40)), true).is_none());
        assert!(r.check(Some(&json!("40")), true).is_none());
        assert_eq!(r.check(Some(&json!(0)), true).unwrap().0, IssueKind::Minimum);
        assert_eq!(r.check(Some(&json!(61)), true).unwrap(), (IssueKind::Maximum, "Must be no more than 60".into()));
        assert_eq!(r.check(Some(&json!(1.5)), true).unwrap().0, IssueKind::Type);
        assert_eq!(r.check(Some(&json!("lots")), true).unwrap().0, IssueKind::Type);
    }

    #[test]
    fn money_compares_minor_units() {
        let r = rule(json!({"minimum": 100000}), JsonType::Integer, InputType::Money);
        assert!(r.money);
        assert!(r.check(Some(&json!("1,000.00")), true).is_none());
        assert_eq!(
            r.check(Some(&json!("999.99")), true).unwrap(),
            (IssueKind::Minimum, "Must be at least 1000.00".into())
        );
        assert!(r.check(Some(&json!(2500.5)), true).is_none());
        assert_eq!(r.check(Some(&json!("ten")), true).unwrap().0, IssueKind::Type);
        assert_eq!(
            r.check(Some(&json!("1000000000000000000000000000")), true).unwrap().0,
            IssueKind::Type
        );
        assert_eq!(money_minor_units(&json!("79228162514264337593543950335")), None);
    }

    #[test]
    fn allowed_values() {
        let mut r = FieldRule::for_type(JsonType::String, InputType::Radio);
        r.allowed = vec![json!("yes"), json!("no")];
        assert!(r.check(Some(&json!("yes")), true).is_none());
        assert_eq!(
            r.check(Some(&json!("maybe")), true).unwrap(),
            (IssueKind::OneOf, "The option \"maybe\" is not valid.".into())
        );

        let mut list = FieldRule::for_type(JsonType::Array, InputType::Countries);
        list.allowed = vec![json!("PRT"), json!("ESP")];
        assert!(list.check(Some(&json!(["PRT"])), true).is_none());
        assert_eq!(list.check(Some(&json!(["PRT", "FRA"])), true).unwrap().0, IssueKind::OneOf);
        assert_eq!(list.check(Some(&json!([])), true).unwrap().0, IssueKind::Required);
    }

    #[test]
    fn invalid_pattern_is_ignored() {
        let r = rule(json!({"pattern": "(["}), JsonType::String, InputType::Text);
        assert!(r.pattern.is_none());
        assert!(r.check(Some(&json!("anything")), true).is_none());
    }
}
