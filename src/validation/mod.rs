//! Validation orchestrator.
//!
//! Two independent passes run over the current values:
//!
//! 1. a static pass over each visible field's [`FieldRule`](crate::fields::FieldRule);
//! 2. a logic pass over the schema's cross-field rules.
//!
//! Their results merge into one [`ValidationResult`]. Logic errors win on key
//! collision and the result is valid only if both passes are clean.

pub mod logic;

pub use logic::{LogicRule, LogicRules};

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::fields::{FieldDescriptor, FieldSet, InputType, IssueKind};

/// The error shown next to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormError {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
}

/// One individual failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

/// Every failure of a pass plus the values that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawValidationError {
    pub inner: Vec<FieldIssue>,
    pub value: Map<String, Value>,
}

/// Outcome of a validation run. Always replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub form_errors: BTreeMap<String, FormError>,
    pub raw_error: Option<RawValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.form_errors.is_empty() && self.raw_error.as_ref().is_none_or(|r| r.inner.is_empty())
    }

    fn from_issues(issues: Vec<FieldIssue>, values: &Map<String, Value>) -> Self {
        if issues.is_empty() {
            return Self::default();
        }
        let mut form_errors = BTreeMap::new();
        for issue in &issues {
            form_errors.entry(issue.path.clone()).or_insert_with(|| FormError {
                kind: issue.kind,
                message: issue.message.clone(),
            });
        }
        Self {
            form_errors,
            raw_error: Some(RawValidationError {
                inner: issues,
                value: values.clone(),
            }),
        }
    }
}

/// Run both passes and merge them.
pub fn validate(values: &Map<String, Value>, fields: &FieldSet, rules: &LogicRules) -> ValidationResult {
    let result = merge(static_pass(values, fields), logic_pass(values, fields, rules));
    if !result.is_valid() {
        debug!(errors = result.form_errors.len(), "Validation failed");
    }
    result
}

/// Per-field constraints of visible fields.
pub fn static_pass(values: &Map<String, Value>, fields: &FieldSet) -> ValidationResult {
    let mut issues = Vec::new();
    check_level(fields.fields(), values, "", &mut issues);
    ValidationResult::from_issues(issues, values)
}

fn check_level(fields: &[FieldDescriptor], values: &Map<String, Value>, prefix: &str, issues: &mut Vec<FieldIssue>) {
    for field in fields.iter().filter(|f| f.is_visible) {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let value = values.get(&field.name);

        if field.input_type == InputType::Fieldset {
            match value {
                Some(Value::Object(nested)) => check_level(&field.children, nested, &path, issues),
                Some(other) if !other.is_null() => issues.push(FieldIssue {
                    path,
                    kind: IssueKind::Type,
                    message: "Must be a group of values".to_string(),
                }),
                _ => check_level(&field.children, &Map::new(), &path, issues),
            }
            continue;
        }

        if let Some((kind, message)) = field.rule.check(value, field.required) {
            issues.push(FieldIssue { path, kind, message });
        }
    }
}

/// Cross-field rules bound to visible fields.
pub fn logic_pass(values: &Map<String, Value>, fields: &FieldSet, rules: &LogicRules) -> ValidationResult {
    let mut issues: Vec<FieldIssue> = Vec::new();
    for (path, name, rule) in rules.bound() {
        if !is_visible_path(fields, path) {
            continue;
        }
        if issues.iter().any(|i| i.path == path) {
            continue;
        }
        if rule.evaluate(values) == Some(false) {
            debug!(field = %path, rule = %name, "Logic rule failed");
            issues.push(FieldIssue {
                path: path.to_string(),
                kind: IssueKind::Logic,
                message: rule.error_message.clone(),
            });
        }
    }
    ValidationResult::from_issues(issues, values)
}

fn is_visible_path(fields: &FieldSet, path: &str) -> bool {
    let mut segments = path.split('.');
    let Some(mut current) = segments.next().and_then(|s| fields.get(s)) else {
        return false;
    };
    if !current.is_visible {
        return false;
    }
    for segment in segments {
        match current.child(segment) {
            Some(child) if child.is_visible => current = child,
            _ => return false,
        }
    }
    true
}

/// Shallow-merge form errors (`second` wins), concatenate issues, merge snapshots.
pub fn merge(first: ValidationResult, second: ValidationResult) -> ValidationResult {
    let mut form_errors = first.form_errors;
    form_errors.extend(second.form_errors);

    let raw_error = match (first.raw_error, second.raw_error) {
        (None, None) => None,
        (Some(raw), None) | (None, Some(raw)) => Some(raw),
        (Some(mut a), Some(b)) => {
            a.inner.extend(b.inner);
            a.value.extend(b.value);
            Some(a)
        }
    };

    ValidationResult {
        form_errors,
        raw_error,
    }
}
