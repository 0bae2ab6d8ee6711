//! Cross-field logic rules.
//!
//! Schemas declare named rules under `x-jsf-logic.validations` and attach
//! them to fields through `x-jsf-logic-validations`:
//!
//! ```json
//! "x-jsf-logic": {
//!   "validations": {
//!     "start_date_not_blocked": {
//!       "errorMessage": "The start date falls within a blocked period",
//!       "rule": {"!": {"and": [
//!         {">=": [{"var": "start_date"}, "2024-12-24"]},
//!         {"<=": [{"var": "start_date"}, "2024-12-26"]}
//!       ]}}
//!     }
//!   }
//! }
//! ```
//!
//! Rules use a JSON-logic dialect. A rule passes when it evaluates truthy and
//! is skipped while any value it reads is still missing.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::fields::rules::is_blank;
use crate::schema::{DeclarativeSchema, keys, string_list};

/// One named rule.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicRule {
    pub error_message: String,
    pub rule: Value,
}

impl LogicRule {
    /// Whether the rule holds for `values`. `None` when a referenced value is missing.
    pub fn evaluate(&self, values: &Map<String, Value>) -> Option<bool> {
        let mut vars = Vec::new();
        collect_vars(&self.rule, &mut vars);
        if vars
            .iter()
            .any(|path| lookup(values, path).is_none_or(is_blank))
        {
            return None;
        }
        Some(truthy(&apply(&self.rule, values)))
    }
}

/// Rule definitions plus the fields that reference them.
#[derive(Debug, Clone, Default)]
pub struct LogicRules {
    rules: BTreeMap<String, LogicRule>,
    /// Field path → rule names, in declaration order.
    bindings: Vec<(String, Vec<String>)>,
}

impl LogicRules {
    /// Read definitions from the root `x-jsf-logic` block and bindings from
    /// every property (recursing into fieldsets).
    pub fn from_schema(schema: &DeclarativeSchema) -> Self {
        let mut rules = Self::default();

        if let Some(defs) = schema
            .logic()
            .and_then(|logic| logic.get("validations"))
            .and_then(Value::as_object)
        {
            for (name, def) in defs {
                let Some(rule) = def.get("rule") else {
                    debug!(rule = %name, "Skipping logic rule without a body");
                    continue;
                };
                let error_message = def
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .unwrap_or("Invalid value")
                    .to_string();
                rules.rules.insert(
                    name.clone(),
                    LogicRule {
                        error_message,
                        rule: rule.clone(),
                    },
                );
            }
        }

        collect_bindings(schema.root(), "", &mut rules.bindings);
        rules
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Define a rule.
    pub fn with_rule(mut self, name: impl Into<String>, error_message: impl Into<String>, rule: Value) -> Self {
        self.rules.insert(
            name.into(),
            LogicRule {
                error_message: error_message.into(),
                rule,
            },
        );
        self
    }

    /// Attach a rule to a field path.
    pub fn bind(mut self, path: impl Into<String>, rule: impl Into<String>) -> Self {
        let path = path.into();
        let rule = rule.into();
        match self.bindings.iter_mut().find(|(p, _)| *p == path) {
            Some((_, names)) => names.push(rule),
            None => self.bindings.push((path, vec![rule])),
        }
        self
    }

    /// `(field path, rule)` pairs in declaration order. Unknown rule names are skipped.
    pub fn bound(&self) -> impl Iterator<Item = (&str, &str, &LogicRule)> {
        self.bindings.iter().flat_map(move |(path, names)| {
            names.iter().filter_map(move |name| match self.rules.get(name) {
                Some(rule) => Some((path.as_str(), name.as_str(), rule)),
                None => {
                    debug!(field = %path, rule = %name, "Field references an undefined logic rule");
                    None
                }
            })
        })
    }
}

fn collect_bindings(node: &Map<String, Value>, prefix: &str, out: &mut Vec<(String, Vec<String>)>) {
    let Some(properties) = node.get(keys::PROPERTIES).and_then(Value::as_object) else {
        return;
    };
    for (name, prop) in properties {
        let Some(prop) = prop.as_object() else {
            continue;
        };
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        if let Some(names) = prop.get(keys::LOGIC_VALIDATIONS).and_then(string_list)
            && !names.is_empty()
        {
            out.push((path.clone(), names));
        }
        collect_bindings(prop, &path, out);
    }
}

// ── Evaluator ───────────────────────────────────────────────────────

/// Evaluate a JSON-logic expression against `data`.
pub fn apply(rule: &Value, data: &Map<String, Value>) -> Value {
    match rule {
        Value::Array(items) => Value::Array(items.iter().map(|i| apply(i, data)).collect()),
        Value::Object(op) if op.len() == 1 => match op.iter().next() {
            Some((name, args)) => operate(name, args, data),
            None => Value::Null,
        },
        other => other.clone(),
    }
}

fn operate(op: &str, args: &Value, data: &Map<String, Value>) -> Value {
    let raw: Vec<&Value> = match args {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    // Short-circuiting operators see their arguments unevaluated.
    match op {
        "and" => {
            let mut last = Value::Bool(true);
            for arg in &raw {
                last = apply(arg, data);
                if !truthy(&last) {
                    return last;
                }
            }
            return last;
        }
        "or" => {
            let mut last = Value::Bool(false);
            for arg in &raw {
                last = apply(arg, data);
                if truthy(&last) {
                    return last;
                }
            }
            return last;
        }
        "if" => {
            for chunk in raw.chunks(2) {
                match chunk {
                    [cond, then] => {
                        if truthy(&apply(cond, data)) {
                            return apply(then, data);
                        }
                    }
                    [otherwise] => return apply(otherwise, data),
                    _ => {}
                }
            }
            return Value::Null;
        }
        _ => {}
    }

    let args: Vec<Value> = raw.iter().map(|a| apply(a, data)).collect();
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

    match op {
        "var" => {
            let path = match arg(0) {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return Value::Object(data.clone()),
            };
            lookup(data, &path).cloned().unwrap_or_else(|| arg(1))
        }
        "==" => Value::Bool(loose_eq(&arg(0), &arg(1))),
        "!=" => Value::Bool(!loose_eq(&arg(0), &arg(1))),
        "===" => Value::Bool(arg(0) == arg(1)),
        "!==" => Value::Bool(arg(0) != arg(1)),
        "!" => Value::Bool(!truthy(&arg(0))),
        "!!" => Value::Bool(truthy(&arg(0))),
        ">" => Value::Bool(compare(&arg(0), &arg(1)) == Some(Ordering::Greater)),
        ">=" => Value::Bool(matches!(compare(&arg(0), &arg(1)), Some(Ordering::Greater | Ordering::Equal))),
        "<" | "<=" => {
            let ok = |o: Option<Ordering>| match op {
                "<" => o == Some(Ordering::Less),
                _ => matches!(o, Some(Ordering::Less | Ordering::Equal)),
            };
            // Three arguments test "between".
            let holds = ok(compare(&arg(0), &arg(1))) && (args.len() < 3 || ok(compare(&arg(1), &arg(2))));
            Value::Bool(holds)
        }
        "in" => Value::Bool(match (arg(0), arg(1)) {
            (needle, Value::Array(hay)) => hay.iter().any(|v| loose_eq(v, &needle)),
            (Value::String(needle), Value::String(hay)) => hay.contains(&needle),
            _ => false,
        }),
        "+" => number(args.iter().filter_map(as_number).sum()),
        "*" => number(args.iter().filter_map(as_number).product()),
        "-" => match (args.first().and_then(as_number), args.get(1).and_then(as_number)) {
            (Some(a), Some(b)) => number(a - b),
            (Some(a), None) => number(-a),
            _ => Value::Null,
        },
        "/" => match (as_number(&arg(0)), as_number(&arg(1))) {
            (Some(a), Some(b)) if b != 0.0 => number(a / b),
            _ => Value::Null,
        },
        other => {
            debug!(op = other, "Unsupported logic operator");
            Value::Null
        }
    }
}

/// JSON-logic truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Dotted path lookup (`work_address.city`).
fn lookup<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn collect_vars(rule: &Value, out: &mut Vec<String>) {
    match rule {
        Value::Object(op) => {
            for (name, args) in op {
                if name == "var" {
                    let path = match args {
                        Value::Array(items) => items.first(),
                        single => Some(single),
                    };
                    if let Some(Value::String(path)) = path
                        && !path.is_empty()
                    {
                        out.push(path.clone());
                    }
                } else {
                    collect_vars(args, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|i| collect_vars(i, out)),
        _ => {}
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(_), Value::String(_)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ if a == b => true,
        _ => matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y),
    }
}

/// Strings compare lexically (ISO dates order correctly); anything else numerically.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}
