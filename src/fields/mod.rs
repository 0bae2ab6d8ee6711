//! Field descriptors: the resolved, renderable form of schema fields.
//!
//! The resolver produces a [`FieldSet`]: an ordered list of
//! [`FieldDescriptor`]s tagged with a closed [`InputType`], each carrying the
//! [`FieldRule`] it is validated against and its current visibility.

pub mod resolver;
pub mod rules;
pub mod set;

pub use resolver::resolve;
pub(crate) use resolver::ConditionalClause;
pub use rules::{FieldRule, IssueKind, StringFormat};
pub use set::FieldSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The widget kind a field renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Textarea,
    Number,
    Money,
    Select,
    Radio,
    Checkbox,
    Date,
    Fieldset,
    Countries,
    Hidden,
}

impl InputType {
    /// Parse an `x-jsf-presentation.inputType` tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let input = match tag {
            "text" | "email" | "tel" => Self::Text,
            "textarea" => Self::Textarea,
            "number" => Self::Number,
            "money" => Self::Money,
            "select" => Self::Select,
            "radio" => Self::Radio,
            "checkbox" => Self::Checkbox,
            "date" => Self::Date,
            "fieldset" => Self::Fieldset,
            "countries" => Self::Countries,
            "hidden" => Self::Hidden,
            _ => return None,
        };
        Some(input)
    }

    /// Whether the field picks from a list of options.
    pub fn has_options(&self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::Countries)
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Money => "money",
            Self::Select => "select",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
            Self::Fieldset => "fieldset",
            Self::Countries => "countries",
            Self::Hidden => "hidden",
        };
        write!(f, "{s}")
    }
}

/// The JSON type a field's value has in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl JsonType {
    /// Read `type`, which may be a string or a list such as `["string", "null"]`.
    pub fn from_schema(node: &Map<String, Value>) -> Option<Self> {
        let ty = node.get("type")?;
        let name = match ty {
            Value::String(s) => s.as_str(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .find(|s| *s != "null")?,
            _ => return None,
        };
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }
}

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: Value,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl FieldOption {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            meta: None,
        }
    }
}

/// Side effect the owning form runs when a field's value changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEffect {
    /// The field governs conditional clauses; visibility must be recomputed.
    Recompute,
    /// The field's value selects the options of `target` (country → region).
    RepopulateOptions { target: String },
    /// The field's value is the currency of the conversion pair on `field`.
    RetargetConversion { field: String },
}

/// A resolved, renderable schema field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_type: InputType,
    pub json_type: JsonType,
    pub required: bool,
    pub is_visible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    pub rule: FieldRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_change: Option<ChangeEffect>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldDescriptor>,
    /// Currency of a money field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Presentation hints not interpreted by the engine, passed to the renderer.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub presentation: Map<String, Value>,
    /// Bumped whenever this descriptor changes in place.
    pub revision: u64,
    /// Required by the schema root regardless of conditionals.
    #[serde(skip)]
    pub(crate) base_required: bool,
    /// Forced hidden by presentation (`hidden: true`).
    #[serde(skip)]
    pub(crate) force_hidden: bool,
    /// Conditional clauses declared inside a fieldset, over its children.
    #[serde(skip)]
    pub(crate) clauses: Vec<ConditionalClause>,
}

impl FieldDescriptor {
    /// A plain visible text field. Mostly useful for building sets by hand.
    pub fn new(name: impl Into<String>, label: impl Into<String>, input_type: InputType) -> Self {
        let json_type = match input_type {
            InputType::Number => JsonType::Number,
            InputType::Money => JsonType::Integer,
            InputType::Checkbox => JsonType::Boolean,
            InputType::Fieldset => JsonType::Object,
            InputType::Countries => JsonType::Array,
            _ => JsonType::String,
        };
        Self {
            name: name.into(),
            label: label.into(),
            description: None,
            input_type,
            json_type,
            required: false,
            is_visible: true,
            options: Vec::new(),
            rule: FieldRule::for_type(json_type, input_type),
            on_change: None,
            children: Vec::new(),
            currency: None,
            default: None,
            presentation: Map::new(),
            revision: 0,
            base_required: false,
            force_hidden: false,
            clauses: Vec::new(),
        }
    }

    /// Mark the field as always required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self.base_required = true;
        self
    }

    /// Attach options (and restrict the rule to them).
    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.rule.allowed = options.iter().map(|o| o.value.clone()).collect();
        self.options = options;
        self
    }

    /// Whether the field takes part in validation and the payload.
    pub fn is_active(&self) -> bool {
        self.is_visible
    }

    /// Look a child up by name.
    pub fn child(&self, name: &str) -> Option<&FieldDescriptor> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn bump(&mut self) {
        self.revision += 1;
    }
}
