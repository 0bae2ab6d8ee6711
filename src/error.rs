//! Error types for the onboarding flows engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Estimation error: {0}")]
    Estimation(#[from] EstimationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while reading or modifying a declarative schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema root must be a JSON object, got {found}")]
    NotAnObject { found: String },

    #[error("Invalid field path: {path}")]
    InvalidPath { path: String },

    #[error("Malformed schema at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Currency lookup failures. Never block submission.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Exchange rate for {source_currency}:{target_currency} is not usable: {rate}")]
    UnusableRate {
        source_currency: String,
        target_currency: String,
        rate: String,
    },

    #[error("Conversion request {source_currency}:{target_currency} failed: {reason}")]
    RequestFailed {
        source_currency: String,
        target_currency: String,
        reason: String,
    },
}

/// A 422-style response mapping field names to messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFieldError {
    #[serde(default)]
    pub message: Option<String>,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl std::fmt::Display for StructuredFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.errors.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Transport errors from the external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(StructuredFieldError),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Step machine misuse.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Step {0} is not part of this flow")]
    UnknownStep(String),

    #[error("Already at the first step")]
    AtFirstStep,

    #[error("Already at the last step")]
    AtLastStep,

    #[error("Every step of the catalog was skipped")]
    EmptyCatalog,

    #[error("No employment has been created yet")]
    NoEmployment,
}

/// Estimation set errors.
#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    #[error("No estimation at index {index} (set holds {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown country: {0}")]
    UnknownCountry(String),

    #[error("No country selected")]
    NoCountry,

    #[error("Estimation form has {} invalid field(s)", .0.form_errors.len())]
    Invalid(crate::validation::ValidationResult),

    #[error("Estimation request failed: {0}")]
    Api(#[from] ApiError),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
