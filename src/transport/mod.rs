//! External collaborators.
//!
//! The engine never talks to the network directly; every schema fetch,
//! conversion and submission goes through one of the traits below.
//! [`HttpTransport`] implements all of them against the REST gateway, and
//! tests plug in in-process stubs.

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::estimation::{Country, EstimationPayload, EstimationResult};
use crate::flow::StepName;
use crate::money::MinorUnits;
use crate::schema::DeclarativeSchema;

// ── Schemas ─────────────────────────────────────────────────────────

/// Identifies one schema: a form name, optionally scoped to a country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
    pub form: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

impl SchemaKey {
    pub fn form(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            country_code: None,
        }
    }

    pub fn for_country(form: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            country_code: Some(country_code.into()),
        }
    }
}

impl std::fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.country_code {
            Some(cc) => write!(f, "{cc}/{}", self.form),
            None => write!(f, "{}", self.form),
        }
    }
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch_schema(&self, key: &SchemaKey) -> Result<DeclarativeSchema, ApiError>;
}

// ── Currency ────────────────────────────────────────────────────────

/// Body of a conversion request. `amount` is in minor units of `source_currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub source_currency: String,
    pub target_currency: String,
    pub amount: MinorUnits,
}

/// `exchange_rate` is always expressed target → source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionData {
    pub exchange_rate: Decimal,
    pub target_amount: MinorUnits,
    pub source_amount: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub conversion_data: ConversionData,
}

#[async_trait]
pub trait CurrencyApi: Send + Sync {
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResponse, ApiError>;
}

// ── Employments ─────────────────────────────────────────────────────

/// Server-side status of an employment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    #[default]
    Created,
    CreatedAwaitingReserve,
    CreatedReservePaid,
    Invited,
    Initiated,
    Review,
    Active,
    Archived,
    #[serde(other)]
    Unknown,
}

impl EmploymentStatus {
    /// Whether a flow opened on this employment starts at the review step.
    pub fn resumes_at_review(self) -> bool {
        !matches!(self, Self::Created | Self::Unknown)
    }
}

impl std::fmt::Display for EmploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::CreatedAwaitingReserve => "created_awaiting_reserve",
            Self::CreatedReservePaid => "created_reserve_paid",
            Self::Invited => "invited",
            Self::Initiated => "initiated",
            Self::Review => "review",
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// An employment as returned by the employment API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employment {
    pub id: String,
    #[serde(default)]
    pub status: EmploymentStatus,
    #[serde(default)]
    pub reserve_payment_required: bool,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub basic_information: Map<String, Value>,
    #[serde(default)]
    pub contract_details: Map<String, Value>,
    #[serde(default)]
    pub benefits: Map<String, Value>,
}

impl Employment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: EmploymentStatus::default(),
            reserve_payment_required: false,
            country_code: None,
            basic_information: Map::new(),
            contract_details: Map::new(),
            benefits: Map::new(),
        }
    }

    /// The values the server holds for a form step.
    pub fn values_for(&self, step: StepName) -> Option<Map<String, Value>> {
        match step {
            StepName::SelectCountry => self.country_code.as_ref().map(|cc| {
                let mut values = Map::new();
                values.insert("country".to_string(), Value::String(cc.clone()));
                values
            }),
            StepName::BasicInformation => Some(self.basic_information.clone()),
            StepName::ContractDetails => Some(self.contract_details.clone()),
            StepName::Benefits => Some(self.benefits.clone()),
            StepName::Review => None,
        }
    }
}

/// Payload of the create call: the country plus the submitting step's section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmployment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

impl NewEmployment {
    pub fn new(country_code: Option<String>, step: StepName, payload: Map<String, Value>) -> Self {
        let mut sections = Map::new();
        sections.insert(step.as_str().to_string(), Value::Object(payload));
        Self {
            country_code,
            sections,
        }
    }
}

#[async_trait]
pub trait EmploymentApi: Send + Sync {
    async fn create_employment(&self, employment: &NewEmployment) -> Result<Employment, ApiError>;

    /// Partial update of one step's sub-resource.
    async fn update_employment(
        &self,
        id: &str,
        step: StepName,
        payload: &Map<String, Value>,
    ) -> Result<Employment, ApiError>;

    async fn get_employment(&self, id: &str) -> Result<Employment, ApiError>;

    async fn invite(&self, id: &str) -> Result<Employment, ApiError>;
}

// ── Estimations ─────────────────────────────────────────────────────

#[async_trait]
pub trait EstimationApi: Send + Sync {
    async fn list_countries(&self) -> Result<Vec<Country>, ApiError>;

    async fn create_estimation(&self, payload: &EstimationPayload) -> Result<EstimationResult, ApiError>;

    /// Export several estimations as one PDF document.
    async fn export_pdf(&self, payloads: &[EstimationPayload]) -> Result<Vec<u8>, ApiError>;

    async fn export_csv(&self, payloads: &[EstimationPayload]) -> Result<Vec<u8>, ApiError>;
}
