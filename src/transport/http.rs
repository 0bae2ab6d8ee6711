//! REST implementation of every collaborator trait.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ConversionRequest, ConversionResponse, CurrencyApi, Employment, EmploymentApi, EstimationApi,
    NewEmployment, SchemaKey, SchemaSource,
};
use crate::config::FlowConfig;
use crate::error::{ApiError, StructuredFieldError};
use crate::estimation::{Country, EstimationPayload, EstimationResult};
use crate::flow::StepName;
use crate::schema::DeclarativeSchema;

/// Responses are wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct EmploymentBody {
    employment: Employment,
}

#[derive(Debug, Deserialize)]
struct CountriesBody {
    countries: Vec<Country>,
}

#[derive(Debug, Serialize)]
struct ExportBody<'a> {
    estimations: &'a [EstimationPayload],
}

/// HTTP client for the API gateway.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpTransport {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "API request");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &url, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let envelope: Envelope<T> = self.send(builder).await?.json().await?;
        Ok(envelope.data)
    }

    async fn send_bytes(&self, builder: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        Ok(self.send(builder).await?.bytes().await?.to_vec())
    }
}

/// Map a non-success response to an [`ApiError`].
///
/// 422 bodies shaped `{"errors": {field: [message]}}` become
/// [`ApiError::Validation`]; anything else keeps the status.
pub(crate) fn error_from_response(status: StatusCode, url: &str, body: &str) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        return ApiError::NotFound(url.to_string());
    }
    if status == StatusCode::UNPROCESSABLE_ENTITY
        && let Ok(structured) = serde_json::from_str::<StructuredFieldError>(body)
    {
        return ApiError::Validation(structured);
    }
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.trim().to_string());
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

pub(crate) fn schema_path(key: &SchemaKey) -> String {
    match &key.country_code {
        Some(cc) => format!("/v1/countries/{cc}/{}", key.form),
        None => format!("/v1/forms/{}", key.form),
    }
}

#[async_trait]
impl SchemaSource for HttpTransport {
    async fn fetch_schema(&self, key: &SchemaKey) -> Result<DeclarativeSchema, ApiError> {
        let value: Value = self.send_json(self.request(Method::GET, &schema_path(key))).await?;
        DeclarativeSchema::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CurrencyApi for HttpTransport {
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResponse, ApiError> {
        self.send_json(self.request(Method::POST, "/v1/currency-converter").json(request))
            .await
    }
}

#[async_trait]
impl EmploymentApi for HttpTransport {
    async fn create_employment(&self, employment: &NewEmployment) -> Result<Employment, ApiError> {
        let body: EmploymentBody = self
            .send_json(self.request(Method::POST, "/v1/employments").json(employment))
            .await?;
        Ok(body.employment)
    }

    async fn update_employment(
        &self,
        id: &str,
        step: StepName,
        payload: &Map<String, Value>,
    ) -> Result<Employment, ApiError> {
        let mut body = Map::new();
        body.insert(step.as_str().to_string(), Value::Object(payload.clone()));
        let body: EmploymentBody = self
            .send_json(
                self.request(Method::PATCH, &format!("/v1/employments/{id}"))
                    .json(&body),
            )
            .await?;
        Ok(body.employment)
    }

    async fn get_employment(&self, id: &str) -> Result<Employment, ApiError> {
        let body: EmploymentBody = self
            .send_json(self.request(Method::GET, &format!("/v1/employments/{id}")))
            .await?;
        Ok(body.employment)
    }

    async fn invite(&self, id: &str) -> Result<Employment, ApiError> {
        let body: EmploymentBody = self
            .send_json(self.request(Method::POST, &format!("/v1/employments/{id}/invite")))
            .await?;
        Ok(body.employment)
    }
}

#[async_trait]
impl EstimationApi for HttpTransport {
    async fn list_countries(&self) -> Result<Vec<Country>, ApiError> {
        let body: CountriesBody = self
            .send_json(self.request(Method::GET, "/v1/cost-calculator/countries"))
            .await?;
        Ok(body.countries)
    }

    async fn create_estimation(&self, payload: &EstimationPayload) -> Result<EstimationResult, ApiError> {
        self.send_json(
            self.request(Method::POST, "/v1/cost-calculator/estimation")
                .json(payload),
        )
        .await
    }

    async fn export_pdf(&self, payloads: &[EstimationPayload]) -> Result<Vec<u8>, ApiError> {
        self.send_bytes(
            self.request(Method::POST, "/v1/cost-calculator/estimation-pdf")
                .json(&ExportBody { estimations: payloads }),
        )
        .await
    }

    async fn export_csv(&self, payloads: &[EstimationPayload]) -> Result<Vec<u8>, ApiError> {
        self.send_bytes(
            self.request(Method::POST, "/v1/cost-calculator/estimation-csv")
                .json(&ExportBody { estimations: payloads }),
        )
        .await
    }
}
