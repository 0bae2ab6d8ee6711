//! Submission coordinator: maps step completion to create/update calls.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::steps::StepName;
use crate::error::{ApiError, StructuredFieldError};
use crate::fields::FieldSet;
use crate::transport::{Employment, EmploymentApi, NewEmployment};

/// A server field error attached to the step's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldErrorEntry {
    pub field: String,
    pub messages: Vec<String>,
    pub user_friendly_label: String,
}

/// Why a submission did not go through.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionFailure {
    /// The server rejected individual fields.
    Fields {
        message: Option<String>,
        field_errors: Vec<FieldErrorEntry>,
    },
    /// Any other failure, with no field attribution.
    Api { message: String },
}

impl SubmissionFailure {
    pub fn from_api(error: ApiError, fields: &FieldSet) -> Self {
        match error {
            ApiError::Validation(structured) => Self::Fields {
                field_errors: normalize_field_errors(&structured, fields),
                message: structured.message,
            },
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}

/// What the coordinator did for a step.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Nothing to send (country selection, review).
    Skipped,
    Created(Employment),
    Updated(Employment),
}

impl SubmissionOutcome {
    pub fn employment(&self) -> Option<&Employment> {
        match self {
            Self::Skipped => None,
            Self::Created(e) | Self::Updated(e) => Some(e),
        }
    }
}

/// Label each server field error with the originating field's label,
/// falling back to the raw key.
pub fn normalize_field_errors(error: &StructuredFieldError, fields: &FieldSet) -> Vec<FieldErrorEntry> {
    error
        .errors
        .iter()
        .map(|(field, messages)| FieldErrorEntry {
            field: field.clone(),
            messages: messages.clone(),
            user_friendly_label: fields.label_for(field),
        })
        .collect()
}

/// Decides between create and update for each step submission.
///
/// The first form step submitted without an employment id creates one;
/// every later submission patches the step's own section.
pub struct SubmissionCoordinator {
    api: Arc<dyn EmploymentApi>,
    /// Held across the create call so concurrent submissions never create twice.
    employment_id: Mutex<Option<String>>,
    country_code: RwLock<Option<String>>,
}

impl SubmissionCoordinator {
    pub fn new(api: Arc<dyn EmploymentApi>) -> Self {
        Self {
            api,
            employment_id: Mutex::new(None),
            country_code: RwLock::new(None),
        }
    }

    pub async fn employment_id(&self) -> Option<String> {
        self.employment_id.lock().await.clone()
    }

    pub async fn set_employment_id(&self, id: impl Into<String>) {
        *self.employment_id.lock().await = Some(id.into());
    }

    pub async fn country_code(&self) -> Option<String> {
        self.country_code.read().await.clone()
    }

    pub async fn set_country_code(&self, code: impl Into<String>) {
        *self.country_code.write().await = Some(code.into());
    }

    /// Submit one step's parsed payload.
    pub async fn submit(
        &self,
        step: StepName,
        payload: &Map<String, Value>,
    ) -> Result<SubmissionOutcome, ApiError> {
        match step {
            StepName::SelectCountry => {
                if let Some(code) = payload.get("country").and_then(Value::as_str) {
                    self.set_country_code(code).await;
                }
                debug!(step = %step, "Country selection stored locally");
                return Ok(SubmissionOutcome::Skipped);
            }
            StepName::Review => return Ok(SubmissionOutcome::Skipped),
            _ => {}
        }

        let mut id = self.employment_id.lock().await;
        match id.clone() {
            Some(existing) => {
                let employment = self.api.update_employment(&existing, step, payload).await?;
                info!(step = %step, employment_id = %existing, "Updated employment");
                Ok(SubmissionOutcome::Updated(employment))
            }
            None => {
                let body = NewEmployment::new(self.country_code().await, step, payload.clone());
                let employment = self.api.create_employment(&body).await?;
                info!(step = %step, employment_id = %employment.id, "Created employment");
                *id = Some(employment.id.clone());
                Ok(SubmissionOutcome::Created(employment))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::fields::{FieldDescriptor, InputType};

    #[derive(Default)]
    struct CountingApi {
        creates: AtomicUsize,
        updates: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl EmploymentApi for CountingApi {
        async fn create_employment(&self, body: &NewEmployment) -> Result<Employment, ApiError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.reject {
                let mut errors = std::collections::BTreeMap::new();
                errors.insert("email".to_string(), vec!["has already been taken".to_string()]);
                return Err(ApiError::Validation(StructuredFieldError { message: None, errors }));
            }
            let mut employment = Employment::new("emp_1");
            employment.country_code = body.country_code.clone();
            Ok(employment)
        }

        async fn update_employment(
            &self,
            id: &str,
            _step: StepName,
            _payload: &Map<String, Value>,
        ) -> Result<Employment, ApiError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(Employment::new(id))
        }

        async fn get_employment(&self, id: &str) -> Result<Employment, ApiError> {
            Ok(Employment::new(id))
        }

        async fn invite(&self, id: &str) -> Result<Employment, ApiError> {
            Ok(Employment::new(id))
        }
    }

    fn payload() -> Map<String, Value> {
        json!({"name": "Ada"}).as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn creates_once_then_updates() {
        let api = Arc::new(CountingApi::default());
        let coordinator = SubmissionCoordinator::new(api.clone());
        let country = json!({"country": "PRT"}).as_object().unwrap().clone();
        assert_eq!(
            coordinator.submit(StepName::SelectCountry, &country).await.unwrap(),
            SubmissionOutcome::Skipped
        );

        let basic = payload();
        let (first, second) = tokio::join!(
            coordinator.submit(StepName::BasicInformation, &basic),
            coordinator.submit(StepName::BasicInformation, &basic),
        );
        assert!(matches!(first.unwrap(), SubmissionOutcome::Created(ref e) if e.country_code.as_deref() == Some("PRT")));
        assert!(matches!(second.unwrap(), SubmissionOutcome::Updated(_)));

        coordinator.submit(StepName::ContractDetails, &payload()).await.unwrap();
        assert_eq!(api.creates.load(Ordering::SeqCst), 1);
        assert_eq!(api.updates.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.employment_id().await.as_deref(), Some("emp_1"));
    }

    #[tokio::test]
    async fn rejected_create_leaves_no_id() {
        let api = Arc::new(CountingApi {
            reject: true,
            ..Default::default()
        });
        let coordinator = SubmissionCoordinator::new(api);
        let err = coordinator.submit(StepName::BasicInformation, &payload()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(coordinator.employment_id().await.is_none());
    }

    #[test]
    fn normalizes_with_labels() {
        let fields = FieldSet::from_fields(vec![
            FieldDescriptor::new("email", "Personal email", InputType::Text),
        ]);
        let mut errors = std::collections::BTreeMap::new();
        errors.insert("email".to_string(), vec!["has already been taken".to_string()]);
        errors.insert("tax_id".to_string(), vec!["is invalid".to_string()]);
        let structured = StructuredFieldError { message: None, errors };

        let entries = normalize_field_errors(&structured, &fields);
        assert_eq!(
            entries[0],
            FieldErrorEntry {
                field: "email".into(),
                messages: vec!["has already been taken".into()],
                user_friendly_label: "Personal email".into(),
            }
        );
        assert_eq!(entries[1].user_friendly_label, "tax_id");

        let failure = SubmissionFailure::from_api(ApiError::Validation(structured), &fields);
        assert!(matches!(failure, SubmissionFailure::Fields { ref field_errors, .. } if field_errors.len() == 2));
        let failure = SubmissionFailure::from_api(ApiError::Http("reset".into()), &fields);
        assert!(matches!(failure, SubmissionFailure::Api { .. }));
    }
}
