//! End-to-end tests for the onboarding flow.
//!
//! Every collaborator is an in-process stub; no test touches the network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;
use tokio::time::timeout;

use onboarding_flows::config::FlowConfig;
use onboarding_flows::error::{ApiError, Error, FlowError, StructuredFieldError};
use onboarding_flows::fields::{ChangeEffect, IssueKind};
use onboarding_flows::flow::{
    FlowDeps, FlowEvents, OnboardingFlow, ReviewState, StepName, StepOutcome, StepStatus, SubmissionFailure,
    SubmissionOutcome,
};
use onboarding_flows::schema::{DeclarativeSchema, FieldOverride, SchemaOverrides};
use onboarding_flows::transport::{
    ConversionData, ConversionRequest, ConversionResponse, CurrencyApi, Employment, EmploymentApi,
    EmploymentStatus, NewEmployment, SchemaKey, SchemaSource,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Stubs ───────────────────────────────────────────────────────────

struct StubSchemas {
    schemas: HashMap<&'static str, Value>,
    fetched: Mutex<Vec<SchemaKey>>,
}

impl StubSchemas {
    fn new() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            "select_country",
            json!({
                "properties": {
                    "country": {
                        "title": "Country",
                        "type": "string",
                        "oneOf": [{"const": "PRT", "title": "Portugal"}, {"const": "ESP", "title": "Spain"}],
                        "x-jsf-presentation": {"inputType": "select"}
                    }
                },
                "required": ["country"]
            }),
        );
        schemas.insert(
            "employment_basic_information",
            json!({
                "properties": {
                    "name": {"title": "Full name", "type": "string"},
                    "email": {"title": "Personal email", "type": "string"},
                    "has_seniority_date": {
                        "title": "Has seniority date?",
                        "type": "string",
                        "oneOf": [{"const": "yes", "title": "Yes"}, {"const": "no", "title": "No"}],
                        "x-jsf-presentation": {"inputType": "radio"}
                    },
                    "seniority_date": {"title": "Seniority date", "type": "string", "format": "date"}
                },
                "required": ["name", "email"],
                "x-jsf-order": ["name", "email", "has_seniority_date", "seniority_date"],
                "allOf": [{
                    "if": {"properties": {"has_seniority_date": {"const": "yes"}}, "required": ["has_seniority_date"]},
                    "then": {"required": ["seniority_date"]},
                    "else": {"properties": {"seniority_date": false}}
                }]
            }),
        );
        schemas.insert(
            "contract_details",
            json!({
                "properties": {
                    "salary": {
                        "title": "Annual gross salary",
                        "type": "integer",
                        "x-jsf-presentation": {"inputType": "money", "currency": "EUR"}
                    },
                    "bonus_currency": {
                        "title": "Bonus currency",
                        "type": "string",
                        "default": "EUR",
                        "oneOf": [{"const": "EUR", "title": "Euro"}, {"const": "GBP", "title": "Pound sterling"}],
                        "x-jsf-presentation": {"inputType": "select"}
                    },
                    "bonus": {
                        "title": "Signing bonus",
                        "type": "integer",
                        "x-jsf-presentation": {"inputType": "money", "currency": "bonus_currency"}
                    },
                    "start_date": {
                        "title": "Start date",
                        "type": "string",
                        "format": "date",
                        "x-jsf-logic-validations": ["start_date_not_blocked"]
                    }
                },
                "required": ["salary", "start_date"],
                "x-jsf-logic": {
                    "validations": {
                        "start_date_not_blocked": {
                            "errorMessage": "The start date falls within a blocked period",
                            "rule": {"!": {"and": [
                                {">=": [{"var": "start_date"}, "2024-12-24"]},
                                {"<=": [{"var": "start_date"}, "2024-12-26"]}
                            ]}}
                        }
                    }
                }
            }),
        );
        schemas.insert(
            "benefits",
            json!({
                "properties": {
                    "health": {"title": "Health plan", "type": "string", "enum": ["basic", "premium"]}
                }
            }),
        );
        Self {
            schemas,
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn fetched(&self) -> Vec<SchemaKey> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaSource for StubSchemas {
    async fn fetch_schema(&self, key: &SchemaKey) -> Result<DeclarativeSchema, ApiError> {
        self.fetched.lock().unwrap().push(key.clone());
        let schema = self
            .schemas
            .get(key.form.as_str())
            .ok_or_else(|| ApiError::NotFound(key.to_string()))?;
        DeclarativeSchema::from_value(schema.clone()).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Always quotes 1.1765 (target → source).
struct StubRates {
    calls: AtomicUsize,
}

#[async_trait]
impl CurrencyApi for StubRates {
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ConversionResponse {
            conversion_data: ConversionData {
                exchange_rate: dec!(1.1765),
                target_amount: 0,
                source_amount: request.amount,
            },
        })
    }
}

#[derive(Default)]
struct StubEmployments {
    existing: Option<Employment>,
    reject_email: bool,
    /// When set, create waits for a notification before answering.
    gate: Option<Arc<Notify>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl StubEmployments {
    fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmploymentApi for StubEmployments {
    async fn create_employment(&self, body: &NewEmployment) -> Result<Employment, ApiError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.reject_email {
            let mut errors = BTreeMap::new();
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
        self.existing.clone().ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn invite(&self, id: &str) -> Result<Employment, ApiError> {
        let mut employment = Employment::new(id);
        employment.status = EmploymentStatus::Invited;
        Ok(employment)
    }
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl FlowEvents for Recorder {
    fn on_submit(&self, step: StepName, _payload: &Map<String, Value>) {
        self.calls.lock().unwrap().push(format!("submit:{step}"));
    }

    fn on_success(&self, step: StepName, _outcome: &SubmissionOutcome) {
        self.calls.lock().unwrap().push(format!("success:{step}"));
    }

    fn on_error(&self, step: StepName, _failure: &SubmissionFailure) {
        self.calls.lock().unwrap().push(format!("error:{step}"));
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    schemas: Arc<StubSchemas>,
    rates: Arc<StubRates>,
    employments: Arc<StubEmployments>,
}

impl Harness {
    fn new(employments: StubEmployments) -> Self {
        Self {
            schemas: Arc::new(StubSchemas::new()),
            rates: Arc::new(StubRates {
                calls: AtomicUsize::new(0),
            }),
            employments: Arc::new(employments),
        }
    }

    fn flow(&self, config: FlowConfig) -> OnboardingFlow {
        let deps = FlowDeps {
            schemas: self.schemas.clone(),
            currency: self.rates.clone(),
            employments: self.employments.clone(),
        };
        OnboardingFlow::new(config, deps).unwrap()
    }
}

fn values(v: Value) -> Map<String, Value> {
    v.as_object().unwrap().clone()
}

fn basic_information() -> Map<String, Value> {
    values(json!({"name": "Ada Lovelace", "email": "ada@example.com"}))
}

fn skipping_country() -> FlowConfig {
    FlowConfig {
        skip_steps: vec![StepName::SelectCountry],
        ..FlowConfig::default()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn invited_employment_resumes_at_review() {
    let mut employment = Employment::new("emp_9");
    employment.status = EmploymentStatus::Invited;
    employment.country_code = Some("PRT".into());
    employment.basic_information = basic_information();
    let harness = Harness::new(StubEmployments {
        existing: Some(employment),
        ..Default::default()
    });

    let flow = harness.flow(FlowConfig::default()).with_employment_id("emp_9");
    assert!(flow.is_loading());
    timeout(TEST_TIMEOUT, flow.init()).await.unwrap().unwrap();

    let state = flow.step_state().await;
    assert_eq!(state.current, StepName::Review);
    assert!(!state.is_loading);
    assert_eq!(state.values[&StepName::BasicInformation]["name"], "Ada Lovelace");
    assert_eq!(flow.history().await, [StepName::Review]);
    assert_eq!(state.steps[1].status, StepStatus::Completed);

    let fetched = harness.schemas.fetched();
    assert!(fetched.contains(&SchemaKey::for_country("employment_basic_information", "PRT")));
    assert!(fetched.contains(&SchemaKey::for_country("benefits", "PRT")));

    let meta = flow.meta().await;
    assert_eq!(meta.employment_id.as_deref(), Some("emp_9"));
    assert_eq!(meta.status, Some(EmploymentStatus::Invited));
    assert_eq!(meta.review_state, ReviewState::Invited);
}

#[tokio::test]
async fn fresh_flow_creates_once_then_updates() {
    let harness = Harness::new(StubEmployments::default());
    let events = Arc::new(Recorder::default());
    let flow = harness.flow(FlowConfig::default()).with_events(events.clone());
    flow.init().await.unwrap();
    assert_eq!(flow.step_state().await.current, StepName::SelectCountry);
    assert!(flow.fields().await.unwrap().get("country").is_some());

    let outcome = flow.next(values(json!({"country": "PRT"}))).await;
    assert_eq!(
        outcome,
        StepOutcome::Advanced {
            from: StepName::SelectCountry,
            to: StepName::BasicInformation
        }
    );
    assert_eq!(harness.employments.creates(), 0);
    assert!(
        harness
            .schemas
            .fetched()
            .contains(&SchemaKey::for_country("employment_basic_information", "PRT"))
    );

    let outcome = flow.next(basic_information()).await;
    assert!(matches!(outcome, StepOutcome::Advanced { to: StepName::ContractDetails, .. }));
    assert_eq!(harness.employments.creates(), 1);
    assert_eq!(flow.meta().await.employment_id.as_deref(), Some("emp_1"));
    assert_eq!(flow.meta().await.country_code.as_deref(), Some("PRT"));

    assert_eq!(flow.back().await.unwrap(), StepName::BasicInformation);
    assert_eq!(flow.values().await["name"], "Ada Lovelace");

    let outcome = flow.next(basic_information()).await;
    assert!(matches!(outcome, StepOutcome::Advanced { .. }));
    assert_eq!(harness.employments.creates(), 1);
    assert_eq!(harness.employments.updates(), 1);

    assert_eq!(
        *events.calls.lock().unwrap(),
        [
            "submit:select_country",
            "success:select_country",
            "submit:basic_information",
            "success:basic_information",
            "submit:basic_information",
            "success:basic_information",
        ]
    );
}

#[tokio::test]
async fn governing_field_toggles_visibility_and_payload() {
    let harness = Harness::new(StubEmployments::default());
    let flow = harness.flow(skipping_country()).with_country("PRT");
    flow.init().await.unwrap();

    let seniority = |fields: &onboarding_flows::fields::FieldSet| {
        let f = fields.get("seniority_date").unwrap();
        (f.is_visible, f.required)
    };
    assert_eq!(seniority(&flow.fields().await.unwrap()), (false, false));

    let changed = flow.handle_change("has_seniority_date", json!("yes")).await;
    assert_eq!(changed, ["seniority_date"]);
    assert_eq!(seniority(&flow.fields().await.unwrap()), (true, true));

    let mut draft = basic_information();
    draft.insert("has_seniority_date".into(), json!("yes"));
    let outcome = flow.next(draft.clone()).await;
    let StepOutcome::Invalid(result) = outcome else {
        panic!("expected validation failure, got {outcome:?}");
    };
    assert_eq!(result.form_errors["seniority_date"].kind, IssueKind::Required);
    assert!(flow.step_state().await.form_errors.contains_key("seniority_date"));
    assert_eq!(harness.employments.creates(), 0);

    flow.handle_change("has_seniority_date", json!("no")).await;
    assert_eq!(seniority(&flow.fields().await.unwrap()), (false, false));

    draft.insert("has_seniority_date".into(), json!("no"));
    draft.insert("seniority_date".into(), json!("2020-01-01"));
    let payload = flow.parse_form_values(&draft).await;
    assert!(!payload.contains_key("seniority_date"));
    assert!(flow.handle_validation(&draft).await.is_valid());
}

#[tokio::test]
async fn server_field_errors_are_labelled_and_block_advance() {
    let harness = Harness::new(StubEmployments {
        reject_email: true,
        ..Default::default()
    });
    let events = Arc::new(Recorder::default());
    let flow = harness
        .flow(skipping_country())
        .with_country("PRT")
        .with_events(events.clone());
    flow.init().await.unwrap();

    let outcome = flow.next(basic_information()).await;
    let StepOutcome::Rejected(SubmissionFailure::Fields { field_errors, .. }) = outcome else {
        panic!("expected field errors, got {outcome:?}");
    };
    assert_eq!(field_errors.len(), 1);
    assert_eq!(field_errors[0].field, "email");
    assert_eq!(field_errors[0].messages, ["has already been taken"]);
    assert_eq!(field_errors[0].user_friendly_label, "Personal email");

    let state = flow.step_state().await;
    assert_eq!(state.current, StepName::BasicInformation);
    assert!(!state.values.contains_key(&StepName::BasicInformation));
    assert_eq!(state.field_errors, field_errors);
    assert!(flow.meta().await.employment_id.is_none());
    assert_eq!(
        *events.calls.lock().unwrap(),
        ["submit:basic_information", "error:basic_information"]
    );
}

#[tokio::test]
async fn second_next_while_submitting_is_busy() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(StubEmployments {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let flow = harness.flow(skipping_country()).with_country("PRT");
    flow.init().await.unwrap();

    let second = async {
        while !flow.is_submitting() {
            tokio::task::yield_now().await;
        }
        let outcome = flow.next(basic_information()).await;
        gate.notify_one();
        outcome
    };
    let (first, second) = timeout(TEST_TIMEOUT, async { tokio::join!(flow.next(basic_information()), second) })
        .await
        .unwrap();

    assert!(matches!(first, StepOutcome::Advanced { .. }));
    assert_eq!(second, StepOutcome::Busy);
    assert_eq!(harness.employments.creates(), 1);
    assert!(!flow.is_submitting());
}

#[tokio::test]
async fn back_during_submission_commits_to_the_submitted_step() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(StubEmployments {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let events = Arc::new(Recorder::default());
    let flow = harness.flow(FlowConfig::default()).with_events(events.clone());
    flow.init().await.unwrap();
    flow.next(values(json!({"country": "PRT"}))).await;

    let navigate = async {
        while !flow.is_submitting() {
            tokio::task::yield_now().await;
        }
        let moved = flow.back().await;
        gate.notify_one();
        moved
    };
    let (outcome, moved) = timeout(TEST_TIMEOUT, async { tokio::join!(flow.next(basic_information()), navigate) })
        .await
        .unwrap();

    assert_eq!(moved.unwrap(), StepName::SelectCountry);
    assert_eq!(
        outcome,
        StepOutcome::Saved {
            step: StepName::BasicInformation,
            active: StepName::SelectCountry
        }
    );

    let state = flow.step_state().await;
    assert_eq!(state.current, StepName::SelectCountry);
    assert_eq!(state.values[&StepName::SelectCountry], values(json!({"country": "PRT"})));
    assert_eq!(state.values[&StepName::BasicInformation]["name"], "Ada Lovelace");
    assert_eq!(flow.meta().await.employment_id.as_deref(), Some("emp_1"));
    assert_eq!(events.calls.lock().unwrap().last().unwrap(), "success:basic_information");
}

#[tokio::test]
async fn skipped_steps_are_not_navigable() {
    let harness = Harness::new(StubEmployments::default());
    let config = FlowConfig {
        skip_steps: vec![StepName::SelectCountry, StepName::Benefits],
        ..FlowConfig::default()
    };
    let flow = harness.flow(config).with_country("PRT");
    flow.init().await.unwrap();

    let state = flow.step_state().await;
    assert_eq!(state.total, 3);
    assert_eq!(state.index, 0);
    let names: Vec<StepName> = state.steps.iter().map(|s| s.name).collect();
    assert_eq!(names, [StepName::BasicInformation, StepName::ContractDetails, StepName::Review]);

    assert!(matches!(flow.back().await, Err(Error::Flow(FlowError::AtFirstStep))));
    assert!(matches!(
        flow.go_to(StepName::Benefits).await,
        Err(Error::Flow(FlowError::UnknownStep(_)))
    ));

    flow.go_to(StepName::Review).await.unwrap();
    let state = flow.step_state().await;
    assert_eq!(state.current, StepName::Review);
    assert_eq!(state.index, 2);
    assert!(matches!(flow.next(Map::new()).await, StepOutcome::Rejected(SubmissionFailure::Api { .. })));
}

#[tokio::test]
async fn blocked_start_date_fails_logic_pass() {
    let harness = Harness::new(StubEmployments::default());
    let flow = harness.flow(skipping_country()).with_country("PRT");
    flow.init().await.unwrap();
    flow.go_to(StepName::ContractDetails).await.unwrap();

    let outcome = flow
        .next(values(json!({"salary": "50000", "start_date": "2024-12-25"})))
        .await;
    let StepOutcome::Invalid(result) = outcome else {
        panic!("expected validation failure, got {outcome:?}");
    };
    let error = &result.form_errors["start_date"];
    assert_eq!(error.kind, IssueKind::Logic);
    assert_eq!(error.message, "The start date falls within a blocked period");
    assert!(!result.form_errors.contains_key("salary"));

    let result = flow
        .handle_validation(&values(json!({"salary": "50000", "start_date": "2025-01-06"})))
        .await;
    assert!(result.is_valid());
}

#[tokio::test]
async fn money_field_converts_into_employer_currency() {
    let harness = Harness::new(StubEmployments::default());
    let config = FlowConfig {
        conversion_debounce: Duration::from_millis(1),
        ..skipping_country()
    };
    let flow = harness.flow(config).with_country("PRT").with_employer_currency("USD");
    flow.init().await.unwrap();
    assert!(flow.conversion("salary").await.is_none());

    flow.go_to(StepName::ContractDetails).await.unwrap();
    let salary = flow.conversion("salary").await.unwrap();
    salary.toggle().await;
    flow.handle_change("salary", json!("100")).await;
    timeout(TEST_TIMEOUT, salary.settle()).await.unwrap();

    let snapshot = salary.snapshot().await;
    assert_eq!(snapshot.source_currency, "EUR");
    assert_eq!(snapshot.target_currency, "USD");
    assert_eq!(snapshot.main_value, Some(10_000));
    assert_eq!(snapshot.conversion_value, Some(8_500));
    assert_eq!(harness.rates.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn currency_select_retargets_its_money_field() {
    let harness = Harness::new(StubEmployments::default());
    let config = FlowConfig {
        conversion_debounce: Duration::from_millis(1),
        ..skipping_country()
    };
    let flow = harness.flow(config).with_country("PRT").with_employer_currency("USD");
    flow.init().await.unwrap();
    flow.go_to(StepName::ContractDetails).await.unwrap();

    let fields = flow.fields().await.unwrap();
    assert_eq!(
        fields.get("bonus_currency").unwrap().on_change,
        Some(ChangeEffect::RetargetConversion { field: "bonus".into() })
    );

    let bonus = flow.conversion("bonus").await.unwrap();
    assert_eq!(bonus.snapshot().await.source_currency, "EUR");
    bonus.toggle().await;
    flow.handle_change("bonus", json!("100")).await;
    timeout(TEST_TIMEOUT, bonus.settle()).await.unwrap();
    assert_eq!(bonus.snapshot().await.conversion_value, Some(8_500));

    flow.handle_change("bonus_currency", json!("GBP")).await;
    let snapshot = bonus.snapshot().await;
    assert_eq!(snapshot.source_currency, "GBP");
    assert_eq!(snapshot.conversion_value, None);
    assert_eq!(snapshot.main_value, Some(10_000));
    assert_eq!(flow.conversion("salary").await.unwrap().snapshot().await.source_currency, "EUR");
}

#[tokio::test]
async fn conversion_edit_writes_main_amount_back() {
    let harness = Harness::new(StubEmployments::default());
    let config = FlowConfig {
        conversion_debounce: Duration::from_millis(1),
        ..skipping_country()
    };
    let flow = harness.flow(config).with_country("PRT").with_employer_currency("USD");
    flow.init().await.unwrap();
    flow.go_to(StepName::ContractDetails).await.unwrap();

    let salary = flow.conversion("salary").await.unwrap();
    salary.toggle().await;
    let main = timeout(TEST_TIMEOUT, flow.handle_conversion_change("salary", "85"))
        .await
        .unwrap();
    assert_eq!(main, Some(10_000));

    let values = flow.values().await;
    assert_eq!(values["salary"], "100.00");
    assert_eq!(flow.parse_form_values(&values).await["salary"], 10_000);
    assert_eq!(salary.snapshot().await.conversion_value, Some(8_500));
    assert!(flow.handle_conversion_change("missing", "85").await.is_none());
}

#[tokio::test]
async fn reset_form_drops_draft_only() {
    let harness = Harness::new(StubEmployments::default());
    let flow = harness.flow(skipping_country()).with_country("PRT");
    flow.init().await.unwrap();

    flow.handle_change("name", json!("Ada")).await;
    flow.handle_change("has_seniority_date", json!("yes")).await;
    assert_eq!(flow.values().await["name"], "Ada");

    flow.reset_form().await;
    assert!(flow.values().await.is_empty());
    assert!(!flow.fields().await.unwrap().get("seniority_date").unwrap().is_visible);
}

#[tokio::test]
async fn overrides_apply_to_their_step() {
    let harness = Harness::new(StubEmployments::default());
    let overrides = SchemaOverrides::default().with_field(
        "email",
        FieldOverride {
            title: Some("Work email".into()),
            ..Default::default()
        },
    );
    let flow = harness
        .flow(skipping_country())
        .with_country("PRT")
        .with_overrides(StepName::BasicInformation, overrides);
    flow.init().await.unwrap();

    let fields = flow.fields().await.unwrap();
    assert_eq!(fields.get("email").unwrap().label, "Work email");
    assert_eq!(fields.get("name").unwrap().label, "Full name");
}

#[tokio::test]
async fn invite_from_review() {
    let harness = Harness::new(StubEmployments::default());
    let flow = harness.flow(skipping_country()).with_country("PRT");
    flow.init().await.unwrap();
    assert!(matches!(flow.invite().await, Err(Error::Flow(FlowError::NoEmployment))));

    flow.next(basic_information()).await;
    flow.go_to(StepName::Review).await.unwrap();
    assert_eq!(flow.meta().await.review_state, ReviewState::Pending);

    assert_eq!(flow.invite().await.unwrap(), ReviewState::Invited);
    let meta = flow.meta().await;
    assert_eq!(meta.status, Some(EmploymentStatus::Invited));
    assert_eq!(meta.review_state, ReviewState::Invited);
    assert!(!flow.is_loading());
}
