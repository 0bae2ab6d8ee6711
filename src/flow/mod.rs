//! The onboarding flow: steps, submissions and the bag a renderer drives.
//!
//! [`OnboardingFlow`] owns a [`StepMachine`] plus the loaded field set of
//! every visited step. Renderers read [`StepState`] and the active
//! [`FieldSet`], report edits through [`OnboardingFlow::handle_change`] and
//! move with [`OnboardingFlow::next`], [`OnboardingFlow::back`] and
//! [`OnboardingFlow::go_to`].

pub mod steps;
pub mod submission;

pub use steps::{StepDescriptor, StepMachine, StepName, StepStatus};
pub use submission::{
    FieldErrorEntry, SubmissionCoordinator, SubmissionFailure, SubmissionOutcome, normalize_field_errors,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::currency::{ConversionController, ConversionPair, CurrencyConverter, EditedField, RateCache};
use crate::error::{FlowError, Result};
use crate::fields::{ChangeEffect, FieldSet, resolve};
use crate::money::{self, MinorUnits};
use crate::schema::{SchemaOverrides, modify};
use crate::transport::{CurrencyApi, Employment, EmploymentApi, EmploymentStatus, SchemaKey, SchemaSource};
use crate::validation::{FormError, LogicRules, ValidationResult, validate};

// ── Collaborators ───────────────────────────────────────────────────

/// The external services one flow talks to.
#[derive(Clone)]
pub struct FlowDeps {
    pub schemas: Arc<dyn SchemaSource>,
    pub currency: Arc<dyn CurrencyApi>,
    pub employments: Arc<dyn EmploymentApi>,
}

/// Lifecycle callbacks, invoked once per submission attempt.
pub trait FlowEvents: Send + Sync {
    fn on_submit(&self, _step: StepName, _payload: &Map<String, Value>) {}
    fn on_success(&self, _step: StepName, _outcome: &SubmissionOutcome) {}
    fn on_error(&self, _step: StepName, _failure: &SubmissionFailure) {}
}

struct NoEvents;

impl FlowEvents for NoEvents {}

// ── Views ───────────────────────────────────────────────────────────

/// Sub-state of the review step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Not invited yet.
    Pending,
    /// Waiting on a funds reserve before the invite goes out.
    AwaitingReserve,
    Invited,
    /// The last invite attempt failed.
    Failed,
}

impl ReviewState {
    pub fn derive(employment: Option<&Employment>, invite_failed: bool) -> Self {
        if invite_failed {
            return Self::Failed;
        }
        let Some(employment) = employment else {
            return Self::Pending;
        };
        match employment.status {
            EmploymentStatus::Invited
            | EmploymentStatus::Initiated
            | EmploymentStatus::Review
            | EmploymentStatus::Active => Self::Invited,
            EmploymentStatus::CreatedAwaitingReserve => Self::AwaitingReserve,
            _ if employment.reserve_payment_required => Self::AwaitingReserve,
            _ => Self::Pending,
        }
    }
}

/// Entity-level facts a renderer needs around the steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowMeta {
    pub employment_id: Option<String>,
    pub country_code: Option<String>,
    pub status: Option<EmploymentStatus>,
    pub reserve_payment_required: bool,
    pub review_state: ReviewState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub name: StepName,
    pub index: usize,
    pub status: StepStatus,
}

/// Snapshot of where the flow stands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub current: StepName,
    pub index: usize,
    pub total: usize,
    pub steps: Vec<StepSummary>,
    /// Committed values, keyed by step.
    pub values: BTreeMap<StepName, Map<String, Value>>,
    pub is_loading: bool,
    pub is_submitting: bool,
    pub form_errors: BTreeMap<String, FormError>,
    pub field_errors: Vec<FieldErrorEntry>,
    /// Banner-level error with no field attribution.
    pub error: Option<String>,
}

/// Result of one [`OnboardingFlow::next`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advanced { from: StepName, to: StepName },
    /// Local validation failed; nothing was sent.
    Invalid(ValidationResult),
    /// The server (or the machine) refused; the step did not move.
    Rejected(SubmissionFailure),
    /// The submission succeeded but the user navigated away while it was in
    /// flight; `step` kept its values and `active` stayed where it was.
    Saved { step: StepName, active: StepName },
    /// Another submission is still in flight.
    Busy,
}

// ── Guards ──────────────────────────────────────────────────────────

/// Counts one in-flight load while alive.
struct Loading<'a>(&'a AtomicUsize);

impl<'a> Loading<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds the single submission slot while alive.
struct Submitting<'a>(&'a AtomicBool);

impl<'a> Submitting<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Flow ────────────────────────────────────────────────────────────

struct FlowState {
    machine: StepMachine,
    /// Uncommitted edits per step.
    drafts: HashMap<StepName, Map<String, Value>>,
    form_errors: BTreeMap<String, FormError>,
    field_errors: Vec<FieldErrorEntry>,
    error: Option<String>,
    employment: Option<Employment>,
    invite_failed: bool,
}

impl FlowState {
    /// Draft of the active step, falling back to its committed values.
    fn current_values(&self) -> Map<String, Value> {
        let step = self.machine.active();
        self.drafts
            .get(&step.name)
            .or(step.values.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn clear_errors(&mut self) {
        self.form_errors.clear();
        self.field_errors.clear();
        self.error = None;
    }
}

type LoadedStep = (StepName, Option<(FieldSet, LogicRules)>);

/// One onboarding flow instance.
pub struct OnboardingFlow {
    deps: FlowDeps,
    config: FlowConfig,
    events: Arc<dyn FlowEvents>,
    overrides: HashMap<StepName, SchemaOverrides>,
    employer_currency: String,
    initial_employment_id: Option<String>,
    initial_country: Option<String>,
    coordinator: SubmissionCoordinator,
    rates: RateCache,
    conversions: RwLock<HashMap<String, Arc<ConversionController>>>,
    state: RwLock<FlowState>,
    initialized: AtomicBool,
    loading: AtomicUsize,
    submitting: AtomicBool,
}

impl OnboardingFlow {
    pub fn new(config: FlowConfig, deps: FlowDeps) -> std::result::Result<Self, FlowError> {
        let machine = StepMachine::new(&StepName::CATALOG, &config.skip_steps)?;
        Ok(Self {
            coordinator: SubmissionCoordinator::new(Arc::clone(&deps.employments)),
            deps,
            config,
            events: Arc::new(NoEvents),
            overrides: HashMap::new(),
            employer_currency: "USD".to_string(),
            initial_employment_id: None,
            initial_country: None,
            rates: RateCache::new(),
            conversions: RwLock::new(HashMap::new()),
            state: RwLock::new(FlowState {
                machine,
                drafts: HashMap::new(),
                form_errors: BTreeMap::new(),
                field_errors: Vec::new(),
                error: None,
                employment: None,
                invite_failed: false,
            }),
            initialized: AtomicBool::new(false),
            loading: AtomicUsize::new(0),
            submitting: AtomicBool::new(false),
        })
    }

    /// Resume an existing employment.
    pub fn with_employment_id(mut self, id: impl Into<String>) -> Self {
        self.initial_employment_id = Some(id.into());
        self
    }

    /// Preselect the country, for flows that skip the country step.
    pub fn with_country(mut self, country_code: impl Into<String>) -> Self {
        self.initial_country = Some(country_code.into());
        self
    }

    pub fn with_overrides(mut self, step: StepName, overrides: SchemaOverrides) -> Self {
        self.overrides.insert(step, overrides);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn FlowEvents>) -> Self {
        self.events = events;
        self
    }

    /// Currency money fields convert into.
    pub fn with_employer_currency(mut self, currency: impl Into<String>) -> Self {
        self.employer_currency = currency.into();
        self
    }

    /// Pick the first step and load what it needs.
    ///
    /// An employment that already went past creation opens on the review
    /// step directly; the flow reports loading until every section the
    /// review shows is in place.
    pub async fn init(&self) -> Result<()> {
        let _loading = Loading::enter(&self.loading);

        if let Some(country) = &self.initial_country {
            self.coordinator.set_country_code(country.clone()).await;
        }

        let employment = match &self.initial_employment_id {
            Some(id) => {
                let employment = self.deps.employments.get_employment(id).await?;
                self.coordinator.set_employment_id(id.clone()).await;
                if let Some(country) = &employment.country_code {
                    self.coordinator.set_country_code(country.clone()).await;
                }
                Some(employment)
            }
            None => None,
        };

        let (start, to_load) = {
            let state = self.state.read().await;
            let machine = &state.machine;
            let resume = employment.as_ref().is_some_and(|e| e.status.resumes_at_review())
                && machine.position(StepName::Review).is_some();
            if resume {
                let names: Vec<StepName> = machine
                    .steps()
                    .iter()
                    .map(|s| s.name)
                    .filter(|name| name.form_key().is_some())
                    .collect();
                (StepName::Review, names)
            } else {
                let first = machine.steps()[0].name;
                (first, vec![first])
            }
        };

        let loaded = futures::future::try_join_all(to_load.into_iter().map(|step| self.fetch_step(step))).await?;

        {
            let mut state = self.state.write().await;
            if let Some(employment) = &employment {
                for step in StepName::CATALOG {
                    if let Some(values) = employment.values_for(step)
                        && !values.is_empty()
                        && state.machine.position(step).is_some()
                    {
                        state.machine.commit(step, values)?;
                    }
                }
            }
            for loaded in loaded {
                install(&mut state.machine, loaded);
            }
            state.machine.start_at(start)?;
            state.employment = employment;
        }

        self.setup_conversions().await;
        self.initialized.store(true, Ordering::SeqCst);
        info!(step = %start, "Flow initialized");
        Ok(())
    }

    // ── Bag ─────────────────────────────────────────────────────────

    /// True before [`init`](Self::init) completes and while any schema
    /// fetch or invite is in flight.
    pub fn is_loading(&self) -> bool {
        !self.initialized.load(Ordering::SeqCst) || self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    pub async fn step_state(&self) -> StepState {
        let state = self.state.read().await;
        let machine = &state.machine;
        StepState {
            current: machine.active_name(),
            index: machine.index(),
            total: machine.len(),
            steps: machine
                .steps()
                .iter()
                .filter_map(|s| {
                    machine.status(s.name).map(|status| StepSummary {
                        name: s.name,
                        index: s.index,
                        status,
                    })
                })
                .collect(),
            values: machine.values(),
            is_loading: self.is_loading(),
            is_submitting: self.is_submitting(),
            form_errors: state.form_errors.clone(),
            field_errors: state.field_errors.clone(),
            error: state.error.clone(),
        }
    }

    /// Every step made active so far.
    pub async fn history(&self) -> Vec<StepName> {
        self.state.read().await.machine.history().to_vec()
    }

    /// Fields of the active step, if it has a schema.
    pub async fn fields(&self) -> Option<FieldSet> {
        self.state.read().await.machine.active().fields.clone()
    }

    /// Current (draft or committed) values of the active step.
    pub async fn values(&self) -> Map<String, Value> {
        self.state.read().await.current_values()
    }

    pub async fn meta(&self) -> FlowMeta {
        let state = self.state.read().await;
        let employment = state.employment.as_ref();
        FlowMeta {
            employment_id: self.coordinator.employment_id().await,
            country_code: self.coordinator.country_code().await,
            status: employment.map(|e| e.status),
            reserve_payment_required: employment.is_some_and(|e| e.reserve_payment_required),
            review_state: ReviewState::derive(employment, state.invite_failed),
        }
    }

    /// Conversion controller bound to a money field of the active step.
    ///
    /// Edits made directly on the controller stay in the pair; use
    /// [`handle_change`](Self::handle_change) and
    /// [`handle_conversion_change`](Self::handle_conversion_change) so the
    /// step's values follow.
    pub async fn conversion(&self, path: &str) -> Option<Arc<ConversionController>> {
        self.conversions.read().await.get(path).cloned()
    }

    /// Record one edit on the active step.
    ///
    /// Recomputes visibility and returns the paths of descriptors that
    /// changed. Money fields forward the edit to their conversion pair.
    pub async fn handle_change(&self, path: &str, value: Value) -> Vec<String> {
        let (changed, effect) = {
            let mut state = self.state.write().await;
            let step = state.machine.active_name();
            let mut draft = state.current_values();
            insert_path(&mut draft, path, value.clone());
            state.drafts.insert(step, draft.clone());
            state.form_errors.remove(path);

            match state.machine.active_mut().fields.as_mut() {
                Some(fields) => {
                    let effect = fields.find(path).and_then(|f| f.on_change.clone());
                    (fields.apply_values(&draft), effect)
                }
                None => (Vec::new(), None),
            }
        };

        if let Some(controller) = self.conversion(path).await
            && let Some(raw) = display_string(&value)
        {
            controller.edit_main(&raw).await;
        }
        if let Some(ChangeEffect::RetargetConversion { field }) = effect
            && let Some(currency) = value.as_str()
            && let Some(controller) = self.conversion(&field).await
        {
            controller.set_source_currency(currency).await;
        }

        debug!(field = %path, changed = changed.len(), "Field changed");
        changed
    }

    /// Record an edit on the conversion side of the money field at `path`.
    ///
    /// Waits for the conversion back into the field's own currency and writes
    /// the result into the active step's values. Returns the new main amount,
    /// or `None` when the conversion failed, was superseded or left the
    /// amount unchanged.
    pub async fn handle_conversion_change(&self, path: &str, raw: &str) -> Option<MinorUnits> {
        let controller = self.conversion(path).await?;
        let step = self.state.read().await.machine.active_name();
        let before = controller.snapshot().await.main_value;
        controller.edit_conversion(raw).await;
        controller.settle().await;

        let snapshot = controller.snapshot().await;
        if snapshot.last_edited_field != EditedField::Conversion || snapshot.main_value == before {
            return None;
        }
        let main = snapshot.main_value?;

        let mut state = self.state.write().await;
        if state.machine.active_name() != step {
            debug!(field = %path, "Step changed before conversion landed");
            return None;
        }
        let mut draft = state.current_values();
        insert_path(&mut draft, path, Value::String(money::format_minor(main)));
        state.drafts.insert(step, draft.clone());
        state.form_errors.remove(path);
        if let Some(fields) = state.machine.active_mut().fields.as_mut() {
            fields.apply_values(&draft);
        }
        debug!(field = %path, main, "Conversion written back to field");
        Some(main)
    }

    /// Validate `values` against the active step and surface the errors.
    pub async fn handle_validation(&self, values: &Map<String, Value>) -> ValidationResult {
        let mut state = self.state.write().await;
        let step = state.machine.active_mut();
        let result = match step.fields.as_mut() {
            Some(fields) => {
                fields.apply_values(values);
                validate(values, fields, &step.logic)
            }
            None => ValidationResult::default(),
        };
        state.form_errors = result.form_errors.clone();
        result
    }

    /// The payload the active step would submit for `values`.
    pub async fn parse_form_values(&self, values: &Map<String, Value>) -> Map<String, Value> {
        let state = self.state.read().await;
        match &state.machine.active().fields {
            Some(fields) => {
                let mut fields = fields.clone();
                fields.apply_values(values);
                fields.parse_values(values)
            }
            None => values.clone(),
        }
    }

    /// Drop the active step's draft and errors.
    pub async fn reset_form(&self) {
        let mut state = self.state.write().await;
        let step = state.machine.active_name();
        state.drafts.remove(&step);
        state.clear_errors();
        let committed = state.machine.active().values.clone().unwrap_or_default();
        if let Some(fields) = state.machine.active_mut().fields.as_mut() {
            fields.apply_values(&committed);
        }
        debug!(step = %step, "Form reset");
    }

    /// Validate, submit and advance the active step.
    pub async fn next(&self, values: Map<String, Value>) -> StepOutcome {
        let Some(_submitting) = Submitting::try_enter(&self.submitting) else {
            debug!("Submission already in flight");
            return StepOutcome::Busy;
        };

        let (step, fields, result) = {
            let mut state = self.state.write().await;
            if state.machine.index() + 1 >= state.machine.len() {
                return FlowError::AtLastStep.into();
            }
            let active = state.machine.active_mut();
            let step = active.name;
            let mut fields = active.fields.clone().unwrap_or_default();
            fields.apply_values(&values);
            let result = validate(&values, &fields, &active.logic);
            if let Some(loaded) = active.fields.as_mut() {
                loaded.apply_values(&values);
            }
            state.form_errors = result.form_errors.clone();
            (step, fields, result)
        };

        if !result.is_valid() {
            debug!(step = %step, errors = result.form_errors.len(), "Step failed validation");
            return StepOutcome::Invalid(result);
        }

        let payload = fields.parse_values(&values);
        let previous_country = self.coordinator.country_code().await;
        self.events.on_submit(step, &payload);

        let outcome = match self.coordinator.submit(step, &payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(step = %step, error = %e, "Step submission failed");
                let failure = SubmissionFailure::from_api(e, &fields);
                {
                    let mut state = self.state.write().await;
                    match &failure {
                        SubmissionFailure::Fields { message, field_errors } => {
                            state.field_errors = field_errors.clone();
                            state.error = message.clone();
                        }
                        SubmissionFailure::Api { message } => state.error = Some(message.clone()),
                    }
                }
                self.events.on_error(step, &failure);
                return StepOutcome::Rejected(failure);
            }
        };

        let country_changed = self.coordinator.country_code().await != previous_country;
        // `Err` holds the step the user navigated to while the request was in flight.
        let moved = {
            let mut state = self.state.write().await;
            let active = state.machine.active_name();
            let moved = if active == step {
                match state.machine.advance(values) {
                    Ok(to) => Ok(to),
                    Err(e) => return e.into(),
                }
            } else {
                debug!(step = %step, active = %active, "Active step changed during submission");
                if let Err(e) = state.machine.commit(step, values) {
                    return e.into();
                }
                Err(active)
            };
            state.drafts.remove(&step);
            state.clear_errors();
            if let Some(employment) = outcome.employment() {
                state.employment = Some(employment.clone());
            }
            if country_changed {
                for name in StepName::CATALOG.into_iter().filter(StepName::is_country_scoped) {
                    if let Some(descriptor) = state.machine.step_mut(name) {
                        descriptor.fields = None;
                        descriptor.logic = LogicRules::default();
                    }
                }
            }
            moved
        };
        self.events.on_success(step, &outcome);

        let to = match moved {
            Ok(to) => to,
            Err(active) => {
                if country_changed
                    && active.is_country_scoped()
                    && let Err(e) = self.enter_step(active).await
                {
                    warn!(step = %active, error = %e, "Failed to reload step");
                    self.state.write().await.error = Some(e.to_string());
                }
                return StepOutcome::Saved { step, active };
            }
        };
        if let Err(e) = self.enter_step(to).await {
            warn!(step = %to, error = %e, "Failed to load step");
            self.state.write().await.error = Some(e.to_string());
        }
        StepOutcome::Advanced { from: step, to }
    }

    /// Move back one step, repopulating it from its committed values.
    pub async fn back(&self) -> Result<StepName> {
        let to = {
            let mut state = self.state.write().await;
            let to = state.machine.retreat()?;
            state.drafts.remove(&to);
            state.clear_errors();
            to
        };
        self.enter_step(to).await?;
        Ok(to)
    }

    /// Jump to `name` without validating the steps in between.
    pub async fn go_to(&self, name: StepName) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.machine.go_to(name)?;
            state.clear_errors();
        }
        self.enter_step(name).await
    }

    /// Send the invite for the current employment.
    pub async fn invite(&self) -> Result<ReviewState> {
        let _loading = Loading::enter(&self.loading);
        let id = self.coordinator.employment_id().await.ok_or(FlowError::NoEmployment)?;

        let result = self.deps.employments.invite(&id).await;
        let mut state = self.state.write().await;
        match result {
            Ok(employment) => {
                info!(employment_id = %id, status = %employment.status, "Invite sent");
                state.invite_failed = false;
                state.error = None;
                state.employment = Some(employment);
                Ok(ReviewState::derive(state.employment.as_ref(), false))
            }
            Err(e) => {
                warn!(employment_id = %id, error = %e, "Invite failed");
                state.invite_failed = true;
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Load the active step's schema if needed, sync its visibility with its
    /// values and rebuild its conversion pairs.
    async fn enter_step(&self, step: StepName) -> Result<()> {
        let loaded = self
            .state
            .read()
            .await
            .machine
            .step(step)
            .is_some_and(StepDescriptor::is_loaded);
        if !loaded {
            let _loading = Loading::enter(&self.loading);
            let fetched = self.fetch_step(step).await?;
            install(&mut self.state.write().await.machine, fetched);
        }

        {
            let mut state = self.state.write().await;
            let values = state.current_values();
            if let Some(fields) = state.machine.active_mut().fields.as_mut() {
                fields.apply_values(&values);
            }
        }
        self.setup_conversions().await;
        Ok(())
    }

    async fn fetch_step(&self, step: StepName) -> Result<LoadedStep> {
        let Some(form) = step.form_key() else {
            return Ok((step, None));
        };
        let key = match self.coordinator.country_code().await {
            Some(country) if step.is_country_scoped() => SchemaKey::for_country(form, country),
            _ => SchemaKey::form(form),
        };
        let schema = self.deps.schemas.fetch_schema(&key).await?;
        let schema = match self.overrides.get(&step) {
            Some(overrides) => modify(&schema, overrides),
            None => schema,
        };
        let fields = resolve(&schema)?;
        let logic = LogicRules::from_schema(&schema);
        debug!(step = %step, key = %key, fields = fields.len(), "Loaded step schema");
        Ok((step, Some((fields, logic))))
    }

    /// One conversion pair per money field of the active step, all sharing
    /// this flow's rate cache.
    async fn setup_conversions(&self) {
        let pairs: Vec<(String, String, Option<Value>)> = {
            let state = self.state.read().await;
            let values = state.current_values();
            match &state.machine.active().fields {
                Some(fields) => fields
                    .money_fields()
                    .into_iter()
                    .map(|(path, field)| {
                        let selected = fields
                            .currency_selector(&path)
                            .and_then(|selector| lookup_path(&values, &selector))
                            .and_then(Value::as_str)
                            .map(String::from);
                        let currency = selected
                            .or_else(|| field.currency.clone())
                            .unwrap_or_else(|| self.employer_currency.clone());
                        let value = lookup_path(&values, &path).cloned();
                        (path, currency, value)
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        let converter = CurrencyConverter::new(Arc::clone(&self.deps.currency), self.rates.clone());
        let mut controllers = HashMap::new();
        for (path, currency, value) in pairs {
            let pair = ConversionPair::new(currency, self.employer_currency.clone());
            let controller = ConversionController::new(pair, converter.clone(), self.config.conversion_debounce);
            if let Some(raw) = value.as_ref().and_then(display_string) {
                controller.edit_main(&raw).await;
            }
            controllers.insert(path, Arc::new(controller));
        }
        *self.conversions.write().await = controllers;
    }
}

impl From<FlowError> for StepOutcome {
    fn from(e: FlowError) -> Self {
        Self::Rejected(SubmissionFailure::Api { message: e.to_string() })
    }
}

fn install(machine: &mut StepMachine, (step, loaded): LoadedStep) {
    if let (Some(descriptor), Some((mut fields, logic))) = (machine.step_mut(step), loaded) {
        if let Some(values) = &descriptor.values {
            fields.apply_values(values);
        }
        descriptor.fields = Some(fields);
        descriptor.logic = logic;
    }
}

/// Set a dotted path, creating intermediate objects.
fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn lookup_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => map.get(path),
        Some((head, rest)) => lookup_path(map.get(head)?.as_object()?, rest),
    }
}

/// The display string a money input holds for `value`.
fn display_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn review_state_follows_status_and_reserve() {
        assert_eq!(ReviewState::derive(None, false), ReviewState::Pending);

        let mut employment = Employment::new("emp_1");
        assert_eq!(ReviewState::derive(Some(&employment), false), ReviewState::Pending);

        employment.reserve_payment_required = true;
        assert_eq!(ReviewState::derive(Some(&employment), false), ReviewState::AwaitingReserve);

        employment.status = EmploymentStatus::Invited;
        assert_eq!(ReviewState::derive(Some(&employment), false), ReviewState::Invited);
        assert_eq!(ReviewState::derive(Some(&employment), true), ReviewState::Failed);
    }

    #[test]
    fn dotted_paths() {
        let mut values = Map::new();
        insert_path(&mut values, "work_address.city", json!("Lisbon"));
        insert_path(&mut values, "name", json!("Ada"));
        assert_eq!(Value::Object(values.clone()), json!({"work_address": {"city": "Lisbon"}, "name": "Ada"}));
        assert_eq!(lookup_path(&values, "work_address.city"), Some(&json!("Lisbon")));
        assert_eq!(lookup_path(&values, "name.first"), None);
    }

    #[test]
    fn submitting_slot_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = Submitting::try_enter(&flag);
        assert!(first.is_some());
        assert!(Submitting::try_enter(&flag).is_none());
        drop(first);
        assert!(Submitting::try_enter(&flag).is_some());
    }

    #[test]
    fn loading_counts_nested_holds() {
        let counter = AtomicUsize::new(0);
        {
            let _a = Loading::enter(&counter);
            let _b = Loading::enter(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
