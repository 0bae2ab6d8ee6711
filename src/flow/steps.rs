//! Step state machine: the ordered steps of a flow and the active one.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::FlowError;
use crate::fields::FieldSet;
use crate::validation::LogicRules;

/// The steps of the onboarding catalog.
///
/// Progresses linearly: SelectCountry → BasicInformation → ContractDetails →
/// Benefits → Review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    SelectCountry,
    BasicInformation,
    ContractDetails,
    Benefits,
    Review,
}

impl StepName {
    /// The full catalog, in order.
    pub const CATALOG: [StepName; 5] = [
        Self::SelectCountry,
        Self::BasicInformation,
        Self::ContractDetails,
        Self::Benefits,
        Self::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectCountry => "select_country",
            Self::BasicInformation => "basic_information",
            Self::ContractDetails => "contract_details",
            Self::Benefits => "benefits",
            Self::Review => "review",
        }
    }

    /// Schema form name for steps backed by a server schema.
    pub fn form_key(&self) -> Option<&'static str> {
        match self {
            Self::SelectCountry => Some("select_country"),
            Self::BasicInformation => Some("employment_basic_information"),
            Self::ContractDetails => Some("contract_details"),
            Self::Benefits => Some("benefits"),
            Self::Review => None,
        }
    }

    /// Whether the schema for this step depends on the selected country.
    pub fn is_country_scoped(&self) -> bool {
        matches!(self, Self::BasicInformation | Self::ContractDetails | Self::Benefits)
    }

    /// Whether this is the read-only final step.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Review)
    }

    /// The next step of the full catalog, if any.
    pub fn next(&self) -> Option<StepName> {
        match self {
            Self::SelectCountry => Some(Self::BasicInformation),
            Self::BasicInformation => Some(Self::ContractDetails),
            Self::ContractDetails => Some(Self::Benefits),
            Self::Benefits => Some(Self::Review),
            Self::Review => None,
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepName {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CATALOG
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| FlowError::UnknownStep(s.to_string()))
    }
}

/// Where a step stands relative to the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotVisited,
    Active,
    Completed,
}

/// One step of the effective (post-skip) step list.
#[derive(Debug, Clone, Serialize)]
pub struct StepDescriptor {
    pub name: StepName,
    pub index: usize,
    /// Resolved fields, once the step's schema is loaded.
    pub fields: Option<FieldSet>,
    /// Last committed values, kept across back/forward navigation.
    pub values: Option<Map<String, Value>>,
    #[serde(skip)]
    pub logic: LogicRules,
}

impl StepDescriptor {
    fn new(name: StepName, index: usize) -> Self {
        Self {
            name,
            index,
            fields: None,
            values: None,
            logic: LogicRules::default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.fields.is_some() || self.name.form_key().is_none()
    }
}

/// Ordered steps with exactly one active.
///
/// The active index only moves through [`advance`](Self::advance),
/// [`retreat`](Self::retreat), [`go_to`](Self::go_to) and
/// [`start_at`](Self::start_at).
#[derive(Debug, Clone)]
pub struct StepMachine {
    steps: Vec<StepDescriptor>,
    active: usize,
    /// Every step that has been made active, in order.
    history: Vec<StepName>,
}

impl StepMachine {
    /// Build the effective step list: `catalog` minus `skip`, re-indexed.
    pub fn new(catalog: &[StepName], skip: &[StepName]) -> Result<Self, FlowError> {
        let steps: Vec<StepDescriptor> = catalog
            .iter()
            .filter(|step| !skip.contains(step))
            .enumerate()
            .map(|(index, name)| StepDescriptor::new(*name, index))
            .collect();
        if steps.is_empty() {
            return Err(FlowError::EmptyCatalog);
        }
        Ok(Self {
            steps,
            active: 0,
            history: Vec::new(),
        })
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &StepDescriptor {
        &self.steps[self.active]
    }

    pub fn active_mut(&mut self) -> &mut StepDescriptor {
        &mut self.steps[self.active]
    }

    pub fn active_name(&self) -> StepName {
        self.active().name
    }

    pub fn is_started(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history(&self) -> &[StepName] {
        &self.history
    }

    pub fn position(&self, name: StepName) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    pub fn step(&self, name: StepName) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_mut(&mut self, name: StepName) -> Option<&mut StepDescriptor> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    pub fn status(&self, name: StepName) -> Option<StepStatus> {
        let index = self.position(name)?;
        Some(if index == self.active {
            StepStatus::Active
        } else if self.steps[index].values.is_some() {
            StepStatus::Completed
        } else {
            StepStatus::NotVisited
        })
    }

    /// Committed values of every completed step.
    pub fn values(&self) -> BTreeMap<StepName, Map<String, Value>> {
        self.steps
            .iter()
            .filter_map(|s| s.values.clone().map(|v| (s.name, v)))
            .collect()
    }

    /// Store committed values for `name` without moving.
    pub fn commit(&mut self, name: StepName, values: Map<String, Value>) -> Result<(), FlowError> {
        let step = self
            .step_mut(name)
            .ok_or_else(|| FlowError::UnknownStep(name.to_string()))?;
        step.values = Some(values);
        Ok(())
    }

    /// Make `name` the first active step.
    pub fn start_at(&mut self, name: StepName) -> Result<(), FlowError> {
        self.go_to(name)
    }

    /// Commit `values` for the active step and move forward one step.
    pub fn advance(&mut self, values: Map<String, Value>) -> Result<StepName, FlowError> {
        if self.active + 1 >= self.steps.len() {
            return Err(FlowError::AtLastStep);
        }
        self.steps[self.active].values = Some(values);
        let from = self.active_name();
        self.activate(self.active + 1);
        info!(from = %from, to = %self.active_name(), "Advanced step");
        Ok(self.active_name())
    }

    /// Move back one step. Committed values stay in place.
    pub fn retreat(&mut self) -> Result<StepName, FlowError> {
        if self.active == 0 {
            return Err(FlowError::AtFirstStep);
        }
        self.activate(self.active - 1);
        debug!(to = %self.active_name(), "Retreated step");
        Ok(self.active_name())
    }

    /// Jump straight to `name`, skipping intermediate validation.
    pub fn go_to(&mut self, name: StepName) -> Result<(), FlowError> {
        let index = self
            .position(name)
            .ok_or_else(|| FlowError::UnknownStep(name.to_string()))?;
        self.activate(index);
        debug!(to = %name, "Jumped to step");
        Ok(())
    }

    fn activate(&mut self, index: usize) {
        if self.history.is_empty() || self.active != index {
            self.active = index;
            self.history.push(self.steps[index].name);
        }
    }
}
