//! Cost calculator: estimate employment costs per country and keep the
//! results for later edit, delete and export.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::FlowConfig;
use crate::currency::{ConversionController, ConversionPair, CurrencyConverter, RateCache};
use crate::error::EstimationError;
use crate::fields::{ChangeEffect, FieldDescriptor, FieldOption, FieldSet, InputType};
use crate::money::{MinorUnits, SalaryPeriod};
use crate::transport::{CurrencyApi, EstimationApi};
use crate::validation::{LogicRules, validate};

/// Field names of the estimation form.
pub mod field_names {
    pub const COUNTRY: &str = "country";
    pub const REGION: &str = "region";
    pub const CURRENCY: &str = "currency";
    pub const SALARY: &str = "salary";
    pub const SALARY_PERIOD: &str = "salary_period";
    pub const TITLE: &str = "title";
}

use field_names::*;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub slug: String,
    pub name: String,
}

/// A country the calculator can estimate for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub currency: String,
    /// Slug of the country-level region, used when no sub-region is picked.
    pub region_slug: String,
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// One employment to estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationEmployment {
    pub region_slug: String,
    /// Annual gross salary in minor units of the regional currency.
    pub annual_gross_salary: MinorUnits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The body of an estimation request, kept alongside each result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationPayload {
    pub employer_currency_slug: String,
    pub employments: Vec<EstimationEmployment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub currency: String,
    pub annual_total: MinorUnits,
    pub monthly_total: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentCost {
    pub region_slug: String,
    pub employer_currency_costs: CostBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional_currency_costs: Option<CostBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationResult {
    #[serde(default)]
    pub employments: Vec<EmploymentCost>,
}

// ── EstimationSet ───────────────────────────────────────────────────

/// Results and the payloads that produced them, aligned by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimationSet {
    results: Vec<EstimationResult>,
    payloads: Vec<EstimationPayload>,
}

impl EstimationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[EstimationResult] {
        &self.results
    }

    pub fn payloads(&self) -> &[EstimationPayload] {
        &self.payloads
    }

    pub fn get(&self, index: usize) -> Option<(&EstimationResult, &EstimationPayload)> {
        Some((self.results.get(index)?, self.payloads.get(index)?))
    }

    /// Append a result; returns its index.
    pub fn push(&mut self, result: EstimationResult, payload: EstimationPayload) -> usize {
        self.results.push(result);
        self.payloads.push(payload);
        self.results.len() - 1
    }

    /// Swap the entry at `index` for a new result and payload.
    pub fn replace(
        &mut self,
        index: usize,
        result: EstimationResult,
        payload: EstimationPayload,
    ) -> Result<(), EstimationError> {
        self.check(index)?;
        self.results[index] = result;
        self.payloads[index] = payload;
        Ok(())
    }

    /// Remove the result and payload at `index` together.
    pub fn delete(&mut self, index: usize) -> Result<(EstimationResult, EstimationPayload), EstimationError> {
        self.check(index)?;
        Ok((self.results.remove(index), self.payloads.remove(index)))
    }

    fn check(&self, index: usize) -> Result<(), EstimationError> {
        if index >= self.len() {
            return Err(EstimationError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }
}

// ── CostCalculator ──────────────────────────────────────────────────

/// The default estimation form.
///
/// `region` stays hidden until a country with sub-regions is selected.
pub fn estimation_fields() -> FieldSet {
    let mut country = FieldDescriptor::new(COUNTRY, "Country", InputType::Select).required();
    country.on_change = Some(ChangeEffect::RepopulateOptions {
        target: REGION.to_string(),
    });
    let region = FieldDescriptor::new(REGION, "Region", InputType::Select).required();
    let currency = FieldDescriptor::new(CURRENCY, "Billing currency", InputType::Select).required();
    let salary = FieldDescriptor::new(SALARY, "Gross salary", InputType::Money).required();
    let period = FieldDescriptor::new(SALARY_PERIOD, "Salary period", InputType::Radio).with_options(vec![
        FieldOption::new(SalaryPeriod::Annual.to_string(), "Annual"),
        FieldOption::new(SalaryPeriod::Monthly.to_string(), "Monthly"),
    ]);
    let title = FieldDescriptor::new(TITLE, "Job title", InputType::Text);

    let mut fields = FieldSet::from_fields(vec![country, region, currency, salary, period, title]);
    fields.set_visible(REGION, false);
    fields
}

/// The estimation flow.
///
/// Country selection updates the form in place: region options and
/// visibility follow the country, and the salary field (entered in the
/// regional currency) converts into the billing currency.
pub struct CostCalculator {
    api: Arc<dyn EstimationApi>,
    fields: FieldSet,
    logic: LogicRules,
    countries: Vec<Country>,
    country: Option<Country>,
    salary: ConversionController,
    estimations: EstimationSet,
}

impl CostCalculator {
    pub fn new(config: &FlowConfig, api: Arc<dyn EstimationApi>, currency: Arc<dyn CurrencyApi>) -> Self {
        Self::with_fields(config, api, currency, estimation_fields(), LogicRules::default())
    }

    /// Use a custom form. It must keep the [`field_names`] fields.
    pub fn with_fields(
        config: &FlowConfig,
        api: Arc<dyn EstimationApi>,
        currency: Arc<dyn CurrencyApi>,
        fields: FieldSet,
        logic: LogicRules,
    ) -> Self {
        let converter = CurrencyConverter::new(currency, RateCache::new());
        let salary = ConversionController::new(ConversionPair::new("USD", "USD"), converter, config.conversion_debounce);
        Self {
            api,
            fields,
            logic,
            countries: Vec::new(),
            country: None,
            salary,
            estimations: EstimationSet::new(),
        }
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn country(&self) -> Option<&Country> {
        self.country.as_ref()
    }

    pub fn estimations(&self) -> &EstimationSet {
        &self.estimations
    }

    /// Conversion pair between the salary and the billing currency.
    pub fn salary(&self) -> &ConversionController {
        &self.salary
    }

    /// Fetch the supported countries and fill the country options.
    pub async fn load_countries(&mut self) -> Result<&[Country], EstimationError> {
        self.countries = self.api.list_countries().await?;
        let options = self
            .countries
            .iter()
            .map(|c| FieldOption::new(c.code.clone(), c.name.clone()))
            .collect();
        self.fields.set_options(COUNTRY, options);
        info!(count = self.countries.len(), "Loaded estimation countries");
        Ok(&self.countries)
    }

    /// Point the form at `code`. Returns the paths of descriptors that changed.
    pub async fn select_country(&mut self, code: &str) -> Result<Vec<String>, EstimationError> {
        let country = self
            .countries
            .iter()
            .find(|c| c.code == code)
            .cloned()
            .ok_or_else(|| EstimationError::UnknownCountry(code.to_string()))?;

        let mut changed = Vec::new();
        let regions = country
            .regions
            .iter()
            .map(|r| FieldOption::new(r.slug.clone(), r.name.clone()))
            .collect();
        if self.fields.set_options(REGION, regions) {
            changed.push(REGION.to_string());
        }
        if self.fields.set_visible(REGION, !country.regions.is_empty()) {
            changed.push(REGION.to_string());
        }
        if self.fields.set_currency(SALARY, &country.currency) {
            changed.push(SALARY.to_string());
        }
        self.salary.set_source_currency(&country.currency).await;
        changed.dedup();

        debug!(country = %country.code, currency = %country.currency, regions = country.regions.len(), "Selected country");
        self.country = Some(country);
        Ok(changed)
    }

    /// Set the billing currency the salary converts into.
    pub async fn select_currency(&mut self, currency: &str) -> bool {
        self.salary.set_target_currency(currency).await
    }

    /// Validate `values` and turn them into an estimation request.
    pub fn build_payload(&self, values: &Map<String, Value>) -> Result<EstimationPayload, EstimationError> {
        let mut fields = self.fields.clone();
        fields.apply_values(values);
        let result = validate(values, &fields, &self.logic);
        if !result.is_valid() {
            return Err(EstimationError::Invalid(result));
        }
        let country = self.country.as_ref().ok_or(EstimationError::NoCountry)?;

        let parsed = fields.parse_values(values);
        let period = match parsed.get(SALARY_PERIOD).and_then(Value::as_str) {
            Some("monthly") => SalaryPeriod::Monthly,
            _ => SalaryPeriod::Annual,
        };
        let salary = parsed.get(SALARY).and_then(Value::as_i64).unwrap_or_default();
        let region_slug = parsed
            .get(REGION)
            .and_then(Value::as_str)
            .map_or_else(|| country.region_slug.clone(), str::to_string);

        Ok(EstimationPayload {
            employer_currency_slug: parsed
                .get(CURRENCY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            employments: vec![EstimationEmployment {
                region_slug,
                annual_gross_salary: period.to_annual(salary),
                title: parsed.get(TITLE).and_then(Value::as_str).map(str::to_string),
            }],
        })
    }

    /// Estimate `values` and append the result. Returns its index.
    pub async fn submit(&mut self, values: &Map<String, Value>) -> Result<usize, EstimationError> {
        let payload = self.build_payload(values)?;
        let result = self.api.create_estimation(&payload).await?;
        let index = self.estimations.push(result, payload);
        info!(index, "Created estimation");
        Ok(index)
    }

    /// Re-estimate entry `index` with new values, replacing it in place.
    pub async fn edit(&mut self, index: usize, values: &Map<String, Value>) -> Result<(), EstimationError> {
        if self.estimations.get(index).is_none() {
            return Err(EstimationError::IndexOutOfRange {
                index,
                len: self.estimations.len(),
            });
        }
        let payload = self.build_payload(values)?;
        let result = self.api.create_estimation(&payload).await?;
        self.estimations.replace(index, result, payload)?;
        info!(index, "Updated estimation");
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<(EstimationResult, EstimationPayload), EstimationError> {
        let removed = self.estimations.delete(index)?;
        info!(index, remaining = self.estimations.len(), "Deleted estimation");
        Ok(removed)
    }

    pub async fn export_pdf(&self) -> Result<Vec<u8>, EstimationError> {
        Ok(self.api.export_pdf(self.estimations.payloads()).await?)
    }

    pub async fn export_csv(&self) -> Result<Vec<u8>, EstimationError> {
        Ok(self.api.export_csv(self.estimations.payloads()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total: MinorUnits) -> EstimationResult {
        EstimationResult {
            employments: vec![EmploymentCost {
                region_slug: "prt".into(),
                employer_currency_costs: CostBreakdown {
                    currency: "EUR".into(),
                    annual_total: total,
                    monthly_total: total / 12,
                },
                regional_currency_costs: None,
            }],
        }
    }

    fn payload(salary: MinorUnits) -> EstimationPayload {
        EstimationPayload {
            employer_currency_slug: "EUR".into(),
            employments: vec![EstimationEmployment {
                region_slug: "prt".into(),
                annual_gross_salary: salary,
                title: None,
            }],
        }
    }

    #[test]
    fn delete_keeps_results_and_payloads_aligned() {
        let mut set = EstimationSet::new();
        for salary in [1_000, 2_000, 3_000] {
            set.push(result(salary * 2), payload(salary));
        }

        let (removed, removed_payload) = set.delete(1).unwrap();
        assert_eq!(removed, result(4_000));
        assert_eq!(removed_payload, payload(2_000));

        assert_eq!(set.len(), 2);
        assert_eq!(set.payloads().len(), set.results().len());
        let (r, p) = set.get(1).unwrap();
        assert_eq!(r, &result(6_000));
        assert_eq!(p, &payload(3_000));
    }

    #[test]
    fn out_of_range_indices_fail() {
        let mut set = EstimationSet::new();
        set.push(result(1), payload(1));
        assert!(matches!(
            set.delete(3),
            Err(EstimationError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert!(set.replace(1, result(2), payload(2)).is_err());
        assert!(set.replace(0, result(2), payload(2)).is_ok());
        assert_eq!(set.get(0).unwrap().1, &payload(2));
    }

    #[test]
    fn default_form_hides_region() {
        let fields = estimation_fields();
        let region = fields.get(REGION).unwrap();
        assert!(!region.is_visible);
        assert!(!region.required);
        assert!(fields.get(SALARY).unwrap().required);
        assert!(matches!(
            fields.get(COUNTRY).unwrap().on_change,
            Some(ChangeEffect::RepopulateOptions { .. })
        ));
    }

    #[test]
    fn country_wire_format() {
        let country: Country = serde_json::from_str(
            r#"{"code": "PRT", "name": "Portugal", "currency": "EUR", "region_slug": "prt"}"#,
        )
        .unwrap();
        assert!(country.regions.is_empty());
    }
}
