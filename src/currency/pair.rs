//! State of one conversion pair: a main money field and its conversion.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::RateCache;
use crate::money::{self, MinorUnits};

/// Which of the two linked inputs the user typed in last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditedField {
    #[default]
    Main,
    Conversion,
}

/// Whether the conversion input is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    #[default]
    Collapsed,
    Expanded,
}

/// Which way an amount is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source currency (main field) → target currency (conversion field).
    MainToConversion,
    /// Target currency (conversion field) → source currency (main field).
    ConversionToMain,
}

impl Direction {
    /// The field whose value the result is written to.
    pub fn writes(self) -> EditedField {
        match self {
            Self::MainToConversion => EditedField::Conversion,
            Self::ConversionToMain => EditedField::Main,
        }
    }
}

/// One conversion to run, stamped with the pair generation it was issued at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTicket {
    pub generation: u64,
    pub direction: Direction,
    /// Minor units of the currency being converted from.
    pub amount: MinorUnits,
    pub source_currency: String,
    pub target_currency: String,
}

impl ConversionTicket {
    pub fn from_currency(&self) -> &str {
        match self.direction {
            Direction::MainToConversion => &self.source_currency,
            Direction::ConversionToMain => &self.target_currency,
        }
    }

    pub fn to_currency(&self) -> &str {
        match self.direction {
            Direction::MainToConversion => &self.target_currency,
            Direction::ConversionToMain => &self.source_currency,
        }
    }

    pub fn cache_key(&self) -> String {
        RateCache::key(self.from_currency(), self.to_currency())
    }
}

/// Read-only view of a pair for renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionSnapshot {
    pub source_currency: String,
    pub target_currency: String,
    pub main_value: Option<MinorUnits>,
    pub conversion_value: Option<MinorUnits>,
    pub last_edited_field: EditedField,
    pub is_expanded: bool,
}

/// Synchronous pair state. Every edit that should trigger a conversion
/// bumps the generation and returns a [`ConversionTicket`]; results are only
/// applied while their ticket's generation is still current.
#[derive(Debug, Clone)]
pub struct ConversionPair {
    source_currency: String,
    target_currency: String,
    main_value: Option<MinorUnits>,
    conversion_value: Option<MinorUnits>,
    last_edited: EditedField,
    state: ConversionState,
    generation: u64,
}

impl ConversionPair {
    pub fn new(source_currency: impl Into<String>, target_currency: impl Into<String>) -> Self {
        Self {
            source_currency: source_currency.into(),
            target_currency: target_currency.into(),
            main_value: None,
            conversion_value: None,
            last_edited: EditedField::Main,
            state: ConversionState::Collapsed,
            generation: 0,
        }
    }

    pub fn source_currency(&self) -> &str {
        &self.source_currency
    }

    pub fn target_currency(&self) -> &str {
        &self.target_currency
    }

    pub fn main_value(&self) -> Option<MinorUnits> {
        self.main_value
    }

    pub fn conversion_value(&self) -> Option<MinorUnits> {
        self.conversion_value
    }

    pub fn last_edited(&self) -> EditedField {
        self.last_edited
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    pub fn is_expanded(&self) -> bool {
        self.state == ConversionState::Expanded
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The user typed `raw` into the main field.
    ///
    /// Empty, non-numeric and non-positive input changes nothing.
    pub fn edit_main(&mut self, raw: &str) -> Option<ConversionTicket> {
        let amount = positive_amount(raw)?;
        self.main_value = Some(amount);
        self.last_edited = EditedField::Main;
        self.generation += 1;
        self.is_expanded()
            .then(|| self.ticket(Direction::MainToConversion, amount))
    }

    /// The user typed `raw` into the conversion field. Ignored while collapsed.
    pub fn edit_conversion(&mut self, raw: &str) -> Option<ConversionTicket> {
        if !self.is_expanded() {
            return None;
        }
        let amount = positive_amount(raw)?;
        self.conversion_value = Some(amount);
        self.last_edited = EditedField::Conversion;
        self.generation += 1;
        Some(self.ticket(Direction::ConversionToMain, amount))
    }

    /// Show or hide the conversion field. Expanding with a main value
    /// returns a ticket to populate the conversion immediately.
    pub fn toggle(&mut self) -> Option<ConversionTicket> {
        self.generation += 1;
        match self.state {
            ConversionState::Expanded => {
                self.state = ConversionState::Collapsed;
                None
            }
            ConversionState::Collapsed => {
                self.state = ConversionState::Expanded;
                let amount = self.main_value.filter(|a| *a > 0)?;
                self.last_edited = EditedField::Main;
                Some(self.ticket(Direction::MainToConversion, amount))
            }
        }
    }

    /// Change the main field's currency. Clears the displayed conversion and
    /// invalidates in-flight requests; the rate cache is left alone.
    pub fn set_source_currency(&mut self, currency: &str) -> bool {
        if self.source_currency == currency {
            return false;
        }
        self.source_currency = currency.to_string();
        self.conversion_value = None;
        self.generation += 1;
        true
    }

    /// Change the conversion field's currency (e.g. a new country currency).
    pub fn set_target_currency(&mut self, currency: &str) -> bool {
        if self.target_currency == currency {
            return false;
        }
        self.target_currency = currency.to_string();
        self.conversion_value = None;
        self.generation += 1;
        true
    }

    /// Write a conversion result. Returns `false` when the ticket is stale.
    pub fn apply(&mut self, ticket: &ConversionTicket, converted: MinorUnits) -> bool {
        if ticket.generation != self.generation || ticket.direction.writes() == self.last_edited {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                key = %ticket.cache_key(),
                "Discarding stale conversion result"
            );
            return false;
        }
        match ticket.direction.writes() {
            EditedField::Conversion => self.conversion_value = Some(converted),
            EditedField::Main => self.main_value = Some(converted),
        }
        true
    }

    pub fn snapshot(&self) -> ConversionSnapshot {
        ConversionSnapshot {
            source_currency: self.source_currency.clone(),
            target_currency: self.target_currency.clone(),
            main_value: self.main_value,
            conversion_value: self.conversion_value,
            last_edited_field: self.last_edited,
            is_expanded: self.is_expanded(),
        }
    }

    fn ticket(&self, direction: Direction, amount: MinorUnits) -> ConversionTicket {
        ConversionTicket {
            generation: self.generation,
            direction,
            amount,
            source_currency: self.source_currency.clone(),
            target_currency: self.target_currency.clone(),
        }
    }
}

fn positive_amount(raw: &str) -> Option<MinorUnits> {
    money::parse_display(raw).filter(|amount| *amount > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expanded() -> ConversionPair {
        let mut pair = ConversionPair::new("USD", "EUR");
        assert!(pair.toggle().is_none());
        pair
    }

    #[test]
    fn invalid_input_changes_nothing() {
        let mut pair = expanded();
        let before = pair.generation();
        for raw in ["", "  ", "abc", "0", "-5", "0.00"] {
            assert!(pair.edit_main(raw).is_none(), "{raw:?}");
            assert!(pair.edit_conversion(raw).is_none(), "{raw:?}");
        }
        assert_eq!(pair.generation(), before);
        assert_eq!(pair.main_value(), None);
    }

    #[test]
    fn collapsed_pair_records_without_converting() {
        let mut pair = ConversionPair::new("USD", "EUR");
        assert!(pair.edit_main("1,000").is_none());
        assert_eq!(pair.main_value(), Some(100_000));
        assert!(pair.edit_conversion("5").is_none());

        let ticket = pair.toggle().unwrap();
        assert_eq!(ticket.direction, Direction::MainToConversion);
        assert_eq!(ticket.amount, 100_000);
        assert_eq!(ticket.cache_key(), "USD:EUR");
        assert!(pair.is_expanded());
    }

    #[test]
    fn tickets_carry_direction() {
        let mut pair = expanded();
        let ticket = pair.edit_conversion("85").unwrap();
        assert_eq!(ticket.direction, Direction::ConversionToMain);
        assert_eq!(ticket.from_currency(), "EUR");
        assert_eq!(ticket.to_currency(), "USD");
        assert_eq!(pair.last_edited(), EditedField::Conversion);
    }

    #[test]
    fn only_the_latest_ticket_applies() {
        let mut pair = expanded();
        let first = pair.edit_main("100").unwrap();
        let second = pair.edit_main("200").unwrap();

        assert!(!pair.apply(&first, 8_500));
        assert_eq!(pair.conversion_value(), None);
        assert!(pair.apply(&second, 17_000));
        assert_eq!(pair.conversion_value(), Some(17_000));
    }

    #[test]
    fn source_currency_change_clears_and_invalidates() {
        let mut pair = expanded();
        let ticket = pair.edit_main("100").unwrap();
        pair.apply(&ticket, 8_500);

        let in_flight = pair.edit_main("150").unwrap();
        assert!(pair.set_source_currency("GBP"));
        assert!(!pair.set_source_currency("GBP"));
        assert_eq!(pair.conversion_value(), None);
        assert!(!pair.apply(&in_flight, 12_750));
        assert_eq!(pair.conversion_value(), None);
        assert_eq!(pair.main_value(), Some(15_000));
    }

    #[test]
    fn collapsing_invalidates_in_flight() {
        let mut pair = expanded();
        let ticket = pair.edit_main("100").unwrap();
        assert!(pair.toggle().is_none());
        assert!(!pair.apply(&ticket, 8_500));
        assert!(!pair.snapshot().is_expanded);
    }
}
