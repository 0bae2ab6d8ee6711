//! Monetary amounts as integer minor units.
//!
//! Amounts travel through the engine and over the wire as cents. Decimal
//! display strings only exist at the field boundary; conversion in either
//! direction rounds to two decimal places, half-up.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Integer amount in the currency's minor unit (cents).
pub type MinorUnits = i64;

const DISPLAY_SCALE: u32 = 2;
const MONTHS_PER_YEAR: i64 = 12;

/// Round a decimal to two places using half-up rounding.
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Minor units as a decimal amount (`12345` → `123.45`).
pub fn to_decimal(amount: MinorUnits) -> Decimal {
    Decimal::new(amount, DISPLAY_SCALE)
}

/// Decimal amount to minor units, rounding half-up. `None` on overflow.
pub fn from_decimal(value: Decimal) -> Option<MinorUnits> {
    round_half_up(value).checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
}

/// Parse a display string such as `"1,234.5"` into minor units.
///
/// Returns `None` for empty or non-numeric input.
pub fn parse_display(input: &str) -> Option<MinorUnits> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value = Decimal::from_str(&cleaned).ok()?;
    from_decimal(value)
}

/// Format minor units as a display string with exactly two decimals.
pub fn format_minor(amount: MinorUnits) -> String {
    to_decimal(amount).to_string()
}

/// Multiply an amount by a conversion factor, rounding the result half-up.
pub fn apply_factor(amount: MinorUnits, factor: Decimal) -> Option<MinorUnits> {
    let converted = to_decimal(amount).checked_mul(factor)?;
    from_decimal(converted)
}

/// The period a salary amount is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalaryPeriod {
    #[default]
    Annual,
    Monthly,
}

impl SalaryPeriod {
    /// Express `amount` (in this period) as an annual amount.
    pub fn to_annual(self, amount: MinorUnits) -> MinorUnits {
        match self {
            Self::Annual => amount,
            Self::Monthly => amount.saturating_mul(MONTHS_PER_YEAR),
        }
    }

    /// Express an annual amount in this period, rounding half-up.
    pub fn from_annual(self, annual: MinorUnits) -> MinorUnits {
        match self {
            Self::Annual => annual,
            Self::Monthly => {
                let monthly = to_decimal(annual) / Decimal::from(MONTHS_PER_YEAR);
                from_decimal(monthly).unwrap_or(annual / MONTHS_PER_YEAR)
            }
        }
    }
}

impl std::fmt::Display for SalaryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Annual => write!(f, "annual"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}
