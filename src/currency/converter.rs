use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::cache::RateCache;
use super::pair::{ConversionTicket, Direction};
use crate::error::ConversionError;
use crate::money::{self, MinorUnits};
use crate::transport::{ConversionRequest, CurrencyApi};

/// Cache-aware conversion of ticket amounts.
///
/// The conversion endpoint is always asked in the pair's own orientation
/// (main currency as source) and answers with a target → source rate. The
/// main → conversion factor is therefore `1 / rate`, the conversion → main
/// factor is `rate` itself. Each factor is cached under its own direction.
#[derive(Clone)]
pub struct CurrencyConverter {
    api: Arc<dyn CurrencyApi>,
    cache: RateCache,
}

impl CurrencyConverter {
    pub fn new(api: Arc<dyn CurrencyApi>, cache: RateCache) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Convert the ticket's amount, in minor units of its target side.
    pub async fn convert(&self, ticket: &ConversionTicket) -> Result<MinorUnits, ConversionError> {
        let factor = self.factor(ticket).await?;
        money::apply_factor(ticket.amount, factor).ok_or_else(|| ConversionError::UnusableRate {
            source_currency: ticket.from_currency().to_string(),
            target_currency: ticket.to_currency().to_string(),
            rate: factor.to_string(),
        })
    }

    async fn factor(&self, ticket: &ConversionTicket) -> Result<Decimal, ConversionError> {
        let (from, to) = (ticket.from_currency(), ticket.to_currency());
        if let Some(factor) = self.cache.get(from, to).await {
            debug!(key = %ticket.cache_key(), "Conversion rate cache hit");
            return Ok(factor);
        }

        let request = ConversionRequest {
            source_currency: ticket.source_currency.clone(),
            target_currency: ticket.target_currency.clone(),
            amount: ticket.amount,
        };
        let response = self.api.convert(&request).await.map_err(|e| ConversionError::RequestFailed {
            source_currency: request.source_currency.clone(),
            target_currency: request.target_currency.clone(),
            reason: e.to_string(),
        })?;

        let rate = response.conversion_data.exchange_rate;
        let unusable = || ConversionError::UnusableRate {
            source_currency: request.source_currency.clone(),
            target_currency: request.target_currency.clone(),
            rate: rate.to_string(),
        };
        if rate <= Decimal::ZERO {
            return Err(unusable());
        }
        let factor = match ticket.direction {
            Direction::MainToConversion => Decimal::ONE.checked_div(rate).ok_or_else(unusable)?,
            Direction::ConversionToMain => rate,
        };

        info!(key = %ticket.cache_key(), %rate, %factor, "Fetched conversion rate");
        self.cache.insert(from, to, factor).await;
        Ok(factor)
    }
}
