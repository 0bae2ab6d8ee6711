//! Debounced driver for a [`ConversionPair`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::converter::CurrencyConverter;
use super::pair::{ConversionPair, ConversionSnapshot, ConversionTicket};

/// Runs conversions for one pair.
///
/// Each edit supersedes the previous pending conversion: the earlier task is
/// aborted, and anything that still resolves late is discarded by the pair's
/// generation check. Conversion failures are logged and swallowed.
pub struct ConversionController {
    pair: Arc<Mutex<ConversionPair>>,
    converter: CurrencyConverter,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ConversionController {
    pub fn new(pair: ConversionPair, converter: CurrencyConverter, debounce: Duration) -> Self {
        Self {
            pair: Arc::new(Mutex::new(pair)),
            converter,
            debounce,
            pending: Mutex::new(None),
        }
    }

    pub async fn edit_main(&self, raw: &str) {
        let ticket = self.pair.lock().await.edit_main(raw);
        if let Some(ticket) = ticket {
            self.schedule(ticket, self.debounce).await;
        }
    }

    pub async fn edit_conversion(&self, raw: &str) {
        let ticket = self.pair.lock().await.edit_conversion(raw);
        if let Some(ticket) = ticket {
            self.schedule(ticket, self.debounce).await;
        }
    }

    /// Expanding with a main value converts right away, without debounce.
    pub async fn toggle(&self) {
        let ticket = self.pair.lock().await.toggle();
        if let Some(ticket) = ticket {
            self.schedule(ticket, Duration::ZERO).await;
        }
    }

    pub async fn set_source_currency(&self, currency: &str) -> bool {
        self.pair.lock().await.set_source_currency(currency)
    }

    pub async fn set_target_currency(&self, currency: &str) -> bool {
        self.pair.lock().await.set_target_currency(currency)
    }

    /// Wait for the pending conversion, if any, to finish.
    pub async fn settle(&self) {
        let handle = self.pending.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "Conversion task failed");
        }
    }

    pub async fn snapshot(&self) -> ConversionSnapshot {
        self.pair.lock().await.snapshot()
    }

    async fn schedule(&self, ticket: ConversionTicket, delay: Duration) {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let pair = Arc::clone(&self.pair);
        let converter = self.converter.clone();
        *pending = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if pair.lock().await.generation() != ticket.generation {
                debug!(key = %ticket.cache_key(), "Conversion superseded before request");
                return;
            }
            match converter.convert(&ticket).await {
                Ok(converted) => {
                    pair.lock().await.apply(&ticket, converted);
                }
                Err(e) => warn!(key = %ticket.cache_key(), error = %e, "Currency conversion failed"),
            }
        }));
    }
}
