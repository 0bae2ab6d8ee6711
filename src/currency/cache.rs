use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

/// Directional conversion factors keyed `"{from}:{to}"`.
///
/// Cloning shares the underlying map, so every pair of one flow sees the
/// same entries. `EUR:USD` and `USD:EUR` are independent. Entries are never
/// evicted.
#[derive(Debug, Clone, Default)]
pub struct RateCache {
    factors: Arc<RwLock<HashMap<String, Decimal>>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(from: &str, to: &str) -> String {
        format!("{from}:{to}")
    }

    /// Factor that turns an amount in `from` into `to`.
    pub async fn get(&self, from: &str, to: &str) -> Option<Decimal> {
        self.factors.read().await.get(&Self::key(from, to)).copied()
    }

    pub async fn insert(&self, from: &str, to: &str, factor: Decimal) {
        self.factors.write().await.insert(Self::key(from, to), factor);
    }

    pub async fn len(&self) -> usize {
        self.factors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.factors.read().await.is_empty()
    }
}
