//! Coin universe abstractions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One coin of the ranked market listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRef {
    pub provider_id: String,
    pub symbol: String,
    pub name: String,
    pub market_cap_rank: Option<u32>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Source of the top coins by market capitalization.
///
/// Implementations never fail: an upstream error ends pagination and the
/// coins gathered so far are returned.
#[async_trait]
pub trait CoinUniverseProvider: Send + Sync {
    async fn fetch_top(&self, limit: usize) -> Vec<CoinRef>;
}
