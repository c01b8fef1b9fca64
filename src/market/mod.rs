//! Market discovery module
//!
//! Finds live 15-minute up/down markets via the Gamma API and serves them
//! through a short-TTL cache.

mod cache;
mod gamma;

pub use cache::CachedMarketFeed;
pub use gamma::{window_start, GammaClient, GammaConfig};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a binary up/down market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Up,
    Down,
}

impl Outcome {
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Up => Outcome::Down,
            Outcome::Down => Outcome::Up,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Up => "UP",
            Outcome::Down => "DOWN",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live 15-minute up/down market as last fetched
///
/// Immutable once fetched; a newer fetch replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Condition identifier
    pub market_id: String,
    /// Underlying asset symbol, upper case (e.g. "BTC")
    pub asset: String,
    pub up_token_id: String,
    pub down_token_id: String,
    pub up_price: Decimal,
    pub down_price: Decimal,
    /// Settlement time
    pub end_time: DateTime<Utc>,
    /// Combinatorial (negative-risk) market flag
    pub neg_risk: bool,
    pub tick_size: Decimal,
}

impl MarketSnapshot {
    pub fn token_for(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Up => &self.up_token_id,
            Outcome::Down => &self.down_token_id,
        }
    }

    pub fn price_for(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Up => self.up_price,
            Outcome::Down => self.down_price,
        }
    }

    /// Which side a token belongs to, if it belongs to this market
    pub fn outcome_of(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.up_token_id {
            Some(Outcome::Up)
        } else if token_id == self.down_token_id {
            Some(Outcome::Down)
        } else {
            None
        }
    }

    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.end_time - now
    }
}

/// Trait for live market sources
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Currently tradeable markets, optionally limited to one asset
    async fn fetch_live_markets(
        &self,
        asset_filter: Option<&str>,
    ) -> anyhow::Result<Vec<MarketSnapshot>>;
}
