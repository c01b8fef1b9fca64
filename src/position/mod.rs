//! Open position table and its on-disk form
//!
//! The engine owns exactly one [`PositionBook`]; the risk manager only keeps
//! a reconciled view of the exposure it implies.

mod book;
mod store;

pub use book::{CapacityError, PositionBook};
pub use store::{LoadOutcome, PositionStore, PurgeReason, StoreError};

use crate::market::Outcome;
use crate::strategy::StrategyKind;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Confidence assumed when a strategy has no better estimate
pub const DEFAULT_CONFIDENCE: Decimal = dec!(50);

/// An open position, keyed by its outcome token
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub token_id: String,
    pub side: Outcome,
    /// Actual fill price
    pub entry_price: Decimal,
    /// Actual fill size in shares
    pub size: Decimal,
    pub entry_time: DateTime<Utc>,
    pub market_id: String,
    pub asset: String,
    pub strategy: StrategyKind,
    /// Highest exit price seen since entry
    pub peak_price: Decimal,
    /// Venue risk-class flag captured at entry; used for every exit order
    pub neg_risk: bool,
    /// Strategy confidence at entry, 0-100
    pub confidence: Decimal,
}

impl Position {
    /// Capital committed at entry
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.size
    }

    /// Unrealized return at `price` as a fraction of entry
    pub fn pnl_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) / self.entry_price
    }

    /// Unrealized P&L in USDC at `price`
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.size
    }

    /// Raise the peak if `price` exceeds it
    pub fn update_peak(&mut self, price: Decimal) -> bool {
        if price > self.peak_price {
            self.peak_price = price;
            true
        } else {
            false
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    pub fn to_record(&self) -> PositionRecord {
        PositionRecord {
            side: self.side,
            entry_price: self.entry_price,
            size: self.size,
            entry_time: self.entry_time,
            market_id: self.market_id.clone(),
            asset: self.asset.clone(),
            strategy: self.strategy,
            peak_price: self.peak_price,
            neg_risk: self.neg_risk,
            confidence: self.confidence,
        }
    }

    pub fn from_record(token_id: impl Into<String>, record: PositionRecord) -> Self {
        Self {
            token_id: token_id.into(),
            side: record.side,
            entry_price: record.entry_price,
            size: record.size,
            entry_time: record.entry_time,
            market_id: record.market_id,
            asset: record.asset,
            strategy: record.strategy,
            peak_price: record.peak_price,
            neg_risk: record.neg_risk,
            confidence: record.confidence,
        }
    }
}

/// Persisted form of a position, stored under its token id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub side: Outcome,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub entry_time: DateTime<Utc>,
    pub market_id: String,
    pub asset: String,
    pub strategy: StrategyKind,
    pub peak_price: Decimal,
    #[serde(default)]
    pub neg_risk: bool,
    #[serde(default = "default_confidence")]
    pub confidence: Decimal,
}

fn default_confidence() -> Decimal {
    DEFAULT_CONFIDENCE
}
