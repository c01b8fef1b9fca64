//! Order book module
//!
//! Book snapshots fetched from the venue and the depth analyzer built on them

mod analyzer;
mod book;

pub use analyzer::{
    liquidity_score, walk_levels, LiquidityCheck, OrderBookAnalyzer, OrderBookDepth,
    SlippageEstimate,
};
pub use book::OrderBook;

use crate::exchange::ExchangeError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price level in the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total size available
    pub size: Decimal,
}

/// Anything that can serve a token's current order book
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExchangeError>;
}
