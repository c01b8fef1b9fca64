//! Price feed module
//!
//! Outcome-token prices from the Polymarket market channel, and spot
//! reference prices from Binance.

mod binance;
mod parse;
mod realtime;
mod reference;
mod types;

pub use binance::BinanceFeed;
pub use parse::{parse_market_message, PriceUpdate};
pub use realtime::RealtimePriceFeed;
pub use reference::ReferencePriceTracker;
pub use types::{FeedError, PriceTick, TokenPrice};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Live outcome-token prices with dynamic subscriptions
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Start tracking tokens; already-tracked ids are ignored
    async fn subscribe(&self, token_ids: &[String]);

    /// Stop tracking tokens
    async fn unsubscribe(&self, token_ids: &[String]);

    /// Latest fresh price, or `None` when unknown or stale
    async fn get_price(&self, token_id: &str) -> Option<TokenPrice>;
}

/// Trait for spot reference feeds
#[async_trait]
pub trait ReferenceFeed: Send + Sync {
    /// Subscribe to price updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>>;
}
