//! Price feed types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Feed setup errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Nothing to subscribe to
    #[error("no symbols configured")]
    NoSymbols,
    /// The feed task has stopped
    #[error("feed closed")]
    Closed,
}

/// A single spot trade from the reference exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Trade price
    pub price: Decimal,
    /// Local timestamp when tick was received
    pub timestamp: DateTime<Utc>,
    /// Exchange timestamp (e.g., Binance trade time)
    pub exchange_ts: DateTime<Utc>,
}

impl PriceTick {
    /// Underlying asset for a USDT pair ("BTCUSDT" -> "BTC")
    pub fn asset(&self) -> &str {
        self.symbol
            .strip_suffix("USDT")
            .or_else(|| self.symbol.strip_suffix("usdt"))
            .unwrap_or(&self.symbol)
    }
}

/// Latest known price of an outcome token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TokenPrice {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Whether the price is younger than `max_age`
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_asset() {
        let tick = PriceTick {
            symbol: "ETHUSDT".to_string(),
            price: dec!(3000),
            timestamp: Utc::now(),
            exchange_ts: Utc::now(),
        };
        assert_eq!(tick.asset(), "ETH");
    }

    #[test]
    fn test_token_price_freshness() {
        let now = Utc::now();
        let price = TokenPrice {
            price: dec!(0.5),
            timestamp: now - Duration::seconds(31),
        };
        assert!(!price.is_fresh(now, Duration::seconds(30)));
        assert!(price.is_fresh(now, Duration::seconds(60)));
    }
}
