//! Order book state

use super::PriceLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// L2 aggregated order book for a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Token identifier
    pub token_id: String,
    /// Bid levels, sorted best (highest) to worst
    pub bids: Vec<PriceLevel>,
    /// Ask levels, sorted best (lowest) to worst
    pub asks: Vec<PriceLevel>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: vec![],
            asks: vec![],
            updated_at: Utc::now(),
        }
    }

    /// Build a book from venue levels in any order
    ///
    /// Zero-size and non-positive-price levels are dropped; bids end up
    /// descending and asks ascending.
    pub fn from_levels(
        token_id: impl Into<String>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        let keep = |l: &PriceLevel| l.size > Decimal::ZERO && l.price > Decimal::ZERO;

        let mut bids: Vec<PriceLevel> = bids.into_iter().filter(keep).collect();
        let mut asks: Vec<PriceLevel> = asks.into_iter().filter(keep).collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            token_id: token_id.into(),
            bids,
            asks,
            updated_at: Utc::now(),
        }
    }

    /// Keep at most `n` levels per side
    pub fn truncate(&mut self, n: usize) {
        self.bids.truncate(n);
        self.asks.truncate(n);
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Total size across bid levels
    pub fn bid_depth(&self) -> Decimal {
        self.bids.iter().map(|l| l.size).sum()
    }

    /// Total size across ask levels
    pub fn ask_depth(&self) -> Decimal {
        self.asks.iter().map(|l| l.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, size: Decimal) -> PriceLevel {
        PriceLevel { price, size }
    }

    #[test]
    fn test_from_levels_sorts_and_filters() {
        // REST books arrive worst-first
        let book = OrderBook::from_levels(
            "tok",
            vec![
                level(dec!(0.40), dec!(10)),
                level(dec!(0.45), dec!(0)),
                level(dec!(0.48), dec!(5)),
            ],
            vec![level(dec!(0.60), dec!(7)), level(dec!(0.52), dec!(3))],
        );

        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.best_bid(), Some(dec!(0.48)));
        assert_eq!(book.best_ask(), Some(dec!(0.52)));
        assert_eq!(book.bid_depth(), dec!(15));
        assert_eq!(book.ask_depth(), dec!(10));
    }

    #[test]
    fn test_order_book_mid_and_spread() {
        let book = OrderBook::from_levels(
            "tok",
            vec![level(dec!(0.50), dec!(100))],
            vec![level(dec!(0.52), dec!(100))],
        );

        assert_eq!(book.mid_price(), Some(dec!(0.51)));
        assert_eq!(book.spread(), Some(dec!(0.02)));
    }

    #[test]
    fn test_one_sided_book_has_no_mid() {
        let book = OrderBook::from_levels("tok", vec![level(dec!(0.54), dec!(100))], vec![]);
        assert_eq!(book.best_bid(), Some(dec!(0.54)));
        assert!(book.mid_price().is_none());
        assert!(book.spread().is_none());
        assert!(!book.is_empty());
    }

    #[test]
    fn test_truncate_keeps_best_levels() {
        let bids = (1..=15).map(|i| level(Decimal::new(i, 2), dec!(1))).collect();
        let mut book = OrderBook::from_levels("tok", bids, vec![]);
        book.truncate(10);
        assert_eq!(book.bids.len(), 10);
        assert_eq!(book.best_bid(), Some(dec!(0.15)));
    }
}
