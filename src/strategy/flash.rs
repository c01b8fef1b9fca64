//! Flash-crash reversal detection
//!
//! Keeps a few seconds of up/down prices per market. A sharp drop on one
//! side within the window is treated as an overreaction and bought.

use crate::market::{MarketSnapshot, Outcome};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// A detected drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSignal {
    /// Side that dropped, and the one to buy
    pub side: Outcome,
    /// Relative drop from the window high
    pub drop_pct: Decimal,
    pub from_price: Decimal,
    pub to_price: Decimal,
    /// 0-100
    pub confidence: Decimal,
}

#[derive(Debug, Default)]
struct PriceWindow {
    up: VecDeque<(DateTime<Utc>, Decimal)>,
    down: VecDeque<(DateTime<Utc>, Decimal)>,
}

impl PriceWindow {
    fn side(&mut self, outcome: Outcome) -> &mut VecDeque<(DateTime<Utc>, Decimal)> {
        match outcome {
            Outcome::Up => &mut self.up,
            Outcome::Down => &mut self.down,
        }
    }
}

/// Per-market rolling window of outcome prices
pub struct FlashDetector {
    threshold: Decimal,
    window: Duration,
    markets: Mutex<HashMap<String, PriceWindow>>,
}

impl FlashDetector {
    pub fn new(threshold: Decimal, window: Duration) -> Self {
        Self {
            threshold,
            window,
            markets: Mutex::new(HashMap::new()),
        }
    }

    /// Record the snapshot's prices and report a drop, if any
    pub async fn observe(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> Option<FlashSignal> {
        let mut markets = self.markets.lock().await;
        let window = markets.entry(market.market_id.clone()).or_default();

        let mut best: Option<FlashSignal> = None;
        for outcome in [Outcome::Up, Outcome::Down] {
            let price = market.price_for(outcome);
            let series = window.side(outcome);
            series.push_back((now, price));
            let cutoff = now - self.window;
            while series.front().is_some_and(|(ts, _)| *ts < cutoff) {
                series.pop_front();
            }

            let high = series.iter().map(|(_, p)| *p).max().unwrap_or(price);
            if high <= Decimal::ZERO || price >= high {
                continue;
            }
            let drop_pct = (high - price) / high;
            if drop_pct >= self.threshold && best.as_ref().map_or(true, |b| drop_pct > b.drop_pct) {
                best = Some(FlashSignal {
                    side: outcome,
                    drop_pct,
                    from_price: high,
                    to_price: price,
                    confidence: (dec!(50) + drop_pct * dec!(100)).min(dec!(90)),
                });
            }
        }

        if let Some(signal) = &best {
            // One signal per crash
            window.side(signal.side).clear();
            tracing::info!(
                market = %market.market_id,
                asset = %market.asset,
                side = %signal.side,
                drop_pct = %signal.drop_pct.round_dp(4),
                from = %signal.from_price,
                to = %signal.to_price,
                "Flash crash detected"
            );
        }
        best
    }

    /// Forget markets that are no longer live
    pub async fn retain_markets(&self, live: &[MarketSnapshot]) {
        let mut markets = self.markets.lock().await;
        markets.retain(|id, _| live.iter().any(|m| &m.market_id == id));
    }
}
