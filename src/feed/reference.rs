//! Rolling reference (spot) price history per asset
//!
//! Feeds the latency signal, the oracle momentum veto and the volatility
//! input of the trailing stop.

use super::{PriceTick, ReferenceFeed};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Spot price history, keyed by upper-case asset symbol
pub struct ReferencePriceTracker {
    retention: Duration,
    series: RwLock<HashMap<String, VecDeque<(DateTime<Utc>, Decimal)>>>,
}

impl ReferencePriceTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Add an observation and drop samples older than the retention
    pub async fn record(&self, asset: &str, timestamp: DateTime<Utc>, price: Decimal) {
        let mut series = self.series.write().await;
        let prices = series.entry(asset.to_uppercase()).or_default();
        prices.push_back((timestamp, price));

        let cutoff = timestamp - self.retention;
        while let Some((ts, _)) = prices.front() {
            if *ts < cutoff {
                prices.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn record_tick(&self, tick: &PriceTick) {
        self.record(tick.asset(), tick.exchange_ts, tick.price).await;
    }

    /// Most recent price
    pub async fn latest(&self, asset: &str) -> Option<Decimal> {
        let series = self.series.read().await;
        series.get(&asset.to_uppercase())?.back().map(|(_, p)| *p)
    }

    /// Relative change over the trailing `window`
    ///
    /// The base is the last sample at or before `now - window`; without one
    /// the history is too short and the result is `None`.
    pub async fn change_over(
        &self,
        asset: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        let series = self.series.read().await;
        let prices = series.get(&asset.to_uppercase())?;
        let (_, current) = prices.back()?;

        let cutoff = now - window;
        let (_, base) = prices.iter().rev().find(|(ts, _)| *ts <= cutoff)?;
        if base.is_zero() {
            return None;
        }
        Some((current - base) / base)
    }

    /// Price range over the trailing `window` relative to its low
    pub async fn volatility(
        &self,
        asset: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        let series = self.series.read().await;
        let prices = series.get(&asset.to_uppercase())?;

        let cutoff = now - window;
        let in_window = prices.iter().filter(|(ts, _)| *ts >= cutoff).map(|(_, p)| *p);
        let (low, high, count) = in_window.fold(
            (Decimal::MAX, Decimal::MIN, 0usize),
            |(lo, hi, n), p| (lo.min(p), hi.max(p), n + 1),
        );
        if count < 2 || low <= Decimal::ZERO {
            return None;
        }
        Some((high - low) / low)
    }

    /// Consume a reference feed until it ends
    pub fn spawn(self: &Arc<Self>, feed: Arc<dyn ReferenceFeed>) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticks = match feed.subscribe().await {
                Ok(rx) => rx,
                Err(e) => {
                    tracing::error!(error = %e, "Reference feed unavailable");
                    return;
                }
            };
            while let Some(tick) = ticks.recv().await {
                tracker.record_tick(&tick).await;
            }
            tracing::warn!("Reference feed ended");
        })
    }
}
