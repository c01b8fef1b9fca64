//! Short-horizon directional signal from reference-price momentum
//!
//! Spot exchanges move before the 15-minute books reprice. When every
//! lookback window agrees on direction, the lagging side is bought.

use crate::feed::ReferencePriceTracker;
use crate::market::Outcome;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Direction plus confidence from a latency signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionalSignal {
    pub direction: Outcome,
    /// 0-100
    pub confidence: Decimal,
    /// Moves per window, shortest first
    pub moves: Vec<Decimal>,
}

/// Source of short-horizon directional signals
#[async_trait]
pub trait LatencySignal: Send + Sync {
    async fn evaluate(&self, asset: &str, now: DateTime<Utc>) -> Option<DirectionalSignal>;
}

/// Built-in signal: multi-window reference momentum
pub struct MomentumLatencySignal {
    tracker: Arc<ReferencePriceTracker>,
    /// Ascending lookbacks
    windows: Vec<Duration>,
    min_move: Decimal,
}

impl MomentumLatencySignal {
    pub fn new(tracker: Arc<ReferencePriceTracker>, windows_secs: &[i64], min_move: Decimal) -> Self {
        let mut windows: Vec<Duration> = windows_secs.iter().map(|s| Duration::seconds(*s)).collect();
        windows.sort();
        Self {
            tracker,
            windows,
            min_move,
        }
    }

    /// Confidence grows 10 points per multiple of the minimum move
    fn confidence(&self, shortest: Decimal) -> Decimal {
        if self.min_move.is_zero() {
            return dec!(50);
        }
        (dec!(50) + shortest.abs() / self.min_move * dec!(10)).min(dec!(95))
    }
}

#[async_trait]
impl LatencySignal for MomentumLatencySignal {
    async fn evaluate(&self, asset: &str, now: DateTime<Utc>) -> Option<DirectionalSignal> {
        let mut moves = Vec::with_capacity(self.windows.len());
        for window in &self.windows {
            moves.push(self.tracker.change_over(asset, *window, now).await?);
        }

        let shortest = *moves.first()?;
        if shortest.abs() < self.min_move {
            return None;
        }
        let up = shortest > Decimal::ZERO;
        let agree = moves
            .iter()
            .all(|m| !m.is_zero() && (*m > Decimal::ZERO) == up);
        if !agree {
            return None;
        }

        Some(DirectionalSignal {
            direction: if up { Outcome::Up } else { Outcome::Down },
            confidence: self.confidence(shortest),
            moves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn tracker_with(prices: &[(i64, Decimal)], now: DateTime<Utc>) -> Arc<ReferencePriceTracker> {
        let tracker = Arc::new(ReferencePriceTracker::new(Duration::minutes(15)));
        for (ago, price) in prices {
            tracker.record("BTC", now - Duration::seconds(*ago), *price).await;
        }
        tracker
    }

    #[tokio::test]
    async fn test_agreeing_windows_fire() {
        let now = Utc::now();
        let tracker = tracker_with(
            &[(60, dec!(100)), (30, dec!(100.1)), (10, dec!(100.2)), (0, dec!(100.4))],
            now,
        )
        .await;
        let signal = MomentumLatencySignal::new(tracker, &[60, 10, 30], dec!(0.001));

        let result = signal.evaluate("BTC", now).await.unwrap();
        assert_eq!(result.direction, Outcome::Up);
        assert_eq!(result.moves.len(), 3);
        assert!(result.confidence >= dec!(60));
    }

    #[tokio::test]
    async fn test_disagreement_is_silent() {
        let now = Utc::now();
        let tracker = tracker_with(
            &[(60, dec!(101)), (30, dec!(99)), (10, dec!(99.5)), (0, dec!(100))],
            now,
        )
        .await;
        let signal = MomentumLatencySignal::new(tracker, &[10, 30, 60], dec!(0.001));
        assert!(signal.evaluate("BTC", now).await.is_none());
    }

    #[tokio::test]
    async fn test_small_move_is_silent() {
        let now = Utc::now();
        let tracker = tracker_with(
            &[(60, dec!(100)), (30, dec!(100)), (10, dec!(100)), (0, dec!(100.05))],
            now,
        )
        .await;
        let signal = MomentumLatencySignal::new(tracker, &[10, 30, 60], dec!(0.001));
        assert!(signal.evaluate("BTC", now).await.is_none());
    }

    #[tokio::test]
    async fn test_short_history_is_silent() {
        let now = Utc::now();
        let tracker = tracker_with(&[(5, dec!(100)), (0, dec!(102))], now).await;
        let signal = MomentumLatencySignal::new(tracker, &[10, 30, 60], dec!(0.001));
        assert!(signal.evaluate("BTC", now).await.is_none());
    }
}
