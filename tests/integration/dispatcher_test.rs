//! Bounded market dispatch

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use poly_engine::engine::{MarketDispatcher, MarketProcessor};
use poly_engine::market::MarketSnapshot;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::support::market;

#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
    seen: AtomicUsize,
}

#[async_trait]
impl MarketProcessor for Gauge {
    async fn process_market(&self, _market: &MarketSnapshot, _now: DateTime<Utc>) -> anyhow::Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_batch_size_markets_in_flight() {
    let now = Utc::now();
    let markets: Vec<MarketSnapshot> = (0..25)
        .map(|i| market(&format!("m{i}"), dec!(0.5), dec!(0.5), Duration::minutes(10), now))
        .collect();
    let gauge = Arc::new(Gauge::default());

    let report = MarketDispatcher::new(10).run_cycle(&gauge, &markets, now).await;

    assert_eq!(report.markets, 25);
    assert_eq!(report.batches, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(gauge.seen.load(Ordering::SeqCst), 25);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 10);
}

#[tokio::test]
async fn test_empty_cycle() {
    let gauge = Arc::new(Gauge::default());
    let report = MarketDispatcher::new(10).run_cycle(&gauge, &[], Utc::now()).await;
    assert_eq!(report.markets, 0);
    assert_eq!(report.batches, 0);
}
