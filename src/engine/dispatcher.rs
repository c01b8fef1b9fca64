//! Bounded-concurrency market fan-out
//!
//! Markets are processed in fixed-size batches. Every task in a batch runs
//! concurrently and the batch is awaited as a whole before the next starts,
//! so no more than `batch_size` markets are ever in flight.

use crate::market::MarketSnapshot;
use crate::telemetry::{self, CounterMetric};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;

/// Per-market unit of work run by the dispatcher
#[async_trait]
pub trait MarketProcessor: Send + Sync + 'static {
    async fn process_market(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Totals for one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub markets: usize,
    pub batches: usize,
    pub failed: usize,
}

/// Runs a [`MarketProcessor`] over every market, `batch_size` at a time
pub struct MarketDispatcher {
    batch_size: usize,
}

impl MarketDispatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Process every market; task errors and panics are logged and counted
    /// without touching sibling tasks
    pub async fn run_cycle<P: MarketProcessor + ?Sized>(
        &self,
        processor: &Arc<P>,
        markets: &[MarketSnapshot],
        now: DateTime<Utc>,
    ) -> CycleReport {
        let mut report = CycleReport {
            markets: markets.len(),
            ..Default::default()
        };

        for batch in markets.chunks(self.batch_size) {
            report.batches += 1;
            let handles: Vec<_> = batch
                .iter()
                .map(|market| {
                    let processor = Arc::clone(processor);
                    let market = market.clone();
                    tokio::spawn(async move { processor.process_market(&market, now).await })
                })
                .collect();

            for (market, joined) in batch.iter().zip(join_all(handles).await) {
                let failure = match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => format!("{:#}", e),
                    Err(e) if e.is_panic() => "task panicked".to_string(),
                    Err(e) => e.to_string(),
                };
                report.failed += 1;
                telemetry::increment(CounterMetric::TaskFailures, None);
                tracing::error!(
                    market = %market.market_id,
                    asset = %market.asset,
                    error = %failure,
                    "Market task failed"
                );
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn markets(n: usize) -> Vec<MarketSnapshot> {
        (0..n)
            .map(|i| MarketSnapshot {
                market_id: format!("m{}", i),
                asset: "BTC".into(),
                up_token_id: format!("u{}", i),
                down_token_id: format!("d{}", i),
                up_price: dec!(0.5),
                down_price: dec!(0.5),
                end_time: Utc::now() + Duration::minutes(10),
                neg_risk: false,
                tick_size: dec!(0.01),
            })
            .collect()
    }

    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: AtomicUsize,
    }

    #[async_trait]
    impl MarketProcessor for Probe {
        async fn process_market(&self, market: &MarketSnapshot, _now: DateTime<Utc>) -> anyhow::Result<()> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.fetch_add(1, Ordering::SeqCst);

            match market.market_id.as_str() {
                "m3" => anyhow::bail!("book fetch exploded"),
                "m5" => panic!("bad market"),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_batches_bound_concurrency_and_isolate_failures() {
        let probe = Arc::new(Probe::default());
        let report = MarketDispatcher::new(4)
            .run_cycle(&probe, &markets(11), Utc::now())
            .await;

        assert_eq!(report.markets, 11);
        assert_eq!(report.batches, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(probe.seen.load(Ordering::SeqCst), 11);
        assert!(probe.peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        assert_eq!(MarketDispatcher::new(0).batch_size(), 1);
    }
}
