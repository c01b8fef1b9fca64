//! Advisory collaborators
//!
//! Advisors can veto an entry and learn from closed trades. They are
//! advisory only: an advisor error approves, and recording never blocks
//! execution.

mod journal;

pub use journal::JournalAdvisor;

use crate::market::Outcome;
use crate::strategy::StrategyKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What an advisor is asked before an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceRequest {
    pub strategy: StrategyKind,
    pub asset: String,
    /// Expected edge of the trade, as a price fraction
    pub expected_edge: Decimal,
}

/// An advisor's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub approve: bool,
    /// 0-100
    pub score: Decimal,
    pub reason: String,
}

/// A closed trade, real or synthetic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub token_id: String,
    pub market_id: String,
    pub asset: String,
    pub strategy: StrategyKind,
    pub side: Outcome,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub profit: Decimal,
    pub exit_reason: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// Estimated rather than realized (purged or force-removed positions)
    #[serde(default)]
    pub synthetic: bool,
}

impl TradeOutcome {
    /// Profit as a percentage of cost
    pub fn profit_pct(&self) -> Decimal {
        let cost = self.entry_price * self.size;
        if cost.is_zero() {
            return Decimal::ZERO;
        }
        self.profit / cost * Decimal::ONE_HUNDRED
    }
}

/// Trait for advisory collaborators
#[async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    /// Approve or veto an entry
    async fn advise(&self, request: &AdviceRequest) -> anyhow::Result<Advice>;

    /// Learn from a closed trade
    async fn record(&self, outcome: &TradeOutcome) -> anyhow::Result<()>;
}

/// All configured advisors, consulted together
#[derive(Clone, Default)]
pub struct AdvisorPanel {
    advisors: Vec<Arc<dyn Advisor>>,
}

impl AdvisorPanel {
    pub fn new(advisors: Vec<Arc<dyn Advisor>>) -> Self {
        Self { advisors }
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    /// Any veto blocks; advisor errors count as approval
    pub async fn should_trade(&self, request: &AdviceRequest) -> Advice {
        let mut lowest: Option<Decimal> = None;

        for advisor in &self.advisors {
            match advisor.advise(request).await {
                Ok(advice) if !advice.approve => {
                    return Advice {
                        approve: false,
                        score: advice.score,
                        reason: format!("{}: {}", advisor.name(), advice.reason),
                    };
                }
                Ok(advice) => {
                    lowest = Some(lowest.map_or(advice.score, |s| s.min(advice.score)));
                }
                Err(e) => {
                    tracing::warn!(
                        advisor = advisor.name(),
                        strategy = request.strategy.as_str(),
                        asset = %request.asset,
                        error = %e,
                        "Advisor failed, treating as approval"
                    );
                }
            }
        }

        Advice {
            approve: true,
            score: lowest.unwrap_or(Decimal::ONE_HUNDRED),
            reason: "approved".to_string(),
        }
    }

    /// Hand an outcome to every advisor without waiting
    pub fn record(&self, outcome: TradeOutcome) {
        for advisor in &self.advisors {
            let advisor = Arc::clone(advisor);
            let outcome = outcome.clone();
            tokio::spawn(async move {
                if let Err(e) = advisor.record(&outcome).await {
                    tracing::warn!(
                        advisor = advisor.name(),
                        token_id = %outcome.token_id,
                        error = %e,
                        "Advisor failed to record outcome"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        approve: Option<bool>,
        recorded: AtomicUsize,
    }

    #[async_trait]
    impl Advisor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn advise(&self, _request: &AdviceRequest) -> anyhow::Result<Advice> {
            match self.approve {
                Some(approve) => Ok(Advice {
                    approve,
                    score: dec!(30),
                    reason: "fixed".to_string(),
                }),
                None => anyhow::bail!("unavailable"),
            }
        }

        async fn record(&self, _outcome: &TradeOutcome) -> anyhow::Result<()> {
            self.recorded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fixed(approve: Option<bool>) -> Arc<Fixed> {
        Arc::new(Fixed {
            approve,
            recorded: AtomicUsize::new(0),
        })
    }

    fn request() -> AdviceRequest {
        AdviceRequest {
            strategy: StrategyKind::SumToOne,
            asset: "BTC".to_string(),
            expected_edge: dec!(0.05),
        }
    }

    #[tokio::test]
    async fn test_veto_blocks() {
        let panel = AdvisorPanel::new(vec![fixed(Some(true)), fixed(Some(false))]);
        let advice = panel.should_trade(&request()).await;
        assert!(!advice.approve);
        assert!(advice.reason.starts_with("fixed:"));
    }

    #[tokio::test]
    async fn test_errors_fail_open() {
        let panel = AdvisorPanel::new(vec![fixed(None)]);
        assert!(panel.should_trade(&request()).await.approve);
        assert!(AdvisorPanel::default().should_trade(&request()).await.approve);
    }

    #[tokio::test]
    async fn test_record_reaches_every_advisor() {
        let a = fixed(Some(true));
        let b = fixed(None);
        let panel = AdvisorPanel::new(vec![a.clone(), b.clone()]);

        panel.record(TradeOutcome {
            token_id: "t".into(),
            market_id: "m".into(),
            asset: "BTC".into(),
            strategy: StrategyKind::Latency,
            side: Outcome::Up,
            entry_price: dec!(0.5),
            exit_price: dec!(0.6),
            size: dec!(10),
            profit: dec!(1),
            exit_reason: "take_profit".into(),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
            synthetic: false,
        });

        for _ in 0..100 {
            if a.recorded.load(Ordering::SeqCst) == 1 && b.recorded.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(a.recorded.load(Ordering::SeqCst), 1);
        assert_eq!(b.recorded.load(Ordering::SeqCst), 1);
    }
}
