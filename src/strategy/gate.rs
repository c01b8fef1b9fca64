//! Pre-trade checks shared by every entry strategy
//!
//! Checks run in a fixed order and the first failure rejects the attempt.
//! A rejection only ends that strategy's attempt on that market.

use super::StrategyKind;
use crate::advisory::{AdviceRequest, AdvisorPanel};
use crate::config::StrategyConfig;
use crate::exchange::OrderSide;
use crate::market::MarketSnapshot;
use crate::orderbook::{LiquidityCheck, OrderBookAnalyzer};
use crate::position::CapacityError;
use crate::risk::{PortfolioRiskManager, RiskRejection};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of running the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult {
    /// Every check passed
    Pass,
    /// Attempt rejected
    Reject(RejectReason),
}

impl FilterResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }
}

/// Reason an entry attempt was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Too close to market expiry
    TooCloseToExpiry(Duration),
    /// Daily trade ceiling reached
    DailyTradeLimit(u32),
    /// Asset exposure would exceed its ceiling
    AssetExposure { exposure: Decimal, limit: Decimal },
    /// Book too thin or too steep for the size
    InsufficientLiquidity { token_id: String, detail: String },
    /// An advisor vetoed the trade
    AdvisorVeto(String),
    /// Portfolio risk manager refused
    Risk(RiskRejection),
    /// No free position slot
    Capacity(CapacityError),
    /// No usable price for a leg
    PriceUnavailable(String),
}

impl RejectReason {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::TooCloseToExpiry(_) => "too_close_to_expiry",
            RejectReason::DailyTradeLimit(_) => "daily_trade_limit",
            RejectReason::AssetExposure { .. } => "asset_exposure",
            RejectReason::InsufficientLiquidity { .. } => "insufficient_liquidity",
            RejectReason::AdvisorVeto(_) => "advisor_veto",
            RejectReason::Risk(_) => "risk",
            RejectReason::Capacity(_) => "capacity",
            RejectReason::PriceUnavailable(_) => "price_unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooCloseToExpiry(left) => {
                write!(f, "{}s to expiry", left.num_seconds())
            }
            RejectReason::DailyTradeLimit(n) => write!(f, "daily trade limit {} reached", n),
            RejectReason::AssetExposure { exposure, limit } => {
                write!(f, "asset exposure {} would exceed {}", exposure, limit)
            }
            RejectReason::InsufficientLiquidity { token_id, detail } => {
                write!(f, "{}: {}", token_id, detail)
            }
            RejectReason::AdvisorVeto(reason) => write!(f, "advisor veto: {}", reason),
            RejectReason::Risk(r) => write!(f, "{}", r),
            RejectReason::Capacity(c) => write!(f, "{}", c),
            RejectReason::PriceUnavailable(token) => write!(f, "no price for {}", token),
        }
    }
}

/// One order an entry intends to place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub token_id: String,
    pub price: Decimal,
    /// Shares
    pub size: Decimal,
}

impl Leg {
    pub fn value(&self) -> Decimal {
        self.price * self.size
    }
}

/// What the gate is asked to approve
#[derive(Debug, Clone)]
pub struct GateContext<'a> {
    pub market: &'a MarketSnapshot,
    pub strategy: StrategyKind,
    pub legs: &'a [Leg],
    pub expected_edge: Decimal,
    /// Cost basis already open on the market's asset
    pub asset_exposure: Decimal,
    pub now: DateTime<Utc>,
}

impl GateContext<'_> {
    fn total_value(&self) -> Decimal {
        self.legs.iter().map(Leg::value).sum()
    }
}

/// Entry pre-checks
pub struct EntryGate {
    analyzer: Arc<OrderBookAnalyzer>,
    advisors: AdvisorPanel,
    config: StrategyConfig,
    max_daily_trades: u32,
}

impl EntryGate {
    pub fn new(
        analyzer: Arc<OrderBookAnalyzer>,
        advisors: AdvisorPanel,
        config: StrategyConfig,
        max_daily_trades: u32,
    ) -> Self {
        Self {
            analyzer,
            advisors,
            config,
            max_daily_trades,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Arc<OrderBookAnalyzer> {
        &self.analyzer
    }

    /// Run every check in order
    ///
    /// Expiry, daily trades, asset exposure, liquidity on every leg, the
    /// advisory veto, then risk approval for the combined value.
    pub async fn pre_check(
        &self,
        ctx: &GateContext<'_>,
        risk: &Mutex<PortfolioRiskManager>,
    ) -> FilterResult {
        let result = self.run_checks(ctx, risk).await;
        if let FilterResult::Reject(reason) = &result {
            tracing::info!(
                market = %ctx.market.market_id,
                asset = %ctx.market.asset,
                strategy = ctx.strategy.as_str(),
                check = reason.kind(),
                reason = %reason,
                "Entry blocked"
            );
        }
        result
    }

    async fn run_checks(
        &self,
        ctx: &GateContext<'_>,
        risk: &Mutex<PortfolioRiskManager>,
    ) -> FilterResult {
        let left = ctx.market.time_to_expiry(ctx.now);
        if left < Duration::seconds(self.config.min_time_to_expiry_secs) {
            return FilterResult::Reject(RejectReason::TooCloseToExpiry(left));
        }

        let trades = risk.lock().await.trades_today();
        if trades >= self.max_daily_trades {
            return FilterResult::Reject(RejectReason::DailyTradeLimit(self.max_daily_trades));
        }

        let value = ctx.total_value();
        let exposure = ctx.asset_exposure + value;
        if exposure > self.config.max_asset_exposure {
            return FilterResult::Reject(RejectReason::AssetExposure {
                exposure,
                limit: self.config.max_asset_exposure,
            });
        }

        for leg in ctx.legs {
            match self
                .analyzer
                .check_liquidity(
                    &leg.token_id,
                    OrderSide::Buy,
                    leg.size,
                    self.config.liquidity_multiple,
                    self.config.max_slippage,
                )
                .await
            {
                LiquidityCheck::Sufficient => {}
                LiquidityCheck::NoData => {
                    tracing::warn!(
                        token_id = %leg.token_id,
                        strategy = ctx.strategy.as_str(),
                        "No order book, proceeding without liquidity check"
                    );
                }
                LiquidityCheck::Insufficient(detail) => {
                    return FilterResult::Reject(RejectReason::InsufficientLiquidity {
                        token_id: leg.token_id.clone(),
                        detail,
                    });
                }
            }
        }

        if !self.advisors.is_empty() {
            let advice = self
                .advisors
                .should_trade(&AdviceRequest {
                    strategy: ctx.strategy,
                    asset: ctx.market.asset.clone(),
                    expected_edge: ctx.expected_edge,
                })
                .await;
            if !advice.approve {
                return FilterResult::Reject(RejectReason::AdvisorVeto(advice.reason));
            }
        }

        let approval = risk
            .lock()
            .await
            .check_can_trade(value, &ctx.market.market_id, ctx.now);
        match approval.reason {
            Some(reason) if !approval.allowed => FilterResult::Reject(RejectReason::Risk(reason)),
            _ => FilterResult::Pass,
        }
    }
}
