//! Two-phase order execution: create (build + sign), then post
//!
//! Each phase is timed, logged and failed on its own. Every path returns an
//! [`OrderResult`]; nothing here propagates an error to the caller.

use super::sizing::{adjust_buy_size, floor_shares, round_to_tick};
use super::{OrderIntent, OrderPhase, OrderResult};
use crate::config::ExecutionConfig;
use crate::exchange::{
    BalanceAsset, ExchangeApi, ExchangeError, OrderOptions, OrderSide, OrderSpec, PostResponse,
    RejectionKind,
};
use crate::risk::PortfolioRiskManager;
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Submits orders to the venue with the BUY and SELL validations
pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeApi>,
    config: ExecutionConfig,
}

/// Outcome of a single create + post round
enum Attempt {
    Filled(OrderResult),
    /// Venue refused; the kind says whether a smaller size may work
    Refused(RejectionKind, String),
    Failed(OrderResult),
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn ExchangeApi>, config: ExecutionConfig) -> Self {
        Self { exchange, config }
    }

    /// Open a position
    ///
    /// The risk manager is re-asked with the order value after venue
    /// minimums have been applied.
    pub async fn buy(
        &self,
        intent: &OrderIntent,
        market_id: &str,
        risk: &Mutex<PortfolioRiskManager>,
        now: DateTime<Utc>,
    ) -> OrderResult {
        let result = self.buy_inner(intent, market_id, risk, now).await;
        self.log_result("BUY", intent, &result);
        result
    }

    async fn buy_inner(
        &self,
        intent: &OrderIntent,
        market_id: &str,
        risk: &Mutex<PortfolioRiskManager>,
        now: DateTime<Utc>,
    ) -> OrderResult {
        if intent.price <= Decimal::ZERO {
            return OrderResult::rejected(OrderPhase::Validate, None, "price must be positive");
        }
        let price = round_to_tick(intent.price, intent.tick_size, OrderSide::Buy);

        let Some(size) = adjust_buy_size(
            price,
            intent.size,
            self.config.min_shares,
            self.config.min_order_value,
            self.config.max_upsize_factor,
        ) else {
            return OrderResult::rejected(
                OrderPhase::Validate,
                Some(RejectionKind::MinSize),
                format!("cannot reach venue minimum at {} within upsize cap", price),
            );
        };
        let value = price * size;

        let approval = risk.lock().await.check_can_trade(value, market_id, now);
        if !approval.allowed {
            let reason = approval
                .reason
                .map_or_else(|| "risk check failed".to_string(), |r| r.to_string());
            return OrderResult::rejected(OrderPhase::Validate, None, reason);
        }

        let required = value * (Decimal::ONE + self.config.balance_buffer_pct);
        match self.exchange.get_balance(&BalanceAsset::Collateral).await {
            Ok(balance) if balance < required => {
                return OrderResult::rejected(
                    OrderPhase::Validate,
                    Some(RejectionKind::Balance),
                    format!("balance {} below required {}", balance, required),
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(token_id = %intent.token_id, error = %e, "Balance check unavailable, proceeding");
            }
        }

        match self.exchange.get_neg_risk(&intent.token_id).await {
            Ok(Some(venue_flag)) if venue_flag != intent.neg_risk => {
                tracing::error!(
                    token_id = %intent.token_id,
                    market = market_id,
                    venue = venue_flag,
                    snapshot = intent.neg_risk,
                    "Risk-class flag mismatch, aborting order"
                );
                return OrderResult::rejected(
                    OrderPhase::Validate,
                    Some(RejectionKind::RiskFlag),
                    "risk-class flag mismatch",
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(token_id = %intent.token_id, error = %e, "Risk-class lookup failed, using market flag");
            }
        }

        let options = OrderOptions {
            tick_size: intent.tick_size,
            neg_risk: intent.neg_risk,
        };
        let spec = OrderSpec {
            token_id: intent.token_id.clone(),
            side: intent.side,
            price,
            size,
        };
        match self.submit(&spec, &options).await {
            Attempt::Filled(result) | Attempt::Failed(result) => result,
            Attempt::Refused(kind, message) => {
                OrderResult::rejected(OrderPhase::Post, Some(kind), message)
            }
        }
    }

    /// Close (part of) a position
    ///
    /// `tracked_size` is what the position table believes is held. The
    /// venue balance wins when it can be read; balance rejections are
    /// retried with shrinking fractions of the size.
    pub async fn sell(&self, intent: &OrderIntent, tracked_size: Decimal) -> OrderResult {
        let result = self.sell_inner(intent, tracked_size).await;
        self.log_result("SELL", intent, &result);
        result
    }

    async fn sell_inner(&self, intent: &OrderIntent, tracked_size: Decimal) -> OrderResult {
        if intent.price <= Decimal::ZERO {
            return OrderResult::rejected(OrderPhase::Validate, None, "price must be positive");
        }
        if intent.size > tracked_size * (Decimal::ONE + self.config.sell_tolerance) {
            return OrderResult::rejected(
                OrderPhase::Validate,
                Some(RejectionKind::Balance),
                format!("requested {} exceeds tracked {}", intent.size, tracked_size),
            );
        }

        let asset = BalanceAsset::Conditional(intent.token_id.clone());
        let size = match self.exchange.get_balance(&asset).await {
            Ok(held) => floor_shares(intent.size.min(held)),
            Err(e) => {
                tracing::warn!(
                    token_id = %intent.token_id,
                    error = %e,
                    "Share balance unavailable, shrinking sell size"
                );
                floor_shares(intent.size * self.config.unknown_balance_factor)
            }
        };
        if size <= Decimal::ZERO {
            return OrderResult::rejected(
                OrderPhase::Validate,
                Some(RejectionKind::Balance),
                "no shares held",
            );
        }

        let price = round_to_tick(intent.price, intent.tick_size, OrderSide::Sell);
        let options = OrderOptions {
            tick_size: intent.tick_size,
            neg_risk: intent.neg_risk,
        };

        let mut last_refusal = None;
        for fraction in &self.config.sell_fractions {
            let attempt_size = floor_shares(size * fraction);
            if attempt_size <= Decimal::ZERO {
                break;
            }
            let spec = OrderSpec {
                token_id: intent.token_id.clone(),
                side: intent.side,
                price,
                size: attempt_size,
            };

            match self.submit(&spec, &options).await {
                Attempt::Filled(result) | Attempt::Failed(result) => return result,
                Attempt::Refused(kind, message) if kind.is_balance_drift() => {
                    tracing::warn!(
                        token_id = %intent.token_id,
                        size = %attempt_size,
                        fraction = %fraction,
                        error = %message,
                        "Sell refused for balance, retrying smaller"
                    );
                    last_refusal = Some((kind, message));
                }
                Attempt::Refused(kind, message) => {
                    return OrderResult::rejected(OrderPhase::Post, Some(kind), message);
                }
            }
        }

        let (kind, message) =
            last_refusal.unwrap_or((RejectionKind::Other, "no sell size left".to_string()));
        OrderResult::rejected(
            OrderPhase::Post,
            Some(kind),
            format!("sell retries exhausted: {}", message),
        )
    }

    /// Create then post one order
    async fn submit(&self, spec: &OrderSpec, options: &OrderOptions) -> Attempt {
        let started = Instant::now();
        let created = self.exchange.create_order(spec, options).await;
        telemetry::record_latency(LatencyMetric::OrderCreate, started.elapsed());

        let signed = match created {
            Ok(signed) => signed,
            Err(e) => {
                telemetry::increment(CounterMetric::OrderFailures, Some(OrderPhase::Create.as_str()));
                return Attempt::Failed(OrderResult::failed(OrderPhase::Create, e.to_string()));
            }
        };

        let started = Instant::now();
        let posted = self.exchange.post_order(&signed).await;
        telemetry::record_latency(LatencyMetric::OrderPost, started.elapsed());

        match posted {
            Ok(response) if response.success => match confirmed_fill(&response, spec) {
                Some(result) => Attempt::Filled(result),
                None => {
                    telemetry::increment(CounterMetric::OrderFailures, Some(OrderPhase::Post.as_str()));
                    tracing::warn!(
                        token_id = %spec.token_id,
                        order_id = response.order_id.as_deref().unwrap_or("-"),
                        status = %response.status,
                        "Order accepted without a confirmed fill"
                    );
                    let mut result = OrderResult::failed(
                        OrderPhase::Post,
                        format!("no confirmed fill (status {})", response.status),
                    );
                    result.order_id = response.order_id;
                    Attempt::Failed(result)
                }
            },
            Ok(response) => {
                telemetry::increment(CounterMetric::OrderFailures, Some(OrderPhase::Post.as_str()));
                let message = response
                    .error_msg
                    .unwrap_or_else(|| format!("status {}", response.status));
                Attempt::Refused(RejectionKind::classify(&message), message)
            }
            Err(ExchangeError::Rejected { kind, message }) => {
                telemetry::increment(CounterMetric::OrderFailures, Some(OrderPhase::Post.as_str()));
                Attempt::Refused(kind, message)
            }
            Err(e) => {
                telemetry::increment(CounterMetric::OrderFailures, Some(OrderPhase::Post.as_str()));
                Attempt::Failed(OrderResult::failed(OrderPhase::Post, e.to_string()))
            }
        }
    }

    fn log_result(&self, side: &'static str, intent: &OrderIntent, result: &OrderResult) {
        if result.is_filled() {
            tracing::info!(
                side,
                token_id = %intent.token_id,
                requested_price = %intent.price,
                requested_size = %intent.size,
                order_id = result.order_id.as_deref().unwrap_or("-"),
                result = %result,
                "Order filled"
            );
        } else {
            tracing::warn!(
                side,
                token_id = %intent.token_id,
                requested_price = %intent.price,
                requested_size = %intent.size,
                phase = result.phase.as_str(),
                result = %result,
                "Order not filled"
            );
        }
    }
}

/// Fill confirmed by the venue response
///
/// A reported fill size wins. Without one only a `matched` status counts,
/// at the order's own size; resting or delayed orders are not fills.
fn confirmed_fill(response: &PostResponse, spec: &OrderSpec) -> Option<OrderResult> {
    let size = match response.filled_size {
        Some(size) if size > Decimal::ZERO => size,
        Some(_) => return None,
        None if response.status.eq_ignore_ascii_case("matched") => spec.size,
        None => return None,
    };
    let price = response
        .avg_price
        .filter(|p| *p > Decimal::ZERO)
        .unwrap_or(spec.price);
    Some(OrderResult::filled(response.order_id.clone(), price, size))
}
