//! Exit side of a market task
//!
//! A single pass per position per cycle: claim it, resolve a price, raise
//! the peak, pick one reason, act on it.

use super::{synthetic_loss, Engine};
use crate::advisory::TradeOutcome;
use crate::exchange::OrderSide;
use crate::execution::OrderIntent;
use crate::exit::{ExitContext, ExitReason};
use crate::market::MarketSnapshot;
use crate::position::Position;
use crate::strategy::StrategyKind;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tick used when the position's market snapshot is gone
const FALLBACK_TICK: Decimal = dec!(0.01);

/// Where an exit price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriceOrigin {
    Feed,
    Book,
    Snapshot,
}

impl PriceOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            PriceOrigin::Feed => "feed",
            PriceOrigin::Book => "book",
            PriceOrigin::Snapshot => "snapshot",
        }
    }
}

impl Engine {
    /// Run the exit state machine for one position
    ///
    /// `market` is the position's own market when it is still listed.
    pub(super) async fn evaluate_exit(
        &self,
        position: Position,
        market: Option<&MarketSnapshot>,
        now: DateTime<Utc>,
    ) {
        let token = position.token_id;
        let current = {
            let mut book = self.book.lock().await;
            if !book.begin_exit(&token) {
                tracing::debug!(token_id = %token, "Exit already in progress");
                return;
            }
            book.get(&token).cloned()
        };
        if let Some(position) = current {
            self.run_exit(position, market, now).await;
        }

        self.book.lock().await.end_exit(&token);
    }

    async fn run_exit(&self, mut position: Position, market: Option<&MarketSnapshot>, now: DateTime<Utc>) {
        let resolved = self.resolve_exit_price(&position, market).await;
        let price = resolved.map(|(p, _)| p);

        if let Some(price) = price {
            if position.update_peak(price) {
                self.book.lock().await.set_peak(&position.token_id, price);
                self.mark_dirty();
            }
        }
        let unpriced_since = self
            .timers
            .lock()
            .await
            .observe_price(&position.token_id, price.is_some(), now);

        let volatility = match &self.reference {
            Some(tracker) => {
                let window = Duration::seconds(self.exit_rules.config().volatility_window_secs);
                tracker.volatility(&position.asset, window, now).await
            }
            None => None,
        };
        // Arbitrage legs carry no directional confidence
        let confidence = (position.strategy != StrategyKind::SumToOne).then_some(position.confidence);

        let ctx = ExitContext {
            position: &position,
            price,
            time_to_expiry: market.map(|m| m.time_to_expiry(now)),
            confidence,
            volatility,
            unpriced_since,
            now,
        };
        let reason = self.exit_rules.evaluate(&ctx);
        if reason != Some(ExitReason::StopLoss) {
            self.timers.lock().await.stop_loss_recovered(&position.token_id);
        }
        let Some(reason) = reason else {
            return;
        };

        tracing::info!(
            token_id = %position.token_id,
            market = %position.market_id,
            reason = %reason,
            priority = reason.priority(),
            price = ?price,
            source = resolved.map(|(_, s)| s.as_str()),
            entry = %position.entry_price,
            peak = %position.peak_price,
            age_secs = position.age(now).num_seconds(),
            "Exit triggered"
        );

        match (reason, price) {
            (ExitReason::OrphanCleanup, _) | (_, None) => {
                let outcome = synthetic_loss(&position, reason.as_str(), now);
                self.force_remove(&position, reason, outcome, now).await;
            }
            (reason, Some(price)) => {
                let tick = market.map_or(FALLBACK_TICK, |m| m.tick_size);
                self.close_position(&position, reason, price, tick, now).await;
            }
        }
    }

    /// Feed best bid, then a forced book refresh, then the snapshot price
    async fn resolve_exit_price(
        &self,
        position: &Position,
        market: Option<&MarketSnapshot>,
    ) -> Option<(Decimal, PriceOrigin)> {
        if let Some(quote) = self.prices.get_price(&position.token_id).await {
            if quote.price > Decimal::ZERO {
                return Some((quote.price, PriceOrigin::Feed));
            }
        }

        if let Some(bid) = self
            .analyzer
            .get_order_book(&position.token_id, true)
            .await
            .and_then(|depth| depth.best_bid())
        {
            return Some((bid, PriceOrigin::Book));
        }

        market
            .filter(|m| m.market_id == position.market_id)
            .map(|m| m.price_for(position.side))
            .filter(|p| *p > Decimal::ZERO)
            .map(|p| (p, PriceOrigin::Snapshot))
    }

    async fn close_position(
        &self,
        position: &Position,
        reason: ExitReason,
        price: Decimal,
        tick_size: Decimal,
        now: DateTime<Utc>,
    ) {
        let intent = OrderIntent {
            token_id: position.token_id.clone(),
            side: OrderSide::Sell,
            price,
            size: position.size,
            tick_size,
            neg_risk: position.neg_risk,
        };
        let result = self.executor.sell(&intent, position.size).await;

        if let Some((fill_price, fill_size)) = result.fill() {
            let profit = fill_price * fill_size - position.cost_basis();
            let outcome = TradeOutcome {
                token_id: position.token_id.clone(),
                market_id: position.market_id.clone(),
                asset: position.asset.clone(),
                strategy: position.strategy,
                side: position.side,
                entry_price: position.entry_price,
                exit_price: fill_price,
                size: position.size,
                profit,
                exit_reason: reason.as_str().to_string(),
                opened_at: position.entry_time,
                closed_at: now,
                synthetic: false,
            };
            self.finish_close(position, reason, outcome, now).await;
            return;
        }

        self.stats.lock().await.failed_orders += 1;
        let grace = Duration::seconds(self.exit_rules.config().stuck_exit_grace_secs);
        let stuck = reason == ExitReason::StopLoss
            && self
                .timers
                .lock()
                .await
                .stop_loss_failed(&position.token_id, now, grace);

        if stuck {
            self.stats.lock().await.stuck_exits += 1;
            tracing::error!(
                token_id = %position.token_id,
                market = %position.market_id,
                result = %result,
                "Stuck stop-loss exit, force-removing position"
            );
            let mut outcome = synthetic_loss(position, "stuck_exit", now);
            outcome.exit_price = price;
            outcome.profit = position.unrealized_pnl(price);
            self.force_remove(position, reason, outcome, now).await;
        } else {
            tracing::warn!(
                token_id = %position.token_id,
                reason = %reason,
                result = %result,
                "Exit order not filled, retrying next cycle"
            );
        }
    }

    /// Drop a position without a fill, booking an estimated loss
    async fn force_remove(&self, position: &Position, reason: ExitReason, outcome: TradeOutcome, now: DateTime<Utc>) {
        tracing::warn!(
            token_id = %position.token_id,
            market = %position.market_id,
            reason = %reason,
            estimated_profit = %outcome.profit,
            "Position force-removed"
        );
        self.finish_close(position, reason, outcome, now).await;
    }

    async fn finish_close(&self, position: &Position, reason: ExitReason, outcome: TradeOutcome, now: DateTime<Utc>) {
        self.book.lock().await.remove(&position.token_id);
        self.timers.lock().await.clear(&position.token_id);
        self.risk.lock().await.record_trade_result(
            &position.token_id,
            &position.market_id,
            outcome.profit,
            now,
        );
        self.prices
            .unsubscribe(std::slice::from_ref(&position.token_id))
            .await;
        self.mark_dirty();
        self.record_exit(reason).await;

        tracing::info!(
            token_id = %position.token_id,
            market = %position.market_id,
            strategy = position.strategy.as_str(),
            reason = %reason,
            exit_price = %outcome.exit_price,
            profit = %outcome.profit,
            synthetic = outcome.synthetic,
            "Position closed"
        );
        self.advisors.record(outcome);
    }
}
