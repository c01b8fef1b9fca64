//! Entry side of a market task
//!
//! Strategies run in priority order. A signal that fails the gate or the
//! order only ends that strategy's attempt; the first fill ends the search.

use super::Engine;
use crate::exchange::OrderSide;
use crate::execution::{ceil_shares, OrderIntent, OrderResult};
use crate::market::{MarketSnapshot, Outcome};
use crate::position::{Position, DEFAULT_CONFIDENCE};
use crate::strategy::{
    dynamic_fee, evaluate_sum_to_one, resolve_oracle, size_legs, ArbQuote, DirectionalEntry,
    FilterResult, GateContext, Leg, RejectReason, StrategyKind,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

impl Engine {
    pub(super) async fn try_entries(&self, market: &MarketSnapshot, now: DateTime<Utc>) {
        // Observed every cycle so the drop window stays continuous
        let flash = if self.config.strategy.flash_enabled {
            self.flash.observe(market, now).await
        } else {
            None
        };

        if let Err(e) = self.book.lock().await.check_capacity(&market.asset, 1) {
            tracing::debug!(market = %market.market_id, reason = %e, "No capacity for entries");
            return;
        }

        for strategy in StrategyKind::PRIORITY {
            let filled = match strategy {
                StrategyKind::FlashReversal => match &flash {
                    Some(signal) => {
                        let entry = DirectionalEntry {
                            strategy,
                            side: signal.side,
                            confidence: signal.confidence,
                        };
                        self.enter_directional(market, &entry, now).await
                    }
                    None => false,
                },
                StrategyKind::Latency => match self.latency_entry(market, now).await {
                    Some(entry) => self.enter_directional(market, &entry, now).await,
                    None => false,
                },
                StrategyKind::Oracle => match self.oracle_entry(market, now).await {
                    Some(entry) => self.enter_directional(market, &entry, now).await,
                    None => false,
                },
                StrategyKind::SumToOne => {
                    self.config.strategy.sum_to_one_enabled
                        && self.enter_sum_to_one(market, now).await
                }
            };
            if filled {
                return;
            }
        }
    }

    async fn latency_entry(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> Option<DirectionalEntry> {
        if !self.config.strategy.latency_enabled {
            return None;
        }
        let signal = self.latency.as_ref()?.evaluate(&market.asset, now).await?;
        if signal.confidence < self.config.strategy.latency_min_confidence {
            tracing::debug!(
                asset = %market.asset,
                confidence = %signal.confidence,
                "Latency signal below confidence"
            );
            return None;
        }
        Some(DirectionalEntry {
            strategy: StrategyKind::Latency,
            side: signal.direction,
            confidence: signal.confidence,
        })
    }

    async fn oracle_entry(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> Option<DirectionalEntry> {
        if !self.config.strategy.oracle_enabled {
            return None;
        }
        let oracle = self.oracle.as_ref()?;
        let decision = match oracle.decide(market).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(market = %market.market_id, error = %e, "Oracle unavailable");
                return None;
            }
        };

        let momentum = match &self.reference {
            Some(tracker) => {
                let window = Duration::seconds(self.config.strategy.oracle_momentum_window_secs);
                tracker.change_over(&market.asset, window, now).await
            }
            None => None,
        };

        match resolve_oracle(
            &decision,
            market,
            momentum,
            self.config.strategy.oracle_min_confidence,
            self.config.strategy.oracle_min_momentum,
        ) {
            Ok(side) => Some(DirectionalEntry {
                strategy: StrategyKind::Oracle,
                side,
                confidence: decision.confidence,
            }),
            Err(veto) => {
                tracing::info!(
                    market = %market.market_id,
                    action = ?decision.action,
                    consensus = %decision.consensus,
                    reason = %veto,
                    "Oracle decision vetoed"
                );
                None
            }
        }
    }

    /// Best ask from the book, or the snapshot price when there is no book
    async fn entry_price(&self, market: &MarketSnapshot, side: Outcome) -> Option<(Decimal, Option<Decimal>)> {
        let token = market.token_for(side);
        match self.analyzer.get_order_book(token, false).await {
            Some(depth) => {
                let ask = depth.best_ask()?;
                Some((ask, Some(depth.ask_depth)))
            }
            None => {
                let price = market.price_for(side);
                tracing::debug!(token_id = %token, price = %price, "No book, pricing from snapshot");
                (price > Decimal::ZERO).then_some((price, None))
            }
        }
    }

    async fn enter_directional(
        &self,
        market: &MarketSnapshot,
        entry: &DirectionalEntry,
        now: DateTime<Utc>,
    ) -> bool {
        let token = market.token_for(entry.side).to_string();
        let Some((price, _)) = self.entry_price(market, entry.side).await else {
            self.entry_blocked(market, entry.strategy, RejectReason::PriceUnavailable(token))
                .await;
            return false;
        };

        let size = ceil_shares(self.config.engine.trade_size / price);
        let legs = [Leg {
            token_id: token,
            price,
            size,
        }];
        let expected_edge = entry.confidence / Decimal::ONE_HUNDRED - price - dynamic_fee(price);

        if !self
            .pass_gate(market, entry.strategy, &legs, expected_edge, now)
            .await
        {
            return false;
        }
        if !self.reserve(market, entry.strategy, 1).await {
            return false;
        }

        let result = self.buy_leg(market, &legs[0], now).await;
        match result.fill() {
            Some((fill_price, fill_size)) => {
                self.open_position(market, entry.strategy, entry.side, entry.confidence, fill_price, fill_size, now)
                    .await;
                true
            }
            None => {
                self.book.lock().await.release(&market.asset, 1);
                self.order_failed(market, entry.strategy, &result).await;
                false
            }
        }
    }

    async fn enter_sum_to_one(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> bool {
        let strategy = StrategyKind::SumToOne;
        let config = &self.config.strategy;

        let (Some((ask_up, depth_up)), Some((ask_down, depth_down))) = (
            self.entry_price(market, Outcome::Up).await,
            self.entry_price(market, Outcome::Down).await,
        ) else {
            return false;
        };

        let Some(quote) = evaluate_sum_to_one(
            ask_up,
            ask_down,
            config.sum_to_one_threshold,
            config.sum_to_one_fee,
            config.sum_to_one_min_profit,
        ) else {
            return false;
        };
        tracing::info!(
            market = %market.market_id,
            ask_up = %quote.ask_up,
            ask_down = %quote.ask_down,
            total_cost = %quote.total_cost,
            profit = %quote.profit,
            "Sum-to-one opportunity"
        );

        let Some(shares) = size_legs(
            &quote,
            self.config.engine.trade_size,
            self.config.execution.min_shares,
            self.config.execution.min_order_value,
            depth_up,
            depth_down,
        ) else {
            self.entry_blocked(
                market,
                strategy,
                RejectReason::InsufficientLiquidity {
                    token_id: market.market_id.clone(),
                    detail: "legs cannot meet venue minimums within book depth".to_string(),
                },
            )
            .await;
            return false;
        };

        let legs = [
            Leg {
                token_id: market.up_token_id.clone(),
                price: quote.ask_up,
                size: shares,
            },
            Leg {
                token_id: market.down_token_id.clone(),
                price: quote.ask_down,
                size: shares,
            },
        ];
        if !self.pass_gate(market, strategy, &legs, quote.profit, now).await {
            return false;
        }
        if !self.reserve(market, strategy, 2).await {
            return false;
        }

        self.buy_pair(market, &quote, &legs, now).await
    }

    /// Buy both legs; a failed second leg leaves the first open and tracked
    async fn buy_pair(&self, market: &MarketSnapshot, quote: &ArbQuote, legs: &[Leg; 2], now: DateTime<Utc>) -> bool {
        let strategy = StrategyKind::SumToOne;
        let mut filled = 0;

        for (leg, side) in legs.iter().zip([Outcome::Up, Outcome::Down]) {
            let result = self.buy_leg(market, leg, now).await;
            match result.fill() {
                Some((price, size)) => {
                    self.open_position(market, strategy, side, DEFAULT_CONFIDENCE, price, size, now)
                        .await;
                    filled += 1;
                }
                None => {
                    self.book.lock().await.release(&market.asset, legs.len() - filled);
                    self.order_failed(market, strategy, &result).await;
                    if filled > 0 {
                        tracing::warn!(
                            market = %market.market_id,
                            profit = %quote.profit,
                            "Second sum-to-one leg failed, holding one leg"
                        );
                    }
                    return filled > 0;
                }
            }
        }
        true
    }

    async fn buy_leg(&self, market: &MarketSnapshot, leg: &Leg, now: DateTime<Utc>) -> OrderResult {
        let intent = OrderIntent {
            token_id: leg.token_id.clone(),
            side: OrderSide::Buy,
            price: leg.price,
            size: leg.size,
            tick_size: market.tick_size,
            neg_risk: market.neg_risk,
        };
        self.executor
            .buy(&intent, &market.market_id, &self.risk, now)
            .await
    }

    async fn pass_gate(
        &self,
        market: &MarketSnapshot,
        strategy: StrategyKind,
        legs: &[Leg],
        expected_edge: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        let asset_exposure = self.book.lock().await.asset_exposure(&market.asset);
        let ctx = GateContext {
            market,
            strategy,
            legs,
            expected_edge,
            asset_exposure,
            now,
        };
        match self.gate.pre_check(&ctx, &self.risk).await {
            FilterResult::Pass => true,
            FilterResult::Reject(_) => {
                self.stats.lock().await.blocked_entries += 1;
                false
            }
        }
    }

    async fn reserve(&self, market: &MarketSnapshot, strategy: StrategyKind, slots: usize) -> bool {
        let reserved = self.book.lock().await.try_reserve(&market.asset, slots);
        match reserved {
            Ok(()) => true,
            Err(e) => {
                self.entry_blocked(market, strategy, RejectReason::Capacity(e)).await;
                false
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_position(
        &self,
        market: &MarketSnapshot,
        strategy: StrategyKind,
        side: Outcome,
        confidence: Decimal,
        price: Decimal,
        size: Decimal,
        now: DateTime<Utc>,
    ) {
        let position = Position {
            token_id: market.token_for(side).to_string(),
            side,
            entry_price: price,
            size,
            entry_time: now,
            market_id: market.market_id.clone(),
            asset: market.asset.clone(),
            strategy,
            peak_price: price,
            neg_risk: market.neg_risk,
            confidence,
        };
        let token = position.token_id.clone();
        let value = position.cost_basis();

        self.book.lock().await.fill(position);
        self.risk
            .lock()
            .await
            .record_open(&token, &market.market_id, value);
        self.prices.subscribe(std::slice::from_ref(&token)).await;
        self.mark_dirty();
        self.record_entry(strategy).await;

        tracing::info!(
            market = %market.market_id,
            asset = %market.asset,
            token_id = %token,
            strategy = strategy.as_str(),
            side = %side,
            price = %price,
            size = %size,
            "Position opened"
        );
    }

    async fn entry_blocked(&self, market: &MarketSnapshot, strategy: StrategyKind, reason: RejectReason) {
        self.stats.lock().await.blocked_entries += 1;
        tracing::info!(
            market = %market.market_id,
            asset = %market.asset,
            strategy = strategy.as_str(),
            check = reason.kind(),
            reason = %reason,
            "Entry blocked"
        );
    }

    async fn order_failed(&self, market: &MarketSnapshot, strategy: StrategyKind, result: &OrderResult) {
        self.stats.lock().await.failed_orders += 1;
        tracing::warn!(
            market = %market.market_id,
            strategy = strategy.as_str(),
            result = %result,
            "Entry order not filled"
        );
    }
}
