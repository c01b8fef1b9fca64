//! Portfolio risk manager
//!
//! Tracks capital, exposure and the day's results, and gates every order.
//! Exposure here is a view reconciled from the engine's position table.

use super::{DailySummary, Halt, HaltReason, RiskLimits, RiskRejection, RiskSnapshot, TradeApproval};
use crate::config::RiskConfig;
use crate::position::Position;
use crate::telemetry::{self, GaugeMetric};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct TrackedExposure {
    market_id: String,
    value: Decimal,
}

/// Capital, exposure, daily counters and circuit breakers
#[derive(Debug)]
pub struct PortfolioRiskManager {
    limits: RiskLimits,
    /// Equity: free cash plus capital deployed at cost
    capital: Decimal,
    day: NaiveDate,
    day_start_capital: Decimal,
    daily_pnl: Decimal,
    trades_today: u32,
    wins_today: u32,
    losses_today: u32,
    consecutive_losses: u32,
    consecutive_wins: u32,
    halt: Option<Halt>,
    exposure: HashMap<String, TrackedExposure>,
}

impl PortfolioRiskManager {
    pub fn new(config: &RiskConfig, now: DateTime<Utc>) -> Self {
        Self::with_limits(RiskLimits::from(config), config.initial_capital, now)
    }

    pub fn with_limits(limits: RiskLimits, capital: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            capital,
            day: now.date_naive(),
            day_start_capital: capital,
            daily_pnl: Decimal::ZERO,
            trades_today: 0,
            wins_today: 0,
            losses_today: 0,
            consecutive_losses: 0,
            consecutive_wins: 0,
            halt: None,
            exposure: HashMap::new(),
        }
    }

    pub fn capital(&self) -> Decimal {
        self.capital
    }

    pub fn total_exposure(&self) -> Decimal {
        self.exposure.values().map(|e| e.value).sum()
    }

    fn market_exposure(&self, market_id: &str) -> Decimal {
        self.exposure
            .values()
            .filter(|e| e.market_id == market_id)
            .map(|e| e.value)
            .sum()
    }

    /// Deployed share of capital
    pub fn heat(&self) -> Decimal {
        if self.capital <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.total_exposure() / self.capital
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today
    }

    /// Pre-trade check for an order worth `proposed` USDC on `market_id`
    pub fn check_can_trade(
        &mut self,
        proposed: Decimal,
        market_id: &str,
        now: DateTime<Utc>,
    ) -> TradeApproval {
        self.roll_day(now);
        let max_size = self.limits.max_position_size(self.capital);

        if let Err(reason) = self.check_halt(now) {
            return TradeApproval::reject(reason, max_size);
        }

        if self.capital < self.limits.min_capital {
            return TradeApproval::reject(RiskRejection::InsufficientCapital(self.capital), max_size);
        }

        let drawdown = self.daily_drawdown();
        if drawdown >= self.limits.max_daily_drawdown {
            self.start_halt(
                HaltReason::DailyDrawdown(drawdown),
                Duration::seconds(self.limits.drawdown_halt_secs),
                true,
                now,
            );
            return TradeApproval::reject(RiskRejection::DailyDrawdown(drawdown), max_size);
        }

        if self.consecutive_losses >= self.limits.consecutive_loss_limit {
            let streak = self.consecutive_losses;
            self.start_halt(
                HaltReason::ConsecutiveLosses(streak),
                Duration::seconds(self.limits.loss_streak_halt_secs),
                false,
                now,
            );
            return TradeApproval::reject(RiskRejection::LossStreak(streak), max_size);
        }

        let usable = self.capital * self.limits.max_capital_fraction;
        if proposed > usable {
            return TradeApproval::reject(
                RiskRejection::ExceedsCapital {
                    size: proposed,
                    usable,
                },
                max_size,
            );
        }

        if proposed > max_size && !self.limits.is_minimum_order(proposed) {
            return TradeApproval::reject(
                RiskRejection::PositionTooLarge {
                    size: proposed,
                    max: max_size,
                },
                max_size,
            );
        }

        let ceiling = self.limits.heat_ceiling(self.capital);
        let heat = (self.total_exposure() + proposed) / self.capital;
        if heat > ceiling {
            return TradeApproval::reject(RiskRejection::HeatExceeded { heat, ceiling }, max_size);
        }

        if self.capital >= self.limits.market_exposure_floor {
            let exposure = (self.market_exposure(market_id) + proposed) / self.capital;
            if exposure > self.limits.max_market_exposure {
                return TradeApproval::reject(
                    RiskRejection::MarketExposure {
                        market: market_id.to_string(),
                        exposure,
                        limit: self.limits.max_market_exposure,
                    },
                    max_size,
                );
            }
        }

        TradeApproval::approve(max_size)
    }

    /// Active halt, clearing it first if it has expired
    fn check_halt(&mut self, now: DateTime<Utc>) -> Result<(), RiskRejection> {
        let Some(halt) = &self.halt else {
            return Ok(());
        };
        if halt.expires_at > now {
            return Err(RiskRejection::Halted {
                reason: halt.reason.clone(),
                until: halt.expires_at,
            });
        }

        tracing::info!(reason = ?halt.reason, "Trading halt expired");
        if matches!(halt.reason, HaltReason::ConsecutiveLosses(_)) {
            self.consecutive_losses = 0;
        }
        self.halt = None;
        Ok(())
    }

    fn start_halt(&mut self, reason: HaltReason, duration: Duration, daily: bool, now: DateTime<Utc>) {
        let expires_at = now + duration;
        tracing::warn!(reason = ?reason, until = %expires_at, "Trading halted");
        self.halt = Some(Halt {
            reason,
            expires_at,
            daily,
        });
    }

    fn daily_drawdown(&self) -> Decimal {
        if self.day_start_capital <= Decimal::ZERO || self.daily_pnl >= Decimal::ZERO {
            return Decimal::ZERO;
        }
        -self.daily_pnl / self.day_start_capital
    }

    /// Track a newly opened position's cost
    pub fn record_open(&mut self, token_id: &str, market_id: &str, value: Decimal) {
        let entry = self
            .exposure
            .entry(token_id.to_string())
            .or_insert_with(|| TrackedExposure {
                market_id: market_id.to_string(),
                value: Decimal::ZERO,
            });
        entry.value += value;
        self.trades_today += 1;
        self.publish();
    }

    /// Book a closed position's realized P&L
    pub fn record_trade_result(
        &mut self,
        token_id: &str,
        market_id: &str,
        profit: Decimal,
        now: DateTime<Utc>,
    ) {
        self.roll_day(now);
        self.exposure.remove(token_id);
        self.capital += profit;
        self.daily_pnl += profit;

        if profit > Decimal::ZERO {
            self.wins_today += 1;
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
            if matches!(
                self.halt.as_ref().map(|h| &h.reason),
                Some(HaltReason::ConsecutiveLosses(_))
            ) {
                tracing::info!("Loss-streak halt cleared by a win");
                self.halt = None;
            }
        } else {
            self.losses_today += 1;
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }

        tracing::info!(
            token_id,
            market = market_id,
            profit = %profit,
            capital = %self.capital,
            streak = self.consecutive_losses,
            "Trade result recorded"
        );
        self.publish();
    }

    /// Rebuild the exposure view from the position table
    pub fn reconcile(&mut self, positions: &[Position]) {
        self.exposure = positions
            .iter()
            .map(|p| {
                (
                    p.token_id.clone(),
                    TrackedExposure {
                        market_id: p.market_id.clone(),
                        value: p.cost_basis(),
                    },
                )
            })
            .collect();
        self.publish();
    }

    /// Replace capital with the venue's equity figure
    pub fn sync_capital(&mut self, equity: Decimal) {
        if equity != self.capital {
            tracing::debug!(old = %self.capital, new = %equity, "Capital synced");
            self.capital = equity;
            self.publish();
        }
    }

    /// Reset counters at UTC midnight, returning the finished day's summary
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> Option<DailySummary> {
        let today = now.date_naive();
        if today <= self.day {
            return None;
        }

        let decided = self.wins_today + self.losses_today;
        let summary = DailySummary {
            date: self.day,
            trades: self.trades_today,
            wins: self.wins_today,
            losses: self.losses_today,
            win_rate: if decided == 0 {
                Decimal::ZERO
            } else {
                Decimal::from(self.wins_today) / Decimal::from(decided)
            },
            pnl: self.daily_pnl,
            roi: if self.day_start_capital.is_zero() {
                Decimal::ZERO
            } else {
                self.daily_pnl / self.day_start_capital
            },
            start_capital: self.day_start_capital,
            end_capital: self.capital,
        };
        tracing::info!(
            date = %summary.date,
            trades = summary.trades,
            wins = summary.wins,
            losses = summary.losses,
            win_rate = %summary.win_rate.round_dp(3),
            pnl = %summary.pnl,
            roi = %summary.roi.round_dp(4),
            start_capital = %summary.start_capital,
            end_capital = %summary.end_capital,
            "Daily summary"
        );

        self.day = today;
        self.day_start_capital = self.capital;
        self.daily_pnl = Decimal::ZERO;
        self.trades_today = 0;
        self.wins_today = 0;
        self.losses_today = 0;
        if self.halt.as_ref().is_some_and(|h| h.daily) {
            tracing::info!("Daily halt cleared at day rollover");
            self.halt = None;
        }
        self.publish();

        Some(summary)
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            capital: self.capital,
            total_exposure: self.total_exposure(),
            heat: self.heat(),
            daily_pnl: self.daily_pnl,
            trades_today: self.trades_today,
            wins_today: self.wins_today,
            losses_today: self.losses_today,
            consecutive_losses: self.consecutive_losses,
            halt: self.halt.clone(),
        }
    }

    fn publish(&self) {
        let f = |d: Decimal| d.to_f64().unwrap_or_default();
        telemetry::set_gauge(GaugeMetric::Capital, f(self.capital));
        telemetry::set_gauge(GaugeMetric::TotalExposure, f(self.total_exposure()));
        telemetry::set_gauge(GaugeMetric::Heat, f(self.heat()));
        telemetry::set_gauge(GaugeMetric::DailyPnl, f(self.daily_pnl));
    }
}
