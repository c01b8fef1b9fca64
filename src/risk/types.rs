//! Risk management types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason for a trading halt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Daily loss reached the drawdown ceiling
    DailyDrawdown(Decimal),
    /// Too many losing trades in a row
    ConsecutiveLosses(u32),
}

/// An active halt; expires on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Halt {
    pub reason: HaltReason,
    pub expires_at: DateTime<Utc>,
    /// Cleared by the daily reset as well as by expiry
    pub daily: bool,
}

/// Why a proposed trade was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskRejection {
    /// Trading has been halted
    #[error("trading halted until {until}: {reason:?}")]
    Halted {
        reason: HaltReason,
        until: DateTime<Utc>,
    },
    /// Capital below the absolute floor
    #[error("capital {0} below minimum")]
    InsufficientCapital(Decimal),
    /// Daily drawdown breached; a halt was started
    #[error("daily drawdown {0} breached")]
    DailyDrawdown(Decimal),
    /// Loss streak breached; a halt was started
    #[error("{0} consecutive losses")]
    LossStreak(u32),
    /// Proposed size above the usable share of capital
    #[error("size {size} exceeds usable capital {usable}")]
    ExceedsCapital { size: Decimal, usable: Decimal },
    /// Position size exceeds limit
    #[error("size {size} exceeds max position {max}")]
    PositionTooLarge { size: Decimal, max: Decimal },
    /// Post-trade heat above the ceiling
    #[error("heat {heat} would exceed ceiling {ceiling}")]
    HeatExceeded { heat: Decimal, ceiling: Decimal },
    /// Post-trade exposure to one market above the limit
    #[error("market {market} exposure {exposure} would exceed {limit}")]
    MarketExposure {
        market: String,
        exposure: Decimal,
        limit: Decimal,
    },
}

impl RiskRejection {
    /// Halts and the checks that start them
    pub fn is_circuit_breaker(&self) -> bool {
        matches!(
            self,
            RiskRejection::Halted { .. }
                | RiskRejection::DailyDrawdown(_)
                | RiskRejection::LossStreak(_)
        )
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RiskRejection::Halted { .. } => "halted",
            RiskRejection::InsufficientCapital(_) => "insufficient_capital",
            RiskRejection::DailyDrawdown(_) => "daily_drawdown",
            RiskRejection::LossStreak(_) => "loss_streak",
            RiskRejection::ExceedsCapital { .. } => "exceeds_capital",
            RiskRejection::PositionTooLarge { .. } => "position_too_large",
            RiskRejection::HeatExceeded { .. } => "heat",
            RiskRejection::MarketExposure { .. } => "market_exposure",
        }
    }
}

/// Answer to a pre-trade check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeApproval {
    pub allowed: bool,
    /// Largest order value the position-size limit permits right now
    pub max_allowed_size: Decimal,
    pub reason: Option<RiskRejection>,
}

impl TradeApproval {
    pub fn approve(max_allowed_size: Decimal) -> Self {
        Self {
            allowed: true,
            max_allowed_size,
            reason: None,
        }
    }

    pub fn reject(reason: RiskRejection, max_allowed_size: Decimal) -> Self {
        Self {
            allowed: false,
            max_allowed_size,
            reason: Some(reason),
        }
    }
}

/// Point-in-time view of risk state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSnapshot {
    pub capital: Decimal,
    pub total_exposure: Decimal,
    pub heat: Decimal,
    pub daily_pnl: Decimal,
    pub trades_today: u32,
    pub wins_today: u32,
    pub losses_today: u32,
    pub consecutive_losses: u32,
    pub halt: Option<Halt>,
}

/// End-of-day report, produced before the counters reset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: Decimal,
    pub pnl: Decimal,
    pub roi: Decimal,
    pub start_capital: Decimal,
    pub end_capital: Decimal,
}
