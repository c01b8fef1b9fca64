//! Risk management module
//!
//! Portfolio limits, circuit breakers and the daily ledger

mod limits;
mod manager;
mod types;

pub use limits::RiskLimits;
pub use manager::PortfolioRiskManager;
pub use types::{DailySummary, Halt, HaltReason, RiskRejection, RiskSnapshot, TradeApproval};
