//! Entry strategies and the pre-trade gate
//!
//! Strategies are tried in [`StrategyKind::PRIORITY`] order for each market;
//! the first one that gets filled ends the search for that cycle.

mod fees;
mod flash;
mod gate;
mod latency;
mod oracle;
mod sum_to_one;

pub use fees::dynamic_fee;
pub use flash::{FlashDetector, FlashSignal};
pub use gate::{EntryGate, FilterResult, GateContext, Leg, RejectReason};
pub use latency::{DirectionalSignal, LatencySignal, MomentumLatencySignal};
pub use oracle::{resolve_oracle, DecisionOracle, OracleAction, OracleDecision, OracleVeto};
pub use sum_to_one::{evaluate_sum_to_one, size_legs, ArbQuote};

use crate::market::Outcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entry strategy that opened a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FlashReversal,
    Latency,
    Oracle,
    SumToOne,
}

impl StrategyKind {
    /// Order in which strategies are tried
    pub const PRIORITY: [StrategyKind; 4] = [
        StrategyKind::FlashReversal,
        StrategyKind::Latency,
        StrategyKind::Oracle,
        StrategyKind::SumToOne,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::FlashReversal => "flash_reversal",
            StrategyKind::Latency => "latency",
            StrategyKind::Oracle => "oracle",
            StrategyKind::SumToOne => "sum_to_one",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-sided entry proposed by a directional strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionalEntry {
    pub strategy: StrategyKind,
    pub side: Outcome,
    /// 0-100
    pub confidence: Decimal,
}
