//! Position exit state machine
//!
//! Every cycle each open position gets at most one exit reason, chosen by
//! fixed priority. Positions move OPEN -> CLOSING -> CLOSED, or straight to
//! a forced close when they are orphaned or their stop-loss is stuck.

mod rules;

pub use rules::{ExitContext, ExitRules, DEFAULT_TRAILING_ACTIVATION, DEFAULT_TRAILING_STOP};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;

/// Why a position is being closed, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExitReason {
    MarketClosing,
    TimeExit,
    TrailingStop,
    TakeProfit,
    StopLoss,
    OrphanCleanup,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::MarketClosing => "market_closing",
            ExitReason::TimeExit => "time_exit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::OrphanCleanup => "orphan_cleanup",
        }
    }

    /// 1 is evaluated first
    pub fn priority(&self) -> u8 {
        *self as u8 + 1
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-position clocks that span cycles
///
/// Tracks how long a position has gone without a price and how long its
/// stop-loss close has been failing.
#[derive(Debug, Default)]
pub struct ExitTimers {
    unpriced_since: HashMap<String, DateTime<Utc>>,
    failing_stop_since: HashMap<String, DateTime<Utc>>,
}

impl ExitTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note whether a price was found this cycle; returns the start of the
    /// current unpriced run
    pub fn observe_price(
        &mut self,
        token_id: &str,
        priced: bool,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if priced {
            self.unpriced_since.remove(token_id);
            None
        } else {
            Some(
                *self
                    .unpriced_since
                    .entry(token_id.to_string())
                    .or_insert(now),
            )
        }
    }

    /// Record a failed stop-loss close; true once failures have outlasted
    /// `grace`
    pub fn stop_loss_failed(&mut self, token_id: &str, now: DateTime<Utc>, grace: Duration) -> bool {
        let since = *self
            .failing_stop_since
            .entry(token_id.to_string())
            .or_insert(now);
        now - since >= grace
    }

    /// End a stop-loss episode: the next failure starts a fresh grace period
    pub fn stop_loss_recovered(&mut self, token_id: &str) {
        self.failing_stop_since.remove(token_id);
    }

    /// Forget a position once it is closed
    pub fn clear(&mut self, token_id: &str) {
        self.unpriced_since.remove(token_id);
        self.failing_stop_since.remove(token_id);
    }

    /// Drop clocks for positions no longer open
    pub fn retain<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.unpriced_since.retain(|k, _| keep(k));
        self.failing_stop_since.retain(|k, _| keep(k));
    }
}
