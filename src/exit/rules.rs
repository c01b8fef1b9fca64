//! Priority-ordered exit rules
//!
//! Pure evaluation: given a position, its resolved price and timers, pick at
//! most one exit reason. The first matching rule wins.

use super::ExitReason;
use crate::config::ExitConfig;
use crate::position::Position;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Trailing stop when no confidence signal is available
pub const DEFAULT_TRAILING_STOP: Decimal = dec!(0.02);
/// Trailing activation when no volatility reading is available
pub const DEFAULT_TRAILING_ACTIVATION: Decimal = dec!(0.005);

const HIGH_CONFIDENCE: Decimal = dec!(70);
const LOW_CONFIDENCE: Decimal = dec!(40);
const HIGH_VOLATILITY: Decimal = dec!(0.05);
const LOW_VOLATILITY: Decimal = dec!(0.01);

/// Everything the rules look at for one position in one cycle
#[derive(Debug, Clone)]
pub struct ExitContext<'a> {
    /// Peak already raised for this cycle
    pub position: &'a Position,
    /// Resolved exit price, if any source had one
    pub price: Option<Decimal>,
    /// Time left on the position's market, when its snapshot is live
    pub time_to_expiry: Option<Duration>,
    /// Signal confidence for the stop band; `None` uses the default stop
    pub confidence: Option<Decimal>,
    /// Reference volatility for the activation band
    pub volatility: Option<Decimal>,
    /// Start of the current run of cycles with no price
    pub unpriced_since: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// The exit state machine's rule set
#[derive(Debug, Clone)]
pub struct ExitRules {
    config: ExitConfig,
}

impl ExitRules {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// Retracement from peak that triggers the trailing stop
    ///
    /// Tight for confident entries, wide for weak ones.
    pub fn trailing_stop_pct(&self, confidence: Option<Decimal>) -> Decimal {
        let Some(confidence) = confidence else {
            return DEFAULT_TRAILING_STOP;
        };
        let (min, max) = (self.config.trailing_stop_min, self.config.trailing_stop_max);
        // 1.0 at high confidence, 0.0 at low
        let t = scale(confidence, LOW_CONFIDENCE, HIGH_CONFIDENCE);
        max - t * (max - min)
    }

    /// Peak gain needed before the trailing stop arms
    ///
    /// Volatile markets arm sooner.
    pub fn trailing_activation(&self, volatility: Option<Decimal>) -> Decimal {
        let Some(volatility) = volatility else {
            return DEFAULT_TRAILING_ACTIVATION;
        };
        let (min, max) = (
            self.config.trailing_activation_min,
            self.config.trailing_activation_max,
        );
        let t = scale(volatility, LOW_VOLATILITY, HIGH_VOLATILITY);
        max - t * (max - min)
    }

    /// Pick the exit reason for this cycle, if any
    ///
    /// Rules 1-5 need a price to close at; without one only orphan cleanup
    /// can fire.
    pub fn evaluate(&self, ctx: &ExitContext<'_>) -> Option<ExitReason> {
        let Some(price) = ctx.price else {
            let since = ctx.unpriced_since?;
            return (ctx.now - since >= Duration::seconds(self.config.orphan_grace_secs))
                .then_some(ExitReason::OrphanCleanup);
        };
        let position = ctx.position;

        if ctx
            .time_to_expiry
            .is_some_and(|left| left < Duration::seconds(self.config.market_closing_secs))
        {
            return Some(ExitReason::MarketClosing);
        }

        if position.age(ctx.now) > Duration::seconds(self.config.max_hold_secs) {
            return Some(ExitReason::TimeExit);
        }

        if self.trailing_triggered(position, price, ctx.confidence, ctx.volatility) {
            return Some(ExitReason::TrailingStop);
        }

        let pnl = position.pnl_pct(price);
        if pnl >= self.config.take_profit_pct {
            return Some(ExitReason::TakeProfit);
        }
        if pnl <= -self.config.stop_loss_pct {
            return Some(ExitReason::StopLoss);
        }

        None
    }

    fn trailing_triggered(
        &self,
        position: &Position,
        price: Decimal,
        confidence: Option<Decimal>,
        volatility: Option<Decimal>,
    ) -> bool {
        let peak = position.peak_price;
        if peak <= Decimal::ZERO || position.pnl_pct(peak) < self.trailing_activation(volatility) {
            return false;
        }
        (peak - price) / peak > self.trailing_stop_pct(confidence)
    }
}

/// Position of `value` within `[low, high]`, clamped to 0..=1
fn scale(value: Decimal, low: Decimal, high: Decimal) -> Decimal {
    if value <= low {
        Decimal::ZERO
    } else if value >= high {
        Decimal::ONE
    } else {
        (value - low) / (high - low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::tests::position;

    fn rules() -> ExitRules {
        ExitRules::new(ExitConfig::default())
    }

    fn ctx<'a>(
        position: &'a Position,
        price: Option<Decimal>,
        expiry_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> ExitContext<'a> {
        ExitContext {
            position,
            price,
            time_to_expiry: expiry_secs.map(Duration::seconds),
            confidence: None,
            volatility: None,
            unpriced_since: None,
            now,
        }
    }

    fn opened(minutes_ago: i64) -> (Position, DateTime<Utc>) {
        let now = Utc::now();
        let mut p = position("tok", "BTC", dec!(0.50), dec!(10));
        p.entry_time = now - Duration::minutes(minutes_ago);
        (p, now)
    }

    #[test]
    fn test_market_closing_beats_everything() {
        // 1.5 minutes left, deep in profit
        let (p, now) = opened(5);
        let reason = rules().evaluate(&ctx(&p, Some(dec!(0.70)), Some(90), now));
        assert_eq!(reason, Some(ExitReason::MarketClosing));

        let reason = rules().evaluate(&ctx(&p, Some(dec!(0.30)), Some(90), now));
        assert_eq!(reason, Some(ExitReason::MarketClosing));
    }

    #[test]
    fn test_time_exit_beats_take_profit() {
        // 14 minutes old, +10%
        let (p, now) = opened(14);
        let reason = rules().evaluate(&ctx(&p, Some(dec!(0.55)), Some(600), now));
        assert_eq!(reason, Some(ExitReason::TimeExit));
    }

    #[test]
    fn test_take_profit_and_stop_loss() {
        let (p, now) = opened(2);
        assert_eq!(
            rules().evaluate(&ctx(&p, Some(dec!(0.51)), Some(600), now)),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(
            rules().evaluate(&ctx(&p, Some(dec!(0.485)), Some(600), now)),
            Some(ExitReason::StopLoss)
        );
        assert_eq!(rules().evaluate(&ctx(&p, Some(dec!(0.495)), Some(600), now)), None);
    }

    #[test]
    fn test_trailing_stop_needs_activation() {
        let (mut p, now) = opened(2);
        // Peak +0.2% never armed the stop (activation 0.5%)
        p.peak_price = dec!(0.501);
        assert_eq!(rules().evaluate(&ctx(&p, Some(dec!(0.49)), Some(600), now)), None);

        // Peak +20%, retraced 3.3% to +16%: trailing stop precedes take profit
        p.peak_price = dec!(0.60);
        assert_eq!(
            rules().evaluate(&ctx(&p, Some(dec!(0.58)), Some(600), now)),
            Some(ExitReason::TrailingStop)
        );

        // Retracement within the 2% band: take profit instead
        assert_eq!(
            rules().evaluate(&ctx(&p, Some(dec!(0.595)), Some(600), now)),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_orphan_after_grace() {
        let (p, now) = opened(2);
        let mut c = ctx(&p, None, Some(600), now);
        assert_eq!(rules().evaluate(&c), None);

        c.unpriced_since = Some(now - Duration::seconds(30));
        assert_eq!(rules().evaluate(&c), None);

        c.unpriced_since = Some(now - Duration::seconds(121));
        assert_eq!(rules().evaluate(&c), Some(ExitReason::OrphanCleanup));
    }

    #[test]
    fn test_no_price_blocks_priced_rules() {
        // Old and near expiry, but nothing to sell at
        let (p, now) = opened(14);
        assert_eq!(rules().evaluate(&ctx(&p, None, Some(30), now)), None);
    }

    #[test]
    fn test_trailing_bands() {
        let r = rules();
        assert_eq!(r.trailing_stop_pct(None), dec!(0.02));
        assert_eq!(r.trailing_stop_pct(Some(dec!(80))), dec!(0.01));
        assert_eq!(r.trailing_stop_pct(Some(dec!(30))), dec!(0.03));
        assert_eq!(r.trailing_stop_pct(Some(dec!(55))), dec!(0.02));

        assert_eq!(r.trailing_activation(None), dec!(0.005));
        assert_eq!(r.trailing_activation(Some(dec!(0.08))), dec!(0.003));
        assert_eq!(r.trailing_activation(Some(dec!(0.005))), dec!(0.010));
        assert_eq!(r.trailing_activation(Some(dec!(0.03))), dec!(0.0065));
    }
}
