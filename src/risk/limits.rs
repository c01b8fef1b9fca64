//! Portfolio limits, scaled for small accounts
//!
//! Venue minimums ($1, 5 shares) are a large share of a tiny bankroll, so
//! the heat ceiling and max position fraction loosen as capital shrinks.

use crate::config::RiskConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Capital tiers: (below this capital, heat ceiling, max position fraction)
const SMALL_ACCOUNT_TIERS: [(Decimal, Decimal, Decimal); 3] = [
    (dec!(5), dec!(0.90), dec!(0.80)),
    (dec!(10), dec!(0.80), dec!(0.60)),
    (dec!(20), dec!(0.60), dec!(0.40)),
];

/// Orders this close to the venue minimum pass the position-size check
const MIN_ORDER_TOLERANCE: Decimal = dec!(1.10);

/// Position and risk limits
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_portfolio_heat: Decimal,
    pub max_daily_drawdown: Decimal,
    pub max_position_pct: Decimal,
    pub max_market_exposure: Decimal,
    pub consecutive_loss_limit: u32,
    pub drawdown_halt_secs: i64,
    pub loss_streak_halt_secs: i64,
    pub min_capital: Decimal,
    pub market_exposure_floor: Decimal,
    pub max_capital_fraction: Decimal,
    pub min_order_value: Decimal,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_portfolio_heat: config.max_portfolio_heat,
            max_daily_drawdown: config.max_daily_drawdown,
            max_position_pct: config.max_position_pct,
            max_market_exposure: config.max_market_exposure,
            consecutive_loss_limit: config.consecutive_loss_limit,
            drawdown_halt_secs: config.drawdown_halt_secs,
            loss_streak_halt_secs: config.loss_streak_halt_secs,
            min_capital: config.min_capital,
            market_exposure_floor: config.market_exposure_floor,
            max_capital_fraction: config.max_capital_fraction,
            min_order_value: config.min_order_value,
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

impl RiskLimits {
    fn tier(capital: Decimal) -> Option<(Decimal, Decimal)> {
        SMALL_ACCOUNT_TIERS
            .iter()
            .find(|(below, _, _)| capital < *below)
            .map(|(_, heat, position)| (*heat, *position))
    }

    /// Heat ceiling for the given capital
    pub fn heat_ceiling(&self, capital: Decimal) -> Decimal {
        Self::tier(capital).map_or(self.max_portfolio_heat, |(heat, _)| heat)
    }

    /// Largest single order value, never below the venue minimum
    pub fn max_position_size(&self, capital: Decimal) -> Decimal {
        let fraction = Self::tier(capital).map_or(self.max_position_pct, |(_, pos)| pos);
        (capital * fraction).max(self.min_order_value)
    }

    /// Whether `size` is small enough to count as a minimum-size order
    pub fn is_minimum_order(&self, size: Decimal) -> bool {
        size <= self.min_order_value * MIN_ORDER_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heat_ceiling_tiers() {
        let limits = RiskLimits::default();
        assert_eq!(limits.heat_ceiling(dec!(4)), dec!(0.90));
        assert_eq!(limits.heat_ceiling(dec!(9.99)), dec!(0.80));
        assert_eq!(limits.heat_ceiling(dec!(15)), dec!(0.60));
        assert_eq!(limits.heat_ceiling(dec!(20)), dec!(0.30));
        assert_eq!(limits.heat_ceiling(dec!(1000)), dec!(0.30));
    }

    #[test]
    fn test_max_position_size_tiers() {
        let limits = RiskLimits::default();
        assert_eq!(limits.max_position_size(dec!(4)), dec!(3.20));
        assert_eq!(limits.max_position_size(dec!(8)), dec!(4.80));
        assert_eq!(limits.max_position_size(dec!(15)), dec!(6.00));
        assert_eq!(limits.max_position_size(dec!(200)), dec!(10.00));
        // Floor at the venue minimum
        assert_eq!(limits.max_position_size(dec!(1.2)), dec!(1.00));
    }

    #[test]
    fn test_minimum_order_tolerance() {
        let limits = RiskLimits::default();
        assert!(limits.is_minimum_order(dec!(1.10)));
        assert!(!limits.is_minimum_order(dec!(1.11)));
    }
}
