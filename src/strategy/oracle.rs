//! External decision oracle
//!
//! The oracle's call is only trusted when the reference asset is already
//! moving the same way.

use crate::market::{MarketSnapshot, Outcome};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// What the oracle recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleAction {
    BuyYes,
    BuyNo,
    BuyBoth,
    Skip,
}

/// An oracle verdict for one market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleDecision {
    pub action: OracleAction,
    /// 0-100
    pub confidence: Decimal,
    /// Agreement among the oracle's voters, 0-1
    pub consensus: Decimal,
    pub reasoning: String,
}

/// External decision oracle
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, market: &MarketSnapshot) -> anyhow::Result<OracleDecision>;
}

/// Why an oracle decision was not acted on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleVeto {
    #[error("oracle skipped")]
    Skip,
    #[error("confidence {0} below minimum")]
    LowConfidence(Decimal),
    #[error("no reference momentum available")]
    NoMomentum,
    #[error("momentum {momentum} does not confirm {side}")]
    MomentumDisagrees { side: Outcome, momentum: Decimal },
}

/// Turn a decision into a side to buy
///
/// `BuyBoth` becomes the cheaper side. The side must be confirmed by
/// reference momentum beyond `min_momentum` in its direction.
pub fn resolve_oracle(
    decision: &OracleDecision,
    market: &MarketSnapshot,
    momentum: Option<Decimal>,
    min_confidence: Decimal,
    min_momentum: Decimal,
) -> Result<Outcome, OracleVeto> {
    let side = match decision.action {
        OracleAction::Skip => return Err(OracleVeto::Skip),
        OracleAction::BuyYes => Outcome::Up,
        OracleAction::BuyNo => Outcome::Down,
        OracleAction::BuyBoth => {
            if market.down_price < market.up_price {
                Outcome::Down
            } else {
                Outcome::Up
            }
        }
    };

    if decision.confidence < min_confidence {
        return Err(OracleVeto::LowConfidence(decision.confidence));
    }

    let momentum = momentum.ok_or(OracleVeto::NoMomentum)?;
    let confirms = match side {
        Outcome::Up => momentum > min_momentum,
        Outcome::Down => momentum < -min_momentum,
    };
    if !confirms {
        return Err(OracleVeto::MomentumDisagrees { side, momentum });
    }
    Ok(side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn market() -> MarketSnapshot {
        MarketSnapshot {
            market_id: "m".into(),
            asset: "ETH".into(),
            up_token_id: "u".into(),
            down_token_id: "d".into(),
            up_price: dec!(0.56),
            down_price: dec!(0.44),
            end_time: Utc::now() + Duration::minutes(10),
            neg_risk: false,
            tick_size: dec!(0.01),
        }
    }

    fn decision(action: OracleAction, confidence: Decimal) -> OracleDecision {
        OracleDecision {
            action,
            confidence,
            consensus: dec!(0.8),
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_buy_both_picks_cheaper_side() {
        let side = resolve_oracle(
            &decision(OracleAction::BuyBoth, dec!(70)),
            &market(),
            Some(dec!(-0.001)),
            dec!(60),
            dec!(0.0005),
        );
        assert_eq!(side, Ok(Outcome::Down));
    }

    #[test]
    fn test_momentum_veto() {
        let result = resolve_oracle(
            &decision(OracleAction::BuyYes, dec!(80)),
            &market(),
            Some(dec!(0.0001)),
            dec!(60),
            dec!(0.0005),
        );
        assert!(matches!(result, Err(OracleVeto::MomentumDisagrees { .. })));

        let missing = resolve_oracle(
            &decision(OracleAction::BuyYes, dec!(80)),
            &market(),
            None,
            dec!(60),
            dec!(0.0005),
        );
        assert_eq!(missing, Err(OracleVeto::NoMomentum));
    }

    #[test]
    fn test_low_confidence_and_skip() {
        let m = market();
        assert_eq!(
            resolve_oracle(&decision(OracleAction::Skip, dec!(99)), &m, Some(dec!(1)), dec!(60), dec!(0)),
            Err(OracleVeto::Skip)
        );
        assert_eq!(
            resolve_oracle(&decision(OracleAction::BuyNo, dec!(55)), &m, Some(dec!(-1)), dec!(60), dec!(0)),
            Err(OracleVeto::LowConfidence(dec!(55)))
        );
        assert_eq!(
            resolve_oracle(&decision(OracleAction::BuyNo, dec!(65)), &m, Some(dec!(-0.01)), dec!(60), dec!(0.0005)),
            Ok(Outcome::Down)
        );
    }

    #[test]
    fn test_momentum_at_threshold_is_not_beyond_it() {
        let m = market();
        let at = resolve_oracle(&decision(OracleAction::BuyYes, dec!(80)), &m, Some(dec!(0.0005)), dec!(60), dec!(0.0005));
        assert!(matches!(at, Err(OracleVeto::MomentumDisagrees { .. })));

        let down_at = resolve_oracle(&decision(OracleAction::BuyNo, dec!(80)), &m, Some(dec!(-0.0005)), dec!(60), dec!(0.0005));
        assert!(matches!(down_at, Err(OracleVeto::MomentumDisagrees { .. })));

        let beyond = resolve_oracle(&decision(OracleAction::BuyYes, dec!(80)), &m, Some(dec!(0.0006)), dec!(60), dec!(0.0005));
        assert_eq!(beyond, Ok(Outcome::Up));
    }
}
