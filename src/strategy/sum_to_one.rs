//! Sum-to-one arbitrage
//!
//! One up share plus one down share always settles at 1.00. Buying both
//! below that, after fees, locks in the difference.

use crate::execution::ceil_shares;
use rust_decimal::Decimal;

/// A priced arbitrage opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbQuote {
    pub ask_up: Decimal,
    pub ask_down: Decimal,
    /// Cost of one pair including fees
    pub total_cost: Decimal,
    /// Settlement minus cost, per pair
    pub profit: Decimal,
}

/// Price the pair at the asks
///
/// Fires iff `ask_up + ask_down + fee < threshold` and the per-pair profit
/// after fees reaches `min_profit`.
pub fn evaluate_sum_to_one(
    ask_up: Decimal,
    ask_down: Decimal,
    threshold: Decimal,
    fee: Decimal,
    min_profit: Decimal,
) -> Option<ArbQuote> {
    if ask_up <= Decimal::ZERO || ask_down <= Decimal::ZERO {
        return None;
    }
    let total_cost = ask_up + ask_down + fee;
    let profit = Decimal::ONE - total_cost;
    (total_cost < threshold && profit >= min_profit).then_some(ArbQuote {
        ask_up,
        ask_down,
        total_cost,
        profit,
    })
}

/// Shares per leg (equal on both sides)
///
/// Spends about `budget` on the pair, grows to the venue minimums on each
/// leg, and keeps each leg at most half of that side's ask depth so the
/// book holds twice the order. `None` if the minimums do not fit.
pub fn size_legs(
    quote: &ArbQuote,
    budget: Decimal,
    min_shares: Decimal,
    min_value: Decimal,
    depth_up: Option<Decimal>,
    depth_down: Option<Decimal>,
) -> Option<Decimal> {
    let pair_cost = quote.ask_up + quote.ask_down;
    if pair_cost <= Decimal::ZERO {
        return None;
    }

    let cheaper = quote.ask_up.min(quote.ask_down);
    let floor = min_shares.max(min_value / cheaper);
    let shares = ceil_shares((budget / pair_cost).max(floor));

    let depth_cap = match (depth_up, depth_down) {
        (Some(up), Some(down)) => Some(up.min(down) / Decimal::TWO),
        (Some(d), None) | (None, Some(d)) => Some(d / Decimal::TWO),
        (None, None) => None,
    };
    match depth_cap {
        Some(cap) if shares > cap => {
            let capped = crate::execution::floor_shares(cap);
            (capped >= floor).then_some(capped)
        }
        _ => Some(shares),
    }
}
