//! Venue-compatible price and size rounding

use crate::exchange::OrderSide;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a price to the market tick, kept strictly inside (0, 1)
///
/// BUY limits round up and SELL limits round down so the order still
/// crosses the quote it was priced from.
pub fn round_to_tick(price: Decimal, tick: Decimal, side: OrderSide) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    let strategy = match side {
        OrderSide::Buy => RoundingStrategy::ToPositiveInfinity,
        OrderSide::Sell => RoundingStrategy::ToZero,
    };
    let ticks = (price / tick).round_dp_with_strategy(0, strategy);
    (ticks * tick).clamp(tick, Decimal::ONE - tick).normalize()
}

/// Round shares up to 2 decimals
pub fn ceil_shares(size: Decimal) -> Decimal {
    size.round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

/// Round shares down to 2 decimals
pub fn floor_shares(size: Decimal) -> Decimal {
    size.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// BUY size that meets the venue minimums at `price`
///
/// Size only ever grows; the price is never touched. Returns `None` when
/// the required size is more than `max_upsize_factor` times the request.
pub fn adjust_buy_size(
    price: Decimal,
    size: Decimal,
    min_shares: Decimal,
    min_value: Decimal,
    max_upsize_factor: Decimal,
) -> Option<Decimal> {
    if price <= Decimal::ZERO || size <= Decimal::ZERO {
        return None;
    }

    let mut shares = size.max(min_shares);
    if price * shares < min_value {
        shares = min_value / price;
    }
    let shares = ceil_shares(shares);

    if shares > size * max_upsize_factor {
        return None;
    }
    Some(shares)
}
