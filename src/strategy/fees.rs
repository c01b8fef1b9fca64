//! Venue taker fee model

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MAX_FEE: Decimal = dec!(0.03);
const MIN_FEE: Decimal = dec!(0.001);

/// Fee per share at price `p`: highest at 0.50, vanishing toward 0 and 1
pub fn dynamic_fee(price: Decimal) -> Decimal {
    let distance = (dec!(2) * price - Decimal::ONE).abs();
    (MAX_FEE * (Decimal::ONE - distance)).max(MIN_FEE)
}
