//! Order execution module
//!
//! Venue-compatible sizing and the create/post protocol for BUY and SELL

mod protocol;
mod sizing;
mod types;

pub use protocol::OrderExecutor;
pub use sizing::{adjust_buy_size, ceil_shares, floor_shares, round_to_tick};
pub use types::{OrderIntent, OrderPhase, OrderResult, OrderStatus};
