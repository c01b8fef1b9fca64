//! Execution types

use crate::exchange::{OrderSide, RejectionKind};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// What the caller wants traded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    /// Shares
    pub size: Decimal,
    pub tick_size: Decimal,
    /// Risk-class flag the order must carry
    pub neg_risk: bool,
}

/// Outcome class of an execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// The venue confirmed a fill
    Filled,
    /// Transport or signing trouble; may succeed later
    Failed,
    /// Refused by local validation or by the venue
    Rejected,
}

/// Where an attempt stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPhase {
    Validate,
    Create,
    Post,
}

impl OrderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPhase::Validate => "validate",
            OrderPhase::Create => "create",
            OrderPhase::Post => "post",
        }
    }
}

/// Result of one execution call; never an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub phase: OrderPhase,
    pub order_id: Option<String>,
    /// Actual fill, when filled
    pub fill_price: Option<Decimal>,
    pub fill_size: Option<Decimal>,
    pub rejection: Option<RejectionKind>,
    pub error: Option<String>,
}

impl OrderResult {
    pub fn filled(order_id: Option<String>, price: Decimal, size: Decimal) -> Self {
        Self {
            status: OrderStatus::Filled,
            phase: OrderPhase::Post,
            order_id,
            fill_price: Some(price),
            fill_size: Some(size),
            rejection: None,
            error: None,
        }
    }

    pub fn failed(phase: OrderPhase, error: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Failed,
            phase,
            order_id: None,
            fill_price: None,
            fill_size: None,
            rejection: None,
            error: Some(error.into()),
        }
    }

    pub fn rejected(phase: OrderPhase, kind: Option<RejectionKind>, error: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Rejected,
            phase,
            order_id: None,
            fill_price: None,
            fill_size: None,
            rejection: kind,
            error: Some(error.into()),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Fill price and size, when filled
    pub fn fill(&self) -> Option<(Decimal, Decimal)> {
        match (self.status, self.fill_price, self.fill_size) {
            (OrderStatus::Filled, Some(price), Some(size)) => Some((price, size)),
            _ => None,
        }
    }
}

impl fmt::Display for OrderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.fill_price, self.fill_size) {
            (Some(price), Some(size)) if self.is_filled() => {
                write!(f, "filled {} @ {}", size, price)
            }
            _ => write!(
                f,
                "{:?} at {}: {}",
                self.status,
                self.phase.as_str(),
                self.error.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_accessor() {
        let ok = OrderResult::filled(Some("id".into()), dec!(0.51), dec!(9.8));
        assert_eq!(ok.fill(), Some((dec!(0.51), dec!(9.8))));
        assert_eq!(ok.to_string(), "filled 9.8 @ 0.51");

        let failed = OrderResult::failed(OrderPhase::Create, "boom");
        assert_eq!(failed.fill(), None);
        assert_eq!(failed.to_string(), "Failed at create: boom");
    }
}
