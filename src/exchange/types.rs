//! Venue order types and errors

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// What to trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// Market parameters the venue requires on every order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOptions {
    pub tick_size: Decimal,
    /// Combinatorial (negative-risk) market flag
    pub neg_risk: bool,
}

/// A built and signed order, ready to post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOrder {
    /// Client-side identifier assigned at build time
    pub client_id: String,
    pub spec: OrderSpec,
    pub options: OrderOptions,
    pub signature: String,
}

/// Venue response to a posted order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    #[serde(default, rename = "orderID")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_msg: Option<String>,
    /// Shares actually filled, when the venue reports it
    #[serde(default)]
    pub filled_size: Option<Decimal>,
    /// Average fill price, when the venue reports it
    #[serde(default)]
    pub avg_price: Option<Decimal>,
}

/// Balance to query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BalanceAsset {
    /// USDC collateral
    Collateral,
    /// Outcome shares of one token
    Conditional(String),
}

/// Parsed cause of a venue rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    Balance,
    Allowance,
    MinSize,
    Price,
    RiskFlag,
    Other,
}

impl RejectionKind {
    /// Classify a venue error message
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("allowance") {
            RejectionKind::Allowance
        } else if msg.contains("balance") || msg.contains("insufficient") {
            RejectionKind::Balance
        } else if msg.contains("neg risk") || msg.contains("neg_risk") || msg.contains("negrisk")
        {
            RejectionKind::RiskFlag
        } else if msg.contains("min") && (msg.contains("size") || msg.contains("amount")) {
            RejectionKind::MinSize
        } else if msg.contains("price") || msg.contains("tick") {
            RejectionKind::Price
        } else {
            RejectionKind::Other
        }
    }

    /// Balance drift on SELL is the only retriable cause
    pub fn is_balance_drift(&self) -> bool {
        matches!(self, RejectionKind::Balance | RejectionKind::Allowance)
    }
}

/// Exchange errors
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Network or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// The venue refused the request
    #[error("Venue rejected ({kind:?}): {message}")]
    Rejected { kind: RejectionKind, message: String },
    /// Order could not be built or signed
    #[error("Signing failed: {0}")]
    Signing(String),
    /// Response did not parse
    #[error("Unexpected response: {0}")]
    Parse(String),
    /// Operation not offered by this venue client
    #[error("Not supported: {0}")]
    Unsupported(&'static str),
}

impl ExchangeError {
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        ExchangeError::Rejected {
            kind: RejectionKind::classify(&message),
            message,
        }
    }

    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            ExchangeError::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExchangeError::Parse(e.to_string())
        } else {
            ExchangeError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejections() {
        assert_eq!(
            RejectionKind::classify("not enough balance / allowance"),
            RejectionKind::Allowance
        );
        assert_eq!(
            RejectionKind::classify("Insufficient balance for order"),
            RejectionKind::Balance
        );
        assert_eq!(
            RejectionKind::classify("invalid neg risk flag"),
            RejectionKind::RiskFlag
        );
        assert_eq!(
            RejectionKind::classify("Size (2) lower than the minimum: 5"),
            RejectionKind::MinSize
        );
        assert_eq!(
            RejectionKind::classify("invalid price (0.001), min tick 0.01"),
            RejectionKind::Price
        );
        assert_eq!(RejectionKind::classify("server busy"), RejectionKind::Other);
    }

    #[test]
    fn test_balance_drift_kinds() {
        assert!(RejectionKind::Balance.is_balance_drift());
        assert!(RejectionKind::Allowance.is_balance_drift());
        assert!(!RejectionKind::Price.is_balance_drift());
    }

    #[test]
    fn test_post_response_deserialize() {
        let json = r#"{"orderID":"0xabc","status":"matched","success":true,"errorMsg":""}"#;
        let resp: PostResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.order_id.as_deref(), Some("0xabc"));
        assert!(resp.success);
        assert!(resp.filled_size.is_none());
    }

    #[test]
    fn test_rejected_constructor_classifies() {
        let err = ExchangeError::rejected("not enough balance");
        assert_eq!(err.rejection_kind(), Some(RejectionKind::Balance));
        assert!(ExchangeError::Transport("x".into()).rejection_kind().is_none());
    }
}
