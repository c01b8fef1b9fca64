//! Exchange module
//!
//! The order API boundary: build/sign, post, books and balances. Live
//! signing is supplied by the embedding application; this crate ships a
//! paper venue for dry runs and a read-only CLOB book client.

mod clob;
mod paper;
mod types;

pub use clob::ClobClient;
pub use paper::PaperExchange;
pub use types::{
    BalanceAsset, ExchangeError, OrderOptions, OrderSide, OrderSpec, PostResponse,
    RejectionKind, SignedOrder,
};

use crate::orderbook::BookSource;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for venue order API implementations
#[async_trait]
pub trait ExchangeApi: BookSource {
    /// Build and sign an order (no network side effects)
    async fn create_order(
        &self,
        spec: &OrderSpec,
        options: &OrderOptions,
    ) -> Result<SignedOrder, ExchangeError>;

    /// Submit a signed order
    async fn post_order(&self, order: &SignedOrder) -> Result<PostResponse, ExchangeError>;

    /// Available balance of collateral or of one token's shares
    async fn get_balance(&self, asset: &BalanceAsset) -> Result<Decimal, ExchangeError>;

    /// The venue's negative-risk flag for a token, if it can tell
    async fn get_neg_risk(&self, token_id: &str) -> Result<Option<bool>, ExchangeError>;
}
