//! Paper trading venue with simulated fills

use super::{
    BalanceAsset, ClobClient, ExchangeApi, ExchangeError, OrderOptions, OrderSide, OrderSpec,
    PostResponse, SignedOrder,
};
use crate::orderbook::{BookSource, OrderBook};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const INSUFFICIENT: &str = "not enough balance / allowance";

/// A simulated fill
#[derive(Debug, Clone)]
pub struct PaperFill {
    pub order_id: Uuid,
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PaperState {
    collateral: Decimal,
    holdings: HashMap<String, Decimal>,
    fills: Vec<PaperFill>,
    neg_risk: HashMap<String, bool>,
}

/// Dry-run venue: fills every affordable order immediately at its limit price
///
/// Books (and risk flags) come from the public CLOB when one is attached,
/// otherwise every book is empty.
pub struct PaperExchange {
    fee_rate: Decimal,
    clob: Option<Arc<ClobClient>>,
    state: Arc<RwLock<PaperState>>,
}

impl PaperExchange {
    /// Create a paper venue holding `collateral` USDC
    pub fn new(collateral: Decimal, fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            clob: None,
            state: Arc::new(RwLock::new(PaperState {
                collateral,
                ..Default::default()
            })),
        }
    }

    /// Serve real books from the public CLOB
    pub fn with_clob(mut self, clob: Arc<ClobClient>) -> Self {
        self.clob = Some(clob);
        self
    }

    /// Seed share holdings, e.g. for recovered positions
    pub async fn credit_shares(&self, token_id: &str, size: Decimal) {
        let mut state = self.state.write().await;
        *state.holdings.entry(token_id.to_string()).or_default() += size;
    }

    /// Fix the venue flag reported for a token
    pub async fn set_neg_risk(&self, token_id: &str, neg_risk: bool) {
        self.state
            .write()
            .await
            .neg_risk
            .insert(token_id.to_string(), neg_risk);
    }

    /// All fills so far
    pub async fn fills(&self) -> Vec<PaperFill> {
        self.state.read().await.fills.clone()
    }
}

#[async_trait]
impl BookSource for PaperExchange {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExchangeError> {
        match &self.clob {
            Some(clob) => clob.get_order_book(token_id).await,
            None => Ok(OrderBook::new(token_id)),
        }
    }
}

#[async_trait]
impl ExchangeApi for PaperExchange {
    async fn create_order(
        &self,
        spec: &OrderSpec,
        options: &OrderOptions,
    ) -> Result<SignedOrder, ExchangeError> {
        if spec.price <= Decimal::ZERO || spec.price >= Decimal::ONE {
            return Err(ExchangeError::Signing(format!(
                "price {} outside (0, 1)",
                spec.price
            )));
        }
        if spec.size <= Decimal::ZERO {
            return Err(ExchangeError::Signing(format!("size {} not positive", spec.size)));
        }

        Ok(SignedOrder {
            client_id: Uuid::new_v4().to_string(),
            spec: spec.clone(),
            options: *options,
            signature: "paper".to_string(),
        })
    }

    async fn post_order(&self, order: &SignedOrder) -> Result<PostResponse, ExchangeError> {
        let spec = &order.spec;
        let notional = spec.price * spec.size;
        let fees = notional * self.fee_rate;

        let mut state = self.state.write().await;
        match spec.side {
            OrderSide::Buy => {
                if state.collateral < notional + fees {
                    return Ok(rejected());
                }
                state.collateral -= notional + fees;
                *state.holdings.entry(spec.token_id.clone()).or_default() += spec.size;
            }
            OrderSide::Sell => {
                let held = state.holdings.get(&spec.token_id).copied().unwrap_or_default();
                if held < spec.size {
                    return Ok(rejected());
                }
                state.holdings.insert(spec.token_id.clone(), held - spec.size);
                state.collateral += notional - fees;
            }
        }

        let order_id = Uuid::new_v4();
        state.fills.push(PaperFill {
            order_id,
            token_id: spec.token_id.clone(),
            side: spec.side,
            price: spec.price,
            size: spec.size,
            fees,
            timestamp: Utc::now(),
        });

        tracing::info!(
            order_id = %order_id,
            token_id = %spec.token_id,
            side = spec.side.as_str(),
            price = %spec.price,
            size = %spec.size,
            "Paper order filled"
        );

        Ok(PostResponse {
            order_id: Some(order_id.to_string()),
            status: "matched".to_string(),
            success: true,
            error_msg: None,
            filled_size: Some(spec.size),
            avg_price: Some(spec.price),
        })
    }

    async fn get_balance(&self, asset: &BalanceAsset) -> Result<Decimal, ExchangeError> {
        let state = self.state.read().await;
        Ok(match asset {
            BalanceAsset::Collateral => state.collateral,
            BalanceAsset::Conditional(token_id) => {
                state.holdings.get(token_id).copied().unwrap_or_default()
            }
        })
    }

    async fn get_neg_risk(&self, token_id: &str) -> Result<Option<bool>, ExchangeError> {
        if let Some(flag) = self.state.read().await.neg_risk.get(token_id) {
            return Ok(Some(*flag));
        }
        match &self.clob {
            Some(clob) => clob.fetch_neg_risk(token_id).await.map(Some),
            None => Ok(None),
        }
    }
}

fn rejected() -> PostResponse {
    PostResponse {
        order_id: None,
        status: "rejected".to_string(),
        success: false,
        error_msg: Some(INSUFFICIENT.to_string()),
        filled_size: None,
        avg_price: None,
    }
}
