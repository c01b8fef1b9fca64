//! Read-only Polymarket CLOB REST client

use super::ExchangeError;
use crate::orderbook::{BookSource, OrderBook, PriceLevel};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Client for public CLOB endpoints (books and market flags)
pub struct ClobClient {
    base_url: String,
    client: Client,
}

impl ClobClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The venue's negative-risk flag for a token
    pub async fn fetch_neg_risk(&self, token_id: &str) -> Result<bool, ExchangeError> {
        let url = format!("{}/neg-risk", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Transport(format!("{} - {}", status, body)));
        }

        let flag: NegRiskResponse = response.json().await?;
        Ok(flag.neg_risk)
    }
}

#[async_trait]
impl BookSource for ClobClient {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExchangeError> {
        let url = format!("{}/book", self.base_url);

        tracing::trace!(token_id = %token_id, "Fetching order book");

        let response = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // No book for resolved or unknown tokens
            return Ok(OrderBook::new(token_id));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Transport(format!("{} - {}", status, body)));
        }

        let raw: RawBook = response.json().await?;
        Ok(raw.into_book(token_id))
    }
}

#[derive(Debug, Deserialize)]
struct NegRiskResponse {
    neg_risk: bool,
}

/// Book as returned by `GET /book`
#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
    size: String,
}

impl RawLevel {
    fn parse(&self) -> Option<PriceLevel> {
        Some(PriceLevel {
            price: Decimal::from_str(&self.price).ok()?,
            size: Decimal::from_str(&self.size).ok()?,
        })
    }
}

impl RawBook {
    fn into_book(self, token_id: &str) -> OrderBook {
        let bids = self.bids.iter().filter_map(RawLevel::parse).collect();
        let asks = self.asks.iter().filter_map(RawLevel::parse).collect();
        OrderBook::from_levels(token_id, bids, asks)
    }
}
