//! Binance WebSocket reference price feed

use super::{FeedError, PriceTick, ReferenceFeed};
use crate::config::FeedConfig;
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Binance trade message structure
#[derive(Debug, Deserialize)]
struct BinanceTradeMessage {
    /// Event type
    #[serde(rename = "e")]
    event_type: String,
    /// Symbol
    #[serde(rename = "s")]
    symbol: String,
    /// Price
    #[serde(rename = "p")]
    price: String,
    /// Trade time (milliseconds)
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Combined-stream envelope: `{"stream": "btcusdt@trade", "data": {...}}`
#[derive(Debug, Deserialize)]
struct CombinedMessage {
    #[allow(dead_code)]
    stream: String,
    data: BinanceTradeMessage,
}

/// Binance combined trade stream for several USDT pairs
pub struct BinanceFeed {
    base_url: String,
    symbols: Vec<String>,
    ws_config: WsConfig,
}

impl BinanceFeed {
    /// Create a feed for the given assets ("btc" -> "btcusdt@trade")
    pub fn new(base_url: impl Into<String>, assets: &[String]) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let symbols = assets
            .iter()
            .map(|a| format!("{}usdt", a.to_lowercase()))
            .collect();
        Self {
            base_url,
            symbols,
            ws_config: WsConfig::default(),
        }
    }

    /// Reuse the feed-wide reconnect and heartbeat settings
    pub fn with_feed_config(mut self, config: &FeedConfig) -> Self {
        self.ws_config = WsConfig::default()
            .initial_delay(config.initial_backoff())
            .max_delay(config.max_backoff())
            .heartbeat(config.heartbeat());
        self
    }

    /// Build the WebSocket URL for the combined trade stream
    fn build_ws_url(&self) -> String {
        let streams: Vec<String> = self.symbols.iter().map(|s| format!("{}@trade", s)).collect();
        format!("{}/stream?streams={}", self.base_url, streams.join("/"))
    }

    /// Parse a trade message, wrapped or bare, into a PriceTick
    fn parse_message(msg: &str) -> Option<PriceTick> {
        let trade = match serde_json::from_str::<CombinedMessage>(msg) {
            Ok(combined) => combined.data,
            Err(_) => serde_json::from_str::<BinanceTradeMessage>(msg).ok()?,
        };

        if trade.event_type != "trade" {
            return None;
        }

        let price = Decimal::from_str(&trade.price).ok()?;
        let exchange_ts = Utc.timestamp_millis_opt(trade.trade_time).single()?;

        Some(PriceTick {
            symbol: trade.symbol,
            price,
            timestamp: Utc::now(),
            exchange_ts,
        })
    }

    /// Run the message processing loop
    async fn run_message_loop(
        mut ws_rx: mpsc::Receiver<WsMessage>,
        tick_tx: mpsc::Sender<PriceTick>,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    if let Some(tick) = Self::parse_message(&text) {
                        if tick_tx.send(tick).await.is_err() {
                            tracing::debug!("Tick receiver dropped, stopping feed");
                            break;
                        }
                    }
                }
                WsMessage::Connected => {
                    tracing::info!("Binance feed connected");
                }
                WsMessage::Disconnected => {
                    tracing::warn!("Binance feed disconnected");
                }
                WsMessage::Reconnecting { attempt, delay } => {
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Binance feed reconnecting");
                }
                WsMessage::Terminated => {
                    tracing::error!("Binance feed terminated");
                    break;
                }
                WsMessage::Binary(_) => {
                    // Binance doesn't send binary messages for trade streams
                }
            }
        }
    }
}

#[async_trait]
impl ReferenceFeed for BinanceFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>> {
        if self.symbols.is_empty() {
            return Err(FeedError::NoSymbols.into());
        }

        let (tick_tx, tick_rx) = mpsc::channel(1024);
        let mut config = self.ws_config.clone();
        config.url = self.build_ws_url();

        tracing::info!(symbols = ?self.symbols, "Subscribing to Binance feed");

        let ws_rx = WsClient::new(config).connect();
        tokio::spawn(Self::run_message_loop(ws_rx, tick_tx));

        Ok(tick_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> Vec<String> {
        vec!["btc".to_string(), "ETH".to_string()]
    }

    #[test]
    fn test_build_combined_url() {
        let feed = BinanceFeed::new("wss://stream.binance.com:9443/", &assets());
        assert_eq!(
            feed.build_ws_url(),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@trade/ethusdt@trade"
        );
    }

    #[test]
    fn test_parse_combined_trade_message() {
        let msg = r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":1704067200000,"s":"BTCUSDT","t":123456789,"p":"42500.50","q":"0.001","T":1704067200123}}"#;

        let tick = BinanceFeed::parse_message(msg).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.asset(), "BTC");
        assert_eq!(tick.price, Decimal::from_str("42500.50").unwrap());
        assert_eq!(tick.exchange_ts.timestamp_millis(), 1_704_067_200_123);
    }

    #[test]
    fn test_parse_bare_trade_message() {
        let msg = r#"{"e":"trade","E":1704067200000,"s":"ETHUSDT","t":1,"p":"2300.1","q":"1","T":1704067200123}"#;
        assert_eq!(BinanceFeed::parse_message(msg).unwrap().asset(), "ETH");
    }

    #[test]
    fn test_parse_rejects_other_events() {
        let msg = r#"{"e":"aggTrade","E":1704067200000,"s":"BTCUSDT","t":1,"p":"42500.50","q":"0.001","T":1704067200123}"#;
        assert!(BinanceFeed::parse_message(msg).is_none());
        assert!(BinanceFeed::parse_message("not valid json").is_none());

        let bad_price = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"nan?","q":"1","T":1}"#;
        assert!(BinanceFeed::parse_message(bad_price).is_none());
    }

    #[tokio::test]
    async fn test_message_loop_survives_disconnect() {
        let (ws_tx, ws_rx) = mpsc::channel(10);
        let (tick_tx, mut tick_rx) = mpsc::channel(10);

        let handle = tokio::spawn(BinanceFeed::run_message_loop(ws_rx, tick_tx));

        ws_tx.send(WsMessage::Text("invalid json".to_string())).await.unwrap();
        ws_tx.send(WsMessage::Disconnected).await.unwrap();
        let msg = r#"{"e":"trade","E":1704067200000,"s":"BTCUSDT","t":1,"p":"100.00","q":"0.001","T":1704067200123}"#;
        ws_tx.send(WsMessage::Text(msg.to_string())).await.unwrap();

        let tick = tick_rx.recv().await.unwrap();
        assert_eq!(tick.price, Decimal::from_str("100.00").unwrap());

        ws_tx.send(WsMessage::Terminated).await.unwrap();
        handle.await.unwrap();
    }
}
