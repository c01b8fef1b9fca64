//! Polymarket market-channel message parsing
//!
//! Turns `book`, `price_change` and `last_trade_price` events into per-token
//! price updates. The exit side of a position sells into the bid, so book
//! snapshots contribute their best bid.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// A price observation for one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    pub token_id: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Order book snapshot event
#[derive(Debug, Deserialize)]
struct BookEvent {
    asset_id: String,
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookLevel {
    price: String,
    size: String,
}

/// `price_change` event carrying a batch of level changes
#[derive(Debug, Deserialize)]
struct PriceChangesMessage {
    price_changes: Vec<PriceChange>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    asset_id: String,
    price: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    best_bid: Option<String>,
}

/// `last_trade_price` event
#[derive(Debug, Deserialize)]
struct LastTradeEvent {
    asset_id: String,
    price: String,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Parse one WebSocket text frame; unknown or malformed events yield nothing
pub fn parse_market_message(text: &str) -> Vec<PriceUpdate> {
    let mut updates = Vec::new();

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(events)) => {
            for event in &events {
                parse_single_event(event, &mut updates);
            }
        }
        Ok(event @ Value::Object(_)) => parse_single_event(&event, &mut updates),
        Ok(_) => {}
        Err(e) => {
            tracing::trace!(error = %e, "Ignoring non-JSON market message");
        }
    }

    updates
}

fn parse_single_event(event: &Value, out: &mut Vec<PriceUpdate>) {
    let event_type = event
        .get("event_type")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let result = match event_type {
        "book" => parse_book(event, out),
        "price_change" => parse_price_changes(event, out),
        "last_trade_price" => parse_last_trade(event, out),
        "" if event.get("asset_id").is_some() && event.get("bids").is_some() => {
            parse_book(event, out)
        }
        "" if event.get("price_changes").is_some() => parse_price_changes(event, out),
        other => {
            tracing::trace!(event_type = other, "Ignoring market event");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::debug!(event_type, error = %e, "Failed to parse market event");
    }
}

fn parse_book(event: &Value, out: &mut Vec<PriceUpdate>) -> serde_json::Result<()> {
    let book: BookEvent = serde_json::from_value(event.clone())?;
    let best_bid = book
        .bids
        .iter()
        .filter_map(|l| {
            let price = Decimal::from_str(&l.price).ok()?;
            let size = Decimal::from_str(&l.size).ok()?;
            (size > Decimal::ZERO).then_some(price)
        })
        .max();

    if let Some(price) = best_bid {
        out.push(PriceUpdate {
            token_id: book.asset_id,
            price,
            timestamp: parse_timestamp(book.timestamp.as_deref()),
        });
    }
    Ok(())
}

fn parse_price_changes(event: &Value, out: &mut Vec<PriceUpdate>) -> serde_json::Result<()> {
    if event.get("price_changes").is_none() {
        return Ok(());
    }
    let msg: PriceChangesMessage = serde_json::from_value(event.clone())?;
    let timestamp = parse_timestamp(msg.timestamp.as_deref());

    for change in msg.price_changes {
        let price = match change.best_bid.as_deref().map(Decimal::from_str) {
            Some(Ok(bid)) => Some(bid),
            _ if change.side == "BUY" => Decimal::from_str(&change.price).ok(),
            _ => None,
        };
        if let Some(price) = price.filter(|p| *p > Decimal::ZERO) {
            out.push(PriceUpdate {
                token_id: change.asset_id,
                price,
                timestamp,
            });
        }
    }
    Ok(())
}

fn parse_last_trade(event: &Value, out: &mut Vec<PriceUpdate>) -> serde_json::Result<()> {
    let trade: LastTradeEvent = serde_json::from_value(event.clone())?;
    if let Ok(price) = Decimal::from_str(&trade.price) {
        out.push(PriceUpdate {
            token_id: trade.asset_id,
            price,
            timestamp: parse_timestamp(trade.timestamp.as_deref()),
        });
    }
    Ok(())
}

/// Millisecond epoch string, falling back to now
fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}
