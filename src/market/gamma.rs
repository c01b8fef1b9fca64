//! Gamma API client for market discovery
//!
//! Each 15-minute up/down market lives under a deterministic event slug,
//! `{asset}-updown-15m-{window_start}`, where `window_start` is the Unix
//! time of the window's opening rounded down to 900 seconds.

use super::{MarketFeed, MarketSnapshot};
use crate::telemetry::{self, LatencyMetric};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Length of one market window
pub const WINDOW_SECS: i64 = 900;

/// Configuration for the Gamma client
#[derive(Debug, Clone)]
pub struct GammaConfig {
    /// Base URL for the Gamma API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Lower-case asset symbols to scan
    pub assets: Vec<String>,
    /// Also fetch the next window once the current one has less than this left
    pub lookahead: chrono::Duration,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gamma-api.polymarket.com".to_string(),
            timeout: Duration::from_secs(10),
            assets: vec!["btc".to_string(), "eth".to_string()],
            lookahead: chrono::Duration::seconds(120),
        }
    }
}

/// Client for Polymarket's Gamma API
pub struct GammaClient {
    config: GammaConfig,
    client: Client,
}

/// Start of the 15-minute window containing `now`
pub fn window_start(now: DateTime<Utc>) -> i64 {
    let ts = now.timestamp();
    ts - ts.rem_euclid(WINDOW_SECS)
}

fn event_slug(asset: &str, window_start: i64) -> String {
    format!("{}-updown-15m-{}", asset.to_lowercase(), window_start)
}

impl GammaClient {
    /// Create a new client with custom configuration
    pub fn with_config(config: GammaConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Live markets for one asset: the current window, plus the next one
    /// when the current window is about to close
    pub async fn fetch_asset_markets(
        &self,
        asset: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MarketSnapshot>> {
        let start = window_start(now);
        let mut windows = vec![start];
        let current_end = DateTime::from_timestamp(start + WINDOW_SECS, 0).unwrap_or(now);
        if current_end - now < self.config.lookahead {
            windows.push(start + WINDOW_SECS);
        }

        let mut markets = Vec::new();
        for window in windows {
            let slug = event_slug(asset, window);
            if let Some(event) = self.fetch_event(&slug).await? {
                markets.extend(
                    event
                        .into_snapshots(asset)
                        .into_iter()
                        .filter(|m| m.end_time > now),
                );
            }
        }

        Ok(markets)
    }

    /// Fetch an event by slug; `None` when it does not exist yet
    async fn fetch_event(&self, slug: &str) -> anyhow::Result<Option<GammaEvent>> {
        let url = format!("{}/events/slug/{}", self.config.base_url, slug);

        tracing::debug!(url = %url, "Fetching event from Gamma API");

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error: {} - {}", status, body);
        }

        let event: GammaEvent = response.json().await?;
        Ok(Some(event))
    }
}

#[async_trait]
impl MarketFeed for GammaClient {
    async fn fetch_live_markets(
        &self,
        asset_filter: Option<&str>,
    ) -> anyhow::Result<Vec<MarketSnapshot>> {
        let started = Instant::now();
        let now = Utc::now();
        let mut all = Vec::new();

        for asset in &self.config.assets {
            if let Some(filter) = asset_filter {
                if !asset.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            match self.fetch_asset_markets(asset, now).await {
                Ok(markets) => all.extend(markets),
                Err(e) => {
                    tracing::warn!(asset = %asset, error = %e, "Market fetch failed");
                }
            }
        }

        telemetry::record_latency(LatencyMetric::MarketFetch, started.elapsed());
        tracing::debug!(market_count = all.len(), "Fetched live markets");
        Ok(all)
    }
}

/// Event response from Gamma API (one 15-minute window)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    neg_risk: Option<bool>,
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

/// Raw market response from Gamma API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    condition_id: String,
    /// CLOB token IDs as JSON string
    clob_token_ids: Option<String>,
    /// Outcome prices as JSON string
    outcome_prices: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    neg_risk: Option<bool>,
    #[serde(default)]
    order_price_min_tick_size: Option<f64>,
    #[serde(default)]
    closed: bool,
}

impl GammaEvent {
    fn into_snapshots(self, asset: &str) -> Vec<MarketSnapshot> {
        if self.closed {
            return vec![];
        }

        let event_end = self.end_date.as_deref().and_then(parse_time);
        let event_neg_risk = self.neg_risk.unwrap_or(false);

        self.markets
            .into_iter()
            .filter(|m| !m.closed)
            .filter_map(|m| match convert_to_snapshot(asset, m, event_end, event_neg_risk) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::debug!(asset = %asset, error = %e, "Skipping unusable market");
                    None
                }
            })
            .collect()
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a GammaMarket to a snapshot
fn convert_to_snapshot(
    asset: &str,
    gamma: GammaMarket,
    event_end: Option<DateTime<Utc>>,
    event_neg_risk: bool,
) -> anyhow::Result<MarketSnapshot> {
    let token_ids = gamma
        .clob_token_ids
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Missing clobTokenIds"))?;
    let (up_token_id, down_token_id) = parse_token_ids(token_ids)?;

    let (up_price, down_price) = gamma
        .outcome_prices
        .as_deref()
        .and_then(parse_outcome_prices)
        .unwrap_or((dec!(0.5), dec!(0.5)));

    let end_time = gamma
        .end_date
        .as_deref()
        .and_then(parse_time)
        .or(event_end)
        .ok_or_else(|| anyhow::anyhow!("Missing endDate"))?;

    let tick_size = gamma
        .order_price_min_tick_size
        .and_then(|t| Decimal::from_str(&t.to_string()).ok())
        .filter(|t| *t > Decimal::ZERO)
        .unwrap_or(dec!(0.01));

    Ok(MarketSnapshot {
        market_id: gamma.condition_id,
        asset: asset.to_uppercase(),
        up_token_id,
        down_token_id,
        up_price,
        down_price,
        end_time,
        neg_risk: gamma.neg_risk.unwrap_or(event_neg_risk),
        tick_size,
    })
}

/// Parse CLOB token IDs from JSON string
///
/// Format: "[\"token1\", \"token2\"]" where token1 is UP and token2 is DOWN
fn parse_token_ids(token_ids_str: &str) -> anyhow::Result<(String, String)> {
    let tokens: Vec<String> = serde_json::from_str(token_ids_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse clobTokenIds: {} - {}", token_ids_str, e))?;

    match tokens.as_slice() {
        [up, down, ..] => Ok((up.clone(), down.clone())),
        _ => anyhow::bail!(
            "Expected 2 token IDs, got {}: {}",
            tokens.len(),
            token_ids_str
        ),
    }
}

/// Parse both outcome prices from JSON string
///
/// Format: "[\"0.52\", \"0.48\"]"
fn parse_outcome_prices(prices_str: &str) -> Option<(Decimal, Decimal)> {
    let prices: Vec<String> = serde_json::from_str(prices_str).ok()?;
    match prices.as_slice() {
        [up, down, ..] => Some((Decimal::from_str(up).ok()?, Decimal::from_str(down).ok()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_start_rounds_down() {
        let now = Utc.timestamp_opt(1_767_638_799, 0).unwrap();
        assert_eq!(window_start(now), 1_767_638_400);
        let exact = Utc.timestamp_opt(1_767_638_400, 0).unwrap();
        assert_eq!(window_start(exact), 1_767_638_400);
    }

    #[test]
    fn test_event_slug() {
        assert_eq!(event_slug("BTC", 1_767_638_700), "btc-updown-15m-1767638700");
    }

    #[test]
    fn test_parse_token_ids() {
        let (up, down) = parse_token_ids(r#"["123456789", "987654321"]"#).unwrap();
        assert_eq!(up, "123456789");
        assert_eq!(down, "987654321");
        assert!(parse_token_ids("invalid json").is_err());
        assert!(parse_token_ids(r#"["only_one"]"#).is_err());
    }

    #[test]
    fn test_parse_outcome_prices() {
        assert_eq!(
            parse_outcome_prices(r#"["0.52", "0.48"]"#),
            Some((dec!(0.52), dec!(0.48)))
        );
        assert!(parse_outcome_prices("not json").is_none());
        assert!(parse_outcome_prices(r#"["0.52"]"#).is_none());
    }

    #[test]
    fn test_event_into_snapshots() {
        let json = r#"{
            "slug": "eth-updown-15m-1767638700",
            "closed": false,
            "endDate": "2026-01-05T18:45:00Z",
            "negRisk": false,
            "markets": [{
                "conditionId": "0xabc",
                "question": "Ethereum Up or Down?",
                "clobTokenIds": "[\"up_tok\", \"down_tok\"]",
                "outcomePrices": "[\"0.535\", \"0.465\"]",
                "orderPriceMinTickSize": 0.001,
                "closed": false
            }]
        }"#;

        let event: GammaEvent = serde_json::from_str(json).unwrap();
        let snapshots = event.into_snapshots("eth");
        assert_eq!(snapshots.len(), 1);

        let market = &snapshots[0];
        assert_eq!(market.market_id, "0xabc");
        assert_eq!(market.asset, "ETH");
        assert_eq!(market.up_token_id, "up_tok");
        assert_eq!(market.down_price, dec!(0.465));
        assert_eq!(market.tick_size, dec!(0.001));
        assert!(!market.neg_risk);
        assert_eq!(
            market.end_time,
            Utc.with_ymd_and_hms(2026, 1, 5, 18, 45, 0).unwrap()
        );
    }

    #[test]
    fn test_closed_event_yields_nothing() {
        let json = r#"{"closed": true, "markets": []}"#;
        let event: GammaEvent = serde_json::from_str(json).unwrap();
        assert!(event.into_snapshots("btc").is_empty());
    }

    #[test]
    fn test_market_without_tokens_is_skipped() {
        let json = r#"{
            "endDate": "2026-01-05T18:45:00Z",
            "markets": [{"conditionId": "0x1", "closed": false}]
        }"#;
        let event: GammaEvent = serde_json::from_str(json).unwrap();
        assert!(event.into_snapshots("btc").is_empty());
    }

    #[test]
    fn test_gamma_client_config() {
        let config = GammaConfig {
            base_url: "https://test.example.com".to_string(),
            timeout: Duration::from_secs(30),
            assets: vec!["sol".to_string()],
            lookahead: chrono::Duration::seconds(60),
        };

        let client = GammaClient::with_config(config).unwrap();
        assert_eq!(client.config.base_url, "https://test.example.com");
        assert_eq!(client.config.assets, vec!["sol".to_string()]);
    }
}
