//! Realtime outcome-token prices from the Polymarket market channel
//!
//! One background task owns the connection, the subscription set and the
//! price cache. Callers talk to it through a command channel and read the
//! cache; nothing else writes to it.

use super::parse::{parse_market_message, PriceUpdate};
use super::{FeedError, PriceSource, TokenPrice};
use crate::config::FeedConfig;
use crate::telemetry::{self, GaugeMetric};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

type PriceCache = Arc<RwLock<HashMap<String, TokenPrice>>>;

#[derive(Debug)]
enum FeedCommand {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
}

/// Subscription bookkeeping for one feed, across reconnects
///
/// Each method returns the frame to send, if any.
#[derive(Debug, Default)]
pub(crate) struct FeedState {
    subscribed: BTreeSet<String>,
    connected: bool,
}

impl FeedState {
    /// Full subscription for a fresh connection
    pub(crate) fn on_connected(&mut self) -> Option<String> {
        self.connected = true;
        if self.subscribed.is_empty() {
            return None;
        }
        let ids: Vec<&String> = self.subscribed.iter().collect();
        Some(json!({ "assets_ids": ids, "type": "market" }).to_string())
    }

    pub(crate) fn on_disconnected(&mut self) {
        self.connected = false;
    }

    /// Add ids; only the newly added ones go on the wire
    pub(crate) fn subscribe(&mut self, ids: Vec<String>) -> Option<String> {
        let added: Vec<String> = ids
            .into_iter()
            .filter(|id| self.subscribed.insert(id.clone()))
            .collect();
        self.operation("subscribe", added)
    }

    /// Remove ids; only those actually subscribed go on the wire
    pub(crate) fn unsubscribe(&mut self, ids: &[String]) -> Option<String> {
        let removed: Vec<String> = ids
            .iter()
            .filter(|id| self.subscribed.remove(*id))
            .cloned()
            .collect();
        self.operation("unsubscribe", removed)
    }

    fn operation(&self, op: &str, ids: Vec<String>) -> Option<String> {
        if ids.is_empty() || !self.connected {
            return None;
        }
        Some(json!({ "assets_ids": ids, "operation": op }).to_string())
    }

    pub(crate) fn is_subscribed(&self, id: &str) -> bool {
        self.subscribed.contains(id)
    }
}

/// Price source backed by the market WebSocket
pub struct RealtimePriceFeed {
    prices: PriceCache,
    commands: mpsc::UnboundedSender<FeedCommand>,
    connected: Arc<AtomicBool>,
    max_age: Duration,
}

impl RealtimePriceFeed {
    /// Connect and start the feed task
    pub fn start(config: &FeedConfig) -> (Self, JoinHandle<()>) {
        let ws_config = WsConfig::new(config.ws_url.clone())
            .initial_delay(config.initial_backoff())
            .max_delay(config.max_backoff())
            .heartbeat(config.heartbeat());
        let (ws_rx, ws_tx) = WsClient::new(ws_config).connect_bidirectional();
        Self::with_channels(ws_rx, ws_tx, Duration::seconds(config.max_price_age_secs))
    }

    /// Start the feed task over an existing connection
    fn with_channels(
        ws_rx: mpsc::Receiver<WsMessage>,
        ws_tx: mpsc::Sender<String>,
        max_age: Duration,
    ) -> (Self, JoinHandle<()>) {
        let prices: PriceCache = Arc::new(RwLock::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run_feed(
            ws_rx,
            ws_tx,
            cmd_rx,
            Arc::clone(&prices),
            Arc::clone(&connected),
        ));

        (
            Self {
                prices,
                commands: cmd_tx,
                connected,
                max_age,
            },
            handle,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn send(&self, command: FeedCommand) -> Result<(), FeedError> {
        self.commands.send(command).map_err(|_| FeedError::Closed)
    }
}

#[async_trait]
impl PriceSource for RealtimePriceFeed {
    async fn subscribe(&self, token_ids: &[String]) {
        if let Err(e) = self.send(FeedCommand::Subscribe(token_ids.to_vec())) {
            tracing::warn!(error = %e, count = token_ids.len(), "Subscribe dropped");
        }
    }

    async fn unsubscribe(&self, token_ids: &[String]) {
        if let Err(e) = self.send(FeedCommand::Unsubscribe(token_ids.to_vec())) {
            tracing::warn!(error = %e, count = token_ids.len(), "Unsubscribe dropped");
        }
    }

    async fn get_price(&self, token_id: &str) -> Option<TokenPrice> {
        let price = *self.prices.read().await.get(token_id)?;
        price.is_fresh(Utc::now(), self.max_age).then_some(price)
    }
}

async fn run_feed(
    mut ws_rx: mpsc::Receiver<WsMessage>,
    ws_tx: mpsc::Sender<String>,
    mut cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
    prices: PriceCache,
    connected: Arc<AtomicBool>,
) {
    let mut state = FeedState::default();

    loop {
        let outgoing = tokio::select! {
            msg = ws_rx.recv() => match msg {
                Some(WsMessage::Text(text)) => {
                    apply_updates(&prices, &state, parse_market_message(&text)).await;
                    None
                }
                Some(WsMessage::Connected) => {
                    tracing::info!("Market feed connected");
                    connected.store(true, Ordering::Relaxed);
                    telemetry::set_gauge(GaugeMetric::FeedConnected, 1.0);
                    state.on_connected()
                }
                Some(WsMessage::Disconnected) => {
                    tracing::warn!("Market feed disconnected");
                    connected.store(false, Ordering::Relaxed);
                    telemetry::set_gauge(GaugeMetric::FeedConnected, 0.0);
                    state.on_disconnected();
                    None
                }
                Some(WsMessage::Reconnecting { attempt, delay }) => {
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Market feed reconnecting");
                    None
                }
                Some(WsMessage::Binary(_)) => None,
                Some(WsMessage::Terminated) | None => {
                    tracing::error!("Market feed terminated");
                    connected.store(false, Ordering::Relaxed);
                    telemetry::set_gauge(GaugeMetric::FeedConnected, 0.0);
                    break;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(FeedCommand::Subscribe(ids)) => state.subscribe(ids),
                Some(FeedCommand::Unsubscribe(ids)) => {
                    let mut cache = prices.write().await;
                    for id in &ids {
                        cache.remove(id);
                    }
                    drop(cache);
                    state.unsubscribe(&ids)
                }
                // Every handle dropped
                None => break,
            },
        };

        if let Some(frame) = outgoing {
            if ws_tx.send(frame).await.is_err() {
                tracing::warn!("Market feed connection closed, stopping");
                break;
            }
        }
    }
}

/// Store updates for subscribed tokens, ignoring out-of-order ones
async fn apply_updates(prices: &PriceCache, state: &FeedState, updates: Vec<PriceUpdate>) {
    if updates.is_empty() {
        return;
    }
    let mut cache = prices.write().await;
    for update in updates {
        if !state.is_subscribed(&update.token_id) {
            continue;
        }
        let newer = cache
            .get(&update.token_id)
            .map_or(true, |old| update.timestamp >= old.timestamp);
        if newer {
            cache.insert(
                update.token_id,
                TokenPrice {
                    price: update.price,
                    timestamp: update.timestamp,
                },
            );
        }
    }
}
