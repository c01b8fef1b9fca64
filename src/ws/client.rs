//! WebSocket client with automatic reconnection

use super::types::{Backoff, WsConfig, WsError, WsMessage};
use crate::telemetry::{self, CounterMetric};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// How a single connection ended without an error
enum StreamEnd {
    /// Our side went away; stop for good
    Shutdown,
    /// The server closed the connection; reconnect
    Closed,
}

/// Reusable WebSocket client with automatic reconnection and ping/pong handling
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return a receiver for messages
    pub fn connect(&self) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx, None).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        rx
    }

    /// Connect and return both a receiver and a sender for bidirectional communication
    ///
    /// Dropping the sender closes the connection for good.
    pub fn connect_bidirectional(&self) -> (mpsc::Receiver<WsMessage>, mpsc::Sender<String>) {
        let (msg_tx, msg_rx) = mpsc::channel(1024);
        let (send_tx, send_rx) = mpsc::channel(256);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, msg_tx, Some(send_rx)).await {
                tracing::error!(error = %e, "WebSocket bidirectional loop failed");
            }
        });

        (msg_rx, send_tx)
    }

    /// Run the connection loop with automatic reconnection
    ///
    /// Every terminal event (close frame, stream end, error) leads to a
    /// reconnect after the backoff delay. The backoff resets on each
    /// successful handshake.
    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
        mut send_rx: Option<mpsc::Receiver<String>>,
    ) -> Result<(), WsError> {
        let mut backoff = config.backoff();

        loop {
            let outcome = Self::connect_and_stream(&config, &tx, send_rx.as_mut(), &mut backoff).await;

            let reason = match outcome {
                Ok(StreamEnd::Shutdown) => {
                    tracing::info!(url = %config.url, "WebSocket closed by client");
                    let _ = tx.send(WsMessage::Terminated).await;
                    return Ok(());
                }
                Ok(StreamEnd::Closed) => "closed by server".to_string(),
                Err(e) => e.to_string(),
            };

            let _ = tx.send(WsMessage::Disconnected).await;

            if tx.is_closed() {
                tracing::info!("Receiver dropped, stopping reconnection");
                return Ok(());
            }

            let delay = backoff.record_failure();
            let attempt = backoff.failures();
            telemetry::increment(CounterMetric::FeedReconnects, None);

            if config.max_reconnect_attempts > 0 && attempt > config.max_reconnect_attempts {
                tracing::error!(url = %config.url, attempt, "Max reconnection attempts reached");
                let _ = tx.send(WsMessage::Terminated).await;
                return Err(WsError::MaxReconnectsExceeded);
            }

            tracing::warn!(
                url = %config.url,
                reason = %reason,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "WebSocket connection lost, reconnecting"
            );

            let _ = tx.send(WsMessage::Reconnecting { attempt, delay }).await;
            sleep(delay).await;
        }
    }

    /// Connect to WebSocket and stream messages until the connection ends
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        mut send_rx: Option<&mut mpsc::Receiver<String>>,
        backoff: &mut Backoff,
    ) -> Result<StreamEnd, WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        backoff.reset();
        tracing::info!(url = %config.url, "WebSocket connected");

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(StreamEnd::Shutdown);
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        ping_interval.tick().await;

        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                received = timeout(config.receive_timeout, read.next()) => {
                    let msg = match received {
                        Ok(msg) => msg,
                        Err(_) => {
                            // Idle but not dead; the ping below keeps the socket honest
                            tracing::debug!(url = %config.url, "Receive timeout, connection idle");
                            write.send(Message::Ping(vec![])).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                            continue;
                        }
                    };

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                return Ok(StreamEnd::Shutdown);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                return Ok(StreamEnd::Shutdown);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Received close frame");
                            return Ok(StreamEnd::Closed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                    }
                }

                msg = async {
                    match send_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match msg {
                        Some(text) => {
                            write.send(Message::Text(text)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(StreamEnd::Shutdown);
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ws_client_with_config() {
        let config = WsConfig::new("wss://test.com")
            .max_reconnects(5)
            .heartbeat(Duration::from_secs(15));

        let client = WsClient::new(config);
        assert_eq!(client.url(), "wss://test.com");
        assert_eq!(client.config.max_reconnect_attempts, 5);
        assert_eq!(client.config.receive_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_ws_client_gives_up_after_max_attempts() {
        let client = WsClient::new(
            WsConfig::new("ws://127.0.0.1:1")
                .max_reconnects(2)
                .initial_delay(Duration::from_millis(5))
                .max_delay(Duration::from_millis(20)),
        );

        let mut rx = client.connect();
        let mut delays = Vec::new();
        let mut terminated = false;

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(msg) = rx.recv().await {
                match msg {
                    WsMessage::Reconnecting { delay, .. } => delays.push(delay),
                    WsMessage::Terminated => {
                        terminated = true;
                        break;
                    }
                    _ => {}
                }
            }
        })
        .await;

        assert!(result.is_ok(), "test timed out");
        assert!(terminated);
        assert_eq!(
            delays,
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
    }
}
