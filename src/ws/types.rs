//! WebSocket types, configuration and reconnect backoff

use std::time::Duration;
use thiserror::Error;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum consecutive failed attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnection attempt
    pub initial_reconnect_delay: Duration,
    /// Upper bound on the reconnection delay
    pub max_reconnect_delay: Duration,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
    /// How long a read may wait before the connection counts as idle
    pub receive_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(60),
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set maximum consecutive reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set initial reconnection delay
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_reconnect_delay = d;
        self
    }

    /// Set maximum reconnection delay
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_reconnect_delay = d;
        self
    }

    /// Set the heartbeat: pings every `d`, idle receive timeout at `2 * d`
    pub fn heartbeat(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self.receive_timeout = d * 2;
        self
    }

    /// Backoff state for this configuration
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_reconnect_delay, self.max_reconnect_delay)
    }
}

/// Exponential reconnect backoff
///
/// After `n` consecutive failures the delay is `min(initial * 2^n, max)`.
/// A successful connection resets it to `initial`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            failures: 0,
        }
    }

    /// Current delay
    pub fn delay(&self) -> Duration {
        2u32.checked_pow(self.failures)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Record a failed attempt and return the delay to wait before retrying
    pub fn record_failure(&mut self) -> Duration {
        let wait = self.delay();
        self.failures = self.failures.saturating_add(1);
        wait
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// WebSocket message types
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
    /// Connection established
    Connected,
    /// Connection lost; a reconnect follows
    Disconnected,
    /// Waiting `delay` before reconnection attempt `attempt`
    Reconnecting { attempt: u32, delay: Duration },
    /// The client gave up or was shut down; no further messages
    Terminated,
}

/// WebSocket errors
#[derive(Debug, Clone, Error)]
pub enum WsError {
    /// Connection failed or dropped
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Maximum reconnection attempts exceeded
    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,
    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),
}
