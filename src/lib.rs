//! poly-engine: position lifecycle engine for Polymarket 15-minute up/down markets
//!
//! This library provides the core components for:
//! - Market discovery via the Gamma API
//! - Realtime token prices from the Polymarket market channel
//! - Order book depth and liquidity analysis
//! - Entry strategies (flash reversal, latency, oracle, sum-to-one) behind a gate
//! - Exit state machine with prioritized rules
//! - Venue-compatible order execution
//! - Portfolio risk management with circuit breakers
//! - Crash-safe position persistence
//! - Logging and Prometheus metrics

pub mod advisory;
pub mod cli;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod execution;
pub mod exit;
pub mod feed;
pub mod market;
pub mod orderbook;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod telemetry;
pub mod ws;
