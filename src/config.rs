//! Configuration types for poly-engine
//!
//! Every section and field carries a serde default, so a partial (or empty)
//! TOML file yields a usable configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub orderbook: OrderBookConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Dispatcher and position-table limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Simulate orders against the paper exchange
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// USD amount committed per entry
    #[serde(default = "default_trade_size")]
    pub trade_size: Decimal,

    /// Maximum concurrent open positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,

    /// Maximum concurrent open positions on one asset
    #[serde(default = "default_max_positions_per_asset")]
    pub max_positions_per_asset: usize,

    /// Maximum entries per UTC day
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,

    /// Markets processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between scan cycles (milliseconds)
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Log engine statistics every N cycles
    #[serde(default = "default_stats_log_interval")]
    pub stats_log_interval: u64,
}

fn default_true() -> bool {
    true
}
fn default_trade_size() -> Decimal {
    dec!(5)
}
fn default_max_positions() -> usize {
    3
}
fn default_max_positions_per_asset() -> usize {
    2
}
fn default_max_daily_trades() -> u32 {
    50
}
fn default_batch_size() -> usize {
    10
}
fn default_cycle_interval_ms() -> u64 {
    1_000
}
fn default_stats_log_interval() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            trade_size: default_trade_size(),
            max_positions: default_max_positions(),
            max_positions_per_asset: default_max_positions_per_asset(),
            max_daily_trades: default_max_daily_trades(),
            batch_size: default_batch_size(),
            cycle_interval_ms: default_cycle_interval_ms(),
            stats_log_interval: default_stats_log_interval(),
        }
    }
}

impl EngineConfig {
    /// Pause between scan cycles
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}

/// Entry strategy thresholds and pre-trade checks
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Minimum seconds to expiry before any entry
    #[serde(default = "default_min_entry_time_to_expiry_secs")]
    pub min_time_to_expiry_secs: i64,

    /// Maximum USD cost basis open on one asset
    #[serde(default = "default_max_asset_exposure")]
    pub max_asset_exposure: Decimal,

    /// Book depth required as a multiple of intended size
    #[serde(default = "default_liquidity_multiple")]
    pub liquidity_multiple: Decimal,

    /// Maximum estimated slippage versus mid for an entry
    #[serde(default = "default_max_entry_slippage")]
    pub max_slippage: Decimal,

    #[serde(default = "default_true")]
    pub flash_enabled: bool,
    /// Fractional drop on one side that counts as a flash move
    #[serde(default = "default_flash_threshold")]
    pub flash_threshold: Decimal,
    #[serde(default = "default_flash_window_secs")]
    pub flash_window_secs: i64,

    #[serde(default = "default_true")]
    pub latency_enabled: bool,
    /// Minimum signal confidence (0-100)
    #[serde(default = "default_latency_min_confidence")]
    pub latency_min_confidence: Decimal,
    /// Minimum fractional reference move on the shortest window
    #[serde(default = "default_latency_min_move")]
    pub latency_min_move: Decimal,
    /// Windows that must agree in direction (seconds)
    #[serde(default = "default_latency_windows")]
    pub latency_windows_secs: Vec<i64>,

    #[serde(default = "default_true")]
    pub oracle_enabled: bool,
    /// Minimum oracle confidence (0-100)
    #[serde(default = "default_oracle_min_confidence")]
    pub oracle_min_confidence: Decimal,
    /// Reference momentum an oracle entry must exceed in its direction
    #[serde(default = "default_oracle_min_momentum")]
    pub oracle_min_momentum: Decimal,
    #[serde(default = "default_oracle_momentum_window_secs")]
    pub oracle_momentum_window_secs: i64,

    #[serde(default = "default_true")]
    pub sum_to_one_enabled: bool,
    /// Upper bound on ask_up + ask_down + fees
    #[serde(default = "default_sum_to_one_threshold")]
    pub sum_to_one_threshold: Decimal,
    /// Flat fee charged against one up/down pair
    #[serde(default = "default_sum_to_one_fee")]
    pub sum_to_one_fee: Decimal,
    /// Minimum profit per pair after fees
    #[serde(default = "default_sum_to_one_min_profit")]
    pub sum_to_one_min_profit: Decimal,
}

fn default_min_entry_time_to_expiry_secs() -> i64 {
    180
}
fn default_max_asset_exposure() -> Decimal {
    dec!(15)
}
fn default_liquidity_multiple() -> Decimal {
    dec!(2)
}
fn default_max_entry_slippage() -> Decimal {
    dec!(0.05)
}
fn default_flash_threshold() -> Decimal {
    dec!(0.15)
}
fn default_flash_window_secs() -> i64 {
    3
}
fn default_latency_min_confidence() -> Decimal {
    dec!(60)
}
fn default_latency_min_move() -> Decimal {
    dec!(0.001)
}
fn default_latency_windows() -> Vec<i64> {
    vec![10, 30, 60]
}
fn default_oracle_min_confidence() -> Decimal {
    dec!(60)
}
fn default_oracle_min_momentum() -> Decimal {
    dec!(0.0005)
}
fn default_oracle_momentum_window_secs() -> i64 {
    60
}
fn default_sum_to_one_threshold() -> Decimal {
    dec!(1.01)
}
fn default_sum_to_one_fee() -> Decimal {
    dec!(0.03)
}
fn default_sum_to_one_min_profit() -> Decimal {
    dec!(0.005)
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_time_to_expiry_secs: default_min_entry_time_to_expiry_secs(),
            max_asset_exposure: default_max_asset_exposure(),
            liquidity_multiple: default_liquidity_multiple(),
            max_slippage: default_max_entry_slippage(),
            flash_enabled: true,
            flash_threshold: default_flash_threshold(),
            flash_window_secs: default_flash_window_secs(),
            latency_enabled: true,
            latency_min_confidence: default_latency_min_confidence(),
            latency_min_move: default_latency_min_move(),
            latency_windows_secs: default_latency_windows(),
            oracle_enabled: true,
            oracle_min_confidence: default_oracle_min_confidence(),
            oracle_min_momentum: default_oracle_min_momentum(),
            oracle_momentum_window_secs: default_oracle_momentum_window_secs(),
            sum_to_one_enabled: true,
            sum_to_one_threshold: default_sum_to_one_threshold(),
            sum_to_one_fee: default_sum_to_one_fee(),
            sum_to_one_min_profit: default_sum_to_one_min_profit(),
        }
    }
}

/// Exit state machine thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExitConfig {
    /// Force close when fewer seconds than this remain before expiry
    #[serde(default = "default_closing_floor_secs")]
    pub market_closing_secs: i64,

    /// Force close positions older than this (seconds)
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: i64,

    /// Take profit at this unrealized gain
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,

    /// Stop loss at this unrealized loss
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    /// Stop-loss closes failing longer than this are force-removed (seconds)
    #[serde(default = "default_stuck_exit_grace_secs")]
    pub stuck_exit_grace_secs: i64,

    /// Positions without a price longer than this are orphaned (seconds)
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: i64,

    /// Trailing stop retracement band
    #[serde(default = "default_trailing_stop_min")]
    pub trailing_stop_min: Decimal,
    #[serde(default = "default_trailing_stop_max")]
    pub trailing_stop_max: Decimal,

    /// Trailing stop activation band
    #[serde(default = "default_trailing_activation_min")]
    pub trailing_activation_min: Decimal,
    #[serde(default = "default_trailing_activation_max")]
    pub trailing_activation_max: Decimal,

    /// Reference volatility window used to scale the activation threshold
    #[serde(default = "default_volatility_window_secs")]
    pub volatility_window_secs: i64,
}

fn default_closing_floor_secs() -> i64 {
    120
}
fn default_max_hold_secs() -> i64 {
    780
}
fn default_take_profit_pct() -> Decimal {
    dec!(0.02)
}
fn default_stop_loss_pct() -> Decimal {
    dec!(0.03)
}
fn default_stuck_exit_grace_secs() -> i64 {
    60
}
fn default_orphan_grace_secs() -> i64 {
    120
}
fn default_trailing_stop_min() -> Decimal {
    dec!(0.01)
}
fn default_trailing_stop_max() -> Decimal {
    dec!(0.03)
}
fn default_trailing_activation_min() -> Decimal {
    dec!(0.003)
}
fn default_trailing_activation_max() -> Decimal {
    dec!(0.010)
}
fn default_volatility_window_secs() -> i64 {
    900
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            market_closing_secs: default_closing_floor_secs(),
            max_hold_secs: default_max_hold_secs(),
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            stuck_exit_grace_secs: default_stuck_exit_grace_secs(),
            orphan_grace_secs: default_orphan_grace_secs(),
            trailing_stop_min: default_trailing_stop_min(),
            trailing_stop_max: default_trailing_stop_max(),
            trailing_activation_min: default_trailing_activation_min(),
            trailing_activation_max: default_trailing_activation_max(),
            volatility_window_secs: default_volatility_window_secs(),
        }
    }
}

/// Portfolio risk limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Starting account capital in USD
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,

    /// Deployed/capital ceiling for accounts of $20 and above
    #[serde(default = "default_max_portfolio_heat")]
    pub max_portfolio_heat: Decimal,

    /// Daily loss fraction that halts trading
    #[serde(default = "default_max_daily_drawdown")]
    pub max_daily_drawdown: Decimal,

    /// Largest single position as a fraction of capital
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,

    /// Largest exposure on one market as a fraction of capital
    #[serde(default = "default_max_market_exposure")]
    pub max_market_exposure: Decimal,

    /// Losses in a row that halt trading
    #[serde(default = "default_consecutive_loss_limit")]
    pub consecutive_loss_limit: u32,

    /// Halt duration after a drawdown breach (seconds)
    #[serde(default = "default_drawdown_halt_secs")]
    pub drawdown_halt_secs: i64,

    /// Halt duration after a loss streak (seconds)
    #[serde(default = "default_loss_streak_halt_secs")]
    pub loss_streak_halt_secs: i64,

    /// Capital below which nothing trades
    #[serde(default = "default_min_capital")]
    pub min_capital: Decimal,

    /// Per-market exposure check applies from this capital upward
    #[serde(default = "default_market_exposure_floor")]
    pub market_exposure_floor: Decimal,

    /// Largest proposed order as a fraction of capital
    #[serde(default = "default_max_capital_fraction")]
    pub max_capital_fraction: Decimal,

    /// Venue minimum order value (USD)
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,
}

fn default_initial_capital() -> Decimal {
    dec!(100)
}
fn default_max_portfolio_heat() -> Decimal {
    dec!(0.30)
}
fn default_max_daily_drawdown() -> Decimal {
    dec!(0.10)
}
fn default_max_position_pct() -> Decimal {
    dec!(0.05)
}
fn default_max_market_exposure() -> Decimal {
    dec!(0.10)
}
fn default_consecutive_loss_limit() -> u32 {
    5
}
fn default_drawdown_halt_secs() -> i64 {
    4 * 3600
}
fn default_loss_streak_halt_secs() -> i64 {
    3600
}
fn default_min_capital() -> Decimal {
    dec!(1)
}
fn default_market_exposure_floor() -> Decimal {
    dec!(20)
}
fn default_max_capital_fraction() -> Decimal {
    dec!(0.95)
}
fn default_min_order_value() -> Decimal {
    dec!(1.00)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            max_portfolio_heat: default_max_portfolio_heat(),
            max_daily_drawdown: default_max_daily_drawdown(),
            max_position_pct: default_max_position_pct(),
            max_market_exposure: default_max_market_exposure(),
            consecutive_loss_limit: default_consecutive_loss_limit(),
            drawdown_halt_secs: default_drawdown_halt_secs(),
            loss_streak_halt_secs: default_loss_streak_halt_secs(),
            min_capital: default_min_capital(),
            market_exposure_floor: default_market_exposure_floor(),
            max_capital_fraction: default_max_capital_fraction(),
            min_order_value: default_min_order_value(),
        }
    }
}

/// Order submission rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Venue minimum order value (USD)
    #[serde(default = "default_min_order_value")]
    pub min_order_value: Decimal,

    /// Venue minimum share count
    #[serde(default = "default_min_shares")]
    pub min_shares: Decimal,

    /// Largest allowed upsizing of a BUY, as a multiple of the requested size
    #[serde(default = "default_max_upsize_factor")]
    pub max_upsize_factor: Decimal,

    /// Collateral required beyond the order value
    #[serde(default = "default_balance_buffer_pct")]
    pub balance_buffer_pct: Decimal,

    /// SELL size multiplier when the held balance cannot be queried
    #[serde(default = "default_unknown_balance_factor")]
    pub unknown_balance_factor: Decimal,

    /// SELL size may exceed the tracked size by this fraction
    #[serde(default = "default_sell_tolerance")]
    pub sell_tolerance: Decimal,

    /// Size fractions tried after balance/allowance rejections
    #[serde(default = "default_sell_fractions")]
    pub sell_fractions: Vec<Decimal>,

    /// Fee rate charged by the paper exchange
    #[serde(default)]
    pub paper_fee_rate: Decimal,

    /// Read-only CLOB endpoint for order books
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
}

fn default_min_shares() -> Decimal {
    dec!(5)
}
fn default_max_upsize_factor() -> Decimal {
    dec!(5)
}
fn default_balance_buffer_pct() -> Decimal {
    dec!(0.02)
}
fn default_unknown_balance_factor() -> Decimal {
    dec!(0.98)
}
fn default_sell_tolerance() -> Decimal {
    dec!(0.01)
}
fn default_sell_fractions() -> Vec<Decimal> {
    vec![dec!(1.0), dec!(0.5), dec!(0.25), dec!(0.10)]
}
fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            min_order_value: default_min_order_value(),
            min_shares: default_min_shares(),
            max_upsize_factor: default_max_upsize_factor(),
            balance_buffer_pct: default_balance_buffer_pct(),
            unknown_balance_factor: default_unknown_balance_factor(),
            sell_tolerance: default_sell_tolerance(),
            sell_fractions: default_sell_fractions(),
            paper_fee_rate: Decimal::ZERO,
            clob_url: default_clob_url(),
        }
    }
}

/// Realtime and reference price feeds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_market_ws_url")]
    pub ws_url: String,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Heartbeat interval; the receive timeout is twice this
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Cached prices older than this are ignored (seconds)
    #[serde(default = "default_max_price_age_secs")]
    pub max_price_age_secs: i64,

    /// Stream reference prices from Binance
    #[serde(default = "default_true")]
    pub reference_enabled: bool,

    #[serde(default = "default_reference_ws_url")]
    pub reference_ws_url: String,

    /// History kept per reference asset (seconds)
    #[serde(default = "default_reference_history_secs")]
    pub reference_history_secs: i64,
}

fn default_market_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    60_000
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_max_price_age_secs() -> i64 {
    30
}
fn default_reference_ws_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}
fn default_reference_history_secs() -> i64 {
    900
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_market_ws_url(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            max_price_age_secs: default_max_price_age_secs(),
            reference_enabled: true,
            reference_ws_url: default_reference_ws_url(),
            reference_history_secs: default_reference_history_secs(),
        }
    }
}

impl FeedConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Order book analyzer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderBookConfig {
    #[serde(default = "default_book_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Levels kept per side
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,

    /// Minimum liquidity score (0-100) for an entry
    #[serde(default = "default_min_liquidity_score")]
    pub min_liquidity_score: Decimal,
}

fn default_book_ttl_ms() -> u64 {
    5_000
}
fn default_depth_levels() -> usize {
    10
}
fn default_min_liquidity_score() -> Decimal {
    dec!(20)
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_book_ttl_ms(),
            depth_levels: default_depth_levels(),
            min_liquidity_score: default_min_liquidity_score(),
        }
    }
}

/// Market discovery settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,

    /// Assets scanned each cycle
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    #[serde(default = "default_market_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_assets() -> Vec<String> {
    ["btc", "eth", "sol", "xrp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_market_cache_ttl_ms() -> u64 {
    2_000
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            assets: default_assets(),
            cache_ttl_ms: default_market_cache_ttl_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Crash-recovery state
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_positions_path")]
    pub positions_path: PathBuf,

    /// Records older than this are purged on load (seconds)
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,

    /// Optional JSON-lines trade journal
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

fn default_positions_path() -> PathBuf {
    PathBuf::from("data/positions.json")
}
fn default_stale_after_secs() -> i64 {
    24 * 3600
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            positions_path: default_positions_path(),
            stale_after_secs: default_stale_after_secs(),
            journal_path: None,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Prometheus listener port (0 disables the exporter)
    #[serde(default)]
    pub metrics_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [engine]
            dry_run = false
            trade_size = 7.5
            max_positions = 4

            [strategy]
            sum_to_one_threshold = 0.99

            [exit]
            take_profit_pct = 0.05
            stop_loss_pct = 0.04

            [risk]
            initial_capital = 250.0

            [telemetry]
            metrics_port = 9090
            log_level = "debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.engine.dry_run);
        assert_eq!(config.engine.trade_size, dec!(7.5));
        assert_eq!(config.engine.max_positions, 4);
        assert_eq!(config.strategy.sum_to_one_threshold, dec!(0.99));
        assert_eq!(config.exit.take_profit_pct, dec!(0.05));
        assert_eq!(config.risk.initial_capital, dec!(250.0));
        assert_eq!(config.telemetry.metrics_port, 9090);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.engine.dry_run);
        assert_eq!(config.engine.batch_size, 10);
        assert_eq!(config.orderbook.cache_ttl_ms, 5_000);
        assert_eq!(config.market.cache_ttl_ms, 2_000);
        assert_eq!(config.market.assets.len(), 4);
        assert_eq!(
            config.execution.sell_fractions,
            vec![dec!(1.0), dec!(0.5), dec!(0.25), dec!(0.10)]
        );
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let toml = r#"
            [exit]
            max_hold_secs = 600
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.exit.max_hold_secs, 600);
        assert_eq!(config.exit.market_closing_secs, 120);
        assert_eq!(config.exit.trailing_stop_min, dec!(0.01));
    }

    #[test]
    fn test_feed_durations() {
        let feed = FeedConfig::default();
        assert_eq!(feed.initial_backoff(), Duration::from_secs(1));
        assert_eq!(feed.max_backoff(), Duration::from_secs(60));
        assert_eq!(feed.heartbeat(), Duration::from_secs(30));
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config.toml.example")).unwrap();
        assert_eq!(config.engine.batch_size, 10);
        assert_eq!(config.risk.consecutive_loss_limit, 5);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }
}
