//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Gamma market discovery
    MarketFetch,
    /// CLOB order book fetch
    OrderBook,
    /// Order build and sign
    OrderCreate,
    /// Order submission
    OrderPost,
    /// One full dispatcher cycle
    Cycle,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current capital
    Capital,
    /// Deployed cost basis
    TotalExposure,
    /// Deployed / capital
    Heat,
    /// Open position count
    OpenPositions,
    /// Daily P&L
    DailyPnl,
    /// Realtime feed connection (1 connected, 0 not)
    FeedConnected,
    /// Markets in the last cycle
    ActiveMarkets,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Filled entries, labelled by strategy
    Entries,
    /// Closed positions, labelled by exit reason
    Exits,
    /// Failed orders, labelled by phase
    OrderFailures,
    /// Feed reconnect attempts
    FeedReconnects,
    /// Market tasks that returned an error or panicked
    TaskFailures,
}

fn latency_name(metric: LatencyMetric) -> &'static str {
    match metric {
        LatencyMetric::MarketFetch => "polyengine_market_fetch_latency_ms",
        LatencyMetric::OrderBook => "polyengine_orderbook_fetch_latency_ms",
        LatencyMetric::OrderCreate => "polyengine_order_create_latency_ms",
        LatencyMetric::OrderPost => "polyengine_order_post_latency_ms",
        LatencyMetric::Cycle => "polyengine_cycle_latency_ms",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::Capital => "polyengine_capital_usd",
        GaugeMetric::TotalExposure => "polyengine_total_exposure_usd",
        GaugeMetric::Heat => "polyengine_portfolio_heat",
        GaugeMetric::OpenPositions => "polyengine_open_positions",
        GaugeMetric::DailyPnl => "polyengine_daily_pnl_usd",
        GaugeMetric::FeedConnected => "polyengine_feed_connected",
        GaugeMetric::ActiveMarkets => "polyengine_active_markets",
    }
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::Entries => "polyengine_entries_total",
        CounterMetric::Exits => "polyengine_exits_total",
        CounterMetric::OrderFailures => "polyengine_order_failures_total",
        CounterMetric::FeedReconnects => "polyengine_feed_reconnects_total",
        CounterMetric::TaskFailures => "polyengine_task_failures_total",
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = latency_name(metric);
    metrics::histogram!(name).record(duration.as_secs_f64() * 1_000.0);
    tracing::trace!(metric = name, value_ms = duration.as_millis(), "Recording latency");
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(gauge_name(metric)).set(value);
}

/// Increment a counter, optionally with a single `kind` label
pub fn increment(metric: CounterMetric, kind: Option<&'static str>) {
    let name = counter_name(metric);
    match kind {
        Some(kind) => metrics::counter!(name, "kind" => kind).increment(1),
        None => metrics::counter!(name).increment(1),
    }
}
