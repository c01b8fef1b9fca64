//! Position lifecycle engine
//!
//! One [`Engine`] owns every piece of mutable trading state: the position
//! table, the risk manager, exit timers and statistics. Each cycle fetches
//! live markets and hands them to the [`MarketDispatcher`]; every market
//! task runs exits for its positions first, then tries entries.

mod dispatcher;
mod entry;
mod exit;

pub use dispatcher::{CycleReport, MarketDispatcher, MarketProcessor};

use crate::advisory::{AdvisorPanel, TradeOutcome};
use crate::config::Config;
use crate::exchange::{BalanceAsset, ExchangeApi};
use crate::execution::OrderExecutor;
use crate::exit::{ExitReason, ExitRules, ExitTimers};
use crate::feed::{PriceSource, ReferencePriceTracker};
use crate::market::{MarketFeed, MarketSnapshot};
use crate::orderbook::{BookSource, OrderBookAnalyzer};
use crate::position::{Position, PositionBook, PositionStore, PurgeReason};
use crate::risk::{PortfolioRiskManager, RiskSnapshot};
use crate::strategy::{DecisionOracle, EntryGate, FlashDetector, LatencySignal, StrategyKind};
use crate::telemetry::{self, GaugeMetric, LatencyMetric};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// Collaborators the engine is built from
pub struct EngineParts {
    pub config: Config,
    pub markets: Arc<dyn MarketFeed>,
    pub exchange: Arc<dyn ExchangeApi>,
    pub books: Arc<dyn BookSource>,
    pub prices: Arc<dyn PriceSource>,
    pub reference: Option<Arc<ReferencePriceTracker>>,
    pub latency: Option<Arc<dyn LatencySignal>>,
    pub oracle: Option<Arc<dyn DecisionOracle>>,
    pub advisors: AdvisorPanel,
}

/// Running totals since start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub cycles: u64,
    pub entries: BTreeMap<&'static str, u64>,
    pub exits: BTreeMap<&'static str, u64>,
    pub blocked_entries: u64,
    pub failed_orders: u64,
    pub stuck_exits: u64,
    pub task_failures: u64,
}

impl EngineStats {
    fn log(&self, open_positions: usize, risk: &RiskSnapshot) {
        tracing::info!(
            cycles = self.cycles,
            entries = ?self.entries,
            exits = ?self.exits,
            blocked = self.blocked_entries,
            failed_orders = self.failed_orders,
            stuck_exits = self.stuck_exits,
            task_failures = self.task_failures,
            open_positions,
            capital = %risk.capital,
            exposure = %risk.total_exposure,
            daily_pnl = %risk.daily_pnl,
            "Engine stats"
        );
    }
}

/// What startup recovery found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub restored: usize,
    pub purged: usize,
}

pub struct Engine {
    config: Config,
    markets: Arc<dyn MarketFeed>,
    exchange: Arc<dyn ExchangeApi>,
    prices: Arc<dyn PriceSource>,
    reference: Option<Arc<ReferencePriceTracker>>,
    latency: Option<Arc<dyn LatencySignal>>,
    oracle: Option<Arc<dyn DecisionOracle>>,
    advisors: AdvisorPanel,
    analyzer: Arc<OrderBookAnalyzer>,
    executor: OrderExecutor,
    gate: EntryGate,
    exit_rules: ExitRules,
    flash: FlashDetector,
    dispatcher: MarketDispatcher,
    store: PositionStore,
    book: Mutex<PositionBook>,
    risk: Mutex<PortfolioRiskManager>,
    timers: Mutex<ExitTimers>,
    stats: Mutex<EngineStats>,
    dirty: AtomicBool,
}

impl Engine {
    pub fn new(parts: EngineParts, now: DateTime<Utc>) -> Self {
        let EngineParts {
            config,
            markets,
            exchange,
            books,
            prices,
            reference,
            latency,
            oracle,
            advisors,
        } = parts;

        let analyzer = Arc::new(OrderBookAnalyzer::new(books, config.orderbook.clone()));
        let executor = OrderExecutor::new(Arc::clone(&exchange), config.execution.clone());
        let gate = EntryGate::new(
            Arc::clone(&analyzer),
            advisors.clone(),
            config.strategy.clone(),
            config.engine.max_daily_trades,
        );
        let flash = FlashDetector::new(
            config.strategy.flash_threshold,
            Duration::seconds(config.strategy.flash_window_secs),
        );
        let store = PositionStore::new(
            config.persistence.positions_path.clone(),
            Duration::seconds(config.persistence.stale_after_secs),
        );

        Self {
            exit_rules: ExitRules::new(config.exit.clone()),
            dispatcher: MarketDispatcher::new(config.engine.batch_size),
            book: Mutex::new(PositionBook::new(
                config.engine.max_positions,
                config.engine.max_positions_per_asset,
            )),
            risk: Mutex::new(PortfolioRiskManager::new(&config.risk, now)),
            timers: Mutex::new(ExitTimers::new()),
            stats: Mutex::new(EngineStats::default()),
            dirty: AtomicBool::new(false),
            markets,
            exchange,
            prices,
            reference,
            latency,
            oracle,
            advisors,
            analyzer,
            executor,
            gate,
            flash,
            store,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.book.lock().await.all()
    }

    pub async fn risk_snapshot(&self) -> RiskSnapshot {
        self.risk.lock().await.snapshot()
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.lock().await.clone()
    }

    /// Reload persisted positions, report purged ones as synthetic losses,
    /// rebuild the risk view and resubscribe prices
    pub async fn recover(&self, now: DateTime<Utc>) -> anyhow::Result<RecoveryReport> {
        let loaded = self.store.load(now).await?;
        let report = RecoveryReport {
            restored: loaded.kept.len(),
            purged: loaded.purged.len(),
        };

        for (position, reason) in &loaded.purged {
            tracing::warn!(
                token_id = %position.token_id,
                market = %position.market_id,
                reason = reason.as_str(),
                "Purged persisted position"
            );
            let label = match reason {
                PurgeReason::Fixture => "purged_fixture",
                PurgeReason::Stale => "purged_stale",
            };
            self.advisors.record(synthetic_loss(position, label, now));
        }

        let tokens: Vec<String> = loaded.kept.iter().map(|p| p.token_id.clone()).collect();
        let collateral = self.exchange.get_balance(&BalanceAsset::Collateral).await;
        {
            let mut book = self.book.lock().await;
            for position in loaded.kept {
                book.restore(position);
            }
            let all = book.all();
            let exposure: Decimal = all.iter().map(Position::cost_basis).sum();
            let mut risk = self.risk.lock().await;
            risk.reconcile(&all);
            match collateral {
                Ok(collateral) => risk.sync_capital(collateral + exposure),
                Err(e) => tracing::warn!(error = %e, "Collateral unavailable, keeping configured capital"),
            }
        }

        if !tokens.is_empty() {
            self.prices.subscribe(&tokens).await;
        }
        if report.purged > 0 {
            self.dirty.store(true, Ordering::Relaxed);
            self.persist().await;
        }

        tracing::info!(
            restored = report.restored,
            purged = report.purged,
            path = %self.store.path().display(),
            "Position recovery complete"
        );
        Ok(report)
    }

    /// Write the position table if it changed since the last save
    pub async fn persist(&self) {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return;
        }
        let positions = self.book.lock().await.all();
        if let Err(e) = self.store.save(&positions).await {
            self.dirty.store(true, Ordering::Relaxed);
            tracing::error!(error = %e, "Failed to persist positions");
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// One full scan: fetch markets, dispatch, sweep positions on markets
    /// that are no longer listed, persist
    pub async fn run_cycle(self: &Arc<Self>, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        self.risk.lock().await.roll_day(now);

        let fetch_started = Instant::now();
        let fetched = self.markets.fetch_live_markets(None).await;
        telemetry::record_latency(LatencyMetric::MarketFetch, fetch_started.elapsed());
        let markets = match fetched {
            Ok(markets) => markets,
            Err(e) => {
                tracing::warn!(error = %e, "Market fetch failed, running exits only");
                Vec::new()
            }
        };
        telemetry::set_gauge(GaugeMetric::ActiveMarkets, markets.len() as f64);
        self.flash.retain_markets(&markets).await;

        let report = self.dispatcher.run_cycle(self, &markets, now).await;
        self.sweep_unlisted(&markets, now).await;
        self.persist().await;

        let open = self.book.lock().await.len();
        telemetry::set_gauge(GaugeMetric::OpenPositions, open as f64);
        telemetry::record_latency(LatencyMetric::Cycle, started.elapsed());

        let mut stats = self.stats.lock().await;
        stats.cycles += 1;
        stats.task_failures += report.failed as u64;
        let interval = self.config.engine.stats_log_interval.max(1);
        if stats.cycles % interval == 0 {
            let snapshot = self.risk.lock().await.snapshot();
            stats.log(open, &snapshot);
        }
        report
    }

    /// Positions whose market is not among the live snapshots still get
    /// their exit pass every cycle
    async fn sweep_unlisted(&self, markets: &[MarketSnapshot], now: DateTime<Utc>) {
        let live: HashSet<&str> = markets.iter().map(|m| m.market_id.as_str()).collect();
        let unlisted: Vec<Position> = self
            .book
            .lock()
            .await
            .all()
            .into_iter()
            .filter(|p| !live.contains(p.market_id.as_str()))
            .collect();

        for position in unlisted {
            self.evaluate_exit(position, None, now).await;
        }

        let book = self.book.lock().await;
        self.timers.lock().await.retain(|token| book.contains(token));
    }

    /// Cycle until `shutdown` resolves, then persist once more
    pub async fn run<F>(self: Arc<Self>, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.engine.cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            dry_run = self.config.engine.dry_run,
            batch_size = self.dispatcher.batch_size(),
            interval_ms = self.config.engine.cycle_interval_ms,
            "Engine started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
            }
        }

        self.mark_dirty();
        self.persist().await;
        let stats = self.stats.lock().await.clone();
        let open = self.book.lock().await.len();
        let snapshot = self.risk.lock().await.snapshot();
        stats.log(open, &snapshot);
        Ok(())
    }

    /// Exits then entries for one market
    pub async fn process_market_at(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> anyhow::Result<()> {
        let own: Vec<Position> = self
            .book
            .lock()
            .await
            .for_asset(&market.asset)
            .into_iter()
            .filter(|p| p.market_id == market.market_id)
            .collect();
        for position in own {
            self.evaluate_exit(position, Some(market), now).await;
        }

        self.try_entries(market, now).await;
        Ok(())
    }

    async fn record_entry(&self, strategy: StrategyKind) {
        *self.stats.lock().await.entries.entry(strategy.as_str()).or_default() += 1;
        telemetry::increment(telemetry::CounterMetric::Entries, Some(strategy.as_str()));
    }

    async fn record_exit(&self, reason: ExitReason) {
        *self.stats.lock().await.exits.entry(reason.as_str()).or_default() += 1;
        telemetry::increment(telemetry::CounterMetric::Exits, Some(reason.as_str()));
    }
}

#[async_trait]
impl MarketProcessor for Engine {
    async fn process_market(&self, market: &MarketSnapshot, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.process_market_at(market, now).await
    }
}

/// Outcome for a position closed without a fill, booked at its full cost
fn synthetic_loss(position: &Position, reason: &str, now: DateTime<Utc>) -> TradeOutcome {
    TradeOutcome {
        token_id: position.token_id.clone(),
        market_id: position.market_id.clone(),
        asset: position.asset.clone(),
        strategy: position.strategy,
        side: position.side,
        entry_price: position.entry_price,
        exit_price: Decimal::ZERO,
        size: position.size,
        profit: -position.cost_basis(),
        exit_reason: reason.to_string(),
        opened_at: position.entry_time,
        closed_at: now,
        synthetic: true,
    }
}
