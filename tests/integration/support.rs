//! Shared fakes and fixtures

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use poly_engine::advisory::AdvisorPanel;
use poly_engine::config::Config;
use poly_engine::engine::{Engine, EngineParts};
use poly_engine::exchange::{
    BalanceAsset, ExchangeApi, ExchangeError, OrderOptions, OrderSide, OrderSpec, PaperExchange,
    PostResponse, SignedOrder,
};
use poly_engine::orderbook::{BookSource, OrderBook};
use poly_engine::feed::{PriceSource, TokenPrice};
use poly_engine::market::{MarketFeed, MarketSnapshot, Outcome};
use poly_engine::position::{Position, PositionStore};
use poly_engine::strategy::StrategyKind;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::RwLock;

/// Market list served verbatim
#[derive(Default)]
pub struct FakeMarkets {
    markets: RwLock<Vec<MarketSnapshot>>,
}

impl FakeMarkets {
    pub async fn set(&self, markets: Vec<MarketSnapshot>) {
        *self.markets.write().await = markets;
    }
}

#[async_trait]
impl MarketFeed for FakeMarkets {
    async fn fetch_live_markets(
        &self,
        asset_filter: Option<&str>,
    ) -> anyhow::Result<Vec<MarketSnapshot>> {
        let markets = self.markets.read().await;
        Ok(markets
            .iter()
            .filter(|m| asset_filter.map_or(true, |a| m.asset.eq_ignore_ascii_case(a)))
            .cloned()
            .collect())
    }
}

/// Token prices set by the test, always fresh
#[derive(Default)]
pub struct FakePrices {
    prices: RwLock<HashMap<String, Decimal>>,
    subscribed: RwLock<HashSet<String>>,
}

impl FakePrices {
    pub async fn set(&self, token_id: &str, price: Decimal) {
        self.prices.write().await.insert(token_id.to_string(), price);
    }

    pub async fn is_subscribed(&self, token_id: &str) -> bool {
        self.subscribed.read().await.contains(token_id)
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn subscribe(&self, token_ids: &[String]) {
        self.subscribed.write().await.extend(token_ids.iter().cloned());
    }

    async fn unsubscribe(&self, token_ids: &[String]) {
        let mut subscribed = self.subscribed.write().await;
        for token in token_ids {
            subscribed.remove(token);
        }
    }

    async fn get_price(&self, token_id: &str) -> Option<TokenPrice> {
        self.prices.read().await.get(token_id).map(|price| TokenPrice {
            price: *price,
            timestamp: Utc::now(),
        })
    }
}

/// Paper venue that can be told to refuse every SELL
pub struct GatedVenue {
    pub paper: Arc<PaperExchange>,
    refuse_sells: AtomicBool,
}

impl GatedVenue {
    pub fn new(paper: Arc<PaperExchange>) -> Self {
        Self {
            paper,
            refuse_sells: AtomicBool::new(false),
        }
    }

    pub fn refuse_sells(&self, refuse: bool) {
        self.refuse_sells.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookSource for GatedVenue {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExchangeError> {
        self.paper.get_order_book(token_id).await
    }
}

#[async_trait]
impl ExchangeApi for GatedVenue {
    async fn create_order(
        &self,
        spec: &OrderSpec,
        options: &OrderOptions,
    ) -> Result<SignedOrder, ExchangeError> {
        self.paper.create_order(spec, options).await
    }

    async fn post_order(&self, order: &SignedOrder) -> Result<PostResponse, ExchangeError> {
        if order.spec.side == OrderSide::Sell && self.refuse_sells.load(Ordering::SeqCst) {
            return Err(ExchangeError::rejected("server busy"));
        }
        self.paper.post_order(order).await
    }

    async fn get_balance(&self, asset: &BalanceAsset) -> Result<Decimal, ExchangeError> {
        self.paper.get_balance(asset).await
    }

    async fn get_neg_risk(&self, token_id: &str) -> Result<Option<bool>, ExchangeError> {
        self.paper.get_neg_risk(token_id).await
    }
}

pub fn market(
    market_id: &str,
    up_price: Decimal,
    down_price: Decimal,
    expires_in: Duration,
    now: DateTime<Utc>,
) -> MarketSnapshot {
    MarketSnapshot {
        market_id: market_id.to_string(),
        asset: "BTC".to_string(),
        up_token_id: format!("{market_id}-up"),
        down_token_id: format!("{market_id}-down"),
        up_price,
        down_price,
        end_time: now + expires_in,
        neg_risk: false,
        tick_size: dec!(0.01),
    }
}

pub fn position(
    market: &MarketSnapshot,
    side: Outcome,
    entry_price: Decimal,
    size: Decimal,
    entry_time: DateTime<Utc>,
) -> Position {
    Position {
        token_id: market.token_for(side).to_string(),
        side,
        entry_price,
        size,
        entry_time,
        market_id: market.market_id.clone(),
        asset: market.asset.clone(),
        strategy: StrategyKind::Latency,
        peak_price: entry_price,
        neg_risk: false,
        confidence: dec!(60),
    }
}

/// Paper venue with no books, every strategy off, plenty of capital
pub fn config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.engine.dry_run = true;
    config.strategy.flash_enabled = false;
    config.strategy.latency_enabled = false;
    config.strategy.oracle_enabled = false;
    config.strategy.sum_to_one_enabled = false;
    config.risk.initial_capital = dec!(1000);
    config.persistence.positions_path = dir.path().join("positions.json");
    config
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub paper: Arc<PaperExchange>,
    pub venue: Arc<GatedVenue>,
    pub markets: Arc<FakeMarkets>,
    pub prices: Arc<FakePrices>,
    pub dir: TempDir,
}

impl Harness {
    /// Build an engine over `stored` positions, recovered as at startup
    pub async fn start(
        stored: Vec<Position>,
        now: DateTime<Utc>,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        configure(&mut config);

        let store = PositionStore::new(
            config.persistence.positions_path.clone(),
            Duration::seconds(config.persistence.stale_after_secs),
        );
        store.save(&stored).await.unwrap();

        let paper = Arc::new(PaperExchange::new(
            config.risk.initial_capital,
            config.execution.paper_fee_rate,
        ));
        for p in &stored {
            paper.credit_shares(&p.token_id, p.size).await;
        }
        let venue = Arc::new(GatedVenue::new(paper.clone()));
        let markets = Arc::new(FakeMarkets::default());
        let prices = Arc::new(FakePrices::default());

        let engine = Arc::new(Engine::new(
            EngineParts {
                config,
                markets: markets.clone(),
                exchange: venue.clone(),
                books: venue.clone(),
                prices: prices.clone(),
                reference: None,
                latency: None,
                oracle: None,
                advisors: AdvisorPanel::default(),
            },
            now,
        ));
        engine.recover(now).await.unwrap();

        Self {
            engine,
            paper,
            venue,
            markets,
            prices,
            dir,
        }
    }
}
