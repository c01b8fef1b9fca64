//! Run command implementation

use crate::advisory::{Advisor, AdvisorPanel, JournalAdvisor};
use crate::config::Config;
use crate::engine::{Engine, EngineParts};
use crate::exchange::{ClobClient, ExchangeApi, PaperExchange};
use crate::feed::{BinanceFeed, PriceSource, RealtimePriceFeed, ReferencePriceTracker};
use crate::market::{CachedMarketFeed, GammaClient, GammaConfig, MarketFeed};
use crate::orderbook::BookSource;
use crate::strategy::{LatencySignal, MomentumLatencySignal};
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Force paper trading regardless of `engine.dry_run`
    #[arg(long)]
    pub paper: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        self.execute_with(config, None).await
    }

    /// Run with an externally supplied live order API
    ///
    /// Live mode refuses to start without one.
    pub async fn execute_with(
        &self,
        mut config: Config,
        signer: Option<Arc<dyn ExchangeApi>>,
    ) -> anyhow::Result<()> {
        if self.paper {
            config.engine.dry_run = true;
        }

        let timeout = Duration::from_secs(config.market.request_timeout_secs);
        let clob = Arc::new(ClobClient::new(config.execution.clob_url.clone(), timeout)?);

        let paper = config.engine.dry_run.then(|| {
            Arc::new(
                PaperExchange::new(config.risk.initial_capital, config.execution.paper_fee_rate)
                    .with_clob(Arc::clone(&clob)),
            )
        });
        let exchange: Arc<dyn ExchangeApi> = match (&paper, signer) {
            (Some(paper), _) => paper.clone(),
            (None, Some(signer)) => signer,
            (None, None) => anyhow::bail!(
                "live trading needs an order signer; set engine.dry_run = true or pass --paper"
            ),
        };

        let gamma = GammaClient::with_config(GammaConfig {
            base_url: config.market.gamma_url.clone(),
            timeout,
            assets: config.market.assets.clone(),
            lookahead: chrono::Duration::seconds(config.exit.market_closing_secs),
        })?;
        let markets: Arc<dyn MarketFeed> = Arc::new(CachedMarketFeed::new(
            Arc::new(gamma),
            Duration::from_millis(config.market.cache_ttl_ms),
        ));

        let (price_feed, feed_task) = RealtimePriceFeed::start(&config.feed);
        let prices: Arc<dyn PriceSource> = Arc::new(price_feed);

        let mut reference_task = None;
        let mut reference = None;
        let mut latency: Option<Arc<dyn LatencySignal>> = None;
        if config.feed.reference_enabled {
            let tracker = Arc::new(ReferencePriceTracker::new(chrono::Duration::seconds(
                config.feed.reference_history_secs,
            )));
            let binance = BinanceFeed::new(config.feed.reference_ws_url.clone(), &config.market.assets)
                .with_feed_config(&config.feed);
            reference_task = Some(tracker.spawn(Arc::new(binance)));
            latency = Some(Arc::new(MomentumLatencySignal::new(
                Arc::clone(&tracker),
                &config.strategy.latency_windows_secs,
                config.strategy.latency_min_move,
            )));
            reference = Some(tracker);
        }

        let mut advisors: Vec<Arc<dyn Advisor>> = Vec::new();
        if let Some(path) = &config.persistence.journal_path {
            let journal = JournalAdvisor::open(path)
                .await
                .with_context(|| format!("opening trade journal {}", path.display()))?;
            advisors.push(Arc::new(journal));
        }

        let books: Arc<dyn BookSource> = clob;
        let engine = Arc::new(Engine::new(
            EngineParts {
                config,
                markets,
                exchange,
                books,
                prices,
                reference,
                latency,
                oracle: None,
                advisors: AdvisorPanel::new(advisors),
            },
            Utc::now(),
        ));

        let recovered = engine.recover(Utc::now()).await?;
        if let Some(paper) = &paper {
            for position in engine.positions().await {
                paper.credit_shares(&position.token_id, position.size).await;
            }
        }
        tracing::info!(
            restored = recovered.restored,
            purged = recovered.purged,
            paper = paper.is_some(),
            "Starting engine"
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Cannot listen for ctrl-c, running until killed");
                std::future::pending::<()>().await;
            }
        };
        let result = Arc::clone(&engine).run(shutdown).await;

        feed_task.abort();
        if let Some(task) = reference_task {
            task.abort();
        }
        result
    }
}
