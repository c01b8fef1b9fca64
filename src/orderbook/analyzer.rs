//! Order book depth analysis
//!
//! Caches top-of-book depth per token for a short TTL and answers the two
//! questions the engine asks before trading: is there enough liquidity, and
//! what price would a given size actually fill at.

use super::{BookSource, OrderBook, PriceLevel};
use crate::config::OrderBookConfig;
use crate::exchange::OrderSide;
use crate::telemetry::{self, LatencyMetric};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Spread/mid ratio above which the liquidity score is halved
const WIDE_SPREAD_RATIO: Decimal = dec!(0.05);

/// Snapshot of a token's book with derived depth statistics
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct OrderBookDepth {
    /// Top-N levels per side
    pub book: OrderBook,
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    /// 0-100, penalized for wide spreads
    pub liquidity_score: Decimal,
    fetched_at: Instant,
}

impl OrderBookDepth {
    /// Derive depth statistics from a book, keeping `levels` per side
    pub fn from_book(mut book: OrderBook, levels: usize) -> Self {
        book.truncate(levels);
        let bid_depth = book.bid_depth();
        let ask_depth = book.ask_depth();
        let spread = book.spread();
        let mid_price = book.mid_price();
        let liquidity_score = liquidity_score(bid_depth, ask_depth, spread, mid_price);

        Self {
            book,
            bid_depth,
            ask_depth,
            spread,
            mid_price,
            liquidity_score,
            fetched_at: Instant::now(),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.book.best_bid()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.book.best_ask()
    }

    /// Depth on the side an order of `side` would consume
    pub fn depth_for(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.ask_depth,
            OrderSide::Sell => self.bid_depth,
        }
    }

    fn levels_for(&self, side: OrderSide) -> &[PriceLevel] {
        match side {
            OrderSide::Buy => &self.book.asks,
            OrderSide::Sell => &self.book.bids,
        }
    }

    /// Walk the book for `size` shares
    pub fn estimate_fill(&self, side: OrderSide, size: Decimal) -> Option<SlippageEstimate> {
        let levels = self.levels_for(side);
        let avg_price = walk_levels(levels, size)?;
        let reference = self.mid_price.or_else(|| levels.first().map(|l| l.price))?;
        let slippage = if reference.is_zero() {
            Decimal::ZERO
        } else {
            ((avg_price - reference) / reference).abs()
        };

        Some(SlippageEstimate {
            avg_price,
            slippage,
            book_covers_size: self.depth_for(side) >= size,
        })
    }
}

/// Liquidity score: ten points per share of the thinner side, capped at 100,
/// halved when the spread exceeds 5% of mid.
pub fn liquidity_score(
    bid_depth: Decimal,
    ask_depth: Decimal,
    spread: Option<Decimal>,
    mid: Option<Decimal>,
) -> Decimal {
    let mut score = (bid_depth.min(ask_depth) * dec!(10)).min(dec!(100));
    if let (Some(spread), Some(mid)) = (spread, mid) {
        if mid > Decimal::ZERO && spread / mid > WIDE_SPREAD_RATIO {
            score /= Decimal::TWO;
        }
    }
    score
}

/// Average fill price for `size` across best-first `levels`
///
/// Any size beyond the book is priced at the worst level.
pub fn walk_levels(levels: &[PriceLevel], size: Decimal) -> Option<Decimal> {
    let worst = levels.last()?;
    if size <= Decimal::ZERO {
        return levels.first().map(|l| l.price);
    }

    let mut remaining = size;
    let mut cost = Decimal::ZERO;
    for level in levels {
        let take = remaining.min(level.size);
        cost += take * level.price;
        remaining -= take;
        if remaining.is_zero() {
            break;
        }
    }
    if remaining > Decimal::ZERO {
        cost += remaining * worst.price;
    }

    Some(cost / size)
}

/// Result of walking the book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlippageEstimate {
    pub avg_price: Decimal,
    /// Fractional distance of `avg_price` from mid
    pub slippage: Decimal,
    /// False when part of the size was priced beyond the visible book
    pub book_covers_size: bool,
}

/// Outcome of a liquidity verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidityCheck {
    Sufficient,
    /// No book could be fetched; callers decide whether to proceed
    NoData,
    Insufficient(String),
}

/// Fetches, caches and analyzes order books
pub struct OrderBookAnalyzer {
    source: Arc<dyn BookSource>,
    config: OrderBookConfig,
    cache: RwLock<HashMap<String, OrderBookDepth>>,
}

impl OrderBookAnalyzer {
    pub fn new(source: Arc<dyn BookSource>, config: OrderBookConfig) -> Self {
        Self {
            source,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.cache_ttl_ms)
    }

    /// Cached depth for a token, refetched when older than the TTL or forced
    ///
    /// Returns `None` when the venue has no levels or the fetch fails.
    pub async fn get_order_book(&self, token_id: &str, force_refresh: bool) -> Option<OrderBookDepth> {
        if !force_refresh {
            let cache = self.cache.read().await;
            if let Some(depth) = cache.get(token_id) {
                if depth.fetched_at.elapsed() < self.ttl() {
                    return Some(depth.clone());
                }
            }
        }

        let started = std::time::Instant::now();
        let fetched = self.source.get_order_book(token_id).await;
        telemetry::record_latency(LatencyMetric::OrderBook, started.elapsed());

        let book = match fetched {
            Ok(book) => book,
            Err(e) => {
                tracing::warn!(token_id = %token_id, error = %e, "Order book fetch failed");
                return None;
            }
        };

        if book.is_empty() {
            tracing::debug!(token_id = %token_id, "Order book has no levels");
            self.cache.write().await.remove(token_id);
            return None;
        }

        let depth = OrderBookDepth::from_book(book, self.config.depth_levels);
        self.cache
            .write()
            .await
            .insert(token_id.to_string(), depth.clone());
        Some(depth)
    }

    /// Average fill price and slippage versus mid for `size` shares
    pub async fn estimate_slippage(
        &self,
        token_id: &str,
        side: OrderSide,
        size: Decimal,
    ) -> Option<SlippageEstimate> {
        let depth = self.get_order_book(token_id, false).await?;
        depth.estimate_fill(side, size)
    }

    /// Verify that `size` can trade with depth of `multiple * size` and
    /// slippage at most `max_slippage`
    pub async fn check_liquidity(
        &self,
        token_id: &str,
        side: OrderSide,
        size: Decimal,
        multiple: Decimal,
        max_slippage: Decimal,
    ) -> LiquidityCheck {
        let Some(depth) = self.get_order_book(token_id, false).await else {
            return LiquidityCheck::NoData;
        };
        self.verify(&depth, side, size, multiple, max_slippage)
    }

    fn verify(
        &self,
        depth: &OrderBookDepth,
        side: OrderSide,
        size: Decimal,
        multiple: Decimal,
        max_slippage: Decimal,
    ) -> LiquidityCheck {
        if depth.liquidity_score < self.config.min_liquidity_score {
            return LiquidityCheck::Insufficient(format!(
                "liquidity score {} below {}",
                depth.liquidity_score, self.config.min_liquidity_score
            ));
        }

        let required = size * multiple;
        let available = depth.depth_for(side);
        if available < required {
            return LiquidityCheck::Insufficient(format!(
                "depth {} below required {}",
                available, required
            ));
        }

        match depth.estimate_fill(side, size) {
            Some(est) if est.slippage > max_slippage => LiquidityCheck::Insufficient(format!(
                "slippage {} above {}",
                est.slippage.round_dp(4),
                max_slippage
            )),
            Some(_) => LiquidityCheck::Sufficient,
            None => LiquidityCheck::Insufficient("no levels on required side".to_string()),
        }
    }
}
