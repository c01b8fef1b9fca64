//! Short-TTL cache in front of a market source

use super::{MarketFeed, MarketSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Serves market snapshots from memory until they are `ttl` old
pub struct CachedMarketFeed {
    inner: Arc<dyn MarketFeed>,
    ttl: Duration,
    entries: RwLock<HashMap<Option<String>, (Instant, Vec<MarketSnapshot>)>>,
}

impl CachedMarketFeed {
    pub fn new(inner: Arc<dyn MarketFeed>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MarketFeed for CachedMarketFeed {
    async fn fetch_live_markets(
        &self,
        asset_filter: Option<&str>,
    ) -> anyhow::Result<Vec<MarketSnapshot>> {
        let key = asset_filter.map(|a| a.to_lowercase());

        {
            let entries = self.entries.read().await;
            if let Some((fetched_at, markets)) = entries.get(&key) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(markets.clone());
                }
            }
        }

        let markets = self.inner.fetch_live_markets(asset_filter).await?;
        self.entries
            .write()
            .await
            .insert(key, (Instant::now(), markets.clone()));
        Ok(markets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketFeed for CountingFeed {
        async fn fetch_live_markets(
            &self,
            _asset_filter: Option<&str>,
        ) -> anyhow::Result<Vec<MarketSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_cache_hits_within_ttl() {
        tokio::time::pause();
        let inner = Arc::new(CountingFeed {
            calls: AtomicUsize::new(0),
        });
        let feed = CachedMarketFeed::new(inner.clone(), Duration::from_secs(2));

        feed.fetch_live_markets(None).await.unwrap();
        feed.fetch_live_markets(None).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        // Different filter is a different entry
        feed.fetch_live_markets(Some("BTC")).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        feed.fetch_live_markets(None).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }
}
