//! Trade journal advisor
//!
//! Appends every closed trade to a JSONL file and scores new entries by the
//! journal's history for the strategy, the asset and the hour of day.

use super::{Advice, AdviceRequest, Advisor, TradeOutcome};
use async_trait::async_trait;
use chrono::{Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Entries scoring below this are vetoed
const DEFAULT_MIN_SCORE: Decimal = dec!(40);
/// Score used until a bucket has enough history
const NEUTRAL_SCORE: Decimal = dec!(50);

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    trades: u32,
    wins: u32,
    profit_pct_sum: Decimal,
}

impl Bucket {
    fn add(&mut self, outcome: &TradeOutcome) {
        self.trades += 1;
        if outcome.profit > Decimal::ZERO {
            self.wins += 1;
        }
        self.profit_pct_sum += outcome.profit_pct();
    }

    fn win_rate(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) / Decimal::from(self.trades)
    }

    /// Win rate weighted 70, average profit percent (x10, capped) up to 30
    fn performance_score(&self, min_trades: u32) -> Decimal {
        if self.trades < min_trades {
            return NEUTRAL_SCORE;
        }
        let avg_profit = self.profit_pct_sum / Decimal::from(self.trades);
        let score = self.win_rate() * dec!(70) + (avg_profit * dec!(10)).min(dec!(30));
        score.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
    }

    fn win_rate_score(&self, min_trades: u32) -> Decimal {
        if self.trades < min_trades {
            return NEUTRAL_SCORE;
        }
        self.win_rate() * Decimal::ONE_HUNDRED
    }
}

#[derive(Debug, Default)]
struct History {
    by_strategy: HashMap<String, Bucket>,
    by_asset: HashMap<String, Bucket>,
    by_hour: HashMap<u32, Bucket>,
}

impl History {
    fn add(&mut self, outcome: &TradeOutcome) {
        self.by_strategy
            .entry(outcome.strategy.as_str().to_string())
            .or_default()
            .add(outcome);
        self.by_asset
            .entry(outcome.asset.to_uppercase())
            .or_default()
            .add(outcome);
        self.by_hour
            .entry(outcome.closed_at.hour())
            .or_default()
            .add(outcome);
    }

    /// Strategy 50%, asset 30%, hour 20%
    fn score(&self, strategy: &str, asset: &str, hour: u32) -> Decimal {
        let get = |map: &HashMap<String, Bucket>, key: &str| map.get(key).copied().unwrap_or_default();
        let strategy = get(&self.by_strategy, strategy).performance_score(5);
        let asset = get(&self.by_asset, &asset.to_uppercase()).performance_score(5);
        let hour = self
            .by_hour
            .get(&hour)
            .copied()
            .unwrap_or_default()
            .win_rate_score(3);
        strategy * dec!(0.5) + asset * dec!(0.3) + hour * dec!(0.2)
    }
}

/// JSONL trade journal that doubles as a history-based advisor
pub struct JournalAdvisor {
    path: PathBuf,
    min_score: Decimal,
    history: Mutex<History>,
}

impl JournalAdvisor {
    /// Open a journal, replaying any existing entries
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut history = History::default();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let mut replayed = 0usize;
                for (n, line) in content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                    match serde_json::from_str::<TradeOutcome>(line) {
                        Ok(outcome) => {
                            history.add(&outcome);
                            replayed += 1;
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), line = n + 1, error = %e, "Skipping bad journal line");
                        }
                    }
                }
                tracing::info!(path = %path.display(), trades = replayed, "Trade journal loaded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            min_score: DEFAULT_MIN_SCORE,
            history: Mutex::new(history),
        })
    }

    pub fn with_min_score(mut self, min_score: Decimal) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn score(&self, request: &AdviceRequest, hour: u32) -> Decimal {
        self.history
            .lock()
            .await
            .score(request.strategy.as_str(), &request.asset, hour)
    }
}

#[async_trait]
impl Advisor for JournalAdvisor {
    fn name(&self) -> &str {
        "journal"
    }

    async fn advise(&self, request: &AdviceRequest) -> anyhow::Result<Advice> {
        let score = self.score(request, Utc::now().hour()).await;
        let approve = score >= self.min_score;
        let reason = if approve {
            format!("historical score {}", score.round_dp(1))
        } else {
            format!("historical score {} below {}", score.round_dp(1), self.min_score)
        };
        Ok(Advice {
            approve,
            score,
            reason,
        })
    }

    async fn record(&self, outcome: &TradeOutcome) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        // Holding the history lock keeps appends ordered
        let mut history = self.history.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        history.add(outcome);
        Ok(())
    }
}
