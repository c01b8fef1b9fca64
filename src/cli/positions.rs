//! Positions command implementation

use crate::config::Config;
use crate::position::{PositionRecord, PositionStore};
use chrono::{Duration, Utc};
use clap::Args;
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct PositionsArgs {
    /// Print the records as JSON
    #[arg(long)]
    pub json: bool,
}

impl PositionsArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = PositionStore::new(
            config.persistence.positions_path.clone(),
            Duration::seconds(config.persistence.stale_after_secs),
        );
        let now = Utc::now();
        let loaded = store.load(now).await?;

        if self.json {
            let records: BTreeMap<&str, PositionRecord> = loaded
                .kept
                .iter()
                .map(|p| (p.token_id.as_str(), p.to_record()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }

        println!("Positions in {}", store.path().display());
        if loaded.kept.is_empty() {
            println!("  (none)");
        }
        for p in &loaded.kept {
            println!(
                "  {:<6} {:<5} {:<15} entry={:<6} size={:<8} cost={:<8} peak={:<6} age={}m market={}",
                p.asset,
                p.side,
                p.strategy,
                p.entry_price,
                p.size,
                p.cost_basis().round_dp(2),
                p.peak_price,
                p.age(now).num_minutes(),
                p.market_id,
            );
        }
        for (p, reason) in &loaded.purged {
            println!("  purged ({}): {} {}", reason.as_str(), p.asset, p.token_id);
        }
        Ok(())
    }
}
