//! JSON file persistence for the position table
//!
//! Saved after every change and reloaded at startup. Writes go to a
//! temporary file first and are renamed into place.

use super::{Position, PositionRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Token or market id prefixes left behind by tests and manual fixtures
const FIXTURE_PREFIXES: [&str; 3] = ["test", "mock", "fixture"];

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a stored record was dropped on load
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PurgeReason {
    Fixture,
    Stale,
}

impl PurgeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeReason::Fixture => "fixture",
            PurgeReason::Stale => "stale",
        }
    }
}

/// Result of loading the store
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub kept: Vec<Position>,
    pub purged: Vec<(Position, PurgeReason)>,
}

/// Position table file
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
    stale_after: Duration,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full table
    pub async fn save(&self, positions: &[Position]) -> Result<(), StoreError> {
        let records: BTreeMap<&str, PositionRecord> = positions
            .iter()
            .map(|p| (p.token_id.as_str(), p.to_record()))
            .collect();
        let json = serde_json::to_vec_pretty(&records)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| self.io(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| self.io(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io(e))?;

        tracing::debug!(path = %self.path.display(), count = positions.len(), "Positions saved");
        Ok(())
    }

    /// Read the table, dropping fixtures and stale records
    ///
    /// A missing file is an empty table. A corrupt file is moved aside and
    /// also treated as empty so a bad write never blocks startup.
    pub async fn load(&self, now: DateTime<Utc>) -> Result<LoadOutcome, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadOutcome::default())
            }
            Err(e) => return Err(self.io(e)),
        };

        let records: BTreeMap<String, PositionRecord> = match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                tracing::error!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Position file corrupt, starting empty"
                );
                tokio::fs::rename(&self.path, &aside)
                    .await
                    .map_err(|e| self.io(e))?;
                return Ok(LoadOutcome::default());
            }
        };

        let mut outcome = LoadOutcome::default();
        for (token_id, record) in records {
            let position = Position::from_record(token_id, record);
            match self.purge_reason(&position, now) {
                Some(reason) => {
                    tracing::warn!(
                        token_id = %position.token_id,
                        market = %position.market_id,
                        reason = reason.as_str(),
                        "Purging stored position"
                    );
                    outcome.purged.push((position, reason));
                }
                None => outcome.kept.push(position),
            }
        }

        tracing::info!(
            kept = outcome.kept.len(),
            purged = outcome.purged.len(),
            "Positions loaded"
        );
        Ok(outcome)
    }

    fn purge_reason(&self, position: &Position, now: DateTime<Utc>) -> Option<PurgeReason> {
        let is_fixture = [&position.token_id, &position.market_id].iter().any(|id| {
            let id = id.to_lowercase();
            FIXTURE_PREFIXES.iter().any(|prefix| id.starts_with(prefix))
        });
        if is_fixture {
            Some(PurgeReason::Fixture)
        } else if position.age(now) > self.stale_after {
            Some(PurgeReason::Stale)
        } else {
            None
        }
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
