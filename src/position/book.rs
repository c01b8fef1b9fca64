//! In-memory position table with slot reservations
//!
//! Market tasks run concurrently, so an entry reserves its slot before the
//! order goes out and converts it on fill. Capacity limits therefore hold
//! even while orders are in flight.

use super::Position;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Why a slot could not be reserved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("max positions reached ({0})")]
    Total(usize),
    #[error("max positions for {asset} reached ({limit})")]
    PerAsset { asset: String, limit: usize },
}

/// The engine's position table
#[derive(Debug)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
    reserved: HashMap<String, usize>,
    exiting: HashSet<String>,
    max_positions: usize,
    max_per_asset: usize,
}

impl PositionBook {
    pub fn new(max_positions: usize, max_per_asset: usize) -> Self {
        Self {
            positions: HashMap::new(),
            reserved: HashMap::new(),
            exiting: HashSet::new(),
            max_positions,
            max_per_asset,
        }
    }

    fn reserved_total(&self) -> usize {
        self.reserved.values().sum()
    }

    fn reserved_for(&self, asset: &str) -> usize {
        self.reserved.get(asset).copied().unwrap_or(0)
    }

    /// Open positions for an asset, excluding reservations
    pub fn count_for_asset(&self, asset: &str) -> usize {
        self.positions.values().filter(|p| p.asset == asset).count()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether `slots` more entries for `asset` would fit
    pub fn check_capacity(&self, asset: &str, slots: usize) -> Result<(), CapacityError> {
        if self.positions.len() + self.reserved_total() + slots > self.max_positions {
            return Err(CapacityError::Total(self.max_positions));
        }
        if self.count_for_asset(asset) + self.reserved_for(asset) + slots > self.max_per_asset {
            return Err(CapacityError::PerAsset {
                asset: asset.to_string(),
                limit: self.max_per_asset,
            });
        }
        Ok(())
    }

    /// Hold `slots` entries for `asset` until filled or released
    pub fn try_reserve(&mut self, asset: &str, slots: usize) -> Result<(), CapacityError> {
        self.check_capacity(asset, slots)?;
        *self.reserved.entry(asset.to_string()).or_default() += slots;
        Ok(())
    }

    /// Give back unused reservations
    pub fn release(&mut self, asset: &str, slots: usize) {
        if let Some(held) = self.reserved.get_mut(asset) {
            *held = held.saturating_sub(slots);
            if *held == 0 {
                self.reserved.remove(asset);
            }
        }
    }

    /// Convert one reservation into an open position
    ///
    /// A second fill on an already-held token is averaged into the existing
    /// position instead of creating another entry.
    pub fn fill(&mut self, position: Position) {
        self.release(&position.asset, 1);
        match self.positions.get_mut(&position.token_id) {
            Some(existing) => {
                let size = existing.size + position.size;
                if !size.is_zero() {
                    existing.entry_price =
                        (existing.cost_basis() + position.cost_basis()) / size;
                }
                existing.size = size;
                existing.peak_price = existing.peak_price.max(position.peak_price);
            }
            None => {
                self.positions.insert(position.token_id.clone(), position);
            }
        }
    }

    /// Insert a recovered position, bypassing reservations
    pub fn restore(&mut self, position: Position) {
        self.positions.insert(position.token_id.clone(), position);
    }

    pub fn get(&self, token_id: &str) -> Option<&Position> {
        self.positions.get(token_id)
    }

    pub fn contains(&self, token_id: &str) -> bool {
        self.positions.contains_key(token_id)
    }

    /// Record a new peak for a position
    pub fn set_peak(&mut self, token_id: &str, price: Decimal) -> bool {
        self.positions
            .get_mut(token_id)
            .is_some_and(|p| p.update_peak(price))
    }

    /// Claim a position for closing; false if another task already has it
    pub fn begin_exit(&mut self, token_id: &str) -> bool {
        self.positions.contains_key(token_id) && self.exiting.insert(token_id.to_string())
    }

    /// Drop an exit claim without closing
    pub fn end_exit(&mut self, token_id: &str) {
        self.exiting.remove(token_id);
    }

    pub fn remove(&mut self, token_id: &str) -> Option<Position> {
        self.exiting.remove(token_id);
        self.positions.remove(token_id)
    }

    /// Snapshot of positions on one asset
    pub fn for_asset(&self, asset: &str) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.asset == asset)
            .cloned()
            .collect()
    }

    /// Snapshot of every position
    pub fn all(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Cost basis of all open positions
    pub fn total_exposure(&self) -> Decimal {
        self.positions.values().map(Position::cost_basis).sum()
    }

    /// Cost basis of open positions on one asset
    pub fn asset_exposure(&self, asset: &str) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.asset == asset)
            .map(Position::cost_basis)
            .sum()
    }
}
