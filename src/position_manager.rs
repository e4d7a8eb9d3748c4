// =============================================================================
// Position Manager (C9) — options positions, in-memory index + persistence
// =============================================================================
//
// Adapted from the teacher's `PositionManager` (`position_engine.rs`):
// `RwLock<Vec<Position>>` split into open/closed lists, mutated under one
// exclusive lock per operation. This version tracks OCC contract details and
// options exposure (×100 multiplier) instead of equity quantity/trailing
// stops.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::FlowgateError;
use crate::types::{ContractDetails, Direction, Position, PositionStatus};

struct Inner {
    open: Vec<Position>,
    closed: Vec<Position>,
    /// signal_id → position_id, enforces the one-position-per-signal rule.
    by_signal: HashMap<String, String>,
}

/// Thread-safe manager owning the open/closed position index.
pub struct PositionManager {
    inner: RwLock<Inner>,
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                open: Vec::new(),
                closed: Vec::new(),
                by_signal: HashMap::new(),
            }),
        }
    }

    /// Rehydrate the in-memory open-position index from a persisted store on
    /// startup. Callers supply the already-loaded rows; this only rebuilds
    /// the indices over them.
    pub fn load_positions(&self, rows: Vec<Position>) {
        let mut inner = self.inner.write();
        for position in rows {
            if position.status == PositionStatus::Open {
                inner.by_signal.insert(position.signal_id.clone(), position.id.clone());
                inner.open.push(position);
            } else {
                inner.closed.push(position);
            }
        }
    }

    /// Open a new position for `signal_id`. Rejects with `DuplicateSignal` if
    /// a position already exists for that signal.
    pub fn open_position(
        &self,
        signal_id: &str,
        symbol: &str,
        direction: Direction,
        quantity: u32,
        entry_price: f64,
        contract: ContractDetails,
    ) -> Result<Position, FlowgateError> {
        let mut inner = self.inner.write();

        if inner.by_signal.contains_key(signal_id) {
            return Err(FlowgateError::DuplicateSignal(signal_id.to_string()));
        }

        let position = Position {
            id: Uuid::new_v4().to_string(),
            signal_id: signal_id.to_string(),
            symbol: symbol.to_string(),
            direction,
            quantity,
            entry_price,
            entry_time: Utc::now(),
            current_price: None,
            unrealized_pnl: None,
            exit_price: None,
            exit_time: None,
            realized_pnl: None,
            status: PositionStatus::Open,
            contract,
        };

        inner.by_signal.insert(signal_id.to_string(), position.id.clone());
        inner.open.push(position.clone());
        Ok(position)
    }

    pub fn calculate_unrealized_pnl(position: &Position, current_price: f64) -> f64 {
        position.unrealized_pnl_at(current_price)
    }

    /// Update the mark price / unrealized P&L of an open position in place.
    pub fn update_price(&self, position_id: &str, current_price: f64) -> Option<Position> {
        let mut inner = self.inner.write();
        let position = inner.open.iter_mut().find(|p| p.id == position_id)?;
        position.current_price = Some(current_price);
        position.unrealized_pnl = Some(position.unrealized_pnl_at(current_price));
        Some(position.clone())
    }

    /// Close an open position at `exit_price`, moving it to the closed list.
    /// Realized P&L equals the unrealized P&L computed at that price.
    pub fn close_position(&self, position_id: &str, exit_price: f64) -> Option<Position> {
        let mut inner = self.inner.write();
        let idx = inner.open.iter().position(|p| p.id == position_id)?;
        let mut position = inner.open.remove(idx);

        let realized = position.unrealized_pnl_at(exit_price);
        position.exit_price = Some(exit_price);
        position.exit_time = Some(Utc::now());
        position.realized_pnl = Some(realized);
        position.status = PositionStatus::Closed;

        inner.by_signal.remove(&position.signal_id);
        inner.closed.push(position.clone());
        Some(position)
    }

    /// Reduce an open position's quantity for a partial exit, leaving the
    /// remainder open. Used by the Exit Worker's PROFIT_TARGET partial-close.
    pub fn partial_close(&self, position_id: &str, exit_quantity: u32, exit_price: f64) -> Option<Position> {
        let mut inner = self.inner.write();
        let position = inner.open.iter_mut().find(|p| p.id == position_id)?;

        if exit_quantity >= position.quantity {
            drop(inner);
            return self.close_position(position_id, exit_price);
        }

        position.quantity -= exit_quantity;
        position.current_price = Some(exit_price);
        position.unrealized_pnl = Some(position.unrealized_pnl_at(exit_price));
        Some(position.clone())
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.inner.read().open.clone()
    }

    /// Most recently closed positions first, capped at `limit`.
    pub fn closed_positions(&self, limit: usize) -> Vec<Position> {
        let inner = self.inner.read();
        inner.closed.iter().rev().take(limit).cloned().collect()
    }

    pub fn get(&self, position_id: &str) -> Option<Position> {
        let inner = self.inner.read();
        inner
            .open
            .iter()
            .chain(inner.closed.iter())
            .find(|p| p.id == position_id)
            .cloned()
    }

    /// Σ entryPrice × quantity × 100 over OPEN positions.
    pub fn total_exposure(&self) -> f64 {
        self.inner.read().open.iter().map(Position::exposure).sum()
    }

    pub fn would_exceed_max_exposure(&self, additional: f64, max_total_exposure: f64) -> bool {
        (self.total_exposure() + additional) > max_total_exposure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> ContractDetails {
        ContractDetails {
            underlying: "SPY".to_string(),
            strike: 450.0,
            expiration: "2026-08-21".to_string(),
            option_type: Direction::Call,
            timeframe: "5m".to_string(),
        }
    }

    #[test]
    fn opens_and_tracks_position() {
        let manager = PositionManager::new();
        let position = manager
            .open_position("sig-1", "SPY", Direction::Call, 2, 5.0, contract())
            .unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(manager.open_positions().len(), 1);
    }

    #[test]
    fn rejects_duplicate_signal() {
        let manager = PositionManager::new();
        manager
            .open_position("sig-1", "SPY", Direction::Call, 2, 5.0, contract())
            .unwrap();
        let err = manager
            .open_position("sig-1", "SPY", Direction::Call, 1, 5.0, contract())
            .unwrap_err();
        assert_eq!(err.stage(), "dedup");
    }

    #[test]
    fn exposure_uses_contract_multiplier() {
        let manager = PositionManager::new();
        manager
            .open_position("sig-1", "SPY", Direction::Call, 2, 5.0, contract())
            .unwrap();
        assert_eq!(manager.total_exposure(), 5.0 * 2.0 * 100.0);
    }

    #[test]
    fn would_exceed_max_exposure_accounts_for_additional() {
        let manager = PositionManager::new();
        manager
            .open_position("sig-1", "SPY", Direction::Call, 2, 5.0, contract())
            .unwrap();
        assert!(!manager.would_exceed_max_exposure(0.0, 2_000.0));
        assert!(manager.would_exceed_max_exposure(1_500.0, 2_000.0));
    }

    #[test]
    fn close_position_sets_realized_pnl() {
        let manager = PositionManager::new();
        let position = manager
            .open_position("sig-1", "SPY", Direction::Call, 2, 5.0, contract())
            .unwrap();
        let closed = manager.close_position(&position.id, 7.0).unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.realized_pnl, Some(400.0));
        assert!(manager.open_positions().is_empty());
    }

    #[test]
    fn partial_close_reduces_quantity_without_closing() {
        let manager = PositionManager::new();
        let position = manager
            .open_position("sig-1", "SPY", Direction::Call, 4, 5.0, contract())
            .unwrap();
        let partially_closed = manager.partial_close(&position.id, 2, 6.0).unwrap();
        assert_eq!(partially_closed.status, PositionStatus::Open);
        assert_eq!(partially_closed.quantity, 2);
        assert_eq!(manager.open_positions().len(), 1);
    }

    #[test]
    fn closed_positions_are_most_recent_first() {
        let manager = PositionManager::new();
        let a = manager
            .open_position("sig-1", "SPY", Direction::Call, 1, 5.0, contract())
            .unwrap();
        let b = manager
            .open_position("sig-2", "SPY", Direction::Put, 1, 5.0, contract())
            .unwrap();
        manager.close_position(&a.id, 6.0);
        manager.close_position(&b.id, 4.0);

        let closed = manager.closed_positions(10);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].id, b.id);
        assert_eq!(closed[1].id, a.id);
    }
}
