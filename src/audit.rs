// =============================================================================
// Audit trail — append-only, capped in-memory log of entry/exit decisions
// =============================================================================
//
// Every decision the Orchestrator reaches (ENTER/REJECT, EXIT/HOLD) is
// recorded here before the HTTP handler returns 200. The store is a
// ring-buffer-capped Vec, matching the teacher's `push_error`/`push_decision`
// idiom: cheap to append, bounded memory, newest-first iteration for the
// admin endpoints.
// =============================================================================

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::OrderStatus;
use crate::types::{EntryDecision, ExitDecision};

const MAX_ENTRY_RECORDS: usize = 500;
const MAX_EXIT_RECORDS: usize = 500;
const MAX_FAILURE_RECORDS: usize = 500;
const MAX_ORDER_RECORDS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDecisionRecord {
    pub id: String,
    pub correlation_id: String,
    pub recorded_at: DateTime<Utc>,
    pub decision: EntryDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitDecisionRecord {
    pub id: String,
    pub correlation_id: String,
    pub recorded_at: DateTime<Utc>,
    pub decision: ExitDecision,
}

/// A Parse/Validate/Dedup failure that never reached the Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFailureRecord {
    pub id: String,
    pub correlation_id: String,
    pub recorded_at: DateTime<Utc>,
    pub stage: String,
    pub reason: String,
}

/// An order the Adapter could not place after its retry, persisted so the
/// order's final state is never left implicit in logs alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub correlation_id: String,
    pub recorded_at: DateTime<Utc>,
    pub occ_symbol: String,
    pub quantity: u32,
    pub status: OrderStatus,
    pub reason: String,
}

struct Inner {
    entries: Vec<EntryDecisionRecord>,
    exits: Vec<ExitDecisionRecord>,
    failures: Vec<PipelineFailureRecord>,
    orders: Vec<OrderRecord>,
}

/// Capped, thread-safe store of recent entry/exit decisions for audit and
/// admin-dashboard consumption.
pub struct AuditLog {
    inner: RwLock<Inner>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                exits: Vec::new(),
                failures: Vec::new(),
                orders: Vec::new(),
            }),
        }
    }

    pub fn record_entry(&self, correlation_id: &str, decision: EntryDecision) -> EntryDecisionRecord {
        let record = EntryDecisionRecord {
            id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.to_string(),
            recorded_at: Utc::now(),
            decision,
        };
        let mut inner = self.inner.write();
        inner.entries.push(record.clone());
        if inner.entries.len() > MAX_ENTRY_RECORDS {
            let overflow = inner.entries.len() - MAX_ENTRY_RECORDS;
            inner.entries.drain(0..overflow);
        }
        record
    }

    pub fn record_exit(&self, correlation_id: &str, decision: ExitDecision) -> ExitDecisionRecord {
        let record = ExitDecisionRecord {
            id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.to_string(),
            recorded_at: Utc::now(),
            decision,
        };
        let mut inner = self.inner.write();
        inner.exits.push(record.clone());
        if inner.exits.len() > MAX_EXIT_RECORDS {
            let overflow = inner.exits.len() - MAX_EXIT_RECORDS;
            inner.exits.drain(0..overflow);
        }
        record
    }

    pub fn record_failure(&self, correlation_id: &str, stage: &str, reason: &str) -> PipelineFailureRecord {
        let record = PipelineFailureRecord {
            id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.to_string(),
            recorded_at: Utc::now(),
            stage: stage.to_string(),
            reason: reason.to_string(),
        };
        let mut inner = self.inner.write();
        inner.failures.push(record.clone());
        if inner.failures.len() > MAX_FAILURE_RECORDS {
            let overflow = inner.failures.len() - MAX_FAILURE_RECORDS;
            inner.failures.drain(0..overflow);
        }
        record
    }

    /// Persist a REJECTED order after the adapter's retry is exhausted, so
    /// the order's final state is recorded even though no position/trade
    /// was ever opened for it.
    pub fn record_rejected_order(
        &self,
        correlation_id: &str,
        occ_symbol: &str,
        quantity: u32,
        reason: &str,
    ) -> OrderRecord {
        let record = OrderRecord {
            id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.to_string(),
            recorded_at: Utc::now(),
            occ_symbol: occ_symbol.to_string(),
            quantity,
            status: OrderStatus::Rejected,
            reason: reason.to_string(),
        };
        let mut inner = self.inner.write();
        inner.orders.push(record.clone());
        if inner.orders.len() > MAX_ORDER_RECORDS {
            let overflow = inner.orders.len() - MAX_ORDER_RECORDS;
            inner.orders.drain(0..overflow);
        }
        record
    }

    /// Most recent pipeline failures, newest first.
    pub fn recent_failures(&self, limit: usize) -> Vec<PipelineFailureRecord> {
        let inner = self.inner.read();
        inner.failures.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent persisted order records (currently only REJECTED),
    /// newest first.
    pub fn recent_orders(&self, limit: usize) -> Vec<OrderRecord> {
        let inner = self.inner.read();
        inner.orders.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent entry decisions, newest first.
    pub fn recent_entries(&self, limit: usize) -> Vec<EntryDecisionRecord> {
        let inner = self.inner.read();
        inner.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent exit decisions, newest first.
    pub fn recent_exits(&self, limit: usize) -> Vec<ExitDecisionRecord> {
        let inner = self.inner.read();
        inner.exits.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ConfidenceCalculations, Direction, EntryCalculations, EntryOutcome, Signal,
        SignalSource, SizingCalculations,
    };

    fn sample_signal() -> Signal {
        Signal {
            id: "sig-1".to_string(),
            source: SignalSource::TradingView,
            symbol: "SPX".to_string(),
            direction: Direction::Call,
            timeframe: "5m".to_string(),
            timestamp: Utc::now(),
            metadata: Default::default(),
            price: 5000.0,
        }
    }

    fn sample_entry_decision() -> EntryDecision {
        EntryDecision {
            decision: EntryOutcome::Enter,
            signal: sample_signal(),
            confidence: 70,
            position_size: 2,
            reasoning: vec!["confluence aligned".to_string()],
            calculations: EntryCalculations {
                confidence: ConfidenceCalculations::default(),
                sizing: SizingCalculations::default(),
                confluence_score: 0.8,
            },
        }
    }

    #[test]
    fn records_and_lists_newest_first() {
        let log = AuditLog::new();
        log.record_entry("corr-1", sample_entry_decision());
        log.record_entry("corr-2", sample_entry_decision());

        let recent = log.recent_entries(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].correlation_id, "corr-2");
        assert_eq!(recent[1].correlation_id, "corr-1");
    }

    #[test]
    fn caps_entry_records_at_max() {
        let log = AuditLog::new();
        for i in 0..(MAX_ENTRY_RECORDS + 50) {
            log.record_entry(&format!("corr-{i}"), sample_entry_decision());
        }
        let recent = log.recent_entries(MAX_ENTRY_RECORDS + 50);
        assert_eq!(recent.len(), MAX_ENTRY_RECORDS);
        // newest record should be the very last one inserted
        assert_eq!(recent[0].correlation_id, format!("corr-{}", MAX_ENTRY_RECORDS + 49));
    }

    #[test]
    fn records_rejected_orders_newest_first() {
        let log = AuditLog::new();
        log.record_rejected_order("corr-1", "SPY260821C00450000", 2, "adapter timeout");
        log.record_rejected_order("corr-2", "SPX260116P05012500", 1, "adapter timeout");

        let recent = log.recent_orders(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].correlation_id, "corr-2");
        assert_eq!(recent[0].status, OrderStatus::Rejected);
        assert_eq!(recent[1].correlation_id, "corr-1");
    }

    #[test]
    fn records_pipeline_failures_newest_first() {
        let log = AuditLog::new();
        log.record_failure("corr-1", "parse", "missing symbol field");
        log.record_failure("corr-2", "dedup", "duplicate signal");

        let recent = log.recent_failures(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].stage, "dedup");
        assert_eq!(recent[1].stage, "parse");
    }
}
