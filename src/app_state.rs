// =============================================================================
// Core Context — central dependency-injection container
// =============================================================================
//
// The single source of truth wiring every subsystem together, mirroring the
// teacher's `AppState`: one struct holding `Arc`s to each engine, built once
// at startup and cloned cheaply into every async task and HTTP handler.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::audit::AuditLog;
use crate::broker::Adapter;
use crate::config::Config;
use crate::confluence::SourceWeights;
use crate::context_cache::ContextCache;
use crate::context_store::ContextStore;
use crate::dedup::DedupCache;
use crate::gex::GexService;
use crate::observability::{DegradedModeTracker, Metrics};
use crate::orchestrator::Orchestrator;
use crate::position_manager::PositionManager;
use crate::risk::RiskManager;
use crate::types::Signal;

/// Number of recent normalized signals retained for confluence scoring.
const MAX_RECENT_SIGNALS: usize = 200;

/// Central application state shared across all async tasks via `Arc<CoreContext>`.
pub struct CoreContext {
    pub config: Arc<RwLock<Config>>,
    pub audit: Arc<AuditLog>,
    pub dedup: Arc<DedupCache>,
    pub context_store: Arc<ContextStore>,
    pub context_cache: Arc<ContextCache>,
    pub gex_service: Arc<GexService>,
    pub risk_manager: Arc<RiskManager>,
    pub position_manager: Arc<PositionManager>,
    pub adapter: Arc<Adapter>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
    pub degraded: Arc<DegradedModeTracker>,

    /// Singleton gate for the Exit Worker — only one concurrent sweep is
    /// permitted, per the concurrency model.
    pub exit_sweep_gate: Arc<AsyncMutex<()>>,

    recent_signals: RwLock<Vec<Signal>>,

    pub start_time: std::time::Instant,
}

impl CoreContext {
    pub fn new(config: Config, adapter: Adapter) -> Self {
        let config = Arc::new(RwLock::new(config));
        let (dedup_window, gex_cfg, risk_cfg, confidence_cfg) = {
            let cfg = config.read();
            (
                cfg.dedup.window_seconds,
                cfg.gex.clone(),
                cfg.risk.clone(),
                cfg.confidence.clone(),
            )
        };

        let context_store = Arc::new(ContextStore::new());
        let context_cache = Arc::new(ContextCache::new(
            60,
            tokio::time::Duration::from_secs(5),
            context_store.clone().fetcher(),
        ));
        let gex_service = Arc::new(GexService::new(gex_cfg.max_stale_minutes, gex_cfg.stale_weight_reduction));
        let risk_manager = Arc::new(RiskManager::new(risk_cfg, confidence_cfg));
        let position_manager = Arc::new(PositionManager::new());

        let orchestrator = Arc::new(Orchestrator::new(
            context_cache.clone(),
            gex_service.clone(),
            risk_manager.clone(),
            position_manager.clone(),
            SourceWeights::default(),
            config.clone(),
        ));

        Self {
            config,
            audit: Arc::new(AuditLog::new()),
            dedup: Arc::new(DedupCache::new(dedup_window)),
            context_store,
            context_cache,
            gex_service,
            risk_manager,
            position_manager,
            adapter: Arc::new(adapter),
            orchestrator,
            metrics: Arc::new(Metrics::new()),
            degraded: Arc::new(DegradedModeTracker::new()),
            exit_sweep_gate: Arc::new(AsyncMutex::new(())),
            recent_signals: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Record a normalized signal into the short-lived confluence pool.
    pub fn record_signal(&self, signal: Signal) {
        let mut signals = self.recent_signals.write();
        signals.push(signal);
        if signals.len() > MAX_RECENT_SIGNALS {
            let overflow = signals.len() - MAX_RECENT_SIGNALS;
            signals.drain(0..overflow);
        }
    }

    /// Snapshot of recently seen signals, used as the peer pool for
    /// confluence scoring.
    pub fn recent_signals(&self) -> Vec<Signal> {
        self.recent_signals.read().clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
