// =============================================================================
// Exit Worker (C12) — periodic sweep over open positions
// =============================================================================
//
// Wakes on a fixed interval, same `tokio::time::interval` shape as the
// teacher's `run_exit_monitor`: collect the evaluation outcomes for every
// open position outside any lock, then apply the position-manager mutations
// afterwards — the "collect outside the lock, close after" idiom from
// `exit/monitor.rs`. A single `tokio::sync::Mutex` gate on `CoreContext`
// keeps at most one sweep running at a time; a sweep still in flight when
// the tick fires is skipped rather than queued.
// =============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use crate::app_state::CoreContext;
use crate::broker::{occ_symbol, OrderRequest};
use crate::types::{ContractDetails, ExitDecision, ExitOutcome, ExitReason, Position};

/// Interval at which the worker evaluates open positions.
const SWEEP_INTERVAL_SECS: u64 = 15;

/// A boxed async option-quote lookup, mirroring `ContextCache::Fetcher`'s
/// shape so quote sourcing stays swappable (paper/backtest feed vs a real
/// market-data collaborator) without widening this module's API.
pub type QuoteFetcher =
    Box<dyn Fn(&ContractDetails) -> Pin<Box<dyn Future<Output = Result<f64, String>> + Send>> + Send + Sync>;

/// The outcome of evaluating one open position during a sweep.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepResult {
    pub position_id: String,
    pub decision: ExitDecision,
    /// `None` in `dry_run` mode, or when the decision was HOLD.
    pub submitted: bool,
}

pub struct ExitWorker {
    ctx: Arc<CoreContext>,
    quote_fetcher: QuoteFetcher,
}

impl ExitWorker {
    pub fn new(ctx: Arc<CoreContext>, quote_fetcher: QuoteFetcher) -> Self {
        Self { ctx, quote_fetcher }
    }

    /// Spawn the periodic sweep loop. Runs forever; intended to be
    /// `tokio::spawn`ed once at startup. Takes `Arc<Self>` rather than
    /// `self` so the same worker can also be triggered on demand (e.g. the
    /// manual-sweep HTTP endpoint) from another `Arc` clone.
    pub async fn run(self: Arc<Self>) {
        info!(interval_secs = SWEEP_INTERVAL_SECS, "exit worker started");
        let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let results = self.sweep(false).await;
            if !results.is_empty() {
                debug!(count = results.len(), "exit worker sweep completed");
            }
        }
    }

    fn contract_is_usable(contract: &ContractDetails) -> bool {
        contract.strike > 0.0 && !contract.expiration.trim().is_empty() && !contract.underlying.trim().is_empty()
    }

    /// Evaluate every open position once. In `dry_run` mode, decisions are
    /// computed and returned but no order is submitted and no position is
    /// mutated.
    pub async fn sweep(&self, dry_run: bool) -> Vec<SweepResult> {
        let guard = match self.ctx.exit_sweep_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("exit sweep already in progress, skipping this tick");
                return Vec::new();
            }
        };

        let positions = self.ctx.position_manager.open_positions();
        let mut results = Vec::with_capacity(positions.len());

        for position in positions {
            if !Self::contract_is_usable(&position.contract) {
                warn!(position_id = %position.id, "skipping exit evaluation: incomplete contract details");
                continue;
            }

            let quote = match (self.quote_fetcher)(&position.contract).await {
                Ok(price) => price,
                Err(reason) => {
                    warn!(position_id = %position.id, %reason, "skipping exit evaluation: quote fetch failed");
                    continue;
                }
            };

            let decision = self.ctx.orchestrator.orchestrate_exit(&position, quote);
            self.ctx
                .metrics
                .record_exit_outcome(decision.decision == ExitOutcome::Exit);
            self.ctx.audit.record_exit("exit-worker", decision.clone());

            let submitted = if decision.decision == ExitOutcome::Exit && !dry_run {
                self.apply_exit(&position, &decision, quote).await
            } else {
                false
            };

            results.push(SweepResult {
                position_id: position.id.clone(),
                decision,
                submitted,
            });
        }

        drop(guard);
        results
    }

    /// Submit the closing order for an EXIT decision and update the
    /// position-manager index. Returns whether the order was submitted.
    async fn apply_exit(&self, position: &Position, decision: &ExitDecision, quote: f64) -> bool {
        let exit_quantity = match decision.exit_reason {
            Some(ExitReason::ProfitTarget) if position.quantity > 1 => position.quantity / 2,
            _ => position.quantity,
        };

        let occ = match occ_symbol(&position.contract) {
            Ok(s) => s,
            Err(e) => {
                error!(position_id = %position.id, reason = %e, "cannot build OCC symbol for exit");
                self.ctx.audit.record_failure("exit-worker", "contract", &e.to_string());
                return false;
            }
        };

        let request = OrderRequest {
            occ_symbol: occ,
            direction: position.direction,
            quantity: exit_quantity,
            reference_price: quote,
        };
        let occ_symbol = request.occ_symbol.clone();

        match self.ctx.adapter.submit_order_with_retry(request, quote).await {
            Ok((order_result, _trade)) => {
                self.ctx.degraded.record_success("adapter");
                let closed = if exit_quantity >= position.quantity {
                    self.ctx.position_manager.close_position(&position.id, order_result.avg_fill_price)
                } else {
                    self.ctx
                        .position_manager
                        .partial_close(&position.id, exit_quantity, order_result.avg_fill_price)
                };
                match closed {
                    Some(updated) => {
                        info!(
                            position_id = %position.id,
                            reason = %decision.exit_reason.map(|r| r.to_string()).unwrap_or_default(),
                            remaining_quantity = updated.quantity,
                            status = ?updated.status,
                            "position exit applied"
                        );
                        true
                    }
                    None => {
                        error!(position_id = %position.id, "exit order filled but position not found");
                        false
                    }
                }
            }
            Err(e) => {
                self.ctx.degraded.record_failure("adapter");
                error!(position_id = %position.id, reason = %e, "exit order submission failed after retry, persisting as rejected");
                self.ctx.audit.record_failure("exit-worker", "adapter", &e.to_string());
                self.ctx
                    .audit
                    .record_rejected_order("exit-worker", &occ_symbol, exit_quantity, &e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::paper::PaperAdapter;
    use crate::broker::Adapter;
    use crate::config::Config;
    use crate::types::Direction;

    fn quote_fetcher(price: f64) -> QuoteFetcher {
        Box::new(move |_contract| Box::pin(async move { Ok(price) }))
    }

    fn failing_quote_fetcher() -> QuoteFetcher {
        Box::new(|_contract| Box::pin(async { Err("quote feed down".to_string()) }))
    }

    fn open_position(ctx: &CoreContext, quantity: u32) -> Position {
        ctx.position_manager
            .open_position(
                "sig-1",
                "SPX",
                Direction::Call,
                quantity,
                100.0,
                ContractDetails {
                    underlying: "SPX".to_string(),
                    strike: 5000.0,
                    expiration: "2026-12-18".to_string(),
                    option_type: Direction::Call,
                    timeframe: "5m".to_string(),
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn profit_target_triggers_partial_exit_and_submits_order() {
        let ctx = Arc::new(CoreContext::new(Config::default(), Adapter::Paper(PaperAdapter::new())));
        open_position(&ctx, 2);

        let worker = ExitWorker::new(ctx.clone(), quote_fetcher(200.0));
        let results = worker.sweep(false).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].decision.decision, ExitOutcome::Exit);
        assert_eq!(results[0].decision.exit_reason, Some(ExitReason::ProfitTarget));
        assert!(results[0].submitted);

        let remaining = ctx.position_manager.open_positions();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].quantity, 1);
    }

    #[tokio::test]
    async fn dry_run_evaluates_without_mutating_positions() {
        let ctx = Arc::new(CoreContext::new(Config::default(), Adapter::Paper(PaperAdapter::new())));
        open_position(&ctx, 2);

        let worker = ExitWorker::new(ctx.clone(), quote_fetcher(200.0));
        let results = worker.sweep(true).await;

        assert_eq!(results[0].decision.decision, ExitOutcome::Exit);
        assert!(!results[0].submitted);
        assert_eq!(ctx.position_manager.open_positions()[0].quantity, 2);
    }

    #[tokio::test]
    async fn quote_fetch_failure_skips_the_position() {
        let ctx = Arc::new(CoreContext::new(Config::default(), Adapter::Paper(PaperAdapter::new())));
        open_position(&ctx, 1);

        let worker = ExitWorker::new(ctx.clone(), failing_quote_fetcher());
        let results = worker.sweep(false).await;

        assert!(results.is_empty());
        assert_eq!(ctx.position_manager.open_positions().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_sweep_is_skipped_while_one_is_running() {
        let ctx = Arc::new(CoreContext::new(Config::default(), Adapter::Paper(PaperAdapter::new())));
        open_position(&ctx, 1);

        let _guard = ctx.exit_sweep_gate.try_lock().unwrap();
        let worker = ExitWorker::new(ctx.clone(), quote_fetcher(100.0));
        let results = worker.sweep(false).await;
        assert!(results.is_empty());
    }
}
