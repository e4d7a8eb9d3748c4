// =============================================================================
// Decision Orchestrator (C10) — composes C4–C9 into Entry/Exit Decisions
// =============================================================================
//
// Entry flow fetches context (single-flight, 5 s timeout baked into the
// `ContextCache`), applies the Risk Manager's market filters, pulls the
// latest GEX row, runs the confidence adjustment chain, sizes the position,
// and checks exposure headroom — mirroring `strategy.rs::evaluate_symbol`'s
// ordered-pipeline shape with auditable intermediates at every step.
//
// Exit flow evaluates PROFIT_TARGET, STOP_LOSS, GEX_FLIP, and TIME_EXIT in
// strict priority order, first match wins, matching `execution.rs`'s
// risk-pre-check-before-execution pattern: every check runs to completion
// and a HOLD is only ever the absence of a match, never a crash.
// =============================================================================

use std::sync::Arc;

use chrono::{NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::config::Config;
use crate::confluence::{self, SourceWeights};
use crate::context_cache::ContextCache;
use crate::gex::GexService;
use crate::position_manager::PositionManager;
use crate::risk::RiskManager;
use crate::sizing;
use crate::types::{
    ConfidenceCalculations, EntryCalculations, EntryDecision, EntryOutcome, ExitCalculations,
    ExitDecision, ExitOutcome, ExitReason, Position, Signal,
};

pub struct Orchestrator {
    context_cache: Arc<ContextCache>,
    gex_service: Arc<GexService>,
    risk_manager: Arc<RiskManager>,
    position_manager: Arc<PositionManager>,
    confluence_weights: SourceWeights,
    config: Arc<parking_lot::RwLock<Config>>,
}

impl Orchestrator {
    pub fn new(
        context_cache: Arc<ContextCache>,
        gex_service: Arc<GexService>,
        risk_manager: Arc<RiskManager>,
        position_manager: Arc<PositionManager>,
        confluence_weights: SourceWeights,
        config: Arc<parking_lot::RwLock<Config>>,
    ) -> Self {
        Self {
            context_cache,
            gex_service,
            risk_manager,
            position_manager,
            confluence_weights,
            config,
        }
    }

    fn reject(signal: Signal, reason: String, calculations: EntryCalculations) -> EntryDecision {
        EntryDecision {
            decision: EntryOutcome::Reject,
            signal,
            confidence: calculations.confidence.r#final,
            position_size: 0,
            reasoning: vec![reason],
            calculations,
        }
    }

    /// Step 1-8 of the entry flow. Never returns an `Err` — every recoverable
    /// failure mode downgrades to a REJECT decision with a human-readable
    /// reason, matching the "never crash the pipeline" error policy.
    pub async fn orchestrate_entry(&self, signal: Signal, peer_signals: &[Signal]) -> EntryDecision {
        let mut reasoning = Vec::new();
        let mut calculations = EntryCalculations::default();

        // Step 1: context fetch. `ContextCache` already enforces its own
        // fetch timeout and single-flight coordination.
        let context = match self.context_cache.get().await {
            Ok(context) => context,
            Err(e) => {
                return Self::reject(signal, format!("Market data unavailable: {e}"), calculations);
            }
        };

        // Step 2: market filters.
        let market_filter = self.risk_manager.apply_market_filters(&context);
        if !market_filter.passed {
            let reason = market_filter
                .rejection_reason
                .unwrap_or("rejected by market filters")
                .to_string();
            return Self::reject(signal, reason, calculations);
        }

        // Steps 4-5: confidence adjustment chain.
        let (base, gex_range) = {
            let cfg = self.config.read();
            (cfg.confidence.base_confidence, cfg.confidence.gex_adjustment_range)
        };

        // Step 3: GEX, degrading to gexΔ=0 when nothing has been ingested.
        let gex_delta = match self
            .gex_service
            .get_latest_signal(&signal.symbol, &signal.timeframe)
        {
            Some(gex) => {
                let weight = self.gex_service.effective_weight(&gex);
                (gex.strength * weight * gex_range as f64).round() as i32
            }
            None => {
                reasoning.push("GEX signal unavailable; gexΔ=0".to_string());
                0
            }
        };

        let context_delta = self.risk_manager.context_adjustment(&signal, &context);
        let positioning_delta = self.risk_manager.positioning_adjustment(&context);
        let gex_delta = gex_delta.clamp(-gex_range, gex_range);

        let confluence_score = confluence::confluence_score(&signal, peer_signals, &self.confluence_weights);
        let confluence_boost = if confluence_score >= 0.7 { 10 } else { 0 };

        let final_confidence =
            (base + context_delta + positioning_delta + gex_delta + confluence_boost).clamp(0, 100);

        calculations.confidence = ConfidenceCalculations {
            base,
            context_delta,
            positioning_delta,
            gex_delta,
            confluence_boost,
            r#final: final_confidence,
        };
        calculations.confluence_score = confluence_score;

        reasoning.push(format!(
            "confidence {base} base + {context_delta} context + {positioning_delta} positioning + {gex_delta} gex + {confluence_boost} confluence = {final_confidence}"
        ));

        // Step 6: position sizing.
        let sizing_config = self.config.read().sizing.clone();
        let (size, sizing_calc) = sizing::compute_size(
            final_confidence,
            context.regime,
            confluence_score,
            market_filter.position_size_multiplier,
            &sizing_config,
        );
        calculations.sizing = sizing_calc;

        if size == 0 || (size as f64) < sizing_config.min_size {
            reasoning.push("computed position size below minimum".to_string());
            return EntryDecision {
                decision: EntryOutcome::Reject,
                signal,
                confidence: final_confidence,
                position_size: 0,
                reasoning,
                calculations,
            };
        }

        // Step 7: exposure check.
        let max_total_exposure = self.config.read().risk.max_total_exposure;
        let additional = signal.price * size as f64 * crate::types::CONTRACT_MULTIPLIER;
        if self
            .position_manager
            .would_exceed_max_exposure(additional, max_total_exposure)
        {
            reasoning.push("would exceed max total exposure".to_string());
            return EntryDecision {
                decision: EntryOutcome::Reject,
                signal,
                confidence: final_confidence,
                position_size: 0,
                reasoning,
                calculations,
            };
        }

        // Step 8: enter.
        reasoning.push(format!("ENTER with position size {size}"));
        EntryDecision {
            decision: EntryOutcome::Enter,
            signal,
            confidence: final_confidence,
            position_size: size,
            reasoning,
            calculations,
        }
    }

    /// Priority order: PROFIT_TARGET → STOP_LOSS → GEX_FLIP → TIME_EXIT.
    /// First match wins. GEX service degradation (fewer than two rows seen)
    /// simply yields `has_flipped = false`; it never blocks the profit/stop
    /// checks ahead of it.
    pub fn orchestrate_exit(&self, position: &Position, current_price: f64) -> ExitDecision {
        let pnl = position.unrealized_pnl_at(current_price);
        let pnl_pct = position.unrealized_pnl_pct_at(current_price);
        let calculations = ExitCalculations {
            current_pnl: pnl,
            current_pnl_pct: pnl_pct,
        };

        let (profit_target, stop_loss) = {
            let cfg = self.config.read();
            (cfg.exit.profit_target_percent, cfg.exit.stop_loss_percent)
        };

        if pnl_pct >= profit_target {
            return ExitDecision {
                decision: ExitOutcome::Exit,
                position: position.clone(),
                exit_reason: Some(ExitReason::ProfitTarget),
                reasoning: vec![format!("pnl% {pnl_pct:.2} reached profit target {profit_target:.2}")],
                calculations,
            };
        }

        if pnl_pct <= stop_loss {
            return ExitDecision {
                decision: ExitOutcome::Exit,
                position: position.clone(),
                exit_reason: Some(ExitReason::StopLoss),
                reasoning: vec![format!("pnl% {pnl_pct:.2} breached stop loss {stop_loss:.2}")],
                calculations,
            };
        }

        let flip = self
            .gex_service
            .detect_flip(&position.symbol, &position.contract.timeframe);
        if flip.has_flipped {
            if let Some(current) = &flip.current {
                if current.direction != position.direction {
                    return ExitDecision {
                        decision: ExitOutcome::Exit,
                        position: position.clone(),
                        exit_reason: Some(ExitReason::GexFlip),
                        reasoning: vec!["GEX flip now opposes position direction".to_string()],
                        calculations,
                    };
                }
            }
        }

        let validation_config = self.config.read().validation.clone();
        if is_past_market_close(&validation_config, Utc::now()) {
            return ExitDecision {
                decision: ExitOutcome::Exit,
                position: position.clone(),
                exit_reason: Some(ExitReason::TimeExit),
                reasoning: vec!["current time at or past market close".to_string()],
                calculations,
            };
        }

        ExitDecision {
            decision: ExitOutcome::Hold,
            position: position.clone(),
            exit_reason: None,
            reasoning: vec!["no exit condition met".to_string()],
            calculations,
        }
    }
}

fn is_past_market_close(config: &crate::config::ValidationConfig, now: chrono::DateTime<Utc>) -> bool {
    let tz: Tz = match config.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = %config.timezone, "invalid configured timezone, skipping TIME_EXIT check");
            return false;
        }
    };
    let close = match NaiveTime::parse_from_str(&config.market_hours_end, "%H:%M") {
        Ok(t) => t,
        Err(_) => return false,
    };
    let local_now = tz.from_utc_datetime(&now.naive_utc());
    local_now.time() >= close
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ValidationConfig};
    use crate::context_cache::Fetcher;
    use crate::types::{ContractDetails, Direction, GexSignal, PositionStatus, Regime, Trend};
    use std::collections::HashMap;
    use tokio::time::Duration;

    fn sample_context(vix: f64) -> crate::types::ContextData {
        crate::types::ContextData {
            vix,
            trend: Trend::Bullish,
            bias: 0.2,
            regime: Regime::Normal,
            timestamp: Utc::now(),
        }
    }

    fn ok_fetcher(vix: f64) -> Fetcher {
        Box::new(move || Box::pin(async move { Ok(sample_context(vix)) }))
    }

    fn sample_signal(price: f64) -> Signal {
        Signal {
            id: "sig-1".to_string(),
            source: crate::types::SignalSource::TradingView,
            symbol: "SPX".to_string(),
            direction: Direction::Call,
            timeframe: "5m".to_string(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            price,
        }
    }

    fn orchestrator() -> Orchestrator {
        let context_cache = Arc::new(ContextCache::new(60, Duration::from_secs(5), ok_fetcher(18.0)));
        let gex_service = Arc::new(GexService::new(240, 0.5));
        let config = Config::default();
        let risk_manager = Arc::new(RiskManager::new(config.risk.clone(), config.confidence.clone()));
        let position_manager = Arc::new(PositionManager::new());
        Orchestrator::new(
            context_cache,
            gex_service,
            risk_manager,
            position_manager,
            SourceWeights::default(),
            Arc::new(parking_lot::RwLock::new(config)),
        )
    }

    #[tokio::test]
    async fn enters_on_favourable_signal() {
        let orch = orchestrator();
        let decision = orch.orchestrate_entry(sample_signal(5.0), &[]).await;
        assert_eq!(decision.decision, EntryOutcome::Enter);
        assert!(decision.position_size > 0);
    }

    #[tokio::test]
    async fn rejects_when_context_unavailable() {
        let context_cache = Arc::new(ContextCache::new(
            60,
            Duration::from_secs(5),
            Box::new(|| Box::pin(async { Err("down".to_string()) })),
        ));
        let config = Config::default();
        let orch = Orchestrator::new(
            context_cache,
            Arc::new(GexService::new(240, 0.5)),
            Arc::new(RiskManager::new(config.risk.clone(), config.confidence.clone())),
            Arc::new(PositionManager::new()),
            SourceWeights::default(),
            Arc::new(parking_lot::RwLock::new(config)),
        );
        let decision = orch.orchestrate_entry(sample_signal(5.0), &[]).await;
        assert_eq!(decision.decision, EntryOutcome::Reject);
        assert!(decision.reasoning[0].contains("Market data unavailable"));
    }

    #[tokio::test]
    async fn rejects_when_exposure_would_be_exceeded() {
        let context_cache = Arc::new(ContextCache::new(60, Duration::from_secs(5), ok_fetcher(18.0)));
        let mut config = Config::default();
        config.risk.max_total_exposure = 1.0;
        let risk_manager = Arc::new(RiskManager::new(config.risk.clone(), config.confidence.clone()));
        let orch = Orchestrator::new(
            context_cache,
            Arc::new(GexService::new(240, 0.5)),
            risk_manager,
            Arc::new(PositionManager::new()),
            SourceWeights::default(),
            Arc::new(parking_lot::RwLock::new(config)),
        );
        let decision = orch.orchestrate_entry(sample_signal(500.0), &[]).await;
        assert_eq!(decision.decision, EntryOutcome::Reject);
    }

    fn sample_position(direction: Direction, entry_price: f64) -> Position {
        Position {
            id: "pos-1".to_string(),
            signal_id: "sig-1".to_string(),
            symbol: "SPX".to_string(),
            direction,
            quantity: 2,
            entry_price,
            entry_time: Utc::now(),
            current_price: None,
            unrealized_pnl: None,
            exit_price: None,
            exit_time: None,
            realized_pnl: None,
            status: PositionStatus::Open,
            contract: ContractDetails {
                underlying: "SPX".to_string(),
                strike: 5000.0,
                expiration: "2026-12-18".to_string(),
                option_type: direction,
                timeframe: "5m".to_string(),
            },
        }
    }

    #[test]
    fn exits_on_profit_target() {
        let orch = orchestrator();
        let position = sample_position(Direction::Call, 5.0);
        let decision = orch.orchestrate_exit(&position, 10.0); // +100%
        assert_eq!(decision.decision, ExitOutcome::Exit);
        assert_eq!(decision.exit_reason, Some(ExitReason::ProfitTarget));
    }

    #[test]
    fn exits_on_stop_loss() {
        let orch = orchestrator();
        let position = sample_position(Direction::Call, 10.0);
        let decision = orch.orchestrate_exit(&position, 5.0); // -50%
        assert_eq!(decision.decision, ExitOutcome::Exit);
        assert_eq!(decision.exit_reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn holds_when_nothing_triggers() {
        let orch = orchestrator();
        let config = Config::default();
        // widen the window so TIME_EXIT can't spuriously trigger in tests
        {
            let mut cfg = orch.config.write();
            cfg.validation = ValidationConfig {
                market_hours_end: "23:59".to_string(),
                ..config.validation
            };
        }
        let position = sample_position(Direction::Call, 10.0);
        let decision = orch.orchestrate_exit(&position, 10.2); // +2%, inside both bands
        assert_eq!(decision.decision, ExitOutcome::Hold);
    }

    #[test]
    fn gex_flip_against_position_triggers_exit() {
        let orch = orchestrator();
        orch.gex_service.ingest(GexSignal {
            symbol: "SPX".to_string(),
            timeframe: "5m".to_string(),
            strength: 0.4,
            direction: Direction::Call,
            timestamp: Utc::now() - chrono::Duration::minutes(5),
        });
        orch.gex_service.ingest(GexSignal {
            symbol: "SPX".to_string(),
            timeframe: "5m".to_string(),
            strength: -0.4,
            direction: Direction::Put,
            timestamp: Utc::now(),
        });
        {
            let mut cfg = orch.config.write();
            cfg.validation.market_hours_end = "23:59".to_string();
        }
        let position = sample_position(Direction::Call, 10.0);
        let decision = orch.orchestrate_exit(&position, 10.2);
        assert_eq!(decision.decision, ExitOutcome::Exit);
        assert_eq!(decision.exit_reason, Some(ExitReason::GexFlip));
    }
}
