// =============================================================================
// Signal Pipeline (C11) — end-to-end webhook-to-decision glue
// =============================================================================
//
// Mirrors `main.rs`'s background-task-per-concern wiring and `api/rest.rs`'s
// handler style: the HTTP layer stays a thin `impl IntoResponse` shim, all of
// the actual work happens here. Per request: assign a correlationId, branch
// CONTEXT vs TRADING, run Parse→Validate→Dedup synchronously so the caller
// gets an immediate accept/reject, then hand the rest (Orchestrator → Adapter
// → Position backfill) to a spawned task so the webhook response never blocks
// on broker latency.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app_state::CoreContext;
use crate::broker::{occ_symbol, OrderRequest};
use crate::error::FlowgateError;
use crate::types::{ContextData, ContractDetails, EntryOutcome, Regime, Signal, Trend};
use crate::webhook::normalizer::{self, NormalizeOutcome};
use crate::webhook::validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Accepted,
    Duplicate,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub status: WebhookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    pub correlation_id: String,
    pub processing_time_ms: u64,
}

impl WebhookResponse {
    /// HTTP status code the caller should respond with.
    pub fn http_status(&self) -> u16 {
        match self.status {
            WebhookStatus::Accepted | WebhookStatus::Duplicate => 200,
            WebhookStatus::Rejected => 400,
            WebhookStatus::Error => 500,
        }
    }
}

fn is_context_payload(raw: &Value) -> bool {
    raw.get("type")
        .and_then(Value::as_str)
        .map(|t| t.eq_ignore_ascii_case("CONTEXT"))
        .unwrap_or(false)
}

fn parse_trend(raw: &Value) -> Result<Trend, FlowgateError> {
    let value = raw
        .get("trend")
        .and_then(Value::as_str)
        .ok_or_else(|| FlowgateError::ParseError("CONTEXT payload missing trend field".to_string()))?;
    match value.to_ascii_uppercase().as_str() {
        "BULLISH" => Ok(Trend::Bullish),
        "BEARISH" => Ok(Trend::Bearish),
        "NEUTRAL" => Ok(Trend::Neutral),
        other => Err(FlowgateError::ParseError(format!("unrecognized trend '{other}'"))),
    }
}

fn parse_regime(raw: &Value) -> Result<Regime, FlowgateError> {
    let value = raw
        .get("regime")
        .and_then(Value::as_str)
        .ok_or_else(|| FlowgateError::ParseError("CONTEXT payload missing regime field".to_string()))?;
    match value.to_ascii_uppercase().as_str() {
        "LOW_VOL" => Ok(Regime::LowVol),
        "HIGH_VOL" => Ok(Regime::HighVol),
        "NORMAL" => Ok(Regime::Normal),
        other => Err(FlowgateError::ParseError(format!("unrecognized regime '{other}'"))),
    }
}

fn parse_context_payload(raw: &Value) -> Result<ContextData, FlowgateError> {
    let vix = raw
        .get("vix")
        .and_then(Value::as_f64)
        .ok_or_else(|| FlowgateError::ParseError("CONTEXT payload missing vix field".to_string()))?;
    let bias = raw
        .get("bias")
        .and_then(Value::as_f64)
        .ok_or_else(|| FlowgateError::ParseError("CONTEXT payload missing bias field".to_string()))?;
    let trend = parse_trend(raw)?;
    let regime = parse_regime(raw)?;
    let timestamp = normalizer::parse_timestamp(raw).unwrap_or_else(|_| chrono::Utc::now());

    Ok(ContextData {
        vix,
        trend,
        bias,
        regime,
        timestamp,
    })
}

/// Read the strike/expiration metadata a trading webhook carries alongside
/// the canonical `Signal` fields, and assemble the `ContractDetails` needed
/// to resolve an OCC symbol.
fn resolve_contract(signal: &Signal) -> Result<ContractDetails, FlowgateError> {
    let strike: f64 = signal
        .metadata_get("strike")
        .ok_or_else(|| FlowgateError::ParseError("signal missing 'strike' metadata".to_string()))?
        .parse()
        .map_err(|_| FlowgateError::ParseError("signal 'strike' metadata is not numeric".to_string()))?;

    let expiration = signal
        .metadata_get("expiration")
        .ok_or_else(|| FlowgateError::ParseError("signal missing 'expiration' metadata".to_string()))?
        .to_string();

    Ok(ContractDetails {
        underlying: signal.symbol.clone(),
        strike,
        expiration,
        option_type: signal.direction,
        timeframe: signal.timeframe.clone(),
    })
}

/// Entry point for `POST /webhook`. Runs Parse→Validate→Dedup inline and
/// returns immediately; a matched trading signal's Orchestrator/Adapter/
/// Position work is handed off to a spawned task.
pub async fn handle_webhook(ctx: Arc<CoreContext>, raw: Value) -> WebhookResponse {
    let correlation_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    if is_context_payload(&raw) {
        return handle_context_webhook(&ctx, raw, correlation_id, started);
    }

    let signal = match normalizer::normalize(&raw) {
        Ok(NormalizeOutcome::Parsed(signal)) => signal,
        Ok(NormalizeOutcome::TestPing { source }) => {
            info!(%correlation_id, %source, "test ping acknowledged");
            return WebhookResponse {
                status: WebhookStatus::Accepted,
                signal_id: None,
                correlation_id,
                processing_time_ms: elapsed_ms(started),
            };
        }
        Err(e) => {
            warn!(%correlation_id, stage = e.stage(), reason = %e, "webhook parse failed");
            ctx.audit.record_failure(&correlation_id, e.stage(), &e.to_string());
            ctx.metrics.record_pipeline_failure();
            ctx.metrics.record_signal_rejected();
            return WebhookResponse {
                status: WebhookStatus::Rejected,
                signal_id: None,
                correlation_id,
                processing_time_ms: elapsed_ms(started),
            };
        }
    };

    let vix_hint = ctx.context_cache.get().await.ok().map(|c| c.vix);
    let validation_config = ctx.config.read().validation.clone();
    if let Some(reason) = validator::validate(&signal, &validation_config, vix_hint) {
        warn!(%correlation_id, signal_id = %signal.id, %reason, "webhook validation failed");
        ctx.audit.record_failure(&correlation_id, "validate", &reason);
        ctx.metrics.record_pipeline_failure();
        ctx.metrics.record_signal_rejected();
        return WebhookResponse {
            status: WebhookStatus::Rejected,
            signal_id: Some(signal.id),
            correlation_id,
            processing_time_ms: elapsed_ms(started),
        };
    }

    if ctx.dedup.check_and_insert(&signal) {
        info!(%correlation_id, signal_id = %signal.id, "duplicate signal");
        return WebhookResponse {
            status: WebhookStatus::Duplicate,
            signal_id: Some(signal.id),
            correlation_id,
            processing_time_ms: elapsed_ms(started),
        };
    }

    ctx.metrics.record_signal_accepted();
    let peer_signals = ctx.recent_signals();
    ctx.record_signal(signal.clone());

    let signal_id = signal.id.clone();
    let completion_ctx = ctx.clone();
    let completion_correlation_id = correlation_id.clone();
    tokio::spawn(async move {
        complete_entry(completion_ctx, signal, peer_signals, completion_correlation_id).await;
    });

    WebhookResponse {
        status: WebhookStatus::Accepted,
        signal_id: Some(signal_id),
        correlation_id,
        processing_time_ms: elapsed_ms(started),
    }
}

fn handle_context_webhook(
    ctx: &Arc<CoreContext>,
    raw: Value,
    correlation_id: String,
    started: Instant,
) -> WebhookResponse {
    match parse_context_payload(&raw) {
        Ok(data) => {
            info!(%correlation_id, vix = data.vix, trend = %format!("{:?}", data.trend), "context snapshot updated");
            ctx.context_store.push(data);
            WebhookResponse {
                status: WebhookStatus::Accepted,
                signal_id: None,
                correlation_id,
                processing_time_ms: elapsed_ms(started),
            }
        }
        Err(e) => {
            warn!(%correlation_id, reason = %e, "CONTEXT webhook parse failed");
            ctx.audit.record_failure(&correlation_id, "context_parse", &e.to_string());
            ctx.metrics.record_pipeline_failure();
            WebhookResponse {
                status: WebhookStatus::Rejected,
                signal_id: None,
                correlation_id,
                processing_time_ms: elapsed_ms(started),
            }
        }
    }
}

/// Asynchronous completion of an accepted trading signal: Orchestrator
/// decision, and on ENTER, order submission + position backfill. Runs after
/// the webhook response has already been returned to the caller.
async fn complete_entry(ctx: Arc<CoreContext>, signal: Signal, peer_signals: Vec<Signal>, correlation_id: String) {
    let started = Instant::now();
    let decision = ctx.orchestrator.orchestrate_entry(signal, &peer_signals).await;
    ctx.metrics.record_decision_latency(started.elapsed().as_millis() as u64);
    ctx.metrics
        .record_entry_outcome(decision.decision == EntryOutcome::Enter);

    let entered = decision.decision == EntryOutcome::Enter;
    let signal_id = decision.signal.id.clone();
    let record = ctx.audit.record_entry(&correlation_id, decision.clone());
    info!(
        %correlation_id,
        signal_id = %signal_id,
        decision = ?record.decision.decision,
        confidence = record.decision.confidence,
        "entry decision recorded"
    );

    if !entered {
        return;
    }

    let contract = match resolve_contract(&decision.signal) {
        Ok(c) => c,
        Err(e) => {
            error!(%correlation_id, signal_id = %signal_id, reason = %e, "cannot resolve contract for ENTER decision");
            ctx.audit.record_failure(&correlation_id, "contract", &e.to_string());
            ctx.metrics.record_pipeline_failure();
            return;
        }
    };

    let occ = match occ_symbol(&contract) {
        Ok(s) => s,
        Err(e) => {
            error!(%correlation_id, signal_id = %signal_id, reason = %e, "cannot build OCC symbol for ENTER decision");
            ctx.audit.record_failure(&correlation_id, "contract", &e.to_string());
            ctx.metrics.record_pipeline_failure();
            return;
        }
    };

    let request = OrderRequest {
        occ_symbol: occ,
        direction: decision.signal.direction,
        quantity: decision.position_size,
        reference_price: decision.signal.price,
    };
    let occ_symbol = request.occ_symbol.clone();
    let quantity = request.quantity;

    match ctx.adapter.submit_order_with_retry(request, decision.signal.price).await {
        Ok((order_result, _trade)) => {
            ctx.degraded.record_success("adapter");
            match ctx.position_manager.open_position(
                &signal_id,
                &decision.signal.symbol,
                decision.signal.direction,
                order_result.filled_quantity.max(1),
                order_result.avg_fill_price,
                contract,
            ) {
                Ok(position) => info!(%correlation_id, position_id = %position.id, "position opened"),
                Err(e) => {
                    error!(%correlation_id, signal_id = %signal_id, reason = %e, "failed to open position after fill");
                    ctx.audit.record_failure(&correlation_id, "persistence", &e.to_string());
                }
            }
        }
        Err(e) => {
            ctx.degraded.record_failure("adapter");
            error!(%correlation_id, signal_id = %signal_id, reason = %e, "order submission failed after retry, persisting as rejected");
            ctx.audit.record_failure(&correlation_id, "adapter", &e.to_string());
            ctx.audit.record_rejected_order(&correlation_id, &occ_symbol, quantity, &e.to_string());
            ctx.metrics.record_pipeline_failure();
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
