// =============================================================================
// Normalizer (C1) — heterogeneous webhook payload → canonical Signal
// =============================================================================
//
// Upstream indicators emit differently-shaped JSON. Source is detected by
// inspecting discriminator fields, the same sequential if/else-if style the
// teacher uses in its filter chains rather than a generic schema merge.
// CONTEXT-type payloads are branched off before reaching this module (at the
// Pipeline level); test pings are reported as a distinct non-error outcome so
// the caller can ack without treating them as parse failures.
// =============================================================================

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::FlowgateError;
use crate::types::{Direction, Signal, SignalSource};

pub enum NormalizeOutcome {
    Parsed(Signal),
    /// Payload marked as a heartbeat/test ping — ack, do not pipeline further.
    TestPing { source: SignalSource },
}

/// Detect the originating indicator from discriminator fields on the raw
/// payload. Explicit `source`/`origin` strings win; otherwise we fall back to
/// shape-based sniffing.
fn detect_source(raw: &Value) -> SignalSource {
    if let Some(explicit) = raw
        .get("source")
        .or_else(|| raw.get("origin"))
        .and_then(Value::as_str)
    {
        return match explicit.to_ascii_uppercase().as_str() {
            "GEX" => SignalSource::Gex,
            "MTF" => SignalSource::Mtf,
            "MANUAL" => SignalSource::Manual,
            _ => SignalSource::TradingView,
        };
    }

    if raw.get("gex_strength").is_some() || raw.get("gamma_flip").is_some() {
        SignalSource::Gex
    } else if raw.get("timeframe_confluence").is_some() || raw.get("mtf_score").is_some() {
        SignalSource::Mtf
    } else if raw
        .get("manual")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        SignalSource::Manual
    } else {
        SignalSource::TradingView
    }
}

fn is_test_ping(raw: &Value) -> bool {
    if let Some(t) = raw.get("type").and_then(Value::as_str) {
        if t.eq_ignore_ascii_case("PING") || t.eq_ignore_ascii_case("HEARTBEAT") {
            return true;
        }
    }
    raw.get("ping").and_then(Value::as_bool).unwrap_or(false)
}

fn parse_direction(raw: &Value) -> Result<Direction, FlowgateError> {
    let value = raw
        .get("direction")
        .or_else(|| raw.get("side"))
        .or_else(|| raw.get("action"))
        .and_then(Value::as_str)
        .ok_or_else(|| FlowgateError::ParseError("missing direction field".to_string()))?;

    match value.to_ascii_uppercase().as_str() {
        "CALL" | "BUY" | "LONG" => Ok(Direction::Call),
        "PUT" | "SELL" | "SHORT" => Ok(Direction::Put),
        other => Err(FlowgateError::ParseError(format!(
            "unrecognized direction '{other}'"
        ))),
    }
}

/// OQ1: try aliases in fixed priority order, first non-empty wins. One nested
/// fallback (`payload.timestamp`) covers TradingView-style wrapped alerts.
pub(crate) fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, FlowgateError> {
    let candidates = [
        raw.get("timestamp"),
        raw.get("time"),
        raw.get("signal_time"),
        raw.get("payload").and_then(|p| p.get("timestamp")),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Some(parsed) = parse_timestamp_value(candidate) {
            return Ok(parsed);
        }
    }

    Err(FlowgateError::ParseError(
        "no usable timestamp field (timestamp/time/signal_time/payload.timestamp)".to_string(),
    ))
}

fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) if !s.is_empty() => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| DateTime::from_timestamp_millis(millis)),
        _ => None,
    }
}

fn parse_symbol(raw: &Value) -> Result<String, FlowgateError> {
    raw.get("symbol")
        .or_else(|| raw.get("ticker"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FlowgateError::ParseError("missing symbol field".to_string()))
}

fn parse_timeframe(raw: &Value) -> Result<String, FlowgateError> {
    raw.get("timeframe")
        .or_else(|| raw.get("interval"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FlowgateError::ParseError("missing timeframe field".to_string()))
}

fn parse_price(raw: &Value) -> Result<f64, FlowgateError> {
    raw.get("price")
        .or_else(|| raw.get("close"))
        .and_then(Value::as_f64)
        .ok_or_else(|| FlowgateError::ParseError("missing price field".to_string()))
}

fn parse_metadata(raw: &Value) -> std::collections::HashMap<String, String> {
    let mut metadata = std::collections::HashMap::new();
    if let Some(obj) = raw.get("metadata").and_then(Value::as_object) {
        for (k, v) in obj {
            if let Some(s) = v.as_str() {
                metadata.insert(k.clone(), s.to_string());
            } else {
                metadata.insert(k.clone(), v.to_string());
            }
        }
    }
    metadata
}

/// Parse a raw webhook body (already identified as non-CONTEXT) into a
/// canonical `Signal`, or surface a test ping.
pub fn normalize(raw: &Value) -> Result<NormalizeOutcome, FlowgateError> {
    let source = detect_source(raw);

    if is_test_ping(raw) {
        return Ok(NormalizeOutcome::TestPing { source });
    }

    let direction = parse_direction(raw)?;
    let symbol = parse_symbol(raw)?;
    let timeframe = parse_timeframe(raw)?;
    let timestamp = parse_timestamp(raw)?;
    let price = parse_price(raw)?;
    let metadata = parse_metadata(raw);

    Ok(NormalizeOutcome::Parsed(Signal {
        id: Uuid::new_v4().to_string(),
        source,
        symbol,
        direction,
        timeframe,
        timestamp,
        metadata,
        price,
    }))
}
