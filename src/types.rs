// =============================================================================
// Canonical data model shared across the options decision pipeline
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Where a signal originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalSource {
    #[serde(rename = "TRADINGVIEW")]
    TradingView,
    #[serde(rename = "GEX")]
    Gex,
    #[serde(rename = "MTF")]
    Mtf,
    #[serde(rename = "MANUAL")]
    Manual,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TradingView => write!(f, "TRADINGVIEW"),
            Self::Gex => write!(f, "GEX"),
            Self::Mtf => write!(f, "MTF"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Option side. "CALL" bullish, "PUT" bearish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "CALL")]
    Call,
    #[serde(rename = "PUT")]
    Put,
}

impl Direction {
    /// Whether this direction agrees with a bullish/bearish trend label.
    pub fn aligned_with_trend(&self, trend: Trend) -> bool {
        matches!(
            (self, trend),
            (Direction::Call, Trend::Bullish) | (Direction::Put, Trend::Bearish)
        )
    }

    pub fn opposes_trend(&self, trend: Trend) -> bool {
        matches!(
            (self, trend),
            (Direction::Call, Trend::Bearish) | (Direction::Put, Trend::Bullish)
        )
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// Canonical event produced by the Normalizer (C1) from a raw webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub source: SignalSource,
    pub symbol: String,
    pub direction: Direction,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Reference price at signal time, used for sizing/exposure math.
    pub price: f64,
}

impl Signal {
    /// Typed accessor for a recognized metadata key.
    pub fn metadata_get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContextData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "BULLISH")]
    Bullish,
    #[serde(rename = "BEARISH")]
    Bearish,
    #[serde(rename = "NEUTRAL")]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    #[serde(rename = "LOW_VOL")]
    LowVol,
    #[serde(rename = "HIGH_VOL")]
    HighVol,
    #[serde(rename = "NORMAL")]
    Normal,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowVol => write!(f, "LOW_VOL"),
            Self::HighVol => write!(f, "HIGH_VOL"),
            Self::Normal => write!(f, "NORMAL"),
        }
    }
}

/// Market snapshot refreshed on CONTEXT webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextData {
    pub vix: f64,
    pub trend: Trend,
    /// In [-1, 1].
    pub bias: f64,
    pub regime: Regime,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// GEXSignal
// ---------------------------------------------------------------------------

/// Gamma-exposure positioning indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GexSignal {
    pub symbol: String,
    pub timeframe: String,
    /// In [-1, 1].
    pub strength: f64,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

/// Options-multiplier used for P&L and exposure math throughout the system.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Contract details needed to resolve a quote and build an OCC symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDetails {
    pub underlying: String,
    pub strike: f64,
    /// Expiration date, YYYY-MM-DD.
    pub expiration: String,
    pub option_type: Direction,
    pub timeframe: String,
}

/// An open or closed options position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub signal_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: u32,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub unrealized_pnl: Option<f64>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub realized_pnl: Option<f64>,
    pub status: PositionStatus,
    pub contract: ContractDetails,
}

impl Position {
    /// `(currentPrice − entryPrice) × quantity × 100`.
    pub fn unrealized_pnl_at(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.quantity as f64 * CONTRACT_MULTIPLIER
    }

    /// Percentage P&L relative to entry notional.
    pub fn unrealized_pnl_pct_at(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        ((current_price - self.entry_price) / self.entry_price) * 100.0
    }

    pub fn exposure(&self) -> f64 {
        self.entry_price * self.quantity as f64 * CONTRACT_MULTIPLIER
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOutcome {
    #[serde(rename = "ENTER")]
    Enter,
    #[serde(rename = "REJECT")]
    Reject,
}

/// Auditable intermediate multipliers from Position Sizing (C8).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SizingCalculations {
    pub after_base: f64,
    pub after_kelly: f64,
    pub after_regime: f64,
    pub after_confluence: f64,
    pub vix_multiplier: f64,
    pub capped: f64,
}

/// Auditable confidence adjustments from the Orchestrator (C10).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfidenceCalculations {
    pub base: i32,
    pub context_delta: i32,
    pub positioning_delta: i32,
    pub gex_delta: i32,
    pub confluence_boost: i32,
    pub r#final: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryCalculations {
    pub confidence: ConfidenceCalculations,
    pub sizing: SizingCalculations,
    pub confluence_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDecision {
    pub decision: EntryOutcome,
    pub signal: Signal,
    pub confidence: i32,
    pub position_size: u32,
    pub reasoning: Vec<String>,
    pub calculations: EntryCalculations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitOutcome {
    #[serde(rename = "EXIT")]
    Exit,
    #[serde(rename = "HOLD")]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "PROFIT_TARGET")]
    ProfitTarget,
    #[serde(rename = "STOP_LOSS")]
    StopLoss,
    #[serde(rename = "GEX_FLIP")]
    GexFlip,
    #[serde(rename = "TIME_EXIT")]
    TimeExit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfitTarget => write!(f, "PROFIT_TARGET"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::GexFlip => write!(f, "GEX_FLIP"),
            Self::TimeExit => write!(f, "TIME_EXIT"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExitCalculations {
    pub current_pnl: f64,
    pub current_pnl_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitDecision {
    pub decision: ExitOutcome,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
    pub reasoning: Vec<String>,
    pub calculations: ExitCalculations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterMode {
    #[serde(rename = "PAPER")]
    Paper,
    #[serde(rename = "LIVE")]
    Live,
}

impl std::fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_alignment() {
        assert!(Direction::Call.aligned_with_trend(Trend::Bullish));
        assert!(Direction::Put.aligned_with_trend(Trend::Bearish));
        assert!(Direction::Call.opposes_trend(Trend::Bearish));
        assert!(!Direction::Call.aligned_with_trend(Trend::Neutral));
    }

    #[test]
    fn unrealized_pnl_formula() {
        let pos = Position {
            id: "p1".into(),
            signal_id: "s1".into(),
            symbol: "SPY".into(),
            direction: Direction::Call,
            quantity: 2,
            entry_price: 100.0,
            entry_time: Utc::now(),
            current_price: None,
            unrealized_pnl: None,
            exit_price: None,
            exit_time: None,
            realized_pnl: None,
            status: PositionStatus::Open,
            contract: ContractDetails {
                underlying: "SPY".into(),
                strike: 450.0,
                expiration: "2026-01-16".into(),
                option_type: Direction::Call,
                timeframe: "5m".into(),
            },
        };
        assert_eq!(pos.unrealized_pnl_at(200.0), 20_000.0);
    }
}
