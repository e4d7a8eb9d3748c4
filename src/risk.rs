// =============================================================================
// Risk Manager (C6) — market filters and confidence adjustments
// =============================================================================
//
// Three operations over a `Signal`/`ContextData` pair:
//   - `apply_market_filters` — pass/reject gate plus a position-size multiplier.
//   - `context_adjustment`   — clamped confidence delta from VIX/trend/bias.
//   - `positioning_adjustment` — clamped confidence delta from regime.
//
// Kept in the teacher's `RwLock<Inner>`-behind-struct shape even though the
// current ruleset is stateless, so config can be hot-reloaded the same way
// `RuntimeConfig` is. Each rule is a short, independently testable branch
// applied in a fixed order, matching `smart_filters.rs`'s clamped-delta
// accumulation style.
// =============================================================================

use parking_lot::RwLock;

use crate::config::{ConfidenceConfig, RiskConfig};
use crate::types::{ContextData, Direction, Regime, Signal};

#[derive(Debug, Clone, Copy)]
pub struct MarketFilterResult {
    pub passed: bool,
    pub position_size_multiplier: f64,
    pub rejection_reason: Option<&'static str>,
}

struct Inner {
    risk: RiskConfig,
    confidence: ConfidenceConfig,
}

pub struct RiskManager {
    inner: RwLock<Inner>,
}

impl RiskManager {
    pub fn new(risk: RiskConfig, confidence: ConfidenceConfig) -> Self {
        Self {
            inner: RwLock::new(Inner { risk, confidence }),
        }
    }

    pub fn update_config(&self, risk: RiskConfig, confidence: ConfidenceConfig) {
        let mut inner = self.inner.write();
        inner.risk = risk;
        inner.confidence = confidence;
    }

    /// VIX-based entry gate and size reduction.
    pub fn apply_market_filters(&self, context: &ContextData) -> MarketFilterResult {
        let risk = self.inner.read().risk.clone();

        if context.vix > risk.max_vix_for_entry {
            return MarketFilterResult {
                passed: false,
                position_size_multiplier: 0.0,
                rejection_reason: Some("VIX exceeds maximum allowed for entry"),
            };
        }

        let multiplier = if context.vix > 30.0 {
            risk.vix_position_size_reduction
        } else {
            1.0
        };

        MarketFilterResult {
            passed: true,
            position_size_multiplier: multiplier,
            rejection_reason: None,
        }
    }

    /// Confidence delta from VIX level, trend alignment, and bias alignment,
    /// clamped to ±`context_adjustment_range`.
    pub fn context_adjustment(&self, signal: &Signal, context: &ContextData) -> i32 {
        let range = self.inner.read().confidence.context_adjustment_range;
        let mut delta: i32 = 0;

        if context.vix < 15.0 {
            delta += 5;
        } else if context.vix > 30.0 {
            delta -= 10;
        }

        if signal.direction.aligned_with_trend(context.trend) {
            delta += 10;
        } else if signal.direction.opposes_trend(context.trend) {
            delta -= 20;
        }

        delta += bias_delta(signal.direction, context.bias);

        delta.clamp(-range, range)
    }

    /// Confidence delta from regime, clamped to ±`positioning_adjustment_range`.
    pub fn positioning_adjustment(&self, context: &ContextData) -> i32 {
        let range = self.inner.read().confidence.positioning_adjustment_range;
        let delta = match context.regime {
            Regime::LowVol => 10,
            Regime::HighVol => -10,
            Regime::Normal => 0,
        };
        delta.clamp(-range, range)
    }
}

fn bias_delta(direction: Direction, bias: f64) -> i32 {
    let aligned = matches!(
        (direction, bias),
        (Direction::Call, b) if b > 0.0
    ) || matches!(
        (direction, bias),
        (Direction::Put, b) if b < 0.0
    );
    let opposed = matches!(
        (direction, bias),
        (Direction::Call, b) if b < 0.0
    ) || matches!(
        (direction, bias),
        (Direction::Put, b) if b > 0.0
    );

    if aligned {
        5
    } else if opposed {
        -5
    } else {
        0
    }
}
