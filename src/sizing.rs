// =============================================================================
// Position Sizing (C8) — ordered multiplier chain, auditable intermediates
// =============================================================================
//
// Strict pipeline: base → Kelly → regime → confluence → VIX multiplier →
// cap → floor. Every intermediate is captured into `SizingCalculations` so
// the Orchestrator's audit trail can show exactly how a size was reached,
// the same way `strategy.rs`'s position-sizing section exposes its running
// multipliers.
// =============================================================================

use crate::config::SizingConfig;
use crate::types::{Regime, SizingCalculations};

fn regime_multiplier(regime: Regime) -> f64 {
    match regime {
        Regime::LowVol => 1.2,
        Regime::HighVol => 0.7,
        Regime::Normal => 1.0,
    }
}

/// Compute position size (in contracts) from confidence/regime/confluence,
/// applying an optional Risk Manager VIX multiplier before capping. Returns
/// the final integer size (0 if below `min_size`) plus the full audit trail.
pub fn compute_size(
    confidence: i32,
    regime: Regime,
    confluence: f64,
    vix_multiplier: f64,
    config: &SizingConfig,
) -> (u32, SizingCalculations) {
    let after_base = config.base_size;

    let kelly_factor = 1.0 + (confidence as f64 / 100.0) * config.kelly_fraction;
    let after_kelly = after_base * kelly_factor;

    let after_regime = after_kelly * regime_multiplier(regime);

    let confluence_factor = 0.8 + 0.4 * confluence;
    let after_confluence = after_regime * confluence_factor;

    let after_vix = after_confluence * vix_multiplier;

    let capped = after_vix.min(config.max_size);

    let final_size = if capped < config.min_size {
        0.0
    } else {
        capped.floor()
    };

    let calculations = SizingCalculations {
        after_base,
        after_kelly,
        after_regime,
        after_confluence,
        vix_multiplier,
        capped,
    };

    (final_size as u32, calculations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SizingConfig {
        SizingConfig {
            base_size: 2.0,
            kelly_fraction: 0.5,
            min_size: 1.0,
            max_size: 10.0,
        }
    }

    #[test]
    fn multiplier_chain_applies_in_order() {
        let (size, calc) = compute_size(80, Regime::LowVol, 0.8, 1.0, &config());
        // base=2.0
        // kelly = 2.0 * (1 + 0.8*0.5) = 2.0 * 1.4 = 2.8
        // regime (LOW_VOL 1.2) = 3.36
        // confluence (0.8 + 0.4*0.8 = 1.12) = 3.7632
        // vix multiplier 1.0 -> capped at min(10.0, 3.7632) = 3.7632
        assert!((calc.after_kelly - 2.8).abs() < 1e-9);
        assert!((calc.after_regime - 3.36).abs() < 1e-9);
        assert!((calc.after_confluence - 3.7632).abs() < 1e-9);
        assert_eq!(size, 3);
    }

    #[test]
    fn caps_at_max_size() {
        let (size, calc) = compute_size(100, Regime::LowVol, 1.0, 1.0, &config());
        assert_eq!(calc.capped, 10.0);
        assert_eq!(size, 10);
    }

    #[test]
    fn below_min_size_returns_zero() {
        let tiny_config = SizingConfig {
            base_size: 0.1,
            kelly_fraction: 0.0,
            min_size: 1.0,
            max_size: 10.0,
        };
        let (size, _) = compute_size(0, Regime::HighVol, 0.0, 1.0, &tiny_config);
        assert_eq!(size, 0);
    }

    #[test]
    fn vix_multiplier_reduces_size() {
        let (size_full, _) = compute_size(50, Regime::Normal, 0.5, 1.0, &config());
        let (size_reduced, _) = compute_size(50, Regime::Normal, 0.5, 0.5, &config());
        assert!(size_reduced <= size_full);
    }
}
