// =============================================================================
// Confluence Calculator (C7) — weighted cross-signal agreement
// =============================================================================
//
// Only signals sharing the candidate's symbol and timeframe contribute to the
// pool. Score is the weighted fraction of that pool agreeing with the
// candidate's direction; source weights are configurable with the defaults
// named in the external-interfaces section.
// =============================================================================

use crate::types::{Signal, SignalSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfluenceCategory {
    High,
    Medium,
    Low,
}

pub fn category_for(score: f64) -> ConfluenceCategory {
    if score >= 0.7 {
        ConfluenceCategory::High
    } else if score >= 0.5 {
        ConfluenceCategory::Medium
    } else {
        ConfluenceCategory::Low
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceWeights {
    pub trading_view: f64,
    pub gex: f64,
    pub mtf: f64,
    pub manual: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            trading_view: 1.0,
            gex: 0.9,
            mtf: 0.85,
            manual: 0.7,
        }
    }
}

impl SourceWeights {
    fn weight_for(&self, source: SignalSource) -> f64 {
        match source {
            SignalSource::TradingView => self.trading_view,
            SignalSource::Gex => self.gex,
            SignalSource::Mtf => self.mtf,
            SignalSource::Manual => self.manual,
        }
    }
}

/// Weighted agreement score in `[0, 1]` for `candidate` against `peer_signals`
/// sharing the same symbol and timeframe. An empty contributing pool scores 0.
pub fn confluence_score(candidate: &Signal, peer_signals: &[Signal], weights: &SourceWeights) -> f64 {
    let pool: Vec<&Signal> = peer_signals
        .iter()
        .filter(|s| s.symbol == candidate.symbol && s.timeframe == candidate.timeframe)
        .collect();

    if pool.is_empty() {
        return 0.0;
    }

    let total_weight: f64 = pool.iter().map(|s| weights.weight_for(s.source)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let agreeing_weight: f64 = pool
        .iter()
        .filter(|s| s.direction == candidate.direction)
        .map(|s| weights.weight_for(s.source))
        .sum();

    agreeing_weight / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use chrono::Utc;
    use std::collections::HashMap;

    fn signal(source: SignalSource, direction: Direction, symbol: &str, timeframe: &str) -> Signal {
        Signal {
            id: "sig".to_string(),
            source,
            symbol: symbol.to_string(),
            direction,
            timeframe: timeframe.to_string(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            price: 100.0,
        }
    }

    #[test]
    fn empty_pool_scores_zero() {
        let candidate = signal(SignalSource::TradingView, Direction::Call, "SPX", "5m");
        assert_eq!(confluence_score(&candidate, &[], &SourceWeights::default()), 0.0);
    }

    #[test]
    fn only_same_symbol_and_timeframe_contribute() {
        let candidate = signal(SignalSource::TradingView, Direction::Call, "SPX", "5m");
        let peers = vec![
            signal(SignalSource::Gex, Direction::Call, "SPX", "15m"), // different timeframe
            signal(SignalSource::Gex, Direction::Call, "SPY", "5m"),  // different symbol
        ];
        assert_eq!(confluence_score(&candidate, &peers, &SourceWeights::default()), 0.0);
    }

    #[test]
    fn full_agreement_scores_one() {
        let candidate = signal(SignalSource::TradingView, Direction::Call, "SPX", "5m");
        let peers = vec![
            signal(SignalSource::Gex, Direction::Call, "SPX", "5m"),
            signal(SignalSource::Mtf, Direction::Call, "SPX", "5m"),
        ];
        assert_eq!(confluence_score(&candidate, &peers, &SourceWeights::default()), 1.0);
    }

    #[test]
    fn mixed_agreement_is_weighted() {
        let candidate = signal(SignalSource::TradingView, Direction::Call, "SPX", "5m");
        let peers = vec![
            signal(SignalSource::Gex, Direction::Call, "SPX", "5m"), // agrees, weight 0.9
            signal(SignalSource::Mtf, Direction::Put, "SPX", "5m"),  // disagrees, weight 0.85
        ];
        let weights = SourceWeights::default();
        let score = confluence_score(&candidate, &peers, &weights);
        let expected = 0.9 / (0.9 + 0.85);
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn categorizes_scores() {
        assert_eq!(category_for(0.75), ConfluenceCategory::High);
        assert_eq!(category_for(0.5), ConfluenceCategory::Medium);
        assert_eq!(category_for(0.2), ConfluenceCategory::Low);
    }
}
