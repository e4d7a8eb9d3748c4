// =============================================================================
// GEX Service (C5) — gamma-exposure positioning signals
// =============================================================================
//
// Holds a ring of recent `GexSignal` rows per (symbol, timeframe) behind the
// teacher's `RwLock<Inner>`-behind-struct shape. Staleness and flip detection
// only ever look at the two newest rows for a key, so the ring only needs to
// retain a short tail.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::{Direction, GexSignal};

/// Number of most-recent rows retained per (symbol, timeframe) key; flip
/// detection only needs the newest two, a small tail covers bursty ingestion.
const RING_DEPTH: usize = 8;

/// Normalize a timeframe label to a canonical minutes-based form so lookups
/// agree regardless of which alias an upstream feed used (e.g. "1h" → "60m").
pub fn normalize_timeframe(timeframe: &str) -> String {
    let lower = timeframe.trim().to_ascii_lowercase();
    match lower.as_str() {
        "1h" | "60m" | "1hr" => "60m".to_string(),
        "4h" | "240m" => "240m".to_string(),
        "1d" | "d" | "daily" => "1d".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct FlipResult {
    pub has_flipped: bool,
    pub current: Option<GexSignal>,
    pub previous: Option<GexSignal>,
}

struct Inner {
    // newest-last per key.
    rows: HashMap<(String, String), Vec<GexSignal>>,
}

pub struct GexService {
    max_stale_minutes: i64,
    stale_weight_reduction: f64,
    inner: RwLock<Inner>,
}

impl GexService {
    pub fn new(max_stale_minutes: i64, stale_weight_reduction: f64) -> Self {
        Self {
            max_stale_minutes,
            stale_weight_reduction,
            inner: RwLock::new(Inner {
                rows: HashMap::new(),
            }),
        }
    }

    pub fn ingest(&self, signal: GexSignal) {
        let key = (signal.symbol.clone(), normalize_timeframe(&signal.timeframe));
        let mut inner = self.inner.write();
        let entry = inner.rows.entry(key).or_default();
        entry.push(signal);
        if entry.len() > RING_DEPTH {
            let overflow = entry.len() - RING_DEPTH;
            entry.drain(0..overflow);
        }
    }

    /// Newest row for (symbol, timeframe), or `None` if nothing has been
    /// ingested for that key yet.
    pub fn get_latest_signal(&self, symbol: &str, timeframe: &str) -> Option<GexSignal> {
        let key = (symbol.to_string(), normalize_timeframe(timeframe));
        let inner = self.inner.read();
        inner.rows.get(&key).and_then(|rows| rows.last()).cloned()
    }

    pub fn is_stale(&self, signal: &GexSignal) -> bool {
        let age_minutes = (Utc::now() - signal.timestamp).num_minutes();
        age_minutes > self.max_stale_minutes
    }

    /// 1.0 if fresh, else `1 - stale_weight_reduction`.
    pub fn effective_weight(&self, signal: &GexSignal) -> f64 {
        if self.is_stale(signal) {
            1.0 - self.stale_weight_reduction
        } else {
            1.0
        }
    }

    /// Compares the two most-recent rows for (symbol, timeframe). Fewer than
    /// two rows means `has_flipped = false`.
    pub fn detect_flip(&self, symbol: &str, timeframe: &str) -> FlipResult {
        let key = (symbol.to_string(), normalize_timeframe(timeframe));
        let inner = self.inner.read();
        let rows = match inner.rows.get(&key) {
            Some(rows) if rows.len() >= 2 => rows,
            _ => {
                return FlipResult {
                    has_flipped: false,
                    current: None,
                    previous: None,
                }
            }
        };

        let current = rows[rows.len() - 1].clone();
        let previous = rows[rows.len() - 2].clone();
        let has_flipped = current.direction != previous.direction;

        FlipResult {
            has_flipped,
            current: Some(current),
            previous: Some(previous),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(symbol: &str, timeframe: &str, direction: Direction, timestamp: DateTime<Utc>) -> GexSignal {
        GexSignal {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            strength: 0.6,
            direction,
            timestamp,
        }
    }

    #[test]
    fn normalizes_timeframe_aliases() {
        assert_eq!(normalize_timeframe("1h"), "60m");
        assert_eq!(normalize_timeframe("60m"), "60m");
        assert_eq!(normalize_timeframe("5m"), "5m");
    }

    #[test]
    fn fewer_than_two_rows_means_no_flip() {
        let service = GexService::new(240, 0.5);
        service.ingest(signal("SPX", "1h", Direction::Call, Utc::now()));
        let result = service.detect_flip("SPX", "1h");
        assert!(!result.has_flipped);
    }

    #[test]
    fn detects_flip_between_two_most_recent_rows() {
        let service = GexService::new(240, 0.5);
        service.ingest(signal("SPX", "1h", Direction::Call, Utc::now() - chrono::Duration::minutes(10)));
        service.ingest(signal("SPX", "1h", Direction::Put, Utc::now()));
        let result = service.detect_flip("SPX", "1h");
        assert!(result.has_flipped);
    }

    #[test]
    fn stale_signal_has_reduced_weight() {
        let service = GexService::new(240, 0.5);
        let stale = signal(
            "SPX",
            "1h",
            Direction::Call,
            Utc::now() - chrono::Duration::minutes(300),
        );
        assert!(service.is_stale(&stale));
        assert_eq!(service.effective_weight(&stale), 0.5);
    }

    #[test]
    fn fresh_signal_has_full_weight() {
        let service = GexService::new(240, 0.5);
        let fresh = signal("SPX", "1h", Direction::Call, Utc::now());
        assert!(!service.is_stale(&fresh));
        assert_eq!(service.effective_weight(&fresh), 1.0);
    }

    #[test]
    fn timeframe_alias_shares_the_same_key() {
        let service = GexService::new(240, 0.5);
        service.ingest(signal("SPX", "1h", Direction::Call, Utc::now()));
        let via_alias = service.get_latest_signal("SPX", "60m");
        assert!(via_alias.is_some());
    }
}
