// =============================================================================
// Deduplication Cache (C3) — fingerprint → insertion time, TTL + LRU
// =============================================================================
//
// Fingerprint hashing follows the sha2-based idempotency-key pattern; storage
// adapts the teacher's ring-buffer-capped `Vec` idiom into a `HashMap` +
// insertion-ordered `VecDeque`, swept for TTL expiry on every insert. Eviction
// only ever removes entries whose TTL has elapsed — a fingerprint within the
// window is never dropped to satisfy a size cap.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::types::{Direction, Signal, SignalSource};

/// Hard cap on live entries; only enforced after TTL-expired entries have
/// already been swept, so a duplicate within the configured window is never
/// silently dropped.
const MAX_ENTRIES: usize = 100_000;

/// Compute the dedup fingerprint over source, symbol, direction, timeframe,
/// a minute-rounded timestamp, and price (stable payload subset).
pub fn fingerprint(signal: &Signal) -> String {
    let rounded_minute = signal.timestamp.timestamp() / 60;
    let mut hasher = Sha256::new();
    hasher.update(signal.source.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(signal.symbol.as_bytes());
    hasher.update(b"|");
    hasher.update(direction_tag(signal.direction).as_bytes());
    hasher.update(b"|");
    hasher.update(signal.timeframe.as_bytes());
    hasher.update(b"|");
    hasher.update(rounded_minute.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(signal.price.to_bits().to_le_bytes());
    hex::encode(hasher.finalize())
}

fn direction_tag(direction: Direction) -> &'static str {
    match direction {
        Direction::Call => "CALL",
        Direction::Put => "PUT",
    }
}

struct Inner {
    entries: HashMap<String, DateTime<Utc>>,
    /// Insertion order, for TTL sweeping and last-resort LRU eviction.
    order: VecDeque<String>,
}

/// TTL + LRU-bounded dedup cache. Lookup is insertion-idempotent: the same
/// fingerprint seen twice within the window yields `true` on the second
/// check.
pub struct DedupCache {
    window: chrono::Duration,
    inner: RwLock<Inner>,
}

impl DedupCache {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window: chrono::Duration::seconds(window_seconds as i64),
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Check whether `signal` is a duplicate of one seen within the window,
    /// recording it as seen either way. Returns `true` if it was already
    /// present (within TTL) — the caller should reject it as a duplicate.
    pub fn check_and_insert(&self, signal: &Signal) -> bool {
        let key = fingerprint(signal);
        let now = Utc::now();
        let mut inner = self.inner.write();

        self.sweep_expired(&mut inner, now);

        if let Some(seen_at) = inner.entries.get(&key) {
            if now - *seen_at <= self.window {
                return true;
            }
        }

        inner.entries.insert(key.clone(), now);
        inner.order.push_back(key);

        if inner.entries.len() > MAX_ENTRIES {
            tracing::warn!(
                entries = inner.entries.len(),
                "dedup cache exceeds soft cap with all entries still within window; \
                 growing rather than evicting live entries to preserve the no-false-negative guarantee"
            );
        }

        false
    }

    /// Remove every entry whose TTL has elapsed. Entries still within the
    /// window are never evicted — the only path to dropping a fingerprint is
    /// TTL expiry, never a size-driven LRU eviction.
    fn sweep_expired(&self, inner: &mut Inner, now: DateTime<Utc>) {
        while let Some(front) = inner.order.front().cloned() {
            match inner.entries.get(&front) {
                Some(seen_at) if now - *seen_at > self.window => {
                    inner.entries.remove(&front);
                    inner.order.pop_front();
                }
                _ => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn signal_with(symbol: &str, timestamp: DateTime<Utc>) -> Signal {
        Signal {
            id: "sig".to_string(),
            source: SignalSource::TradingView,
            symbol: symbol.to_string(),
            direction: Direction::Call,
            timeframe: "5m".to_string(),
            timestamp,
            metadata: StdHashMap::new(),
            price: 100.0,
        }
    }

    #[test]
    fn second_lookup_within_window_is_duplicate() {
        let cache = DedupCache::new(120);
        let signal = signal_with("SPX", Utc::now());
        assert!(!cache.check_and_insert(&signal));
        assert!(cache.check_and_insert(&signal));
    }

    #[test]
    fn different_symbols_are_not_duplicates() {
        let cache = DedupCache::new(120);
        let now = Utc::now();
        assert!(!cache.check_and_insert(&signal_with("SPX", now)));
        assert!(!cache.check_and_insert(&signal_with("SPY", now)));
    }

    #[test]
    fn fingerprint_is_stable_for_identical_inputs() {
        let now = Utc::now();
        let a = signal_with("SPX", now);
        let b = signal_with("SPX", now);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_on_direction() {
        let now = Utc::now();
        let mut call = signal_with("SPX", now);
        let mut put = signal_with("SPX", now);
        call.direction = Direction::Call;
        put.direction = Direction::Put;
        assert_ne!(fingerprint(&call), fingerprint(&put));
    }

    #[test]
    fn expired_entry_is_not_treated_as_duplicate() {
        let cache = DedupCache::new(0);
        let signal = signal_with("SPX", Utc::now());
        assert!(!cache.check_and_insert(&signal));
        std::thread::sleep(std::time::Duration::from_millis(10));
        // window is 0s, so the prior entry is immediately stale
        assert!(!cache.check_and_insert(&signal));
    }
}
