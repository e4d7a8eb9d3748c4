// =============================================================================
// Context Cache (C4) — latest ContextData, single-flight lazy refresh
// =============================================================================
//
// Mirrors the teacher's `RwLock<Inner>`-behind-a-struct shape, but the read
// path is async: a cache miss or TTL-expired entry triggers a fetch via an
// injected async fetcher. Concurrent callers that all observe a stale entry
// must share one fetch rather than each firing their own. Single-flight is
// built the same way `exit/monitor.rs` avoids nested-lock races — release
// the lock before the slow operation, and let the other waiters park on a
// `Notify` until the flight in progress lands, then re-check the cache.
// =============================================================================

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::{timeout, Duration};
use tracing::warn;

use crate::error::FlowgateError;
use crate::types::ContextData;

/// A boxed async fetch, so `ContextCache` stays a concrete type that
/// `Orchestrator`/`CoreContext` can name and store behind an `Arc` without
/// threading a fetcher type parameter through the rest of the pipeline.
pub type Fetcher =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<ContextData, String>> + Send>> + Send + Sync>;

struct Inner {
    value: Option<ContextData>,
    in_flight: bool,
}

/// Holds the latest market `ContextData`, refreshed lazily via an injected
/// fetcher whenever the cached value is missing or older than `ttl`.
pub struct ContextCache {
    ttl: chrono::Duration,
    fetch_timeout: Duration,
    fetcher: Fetcher,
    inner: AsyncMutex<Inner>,
    notify: Notify,
}

impl ContextCache {
    pub fn new(ttl_seconds: i64, fetch_timeout: Duration, fetcher: Fetcher) -> Self {
        Self {
            ttl: chrono::Duration::seconds(ttl_seconds),
            fetch_timeout,
            fetcher,
            inner: AsyncMutex::new(Inner {
                value: None,
                in_flight: false,
            }),
            notify: Notify::new(),
        }
    }

    fn is_fresh(&self, value: &ContextData, now: DateTime<Utc>) -> bool {
        now - value.timestamp <= self.ttl
    }

    /// Return the cached context, refreshing it if stale/missing. Concurrent
    /// callers racing a refresh share the result of a single fetch instead of
    /// each issuing their own.
    pub async fn get(&self) -> Result<ContextData, FlowgateError> {
        loop {
            let mut guard = self.inner.lock().await;

            if let Some(value) = &guard.value {
                if self.is_fresh(value, Utc::now()) {
                    return Ok(value.clone());
                }
            }

            if guard.in_flight {
                // Someone else is already refreshing; release the lock and
                // wait to be woken, then re-check the (possibly now fresh)
                // cache from the top of the loop.
                drop(guard);
                self.notify.notified().await;
                continue;
            }

            guard.in_flight = true;
            let stale_value = guard.value.clone();
            drop(guard);

            let result = timeout(self.fetch_timeout, (self.fetcher)()).await;

            let mut guard = self.inner.lock().await;
            guard.in_flight = false;

            let outcome = match result {
                Ok(Ok(fresh)) => {
                    guard.value = Some(fresh.clone());
                    Ok(fresh)
                }
                Ok(Err(reason)) => {
                    warn!(reason = %reason, "context fetch failed");
                    match stale_value {
                        Some(stale) => Ok(stale),
                        None => Err(FlowgateError::ContextUnavailable(reason)),
                    }
                }
                Err(_) => {
                    warn!("context fetch timed out");
                    match stale_value {
                        Some(stale) => Ok(stale),
                        None => Err(FlowgateError::ContextUnavailable(
                            "context fetch timed out".to_string(),
                        )),
                    }
                }
            };

            drop(guard);
            self.notify.notify_waiters();
            return outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Regime, Trend};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample_context(vix: f64) -> ContextData {
        ContextData {
            vix,
            trend: Trend::Bullish,
            bias: 0.2,
            regime: Regime::Normal,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn caches_fresh_value_without_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fetcher: Fetcher = Box::new(move || {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(sample_context(18.0))
            })
        });
        let cache = ContextCache::new(60, Duration::from_secs(5), fetcher);

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert_eq!(first.vix, second.vix);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failure_with_no_prior_value_is_context_unavailable() {
        let fetcher: Fetcher = Box::new(|| Box::pin(async { Err("upstream down".to_string()) }));
        let cache = ContextCache::new(60, Duration::from_secs(5), fetcher);

        let err = cache.get().await.unwrap_err();
        assert_eq!(err.stage(), "context");
    }

    #[tokio::test]
    async fn fetch_failure_with_prior_value_returns_stale_value() {
        let attempt = Arc::new(AtomicUsize::new(0));
        let attempt_clone = attempt.clone();
        let fetcher: Fetcher = Box::new(move || {
            let attempt = attempt_clone.clone();
            Box::pin(async move {
                let n = attempt.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Ok(sample_context(20.0))
                } else {
                    Err("transient failure".to_string())
                }
            })
        });
        let cache = ContextCache::new(0, Duration::from_secs(5), fetcher);

        let first = cache.get().await.unwrap();
        assert_eq!(first.vix, 20.0);

        // TTL is 0, so the second call always tries to refresh and fails;
        // the stale value from the first successful fetch is still returned.
        let second = cache.get().await.unwrap();
        assert_eq!(second.vix, 20.0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let fetcher: Fetcher = Box::new(move || {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(sample_context(22.0))
            })
        });
        let cache = Arc::new(ContextCache::new(60, Duration::from_secs(5), fetcher));

        let a = cache.clone();
        let b = cache.clone();
        let (ra, rb) = tokio::join!(a.get(), b.get());
        assert_eq!(ra.unwrap().vix, 22.0);
        assert_eq!(rb.unwrap().vix, 22.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
