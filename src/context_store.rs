// =============================================================================
// Context Store — latest CONTEXT-webhook snapshot, pushed not pulled
// =============================================================================
//
// CONTEXT webhooks push a fresh `ContextData` snapshot rather than the
// pipeline polling an upstream feed for one. This store is the landing spot
// for that push; `ContextCache` wraps it with the usual `RwLock<Inner>`
// pattern and hands out a `Fetcher` closure that just reads whatever was last
// pushed here, so a stale/missing snapshot is reported the same way any other
// fetch failure would be.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;

use crate::context_cache::Fetcher;
use crate::types::ContextData;

#[derive(Default)]
pub struct ContextStore {
    latest: RwLock<Option<ContextData>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly received CONTEXT webhook snapshot.
    pub fn push(&self, data: ContextData) {
        *self.latest.write() = Some(data);
    }

    pub fn latest(&self) -> Option<ContextData> {
        self.latest.read().clone()
    }

    /// Build a `Fetcher` closure for `ContextCache`, reading from this store
    /// at fetch time. The store outlives the closure via the `Arc`.
    pub fn fetcher(self: Arc<Self>) -> Fetcher {
        Box::new(move || {
            let store = self.clone();
            Box::pin(async move {
                store
                    .latest()
                    .ok_or_else(|| "no CONTEXT webhook received yet".to_string())
            })
        })
    }
}
