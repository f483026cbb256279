//! Pass-scoped single-flight cache for identical in-flight calls.

use cached::{Cached, TimedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::trace;

use conviction_core::{ToolError, ToolOutcome};

/// Result shared between deduplicated callers, failures included.
pub type SharedCall = Result<ToolOutcome, ToolError>;

/// One deduplication slot. The first caller initializes the cell; everyone
/// else awaits it and clones the stored result.
pub type DedupSlot = Arc<OnceCell<SharedCall>>;

/// Short-lived dedup map keyed by `capability:digest`.
///
/// Entries age out after `ttl` so a slot never outlives the pass that
/// created it by much. `clear` drops the whole map at a pass boundary.
pub struct DedupCache {
    slots: Mutex<TimedCache<String, DedupSlot>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(TimedCache::with_lifespan(ttl)),
        }
    }

    /// Fetch the slot for a key, creating it on first sight.
    pub async fn slot(&self, key: &str) -> DedupSlot {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.cache_get(key) {
            trace!(key, "joining existing dedup slot");
            return Arc::clone(slot);
        }
        let slot: DedupSlot = Arc::new(OnceCell::new());
        slots.cache_set(key.to_string(), Arc::clone(&slot));
        slot
    }

    /// Drop every slot. Called at the start of an analysis pass.
    pub async fn clear(&self) {
        self.slots.lock().await.cache_clear();
    }

    pub async fn size(&self) -> usize {
        self.slots.lock().await.cache_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_returns_the_same_slot() {
        let dedup = DedupCache::new(Duration::from_secs(30));
        let a = dedup.slot("news_digest:abc").await;
        let b = dedup.slot("news_digest:abc").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dedup.size().await, 1);
    }

    #[tokio::test]
    async fn different_keys_get_distinct_slots() {
        let dedup = DedupCache::new(Duration::from_secs(30));
        let a = dedup.slot("news_digest:abc").await;
        let b = dedup.slot("news_digest:def").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn clear_resets_all_slots() {
        let dedup = DedupCache::new(Duration::from_secs(30));
        let before = dedup.slot("fundamentals:k").await;
        dedup.clear().await;
        assert_eq!(dedup.size().await, 0);
        let after = dedup.slot("fundamentals:k").await;
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn stored_result_is_visible_to_later_joiners() {
        let dedup = DedupCache::new(Duration::from_secs(30));
        let slot = dedup.slot("verdict_history:k").await;
        let outcome: SharedCall = Err(ToolError::new(
            "verdict_history",
            conviction_core::ErrorCode::Unknown,
            "boom",
        ));
        slot.set(outcome.clone()).ok();

        let again = dedup.slot("verdict_history:k").await;
        assert_eq!(again.get(), Some(&outcome));
    }

    #[tokio::test]
    async fn slots_age_out_after_the_lifespan() {
        let dedup = DedupCache::new(Duration::from_millis(5));
        let before = dedup.slot("fundamentals:k").await;
        // TimedCache runs on wall time, so sleep for real.
        tokio::time::sleep(Duration::from_millis(25)).await;
        let after = dedup.slot("fundamentals:k").await;
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
