//! Durable read-through cache keyed by source class and argument digest.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use conviction_core::{CapabilityPayload, KeyValueStore, SourceClass, StoreError};

pub(crate) const CACHE_KEY_PREFIX: &str = "cache:";

/// Persisted cache record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: CapabilityPayload,
    pub source_class: SourceClass,
    /// Wire name of the capability that produced the payload.
    pub capability: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Times this entry has been served while fresh.
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn age_hours_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// A fresh entry served from the durable cache.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub payload: CapabilityPayload,
    /// When the payload was originally fetched.
    pub created_at: DateTime<Utc>,
    pub age_hours: f64,
}

/// Durable TTL cache layered over a [`KeyValueStore`].
///
/// Expiry is logical: reads treat stale entries as misses but leave them in
/// place until the next write to the same key replaces them or
/// `purge_expired` removes them. Read and write failures degrade to misses
/// and dropped writes, never to caller-visible errors.
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    ttls: HashMap<SourceClass, Duration>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttls: HashMap<SourceClass, Duration>) -> Self {
        Self { store, ttls }
    }

    /// TTL for a class. `None` means the class bypasses the durable cache.
    pub fn ttl_for(&self, class: SourceClass) -> Option<Duration> {
        self.ttls.get(&class).copied()
    }

    fn key(class: SourceClass, digest: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{}:{digest}", class.as_str())
    }

    /// Look up a fresh entry. Increments the hit counter on success.
    pub async fn lookup(&self, class: SourceClass, digest: &str) -> Option<CacheHit> {
        self.ttl_for(class)?;
        let key = Self::key(class, digest);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(%class, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        let mut entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%class, error = %e, "corrupt cache entry, treating as miss");
                return None;
            }
        };
        let now = Utc::now();
        if entry.is_expired_at(now) {
            debug!(%class, key, "cache entry expired");
            return None;
        }
        entry.hit_count += 1;
        let hit = CacheHit {
            payload: entry.payload.clone(),
            created_at: entry.created_at,
            age_hours: entry.age_hours_at(now),
        };
        // Hit accounting is best effort.
        if let Err(e) = self.write_entry(&key, &entry).await {
            warn!(%class, error = %e, "failed to persist cache hit count");
        }
        Some(hit)
    }

    /// Store a payload under the class TTL, replacing any previous entry for
    /// the same key. `fetched_at` becomes the entry's creation time so that
    /// later hits report the original fetch. No-op for bypass classes.
    pub async fn record(
        &self,
        class: SourceClass,
        capability: &str,
        digest: &str,
        payload: &CapabilityPayload,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let Some(ttl) = self.ttl_for(class) else {
            return Ok(());
        };
        let created_at = fetched_at;
        let expires_at = created_at
            .checked_add_signed(chrono_ttl(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            payload: payload.clone(),
            source_class: class,
            capability: capability.to_string(),
            created_at,
            expires_at,
            hit_count: 0,
        };
        self.write_entry(&Self::key(class, digest), &entry).await
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry)?;
        self.store.set(key, raw).await
    }

    /// Remove every physically present entry whose TTL has lapsed, returning
    /// the number removed. Unreadable entries are removed as well.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut purged = 0;
        for key in self.store.keys(CACHE_KEY_PREFIX).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let expired = match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => entry.is_expired_at(now),
                Err(_) => true,
            };
            if expired {
                self.store.remove(&key).await?;
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "purged expired cache entries");
        }
        Ok(purged)
    }

    /// Physical presence check, freshness ignored.
    pub async fn contains_raw(&self, class: SourceClass, digest: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&Self::key(class, digest)).await?.is_some())
    }

    /// Raw entry regardless of freshness, for diagnostics.
    pub async fn raw_entry(
        &self,
        class: SourceClass,
        digest: &str,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let Some(raw) = self.store.get(&Self::key(class, digest)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

fn chrono_ttl(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}
