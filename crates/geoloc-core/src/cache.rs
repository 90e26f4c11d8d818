// # Location Cache
//
// In-memory, TTL-bounded cache of resolved locations backed by
// `moka::future::Cache`.
//
// ## Behavior
//
// - Keyed by the raw client IP, or by `"auto"` when no usable IP was given
// - An entry expires `ttl` after its `stored_at`; expired entries are never
//   returned and are evicted by moka's housekeeping
// - No capacity bound; `purge_expired()` and `clear()` are the operational
//   controls
// - Concurrent fetches for one key are collapsed into a single fetch
//   (`get_or_fetch`); a fetch that yields nothing is not cached
// - Process-local only, lost on restart

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::Expiry;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::model::LocationRecord;

/// Cache key used when no usable client IP is available
pub const AUTO_CACHE_KEY: &str = "auto";

/// Default freshness window for cached locations
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One cached location
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub data: LocationRecord,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// New entry for `key` stamped with the current time
    pub fn new(key: impl Into<String>, data: LocationRecord) -> Self {
        Self {
            key: key.into(),
            data,
            stored_at: Utc::now(),
        }
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.stored_at)
    }

    /// Fresh means strictly younger than the TTL
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < ttl
    }
}

/// Introspection row returned by [`LocationCache::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshotEntry {
    pub key: String,
    pub age_minutes: i64,
    pub has_data: bool,
}

/// Expiry measured from the entry's own `stored_at`
///
/// Backdated entries expire early, and overwriting a key restarts its clock.
struct StoredAtExpiry {
    ttl: chrono::Duration,
}

impl StoredAtExpiry {
    fn remaining(&self, entry: &CacheEntry) -> Duration {
        (self.ttl - entry.age(Utc::now()))
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl Expiry<String, CacheEntry> for StoredAtExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.remaining(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.remaining(value))
    }
}

/// Thread-safe TTL cache of [`LocationRecord`]s
pub struct LocationCache {
    entries: Cache<String, CacheEntry>,
    ttl: chrono::Duration,
}

impl LocationCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let entries = Cache::builder()
            .expire_after(StoredAtExpiry { ttl })
            .build();

        Self { entries, ttl }
    }

    /// The configured TTL
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Return the cached location for `key` if it is still fresh
    pub async fn get_fresh(&self, key: &str) -> Option<LocationRecord> {
        self.entry(key).await.map(|entry| entry.data)
    }

    /// Return the fresh entry for `key`
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .await
            .filter(|entry| entry.is_fresh(self.ttl, Utc::now()))
    }

    /// Store `data` under `key`, stamped with the current time
    pub async fn insert(&self, key: &str, data: LocationRecord) {
        self.store(CacheEntry::new(key, data)).await;
    }

    /// Store `data` under `key` with an explicit timestamp
    pub async fn insert_at(&self, key: &str, data: LocationRecord, stored_at: DateTime<Utc>) {
        self.store(CacheEntry {
            key: key.to_string(),
            data,
            stored_at,
        })
        .await;
    }

    /// Store a prepared entry under its own key
    pub async fn store(&self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry).await;
    }

    /// Return the fresh entry for `key`, or run `fetch` to produce one
    ///
    /// Concurrent callers for the same key share one `fetch`; the others wait
    /// for its result. A `None` result is handed to every waiter and nothing
    /// is stored. If the running fetch is dropped, a waiter starts its own.
    pub async fn get_or_fetch<F>(&self, key: &str, fetch: F) -> Option<CacheEntry>
    where
        F: Future<Output = Option<CacheEntry>>,
    {
        self.entries.optionally_get_with_by_ref(key, fetch).await
    }

    /// List every live entry with its age, sorted by key
    pub fn snapshot(&self) -> Vec<CacheSnapshotEntry> {
        let now = Utc::now();
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|(_, entry)| CacheSnapshotEntry {
                key: entry.key.clone(),
                age_minutes: entry.age(now).num_minutes(),
                has_data: !entry.data.is_empty(),
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    /// Evict expired entries now instead of waiting for housekeeping
    pub async fn purge_expired(&self) {
        self.entries.run_pending_tasks().await;
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    /// Check if the cache holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl std::fmt::Debug for LocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}
