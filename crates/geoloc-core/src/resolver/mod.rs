//! Geolocation resolver
//!
//! The Resolver is responsible for:
//! - Normalizing the cache key for a candidate client IP
//! - Serving fresh cache entries without touching the network
//! - Walking the provider chain in fixed order on a miss
//! - Caching the first successful answer
//! - Coalescing concurrent misses on the same key
//!
//! ## Flow
//!
//! ```text
//! START → CACHE_CHECK ─┬─ hit ──────────────────────────────→ RETURN
//!                      └─ miss → PROVIDER_1 ─┬─ success → CACHE_WRITE → RETURN
//!                                            └─ rate limited / failed
//!                                                   ↓
//!                                            PROVIDER_2 … PROVIDER_N
//!                                                   ↓
//!                                            ALL_EXHAUSTED → RETURN_EMPTY
//! ```
//!
//! `resolve` never fails. When every provider fails the caller gets an empty
//! [`LocationRecord`] and nothing is cached, so the next call retries.
//!
//! With coalescing on, the miss path runs through
//! [`LocationCache::get_or_fetch`]: concurrent callers for one key share a
//! single chain execution, including an empty result.

mod classify;
mod stats;

pub use classify::{cache_key, lookup_address, needs_auto_detect};
pub use stats::ResolverStats;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheSnapshotEntry, DEFAULT_CACHE_TTL, LocationCache};
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::model::LocationRecord;
use crate::registry::ProviderRegistry;
use crate::traits::{GeoProvider, ProviderOutcome};
use stats::StatsCounters;

/// IP geolocation resolver with ordered provider fallback and a TTL cache
///
/// The resolver owns its cache, so independent instances never share state.
/// Share one instance across tasks with `Arc<Resolver>`.
pub struct Resolver {
    /// Providers in fallback priority order
    providers: Vec<Arc<dyn GeoProvider>>,

    /// Fresh answers keyed by client IP or `"auto"`
    cache: LocationCache,

    /// Whether concurrent misses share one chain execution
    coalesce: bool,

    /// Optional cap on a whole chain execution
    deadline: Option<Duration>,

    stats: StatsCounters,
}

impl Resolver {
    /// Create a resolver over `providers` with default settings
    ///
    /// Defaults: 24h TTL, coalescing on, no overall deadline.
    pub fn new(providers: Vec<Arc<dyn GeoProvider>>) -> Self {
        Self {
            providers,
            cache: LocationCache::new(DEFAULT_CACHE_TTL),
            coalesce: true,
            deadline: None,
            stats: StatsCounters::default(),
        }
    }

    /// Build the provider chain through `registry` and apply `config`
    pub fn from_config(config: &ResolverConfig, registry: &ProviderRegistry) -> Result<Self> {
        config.validate()?;

        let providers = registry.create_chain(&config.providers)?;
        let mut resolver = Self::new(providers)
            .with_cache_ttl(config.cache_ttl())
            .with_coalescing(config.coalesce_requests);
        if let Some(deadline) = config.resolve_deadline() {
            resolver = resolver.with_resolve_deadline(deadline);
        }

        info!(
            "Resolver ready: providers=[{}], ttl={}s, deadline={:?}, coalesce={}",
            resolver.provider_names().join(", "),
            resolver.cache.ttl().num_seconds(),
            resolver.deadline,
            resolver.coalesce
        );

        Ok(resolver)
    }

    /// Replace the cache with an empty one using `ttl`
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = LocationCache::new(ttl);
        self
    }

    /// Cap the total time of one chain execution
    pub fn with_resolve_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enable or disable request coalescing
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }

    /// Provider names in fallback order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// The resolver's cache
    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// Resolve `raw_ip` to a location
    ///
    /// Never fails. Returns an empty record when every provider fails.
    pub async fn resolve(&self, raw_ip: &str) -> LocationRecord {
        let key = cache_key(raw_ip);

        if let Some(hit) = self.cache.get_fresh(&key).await {
            debug!("Cache hit for {}", key);
            StatsCounters::bump(&self.stats.cache_hits);
            return hit;
        }

        debug!("Cache miss for {}", key);
        StatsCounters::bump(&self.stats.cache_misses);

        if !self.coalesce {
            return match self.fetch(raw_ip, &key).await {
                Some(entry) => {
                    self.cache.store(entry.clone()).await;
                    entry.data
                }
                None => LocationRecord::empty(),
            };
        }

        let mut fetched_here = false;
        let shared = self
            .cache
            .get_or_fetch(&key, async {
                fetched_here = true;
                self.fetch(raw_ip, &key).await
            })
            .await;

        if !fetched_here {
            debug!("Joined in-flight lookup for {}", key);
            StatsCounters::bump(&self.stats.coalesced);
        }

        shared.map(|entry| entry.data).unwrap_or_default()
    }

    /// List cache entries with their age in minutes
    pub fn cache_snapshot(&self) -> Vec<CacheSnapshotEntry> {
        self.cache.snapshot()
    }

    /// Evict every cache entry
    ///
    /// Lookups already in flight still complete and may repopulate the cache.
    pub async fn clear_cache(&self) {
        let evicted = self.cache.len();
        self.cache.clear().await;
        info!("Cache cleared ({} entries evicted)", evicted);
    }

    /// Evict logically-expired cache entries
    pub async fn purge_expired(&self) {
        self.cache.purge_expired().await;
        debug!("Expired cache entries purged, {} live", self.cache.len());
    }

    /// Current counter values
    pub fn stats(&self) -> ResolverStats {
        self.stats.snapshot()
    }

    /// Run the chain, bounded by the deadline
    ///
    /// `None` means every provider failed or the deadline hit.
    async fn fetch(&self, raw_ip: &str, key: &str) -> Option<CacheEntry> {
        StatsCounters::bump(&self.stats.chain_runs);

        let found = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, self.run_chain(raw_ip)).await {
                Ok(found) => found,
                Err(_) => {
                    warn!("Resolve deadline of {:?} exceeded for {}", deadline, key);
                    None
                }
            },
            None => self.run_chain(raw_ip).await,
        };

        match found {
            Some(record) => Some(CacheEntry::new(key, record)),
            None => {
                StatsCounters::bump(&self.stats.exhausted);
                warn!("All geolocation providers failed for {}", key);
                None
            }
        }
    }

    /// Try each provider once, in order, until one succeeds
    async fn run_chain(&self, raw_ip: &str) -> Option<LocationRecord> {
        let target = if needs_auto_detect(raw_ip) {
            None
        } else {
            Some(lookup_address(raw_ip))
        };

        for provider in &self.providers {
            let outcome = provider.lookup(target).await;
            match outcome {
                ProviderOutcome::Success(record) => {
                    StatsCounters::bump(&self.stats.provider_successes);
                    info!(
                        "Located {} via {}",
                        target.unwrap_or("caller (auto-detect)"),
                        provider.name()
                    );
                    return Some(record);
                }
                ProviderOutcome::RateLimited => {
                    StatsCounters::bump(&self.stats.provider_rate_limited);
                    warn!("Provider {} {}, trying next", provider.name(), outcome.kind());
                }
                ProviderOutcome::Failed(ref e) => {
                    StatsCounters::bump(&self.stats.provider_failures);
                    warn!("Provider {} {}: {}, trying next", provider.name(), outcome.kind(), e);
                }
            }
        }

        None
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("providers", &self.provider_names())
            .field("cached", &self.cache.len())
            .field("coalesce", &self.coalesce)
            .field("deadline", &self.deadline)
            .finish()
    }
}
