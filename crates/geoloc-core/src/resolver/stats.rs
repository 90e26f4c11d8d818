//! Resolver counters
//!
//! Rate-limited and failed provider attempts are counted separately so
//! capacity exhaustion can be told apart from a provider outage.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the resolver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Resolves answered from a fresh cache entry
    pub cache_hits: u64,
    /// Resolves that missed the cache
    pub cache_misses: u64,
    /// Misses that waited on another caller's in-flight lookup
    pub coalesced: u64,
    /// Provider-chain executions started
    pub chain_runs: u64,
    /// Provider attempts that returned a location
    pub provider_successes: u64,
    /// Provider attempts that were rate limited
    pub provider_rate_limited: u64,
    /// Provider attempts that failed for any other reason
    pub provider_failures: u64,
    /// Chains where no provider succeeded (or the deadline hit)
    pub exhausted: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub chain_runs: AtomicU64,
    pub provider_successes: AtomicU64,
    pub provider_rate_limited: AtomicU64,
    pub provider_failures: AtomicU64,
    pub exhausted: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ResolverStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ResolverStats {
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            coalesced: load(&self.coalesced),
            chain_runs: load(&self.chain_runs),
            provider_successes: load(&self.provider_successes),
            provider_rate_limited: load(&self.provider_rate_limited),
            provider_failures: load(&self.provider_failures),
            exhausted: load(&self.exhausted),
        }
    }
}
