// # Geo Provider Trait
//
// Defines the interface for a single third-party IP geolocation service.
//
// ## Implementations
//
// - ipapi.co, ip-api.com, ipinfo.io: `geoloc-provider-http` crate
// - Test doubles: `tests/common/mod.rs`
//
// ## Usage
//
// ```rust,ignore
// use geoloc_core::{GeoProvider, ProviderOutcome};
//
// let provider = /* GeoProvider implementation */;
// match provider.lookup(Some("8.8.8.8")).await {
//     ProviderOutcome::Success(record) => println!("{:?}", record.city),
//     ProviderOutcome::RateLimited => println!("try the next one"),
//     ProviderOutcome::Failed(e) => println!("failed: {}", e),
// }
// ```

use async_trait::async_trait;
use std::time::Duration;

use crate::model::LocationRecord;

/// Outcome of a single provider lookup
///
/// Adapters fold every transport and protocol problem into this type. The
/// resolver pattern-matches on it and never sees a raw transport error.
#[derive(Debug)]
pub enum ProviderOutcome {
    /// Well-formed response, already normalized
    Success(LocationRecord),
    /// HTTP 429 or an explicit quota message from the provider
    RateLimited,
    /// Any other status, transport error, timeout or malformed body
    Failed(crate::Error),
}

impl ProviderOutcome {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderOutcome::Success(_) => "success",
            ProviderOutcome::RateLimited => "rate_limited",
            ProviderOutcome::Failed(_) => "failed",
        }
    }
}

/// Trait for geolocation provider implementations
///
/// # Contract
///
/// - One outbound request per call, bounded by [`GeoProvider::timeout`]
/// - `ip == None` asks the provider to locate the caller's own public address
/// - No retries, no caching, no shared mutable state with other providers
/// - Never panics on bad input from the network
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Look up the location for `ip`, or for the caller when `ip` is `None`
    async fn lookup(&self, ip: Option<&str>) -> ProviderOutcome;

    /// Stable provider name for logs and configuration
    fn name(&self) -> &str;

    /// Per-request timeout
    fn timeout(&self) -> Duration;
}

/// Helper trait for constructing providers from configuration
pub trait GeoProviderFactory: Send + Sync {
    /// Create a provider instance from its configuration entry
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn GeoProvider>, crate::Error>;
}
