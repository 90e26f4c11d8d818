//! Configuration types for the geolocation resolver
//!
//! Configuration is built once at startup and is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Providers in fallback priority order
    pub providers: Vec<ProviderConfig>,

    /// How long a cached location stays fresh (in seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Optional cap on one whole fallback chain (in milliseconds)
    ///
    /// When exceeded the resolve behaves as if every provider failed.
    #[serde(default)]
    pub resolve_deadline_ms: Option<u64>,

    /// Share one provider-chain execution between concurrent misses on a key
    #[serde(default = "default_coalesce_requests")]
    pub coalesce_requests: bool,
}

impl ResolverConfig {
    /// Create a configuration with the given providers and default settings
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers,
            cache_ttl_secs: default_cache_ttl_secs(),
            resolve_deadline_ms: None,
            coalesce_requests: default_coalesce_requests(),
        }
    }

    /// Set the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set an overall deadline for one resolve
    pub fn with_resolve_deadline(mut self, deadline: Duration) -> Self {
        self.resolve_deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    /// Enable or disable request coalescing
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_requests = enabled;
        self
    }

    /// Cache TTL as a `Duration`
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Resolve deadline as a `Duration`, if configured
    pub fn resolve_deadline(&self) -> Option<Duration> {
        self.resolve_deadline_ms.map(Duration::from_millis)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.providers.is_empty() {
            return Err(crate::Error::config("No providers configured"));
        }

        for provider in &self.providers {
            provider.validate()?;
        }

        if self.cache_ttl_secs == 0 {
            return Err(crate::Error::config("Cache TTL must be > 0"));
        }

        if self.resolve_deadline_ms == Some(0) {
            return Err(crate::Error::config("Resolve deadline must be > 0"));
        }

        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new(
            ["ipapi", "ip-api", "ipinfo"]
                .into_iter()
                .map(ProviderConfig::new)
                .collect(),
        )
    }
}

/// One entry in the provider chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered provider type name (e.g., "ipapi", "ip-api", "ipinfo")
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Request timeout (in milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Override for the service base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// API token, for services that accept one
    #[serde(default)]
    pub token: Option<String>,
}

impl ProviderConfig {
    /// Create a provider entry with the default timeout
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            timeout_ms: default_timeout_ms(),
            base_url: None,
            token: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Point the provider at a different base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Attach an API token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        &self.provider_type
    }

    /// Validate the provider entry
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.provider_type.is_empty() {
            return Err(crate::Error::config("Provider type cannot be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(crate::Error::config(format!(
                "Provider {} timeout must be > 0",
                self.provider_type
            )));
        }
        if let Some(url) = &self.base_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "Provider {} base URL must use HTTP or HTTPS scheme. Got: {}",
                self.provider_type, url
            )));
        }
        Ok(())
    }
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_coalesce_requests() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ResolverConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
        assert!(config.coalesce_requests);
        assert_eq!(config.resolve_deadline(), None);

        let names: Vec<_> = config.providers.iter().map(|p| p.type_name()).collect();
        assert_eq!(names, ["ipapi", "ip-api", "ipinfo"]);
        assert!(config.providers.iter().all(|p| p.timeout() == Duration::from_secs(8)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ResolverConfig = serde_json::from_str(
            r#"{ "providers": [ { "type": "ip-api", "timeout_ms": 2500 }, { "type": "ipinfo", "token": "abc" } ] }"#,
        )
        .unwrap();

        assert_eq!(config.providers[0].timeout(), Duration::from_millis(2500));
        assert_eq!(config.providers[1].timeout_ms, 8_000);
        assert_eq!(config.providers[1].token.as_deref(), Some("abc"));
        assert_eq!(config.cache_ttl_secs, 86_400);
        assert!(config.coalesce_requests);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(ResolverConfig::new(vec![]).validate().is_err());
        assert!(ResolverConfig::new(vec![ProviderConfig::new("")]).validate().is_err());

        let zero_timeout = ProviderConfig::new("ipapi").with_timeout(Duration::ZERO);
        assert!(ResolverConfig::new(vec![zero_timeout]).validate().is_err());

        let bad_url = ProviderConfig::new("ipapi").with_base_url("ftp://example.com");
        assert!(ResolverConfig::new(vec![bad_url]).validate().is_err());

        let zero_ttl = ResolverConfig::default().with_cache_ttl(Duration::ZERO);
        assert!(zero_ttl.validate().is_err());

        let mut zero_deadline = ResolverConfig::default();
        zero_deadline.resolve_deadline_ms = Some(0);
        assert!(zero_deadline.validate().is_err());
    }
}
