// # geoloc-core
//
// Core library for resolving client IP addresses to locations.
//
// ## Architecture Overview
//
// - **GeoProvider**: Trait for one third-party lookup service
// - **ProviderOutcome**: Success, rate limited, or failed; never a raw error
// - **LocationRecord**: Canonical location shape shared by all providers
// - **LocationCache**: TTL-bounded in-memory cache
// - **Resolver**: Ordered fallback across providers, cache, request coalescing
// - **ProviderRegistry**: Plugin-based registry for provider factories
//
// ## Design Principles
//
// 1. **Availability first**: `Resolver::resolve` never fails; total failure
//    yields an empty record
// 2. **No negative caching**: failures are retried on the next call
// 3. **Plugin-based**: providers are registered by name, no hard-coded if-else
// 4. **Injectable state**: every resolver owns its cache

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod traits;

// Re-export core types for convenience
pub use cache::{AUTO_CACHE_KEY, CacheEntry, CacheSnapshotEntry, LocationCache};
pub use config::{ProviderConfig, ResolverConfig};
pub use error::{Error, Result};
pub use model::LocationRecord;
pub use registry::ProviderRegistry;
pub use resolver::{Resolver, ResolverStats, needs_auto_detect};
pub use traits::{GeoProvider, GeoProviderFactory, ProviderOutcome};
