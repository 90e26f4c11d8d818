// # geolocd - Geolocation Daemon
//
// Thin integration layer around `geoloc-core`. All lookup, caching and
// fallback logic lives in the library; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Registers providers and builds the resolver
// 4. Resolves client IPs read from stdin, one JSON line per input on stdout
//
// ## Configuration
//
// - `GEOLOC_PROVIDERS`: Comma-separated provider chain, in fallback order
//   (default: `ipapi,ip-api,ipinfo`)
// - `GEOLOC_PROVIDER_TIMEOUT_MS`: Per-provider timeout (default: 8000)
// - `GEOLOC_CACHE_TTL_SECS`: Cache freshness window (default: 86400)
// - `GEOLOC_RESOLVE_DEADLINE_MS`: Optional cap on one whole fallback chain
// - `GEOLOC_COALESCE`: Share lookups between concurrent misses (default: true)
// - `GEOLOC_IPINFO_TOKEN`: Optional ipinfo.io token
// - `GEOLOC_PURGE_INTERVAL_SECS`: How often expired entries are dropped (default: 3600)
// - `GEOLOC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export GEOLOC_PROVIDERS=ip-api,ipinfo
// export GEOLOC_PROVIDER_TIMEOUT_MS=3000
// printf '8.8.8.8\n\n10.0.0.4\n' | geolocd
// ```

use anyhow::Result;
use geoloc_core::{ProviderConfig, ProviderRegistry, Resolver, ResolverConfig};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum GeolocExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<GeolocExitCode> for ExitCode {
    fn from(code: GeolocExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    providers: Vec<String>,
    provider_timeout_ms: u64,
    cache_ttl_secs: u64,
    resolve_deadline_ms: Option<u64>,
    coalesce: bool,
    ipinfo_token: Option<String>,
    purge_interval_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            providers: env::var("GEOLOC_PROVIDERS")
                .unwrap_or_else(|_| "ipapi,ip-api,ipinfo".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            provider_timeout_ms: parse_var("GEOLOC_PROVIDER_TIMEOUT_MS")?.unwrap_or(8_000),
            cache_ttl_secs: parse_var("GEOLOC_CACHE_TTL_SECS")?.unwrap_or(86_400),
            resolve_deadline_ms: parse_var("GEOLOC_RESOLVE_DEADLINE_MS")?,
            coalesce: parse_var("GEOLOC_COALESCE")?.unwrap_or(true),
            ipinfo_token: env::var("GEOLOC_IPINFO_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            purge_interval_secs: parse_var("GEOLOC_PURGE_INTERVAL_SECS")?.unwrap_or(3_600),
            log_level: env::var("GEOLOC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!(
                "GEOLOC_PROVIDERS must name at least one provider. \
                Set it via: export GEOLOC_PROVIDERS=ipapi,ip-api,ipinfo"
            );
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.as_str()) {
                anyhow::bail!("GEOLOC_PROVIDERS lists '{}' more than once", provider);
            }
        }

        if !(100..=60_000).contains(&self.provider_timeout_ms) {
            anyhow::bail!(
                "GEOLOC_PROVIDER_TIMEOUT_MS must be between 100 and 60000. Got: {}",
                self.provider_timeout_ms
            );
        }

        if self.cache_ttl_secs == 0 {
            anyhow::bail!("GEOLOC_CACHE_TTL_SECS must be > 0");
        }

        if self.resolve_deadline_ms == Some(0) {
            anyhow::bail!("GEOLOC_RESOLVE_DEADLINE_MS must be > 0 when set");
        }

        if self.purge_interval_secs == 0 {
            anyhow::bail!("GEOLOC_PURGE_INTERVAL_SECS must be > 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GEOLOC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Translate into the library configuration
    fn resolver_config(&self) -> ResolverConfig {
        let timeout = Duration::from_millis(self.provider_timeout_ms);
        let providers = self
            .providers
            .iter()
            .map(|name| {
                let provider = ProviderConfig::new(name.as_str()).with_timeout(timeout);
                match (&self.ipinfo_token, name.as_str()) {
                    (Some(token), "ipinfo") => provider.with_token(token.clone()),
                    _ => provider,
                }
            })
            .collect();

        let mut config = ResolverConfig::new(providers)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_coalescing(self.coalesce);
        if let Some(deadline) = self.resolve_deadline_ms {
            config = config.with_resolve_deadline(Duration::from_millis(deadline));
        }
        config
    }
}

/// Parse an optional environment variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e)),
        _ => Ok(None),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return GeolocExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return GeolocExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries results, logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GeolocExitCode::ConfigError.into();
    }

    info!("Starting geolocd");

    if let Some(deadline) = config.resolve_deadline_ms
        && deadline < config.provider_timeout_ms
    {
        warn!(
            "GEOLOC_RESOLVE_DEADLINE_MS ({}) is shorter than one provider timeout ({}); \
            later providers may never be tried",
            deadline, config.provider_timeout_ms
        );
    }

    let registry = ProviderRegistry::new();
    register_providers(&registry);

    if let Err(e) = check_providers(&registry, &config.providers) {
        error!("{}", e);
        return GeolocExitCode::ConfigError.into();
    }

    let resolver = match Resolver::from_config(&config.resolver_config(), &registry) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            error!("Failed to build resolver: {}", e);
            return GeolocExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GeolocExitCode::RuntimeError.into();
        }
    };

    let purge_interval = Duration::from_secs(config.purge_interval_secs);
    let result = rt.block_on(async {
        if let Err(e) = run_daemon(resolver, purge_interval).await {
            error!("Daemon error: {}", e);
            GeolocExitCode::RuntimeError
        } else {
            GeolocExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Register every compiled-in provider family
fn register_providers(registry: &ProviderRegistry) {
    #[cfg(feature = "http")]
    {
        info!("Registering HTTP geolocation providers");
        geoloc_provider_http::register(registry);
    }

    if registry.list_providers().is_empty() {
        warn!("No provider families compiled in; every lookup will return an empty record");
    }
}

/// Reject configured provider names that no compiled-in family provides
fn check_providers(registry: &ProviderRegistry, providers: &[String]) -> Result<()> {
    let unknown: Vec<_> = providers
        .iter()
        .filter(|name| !registry.has_provider(name))
        .map(String::as_str)
        .collect();

    if !unknown.is_empty() {
        anyhow::bail!(
            "GEOLOC_PROVIDERS names unknown provider(s): {}. Available: {}",
            unknown.join(", "),
            registry.list_providers().join(", ")
        );
    }

    Ok(())
}

/// Resolve stdin lines until EOF or a shutdown signal
async fn run_daemon(resolver: Arc<Resolver>, purge_interval: Duration) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(1024);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut purge = tokio::time::interval(purge_interval);
    purge.tick().await;

    let mut tasks = tokio::task::JoinSet::new();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next() => {
                match line {
                    Some(Ok(raw_ip)) => {
                        let resolver = Arc::clone(&resolver);
                        let out_tx = out_tx.clone();
                        tasks.spawn(async move {
                            let location = resolver.resolve(&raw_ip).await;
                            let line = serde_json::json!({ "input": raw_ip, "location": location });
                            if out_tx.send(line.to_string()).await.is_err() {
                                warn!("Output closed, dropping result for {}", raw_ip);
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }

            _ = purge.tick() => {
                resolver.purge_expired().await;
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Resolve task failed: {}", e);
                }
            }

            signal = &mut shutdown => {
                match signal {
                    Ok(name) => info!("Received shutdown signal: {}", name),
                    Err(e) => error!("Signal handler error: {}", e),
                }
                break;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Resolve task failed: {}", e);
        }
    }

    drop(out_tx);
    writer.await??;

    let stats = resolver.stats();
    info!(
        "Shutting down: hits={}, misses={}, coalesced={}, chains={}, rate_limited={}, failures={}, exhausted={}",
        stats.cache_hits,
        stats.cache_misses,
        stats.coalesced,
        stats.chain_runs,
        stats.provider_rate_limited,
        stats.provider_failures,
        stats.exhausted
    );
    for entry in resolver.cache_snapshot() {
        debug!(
            "cache entry {} age={}m has_data={}",
            entry.key, entry.age_minutes, entry.has_data
        );
    }

    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            providers: vec!["ipapi".into(), "ip-api".into(), "ipinfo".into()],
            provider_timeout_ms: 8_000,
            cache_ttl_secs: 86_400,
            resolve_deadline_ms: None,
            coalesce: true,
            ipinfo_token: None,
            purge_interval_secs: 3_600,
            log_level: "info".into(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_and_empty_provider_lists() {
        let mut cfg = config();
        cfg.providers = vec![];
        assert!(cfg.validate().is_err());

        cfg.providers = vec!["ipapi".into(), "ipapi".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = config();
        cfg.provider_timeout_ms = 10;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.cache_ttl_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn token_is_attached_to_ipinfo_only() {
        let mut cfg = config();
        cfg.ipinfo_token = Some("tok".into());
        cfg.resolve_deadline_ms = Some(20_000);

        let resolver_config = cfg.resolver_config();
        assert!(resolver_config.validate().is_ok());
        assert_eq!(resolver_config.resolve_deadline(), Some(Duration::from_secs(20)));

        for provider in &resolver_config.providers {
            let expected = (provider.provider_type == "ipinfo").then(|| "tok".to_string());
            assert_eq!(provider.token, expected);
            assert_eq!(provider.timeout(), Duration::from_secs(8));
        }
    }

    #[cfg(feature = "http")]
    #[test]
    fn unknown_provider_names_are_reported() {
        let registry = ProviderRegistry::new();
        register_providers(&registry);

        assert!(check_providers(&registry, &config().providers).is_ok());

        let err = check_providers(&registry, &["ipinfo".into(), "maxmind".into()]).unwrap_err();
        assert!(err.to_string().contains("maxmind"));
        assert!(!err.to_string().contains("unknown provider(s): ipinfo"));
    }

    #[cfg(feature = "http")]
    #[test]
    fn default_chain_builds_with_http_providers() {
        let registry = ProviderRegistry::new();
        register_providers(&registry);

        let resolver = Resolver::from_config(&config().resolver_config(), &registry).unwrap();
        assert_eq!(resolver.provider_names(), ["ipapi", "ip-api", "ipinfo"]);
    }
}
