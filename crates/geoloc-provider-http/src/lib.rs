// # HTTP Geolocation Providers
//
// This crate provides the built-in Provider Adapters for the geolocation
// resolver: ipapi.co, ip-api.com and ipinfo.io.
//
// ## Contract
//
// - One HTTP GET per lookup, bounded by the configured timeout
// - HTTP 429 (or a quota message in the body) → `RateLimited`
// - Any other non-2xx, transport error, timeout or malformed body → `Failed`
// - NO retries and NO caching: both are owned by the `Resolver`
//
// ## Usage
//
// ```rust,ignore
// let registry = geoloc_core::ProviderRegistry::new();
// geoloc_provider_http::register(&registry);
// ```

mod kind;

pub use kind::ProviderKind;

use async_trait::async_trait;
use geoloc_core::config::ProviderConfig;
use geoloc_core::{Error, GeoProvider, GeoProviderFactory, ProviderOutcome, Result};
use reqwest::StatusCode;
use std::time::Duration;

/// Default request timeout for lookups (8 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

const USER_AGENT: &str = concat!("geoloc/", env!("CARGO_PKG_VERSION"));

/// One HTTP geolocation service
pub struct HttpGeoProvider {
    kind: ProviderKind,

    /// Service root; the kind appends its own path
    base_url: String,

    /// API token (ipinfo only)
    token: Option<String>,

    timeout: Duration,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for HttpGeoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGeoProvider")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpGeoProvider {
    /// Create a provider for `kind` against its public endpoint
    ///
    /// Fails if the HTTP client cannot be built with the requested timeout.
    pub fn new(kind: ProviderKind, timeout: Duration) -> Result<Self> {
        Ok(Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            token: None,
            timeout,
            client: build_client(timeout)?,
        })
    }

    /// Point the provider at a different base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach an API token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Perform the request; every `Err` becomes `Failed`
    async fn fetch(&self, ip: Option<&str>) -> Result<ProviderOutcome> {
        let url = self.kind.lookup_url(&self.base_url, ip, self.token.as_deref())?;

        tracing::debug!("{} lookup: {}", self.kind, ip.unwrap_or("auto"));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(ProviderOutcome::RateLimited);
        }
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                Error::malformed(format!("invalid JSON: {}", e))
            } else {
                self.transport_error(e)
            }
        })?;

        Ok(self.kind.interpret(&raw))
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::http(e.to_string())
        }
    }
}

#[async_trait]
impl GeoProvider for HttpGeoProvider {
    async fn lookup(&self, ip: Option<&str>) -> ProviderOutcome {
        match self.fetch(ip).await {
            Ok(outcome) => outcome,
            Err(e) => ProviderOutcome::Failed(e),
        }
    }

    fn name(&self) -> &str {
        self.kind.name()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Factory for creating HTTP geolocation providers
pub struct HttpProviderFactory {
    kind: ProviderKind,
}

impl HttpProviderFactory {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }
}

impl GeoProviderFactory for HttpProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn GeoProvider>> {
        config.validate()?;

        let mut provider = HttpGeoProvider::new(self.kind, config.timeout())?;
        if let Some(base_url) = &config.base_url {
            provider = provider.with_base_url(base_url.clone());
        }
        if let Some(token) = config.token.as_ref().filter(|t| !t.is_empty()) {
            if self.kind != ProviderKind::Ipinfo {
                tracing::warn!("Provider {} does not use a token, ignoring it", self.kind);
            } else {
                provider = provider.with_token(token.clone());
            }
        }

        // Fail at startup rather than on the first lookup
        self.kind.lookup_url(&provider.base_url, None, None)?;

        Ok(Box::new(provider))
    }
}

/// Register every HTTP provider kind with a registry
pub fn register(registry: &geoloc_core::ProviderRegistry) {
    for kind in ProviderKind::ALL {
        registry.register_provider(kind.name(), Box::new(HttpProviderFactory::new(kind)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoloc_core::ProviderRegistry;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and report the request line
    async fn serve_once(
        status: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            tokio::time::sleep(delay).await;

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        (base_url, handle)
    }

    fn provider(kind: ProviderKind, base_url: &str, timeout: Duration) -> HttpGeoProvider {
        HttpGeoProvider::new(kind, timeout).unwrap().with_base_url(base_url)
    }

    #[tokio::test]
    async fn success_is_normalized() {
        let body = r#"{"status":"success","query":"8.8.8.8","city":"Ashburn","regionName":"Virginia","region":"VA","country":"United States","countryCode":"US","lat":39.03,"lon":-77.5,"isp":"Google LLC","zip":"20149","timezone":"America/New_York"}"#;
        let (base, server) = serve_once("200 OK", body, Duration::ZERO).await;

        let outcome = provider(ProviderKind::IpApi, &base, DEFAULT_TIMEOUT)
            .lookup(Some("8.8.8.8"))
            .await;

        let record = match outcome {
            ProviderOutcome::Success(record) => record,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(record.ip.as_deref(), Some("8.8.8.8"));
        assert_eq!(record.region.as_deref(), Some("Virginia"));
        assert_eq!(record.region_code.as_deref(), Some("VA"));
        assert_eq!(record.latitude, Some(39.03));
        assert_eq!(record.timezone.as_deref(), Some("America/New_York"));

        assert_eq!(server.await.unwrap(), "GET /json/8.8.8.8 HTTP/1.1");
    }

    #[tokio::test]
    async fn auto_detect_omits_the_ip_segment() {
        let body = r#"{"ip":"203.0.113.5","city":"Paris","country":"FR","loc":"48.85,2.35"}"#;
        let (base, server) = serve_once("200 OK", body, Duration::ZERO).await;

        let outcome = provider(ProviderKind::Ipinfo, &base, DEFAULT_TIMEOUT).lookup(None).await;

        assert!(matches!(outcome, ProviderOutcome::Success(_)));
        assert_eq!(server.await.unwrap(), "GET /json HTTP/1.1");
    }

    #[tokio::test]
    async fn status_429_is_rate_limited() {
        let (base, _server) = serve_once("429 Too Many Requests", "{}", Duration::ZERO).await;

        let outcome = provider(ProviderKind::Ipapi, &base, DEFAULT_TIMEOUT)
            .lookup(Some("8.8.8.8"))
            .await;

        assert!(matches!(outcome, ProviderOutcome::RateLimited));
    }

    #[tokio::test]
    async fn server_error_is_failed() {
        let (base, _server) = serve_once("503 Service Unavailable", "{}", Duration::ZERO).await;

        let outcome = provider(ProviderKind::Ipapi, &base, DEFAULT_TIMEOUT)
            .lookup(Some("8.8.8.8"))
            .await;

        assert!(matches!(outcome, ProviderOutcome::Failed(Error::Status(503))));
    }

    #[tokio::test]
    async fn non_json_body_is_failed() {
        let (base, _server) = serve_once("200 OK", "<html>blocked</html>", Duration::ZERO).await;

        let outcome = provider(ProviderKind::Ipinfo, &base, DEFAULT_TIMEOUT)
            .lookup(Some("8.8.8.8"))
            .await;

        assert!(matches!(outcome, ProviderOutcome::Failed(Error::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn slow_server_times_out_as_failed() {
        let (base, _server) = serve_once("200 OK", r#"{"ip":"1.1.1.1"}"#, Duration::from_millis(500)).await;

        let outcome = provider(ProviderKind::Ipinfo, &base, Duration::from_millis(100))
            .lookup(Some("1.1.1.1"))
            .await;

        assert!(matches!(outcome, ProviderOutcome::Failed(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn connection_refused_is_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let outcome = provider(ProviderKind::IpApi, &base, Duration::from_secs(2))
            .lookup(Some("8.8.8.8"))
            .await;

        assert!(matches!(outcome, ProviderOutcome::Failed(Error::Http(_))));
    }

    #[test]
    fn register_installs_all_kinds() {
        let registry = ProviderRegistry::new();
        register(&registry);

        assert_eq!(registry.list_providers(), vec!["ip-api", "ipapi", "ipinfo"]);

        let chain = registry
            .create_chain(&geoloc_core::ResolverConfig::default().providers)
            .unwrap();
        let names: Vec<_> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["ipapi", "ip-api", "ipinfo"]);
        assert!(chain.iter().all(|p| p.timeout() == DEFAULT_TIMEOUT));
    }

    #[test]
    fn factory_applies_config_overrides() {
        let factory = HttpProviderFactory::new(ProviderKind::Ipinfo);
        let config = ProviderConfig::new("ipinfo")
            .with_timeout(Duration::from_millis(1500))
            .with_base_url("http://127.0.0.1:8080")
            .with_token("secret-token");

        let created = factory.create(&config).unwrap();
        assert_eq!(created.name(), "ipinfo");
        assert_eq!(created.timeout(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn factory_provider_enforces_configured_timeout() {
        let (base, _server) = serve_once("200 OK", r#"{"ip":"1.1.1.1"}"#, Duration::from_millis(500)).await;
        let config = ProviderConfig::new("ipinfo")
            .with_timeout(Duration::from_millis(100))
            .with_base_url(base);

        let created = HttpProviderFactory::new(ProviderKind::Ipinfo).create(&config).unwrap();
        let outcome = created.lookup(Some("1.1.1.1")).await;

        assert!(
            matches!(outcome, ProviderOutcome::Failed(Error::Timeout(t)) if t == Duration::from_millis(100)),
            "got {:?}",
            outcome
        );
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(build_client(Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn factory_rejects_invalid_base_url() {
        let factory = HttpProviderFactory::new(ProviderKind::Ipapi);
        let config = ProviderConfig::new("ipapi").with_base_url("ftp://example.com");
        assert!(factory.create(&config).is_err());
    }

    #[test]
    fn token_not_exposed_in_debug() {
        let provider = HttpGeoProvider::new(ProviderKind::Ipinfo, DEFAULT_TIMEOUT)
            .unwrap()
            .with_token("super-secret");
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<REDACTED>"));
    }
}
