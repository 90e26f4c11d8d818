// # Provider Kinds
//
// The closed set of supported lookup services. Each kind knows its default
// endpoint, how to build a lookup URL (with or without an explicit IP) and how
// to map its native JSON onto `LocationRecord`.
//
// | Kind     | Explicit IP                 | Auto-detect        |
// |----------|-----------------------------|--------------------|
// | `ipapi`  | `{base}/{ip}/json/`         | `{base}/json/`     |
// | `ip-api` | `{base}/json/{ip}`          | `{base}/json/`     |
// | `ipinfo` | `{base}/{ip}/json?token=..` | `{base}/json`      |

use geoloc_core::model::{json_coord, json_str, split_lat_long};
use geoloc_core::{Error, LocationRecord, ProviderOutcome, Result};
use reqwest::Url;
use serde_json::Value;

/// A supported geolocation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// ipapi.co
    Ipapi,
    /// ip-api.com
    IpApi,
    /// ipinfo.io
    Ipinfo,
}

impl ProviderKind {
    /// All kinds, in the default fallback order
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Ipapi, ProviderKind::IpApi, ProviderKind::Ipinfo];

    /// Registry name of this kind
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Ipapi => "ipapi",
            ProviderKind::IpApi => "ip-api",
            ProviderKind::Ipinfo => "ipinfo",
        }
    }

    /// Public endpoint used when no base URL is configured
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Ipapi => "https://ipapi.co",
            // The free tier is HTTP only
            ProviderKind::IpApi => "http://ip-api.com",
            ProviderKind::Ipinfo => "https://ipinfo.io",
        }
    }

    /// Build the lookup URL for `ip`, or the auto-detect URL when `None`
    ///
    /// The IP is pushed as a path segment, so it is percent-encoded and can
    /// never escape the path.
    pub fn lookup_url(self, base_url: &str, ip: Option<&str>, token: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid base URL {}: {}", base_url, e)))?;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::config(format!("Base URL cannot carry a path: {}", base_url)))?;
            segments.pop_if_empty();

            match (self, ip) {
                (ProviderKind::Ipapi, Some(ip)) => {
                    segments.push(ip).push("json").push("");
                }
                (ProviderKind::Ipapi, None) => {
                    segments.push("json").push("");
                }
                (ProviderKind::IpApi, Some(ip)) => {
                    segments.push("json").push(ip);
                }
                (ProviderKind::IpApi, None) => {
                    segments.push("json").push("");
                }
                (ProviderKind::Ipinfo, Some(ip)) => {
                    segments.push(ip).push("json");
                }
                (ProviderKind::Ipinfo, None) => {
                    segments.push("json");
                }
            }
        }

        if let (ProviderKind::Ipinfo, Some(token)) = (self, token) {
            url.query_pairs_mut().append_pair("token", token);
        }

        Ok(url)
    }

    /// Interpret a decoded JSON body
    ///
    /// Error bodies become `Failed` (or `RateLimited` when the service says
    /// so). A body that normalizes to an empty record is malformed.
    pub fn interpret(self, raw: &Value) -> ProviderOutcome {
        if !raw.is_object() {
            return ProviderOutcome::Failed(Error::malformed("response is not a JSON object"));
        }

        if let Some(reason) = self.error_reason(raw) {
            if is_rate_limit_message(&reason) {
                return ProviderOutcome::RateLimited;
            }
            return ProviderOutcome::Failed(Error::provider(self.name(), reason));
        }

        let record = self.transform(raw);
        if record.is_empty() {
            return ProviderOutcome::Failed(Error::malformed("response carried no location fields"));
        }

        ProviderOutcome::Success(record)
    }

    /// Map the service's native field names onto the canonical record
    pub fn transform(self, raw: &Value) -> LocationRecord {
        match self {
            ProviderKind::Ipapi => LocationRecord {
                ip: json_str(raw, "ip"),
                city: json_str(raw, "city"),
                region: json_str(raw, "region"),
                region_code: json_str(raw, "region_code"),
                country: json_str(raw, "country"),
                country_name: json_str(raw, "country_name"),
                country_code: json_str(raw, "country_code"),
                latitude: json_coord(raw, "latitude"),
                longitude: json_coord(raw, "longitude"),
                organization: json_str(raw, "org"),
                postal_code: json_str(raw, "postal"),
                timezone: json_str(raw, "timezone"),
            },
            ProviderKind::IpApi => LocationRecord {
                ip: json_str(raw, "query"),
                city: json_str(raw, "city"),
                region: json_str(raw, "regionName"),
                region_code: json_str(raw, "region"),
                country: json_str(raw, "country"),
                country_name: json_str(raw, "country"),
                country_code: json_str(raw, "countryCode"),
                latitude: json_coord(raw, "lat"),
                longitude: json_coord(raw, "lon"),
                organization: json_str(raw, "isp"),
                postal_code: json_str(raw, "zip"),
                timezone: json_str(raw, "timezone"),
            },
            ProviderKind::Ipinfo => {
                let (latitude, longitude) = json_str(raw, "loc")
                    .map(|loc| split_lat_long(&loc))
                    .unwrap_or((None, None));
                LocationRecord {
                    ip: json_str(raw, "ip"),
                    city: json_str(raw, "city"),
                    region: json_str(raw, "region"),
                    region_code: None,
                    country: json_str(raw, "country"),
                    country_name: None,
                    country_code: json_str(raw, "country"),
                    latitude,
                    longitude,
                    organization: json_str(raw, "org"),
                    postal_code: json_str(raw, "postal"),
                    timezone: json_str(raw, "timezone"),
                }
            }
        }
    }

    /// The service-specific "this lookup failed" signal inside a 2xx body
    fn error_reason(self, raw: &Value) -> Option<String> {
        match self {
            ProviderKind::Ipapi => raw
                .get("error")
                .and_then(Value::as_bool)
                .filter(|&e| e)
                .map(|_| {
                    json_str(raw, "reason")
                        .or_else(|| json_str(raw, "message"))
                        .unwrap_or_else(|| "error flag set".to_string())
                }),
            ProviderKind::IpApi => match raw.get("status").and_then(Value::as_str) {
                Some("success") | None => None,
                Some(_) => Some(json_str(raw, "message").unwrap_or_else(|| "status fail".to_string())),
            },
            ProviderKind::Ipinfo => {
                if raw.get("bogon").and_then(Value::as_bool) == Some(true) {
                    return Some("bogon address".to_string());
                }
                raw.get("error").map(|error| {
                    json_str(error, "title")
                        .or_else(|| json_str(error, "message"))
                        .or_else(|| error.as_str().map(str::to_string))
                        .unwrap_or_else(|| "error object present".to_string())
                })
            }
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn is_rate_limit_message(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason.contains("ratelimit") || reason.contains("rate limit") || reason.contains("quota")
}
