//! Normalized location data
//!
//! Every provider maps its native response onto [`LocationRecord`]. Field
//! names are canonical regardless of source, and a field the provider did not
//! supply is absent rather than defaulted.

use serde::{Deserialize, Serialize};

/// The normalized result of a successful lookup
///
/// Serializes with camelCase keys and omits absent fields entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl LocationRecord {
    /// A record with every field absent, returned when all providers fail
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract a non-empty string field from a JSON object
///
/// Numbers are rendered to strings so providers that return numeric postal
/// codes still populate the field. Empty strings count as absent.
pub fn json_str(value: &serde_json::Value, field: &str) -> Option<String> {
    match value.get(field)? {
        serde_json::Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract a coordinate from a JSON object
///
/// Accepts JSON numbers and numeric strings. Missing, unparsable or
/// non-finite values yield `None`, never zero.
pub fn json_coord(value: &serde_json::Value, field: &str) -> Option<f64> {
    let coord = match value.get(field)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_coord(s),
        _ => None,
    }?;
    coord.is_finite().then_some(coord)
}

/// Parse a single coordinate from text
pub fn parse_coord(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|c| c.is_finite())
}

/// Split a combined `"lat,long"` string into two coordinates
///
/// Each half is parsed on its own, so a malformed longitude does not discard
/// a valid latitude.
pub fn split_lat_long(text: &str) -> (Option<f64>, Option<f64>) {
    let mut parts = text.splitn(2, ',');
    let lat = parts.next().and_then(parse_coord);
    let long = parts.next().and_then(parse_coord);
    (lat, long)
}
