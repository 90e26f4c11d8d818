//! Client IP classification
//!
//! Decides whether a candidate IP can be looked up explicitly or whether the
//! providers should be asked to locate the caller themselves ("auto-detect").
//! Matching is prefix based on the first octet groups; no CIDR math.

use crate::cache::AUTO_CACHE_KEY;

const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// Cache key for a raw client IP: the trimmed IP, or `"auto"` when empty
///
/// Trimming is intentional: whitespace-only input is treated as no IP, so
/// `"   "` shares the `"auto"` entry.
pub fn cache_key(raw_ip: &str) -> String {
    let ip = raw_ip.trim();
    if ip.is_empty() {
        AUTO_CACHE_KEY.to_string()
    } else {
        ip.to_string()
    }
}

/// Strip the IPv4-mapped IPv6 prefix that dual-stack listeners report
///
/// `"::ffff:203.0.113.5"` becomes `"203.0.113.5"`. Anything else is returned
/// trimmed but otherwise untouched.
pub fn lookup_address(raw_ip: &str) -> &str {
    let ip = raw_ip.trim();
    match ip.get(..IPV4_MAPPED_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(IPV4_MAPPED_PREFIX) => {
            let rest = &ip[IPV4_MAPPED_PREFIX.len()..];
            if rest.contains('.') { rest } else { ip }
        }
        _ => ip,
    }
}

/// Whether `raw_ip` is not independently resolvable
///
/// True for the empty string, the loopback literals and the private ranges
/// `10.0.0.0/8`, `172.16.0.0/12` and `192.168.0.0/16`.
pub fn needs_auto_detect(raw_ip: &str) -> bool {
    let ip = lookup_address(raw_ip);

    if ip.is_empty() || ip == "::1" || ip == "127.0.0.1" {
        return true;
    }

    if ip.starts_with("10.") || ip.starts_with("192.168.") {
        return true;
    }

    if let Some(rest) = ip.strip_prefix("172.") {
        return rest
            .split('.')
            .next()
            .and_then(|octet| octet.parse::<u8>().ok())
            .is_some_and(|octet| (16..=31).contains(&octet));
    }

    false
}
