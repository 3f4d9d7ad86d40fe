//! URL security validation
//!
//! The SSRF defense layer. Every URL the fetch client is about to request —
//! including each redirect hop — passes through [`validate_crawl_url`] first.
//! The check is a pure function with no I/O: it rejects unparseable URLs,
//! non-http(s) schemes, loopback/private/link-local targets, and hosts that
//! do not match the source's allowed host.

use crate::{SecurityError, SecurityResult};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Hostnames that are never crawlable, regardless of how they resolve
const BLOCKED_LITERALS: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Domain suffixes reserved for internal networks
const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal"];

/// Validates a crawl target URL before any network call
///
/// # Arguments
///
/// * `raw` - The URL to validate
/// * `allowed_host` - The host this source is permitted to reach. `None`
///   means the URL's own host is the allowed host (so only the safety checks
///   apply, not the match check).
/// * `allow_loopback` - Permit loopback addresses. Only set by integration
///   fixtures served from 127.0.0.1; every other blocked range stays blocked.
///
/// # Returns
///
/// * `Ok(Url)` - The parsed, validated URL
/// * `Err(SecurityError)` - Why the URL must not be fetched
pub fn validate_crawl_url(
    raw: &str,
    allowed_host: Option<&str>,
    allow_loopback: bool,
) -> SecurityResult<Url> {
    let url = Url::parse(raw).map_err(|e| SecurityError::InvalidUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(SecurityError::UnsupportedScheme(other.to_string())),
    }

    let host = url
        .host()
        .ok_or_else(|| SecurityError::InvalidUrl(format!("{raw}: no host")))?;

    match &host {
        Host::Domain(domain) => {
            let lower = domain.to_ascii_lowercase();
            if BLOCKED_LITERALS.contains(&lower.as_str()) && !(allow_loopback && lower == "localhost")
            {
                return Err(SecurityError::BlockedHost(lower));
            }
            if BLOCKED_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
                return Err(SecurityError::BlockedHost(lower));
            }
        }
        Host::Ipv4(addr) => {
            if ipv4_blocked(addr, allow_loopback) {
                return Err(SecurityError::BlockedHost(addr.to_string()));
            }
        }
        Host::Ipv6(addr) => {
            if ipv6_blocked(addr, allow_loopback) {
                return Err(SecurityError::BlockedHost(addr.to_string()));
            }
        }
    }

    if let Some(expected) = allowed_host {
        let actual = host_string(&host);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SecurityError::HostMismatch {
                actual,
                expected: expected.to_string(),
            });
        }
    }

    Ok(url)
}

/// Renders a parsed host the way it appears in an allowed-host comparison
fn host_string(host: &Host<&str>) -> String {
    match host {
        Host::Domain(d) => d.to_string(),
        Host::Ipv4(a) => a.to_string(),
        Host::Ipv6(a) => a.to_string(),
    }
}

fn ipv4_blocked(addr: &Ipv4Addr, allow_loopback: bool) -> bool {
    if addr.is_loopback() {
        return !allow_loopback;
    }
    addr.is_private() || addr.is_link_local() || addr.is_unspecified() || addr.is_broadcast()
}

fn ipv6_blocked(addr: &Ipv6Addr, allow_loopback: bool) -> bool {
    if addr.is_loopback() {
        return !allow_loopback;
    }
    if addr.is_unspecified() {
        return true;
    }
    // Unique-local fc00::/7 and link-local fe80::/10
    let segments = addr.segments();
    if segments[0] & 0xfe00 == 0xfc00 || segments[0] & 0xffc0 == 0xfe80 {
        return true;
    }
    // IPv4-mapped addresses inherit the IPv4 rules
    if let Some(v4) = addr.to_ipv4_mapped() {
        return ipv4_blocked(&v4, allow_loopback);
    }
    false
}
