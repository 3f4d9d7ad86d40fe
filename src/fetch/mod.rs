//! Host-aware fetch layer
//!
//! This module owns everything between "a source is due" and "we have page
//! text": SSRF validation, robots checks, per-host pacing, circuit breaking,
//! conditional GETs, timeouts, manual redirect re-validation, and the retry
//! wrapper for transient failures.

mod client;
mod host_state;

pub use client::{build_http_client, FetchClient};
pub use host_state::{HostRegistry, HostState};

use crate::SecurityError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Fetch-layer errors with explicit kinds
///
/// Downstream failure classification branches on these variants; no error
/// message is ever inspected.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL rejected: {0}")]
    Security(#[from] SecurityError),

    #[error("policy blocked: {url}: {reason}")]
    PolicyBlocked { url: String, reason: String },

    #[error("circuit open for host {host}")]
    CircuitOpen { host: String },

    #[error("request timeout for {url}")]
    Timeout { url: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("too many redirects from {url}")]
    RedirectLimit { url: String },

    #[error("invalid redirect target from {url}: {location}")]
    InvalidRedirect { url: String, location: String },
}

impl FetchError {
    /// Whether the retry wrapper may try again within the same call
    ///
    /// Timeouts, network errors, and 5xx responses retry. `CircuitOpen` is
    /// transient but deliberately not retried here: the caller waits for the
    /// next scheduled attempt after the cooldown.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::HttpStatus { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Result of one successful fetch, handed to the crawl executor
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Final HTTP status (200-class, or 304)
    pub status_code: u16,

    /// Response body; empty on a 304
    pub content: String,

    /// When the response was received
    pub fetched_at: DateTime<Utc>,

    /// `ETag` response header, if the server sent one
    pub etag: Option<String>,

    /// `Last-Modified` response header, if the server sent one
    pub last_modified: Option<String>,

    /// True when the server answered 304 to our conditional headers
    pub not_modified: bool,

    /// What the robots engine had to say about this URL
    pub robots_reason: String,
}
