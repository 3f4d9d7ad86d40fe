//! Failure classification
//!
//! Maps typed errors to the three operational failure classes. Classification
//! branches on error variants set at the point of failure; no error message
//! is ever inspected.

use crate::fetch::FetchError;
use crate::{CrawlError, SecurityError};

/// Operational classification of a crawl failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The crawler is not allowed here (robots denial, blocked host).
    /// Distinct from `Permanent` so operators can tell "not allowed" from
    /// "site broken".
    PolicyBlocked,

    /// Worth retrying later: timeouts, network errors, 5xx, open circuits
    Transient,

    /// Will not succeed without intervention: 4xx, bad URLs, unknown sources
    Permanent,
}

impl FailureClass {
    pub fn to_db_string(self) -> &'static str {
        match self {
            FailureClass::PolicyBlocked => "policy_blocked",
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "policy_blocked" => Some(FailureClass::PolicyBlocked),
            "transient" => Some(FailureClass::Transient),
            "permanent" => Some(FailureClass::Permanent),
            _ => None,
        }
    }
}

/// Classifies a crawl error for job state and DLQ records
pub fn classify_failure(error: &CrawlError) -> FailureClass {
    match error {
        CrawlError::Fetch(fetch) => classify_fetch(fetch),
        CrawlError::Security(security) => classify_security(security),
        _ => FailureClass::Permanent,
    }
}

fn classify_fetch(error: &FetchError) -> FailureClass {
    match error {
        FetchError::PolicyBlocked { .. } => FailureClass::PolicyBlocked,
        FetchError::Security(security) => classify_security(security),
        FetchError::Timeout { .. }
        | FetchError::Network { .. }
        | FetchError::CircuitOpen { .. } => FailureClass::Transient,
        FetchError::HttpStatus { status, .. } if (500..600).contains(status) => {
            FailureClass::Transient
        }
        FetchError::HttpStatus { .. }
        | FetchError::RedirectLimit { .. }
        | FetchError::InvalidRedirect { .. } => FailureClass::Permanent,
    }
}

fn classify_security(error: &SecurityError) -> FailureClass {
    match error {
        SecurityError::BlockedHost(_) => FailureClass::PolicyBlocked,
        _ => FailureClass::Permanent,
    }
}
