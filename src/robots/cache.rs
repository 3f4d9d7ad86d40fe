//! Per-origin robots.txt cache entries
//!
//! Each origin gets one entry holding the disallow rules collected for this
//! crawler plus the fetch timestamp, so the engine can expire entries after
//! the configured TTL.

use crate::robots::DisallowRules;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt rules for one origin
#[derive(Debug, Clone)]
pub struct CachedRules {
    /// Disallow rules collected for this crawler
    pub rules: DisallowRules,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// Why the entry holds what it holds ("parsed", "robots fetch returned 404", ...)
    pub reason: String,
}

impl CachedRules {
    /// Creates a new cache entry stamped with the current time
    pub fn new(rules: DisallowRules, reason: impl Into<String>) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
            reason: reason.into(),
        }
    }

    /// Checks if this entry is older than `ttl_secs`
    pub fn is_stale(&self, ttl_secs: u64) -> bool {
        let age = Utc::now() - self.fetched_at;
        age > Duration::seconds(ttl_secs as i64)
    }
}
