//! Robots.txt policy engine
//!
//! Fetches, parses, and caches robots.txt per origin, then answers path
//! permission checks. The engine fails open: if robots.txt cannot be fetched
//! or parsed, crawling proceeds and the reason records why. Robots
//! unavailability must never block a crawl.

mod cache;
mod parser;

pub use cache::CachedRules;
pub use parser::DisallowRules;

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Outcome of a robots policy check
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    /// Whether the path may be crawled
    pub allowed: bool,

    /// Human-readable explanation, also recorded on fetch outcomes
    pub reason: String,
}

/// Per-origin robots.txt engine with a TTL cache
pub struct RobotsEngine {
    http: Client,
    cache: Mutex<HashMap<String, CachedRules>>,
    crawler_name: String,
    ttl_secs: u64,
}

impl RobotsEngine {
    /// Creates a new engine
    ///
    /// # Arguments
    ///
    /// * `http` - Client used for robots.txt fetches (carries the descriptive
    ///   user agent)
    /// * `crawler_name` - Name matched against `User-agent:` blocks
    /// * `ttl_secs` - How long a cached origin entry stays fresh
    pub fn new(http: Client, crawler_name: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            http,
            cache: Mutex::new(HashMap::new()),
            crawler_name: crawler_name.into(),
            ttl_secs,
        }
    }

    /// Checks whether `target` may be crawled under its origin's robots.txt
    ///
    /// On cache miss or expiry the origin's robots.txt is fetched first.
    /// Unreachable or unparseable robots.txt fails open.
    pub async fn check_policy(&self, target: &Url) -> PolicyDecision {
        let origin = target.origin().ascii_serialization();

        let cached = {
            let cache = self.cache.lock().unwrap();
            cache
                .get(&origin)
                .filter(|entry| !entry.is_stale(self.ttl_secs))
                .cloned()
        };

        let entry = match cached {
            Some(entry) => entry,
            None => {
                let entry = self.fetch_rules(&origin).await;
                let mut cache = self.cache.lock().unwrap();
                cache.insert(origin.clone(), entry.clone());
                entry
            }
        };

        let path = target.path();
        match entry.rules.blocking_pattern(path) {
            Some(pattern) => PolicyDecision {
                allowed: false,
                reason: format!("disallowed by robots.txt pattern {pattern}"),
            },
            None => PolicyDecision {
                allowed: true,
                reason: entry.reason.clone(),
            },
        }
    }

    /// Fetches and parses robots.txt for one origin; never fails
    async fn fetch_rules(&self, origin: &str) -> CachedRules {
        let robots_url = format!("{origin}/robots.txt");
        tracing::debug!(origin, "fetching robots.txt");

        match self.http.get(&robots_url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.text().await {
                        Ok(body) => {
                            let rules = DisallowRules::parse(&body, &self.crawler_name);
                            let reason = format!("parsed {} disallow rules", rules.len());
                            CachedRules::new(rules, reason)
                        }
                        Err(e) => {
                            tracing::warn!(origin, error = %e, "robots.txt body unreadable, failing open");
                            CachedRules::new(
                                DisallowRules::allow_all(),
                                format!("robots body unreadable ({e}), failing open"),
                            )
                        }
                    }
                } else {
                    tracing::debug!(origin, status = status.as_u16(), "robots.txt unavailable, failing open");
                    CachedRules::new(
                        DisallowRules::allow_all(),
                        format!("robots fetch returned {}, failing open", status.as_u16()),
                    )
                }
            }
            Err(e) => {
                tracing::warn!(origin, error = %e, "robots.txt fetch failed, failing open");
                CachedRules::new(
                    DisallowRules::allow_all(),
                    format!("robots fetch failed ({e}), failing open"),
                )
            }
        }
    }

    /// Drops every cached origin entry
    ///
    /// Used by tests and operational resets.
    pub fn reset(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// Number of origins currently cached
    pub fn cached_origins(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}
