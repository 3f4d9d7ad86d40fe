use serde::Deserialize;

/// Main configuration structure for progwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum delay between requests to the same host (milliseconds)
    #[serde(rename = "pacing-delay-ms", default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,

    /// Consecutive transient failures before the per-host circuit opens
    #[serde(
        rename = "circuit-failure-threshold",
        default = "default_circuit_failure_threshold"
    )]
    pub circuit_failure_threshold: u32,

    /// How long an open circuit stays open (seconds)
    #[serde(rename = "circuit-cooldown-secs", default = "default_circuit_cooldown_secs")]
    pub circuit_cooldown_secs: u64,

    /// Hard bound on every HTTP request (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum fetch attempts per crawl for transient failures
    #[serde(rename = "max-fetch-attempts", default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,

    /// Base delay for exponential retry backoff (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// How long a cached robots.txt stays fresh (seconds)
    #[serde(rename = "robots-cache-ttl-secs", default = "default_robots_cache_ttl_secs")]
    pub robots_cache_ttl_secs: u64,

    /// Permit loopback targets. Only for integration fixtures served from
    /// 127.0.0.1; private and link-local ranges stay blocked regardless.
    #[serde(rename = "allow-loopback", default)]
    pub allow_loopback: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl UserAgentConfig {
    /// Formats the full user agent string: `Name/Version (+ContactURL; ContactEmail)`
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

fn default_pacing_delay_ms() -> u64 {
    250
}

fn default_circuit_failure_threshold() -> u32 {
    3
}

fn default_circuit_cooldown_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_fetch_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_robots_cache_ttl_secs() -> u64 {
    3600
}
