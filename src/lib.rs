//! Progwatch: a polite change-detection crawler
//!
//! This crate implements the ingestion pipeline that fetches registered
//! government/utility program pages on a schedule, detects and scores changes
//! against the previous snapshot, and hands parseable content to a downstream
//! parse pipeline. Fetching is guarded by SSRF validation, robots.txt
//! politeness, per-host pacing and circuit breaking; persistence is
//! idempotent and failures land in a replayable dead-letter queue.

pub mod config;
pub mod crawl;
pub mod diff;
pub mod fetch;
pub mod pipeline;
pub mod robots;
pub mod security;
pub mod storage;

use thiserror::Error;

/// Main error type for progwatch operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL rejected: {0}")]
    Security(#[from] SecurityError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Crawl job not found: {0}")]
    JobNotFound(String),

    #[error("DLQ entry not found: {0}")]
    DlqEntryNotFound(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL security validation errors (the SSRF defense layer)
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Blocked host: {0}")]
    BlockedHost(String),

    #[error("Host mismatch: got {actual}, expected {expected}")]
    HostMismatch { actual: String, expected: String },
}

/// Result type alias for progwatch operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL security checks
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

// Re-export commonly used types
pub use config::Config;
pub use crawl::{classify_failure, CrawlExecutor, CrawlReport, FailureClass};
pub use diff::{build_diff_records, DiffDraft, DiffKind};
pub use fetch::{FetchClient, FetchError, FetchOutcome, HostRegistry};
pub use security::validate_crawl_url;
pub use storage::{SqliteStorage, Storage};
