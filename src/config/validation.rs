//! Configuration validation
//!
//! Checks loaded configuration values for internal consistency before any
//! component is constructed from them.

use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a loaded configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is valid
/// * `Err(ConfigError)` - A value is out of range or malformed
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.crawler.max_fetch_attempts == 0 {
        return Err(ConfigError::Validation(
            "max-fetch-attempts must be at least 1".to_string(),
        ));
    }

    if config.crawler.fetch_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch-timeout-secs must be at least 1".to_string(),
        ));
    }

    if config.crawler.circuit_failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "circuit-failure-threshold must be at least 1".to_string(),
        ));
    }

    if config.crawler.robots_cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "robots-cache-ttl-secs must be at least 1".to_string(),
        ));
    }

    if config.user_agent.crawler_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name must not be empty".to_string(),
        ));
    }

    if Url::parse(&config.user_agent.contact_url).is_err() {
        return Err(ConfigError::InvalidUrl(
            config.user_agent.contact_url.clone(),
        ));
    }

    if !config.user_agent.contact_email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "contact-email does not look like an email address: {}",
            config.user_agent.contact_email
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path must not be empty".to_string(),
        ));
    }

    Ok(())
}
