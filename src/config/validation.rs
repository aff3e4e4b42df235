use crate::config::types::{
    Config, CrawlerConfig, DedupConfig, HttpConfig, OutputConfig, RetryConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_http_config(&config.http)?;
    validate_dedup_config(&config.dedup)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in &config.seeds {
        validate_http_url(seed, "seed URL")?;
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.fetch_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout must be >= 1s, got {}s",
            config.fetch_timeout
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be <= 10, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay < config.base_delay {
        return Err(ConfigError::Validation(format!(
            "max_delay ({}ms) must not be below base_delay ({}ms)",
            config.max_delay, config.base_delay
        )));
    }

    Ok(())
}

/// Validates HTTP configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    validate_http_url(&config.listing_api, "listing_api")?;

    if config.user_area.is_empty() || !config.user_area.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "user_area must be a numeric area code, got '{}'",
            config.user_area
        )));
    }

    Ok(())
}

/// Validates dedup configuration
fn validate_dedup_config(config: &DedupConfig) -> Result<(), ConfigError> {
    if let Some(scope) = &config.scope {
        if scope.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dedup scope cannot be blank".to_string(),
            ));
        }
        if !config.persistent {
            return Err(ConfigError::Validation(
                "dedup scope requires persistent = true".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.export_dir.is_empty() {
        return Err(ConfigError::Validation(
            "export_dir cannot be empty".to_string(),
        ));
    }

    if config.sinks.is_empty() {
        return Err(ConfigError::Validation(
            "at least one sink must be configured".to_string(),
        ));
    }

    for (i, sink) in config.sinks.iter().enumerate() {
        if config.sinks[..i].contains(sink) {
            return Err(ConfigError::Validation(format!(
                "sink {:?} is listed more than once",
                sink
            )));
        }
    }

    Ok(())
}

/// Validates that a string is an absolute http(s) URL
fn validate_http_url(value: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(())
}
