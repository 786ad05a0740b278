use super::models::Config;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("fetch.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("batch.chunk_size must be at least 1")]
    ZeroChunkSize,

    #[error("Invalid URL for {field} ('{url}'): {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: &'static str },

    #[error("Static proxy entry must not be empty")]
    EmptyStaticProxy,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_proxy(config)?;
    validate_fetch(config)?;
    validate_batch(config)?;
    validate_url("api.base_url", &config.api.base_url)?;
    Ok(())
}

fn validate_proxy(config: &Config) -> Result<(), ValidationError> {
    // The pool service is only contacted without a static list
    if config.proxy.static_proxies.is_empty() {
        validate_url("proxy.pool_url", &config.proxy.pool_url)?;
        if config.proxy.acquire_timeout_ms == 0 {
            return Err(ValidationError::ZeroTimeout {
                field: "proxy.acquire_timeout_ms",
            });
        }
    }

    if config.proxy.static_proxies.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::EmptyStaticProxy);
    }

    Ok(())
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    if config.fetch.max_attempts == 0 {
        return Err(ValidationError::ZeroAttempts);
    }
    if config.fetch.connect_timeout_ms == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "fetch.connect_timeout_ms",
        });
    }
    if config.fetch.request_timeout_ms == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "fetch.request_timeout_ms",
        });
    }
    Ok(())
}

fn validate_batch(config: &Config) -> Result<(), ValidationError> {
    if config.batch.chunk_size == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }
    if config.batch.timeout_secs == Some(0) {
        return Err(ValidationError::ZeroTimeout {
            field: "batch.timeout_secs",
        });
    }
    Ok(())
}

fn validate_url(field: &'static str, url: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl {
        field,
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
