//! Configuration validation.
//!
//! Serde handles syntax; this module checks that values make sense together.
//! Every problem is reported, not just the first one.

use std::fmt;
use std::net::SocketAddr;
use alloy::primitives::Address;

use crate::config::schema::SyncConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.chain.endpoints.is_empty() {
        errors.push(ValidationError::new("chain.endpoints", "at least one endpoint is required"));
    }
    for endpoint in &config.chain.endpoints {
        if let Err(e) = endpoint.parse::<url::Url>() {
            errors.push(ValidationError::new(
                "chain.endpoints",
                format!("invalid URL '{}': {}", endpoint, e),
            ));
        }
    }
    if config.chain.chain_id == 0 {
        errors.push(ValidationError::new("chain.chain_id", "must be non-zero"));
    }
    if config.chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be greater than 0"));
    }

    for (field, value) in [
        ("contracts.membership", &config.contracts.membership),
        ("contracts.token", &config.contracts.token),
    ] {
        match value.parse::<Address>() {
            Ok(addr) if addr == Address::ZERO => {
                errors.push(ValidationError::new(field, "must not be the zero address"));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(
                field,
                format!("invalid address '{}': {}", value, e),
            )),
        }
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    for (scope, cap) in &config.rate_limit.scopes {
        if *cap == 0 {
            errors.push(ValidationError::new(
                "rate_limit.scopes",
                format!("scope '{}' must allow at least one request", scope),
            ));
        }
    }

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0"));
    }

    if config.sync.interval_ms == 0 {
        errors.push(ValidationError::new("sync.interval_ms", "must be greater than 0"));
    }
    if config.sync.retry_base_ms > config.sync.retry_max_ms {
        errors.push(ValidationError::new(
            "sync.retry_base_ms",
            "must not exceed sync.retry_max_ms",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("invalid socket address '{}'", config.admin.bind_address),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
