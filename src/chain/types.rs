//! Chain-specific types and error definitions.

use alloy::primitives::{Address, B256};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Errors that can occur during chain operations.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Connection-level failure talking to a node.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider refused the call because of its own rate limits.
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// The node answered with an error (revert, bad params).
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Response could not be decoded into the expected type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Node serves a different network than configured.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Every endpoint in the pool failed; a systemic outage.
    #[error("No provider available: all {0} endpoints failed")]
    NoProviderAvailable(usize),

    /// Missing or invalid signing key.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Endpoint URL could not be used.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

impl ChainError {
    /// Errors after which the active connection is abandoned.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ChainError::Transport(_) | ChainError::Timeout(_) | ChainError::ChainMismatch { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChainError::RateLimited(_))
    }

    /// Transient errors are retried later rather than reported to users.
    pub fn is_transient(&self) -> bool {
        self.is_connection_error() || self.is_rate_limited()
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// One node URL in the failover pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEndpoint {
    /// Position in the configured pool; failover walks ordinals in order.
    pub ordinal: usize,
    pub url: Url,
}

impl ProviderEndpoint {
    pub fn parse(ordinal: usize, raw: &str) -> ChainResult<Self> {
        let url = raw.parse::<Url>().map_err(|e| ChainError::InvalidEndpoint {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { ordinal, url })
    }

    /// Host part only, so credentials in paths or query strings stay out of logs.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("unknown")
    }
}

impl fmt::Display for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.ordinal, self.host())
    }
}

/// A single-topic log query over an inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topic0: B256,
    pub from_block: u64,
    pub to_block: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ChainError::Transport("reset".into()).is_connection_error());
        assert!(ChainError::Timeout(10).is_connection_error());
        assert!(!ChainError::RateLimited("429".into()).is_connection_error());
        assert!(ChainError::RateLimited("429".into()).is_transient());
        assert!(!ChainError::Rpc("execution reverted".into()).is_transient());
        assert!(!ChainError::NoProviderAvailable(3).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ChainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = ChainError::ChainMismatch { expected: 56, actual: 1 };
        assert!(err.to_string().contains("expected 56"));
    }

    #[test]
    fn test_endpoint_display_hides_path() {
        let endpoint = ProviderEndpoint::parse(1, "https://rpc.example.org/v1/secret-key").unwrap();
        assert_eq!(endpoint.to_string(), "#1 rpc.example.org");
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = ProviderEndpoint::parse(0, "not a url").unwrap_err();
        assert!(matches!(err, ChainError::InvalidEndpoint { .. }));
    }
}
