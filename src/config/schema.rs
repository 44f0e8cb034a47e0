//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sync engine.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Root configuration for the chain access and event sync engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Node endpoints and chain identity.
    pub chain: ChainConfig,

    /// Contract addresses.
    pub contracts: ContractsConfig,

    /// Outbound call admission control.
    pub rate_limit: RateLimitConfig,

    /// Read cache sizing and staleness.
    pub cache: CacheConfig,

    /// Event ingestion loop.
    pub sync: EventSyncConfig,

    /// Local ledger persistence.
    pub ledger: LedgerConfig,

    /// Diagnostics HTTP surface.
    pub admin: AdminConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Blockchain connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Ordered failover pool of JSON-RPC endpoint URLs.
    pub endpoints: Vec<String>,

    /// Expected chain ID; a node reporting another one fails its liveness check.
    pub chain_id: u64,

    /// Per-call RPC timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Percentage added on top of the gas estimate for write calls.
    pub fee_buffer_percent: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8545".to_string()],
            chain_id: 56,
            rpc_timeout_secs: 10,
            fee_buffer_percent: 20,
        }
    }
}

/// Addresses of the contracts the engine talks to.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContractsConfig {
    /// Membership/referral contract.
    pub membership: String,

    /// ERC-20 token used for plan payments.
    pub token: String,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admitted calls per window for scopes without an override.
    pub max_requests: u32,

    /// Trailing window length in seconds.
    pub window_secs: u64,

    /// Sleep between admission attempts when a window is full.
    pub backoff_ms: u64,

    /// How often idle windows are pruned.
    pub cleanup_interval_secs: u64,

    /// Per-scope capacity overrides, keyed by scope name.
    pub scopes: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 25,
            window_secs: 60,
            backoff_ms: 2_000,
            cleanup_interval_secs: 30,
            scopes: HashMap::new(),
        }
    }
}

/// Read cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of live entries before LRU eviction.
    pub max_entries: usize,

    /// Interval of the background expiry sweep.
    pub sweep_interval_secs: u64,

    /// Static plan fields (price, name, capacity).
    pub plan_ttl_secs: u64,

    /// Plan cycle counters.
    pub cycle_ttl_secs: u64,

    /// Member records.
    pub member_ttl_secs: u64,

    /// System-wide statistics.
    pub stats_ttl_secs: u64,

    /// Token decimal precision.
    pub decimals_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            sweep_interval_secs: 60,
            plan_ttl_secs: 3_600,
            cycle_ttl_secs: 120,
            member_ttl_secs: 300,
            stats_ttl_secs: 60,
            decimals_ttl_secs: 7 * 24 * 3_600,
        }
    }
}

/// Event ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventSyncConfig {
    /// Enable the event sync loop.
    pub enabled: bool,

    /// Interval between scan cycles in milliseconds.
    pub interval_ms: u64,

    /// Extra blocks per scan window beyond the first one.
    pub window_blocks: u64,

    /// Blocks behind head treated as final.
    pub confirmation_blocks: u64,

    /// First block to scan when no cursor is stored; defaults to the current head.
    pub start_block: Option<u64>,

    /// Base delay after a deferred cycle.
    pub retry_base_ms: u64,

    /// Upper bound for the deferred-cycle delay.
    pub retry_max_ms: u64,

    /// Pending actions older than this are checked against their receipts.
    pub pending_timeout_secs: u64,

    /// Interval of the pending-action sweep.
    pub sweep_interval_secs: u64,
}

impl Default for EventSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            window_blocks: 5,
            confirmation_blocks: 0,
            start_block: None,
            retry_base_ms: 1_000,
            retry_max_ms: 30_000,
            pending_timeout_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Ledger persistence.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON snapshot written whenever the sync cursor advances.
    pub snapshot_path: Option<String>,
}

/// Admin diagnostics server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: String::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "referral_sync=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [contracts]
            membership = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            token = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
            "#,
        )
        .unwrap();

        assert_eq!(config.chain.fee_buffer_percent, 20);
        assert_eq!(config.rate_limit.backoff_ms, 2_000);
        assert_eq!(config.sync.window_blocks, 5);
        assert!(config.ledger.snapshot_path.is_none());
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_scope_overrides_parse() {
        let config: SyncConfig = toml::from_str(
            r#"
            [chain]
            endpoints = ["https://a.example", "https://b.example"]
            chain_id = 97

            [rate_limit]
            max_requests = 10
            [rate_limit.scopes]
            event-sync = 4

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.chain.endpoints.len(), 2);
        assert_eq!(config.rate_limit.scopes.get("event-sync"), Some(&4));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
