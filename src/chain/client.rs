//! Chain client with ordered provider failover.
//!
//! # Responsibilities
//! - Hold exactly one active connection at a time
//! - Verify every new connection serves the configured chain
//! - Rotate to the next endpoint when a connection-level error occurs
//! - Gate every outbound call through the rate limiter
//!
//! Reads are retried across the pool. Writes run once; a failed write may
//! already have reached the mempool and re-sending could double-spend.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::{Log, TransactionRequest};
use alloy::sol_types::SolCall;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::chain::rpc::{ChainRpc, Connector};
use crate::chain::types::{ChainError, ChainResult, LogQuery, ProviderEndpoint};
use crate::config::ChainConfig;
use crate::observability::metrics;
use crate::resilience::{RateLimiter, RateScope};

/// The live binding to one node.
#[derive(Clone)]
pub struct ChainConnection {
    pub endpoint: ProviderEndpoint,
    pub chain_id: u64,
    rpc: Arc<dyn ChainRpc>,
}

impl ChainConnection {
    pub fn rpc(&self) -> Arc<dyn ChainRpc> {
        self.rpc.clone()
    }
}

/// Public view of the active connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub endpoint: Option<ProviderEndpoint>,
    pub chain_id: u64,
    pub signer: Option<Address>,
    pub pool_size: usize,
}

/// Chain access shared by the query, orchestration and sync layers.
pub struct ChainClient {
    pool: Vec<ProviderEndpoint>,
    connector: Arc<dyn Connector>,
    limiter: Arc<RateLimiter>,
    active: RwLock<Option<ChainConnection>>,
    /// Serializes re-dials so concurrent failures trigger a single rotation.
    dial_lock: Mutex<()>,
    config: ChainConfig,
    signer: Option<Address>,
    timeout_duration: Duration,
}

impl ChainClient {
    /// Build the endpoint pool and establish the first connection.
    ///
    /// An unreachable pool is logged but does not fail construction; the next
    /// call re-dials from the top of the pool.
    pub async fn new(
        config: ChainConfig,
        connector: Arc<dyn Connector>,
        limiter: Arc<RateLimiter>,
        signer: Option<Address>,
    ) -> ChainResult<Self> {
        let mut pool = Vec::with_capacity(config.endpoints.len());
        for raw in &config.endpoints {
            match ProviderEndpoint::parse(pool.len(), raw) {
                Ok(endpoint) => pool.push(endpoint),
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid RPC endpoint"),
            }
        }

        if pool.is_empty() {
            return Err(ChainError::InvalidEndpoint {
                url: config.endpoints.join(","),
                reason: "no usable endpoints configured".to_string(),
            });
        }

        let client = Self {
            pool,
            connector,
            limiter,
            active: RwLock::new(None),
            dial_lock: Mutex::new(()),
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            config,
            signer,
        };

        match client.establish(0, None).await {
            Ok(conn) => tracing::info!(
                endpoint = %conn.endpoint,
                chain_id = conn.chain_id,
                pool_size = client.pool.len(),
                "Chain client initialized"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Chain client initialized without a live connection"
            ),
        }

        Ok(client)
    }

    /// Run a read against the active connection, failing over on connection errors.
    ///
    /// Each attempt takes its own rate-limit slot. Rate limiting by the node and
    /// contract-level errors are returned immediately.
    pub async fn call<T, F, Fut>(
        &self,
        scope: &RateScope,
        operation: &'static str,
        read: F,
    ) -> ChainResult<T>
    where
        F: Fn(Arc<dyn ChainRpc>) -> Fut + Send + Sync,
        Fut: Future<Output = ChainResult<T>> + Send,
        T: Send,
    {
        let attempts = self.pool.len();
        let mut last_error = ChainError::NoProviderAvailable(attempts);

        for attempt in 1..=attempts {
            self.limiter.admit(scope).await;
            let conn = self.connection().await?;

            let error = match timeout(self.timeout_duration, read(conn.rpc())).await {
                Ok(Ok(value)) => {
                    metrics::record_rpc_call(operation, true);
                    return Ok(value);
                }
                Ok(Err(e)) if e.is_connection_error() => e,
                Ok(Err(e)) => {
                    metrics::record_rpc_call(operation, false);
                    return Err(e);
                }
                Err(_) => ChainError::Timeout(self.config.rpc_timeout_secs),
            };

            metrics::record_rpc_call(operation, false);
            tracing::warn!(
                operation,
                endpoint = %conn.endpoint,
                attempt,
                error = %error,
                "RPC call failed, failing over"
            );
            self.failover(&conn).await?;
            last_error = error;
        }

        // A healthy connection is in place again; only this call gives up.
        tracing::warn!(
            operation,
            attempts,
            error = %last_error,
            "RPC call out of attempts"
        );
        Err(last_error)
    }

    /// Run a state-changing operation exactly once.
    ///
    /// A connection error still rotates the pool for later calls, but the
    /// write itself is never re-sent.
    pub async fn submit<F, Fut>(&self, scope: &RateScope, write: F) -> ChainResult<TxHash>
    where
        F: FnOnce(Arc<dyn ChainRpc>) -> Fut + Send,
        Fut: Future<Output = ChainResult<TxHash>> + Send,
    {
        if self.signer.is_none() {
            return Err(ChainError::Wallet("no signing key configured".to_string()));
        }

        self.limiter.admit(scope).await;
        let conn = self.connection().await?;

        let result = match timeout(self.timeout_duration, write(conn.rpc())).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(self.config.rpc_timeout_secs)),
        };

        match &result {
            Ok(hash) => {
                metrics::record_rpc_call("send_transaction", true);
                tracing::info!(tx_hash = %hash, endpoint = %conn.endpoint, "Transaction submitted");
            }
            Err(e) => {
                metrics::record_rpc_call("send_transaction", false);
                tracing::warn!(
                    endpoint = %conn.endpoint,
                    error = %e,
                    "Transaction submission failed; not retrying"
                );
                if e.is_connection_error() {
                    if let Err(failover_err) = self.failover(&conn).await {
                        tracing::warn!(error = %failover_err, "Failover after write failure did not succeed");
                    }
                }
            }
        }

        result
    }

    pub async fn block_number(&self, scope: &RateScope) -> ChainResult<u64> {
        self.call(scope, "block_number", |rpc| async move { rpc.block_number().await })
            .await
    }

    /// Encode `call`, run it against `to`, and decode the return values.
    pub async fn read_contract<C: SolCall>(
        &self,
        scope: &RateScope,
        to: Address,
        call: &C,
    ) -> ChainResult<C::Return>
    where
        C::Return: Send,
    {
        let input: Bytes = call.abi_encode().into();
        let tx = TransactionRequest::default().with_to(to).with_input(input);

        let raw = self
            .call(scope, "eth_call", move |rpc| {
                let tx = tx.clone();
                async move { rpc.call(tx).await }
            })
            .await?;

        C::abi_decode_returns(&raw).map_err(|e| ChainError::Decode(e.to_string()))
    }

    pub async fn get_logs(&self, scope: &RateScope, query: LogQuery) -> ChainResult<Vec<Log>> {
        self.call(scope, "get_logs", move |rpc| async move { rpc.get_logs(&query).await })
            .await
    }

    pub async fn transaction_status(
        &self,
        scope: &RateScope,
        hash: TxHash,
    ) -> ChainResult<Option<bool>> {
        self.call(scope, "transaction_status", move |rpc| async move {
            rpc.transaction_status(hash).await
        })
        .await
    }

    /// Gas estimate padded by the configured fee buffer.
    pub async fn estimate_gas_buffered(
        &self,
        scope: &RateScope,
        tx: &TransactionRequest,
    ) -> ChainResult<u64> {
        let tx = tx.clone();
        let estimate = self
            .call(scope, "estimate_gas", move |rpc| {
                let tx = tx.clone();
                async move { rpc.estimate_gas(tx).await }
            })
            .await?;

        Ok(apply_fee_buffer(estimate, self.config.fee_buffer_percent))
    }

    pub async fn send_transaction(
        &self,
        scope: &RateScope,
        tx: TransactionRequest,
    ) -> ChainResult<TxHash> {
        self.submit(scope, move |rpc| async move { rpc.send_transaction(tx).await })
            .await
    }

    pub async fn active_endpoint(&self) -> Option<ProviderEndpoint> {
        self.active.read().await.as_ref().map(|conn| conn.endpoint.clone())
    }

    pub async fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            endpoint: self.active_endpoint().await,
            chain_id: self.config.chain_id,
            signer: self.signer,
            pool_size: self.pool.len(),
        }
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    /// The active connection, dialing from the top of the pool if there is none.
    async fn connection(&self) -> ChainResult<ChainConnection> {
        let current = self.active.read().await.clone();
        match current {
            Some(conn) => Ok(conn),
            None => self.establish(0, None).await,
        }
    }

    /// Drop `failed` and move to the endpoint after it.
    async fn failover(&self, failed: &ChainConnection) -> ChainResult<ChainConnection> {
        metrics::record_provider_failover(failed.endpoint.host());
        self.establish(failed.endpoint.ordinal + 1, Some(failed.endpoint.ordinal))
            .await
    }

    /// Walk the pool once starting at `start`, keeping the first healthy endpoint.
    ///
    /// When `replacing` is set and another task already swapped the connection
    /// away from that ordinal, the existing replacement is returned instead.
    async fn establish(
        &self,
        start: usize,
        replacing: Option<usize>,
    ) -> ChainResult<ChainConnection> {
        let _guard = self.dial_lock.lock().await;

        let current = self.active.read().await.clone();
        if let Some(conn) = current {
            match replacing {
                Some(ordinal) if conn.endpoint.ordinal != ordinal => return Ok(conn),
                None => return Ok(conn),
                _ => {}
            }
        }

        let n = self.pool.len();
        for step in 0..n {
            let endpoint = &self.pool[(start + step) % n];
            match self.dial(endpoint).await {
                Ok(conn) => {
                    *self.active.write().await = Some(conn.clone());
                    metrics::record_active_provider(endpoint.ordinal);
                    tracing::info!(endpoint = %endpoint, "Connected to chain provider");
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "Provider unavailable, trying next");
                }
            }
        }

        *self.active.write().await = None;
        tracing::error!(
            alert = "no_provider",
            endpoints = n,
            "All chain providers failed"
        );
        Err(ChainError::NoProviderAvailable(n))
    }

    /// Connect and check the node serves the configured chain.
    async fn dial(&self, endpoint: &ProviderEndpoint) -> ChainResult<ChainConnection> {
        let rpc = self.connector.connect(endpoint).await?;

        let chain_id = match timeout(self.timeout_duration, rpc.chain_id()).await {
            Ok(result) => result?,
            Err(_) => return Err(ChainError::Timeout(self.config.rpc_timeout_secs)),
        };

        if chain_id != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id,
            });
        }

        Ok(ChainConnection {
            endpoint: endpoint.clone(),
            chain_id,
            rpc,
        })
    }
}

/// Pad a gas estimate by `percent`, rounding down.
pub fn apply_fee_buffer(estimate: u64, percent: u64) -> u64 {
    let padded = u128::from(estimate) * (100 + u128::from(percent)) / 100;
    u64::try_from(padded).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_buffer() {
        assert_eq!(apply_fee_buffer(100_000, 20), 120_000);
        assert_eq!(apply_fee_buffer(21_000, 0), 21_000);
        assert_eq!(apply_fee_buffer(u64::MAX, 20), u64::MAX);
    }
}
