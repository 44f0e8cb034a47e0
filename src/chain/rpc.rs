//! Raw node access behind a trait seam.
//!
//! [`ChainClient`](crate::chain::ChainClient) only talks to nodes through
//! [`ChainRpc`], and obtains handles through a [`Connector`]. Production uses
//! alloy HTTP providers; tests plug in scripted nodes.

use alloy::network::EthereumWallet;
use alloy::primitives::{Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::types::{ChainError, ChainResult, LogQuery, ProviderEndpoint};
use crate::chain::wallet::Wallet;

/// Operations needed from a node.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> ChainResult<u64>;

    async fn block_number(&self) -> ChainResult<u64>;

    /// `eth_call` against latest state.
    async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes>;

    async fn estimate_gas(&self, tx: TransactionRequest) -> ChainResult<u64>;

    /// Sign and broadcast; returns once the node accepted the transaction.
    async fn send_transaction(&self, tx: TransactionRequest) -> ChainResult<TxHash>;

    async fn get_logs(&self, query: &LogQuery) -> ChainResult<Vec<Log>>;

    /// `None` while no receipt exists, otherwise whether execution succeeded.
    async fn transaction_status(&self, hash: TxHash) -> ChainResult<Option<bool>>;
}

/// Opens a [`ChainRpc`] handle for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &ProviderEndpoint) -> ChainResult<Arc<dyn ChainRpc>>;
}

/// [`ChainRpc`] over an alloy provider.
#[derive(Clone)]
pub struct AlloyRpc {
    provider: Arc<dyn Provider + Send + Sync>,
}

impl AlloyRpc {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainRpc for AlloyRpc {
    async fn chain_id(&self) -> ChainResult<u64> {
        self.provider.get_chain_id().await.map_err(classify_transport_error)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.provider.get_block_number().await.map_err(classify_transport_error)
    }

    async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes> {
        self.provider.call(tx).await.map_err(classify_transport_error)
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> ChainResult<u64> {
        self.provider.estimate_gas(tx).await.map_err(classify_transport_error)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> ChainResult<TxHash> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(classify_transport_error)?;
        Ok(*pending.tx_hash())
    }

    async fn get_logs(&self, query: &LogQuery) -> ChainResult<Vec<Log>> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.topic0)
            .from_block(query.from_block)
            .to_block(query.to_block);

        self.provider.get_logs(&filter).await.map_err(classify_transport_error)
    }

    async fn transaction_status(&self, hash: TxHash) -> ChainResult<Option<bool>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify_transport_error)?;
        Ok(receipt.map(|r| r.status()))
    }
}

/// Builds HTTP providers, attaching the operator wallet when one is configured.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    wallet: Option<Wallet>,
}

impl HttpConnector {
    pub fn new(wallet: Option<Wallet>) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, endpoint: &ProviderEndpoint) -> ChainResult<Arc<dyn ChainRpc>> {
        let url = endpoint.url.clone();
        let provider: Arc<dyn Provider + Send + Sync> = match &self.wallet {
            Some(wallet) => {
                let signer: EthereumWallet = wallet.ethereum_wallet();
                Arc::new(ProviderBuilder::new().wallet(signer).connect_http(url))
            }
            None => Arc::new(ProviderBuilder::new().connect_http(url)),
        };

        Ok(Arc::new(AlloyRpc::new(provider)))
    }
}

/// Map an alloy transport error onto the failover-relevant categories.
pub fn classify_transport_error(err: TransportError) -> ChainError {
    let message = err.to_string();
    let lowered = message.to_lowercase();

    if lowered.contains("429")
        || lowered.contains("rate limit")
        || lowered.contains("too many requests")
    {
        return ChainError::RateLimited(message);
    }

    match err {
        RpcError::Transport(_) => ChainError::Transport(message),
        RpcError::ErrorResp(_) => ChainError::Rpc(message),
        RpcError::DeserError { .. } | RpcError::SerError(_) => ChainError::Decode(message),
        _ => ChainError::Rpc(message),
    }
}
