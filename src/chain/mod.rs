//! Chain access subsystem.
//!
//! # Data Flow
//! ```text
//! QueryService / TransactionOrchestrator / EventSyncEngine
//!     → client.rs (rate-limit admit, active connection lookup)
//!     → rpc.rs (ChainRpc over an alloy provider)
//!     → JSON-RPC node
//!
//! On a connection-level error:
//!     → client.rs re-dials the next endpoint in pool order
//!     → every endpoint failed: NoProviderAvailable (alert)
//! ```
//!
//! # Design Decisions
//! - Node access sits behind the `ChainRpc` trait so tests can script failures
//! - New connections are checked against the configured chain ID
//! - Contract bindings are generated with `sol!`

pub mod client;
pub mod contracts;
pub mod rpc;
pub mod types;
pub mod wallet;

pub use client::{apply_fee_buffer, ChainClient, ChainConnection, ConnectionInfo};
pub use rpc::{AlloyRpc, ChainRpc, Connector, HttpConnector};
pub use types::{ChainError, ChainResult, LogQuery, ProviderEndpoint};
pub use wallet::Wallet;
