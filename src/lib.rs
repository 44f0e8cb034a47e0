//! Chain access and event synchronization for a membership/referral platform.

pub mod admin;
pub mod cache;
pub mod chain;
pub mod config;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod query;
pub mod resilience;
pub mod sync;

pub use chain::{ChainClient, ChainError};
pub use config::SyncConfig;
pub use lifecycle::{Services, Shutdown};
pub use orchestrator::{ActionOutcome, TransactionOrchestrator};
pub use query::QueryService;
pub use sync::EventSyncEngine;
