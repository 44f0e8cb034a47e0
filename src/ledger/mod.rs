//! Local mirror of on-chain activity.
//!
//! # Data Flow
//! ```text
//! TransactionOrchestrator
//!     → record_pending (after a successful submit)
//!
//! EventSyncEngine, per event in block order
//!     → has_event / insert_event (idempotency guard, written first)
//!     → set_action_status (confirmation)
//!     → store_cursor (after the whole window)
//! ```
//!
//! # Design Decisions
//! - The store is an interface; the relational schema lives elsewhere
//! - `insert_event` reports whether the key was new so callers never double-apply
//! - Only pending actions can change status

pub mod memory;
pub mod types;

use alloy::primitives::TxHash;
use async_trait::async_trait;

pub use memory::MemoryLedger;
pub use types::{
    unix_now, ActionStatus, ActionType, EventKey, EventKind, EventRecord, LedgerError,
    LedgerResult, PendingAction, PlanTransition, TIMEOUT_REASON,
};

/// Persistence the sync core depends on.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn has_event(&self, key: &EventKey) -> LedgerResult<bool>;

    /// Store an event row; returns `false` when its key already existed.
    async fn insert_event(&self, record: EventRecord) -> LedgerResult<bool>;

    async fn event_count(&self) -> LedgerResult<usize>;

    async fn record_pending(&self, action: PendingAction) -> LedgerResult<()>;

    async fn pending_action(&self, tx_hash: &TxHash) -> LedgerResult<Option<PendingAction>>;

    /// Move a pending action to `status`; `false` if missing or already terminal.
    async fn set_action_status(&self, tx_hash: &TxHash, status: ActionStatus)
        -> LedgerResult<bool>;

    /// Actions still awaiting confirmation, oldest first.
    async fn list_pending(&self) -> LedgerResult<Vec<PendingAction>>;

    async fn load_cursor(&self) -> LedgerResult<Option<u64>>;

    async fn store_cursor(&self, block: u64) -> LedgerResult<()>;
}
