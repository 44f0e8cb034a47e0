//! Event synchronization subsystem.
//!
//! # Data Flow
//! ```text
//! Fixed-interval tick (engine.rs, single-flight)
//!     → head block, bounded window after the cursor
//!     → one log query per registered filter (rate limit aborts the cycle)
//!     → events.rs decode + sort by (block, log index)
//!     → per event: ledger row first, then pending action + cache invalidation
//!     → cursor stored
//!
//! Pending actions past their timeout (sweeper.rs)
//!     → receipt lookup → confirmed / failed
//!
//! Every terminal transition → notify.rs broadcast
//! ```
//!
//! # Design Decisions
//! - Idempotency comes from the ledger key, not from the cursor
//! - A failed cycle commits nothing and retries the same window
//! - Deferred cycles back off with jitter before the next tick

pub mod engine;
pub mod events;
pub mod notify;
pub mod sweeper;

pub use engine::{CycleOutcome, EventSyncEngine, SyncError, SyncState, SyncStatus};
pub use events::{decode_log, order_events, ChainEvent, ChainEventPayload};
pub use notify::{ActionNotifier, ActionUpdate};
pub use sweeper::{PendingSweeper, SweepReport};
