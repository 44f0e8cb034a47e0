//! Paid state transitions.
//!
//! # Data Flow
//! ```text
//! register / upgrade request
//!     → local transition legality (no chain access)
//!     → membership state and plan lookup (QueryService)
//!     → balance, then allowance (ApprovalRequired short-circuits)
//!     → gas estimate with fee buffer
//!     → single submit via ChainClient
//!     → PendingAction recorded in the Ledger
//! ```
//!
//! # Design Decisions
//! - Expected refusals are `ActionOutcome` variants, not errors
//! - `Err` is reserved for chain failures the caller may retry later

pub mod engine;
pub mod types;

pub use engine::{TransactionOrchestrator, ENTRY_PLAN};
pub use types::{ActionOutcome, ActionState, RegisterRequest, RejectReason, UpgradeRequest};
