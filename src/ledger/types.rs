//! Rows the sync core reads and writes.

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from the ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Contract event kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MemberRegistered,
    PlanUpgraded,
    ReferralPaid,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::MemberRegistered,
        EventKind::PlanUpgraded,
        EventKind::ReferralPaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MemberRegistered => "member_registered",
            EventKind::PlanUpgraded => "plan_upgraded",
            EventKind::ReferralPaid => "referral_paid",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// De-duplication key of an applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub tx_hash: TxHash,
    pub kind: EventKind,
}

/// An event as stored for idempotency and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub tx_hash: TxHash,
    pub kind: EventKind,
    pub contract: Address,
    pub block_number: u64,
    pub log_index: u64,
    pub payload: serde_json::Value,
}

impl EventRecord {
    pub fn key(&self) -> EventKey {
        EventKey {
            tx_hash: self.tx_hash,
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Register,
    Upgrade,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Register => "register",
            ActionType::Upgrade => "upgrade",
        }
    }

    /// The event that confirms this action on-chain.
    pub fn confirming_event(&self) -> EventKind {
        match self {
            ActionType::Register => EventKind::MemberRegistered,
            ActionType::Upgrade => EventKind::PlanUpgraded,
        }
    }
}

/// Failure reason given to actions with no receipt past the pending timeout.
pub const TIMEOUT_REASON: &str = "timeout";

/// Lifecycle of a submitted action.
///
/// `Pending` may move to either terminal status. A `timeout` failure may
/// still become `Confirmed` when the transaction is mined late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

impl ActionStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        ActionStatus::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }

    /// Failed only because no receipt showed up in time.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, ActionStatus::Failed { reason } if reason == TIMEOUT_REASON)
    }

    pub fn can_transition_to(&self, next: &ActionStatus) -> bool {
        match self {
            ActionStatus::Pending => next.is_terminal(),
            ActionStatus::Failed { .. } if self.is_timed_out() => {
                matches!(next, ActionStatus::Confirmed)
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Confirmed => "confirmed",
            ActionStatus::Failed { .. } => "failed",
        }
    }
}

/// Plan change requested by an action; `from` is `None` for registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTransition {
    pub from: Option<u64>,
    pub to: u64,
}

/// A submitted state-changing call awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub tx_hash: TxHash,
    pub wallet: Address,
    pub action: ActionType,
    pub transition: PlanTransition,
    /// Unix seconds.
    pub submitted_at: u64,
    pub status: ActionStatus,
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
