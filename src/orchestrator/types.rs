//! Request and outcome types for paid actions.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::ActionStatus;

/// Join the platform. Registration always targets plan 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub wallet: Address,
    /// Referrer; `Address::ZERO` lets the contract pick a default.
    pub upline: Address,
    pub plan_id: u64,
}

/// Move from `current_plan` to `target_plan`, which must be the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    pub wallet: Address,
    pub current_plan: u64,
    pub target_plan: u64,
}

/// Result of a paid action request.
///
/// Only `Submitted` means something was sent to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Submitted { tx_hash: TxHash },
    /// The wallet must approve `amount` of the payment token for `spender` first.
    ApprovalRequired { amount: U256, spender: Address },
    Rejected { reason: RejectReason },
}

impl ActionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Submitted { .. } => "submitted",
            ActionOutcome::ApprovalRequired { .. } => "approval_required",
            ActionOutcome::Rejected { .. } => "rejected",
        }
    }
}

/// Why an action was refused before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    RegistrationRequiresFirstPlan { requested: u64 },
    UpgradeMustBeNextPlan { current: u64, requested: u64 },
    SelfReferral,
    AlreadyRegistered,
    NotRegistered,
    UplineNotRegistered { upline: Address },
    /// The caller's view of the current plan disagrees with the contract.
    PlanMismatch { expected: u64, actual: u64 },
    UnknownPlan { plan_id: u64 },
    PlanInactive { plan_id: u64 },
    InsufficientBalance { required: U256, available: U256 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RegistrationRequiresFirstPlan { requested } => {
                write!(f, "registration must target plan 1, not plan {}", requested)
            }
            RejectReason::UpgradeMustBeNextPlan { current, requested } => write!(
                f,
                "upgrade from plan {} must target plan {}, not plan {}",
                current,
                current.saturating_add(1),
                requested
            ),
            RejectReason::SelfReferral => write!(f, "a wallet cannot refer itself"),
            RejectReason::AlreadyRegistered => write!(f, "wallet is already registered"),
            RejectReason::NotRegistered => write!(f, "wallet is not registered"),
            RejectReason::UplineNotRegistered { upline } => {
                write!(f, "upline {} is not registered", upline)
            }
            RejectReason::PlanMismatch { expected, actual } => {
                write!(f, "wallet is on plan {}, not plan {}", actual, expected)
            }
            RejectReason::UnknownPlan { plan_id } => write!(f, "plan {} does not exist", plan_id),
            RejectReason::PlanInactive { plan_id } => write!(f, "plan {} is not active", plan_id),
            RejectReason::InsufficientBalance {
                required,
                available,
            } => write!(f, "balance {} is below the required {}", available, required),
        }
    }
}

/// Per-action lifecycle, traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Unsubmitted,
    PreconditionChecked,
    Submitted,
    Confirmed,
    Failed,
    ApprovalRequired,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Unsubmitted => "unsubmitted",
            ActionState::PreconditionChecked => "precondition_checked",
            ActionState::Submitted => "submitted",
            ActionState::Confirmed => "confirmed",
            ActionState::Failed => "failed",
            ActionState::ApprovalRequired => "approval_required",
        }
    }
}

impl From<&ActionStatus> for ActionState {
    fn from(status: &ActionStatus) -> Self {
        match status {
            ActionStatus::Pending => ActionState::Submitted,
            ActionStatus::Confirmed => ActionState::Confirmed,
            ActionStatus::Failed { .. } => ActionState::Failed,
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
