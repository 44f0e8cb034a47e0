//! Precondition checks and submission for registration and upgrade.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use std::sync::Arc;

use crate::chain::contracts::IMembership;
use crate::chain::{ChainClient, ChainError, ChainResult};
use crate::ledger::{unix_now, ActionStatus, ActionType, Ledger, PendingAction, PlanTransition};
use crate::observability::metrics;
use crate::orchestrator::types::{
    ActionOutcome, ActionState, RegisterRequest, RejectReason, UpgradeRequest,
};
use crate::query::QueryService;
use crate::resilience::RateScope;

/// The only plan a new member may join.
pub const ENTRY_PLAN: u64 = 1;

/// Drives paid state changes up to submission.
///
/// Confirmation is left to the event sync engine; nothing here waits for a
/// receipt.
pub struct TransactionOrchestrator {
    client: Arc<ChainClient>,
    query: Arc<QueryService>,
    ledger: Arc<dyn Ledger>,
    scope: RateScope,
}

impl TransactionOrchestrator {
    pub fn new(client: Arc<ChainClient>, query: Arc<QueryService>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            client,
            query,
            ledger,
            scope: RateScope::named("orchestrator"),
        }
    }

    /// Register `wallet` on the entry plan under `upline`.
    pub async fn register(&self, request: RegisterRequest) -> ChainResult<ActionOutcome> {
        let RegisterRequest {
            wallet,
            upline,
            plan_id,
        } = request;
        trace_state(ActionType::Register, wallet, ActionState::Unsubmitted);

        if plan_id != ENTRY_PLAN {
            return Ok(self.reject(
                ActionType::Register,
                wallet,
                RejectReason::RegistrationRequiresFirstPlan { requested: plan_id },
            ));
        }
        if upline == wallet {
            return Ok(self.reject(ActionType::Register, wallet, RejectReason::SelfReferral));
        }

        if self.query.try_get_member_info(wallet).await?.is_some() {
            return Ok(self.reject(ActionType::Register, wallet, RejectReason::AlreadyRegistered));
        }
        if upline != Address::ZERO && self.query.try_get_member_info(upline).await?.is_none() {
            return Ok(self.reject(
                ActionType::Register,
                wallet,
                RejectReason::UplineNotRegistered { upline },
            ));
        }

        let price = match self.plan_price(ActionType::Register, wallet, plan_id).await? {
            Ok(price) => price,
            Err(outcome) => return Ok(outcome),
        };
        if let Some(outcome) = self.check_funds(ActionType::Register, wallet, price).await? {
            return Ok(outcome);
        }

        let input = IMembership::registerCall {
            member: wallet,
            upline,
            planId: U256::from(plan_id),
        }
        .abi_encode();

        self.submit_action(
            ActionType::Register,
            wallet,
            PlanTransition {
                from: None,
                to: plan_id,
            },
            input.into(),
        )
        .await
    }

    /// Upgrade `wallet` from its current plan to the next one.
    ///
    /// Illegal targets are refused before any chain access.
    pub async fn upgrade(&self, request: UpgradeRequest) -> ChainResult<ActionOutcome> {
        let UpgradeRequest {
            wallet,
            current_plan,
            target_plan,
        } = request;
        trace_state(ActionType::Upgrade, wallet, ActionState::Unsubmitted);

        if current_plan.checked_add(1) != Some(target_plan) {
            return Ok(self.reject(
                ActionType::Upgrade,
                wallet,
                RejectReason::UpgradeMustBeNextPlan {
                    current: current_plan,
                    requested: target_plan,
                },
            ));
        }

        let Some(member) = self.query.try_get_member_info(wallet).await? else {
            return Ok(self.reject(ActionType::Upgrade, wallet, RejectReason::NotRegistered));
        };
        if member.plan_id != current_plan {
            return Ok(self.reject(
                ActionType::Upgrade,
                wallet,
                RejectReason::PlanMismatch {
                    expected: current_plan,
                    actual: member.plan_id,
                },
            ));
        }

        let price = match self.plan_price(ActionType::Upgrade, wallet, target_plan).await? {
            Ok(price) => price,
            Err(outcome) => return Ok(outcome),
        };
        if let Some(outcome) = self.check_funds(ActionType::Upgrade, wallet, price).await? {
            return Ok(outcome);
        }

        let input = IMembership::upgradeCall {
            member: wallet,
            planId: U256::from(target_plan),
        }
        .abi_encode();

        self.submit_action(
            ActionType::Upgrade,
            wallet,
            PlanTransition {
                from: Some(current_plan),
                to: target_plan,
            },
            input.into(),
        )
        .await
    }

    /// Price of an existing, active plan, or the rejection to return.
    async fn plan_price(
        &self,
        action: ActionType,
        wallet: Address,
        plan_id: u64,
    ) -> ChainResult<Result<U256, ActionOutcome>> {
        let Some(plan) = self.query.try_get_plan_info(plan_id).await? else {
            return Ok(Err(self.reject(action, wallet, RejectReason::UnknownPlan { plan_id })));
        };
        if !plan.active {
            return Ok(Err(self.reject(action, wallet, RejectReason::PlanInactive { plan_id })));
        }
        Ok(Ok(plan.price))
    }

    /// Balance, then allowance. `None` means the wallet can pay.
    async fn check_funds(
        &self,
        action: ActionType,
        wallet: Address,
        amount: U256,
    ) -> ChainResult<Option<ActionOutcome>> {
        let balance = self.query.token_balance(wallet).await?;
        if balance < amount {
            return Ok(Some(self.reject(
                action,
                wallet,
                RejectReason::InsufficientBalance {
                    required: amount,
                    available: balance,
                },
            )));
        }

        let allowance = self.query.token_allowance(wallet).await?;
        if allowance < amount {
            trace_state(action, wallet, ActionState::ApprovalRequired);
            tracing::info!(
                action = action.as_str(),
                wallet = %wallet,
                required = %amount,
                allowance = %allowance,
                "Token approval required before submission"
            );
            let outcome = ActionOutcome::ApprovalRequired {
                amount,
                spender: self.query.membership_address(),
            };
            metrics::record_action(action.as_str(), outcome.label());
            return Ok(Some(outcome));
        }

        trace_state(action, wallet, ActionState::PreconditionChecked);
        Ok(None)
    }

    /// Estimate, submit once, record the pending action.
    async fn submit_action(
        &self,
        action: ActionType,
        wallet: Address,
        transition: PlanTransition,
        input: Bytes,
    ) -> ChainResult<ActionOutcome> {
        let signer = self
            .client
            .signer_address()
            .ok_or_else(|| ChainError::Wallet("no signing key configured".to_string()))?;

        let tx = TransactionRequest::default()
            .with_from(signer)
            .with_to(self.query.membership_address())
            .with_input(input);
        let gas_limit = self.client.estimate_gas_buffered(&self.scope, &tx).await?;
        let tx = tx.with_gas_limit(gas_limit);

        let tx_hash = match self.client.send_transaction(&self.scope, tx).await {
            Ok(hash) => hash,
            Err(e) => {
                trace_state(action, wallet, ActionState::Failed);
                metrics::record_action(action.as_str(), "failed");
                return Err(e);
            }
        };
        trace_state(action, wallet, ActionState::Submitted);

        let pending = PendingAction {
            tx_hash,
            wallet,
            action,
            transition,
            submitted_at: unix_now(),
            status: ActionStatus::Pending,
        };
        if let Err(e) = self.ledger.record_pending(pending).await {
            // The transaction is already out; the sync engine still records its event.
            tracing::error!(
                tx_hash = %tx_hash,
                wallet = %wallet,
                error = %e,
                "Failed to record pending action"
            );
        }

        let outcome = ActionOutcome::Submitted { tx_hash };
        metrics::record_action(action.as_str(), outcome.label());
        tracing::info!(
            action = action.as_str(),
            wallet = %wallet,
            tx_hash = %tx_hash,
            gas_limit,
            "Action submitted"
        );
        Ok(outcome)
    }

    fn reject(&self, action: ActionType, wallet: Address, reason: RejectReason) -> ActionOutcome {
        tracing::info!(
            action = action.as_str(),
            wallet = %wallet,
            reason = %reason,
            "Action rejected"
        );
        let outcome = ActionOutcome::Rejected { reason };
        metrics::record_action(action.as_str(), outcome.label());
        outcome
    }
}

fn trace_state(action: ActionType, wallet: Address, state: ActionState) {
    tracing::debug!(action = action.as_str(), wallet = %wallet, state = %state, "Action state");
}
