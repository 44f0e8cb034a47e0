//! Registration and upgrade preconditions against a scripted contract.

mod common;

use alloy::primitives::{Address, U256};
use std::sync::Arc;

use common::{start, test_config, tokens, wallet, MockChain, MockConnector, MEMBERSHIP, OPERATOR};
use referral_sync::chain::ChainError;
use referral_sync::ledger::{ActionStatus, ActionType, Ledger};
use referral_sync::orchestrator::{ActionOutcome, RegisterRequest, RejectReason, UpgradeRequest};
use referral_sync::Services;

async fn services(chain: &Arc<MockChain>) -> Services {
    let connector = MockConnector::new(chain, 1);
    start(test_config(1), &connector, Some(OPERATOR)).await
}

fn seed_plans(chain: &MockChain) {
    for id in 1..=6 {
        chain.set_plan(id, tokens(10 * id), true);
    }
}

#[tokio::test]
async fn test_approval_required_without_allowance() {
    let chain = MockChain::new();
    seed_plans(&chain);
    let member = wallet(0x11);
    chain.fund(member, tokens(100), U256::ZERO);
    let services = services(&chain).await;

    let outcome = services
        .orchestrator
        .register(RegisterRequest {
            wallet: member,
            upline: Address::ZERO,
            plan_id: 1,
        })
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ActionOutcome::ApprovalRequired {
            amount: tokens(10),
            spender: MEMBERSHIP,
        }
    );
    assert_eq!(chain.send_attempts(), 0);
    assert!(services.ledger.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_skipping_a_plan_is_rejected_before_chain_access() {
    let chain = MockChain::new();
    let services = services(&chain).await;
    let before = chain.calls();

    let outcome = services
        .orchestrator
        .upgrade(UpgradeRequest {
            wallet: wallet(0x22),
            current_plan: 3,
            target_plan: 5,
        })
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ActionOutcome::Rejected {
            reason: RejectReason::UpgradeMustBeNextPlan {
                current: 3,
                requested: 5,
            },
        }
    );
    assert_eq!(chain.calls(), before);
}

#[tokio::test]
async fn test_register_submits_and_records_pending() {
    let chain = MockChain::new();
    seed_plans(&chain);
    let upline = wallet(0x01);
    let member = wallet(0x12);
    chain.set_member(upline, 2);
    chain.fund(member, tokens(50), tokens(50));
    let services = services(&chain).await;

    let outcome = services
        .orchestrator
        .register(RegisterRequest {
            wallet: member,
            upline,
            plan_id: 1,
        })
        .await
        .unwrap();

    let ActionOutcome::Submitted { tx_hash } = outcome else {
        panic!("expected submission, got {:?}", outcome);
    };

    let pending = services.ledger.pending_action(&tx_hash).await.unwrap().unwrap();
    assert_eq!(pending.wallet, member);
    assert_eq!(pending.action, ActionType::Register);
    assert_eq!(pending.transition.to, 1);
    assert_eq!(pending.status, ActionStatus::Pending);

    // 100k estimate plus the default 20% buffer.
    let gas = chain.read(|s| s.sent[0].gas);
    assert_eq!(gas, Some(120_000));
}

#[tokio::test]
async fn test_register_rejections() {
    let chain = MockChain::new();
    seed_plans(&chain);
    let existing = wallet(0x30);
    let newcomer = wallet(0x31);
    chain.set_member(existing, 1);
    chain.fund(newcomer, tokens(5), tokens(5));
    let services = services(&chain).await;
    let orchestrator = &services.orchestrator;

    let reason = |outcome: ActionOutcome| match outcome {
        ActionOutcome::Rejected { reason } => reason,
        other => panic!("expected rejection, got {:?}", other),
    };

    let wrong_plan = orchestrator
        .register(RegisterRequest {
            wallet: newcomer,
            upline: existing,
            plan_id: 2,
        })
        .await
        .unwrap();
    assert_eq!(
        reason(wrong_plan),
        RejectReason::RegistrationRequiresFirstPlan { requested: 2 }
    );

    let self_ref = orchestrator
        .register(RegisterRequest {
            wallet: newcomer,
            upline: newcomer,
            plan_id: 1,
        })
        .await
        .unwrap();
    assert_eq!(reason(self_ref), RejectReason::SelfReferral);

    let twice = orchestrator
        .register(RegisterRequest {
            wallet: existing,
            upline: Address::ZERO,
            plan_id: 1,
        })
        .await
        .unwrap();
    assert_eq!(reason(twice), RejectReason::AlreadyRegistered);

    let ghost_upline = wallet(0x99);
    let orphan = orchestrator
        .register(RegisterRequest {
            wallet: newcomer,
            upline: ghost_upline,
            plan_id: 1,
        })
        .await
        .unwrap();
    assert_eq!(
        reason(orphan),
        RejectReason::UplineNotRegistered {
            upline: ghost_upline
        }
    );

    let poor = orchestrator
        .register(RegisterRequest {
            wallet: newcomer,
            upline: existing,
            plan_id: 1,
        })
        .await
        .unwrap();
    assert_eq!(
        reason(poor),
        RejectReason::InsufficientBalance {
            required: tokens(10),
            available: tokens(5),
        }
    );

    assert_eq!(chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_upgrade_checks_on_chain_plan() {
    let chain = MockChain::new();
    seed_plans(&chain);
    let member = wallet(0x40);
    chain.set_member(member, 2);
    chain.fund(member, tokens(1_000), tokens(1_000));
    let services = services(&chain).await;

    let stale = services
        .orchestrator
        .upgrade(UpgradeRequest {
            wallet: member,
            current_plan: 3,
            target_plan: 4,
        })
        .await
        .unwrap();
    assert_eq!(
        stale,
        ActionOutcome::Rejected {
            reason: RejectReason::PlanMismatch {
                expected: 3,
                actual: 2,
            },
        }
    );

    let outcome = services
        .orchestrator
        .upgrade(UpgradeRequest {
            wallet: member,
            current_plan: 2,
            target_plan: 3,
        })
        .await
        .unwrap();
    let ActionOutcome::Submitted { tx_hash } = outcome else {
        panic!("expected submission, got {:?}", outcome);
    };

    let pending = services.ledger.pending_action(&tx_hash).await.unwrap().unwrap();
    assert_eq!(pending.action, ActionType::Upgrade);
    assert_eq!(pending.transition.from, Some(2));
    assert_eq!(pending.transition.to, 3);
}

#[tokio::test]
async fn test_upgrade_to_inactive_plan() {
    let chain = MockChain::new();
    seed_plans(&chain);
    chain.set_plan(4, tokens(40), false);
    let member = wallet(0x41);
    chain.set_member(member, 3);
    chain.fund(member, tokens(1_000), tokens(1_000));
    let services = services(&chain).await;

    let outcome = services
        .orchestrator
        .upgrade(UpgradeRequest {
            wallet: member,
            current_plan: 3,
            target_plan: 4,
        })
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ActionOutcome::Rejected {
            reason: RejectReason::PlanInactive { plan_id: 4 },
        }
    );
}

#[tokio::test]
async fn test_read_only_mode_cannot_submit() {
    let chain = MockChain::new();
    seed_plans(&chain);
    let member = wallet(0x50);
    chain.fund(member, tokens(100), tokens(100));
    let connector = MockConnector::new(&chain, 1);
    let services = start(test_config(1), &connector, None).await;

    let err = services
        .orchestrator
        .register(RegisterRequest {
            wallet: member,
            upline: Address::ZERO,
            plan_id: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Wallet(_)));
    assert_eq!(chain.send_attempts(), 0);
}
