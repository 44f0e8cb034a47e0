//! Typed contract events, decoded at the RPC boundary.

use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use serde::Serialize;

use crate::chain::contracts::{MemberRegistered, PlanUpgraded, ReferralPaid};
use crate::ledger::{EventKey, EventKind, EventRecord};

impl EventKind {
    /// Topic 0 of the matching contract event.
    pub fn topic0(&self) -> B256 {
        match self {
            EventKind::MemberRegistered => MemberRegistered::SIGNATURE_HASH,
            EventKind::PlanUpgraded => PlanUpgraded::SIGNATURE_HASH,
            EventKind::ReferralPaid => ReferralPaid::SIGNATURE_HASH,
        }
    }

    pub fn from_topic0(topic0: &B256) -> Option<Self> {
        EventKind::ALL.into_iter().find(|kind| kind.topic0() == *topic0)
    }
}

/// Decoded event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEventPayload {
    MemberRegistered {
        member: Address,
        upline: Address,
        plan_id: u64,
        cycle_number: u64,
    },
    PlanUpgraded {
        member: Address,
        from_plan: u64,
        to_plan: u64,
        cycle_number: u64,
    },
    ReferralPaid {
        recipient: Address,
        payer: Address,
        amount: U256,
        plan_id: u64,
    },
    /// A log this build does not understand; kept for forward compatibility.
    Unknown { topic0: Option<B256> },
}

impl ChainEventPayload {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            ChainEventPayload::MemberRegistered { .. } => Some(EventKind::MemberRegistered),
            ChainEventPayload::PlanUpgraded { .. } => Some(EventKind::PlanUpgraded),
            ChainEventPayload::ReferralPaid { .. } => Some(EventKind::ReferralPaid),
            ChainEventPayload::Unknown { .. } => None,
        }
    }

    /// Members whose cached records this event makes stale.
    pub fn affected_members(&self) -> Vec<Address> {
        match self {
            ChainEventPayload::MemberRegistered { member, upline, .. } => vec![*member, *upline],
            ChainEventPayload::PlanUpgraded { member, .. } => vec![*member],
            ChainEventPayload::ReferralPaid { recipient, .. } => vec![*recipient],
            ChainEventPayload::Unknown { .. } => Vec::new(),
        }
    }
}

/// A mined contract event with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainEvent {
    pub contract: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u64,
    pub payload: ChainEventPayload,
}

impl ChainEvent {
    pub fn kind(&self) -> Option<EventKind> {
        self.payload.kind()
    }

    pub fn key(&self) -> Option<EventKey> {
        self.kind().map(|kind| EventKey {
            tx_hash: self.tx_hash,
            kind,
        })
    }

    /// Total order used for application.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn to_record(&self) -> Option<EventRecord> {
        let kind = self.kind()?;
        Some(EventRecord {
            tx_hash: self.tx_hash,
            kind,
            contract: self.contract,
            block_number: self.block_number,
            log_index: self.log_index,
            payload: serde_json::to_value(&self.payload).unwrap_or(serde_json::Value::Null),
        })
    }
}

/// Decode one RPC log. Logs without a mined position are dropped.
pub fn decode_log(log: &Log) -> Option<ChainEvent> {
    let (Some(tx_hash), Some(block_number), Some(log_index)) =
        (log.transaction_hash, log.block_number, log.log_index)
    else {
        tracing::warn!(address = %log.inner.address, "Skipping log without block position");
        return None;
    };

    let topic0 = log.inner.data.topics().first().copied();
    let payload = match topic0.as_ref().and_then(EventKind::from_topic0) {
        Some(kind) => decode_payload(kind, log).unwrap_or_else(|| {
            tracing::warn!(tx_hash = %tx_hash, kind = %kind, "Malformed event data");
            ChainEventPayload::Unknown { topic0 }
        }),
        None => ChainEventPayload::Unknown { topic0 },
    };

    Some(ChainEvent {
        contract: log.inner.address,
        tx_hash,
        block_number,
        log_index,
        payload,
    })
}

fn decode_payload(kind: EventKind, log: &Log) -> Option<ChainEventPayload> {
    let payload = match kind {
        EventKind::MemberRegistered => {
            let e = log.log_decode::<MemberRegistered>().ok()?.inner.data;
            ChainEventPayload::MemberRegistered {
                member: e.member,
                upline: e.upline,
                plan_id: e.planId.saturating_to(),
                cycle_number: e.cycleNumber.saturating_to(),
            }
        }
        EventKind::PlanUpgraded => {
            let e = log.log_decode::<PlanUpgraded>().ok()?.inner.data;
            ChainEventPayload::PlanUpgraded {
                member: e.member,
                from_plan: e.fromPlan.saturating_to(),
                to_plan: e.toPlan.saturating_to(),
                cycle_number: e.cycleNumber.saturating_to(),
            }
        }
        EventKind::ReferralPaid => {
            let e = log.log_decode::<ReferralPaid>().ok()?.inner.data;
            ChainEventPayload::ReferralPaid {
                recipient: e.recipient,
                payer: e.payer,
                amount: e.amount,
                plan_id: e.planId.saturating_to(),
            }
        }
    };
    Some(payload)
}

/// Sort into application order: block number, then log index.
pub fn order_events(events: &mut [ChainEvent]) {
    events.sort_by_key(ChainEvent::position);
}
