//! Fan-out of pending-action transitions to the notification layer.

use alloy::primitives::{Address, TxHash};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::ledger::{ActionStatus, ActionType, Ledger, LedgerResult, PendingAction};
use crate::observability::metrics;
use crate::orchestrator::ActionState;

/// A pending action reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionUpdate {
    pub tx_hash: TxHash,
    pub wallet: Address,
    pub action: ActionType,
    pub status: ActionStatus,
}

/// Broadcast channel observers subscribe to.
///
/// Publishing never blocks; slow subscribers miss old updates and see
/// `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct ActionNotifier {
    tx: broadcast::Sender<ActionUpdate>,
}

impl ActionNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionUpdate> {
        self.tx.subscribe()
    }

    /// Move `action` to `status` in the ledger and publish if it actually changed.
    pub async fn finalize(
        &self,
        ledger: &dyn Ledger,
        action: &PendingAction,
        status: ActionStatus,
    ) -> LedgerResult<bool> {
        if !ledger.set_action_status(&action.tx_hash, status.clone()).await? {
            return Ok(false);
        }

        metrics::record_action(action.action.as_str(), status.as_str());
        tracing::info!(
            tx_hash = %action.tx_hash,
            wallet = %action.wallet,
            action = action.action.as_str(),
            state = %ActionState::from(&status),
            status = ?status,
            "Pending action finalized"
        );

        self.publish(ActionUpdate {
            tx_hash: action.tx_hash,
            wallet: action.wallet,
            action: action.action,
            status,
        });
        Ok(true)
    }

    /// Returns the number of subscribers that received the update.
    pub fn publish(&self, update: ActionUpdate) -> usize {
        tracing::debug!(
            tx_hash = %update.tx_hash,
            status = update.status.as_str(),
            "Publishing action update"
        );
        self.tx.send(update).unwrap_or(0)
    }
}

impl Default for ActionNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}
