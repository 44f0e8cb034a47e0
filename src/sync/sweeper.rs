//! Settles pending actions whose confirming event never arrived.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::chain::ChainClient;
use crate::ledger::{unix_now, ActionStatus, Ledger, TIMEOUT_REASON};
use crate::resilience::RateScope;
use crate::sync::engine::SyncError;
use crate::sync::notify::ActionNotifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub confirmed: usize,
    pub reverted: usize,
    pub timed_out: usize,
}

/// Resolves stale pending actions from their receipts.
///
/// A successful receipt confirms the action, which covers a crash between
/// recording an event and confirming its action. A reverted receipt fails
/// it, and a missing receipt past the timeout fails it as `timeout`.
pub struct PendingSweeper {
    client: Arc<ChainClient>,
    ledger: Arc<dyn Ledger>,
    notifier: ActionNotifier,
    timeout_secs: u64,
    scope: RateScope,
}

impl PendingSweeper {
    pub fn new(
        client: Arc<ChainClient>,
        ledger: Arc<dyn Ledger>,
        notifier: ActionNotifier,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            ledger,
            notifier,
            timeout_secs,
            scope: RateScope::named("sweeper"),
        }
    }

    /// Inspect every pending action submitted at least `timeout_secs` before `now`.
    pub async fn sweep_once(&self, now: u64) -> Result<SweepReport, SyncError> {
        let mut report = SweepReport::default();

        for action in self.ledger.list_pending().await? {
            if now.saturating_sub(action.submitted_at) < self.timeout_secs {
                continue;
            }
            report.checked += 1;

            let status = match self.client.transaction_status(&self.scope, action.tx_hash).await? {
                Some(true) => ActionStatus::Confirmed,
                Some(false) => ActionStatus::failed("reverted"),
                None => ActionStatus::failed(TIMEOUT_REASON),
            };

            let counter = match &status {
                ActionStatus::Confirmed => &mut report.confirmed,
                ActionStatus::Failed { reason } if reason == "reverted" => &mut report.reverted,
                _ => &mut report.timed_out,
            };
            if self
                .notifier
                .finalize(self.ledger.as_ref(), &action, status)
                .await?
            {
                *counter += 1;
            }
        }

        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                confirmed = report.confirmed,
                reverted = report.reverted,
                timed_out = report.timed_out,
                "Pending action sweep"
            );
        }
        Ok(report)
    }

    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once(unix_now()).await {
                            tracing::warn!(error = %e, "Pending action sweep failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Pending action sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
