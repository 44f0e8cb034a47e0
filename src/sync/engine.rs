//! Block-window event ingestion.

use alloy::primitives::Address;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::Instrument;
use uuid::Uuid;

use crate::chain::{ChainClient, ChainError, LogQuery};
use crate::config::EventSyncConfig;
use crate::ledger::{ActionStatus, EventKind, Ledger, LedgerError};
use crate::observability::metrics;
use crate::query::QueryService;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::RateScope;
use crate::sync::events::{decode_log, order_events, ChainEvent, ChainEventPayload};
use crate::sync::notify::ActionNotifier;

/// Failures that defer a cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Engine phase, published for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Scanning = 1,
    Applying = 2,
    Stopped = 3,
}

impl SyncState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Scanning,
            2 => SyncState::Applying,
            3 => SyncState::Stopped,
            _ => SyncState::Idle,
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was already running.
    Skipped,
    UpToDate,
    Advanced { from: u64, to: u64, applied: usize },
    /// Nothing was committed; the window is retried next cycle.
    Deferred { reason: String },
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::UpToDate => "up_to_date",
            CycleOutcome::Advanced { .. } => "advanced",
            CycleOutcome::Deferred { .. } => "deferred",
        }
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub cursor: Option<u64>,
    pub last_head: Option<u64>,
    pub cycles: u64,
    pub events_applied: u64,
    pub duplicates_skipped: u64,
    pub deferred_cycles: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub filters: Vec<EventKind>,
}

#[derive(Debug, Default)]
struct SyncStats {
    cursor: Option<u64>,
    last_head: Option<u64>,
    cycles: u64,
    events_applied: u64,
    duplicates_skipped: u64,
    deferred_cycles: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// Clears the single-flight flag even if the cycle future is dropped.
struct FlightGuard<'a> {
    engine: &'a EventSyncEngine,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.engine.set_state(SyncState::Idle);
        self.engine.in_flight.store(false, Ordering::Release);
    }
}

/// Replays contract events into the ledger, one bounded window per cycle.
pub struct EventSyncEngine {
    client: Arc<ChainClient>,
    ledger: Arc<dyn Ledger>,
    query: Arc<QueryService>,
    notifier: ActionNotifier,
    config: EventSyncConfig,
    contract: Address,
    filters: Vec<EventKind>,
    scope: RateScope,
    in_flight: AtomicBool,
    state: AtomicU8,
    stats: Mutex<SyncStats>,
}

impl EventSyncEngine {
    /// Engine watching every known event kind on `contract`.
    pub fn new(
        client: Arc<ChainClient>,
        ledger: Arc<dyn Ledger>,
        query: Arc<QueryService>,
        config: EventSyncConfig,
        contract: Address,
        notifier: ActionNotifier,
    ) -> Self {
        Self {
            client,
            ledger,
            query,
            notifier,
            config,
            contract,
            filters: EventKind::ALL.to_vec(),
            scope: RateScope::named("sync"),
            in_flight: AtomicBool::new(false),
            state: AtomicU8::new(SyncState::Idle as u8),
            stats: Mutex::new(SyncStats::default()),
        }
    }

    /// Restrict the engine to `filters`. Duplicates are ignored.
    pub fn with_filters(mut self, mut filters: Vec<EventKind>) -> Self {
        filters.sort();
        filters.dedup();
        self.filters = filters;
        self
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn status(&self) -> SyncStatus {
        let stats = self.stats();
        SyncStatus {
            state: self.state(),
            cursor: stats.cursor,
            last_head: stats.last_head,
            cycles: stats.cycles,
            events_applied: stats.events_applied,
            duplicates_skipped: stats.duplicates_skipped,
            deferred_cycles: stats.deferred_cycles,
            consecutive_failures: stats.consecutive_failures,
            last_error: stats.last_error.clone(),
            filters: self.filters.clone(),
        }
    }

    /// Run one scan cycle unless one is already in progress.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync cycle already running, dropping trigger");
            metrics::record_sync_cycle("skipped");
            return CycleOutcome::Skipped;
        }
        let _guard = FlightGuard { engine: self };

        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_cycle", cycle_id = %cycle_id);

        let outcome = match self.scan_and_apply().instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    SyncError::Chain(ChainError::NoProviderAvailable(_)) => tracing::error!(
                        alert = "no_provider",
                        cycle_id = %cycle_id,
                        "Sync cycle deferred: no chain provider available"
                    ),
                    SyncError::Chain(chain) if chain.is_transient() => {
                        tracing::warn!(cycle_id = %cycle_id, error = %e, "Sync cycle deferred")
                    }
                    _ => tracing::error!(
                        cycle_id = %cycle_id,
                        error = %e,
                        "Sync cycle failed, window will be retried"
                    ),
                }
                CycleOutcome::Deferred {
                    reason: e.to_string(),
                }
            }
        };

        self.record_outcome(&outcome);
        metrics::record_sync_cycle(outcome.label());
        outcome
    }

    /// Cycle on a fixed interval until shutdown, backing off after deferred cycles.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Event sync disabled");
            return;
        }

        let interval = Duration::from_millis(self.config.interval_ms);
        tracing::info!(
            contract = %self.contract,
            interval_ms = self.config.interval_ms,
            window_blocks = self.config.window_blocks,
            filters = ?self.filters,
            "Event sync started"
        );

        loop {
            let outcome = tokio::select! {
                outcome = self.run_cycle() => outcome,
                _ = shutdown.recv() => break,
            };

            let failures = self.stats().consecutive_failures;
            let delay = match outcome {
                CycleOutcome::Deferred { .. } => {
                    interval
                        + calculate_backoff(
                            failures,
                            self.config.retry_base_ms,
                            self.config.retry_max_ms,
                        )
                }
                _ => interval,
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.set_state(SyncState::Stopped);
        tracing::info!("Event sync stopped");
    }

    async fn scan_and_apply(&self) -> Result<CycleOutcome, SyncError> {
        self.set_state(SyncState::Scanning);

        let head = self.client.block_number(&self.scope).await?;
        let safe_head = head.saturating_sub(self.config.confirmation_blocks);
        self.stats().last_head = Some(head);

        let Some(cursor) = self.load_or_init_cursor(safe_head).await? else {
            return Ok(CycleOutcome::UpToDate);
        };
        if safe_head <= cursor {
            return Ok(CycleOutcome::UpToDate);
        }

        let from = cursor + 1;
        let to = safe_head.min(from.saturating_add(self.config.window_blocks));

        let mut events = Vec::new();
        for kind in &self.filters {
            let query = LogQuery {
                address: self.contract,
                topic0: kind.topic0(),
                from_block: from,
                to_block: to,
            };
            match self.client.get_logs(&self.scope, query).await {
                Ok(logs) => events.extend(logs.iter().filter_map(decode_log)),
                Err(e) => {
                    if e.is_rate_limited() {
                        tracing::warn!(
                            kind = %kind,
                            from,
                            to,
                            "Rate limited mid-scan, aborting remaining filters"
                        );
                    }
                    return Err(e.into());
                }
            }
        }

        order_events(&mut events);

        self.set_state(SyncState::Applying);
        let mut applied = 0;
        for event in &events {
            if self.apply_event(event).await? {
                applied += 1;
            }
        }

        self.ledger.store_cursor(to).await?;
        self.stats().cursor = Some(to);
        metrics::record_sync_cursor(to);

        tracing::info!(from, to, found = events.len(), applied, "Sync window committed");
        Ok(CycleOutcome::Advanced { from, to, applied })
    }

    /// The stored cursor, or a freshly initialized one.
    ///
    /// Returns `None` on the cycle that initialized it at the chain head.
    async fn load_or_init_cursor(&self, safe_head: u64) -> Result<Option<u64>, SyncError> {
        if let Some(cursor) = self.ledger.load_cursor().await? {
            self.stats().cursor = Some(cursor);
            return Ok(Some(cursor));
        }

        let (cursor, resume) = match self.config.start_block {
            Some(start) => (start.saturating_sub(1), true),
            None => (safe_head, false),
        };
        self.ledger.store_cursor(cursor).await?;
        self.stats().cursor = Some(cursor);
        metrics::record_sync_cursor(cursor);
        tracing::info!(cursor, "Sync cursor initialized");

        Ok(resume.then_some(cursor))
    }

    /// Record one event and its side effects. `false` if it was already applied.
    async fn apply_event(&self, event: &ChainEvent) -> Result<bool, LedgerError> {
        let Some(record) = event.to_record() else {
            tracing::debug!(
                tx_hash = %event.tx_hash,
                block = event.block_number,
                "Ignoring unknown event"
            );
            return Ok(false);
        };
        let kind = record.kind;

        if self.ledger.has_event(&record.key()).await? || !self.ledger.insert_event(record).await? {
            tracing::debug!(tx_hash = %event.tx_hash, kind = %kind, "Event already applied");
            // Several payouts can share one transaction; each recipient's view is stale.
            for member in event.payload.affected_members() {
                self.query.invalidate_member(member);
            }
            self.stats().duplicates_skipped += 1;
            return Ok(false);
        }

        match self.ledger.pending_action(&event.tx_hash).await? {
            Some(action) if action.action.confirming_event() == kind => {
                if action.status.is_timed_out() {
                    tracing::warn!(
                        anomaly = "late_confirmation",
                        tx_hash = %event.tx_hash,
                        wallet = %action.wallet,
                        action = action.action.as_str(),
                        block = event.block_number,
                        "Action marked timed out was confirmed on-chain"
                    );
                }
                self.notifier
                    .finalize(self.ledger.as_ref(), &action, ActionStatus::Confirmed)
                    .await?;
            }
            Some(_) => {}
            None if kind != EventKind::ReferralPaid => {
                tracing::warn!(
                    anomaly = "untracked_transaction",
                    tx_hash = %event.tx_hash,
                    kind = %kind,
                    "Event for a transaction with no pending action"
                );
            }
            None => {}
        }

        for member in event.payload.affected_members() {
            self.query.invalidate_member(member);
        }
        if matches!(
            event.payload,
            ChainEventPayload::MemberRegistered { .. } | ChainEventPayload::PlanUpgraded { .. }
        ) {
            self.query.invalidate_plan_cycles();
        }
        self.query.invalidate_stats();

        self.stats().events_applied += 1;
        metrics::record_event_applied(kind.as_str());
        tracing::debug!(
            tx_hash = %event.tx_hash,
            kind = %kind,
            block = event.block_number,
            log_index = event.log_index,
            "Event applied"
        );
        Ok(true)
    }

    fn record_outcome(&self, outcome: &CycleOutcome) {
        let mut stats = self.stats();
        match outcome {
            CycleOutcome::Skipped => return,
            CycleOutcome::Deferred { reason } => {
                stats.deferred_cycles += 1;
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                stats.last_error = Some(reason.clone());
            }
            _ => {
                stats.consecutive_failures = 0;
            }
        }
        stats.cycles += 1;
    }

    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn stats(&self) -> MutexGuard<'_, SyncStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            SyncState::Idle,
            SyncState::Scanning,
            SyncState::Applying,
            SyncState::Stopped,
        ] {
            assert_eq!(SyncState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(CycleOutcome::Advanced {
            from: 11,
            to: 16,
            applied: 2,
        })
        .unwrap();
        assert_eq!(json["outcome"], "advanced");
        assert_eq!(json["to"], 16);
    }
}
