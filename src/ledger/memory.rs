//! In-memory ledger with an optional JSON snapshot file.

use alloy::primitives::TxHash;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use super::types::{
    ActionStatus, EventKey, EventRecord, LedgerResult, PendingAction,
};
use super::Ledger;

/// On-disk form of the ledger.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    cursor: Option<u64>,
    events: Vec<EventRecord>,
    actions: Vec<PendingAction>,
}

/// Thread-safe ledger kept in memory.
///
/// With a snapshot path, the full state is written to disk whenever the
/// cursor advances or an action is recorded, and on [`persist`](Self::persist).
#[derive(Debug, Default)]
pub struct MemoryLedger {
    events: RwLock<HashMap<EventKey, EventRecord>>,
    actions: RwLock<HashMap<TxHash, PendingAction>>,
    cursor: RwLock<Option<u64>>,
    snapshot_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl MemoryLedger {
    /// Ledger without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed ledger; a missing file starts empty.
    pub async fn load_from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<LedgerSnapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No ledger snapshot found, starting empty");
                LedgerSnapshot::default()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            cursor = ?snapshot.cursor,
            events = snapshot.events.len(),
            actions = snapshot.actions.len(),
            "Ledger snapshot loaded"
        );

        Ok(Self {
            events: RwLock::new(
                snapshot
                    .events
                    .into_iter()
                    .map(|record| (record.key(), record))
                    .collect(),
            ),
            actions: RwLock::new(
                snapshot
                    .actions
                    .into_iter()
                    .map(|action| (action.tx_hash, action))
                    .collect(),
            ),
            cursor: RwLock::new(snapshot.cursor),
            snapshot_path: Some(path),
            persist_lock: Mutex::new(()),
        })
    }

    /// Write the snapshot file, if one is configured.
    ///
    /// Writes go to a sibling temp file first and are renamed into place.
    pub async fn persist(&self) -> LedgerResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;

        let mut events: Vec<EventRecord> = self.events.read().await.values().cloned().collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        let mut actions: Vec<PendingAction> =
            self.actions.read().await.values().cloned().collect();
        actions.sort_by_key(|a| a.submitted_at);

        let snapshot = LedgerSnapshot {
            cursor: *self.cursor.read().await,
            events,
            actions,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::debug!(path = %path.display(), cursor = ?snapshot.cursor, "Ledger snapshot written");
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn has_event(&self, key: &EventKey) -> LedgerResult<bool> {
        Ok(self.events.read().await.contains_key(key))
    }

    async fn insert_event(&self, record: EventRecord) -> LedgerResult<bool> {
        let mut events = self.events.write().await;
        let key = record.key();
        if events.contains_key(&key) {
            return Ok(false);
        }
        events.insert(key, record);
        Ok(true)
    }

    async fn event_count(&self) -> LedgerResult<usize> {
        Ok(self.events.read().await.len())
    }

    async fn record_pending(&self, action: PendingAction) -> LedgerResult<()> {
        self.actions.write().await.insert(action.tx_hash, action);
        self.persist().await
    }

    async fn pending_action(&self, tx_hash: &TxHash) -> LedgerResult<Option<PendingAction>> {
        Ok(self.actions.read().await.get(tx_hash).cloned())
    }

    async fn set_action_status(
        &self,
        tx_hash: &TxHash,
        status: ActionStatus,
    ) -> LedgerResult<bool> {
        let mut actions = self.actions.write().await;
        match actions.get_mut(tx_hash) {
            Some(action) if action.status.can_transition_to(&status) => {
                action.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending(&self) -> LedgerResult<Vec<PendingAction>> {
        let mut pending: Vec<PendingAction> = self
            .actions
            .read()
            .await
            .values()
            .filter(|a| !a.status.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(|a| a.submitted_at);
        Ok(pending)
    }

    async fn load_cursor(&self) -> LedgerResult<Option<u64>> {
        Ok(*self.cursor.read().await)
    }

    async fn store_cursor(&self, block: u64) -> LedgerResult<()> {
        *self.cursor.write().await = Some(block);
        self.persist().await
    }
}
