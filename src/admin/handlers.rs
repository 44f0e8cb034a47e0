use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::cache::CacheStats;
use crate::chain::ConnectionInfo;
use crate::ledger::PendingAction;
use crate::sync::{SyncState, SyncStatus};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub sync_state: SyncState,
    pub cursor: Option<u64>,
    pub last_head: Option<u64>,
    pub pending_actions: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let sync = state.sync.status();
    let connected = state.client.active_endpoint().await.is_some();
    let pending_actions = state
        .ledger
        .list_pending()
        .await
        .map(|pending| pending.len())
        .unwrap_or(0);

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if connected { "operational" } else { "degraded" },
        sync_state: sync.state,
        cursor: sync.cursor,
        last_head: sync.last_head,
        pending_actions,
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStats> {
    Json(state.query.cache_stats())
}

pub async fn get_sync(State(state): State<AdminState>) -> Json<SyncStatus> {
    Json(state.sync.status())
}

pub async fn get_pending(
    State(state): State<AdminState>,
) -> Result<Json<Vec<PendingAction>>, StatusCode> {
    state.ledger.list_pending().await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Failed to list pending actions");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub async fn get_provider(State(state): State<AdminState>) -> Json<ConnectionInfo> {
    Json(state.client.connection_info().await)
}
