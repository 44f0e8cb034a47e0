//! Read-only diagnostics over HTTP.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::chain::ChainClient;
use crate::ledger::Ledger;
use crate::query::QueryService;
use crate::sync::EventSyncEngine;

/// Shared handles the admin handlers read from.
#[derive(Clone)]
pub struct AdminState {
    pub client: Arc<ChainClient>,
    pub query: Arc<QueryService>,
    pub sync: Arc<EventSyncEngine>,
    pub ledger: Arc<dyn Ledger>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route("/admin/sync", get(get_sync))
        .route("/admin/pending", get(get_pending))
        .route("/admin/provider", get(get_provider))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router until shutdown.
pub async fn serve(
    state: AdminState,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
