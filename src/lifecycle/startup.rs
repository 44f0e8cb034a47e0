//! Startup orchestration.
//!
//! # Responsibilities
//! - Build components in dependency order
//! - Start the periodic tasks and the admin server
//! - Hand back handles for the caller to drive shutdown
//!
//! # Design Decisions
//! - Invalid contract addresses or an unreadable ledger are fatal
//! - An unreachable provider pool is not; the sync loop keeps retrying

use alloy::primitives::Address;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::cache::TtlCache;
use crate::chain::{ChainClient, ChainError, Connector, HttpConnector, Wallet};
use crate::config::SyncConfig;
use crate::ledger::{Ledger, LedgerError, MemoryLedger};
use crate::lifecycle::shutdown::Shutdown;
use crate::orchestrator::TransactionOrchestrator;
use crate::query::QueryService;
use crate::resilience::RateLimiter;
use crate::sync::{ActionNotifier, EventSyncEngine, PendingSweeper};

/// How long shutdown waits for each background task.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("chain client: {0}")]
    Chain(#[from] ChainError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid admin bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Running components and their background tasks.
pub struct Services {
    pub limiter: Arc<RateLimiter>,
    pub client: Arc<ChainClient>,
    pub query: Arc<QueryService>,
    pub ledger: Arc<MemoryLedger>,
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub sync: Arc<EventSyncEngine>,
    pub sweeper: Arc<PendingSweeper>,
    pub notifier: ActionNotifier,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Stop every task, then write the final ledger snapshot.
    pub async fn shutdown(self) {
        tracing::info!(tasks = self.tasks.len(), "Shutting down background tasks");
        self.shutdown.trigger();

        for task in self.tasks {
            if tokio::time::timeout(TASK_DRAIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }

        match self.ledger.persist().await {
            Ok(()) => tracing::info!("Ledger snapshot persisted"),
            Err(e) => tracing::error!(error = %e, "Failed to persist ledger snapshot"),
        }
    }
}

/// Start with HTTP providers and the signing key from the environment.
pub async fn start(config: SyncConfig) -> Result<Services, StartupError> {
    let wallet = match Wallet::from_env(config.chain.chain_id) {
        Ok(wallet) => Some(wallet),
        Err(e) => {
            tracing::warn!(error = %e, "No signing key, running read-only");
            None
        }
    };
    let signer = wallet.as_ref().map(Wallet::address);
    let connector: Arc<dyn Connector> = Arc::new(HttpConnector::new(wallet));

    start_with_connector(config, connector, signer).await
}

/// Start with an explicit connector; `signer` enables write calls.
pub async fn start_with_connector(
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    signer: Option<Address>,
) -> Result<Services, StartupError> {
    let membership = parse_address("contracts.membership", &config.contracts.membership)?;
    let token = parse_address("contracts.token", &config.contracts.token)?;

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    // 1. Admission control
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    tasks.push(limiter.spawn_cleanup(shutdown.subscribe()));

    // 2. Chain access
    let client = Arc::new(
        ChainClient::new(config.chain.clone(), connector, Arc::clone(&limiter), signer).await?,
    );

    // 3. Cache and queries
    let cache = TtlCache::new(config.cache.max_entries);
    tasks.push(cache.spawn_sweeper(
        Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
        shutdown.subscribe(),
    ));
    let query = Arc::new(QueryService::new(
        Arc::clone(&client),
        cache,
        config.cache.clone(),
        membership,
        token,
    ));

    // 4. Ledger
    let ledger = Arc::new(match &config.ledger.snapshot_path {
        Some(path) => MemoryLedger::load_from_file(path).await?,
        None => MemoryLedger::new(),
    });
    let ledger_dyn: Arc<dyn Ledger> = ledger.clone();

    // 5. Paid actions
    let notifier = ActionNotifier::default();
    let orchestrator = Arc::new(TransactionOrchestrator::new(
        Arc::clone(&client),
        Arc::clone(&query),
        Arc::clone(&ledger_dyn),
    ));

    // 6. Event sync and pending sweep
    let sync = Arc::new(EventSyncEngine::new(
        Arc::clone(&client),
        Arc::clone(&ledger_dyn),
        Arc::clone(&query),
        config.sync.clone(),
        membership,
        notifier.clone(),
    ));
    let sweeper = Arc::new(PendingSweeper::new(
        Arc::clone(&client),
        Arc::clone(&ledger_dyn),
        notifier.clone(),
        config.sync.pending_timeout_secs,
    ));

    if config.sync.enabled {
        tasks.push(tokio::spawn(Arc::clone(&sync).run(shutdown.subscribe())));
        tasks.push(Arc::clone(&sweeper).spawn(
            Duration::from_secs(config.sync.sweep_interval_secs.max(1)),
            shutdown.subscribe(),
        ));
    }

    // 7. Admin surface
    if config.admin.enabled {
        let addr: SocketAddr = config
            .admin
            .bind_address
            .parse()
            .map_err(|_| StartupError::InvalidBindAddress(config.admin.bind_address.clone()))?;
        let state = AdminState {
            client: Arc::clone(&client),
            query: Arc::clone(&query),
            sync: Arc::clone(&sync),
            ledger: Arc::clone(&ledger_dyn),
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(state, addr, rx).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }));
    }

    tracing::info!(
        membership = %membership,
        token = %token,
        read_only = signer.is_none(),
        tasks = tasks.len(),
        "Services started"
    );

    Ok(Services {
        limiter,
        client,
        query,
        ledger,
        orchestrator,
        sync,
        sweeper,
        notifier,
        shutdown,
        tasks,
    })
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, StartupError> {
    value.parse().map_err(|_| StartupError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}
