//! Trailing-window admission control for outbound chain calls.
//!
//! Each scope keeps the timestamps of the calls it admitted during the last
//! `window_secs`. A caller arriving at a full window sleeps for `backoff_ms`
//! and tries again; nobody is ever turned away.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Logical bucket a call is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateScope {
    /// Shared default scope.
    Global,
    /// A purpose-specific scope, e.g. `"event-sync"`.
    Named(String),
}

impl RateScope {
    pub fn named(name: impl Into<String>) -> Self {
        RateScope::Named(name.into())
    }

    fn as_label(&self) -> &str {
        match self {
            RateScope::Global => "global",
            RateScope::Named(name) => name,
        }
    }
}

impl Default for RateScope {
    fn default() -> Self {
        RateScope::Global
    }
}

impl fmt::Display for RateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Timestamps admitted within the trailing window, oldest first.
#[derive(Debug, Default)]
struct RateWindow {
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter keyed by [`RateScope`].
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<RateScope, RateWindow>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    fn backoff(&self) -> Duration {
        Duration::from_millis(self.config.backoff_ms)
    }

    fn capacity(&self, scope: &RateScope) -> usize {
        let cap = match scope {
            RateScope::Global => self.config.max_requests,
            RateScope::Named(name) => self
                .config
                .scopes
                .get(name)
                .copied()
                .unwrap_or(self.config.max_requests),
        };
        cap.max(1) as usize
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RateScope, RateWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one admission if the window has room.
    fn try_admit(&self, scope: &RateScope) -> bool {
        let now = Instant::now();
        let window = self.window();
        let capacity = self.capacity(scope);

        let mut windows = self.lock();
        let entry = windows.entry(scope.clone()).or_default();
        entry.purge(now, window);

        if entry.admitted.len() < capacity {
            entry.admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Wait until `scope` has room, then count this call against it.
    pub async fn admit(&self, scope: &RateScope) {
        let mut waited = 0u32;
        while !self.try_admit(scope) {
            if waited == 0 {
                tracing::debug!(scope = %scope, "Rate window full, delaying call");
                metrics::record_rate_limited(scope.as_label());
            }
            waited += 1;
            time::sleep(self.backoff()).await;
        }

        if waited > 0 {
            tracing::trace!(scope = %scope, retries = waited, "Rate window admitted delayed call");
        }
    }

    /// Number of admissions currently inside the window for `scope`.
    pub fn in_window(&self, scope: &RateScope) -> usize {
        let now = Instant::now();
        let window = self.window();
        let mut windows = self.lock();
        match windows.get_mut(scope) {
            Some(entry) => {
                entry.purge(now, window);
                entry.admitted.len()
            }
            None => 0,
        }
    }

    /// Drop expired timestamps and forget scopes that went quiet.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let window = self.window();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, entry| {
            entry.purge(now, window);
            !entry.admitted.is_empty()
        });
        before - windows.len()
    }

    /// Periodically prune idle windows until shutdown.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = Duration::from_secs(self.config.cleanup_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.prune();
                        if removed > 0 {
                            tracing::trace!(removed, "Pruned idle rate windows");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limiter cleanup stopping");
                        break;
                    }
                }
            }
        })
    }
}
