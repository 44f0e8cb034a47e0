//! Expiring key/value store with approximate LRU eviction.

use dashmap::DashMap;
use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Absolute instant after which the entry is dead.
    pub expires_at: Instant,
    pub created_at: Instant,
    pub last_access: Instant,
    pub access_count: u64,
    /// Position in the global access order; the lowest one is evicted first.
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Snapshot of cache counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Thread-safe TTL cache bounded by entry count.
///
/// Cloning is cheap and clones share the same storage.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    counters: Arc<Counters>,
    access_clock: Arc<AtomicU64>,
    max_entries: usize,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            access_clock: Arc::new(AtomicU64::new(0)),
            max_entries: max_entries.max(1),
        }
    }

    fn next_seq(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert or replace `key`, evicting to stay within capacity.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }

        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
            created_at: now,
            last_access: now,
            access_count: 0,
            access_seq: self.next_seq(),
        };
        self.entries.insert(key, entry);

        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_event("set");
        metrics::record_cache_size(self.entries.len());
    }

    /// Fetch a live value; an expired entry counts as a miss and is dropped.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let seq = self.next_seq();

        let lookup = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.is_expired(now) {
                    None
                } else {
                    entry.last_access = now;
                    entry.access_count += 1;
                    entry.access_seq = seq;
                    Some(entry.value.clone())
                }
            }
            None => {
                self.record_miss();
                return None;
            }
        };

        match lookup {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("hit");
                Some(value)
            }
            None => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.record_expiration();
                }
                self.record_miss();
                None
            }
        }
    }

    /// True when `key` holds a live value. Does not touch access order.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_event("delete");
            metrics::record_cache_size(self.entries.len());
        }
        removed
    }

    /// Remove every key matching `pattern`; returns how many were removed.
    pub fn delete_by_pattern(&self, pattern: &Regex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.is_match(key));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.counters.deletes.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::record_cache_event("delete");
            metrics::record_cache_size(self.entries.len());
        }
        removed
    }

    /// Drop all expired entries regardless of whether anyone asks for them.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());

        if purged > 0 {
            self.counters.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            metrics::record_cache_event("expire");
            metrics::record_cache_size(self.entries.len());
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until shutdown.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, remaining = cache.len(), "Cache sweep");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Cache sweeper stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Free one slot: expired entries go first, then the least recently used one.
    fn make_room(&self, now: Instant) {
        if self.purge_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }

        while self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().access_seq)
                .map(|entry| entry.key().clone());

            let Some(key) = victim else { break };
            if self.entries.remove(&key).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("evict");
                tracing::trace!(key = %key, at = ?now, "Evicted least recently used entry");
            }
        }
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_event("miss");
    }

    fn record_expiration(&self) {
        self.counters.expirations.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_event("expire");
    }
}
