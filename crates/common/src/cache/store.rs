//! Query store contract and the in-memory implementation.
//!
//! [`QueryStore`] is the collaborator contract the resilience and optimistic
//! layers depend on: a normalized key-value cache of JSON documents keyed by
//! `[resource, owner]`. [`MemoryStore`] is a thread-safe implementation with
//! bounded capacity, staleness bookkeeping, and in-flight flags; it does not
//! attempt to re-implement a full query-cache engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::resilience::clock::{Clock, SystemClock};

//==============================================================================
// Keys & size accounting
//==============================================================================

/// Structured cache key: `[resourceType, ownerId]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    pub resource: String,
    pub owner: String,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            owner: owner.into(),
        }
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource, self.owner)
    }
}

/// Deterministic structural size estimate for stored values.
///
/// Implemented per type; no reflection over arbitrary values. The estimate
/// feeds the memory-level health check, so it only needs to be stable and
/// roughly proportional, not exact.
pub trait SizeHint {
    fn size_hint(&self) -> usize;
}

impl SizeHint for Value {
    fn size_hint(&self) -> usize {
        match self {
            Value::Null => 4,
            Value::Bool(_) => 1,
            Value::Number(_) => 8,
            Value::String(s) => s.len(),
            Value::Array(items) => 8 + items.iter().map(SizeHint::size_hint).sum::<usize>(),
            Value::Object(map) => {
                8 + map
                    .iter()
                    .map(|(k, v)| k.len() + v.size_hint())
                    .sum::<usize>()
            }
        }
    }
}

impl SizeHint for QueryKey {
    fn size_hint(&self) -> usize {
        self.resource.len() + self.owner.len()
    }
}

//==============================================================================
// Store contract
//==============================================================================

/// Counters and size snapshot for a store
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub stale_entries: usize,
    pub approx_bytes: usize,
}

impl StoreStats {
    /// Hit rate in 0.0..=1.0; zero lookups count as 0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// The external query-cache contract the client core depends on
pub trait QueryStore: Send + Sync {
    /// Read the cached value for a key
    fn get(&self, key: &QueryKey) -> Option<Value>;

    /// Write a value, replacing any existing entry
    fn set(&self, key: &QueryKey, value: Value) -> ClientResult<()>;

    /// Remove the entry entirely; absent keys are a no-op
    fn remove(&self, key: &QueryKey);

    /// Mark the entry stale so the next reader refetches
    fn invalidate(&self, key: &QueryKey);

    /// Clear the in-flight flag, abandoning any fetch for the key
    fn cancel_in_flight(&self, key: &QueryKey);

    /// Whether an entry exists (stale or not)
    fn contains(&self, key: &QueryKey) -> bool;

    /// Counter snapshot
    fn stats(&self) -> StoreStats;
}

//==============================================================================
// In-memory store
//==============================================================================

/// Configuration for [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Entry cap; oldest-accessed entries are evicted past it
    pub max_entries: Option<usize>,
    /// Entries older than this count as stale in stats
    pub stale_after: Option<Duration>,
}

impl MemoryStoreConfig {
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn with_stale_after(mut self, window: Duration) -> Self {
        self.stale_after = Some(window);
        self
    }
}

#[derive(Debug)]
struct StoreEntry {
    value: Value,
    inserted_at: Instant,
    stale: bool,
    in_flight: bool,
    /// Writes to this key, for duplicate-fetch detection
    write_count: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<QueryKey, StoreEntry>,
    /// Keys in access order, oldest first
    access_order: Vec<QueryKey>,
}

impl StoreInner {
    fn touch(&mut self, key: &QueryKey) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            let k = self.access_order.remove(pos);
            self.access_order.push(k);
        }
    }
}

/// Thread-safe in-memory query store
pub struct MemoryStore<C: Clock = SystemClock> {
    config: MemoryStoreConfig,
    clock: C,
    inner: RwLock<StoreInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryStore<SystemClock> {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(config: MemoryStoreConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            inner: RwLock::new(StoreInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Mark a fetch as in flight for the key (creating no entry)
    pub fn mark_in_flight(&self, key: &QueryKey) {
        let mut inner = self.write_inner();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.in_flight = true;
        }
    }

    /// Whether a fetch is currently in flight for the key
    pub fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.read_inner()
            .entries
            .get(key)
            .map(|e| e.in_flight)
            .unwrap_or(false)
    }

    /// Whether the entry has been invalidated or aged past `stale_after`
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let now = self.clock.now();
        self.read_inner()
            .entries
            .get(key)
            .map(|e| Self::entry_is_stale(e, now, self.config.stale_after))
            .unwrap_or(false)
    }

    /// Per-key write counts, for duplicate-fetch detection in health sweeps
    pub fn write_counts(&self) -> Vec<(String, u64)> {
        self.read_inner()
            .entries
            .iter()
            .map(|(k, e)| (k.to_string(), e.write_count))
            .collect()
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        let mut inner = self.write_inner();
        inner.entries.clear();
        inner.access_order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    fn entry_is_stale(entry: &StoreEntry, now: Instant, stale_after: Option<Duration>) -> bool {
        if entry.stale {
            return true;
        }
        match stale_after {
            Some(window) => now.duration_since(entry.inserted_at) > window,
            None => false,
        }
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("store lock poisoned during read");
            poisoned.into_inner()
        })
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("store lock poisoned during write");
            poisoned.into_inner()
        })
    }
}

impl<C: Clock> QueryStore for MemoryStore<C> {
    fn get(&self, key: &QueryKey) -> Option<Value> {
        let mut inner = self.write_inner();
        if inner.entries.contains_key(key) {
            inner.touch(key);
            self.hits.fetch_add(1, Ordering::Relaxed);
            inner.entries.get(key).map(|e| e.value.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    fn set(&self, key: &QueryKey, value: Value) -> ClientResult<()> {
        let now = self.clock.now();
        let mut inner = self.write_inner();

        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                entry.inserted_at = now;
                entry.stale = false;
                entry.in_flight = false;
                entry.write_count += 1;
                inner.touch(key);
            }
            None => {
                inner.entries.insert(
                    key.clone(),
                    StoreEntry {
                        value,
                        inserted_at: now,
                        stale: false,
                        in_flight: false,
                        write_count: 1,
                    },
                );
                inner.access_order.push(key.clone());
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(max) = self.config.max_entries {
            while inner.entries.len() > max && !inner.access_order.is_empty() {
                let oldest = inner.access_order.remove(0);
                inner.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %oldest, "evicted oldest entry over capacity");
            }
        }
        Ok(())
    }

    fn remove(&self, key: &QueryKey) {
        let mut inner = self.write_inner();
        inner.entries.remove(key);
        inner.access_order.retain(|k| k != key);
    }

    fn invalidate(&self, key: &QueryKey) {
        let mut inner = self.write_inner();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.stale = true;
        }
    }

    fn cancel_in_flight(&self, key: &QueryKey) {
        let mut inner = self.write_inner();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.in_flight = false;
        }
    }

    fn contains(&self, key: &QueryKey) -> bool {
        self.read_inner().entries.contains_key(key)
    }

    fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        let inner = self.read_inner();

        let stale_entries = inner
            .entries
            .values()
            .filter(|e| Self::entry_is_stale(e, now, self.config.stale_after))
            .count();
        let approx_bytes = inner
            .entries
            .iter()
            .map(|(k, e)| k.size_hint() + e.value.size_hint())
            .sum();

        StoreStats {
            size: inner.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_entries,
            approx_bytes,
        }
    }
}

impl<C: Clock> std::fmt::Debug for MemoryStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("size", &self.read_inner().entries.len())
            .field("max_entries", &self.config.max_entries)
            .finish()
    }
}

// Cache write and (de)serialization failures share one error shape.
pub(crate) fn store_error(operation: &str, key: &QueryKey, message: impl Into<String>) -> ClientError {
    ClientError::cache_update(operation, key.to_string(), message)
}
