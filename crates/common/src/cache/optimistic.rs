//! Optimistic cache updates for single-object entities.
//!
//! A mutation writes its expected result into the cache before dispatching,
//! so the UI reflects the change immediately. [`begin_optimistic`] snapshots
//! the current value and returns a consume-once [`OptimisticUpdate`] context:
//! `rollback` restores the snapshot verbatim (removing the entry when the
//! key was absent), `commit` discards it after the server confirms.
//!
//! Ordering is the caller's contract: the optimistic write happens before
//! the network dispatch, and on rejection the rollback happens before the
//! error reaches the caller. The mutation pipeline in the domain crate
//! enforces both.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::store::{store_error, QueryKey, QueryStore};
use crate::error::ClientResult;

/// Read the cached object for a key.
///
/// Absence is `Ok(None)`, never an error; only deserialization of a present
/// value can fail.
pub fn current_object<T: DeserializeOwned>(
    store: &dyn QueryStore,
    key: &QueryKey,
) -> ClientResult<Option<T>> {
    match store.get(key) {
        Some(value) => {
            let object = serde_json::from_value(value)
                .map_err(|e| store_error("read", key, e.to_string()))?;
            Ok(Some(object))
        }
        None => Ok(None),
    }
}

/// Replace the cached object for a key
pub fn write_object<T: Serialize>(
    store: &dyn QueryStore,
    key: &QueryKey,
    object: &T,
) -> ClientResult<()> {
    let value =
        serde_json::to_value(object).map_err(|e| store_error("write", key, e.to_string()))?;
    store.set(key, value)
}

/// Whether any object is cached under the key
pub fn object_exists(store: &dyn QueryStore, key: &QueryKey) -> bool {
    store.contains(key)
}

/// Shallow-merge a partial update into a base value.
///
/// Top-level fields of `patch` overwrite the base; nested objects are
/// replaced wholesale, not merged. A missing or non-object base yields the
/// patch itself.
pub fn shallow_merge(base: Option<&Value>, patch: &Value) -> Value {
    match (base, patch) {
        (Some(Value::Object(base_map)), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in patch_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// Snapshot + speculative write; returns the rollback context.
///
/// Must run before the network dispatch so the UI sees the change
/// immediately.
pub fn begin_optimistic(
    store: &dyn QueryStore,
    key: &QueryKey,
    patch: Value,
) -> ClientResult<OptimisticUpdate> {
    let previous = store.get(key);
    let speculative = shallow_merge(previous.as_ref(), &patch);
    store
        .set(key, speculative)
        .map_err(|e| store_error("optimistic-write", key, e.to_string()))?;
    debug!(key = %key, had_previous = previous.is_some(), "optimistic update applied");
    Ok(OptimisticUpdate {
        previous,
        key: key.clone(),
    })
}

/// Consume-once rollback context for one optimistic write
#[derive(Debug)]
#[must_use = "an optimistic update must be rolled back or committed"]
pub struct OptimisticUpdate {
    previous: Option<Value>,
    key: QueryKey,
}

impl OptimisticUpdate {
    /// Key the speculative write targeted
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The snapshotted value, None when the key was absent
    pub fn previous(&self) -> Option<&Value> {
        self.previous.as_ref()
    }

    /// Restore the snapshot verbatim.
    ///
    /// A `None` snapshot removes the entry, restoring "does not exist"
    /// rather than leaving a null-valued entry behind. Consuming `self`
    /// makes double rollback unrepresentable.
    pub fn rollback(self, store: &dyn QueryStore) -> ClientResult<()> {
        match self.previous {
            Some(value) => store
                .set(&self.key, value)
                .map_err(|e| store_error("rollback", &self.key, e.to_string()))?,
            None => store.remove(&self.key),
        }
        debug!(key = %self.key, "optimistic update rolled back");
        Ok(())
    }

    /// Discard the snapshot after the server confirmed the mutation
    pub fn commit(self) {
        debug!(key = %self.key, "optimistic update committed");
    }
}
