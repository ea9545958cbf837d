//! The mutation pipeline: optimistic write, retried dispatch, reconciliation.
//!
//! [`MutationPipeline`] is the composition root for entity mutations. The
//! layering is fixed: the optimistic utilities run innermost, the retry
//! profile wraps the dispatch, and the circuit breaker wraps the whole
//! retry sequence, so the breaker counts one failure per exhausted sequence
//! rather than one per attempt.
//!
//! Ordering guarantees, enforced here:
//! - the optimistic write happens before the network dispatch
//! - on rejection, the rollback happens before the error reaches the caller
//!
//! Concurrent mutations on one key are last-write-wins; the reconciliation
//! write from the latest confirmed mutation is authoritative.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{instrument, warn};

use ratecard_common::cache::{optimistic, QueryKey, QueryStore};
use ratecard_common::error::{ClientError, ClientResult};
use ratecard_common::observability::PerformanceMonitor;
use ratecard_common::resilience::{
    profiles, CircuitBreaker, ResilienceError, RetryError, RetryProfile,
};

/// Runs entity mutations through the resilience stack
pub struct MutationPipeline {
    store: Arc<dyn QueryStore>,
    breaker: Arc<CircuitBreaker>,
    profile: RetryProfile,
    monitor: Arc<PerformanceMonitor>,
}

impl MutationPipeline {
    /// Pipeline with the standard mutation retry profile
    pub fn new(
        store: Arc<dyn QueryStore>,
        breaker: Arc<CircuitBreaker>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            store,
            breaker,
            profile: profiles::mutation(),
            monitor,
        }
    }

    /// Override the retry profile
    pub fn with_profile(mut self, profile: RetryProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Run one optimistic mutation.
    ///
    /// `patch` is shallow-merged into the cached value before `operation`
    /// dispatches. On success the server's response value replaces the
    /// cache entry; on failure the snapshot is restored first and the
    /// mapped error surfaced after.
    #[instrument(skip(self, patch, operation), fields(key = %key))]
    pub async fn run_optimistic<F, Fut>(
        &self,
        key: &QueryKey,
        patch: Value,
        operation: F,
    ) -> ClientResult<Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        let started = Instant::now();

        // Speculative write strictly before dispatch
        let update = optimistic::begin_optimistic(self.store.as_ref(), key, patch)?;

        let outcome = self.breaker.execute(|| self.profile.run(operation)).await;

        match outcome {
            Ok(server_value) => {
                // The server's value is authoritative; reconcile the cache
                let reconciled = self.store.set(key, server_value.clone());
                update.commit();
                self.monitor.track_cache_operation(
                    "mutate",
                    &key.resource,
                    started.elapsed(),
                    reconciled.is_ok(),
                    None,
                );
                reconciled?;
                Ok(server_value)
            }
            Err(err) => {
                let surfaced = self.surface_error(err, key);
                // Rollback strictly before the error reaches the caller
                if let Err(rollback_err) = update.rollback(self.store.as_ref()) {
                    warn!(key = %key, error = %rollback_err, "rollback failed after rejected mutation");
                }
                self.monitor.track_cache_operation(
                    "mutate",
                    &key.resource,
                    started.elapsed(),
                    false,
                    None,
                );
                Err(surfaced)
            }
        }
    }

    /// Read-only view of the breaker guarding this pipeline
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn surface_error(
        &self,
        err: ResilienceError<RetryError<ClientError>>,
        key: &QueryKey,
    ) -> ClientError {
        match err {
            ResilienceError::CircuitOpen {
                operation,
                retry_after,
            } => ClientError::CircuitOpen {
                operation,
                retry_after,
            },
            ResilienceError::OperationFailed { source } => match source {
                RetryError::Exhausted {
                    attempts,
                    elapsed,
                    mut errors,
                    vetoed,
                } => {
                    warn!(
                        key = %key,
                        attempts,
                        ?elapsed,
                        vetoed,
                        "mutation failed after retries"
                    );
                    errors.pop().unwrap_or_else(|| {
                        ClientError::internal("retry exhausted without recording an error")
                    })
                }
                RetryError::Config(config_err) => ClientError::internal(config_err.to_string()),
            },
        }
    }
}

impl std::fmt::Debug for MutationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationPipeline")
            .field("breaker", &self.breaker.name())
            .finish()
    }
}
