//! Circuit breaker for client-side operations.
//!
//! Each guarded operation (mutation endpoint, cache refresh) owns one
//! breaker. The breaker counts failures inside a rolling monitoring window;
//! reaching the threshold opens the circuit, which rejects calls until the
//! reset timeout elapses, then admits a bounded number of half-open trial
//! calls whose outcome decides the next state. The breaker never reaches a
//! terminal state; it cycles for the lifetime of the client session.
//!
//! Breakers are explicitly constructed and shared through
//! [`CircuitBreakerRegistry`]; there are no module-level singletons.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};

//==============================================================================
// Errors
//==============================================================================

/// Configuration validation errors for resilience components
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by circuit-breaker protected execution
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Rejected without running the operation
    #[error("circuit breaker open for operation '{operation}'")]
    CircuitOpen {
        operation: String,
        retry_after: Option<Duration>,
    },

    /// The operation ran and failed; the failure was recorded
    #[error("operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Extract the underlying operation error, if any
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            Self::CircuitOpen { .. } => None,
        }
    }
}

/// Result alias for circuit-breaker protected operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

//==============================================================================
// State & configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Failing, calls are rejected
    Open,
    /// Probing recovery with a bounded number of trial calls
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Operation name used in errors and logs
    pub name: String,
    /// Consecutive failures within the monitoring window that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting trial calls
    pub reset_timeout: Duration,
    /// Window within which failures are counted; restarts when it elapses
    pub monitoring_window: Duration,
    /// Trial calls admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    pub fn with_half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.half_open_max_calls = max_calls;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "must be greater than zero",
            ));
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::invalid("reset_timeout", "must be non-zero"));
        }
        if self.monitoring_window.is_zero() {
            return Err(ConfigError::invalid(
                "monitoring_window",
                "must be non-zero",
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::invalid(
                "half_open_max_calls",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot of a breaker, for UI status badges and health checks
#[derive(Debug, Clone)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Whether a call made right now would be admitted
    pub can_attempt: bool,
    /// When the next trial call becomes admissible, while open
    pub next_attempt_at: Option<Instant>,
}

/// Lifetime counters, monotonically increasing until `reset()`
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rejected_calls: u64,
}

//==============================================================================
// Circuit breaker
//==============================================================================

/// Circuit breaker guarding a single named operation
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    clock: C,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    half_open_calls: AtomicU32,
    /// Start of the current failure-counting window
    window_start: Mutex<Option<Instant>>,
    last_failure_time: Mutex<Option<Instant>>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    rejected_calls: AtomicU64,
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with the system clock
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with an injected clock
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            window_start: Mutex::new(None),
            last_failure_time: Mutex::new(None),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        })
    }

    /// Operation name this breaker guards
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current circuit state, recovering from poisoned locks
    pub fn state(&self) -> CircuitState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!(name = %self.config.name, "circuit state lock poisoned");
                *poisoned.into_inner()
            }
        }
    }

    /// Check whether a call would be admitted, transitioning Open -> HalfOpen
    /// when the reset timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_failure = *self
                    .last_failure_time
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                if let Some(failure_time) = last_failure {
                    let now = self.clock.now();
                    if now.duration_since(failure_time) >= self.config.reset_timeout {
                        self.set_state(CircuitState::HalfOpen);
                        self.half_open_calls.store(0, Ordering::Release);
                        info!(name = %self.config.name, "circuit entering half-open");
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.load(Ordering::Acquire) < self.config.half_open_max_calls
            }
        }
    }

    /// Execute an async operation under breaker protection.
    ///
    /// Rejected calls return [`ResilienceError::CircuitOpen`] without
    /// invoking the operation. Operation failures are recorded, then
    /// propagated as [`ResilienceError::OperationFailed`].
    #[instrument(skip(self, operation), fields(name = %self.config.name, state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.can_execute() {
            return Err(self.reject());
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if self.state() == CircuitState::HalfOpen {
            self.half_open_calls.fetch_add(1, Ordering::Relaxed);
        }

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                warn!(name = %self.config.name, error = %error, "guarded operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Execute a synchronous operation under breaker protection
    #[instrument(skip(self, operation), fields(name = %self.config.name, state = %self.state()))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.can_execute() {
            return Err(self.reject());
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if self.state() == CircuitState::HalfOpen {
            self.half_open_calls.fetch_add(1, Ordering::Relaxed);
        }

        match operation() {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                warn!(name = %self.config.name, error = %error, "guarded operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                // Success resets the failure streak and its window
                self.failure_count.store(0, Ordering::Release);
                *self.window_start.lock().unwrap_or_else(|e| e.into_inner()) = None;
            }
            CircuitState::HalfOpen => {
                self.set_state(CircuitState::Closed);
                self.failure_count.store(0, Ordering::Release);
                *self.window_start.lock().unwrap_or_else(|e| e.into_inner()) = None;
                info!(name = %self.config.name, "circuit closed after trial success");
            }
            CircuitState::Open => {
                // A call admitted just before the state flipped; harmless
                debug!(name = %self.config.name, "success recorded while open");
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now();
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        *self
            .last_failure_time
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(now);

        match self.state() {
            CircuitState::Closed => {
                let count = {
                    let mut window = self.window_start.lock().unwrap_or_else(|e| e.into_inner());
                    let expired = window
                        .map(|start| now.duration_since(start) > self.config.monitoring_window)
                        .unwrap_or(true);
                    if expired {
                        // Window elapsed between failures; restart the count
                        *window = Some(now);
                        self.failure_count.store(1, Ordering::Release);
                        1
                    } else {
                        self.failure_count.fetch_add(1, Ordering::AcqRel) + 1
                    }
                };

                if count >= self.config.failure_threshold {
                    self.set_state(CircuitState::Open);
                    warn!(
                        name = %self.config.name,
                        failures = count,
                        "circuit opened after reaching failure threshold"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any trial failure re-opens immediately and re-arms the timeout
                self.set_state(CircuitState::Open);
                warn!(name = %self.config.name, "circuit re-opened after trial failure");
            }
            CircuitState::Open => {}
        }
    }

    /// Read-only snapshot; never mutates breaker state
    pub fn status(&self) -> CircuitBreakerStatus {
        let state = self.state();
        let last_failure = *self
            .last_failure_time
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let (can_attempt, next_attempt_at) = match state {
            CircuitState::Closed => (true, None),
            CircuitState::HalfOpen => (
                self.half_open_calls.load(Ordering::Acquire) < self.config.half_open_max_calls,
                None,
            ),
            CircuitState::Open => {
                let next = last_failure.map(|t| t + self.config.reset_timeout);
                let can = next.map(|t| self.clock.now() >= t).unwrap_or(false);
                (can, next)
            }
        };

        CircuitBreakerStatus {
            name: self.config.name.clone(),
            state,
            failure_count: self.failure_count.load(Ordering::Acquire),
            can_attempt,
            next_attempt_at,
        }
    }

    /// Lifetime counters snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }

    /// Force the breaker back to Closed, clearing all counters
    pub fn reset(&self) {
        self.set_state(CircuitState::Closed);
        self.failure_count.store(0, Ordering::Release);
        self.half_open_calls.store(0, Ordering::Release);
        *self.window_start.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self
            .last_failure_time
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        self.total_calls.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
        self.total_successes.store(0, Ordering::Relaxed);
        self.rejected_calls.store(0, Ordering::Relaxed);
        info!(name = %self.config.name, "circuit breaker reset");
    }

    fn reject<E>(&self) -> ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.rejected_calls.fetch_add(1, Ordering::Relaxed);
        let retry_after = self
            .last_failure_time
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| {
                (t + self.config.reset_timeout).saturating_duration_since(self.clock.now())
            });
        debug!(name = %self.config.name, "rejecting call while circuit open");
        ResilienceError::CircuitOpen {
            operation: self.config.name.clone(),
            retry_after,
        }
    }

    fn set_state(&self, new_state: CircuitState) {
        match self.state.write() {
            Ok(mut guard) => *guard = new_state,
            Err(poisoned) => {
                warn!(name = %self.config.name, "circuit state lock poisoned during transition");
                *poisoned.into_inner() = new_state;
            }
        }
    }
}

impl<C: Clock> std::fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

//==============================================================================
// Registry
//==============================================================================

/// Explicitly-constructed collection of named breakers.
///
/// Owned by an application context and injected where needed; one breaker
/// per guarded operation name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    /// Get the breaker for `name`, creating it from `config` on first use
    pub fn get_or_create(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(existing.clone());
        }
        let breaker = Arc::new(CircuitBreaker::new(config)?);
        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| breaker);
        Ok(entry.clone())
    }

    /// Get an existing breaker by name
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    /// Remove a breaker from the registry
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(name).map(|(_, b)| b)
    }

    /// Reset every registered breaker to Closed
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Status snapshot of every registered breaker
    pub fn statuses(&self) -> Vec<CircuitBreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| entry.value().status())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::MockClock;

    #[derive(Debug, Error)]
    #[error("{message}")]
    struct TestError {
        message: String,
    }

    impl TestError {
        fn new(message: &str) -> Self {
            Self {
                message: message.to_string(),
            }
        }
    }

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new("test-op")
            .with_failure_threshold(3)
            .with_reset_timeout(Duration::from_secs(30))
            .with_monitoring_window(Duration::from_secs(60))
    }

    fn breaker_with_clock(clock: MockClock) -> CircuitBreaker<MockClock> {
        CircuitBreaker::with_clock(test_config(), clock).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(test_config().validate().is_ok());

        let bad = CircuitBreakerConfig::new("x").with_failure_threshold(0);
        assert!(bad.validate().is_err());

        let bad = CircuitBreakerConfig::new("x").with_reset_timeout(Duration::ZERO);
        assert!(bad.validate().is_err());

        let bad = CircuitBreakerConfig::new("");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    /// Validates the Closed -> Open transition at exactly the failure
    /// threshold.
    ///
    /// Assertions:
    /// - Confirms the circuit stays CLOSED below the threshold
    /// - Confirms the circuit is OPEN once the threshold is reached
    #[test]
    fn test_opens_at_failure_threshold() {
        let breaker = breaker_with_clock(MockClock::new());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    /// Validates that a success in the Closed state resets the failure
    /// streak, so intermittent failures never accumulate to the threshold.
    #[test]
    fn test_success_resets_failure_count() {
        let breaker = breaker_with_clock(MockClock::new());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Validates the monitoring window: failures further apart than the
    /// window never accumulate, because the window restarts.
    #[test]
    fn test_monitoring_window_restarts() {
        let clock = MockClock::new();
        let breaker = breaker_with_clock(clock.clone());

        breaker.record_failure();
        breaker.record_failure();

        // Window elapses; the next failure starts a fresh count
        clock.advance(Duration::from_secs(61));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.status().failure_count, 1);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    /// Validates the Open -> HalfOpen -> Closed recovery path.
    ///
    /// # Test Steps
    /// 1. Drive the breaker to OPEN
    /// 2. Advance past the reset timeout
    /// 3. Confirm a trial call is admitted (HALF_OPEN)
    /// 4. Record a trial success and confirm the circuit closes
    #[test]
    fn test_half_open_recovery() {
        let clock = MockClock::new();
        let breaker = breaker_with_clock(clock.clone());

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());

        clock.advance(Duration::from_secs(30));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Validates that a trial failure in HALF_OPEN re-opens the circuit and
    /// re-arms the reset timeout.
    #[test]
    fn test_half_open_failure_reopens() {
        let clock = MockClock::new();
        let breaker = breaker_with_clock(clock.clone());

        for _ in 0..3 {
            breaker.record_failure();
        }
        clock.advance(Duration::from_secs(30));
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());

        // Timeout re-armed from the trial failure
        clock.advance(Duration::from_secs(29));
        assert!(!breaker.can_execute());
        clock.advance(Duration::from_secs(1));
        assert!(breaker.can_execute());
    }

    /// Validates that while OPEN the wrapped operation is never invoked and
    /// the caller receives a CircuitOpen rejection.
    #[tokio::test]
    async fn test_open_circuit_rejects_without_invoking() {
        let breaker = breaker_with_clock(MockClock::new());
        for _ in 0..3 {
            breaker.record_failure();
        }

        let mut invoked = false;
        let result: ResilienceResult<(), TestError> = breaker
            .execute(|| {
                invoked = true;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert!(!invoked);
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    /// Validates that HALF_OPEN admits exactly one trial call by default:
    /// a second concurrent call is rejected before the trial resolves.
    #[tokio::test]
    async fn test_half_open_admits_single_trial() {
        let clock = MockClock::new();
        let breaker = breaker_with_clock(clock.clone());

        for _ in 0..3 {
            breaker.record_failure();
        }
        clock.advance(Duration::from_secs(30));

        // First call transitions to HALF_OPEN and consumes the trial slot
        assert!(breaker.can_execute());
        breaker.half_open_calls.fetch_add(1, Ordering::Relaxed);

        let result: ResilienceResult<(), TestError> =
            breaker.execute(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let breaker = breaker_with_clock(MockClock::new());

        let ok: ResilienceResult<u32, TestError> = breaker.execute(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: ResilienceResult<u32, TestError> = breaker
            .execute(|| async { Err(TestError::new("boom")) })
            .await;
        match err {
            Err(ResilienceError::OperationFailed { source }) => {
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.total_successes, 1);
        assert_eq!(metrics.total_failures, 1);
    }

    #[test]
    fn test_call_sync() {
        let breaker = breaker_with_clock(MockClock::new());
        let result: ResilienceResult<u32, TestError> = breaker.call(|| Ok(11));
        assert_eq!(result.unwrap(), 11);
    }

    /// Validates that status() is read-only: querying an OPEN breaker after
    /// the reset timeout reports can_attempt without transitioning state.
    #[test]
    fn test_status_never_mutates() {
        let clock = MockClock::new();
        let breaker = breaker_with_clock(clock.clone());

        for _ in 0..3 {
            breaker.record_failure();
        }
        clock.advance(Duration::from_secs(31));

        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Open);
        assert!(status.can_attempt);
        assert!(status.next_attempt_at.is_some());

        // Still OPEN: only can_execute() performs the transition
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset_returns_to_closed() {
        let clock = MockClock::new();
        let breaker = breaker_with_clock(clock);

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.status().failure_count, 0);
        assert!(breaker.can_execute());
        assert_eq!(breaker.metrics().total_failures, 0);
    }

    #[test]
    fn test_registry_get_or_create() {
        let registry = CircuitBreakerRegistry::new();

        let a = registry
            .get_or_create("updateSettings", CircuitBreakerConfig::new("updateSettings"))
            .unwrap();
        let b = registry
            .get_or_create("updateSettings", CircuitBreakerConfig::new("updateSettings"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry
            .get_or_create("updateExpenses", CircuitBreakerConfig::new("updateExpenses"))
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.statuses().len(), 2);
    }

    #[test]
    fn test_registry_reset_all() {
        let registry = CircuitBreakerRegistry::new();
        let breaker = registry
            .get_or_create(
                "op",
                CircuitBreakerConfig::new("op").with_failure_threshold(1),
            )
            .unwrap();

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        registry.reset_all();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
