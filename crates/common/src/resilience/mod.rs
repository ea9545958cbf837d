//! Resilience patterns for client-side operations.
//!
//! Two composable layers guard every mutation dispatched from the UI:
//!
//! - [`circuit_breaker`]: per-operation CLOSED/OPEN/HALF_OPEN state machine
//!   that sheds load while an endpoint is failing.
//! - [`retry`]: bounded exponential backoff with per-error policies and a
//!   composite exhaustion error.
//!
//! The intended nesting is breaker outside, retry inside: the breaker sees
//! one failure per exhausted retry sequence, not one per attempt. Both
//! layers take their time from the [`clock`] abstraction so tests never
//! sleep.

pub mod circuit_breaker;
pub mod clock;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerRegistry,
    CircuitBreakerStatus, CircuitState, ConfigError, ResilienceError, ResilienceResult,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use retry::{
    profiles, retry_with_backoff, retry_with_policy, AlwaysRetry, NeverRetry, PredicateRetry,
    RetryConfig, RetryError, RetryPolicy, RetryProfile,
};
