//! Shared infrastructure for the Ratecard client core.
//!
//! This crate provides the cache consistency and resilience layer that sits
//! between UI mutation hooks and the normalized query cache:
//!
//! - [`resilience`]: circuit breaker and retry-with-backoff
//! - [`cache`]: query-store contract, in-memory store, optimistic updates
//! - [`observability`]: render/cache-op instrumentation and health sweeps
//! - [`collections`]: bounded buffers backing the instrumentation
//! - [`time`]: cancellable recurring tasks and jittered intervals
//! - [`error`] / [`validation`]: the shared error taxonomy
//!
//! Everything is explicitly constructed and injected; the crate exposes no
//! module-level singletons.

#![forbid(unsafe_code)]

pub mod cache;
pub mod collections;
pub mod error;
pub mod observability;
pub mod resilience;
pub mod time;
pub mod validation;

pub use cache::{MemoryStore, MemoryStoreConfig, QueryKey, QueryStore, StoreStats};
pub use error::{ClientError, ClientResult, ErrorClassification, ErrorSeverity};
pub use observability::{HealthChecker, PerformanceMonitor};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, RetryConfig,
    RetryError,
};
pub use validation::{FieldError, ValidationError};
