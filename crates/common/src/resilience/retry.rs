//! Retry with bounded exponential backoff.
//!
//! [`retry_with_backoff`] drives an async operation through a bounded number
//! of attempts, sleeping between them with exponential backoff and optional
//! additive jitter. A [`RetryPolicy`] can veto further attempts per error.
//! When the budget is exhausted or a retry is vetoed, the caller receives a
//! composite [`RetryError::Exhausted`] retaining every attempt's error.
//!
//! There is no cooperative cancellation: once started, the loop runs to
//! success or exhaustion. Callers needing an abort race the returned future
//! against their own deadline.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::circuit_breaker::ConfigError;
use crate::error::{ClientError, ErrorClassification};

//==============================================================================
// Errors
//==============================================================================

/// Errors returned by retry execution
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts failed, or a policy vetoed further attempts.
    ///
    /// `errors` holds one entry per attempt in order; `attempts` is the
    /// terminal attempt count (1-based) and `elapsed` the wall-clock time
    /// spent including backoff sleeps.
    #[error("retry exhausted after {attempts} attempt(s) in {elapsed:?}{}", if *.vetoed { " (vetoed by policy)" } else { "" })]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        errors: Vec<E>,
        /// True when the policy stopped the loop before the attempt budget
        vetoed: bool,
    },

    /// The retry configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl<E> RetryError<E> {
    /// The final attempt's error, if any attempts ran
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { errors, .. } => errors.last(),
            Self::Config(_) => None,
        }
    }

    /// Consume the composite error, yielding the final attempt's error
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { mut errors, .. } => errors.pop(),
            Self::Config(_) => None,
        }
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempt budget, including the first attempt (1-based)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Exponential growth factor between attempts
    pub backoff_multiplier: f64,
    /// When set, up to 25% of the computed delay is added (never subtracted)
    pub jitter: bool,
    /// Operation name for logs
    pub name: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            name: None,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_attempts",
                "must be at least one",
            ));
        }
        if self.base_delay.is_zero() {
            return Err(ConfigError::invalid("base_delay", "must be non-zero"));
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::invalid(
                "max_delay",
                "must be at least base_delay",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Deterministic delay before the retry following attempt `attempt`
    /// (1-based), before jitter: `min(base * multiplier^(attempt-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.backoff_multiplier.powi(exponent as i32);
        let raw = self.base_delay.as_secs_f64() * factor;
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    fn sleep_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            let fraction: f64 = rand::thread_rng().gen_range(0.0..=0.25);
            delay + Duration::from_secs_f64(delay.as_secs_f64() * fraction)
        } else {
            delay
        }
    }
}

//==============================================================================
// Policies
//==============================================================================

/// Decides whether a failed attempt should be retried
pub trait RetryPolicy<E>: Send + Sync {
    /// Called after a failed attempt (`attempt` is 1-based); returning false
    /// stops the loop with a vetoed exhaustion error.
    fn should_retry(&self, error: &E, attempt: u32) -> bool;
}

/// Retry every failure until the attempt budget runs out
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E> RetryPolicy<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E, _attempt: u32) -> bool {
        true
    }
}

/// Never retry; the first failure is final
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl<E> RetryPolicy<E> for NeverRetry {
    fn should_retry(&self, _error: &E, _attempt: u32) -> bool {
        false
    }
}

/// Retry when the predicate approves the error
#[derive(Debug, Clone)]
pub struct PredicateRetry<F> {
    predicate: F,
}

impl<F> PredicateRetry<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPolicy<E> for PredicateRetry<F>
where
    F: Fn(&E, u32) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        (self.predicate)(error, attempt)
    }
}

//==============================================================================
// Execution
//==============================================================================

/// Run `operation` with retries per `config`, consulting `policy` after each
/// failure.
///
/// Attempts are numbered from 1. The delay before the retry following
/// attempt `n` is `min(base_delay * multiplier^(n-1), max_delay)`, plus up
/// to 25% additive jitter when enabled.
pub async fn retry_with_policy<T, E, P, F, Fut>(
    config: &RetryConfig,
    policy: &P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    P: RetryPolicy<E>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    config.validate()?;

    let name = config.name.as_deref().unwrap_or("retry");
    let started = std::time::Instant::now();
    let mut errors: Vec<E> = Vec::new();

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(name, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                debug!(name, attempt, ?error, "attempt failed");
                let vetoed = !policy.should_retry(&error, attempt);
                errors.push(error);

                if vetoed || attempt == config.max_attempts {
                    warn!(
                        name,
                        attempts = attempt,
                        vetoed,
                        "retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        errors,
                        vetoed,
                    });
                }

                tokio::time::sleep(config.sleep_for_attempt(attempt)).await;
            }
        }
    }

    // max_attempts >= 1 is validated, so the loop always returns
    unreachable!("retry loop exited without a result")
}

/// Retry every failure: [`retry_with_policy`] with [`AlwaysRetry`]
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    retry_with_policy(config, &AlwaysRetry, operation).await
}

//==============================================================================
// Preset profiles
//==============================================================================

/// A retry configuration bundled with its error policy
#[derive(Debug, Clone)]
pub struct RetryProfile {
    pub config: RetryConfig,
    policy: fn(&ClientError, u32) -> bool,
}

impl RetryProfile {
    pub fn new(config: RetryConfig, policy: fn(&ClientError, u32) -> bool) -> Self {
        Self { config, policy }
    }

    /// Run an operation under this profile
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, RetryError<ClientError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        retry_with_policy(&self.config, self, operation).await
    }
}

impl RetryPolicy<ClientError> for RetryProfile {
    fn should_retry(&self, error: &ClientError, attempt: u32) -> bool {
        (self.policy)(error, attempt)
    }
}

/// Preset profiles for the three call sites in the client core
pub mod profiles {
    use super::*;

    /// Read/query traffic against the API: 3 attempts, 1s base, 30s cap.
    ///
    /// Client mistakes (HTTP 400-404), validation failures, and circuit
    /// rejections are never retried.
    pub fn api() -> RetryProfile {
        RetryProfile::new(
            RetryConfig::new(3)
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30))
                .with_backoff_multiplier(2.0)
                .with_name("api"),
            |error, _attempt| match error {
                ClientError::Api {
                    status: Some(s), ..
                } if (400..=404).contains(s) => false,
                ClientError::Validation { .. } => false,
                ClientError::CircuitOpen { .. } => false,
                _ => true,
            },
        )
    }

    /// Local cache operations: 2 attempts, short delays.
    ///
    /// Validation and serialization failures are deterministic; retrying
    /// them cannot succeed.
    pub fn cache() -> RetryProfile {
        RetryProfile::new(
            RetryConfig::new(2)
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(1))
                .with_backoff_multiplier(2.0)
                .with_name("cache"),
            |error, _attempt| {
                !matches!(
                    error,
                    ClientError::Validation { .. } | ClientError::Serialization { .. }
                )
            },
        )
    }

    /// Mutations: at most one retry, and only for transient failures.
    ///
    /// Open circuits are left to the breaker's own recovery instead of
    /// being hammered; validation and internal errors are final.
    pub fn mutation() -> RetryProfile {
        RetryProfile::new(
            RetryConfig::new(2)
                .with_base_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(5))
                .with_backoff_multiplier(2.0)
                .with_name("mutation"),
            |error, _attempt| match error {
                ClientError::Validation { .. }
                | ClientError::Internal { .. }
                | ClientError::CircuitOpen { .. } => false,
                other => other.is_retryable(),
            },
        )
    }
}
