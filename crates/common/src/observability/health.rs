//! Periodic health sweeps over the cache and instrumentation.
//!
//! A [`HealthChecker`] runs a battery of [`HealthCheck`]s against a
//! point-in-time [`HealthContext`] (store stats + monitor report) and folds
//! the findings into a 0-100 score. A check that fails to run is recorded
//! as an Error outcome; the sweep itself never aborts.
//!
//! Sweeps are scheduled explicitly: [`HealthChecker::start`] returns a
//! [`TaskHandle`] the owner cancels on teardown.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::cache::store::{MemoryStore, QueryStore, StoreStats};
use crate::error::{ClientError, ErrorSeverity};
use crate::observability::monitor::{MonitorReport, PerformanceMonitor};
use crate::resilience::clock::{Clock, SystemClock};
use crate::time::{recurring, TaskHandle};

//==============================================================================
// Outcomes
//==============================================================================

/// Overall state of one check or of the whole report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

/// One finding raised by a check
#[derive(Debug, Clone)]
pub struct Issue {
    pub severity: ErrorSeverity,
    pub message: String,
}

impl Issue {
    pub fn new(severity: ErrorSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Result of one check within a sweep
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub status: HealthStatus,
    pub issues: Vec<Issue>,
}

impl CheckOutcome {
    /// Outcome with no findings
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            issues: Vec::new(),
        }
    }

    /// Outcome whose status is derived from the worst finding
    pub fn with_issues(name: impl Into<String>, issues: Vec<Issue>) -> Self {
        let status = issues
            .iter()
            .map(|i| match i.severity {
                ErrorSeverity::Critical | ErrorSeverity::Error => HealthStatus::Error,
                ErrorSeverity::Warning | ErrorSeverity::Info => HealthStatus::Warning,
            })
            .max_by_key(|s| match s {
                HealthStatus::Healthy => 0,
                HealthStatus::Warning => 1,
                HealthStatus::Error => 2,
            })
            .unwrap_or(HealthStatus::Healthy);
        Self {
            name: name.into(),
            status,
            issues,
        }
    }
}

/// Point-in-time inputs a sweep examines
#[derive(Debug, Clone)]
pub struct HealthContext {
    pub store_stats: StoreStats,
    pub monitor_report: MonitorReport,
    /// Per-key write counts, for duplicate-fetch detection
    pub key_write_counts: Vec<(String, u64)>,
}

/// One diagnostic in the battery
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect the context. Returning `Err` marks the check itself as
    /// failed; the sweep records it and continues.
    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError>;
}

/// Full sweep result
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// 100 minus severity penalties, floored at 0
    pub score: u8,
    pub status: HealthStatus,
    pub outcomes: Vec<CheckOutcome>,
    pub generated_at: SystemTime,
}

//==============================================================================
// Configuration
//==============================================================================

/// Thresholds the built-in battery checks against
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub memory_warn_bytes: usize,
    pub memory_critical_bytes: usize,
    /// Stale entries / total entries ratio that raises a warning
    pub stale_ratio_warn: f64,
    /// Per-operation failure ratio that raises an error
    pub failure_ratio_warn: f64,
    /// Samples an operation needs before its failure ratio is judged
    pub failure_ratio_min_samples: u64,
    /// Average render time above this is a warning
    pub slow_render_avg: Duration,
    /// Average cache-operation time above this is a warning
    pub slow_op_avg: Duration,
    /// Writes per key above this suggest duplicate fetching
    pub refetch_limit: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            memory_warn_bytes: 5 * 1024 * 1024,
            memory_critical_bytes: 20 * 1024 * 1024,
            stale_ratio_warn: 0.5,
            failure_ratio_warn: 0.2,
            failure_ratio_min_samples: 5,
            slow_render_avg: Duration::from_millis(16),
            slow_op_avg: Duration::from_millis(100),
            refetch_limit: 10,
        }
    }
}

/// Sweep configuration
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub thresholds: HealthThresholds,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            thresholds: HealthThresholds::default(),
        }
    }
}

//==============================================================================
// Built-in battery
//==============================================================================

struct MemoryLevelCheck {
    warn: usize,
    critical: usize,
}

impl HealthCheck for MemoryLevelCheck {
    fn name(&self) -> &str {
        "memory-level"
    }

    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
        let bytes = ctx.store_stats.approx_bytes;
        let mut issues = Vec::new();
        if bytes >= self.critical {
            issues.push(Issue::new(
                ErrorSeverity::Critical,
                format!("cache holds ~{bytes} bytes, critical limit {}", self.critical),
            ));
        } else if bytes >= self.warn {
            issues.push(Issue::new(
                ErrorSeverity::Warning,
                format!("cache holds ~{bytes} bytes, warn limit {}", self.warn),
            ));
        }
        Ok(CheckOutcome::with_issues(self.name(), issues))
    }
}

struct SlowRenderCheck {
    budget: Duration,
}

impl HealthCheck for SlowRenderCheck {
    fn name(&self) -> &str {
        "slow-renders"
    }

    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
        let issues = ctx
            .monitor_report
            .renders
            .iter()
            .filter(|r| r.avg > self.budget)
            .map(|r| {
                Issue::new(
                    ErrorSeverity::Warning,
                    format!("{} averages {:?} per render", r.component, r.avg),
                )
            })
            .collect();
        Ok(CheckOutcome::with_issues(self.name(), issues))
    }
}

struct SlowCacheOpCheck {
    limit: Duration,
}

impl HealthCheck for SlowCacheOpCheck {
    fn name(&self) -> &str {
        "slow-cache-ops"
    }

    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
        let issues = ctx
            .monitor_report
            .operations
            .iter()
            .filter(|o| o.avg > self.limit)
            .map(|o| {
                Issue::new(
                    ErrorSeverity::Warning,
                    format!("{} averages {:?}", o.name, o.avg),
                )
            })
            .collect();
        Ok(CheckOutcome::with_issues(self.name(), issues))
    }
}

struct ErrorRateCheck {
    threshold: f64,
    min_samples: u64,
}

impl HealthCheck for ErrorRateCheck {
    fn name(&self) -> &str {
        "error-rate"
    }

    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
        let issues = ctx
            .monitor_report
            .operations
            .iter()
            .filter(|o| o.count >= self.min_samples && o.failure_ratio > self.threshold)
            .map(|o| {
                Issue::new(
                    ErrorSeverity::Error,
                    format!(
                        "{} failing at {:.0}% ({} of {} calls)",
                        o.name,
                        o.failure_ratio * 100.0,
                        o.failures,
                        o.count
                    ),
                )
            })
            .collect();
        Ok(CheckOutcome::with_issues(self.name(), issues))
    }
}

struct StalenessCheck {
    ratio: f64,
}

impl HealthCheck for StalenessCheck {
    fn name(&self) -> &str {
        "cache-staleness"
    }

    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
        let stats = &ctx.store_stats;
        let mut issues = Vec::new();
        if stats.size > 0 {
            let stale_ratio = stats.stale_entries as f64 / stats.size as f64;
            if stale_ratio > self.ratio {
                issues.push(Issue::new(
                    ErrorSeverity::Warning,
                    format!(
                        "{} of {} entries are stale ({:.0}%)",
                        stats.stale_entries,
                        stats.size,
                        stale_ratio * 100.0
                    ),
                ));
            }
        }
        Ok(CheckOutcome::with_issues(self.name(), issues))
    }
}

struct DuplicateQueryCheck {
    limit: u64,
}

impl HealthCheck for DuplicateQueryCheck {
    fn name(&self) -> &str {
        "duplicate-queries"
    }

    fn run(&self, ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
        let issues = ctx
            .key_write_counts
            .iter()
            .filter(|(_, count)| *count > self.limit)
            .map(|(key, count)| {
                Issue::new(
                    ErrorSeverity::Info,
                    format!("key '{key}' written {count} times, possible duplicate fetching"),
                )
            })
            .collect();
        Ok(CheckOutcome::with_issues(self.name(), issues))
    }
}

fn default_battery(thresholds: &HealthThresholds) -> Vec<Box<dyn HealthCheck>> {
    vec![
        Box::new(MemoryLevelCheck {
            warn: thresholds.memory_warn_bytes,
            critical: thresholds.memory_critical_bytes,
        }),
        Box::new(SlowRenderCheck {
            budget: thresholds.slow_render_avg,
        }),
        Box::new(SlowCacheOpCheck {
            limit: thresholds.slow_op_avg,
        }),
        Box::new(ErrorRateCheck {
            threshold: thresholds.failure_ratio_warn,
            min_samples: thresholds.failure_ratio_min_samples,
        }),
        Box::new(StalenessCheck {
            ratio: thresholds.stale_ratio_warn,
        }),
        Box::new(DuplicateQueryCheck {
            limit: thresholds.refetch_limit,
        }),
    ]
}

//==============================================================================
// Checker
//==============================================================================

fn penalty(severity: ErrorSeverity) -> u32 {
    match severity {
        ErrorSeverity::Critical => 25,
        ErrorSeverity::Error => 15,
        ErrorSeverity::Warning => 10,
        ErrorSeverity::Info => 5,
    }
}

/// Runs the check battery and scores the findings
pub struct HealthChecker<C: Clock = SystemClock> {
    config: HealthCheckConfig,
    clock: C,
    checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthChecker<SystemClock> {
    /// Checker with the built-in battery and the system clock
    pub fn new(config: HealthCheckConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Spawn recurring sweeps against a store and monitor.
    ///
    /// The returned handle stops the sweeps; the checker logs each score.
    /// When sweeps are disabled by config, no task is spawned and the
    /// returned handle is already cancelled.
    pub fn start(
        self: &Arc<Self>,
        store: Arc<MemoryStore>,
        monitor: Arc<PerformanceMonitor>,
    ) -> TaskHandle {
        if !self.config.enabled {
            info!("health sweeps disabled by config");
            return TaskHandle::inert();
        }
        let checker = Arc::clone(self);
        recurring(self.config.interval, move || {
            let ctx = HealthContext {
                store_stats: store.stats(),
                monitor_report: monitor.generate_report(),
                key_write_counts: store.write_counts(),
            };
            let report = checker.run_sweep(&ctx);
            info!(score = report.score, status = %report.status, "health sweep complete");
        })
    }
}

impl<C: Clock> HealthChecker<C> {
    /// Checker with the built-in battery and an injected clock
    pub fn with_clock(config: HealthCheckConfig, clock: C) -> Self {
        let checks = default_battery(&config.thresholds);
        Self {
            config,
            clock,
            checks,
        }
    }

    /// Append a custom check to the battery
    pub fn add_check(&mut self, check: Box<dyn HealthCheck>) {
        self.checks.push(check);
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Run every check against the context.
    ///
    /// A check returning `Err` becomes an Error outcome with a single
    /// Error-severity issue; remaining checks still run.
    pub fn run_sweep(&self, ctx: &HealthContext) -> HealthReport {
        let mut outcomes = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            match check.run(ctx) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(check = check.name(), error = %err, "health check failed to run");
                    outcomes.push(CheckOutcome {
                        name: check.name().to_string(),
                        status: HealthStatus::Error,
                        issues: vec![Issue::new(
                            ErrorSeverity::Error,
                            format!("check failed to run: {err}"),
                        )],
                    });
                }
            }
        }

        let total_penalty: u32 = outcomes
            .iter()
            .flat_map(|o| o.issues.iter())
            .map(|i| penalty(i.severity))
            .sum();
        let score = 100u32.saturating_sub(total_penalty) as u8;

        let status = if outcomes.iter().any(|o| o.status == HealthStatus::Error) {
            HealthStatus::Error
        } else if outcomes.iter().any(|o| o.status == HealthStatus::Warning) {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            score,
            status,
            outcomes,
            generated_at: self.clock.system_time(),
        }
    }
}

impl<C: Clock> std::fmt::Debug for HealthChecker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("checks", &self.checks.len())
            .field("interval", &self.config.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::monitor::{MonitorConfig, OperationSnapshot};
    use crate::resilience::clock::MockClock;

    fn empty_context() -> HealthContext {
        HealthContext {
            store_stats: StoreStats::default(),
            monitor_report: PerformanceMonitor::new(MonitorConfig::default()).generate_report(),
            key_write_counts: Vec::new(),
        }
    }

    fn checker() -> HealthChecker<MockClock> {
        HealthChecker::with_clock(HealthCheckConfig::default(), MockClock::new())
    }

    struct FailingCheck;

    impl HealthCheck for FailingCheck {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&self, _ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
            Err(ClientError::internal("check blew up"))
        }
    }

    struct FixedIssuesCheck {
        issues: Vec<Issue>,
    }

    impl HealthCheck for FixedIssuesCheck {
        fn name(&self) -> &str {
            "fixed"
        }

        fn run(&self, _ctx: &HealthContext) -> Result<CheckOutcome, ClientError> {
            Ok(CheckOutcome::with_issues("fixed", self.issues.clone()))
        }
    }

    #[test]
    fn test_clean_context_scores_100() {
        let report = checker().run_sweep(&empty_context());
        assert_eq!(report.score, 100);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.outcomes.len(), 6);
    }

    /// Validates severity penalties: 100 minus 25/15/10/5 per issue.
    #[test]
    fn test_score_penalties() {
        let mut c = checker();
        c.add_check(Box::new(FixedIssuesCheck {
            issues: vec![
                Issue::new(ErrorSeverity::Critical, "a"),
                Issue::new(ErrorSeverity::Error, "b"),
                Issue::new(ErrorSeverity::Warning, "c"),
                Issue::new(ErrorSeverity::Info, "d"),
            ],
        }));

        let report = c.run_sweep(&empty_context());
        assert_eq!(report.score, 100 - 25 - 15 - 10 - 5);
        assert_eq!(report.status, HealthStatus::Error);
    }

    /// Validates the floor: penalties beyond 100 clamp the score at 0
    /// instead of underflowing.
    #[test]
    fn test_score_floors_at_zero() {
        let mut c = checker();
        c.add_check(Box::new(FixedIssuesCheck {
            issues: (0..10)
                .map(|i| Issue::new(ErrorSeverity::Critical, format!("issue {i}")))
                .collect(),
        }));

        let report = c.run_sweep(&empty_context());
        assert_eq!(report.score, 0);
    }

    /// Validates sweep resilience: a check that fails to run is recorded as
    /// an Error outcome and every other check still runs.
    #[test]
    fn test_sweep_survives_failing_check() {
        let mut c = checker();
        c.add_check(Box::new(FailingCheck));

        let report = c.run_sweep(&empty_context());
        assert_eq!(report.outcomes.len(), 7);

        let failed = report
            .outcomes
            .iter()
            .find(|o| o.name == "failing")
            .unwrap();
        assert_eq!(failed.status, HealthStatus::Error);
        assert!(failed.issues[0].message.contains("check blew up"));

        // 100 - 15 for the failed check's Error issue
        assert_eq!(report.score, 85);
    }

    #[test]
    fn test_memory_check_thresholds() {
        let mut ctx = empty_context();
        ctx.store_stats.approx_bytes = 6 * 1024 * 1024;

        let report = checker().run_sweep(&ctx);
        let memory = report
            .outcomes
            .iter()
            .find(|o| o.name == "memory-level")
            .unwrap();
        assert_eq!(memory.status, HealthStatus::Warning);

        ctx.store_stats.approx_bytes = 25 * 1024 * 1024;
        let report = checker().run_sweep(&ctx);
        let memory = report
            .outcomes
            .iter()
            .find(|o| o.name == "memory-level")
            .unwrap();
        assert_eq!(memory.status, HealthStatus::Error);
        assert_eq!(report.score, 75);
    }

    /// Validates the configurable sample floor for the error-rate check:
    /// below the floor a failing operation is not judged, and lowering the
    /// floor makes the same traffic report.
    #[test]
    fn test_error_rate_sample_floor_is_configurable() {
        let mut ctx = empty_context();
        ctx.monitor_report.operations.push(OperationSnapshot {
            name: "expenses-update".to_string(),
            count: 3,
            avg: Duration::from_millis(5),
            min: Duration::from_millis(5),
            max: Duration::from_millis(5),
            failures: 3,
            failure_ratio: 1.0,
        });

        let report = checker().run_sweep(&ctx);
        let errors = report
            .outcomes
            .iter()
            .find(|o| o.name == "error-rate")
            .unwrap();
        assert!(errors.issues.is_empty(), "3 samples are below the default floor of 5");

        let config = HealthCheckConfig {
            thresholds: HealthThresholds {
                failure_ratio_min_samples: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = HealthChecker::with_clock(config, MockClock::new()).run_sweep(&ctx);
        let errors = report
            .outcomes
            .iter()
            .find(|o| o.name == "error-rate")
            .unwrap();
        assert_eq!(errors.issues.len(), 1);
        assert_eq!(errors.status, HealthStatus::Error);
    }

    #[test]
    fn test_staleness_check() {
        let mut ctx = empty_context();
        ctx.store_stats.size = 10;
        ctx.store_stats.stale_entries = 8;

        let report = checker().run_sweep(&ctx);
        let staleness = report
            .outcomes
            .iter()
            .find(|o| o.name == "cache-staleness")
            .unwrap();
        assert_eq!(staleness.status, HealthStatus::Warning);
    }

    #[test]
    fn test_duplicate_query_check() {
        let mut ctx = empty_context();
        ctx.key_write_counts = vec![
            ("billableCostSettings:1".to_string(), 3),
            ("fixedExpenses:1".to_string(), 25),
        ];

        let report = checker().run_sweep(&ctx);
        let dupes = report
            .outcomes
            .iter()
            .find(|o| o.name == "duplicate-queries")
            .unwrap();
        assert_eq!(dupes.issues.len(), 1);
        assert!(dupes.issues[0].message.contains("fixedExpenses:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sweeps_run_and_stop() {
        let checker = Arc::new(HealthChecker::new(HealthCheckConfig {
            interval: Duration::from_secs(1),
            ..Default::default()
        }));
        let store = Arc::new(MemoryStore::default());
        let monitor = Arc::new(PerformanceMonitor::default());

        let handle = checker.start(store, monitor);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();
        assert!(handle.is_cancelled());
    }
}
