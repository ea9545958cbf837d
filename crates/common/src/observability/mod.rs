//! Performance and health instrumentation.
//!
//! [`monitor`] tracks render and cache-operation timings and raises bounded
//! alerts; [`health`] periodically folds those metrics, plus store stats,
//! into a 0-100 health score. Both are advisory: they observe, they never
//! gate.

pub mod health;
pub mod monitor;

pub use health::{
    CheckOutcome, HealthCheck, HealthCheckConfig, HealthChecker, HealthContext, HealthReport,
    HealthStatus, HealthThresholds, Issue,
};
pub use monitor::{
    Alert, AlertKind, MonitorConfig, MonitorReport, OperationSnapshot, PerformanceMonitor,
    RenderSnapshot,
};
