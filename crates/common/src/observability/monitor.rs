//! Render and cache-operation instrumentation.
//!
//! [`PerformanceMonitor`] collects per-component render timings and
//! per-operation cache timings, raises bounded alerts (slow renders,
//! excessive render rates, high failure ratios, latency regressions), and
//! produces point-in-time reports. It is advisory only: tracking never
//! blocks, defers, or fails the operation being observed.
//!
//! Monitors are explicitly constructed and injected; there is no global
//! instance. Every collection is capped, so a monitor's memory use is
//! constant regardless of session length.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tracing::{debug, warn};

use crate::collections::RingBuffer;
use crate::resilience::clock::{Clock, SystemClock};

//==============================================================================
// Configuration
//==============================================================================

/// Thresholds and caps for the monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Single-render budget; exceeding it raises a SlowRender alert
    pub frame_budget: Duration,
    /// Renders per window above which ExcessiveRenders is raised
    pub render_rate_limit: u32,
    /// Window for the render-rate check
    pub render_rate_window: Duration,
    /// Failure ratio above which HighFailureRate is raised
    pub failure_rate_threshold: f64,
    /// Samples required before ratio and regression checks engage
    pub min_samples: u32,
    /// Multiple of the moving-average baseline that counts as a regression
    pub regression_factor: f64,
    /// Cap on distinct components/operations tracked (oldest evicted)
    pub max_tracked: usize,
    /// Cap on retained alerts (oldest evicted)
    pub max_alerts: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            frame_budget: Duration::from_millis(16),
            render_rate_limit: 30,
            render_rate_window: Duration::from_secs(1),
            failure_rate_threshold: 0.3,
            min_samples: 10,
            regression_factor: 1.5,
            max_tracked: 100,
            max_alerts: 50,
        }
    }
}

//==============================================================================
// Alerts & snapshots
//==============================================================================

/// What triggered an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// A single render exceeded the frame budget
    SlowRender,
    /// A component re-rendered more often than the rate limit allows
    ExcessiveRenders,
    /// A cache operation's failure ratio crossed the threshold
    HighFailureRate,
    /// A cache operation regressed against its moving-average baseline
    Regression,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::SlowRender => write!(f, "slow-render"),
            AlertKind::ExcessiveRenders => write!(f, "excessive-renders"),
            AlertKind::HighFailureRate => write!(f, "high-failure-rate"),
            AlertKind::Regression => write!(f, "regression"),
        }
    }
}

/// One raised alert
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    /// Component or operation name the alert concerns
    pub subject: String,
    pub message: String,
    pub at: SystemTime,
    pub metadata: Option<Value>,
}

/// Aggregated render timings for one component
#[derive(Debug, Clone)]
pub struct RenderSnapshot {
    pub component: String,
    pub count: u64,
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
}

/// Aggregated timings for one cache operation
#[derive(Debug, Clone)]
pub struct OperationSnapshot {
    pub name: String,
    pub count: u64,
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
    pub failures: u64,
    pub failure_ratio: f64,
}

/// Point-in-time report over everything tracked
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub renders: Vec<RenderSnapshot>,
    pub operations: Vec<OperationSnapshot>,
    pub alerts: Vec<Alert>,
    pub generated_at: SystemTime,
}

//==============================================================================
// Internal stats
//==============================================================================

#[derive(Debug)]
struct RenderStats {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    window_start: Instant,
    window_count: u32,
    /// Already alerted for the current window
    window_alerted: bool,
}

#[derive(Debug)]
struct OpStats {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    successes: u64,
    failures: u64,
    /// Inside a regression episode; cleared when latency returns to baseline
    in_regression: bool,
    /// Failure ratio currently above threshold (alerted once per excursion)
    ratio_alerted: bool,
}

impl OpStats {
    fn new() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            successes: 0,
            failures: 0,
            in_regression: false,
            ratio_alerted: false,
        }
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total.as_secs_f64() * 1000.0 / self.count as f64
        }
    }

    fn failure_ratio(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }
}

/// Map with bounded cardinality; tracking a new key past the cap evicts the
/// oldest-inserted key.
#[derive(Debug)]
struct CappedMap<V> {
    entries: HashMap<String, V>,
    insertion_order: Vec<String>,
    cap: usize,
}

impl<V> CappedMap<V> {
    fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
            cap: cap.max(1),
        }
    }

    fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        if !self.entries.contains_key(key) {
            if self.entries.len() >= self.cap {
                let oldest = self.insertion_order.remove(0);
                self.entries.remove(&oldest);
                debug!(key = %oldest, "evicted oldest tracked entry over cap");
            }
            self.entries.insert(key.to_string(), default());
            self.insertion_order.push(key.to_string());
        }
        self.entries
            .get_mut(key)
            .unwrap_or_else(|| unreachable!("entry inserted above"))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }
}

//==============================================================================
// Monitor
//==============================================================================

/// Collects render/cache-operation metrics and raises bounded alerts
pub struct PerformanceMonitor<C: Clock = SystemClock> {
    config: MonitorConfig,
    clock: C,
    renders: RwLock<CappedMap<RenderStats>>,
    operations: RwLock<CappedMap<OpStats>>,
    alerts: Mutex<RingBuffer<Alert>>,
}

impl PerformanceMonitor<SystemClock> {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for PerformanceMonitor<SystemClock> {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl<C: Clock> PerformanceMonitor<C> {
    pub fn with_clock(config: MonitorConfig, clock: C) -> Self {
        let max_tracked = config.max_tracked;
        let max_alerts = config.max_alerts;
        Self {
            config,
            clock,
            renders: RwLock::new(CappedMap::new(max_tracked)),
            operations: RwLock::new(CappedMap::new(max_tracked)),
            alerts: Mutex::new(RingBuffer::new(max_alerts)),
        }
    }

    /// Record one render of a component
    pub fn track_render(&self, component: &str, duration: Duration) {
        let now = self.clock.now();
        let mut alerts_to_raise: Vec<Alert> = Vec::new();

        {
            let mut renders = self.renders.write().unwrap_or_else(|p| {
                warn!("render stats lock poisoned");
                p.into_inner()
            });
            let stats = renders.get_or_insert_with(component, || RenderStats {
                count: 0,
                total: Duration::ZERO,
                min: Duration::MAX,
                max: Duration::ZERO,
                window_start: now,
                window_count: 0,
                window_alerted: false,
            });

            stats.count += 1;
            stats.total += duration;
            stats.min = stats.min.min(duration);
            stats.max = stats.max.max(duration);

            if now.duration_since(stats.window_start) > self.config.render_rate_window {
                stats.window_start = now;
                stats.window_count = 0;
                stats.window_alerted = false;
            }
            stats.window_count += 1;

            if duration > self.config.frame_budget {
                alerts_to_raise.push(self.alert(
                    AlertKind::SlowRender,
                    component,
                    format!(
                        "render took {:?}, frame budget is {:?}",
                        duration, self.config.frame_budget
                    ),
                    None,
                ));
            }

            if stats.window_count > self.config.render_rate_limit && !stats.window_alerted {
                stats.window_alerted = true;
                alerts_to_raise.push(self.alert(
                    AlertKind::ExcessiveRenders,
                    component,
                    format!(
                        "{} renders within {:?} (limit {})",
                        stats.window_count, self.config.render_rate_window, self.config.render_rate_limit
                    ),
                    None,
                ));
            }
        }

        self.push_alerts(alerts_to_raise);
    }

    /// Record one cache operation outcome.
    ///
    /// `operation` and `feature` are combined into a `feature-operation`
    /// series key.
    pub fn track_cache_operation(
        &self,
        operation: &str,
        feature: &str,
        duration: Duration,
        success: bool,
        metadata: Option<Value>,
    ) {
        let series = format!("{feature}-{operation}");
        let sample_ms = duration.as_secs_f64() * 1000.0;
        let mut alerts_to_raise: Vec<Alert> = Vec::new();

        {
            let mut operations = self.operations.write().unwrap_or_else(|p| {
                warn!("operation stats lock poisoned");
                p.into_inner()
            });
            let stats = operations.get_or_insert_with(&series, OpStats::new);

            // Regression check against the baseline established by prior
            // samples, before this sample shifts it.
            let baseline_ms = stats.avg_ms();
            if stats.count >= self.config.min_samples as u64 && baseline_ms > 0.0 {
                if sample_ms > baseline_ms * self.config.regression_factor {
                    if !stats.in_regression {
                        stats.in_regression = true;
                        alerts_to_raise.push(self.alert(
                            AlertKind::Regression,
                            &series,
                            format!(
                                "sample {sample_ms:.1}ms exceeds baseline {baseline_ms:.1}ms x{}",
                                self.config.regression_factor
                            ),
                            metadata.clone(),
                        ));
                    }
                } else if sample_ms <= baseline_ms {
                    // Episode ends once latency returns to baseline
                    stats.in_regression = false;
                }
            }

            stats.count += 1;
            stats.total += duration;
            stats.min = stats.min.min(duration);
            stats.max = stats.max.max(duration);
            if success {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }

            let samples = stats.successes + stats.failures;
            let ratio = stats.failure_ratio();
            if samples >= self.config.min_samples as u64 {
                if ratio > self.config.failure_rate_threshold {
                    if !stats.ratio_alerted {
                        stats.ratio_alerted = true;
                        alerts_to_raise.push(self.alert(
                            AlertKind::HighFailureRate,
                            &series,
                            format!(
                                "failure ratio {:.0}% over {} samples (threshold {:.0}%)",
                                ratio * 100.0,
                                samples,
                                self.config.failure_rate_threshold * 100.0
                            ),
                            metadata.clone(),
                        ));
                    }
                } else {
                    stats.ratio_alerted = false;
                }
            }
        }

        self.push_alerts(alerts_to_raise);
    }

    /// Retained alerts, oldest to newest
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|p| {
                warn!("alert buffer lock poisoned");
                p.into_inner()
            })
            .to_vec()
    }

    /// Snapshot of everything tracked
    pub fn generate_report(&self) -> MonitorReport {
        let renders = self.renders.read().unwrap_or_else(|p| {
            warn!("render stats lock poisoned");
            p.into_inner()
        });
        let operations = self.operations.read().unwrap_or_else(|p| {
            warn!("operation stats lock poisoned");
            p.into_inner()
        });

        let render_snapshots = renders
            .iter()
            .map(|(component, s)| RenderSnapshot {
                component: component.clone(),
                count: s.count,
                avg: if s.count == 0 {
                    Duration::ZERO
                } else {
                    s.total / s.count as u32
                },
                min: if s.min == Duration::MAX { Duration::ZERO } else { s.min },
                max: s.max,
            })
            .collect();

        let operation_snapshots = operations
            .iter()
            .map(|(name, s)| OperationSnapshot {
                name: name.clone(),
                count: s.count,
                avg: if s.count == 0 {
                    Duration::ZERO
                } else {
                    s.total / s.count as u32
                },
                min: if s.min == Duration::MAX { Duration::ZERO } else { s.min },
                max: s.max,
                failures: s.failures,
                failure_ratio: s.failure_ratio(),
            })
            .collect();

        MonitorReport {
            renders: render_snapshots,
            operations: operation_snapshots,
            alerts: self.alerts(),
            generated_at: self.clock.system_time(),
        }
    }

    /// Number of distinct tracked series (components + operations)
    pub fn tracked_series(&self) -> usize {
        let renders = self.renders.read().unwrap_or_else(|p| p.into_inner()).len();
        let ops = self
            .operations
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .len();
        renders + ops
    }

    /// Clear all metrics and alerts
    pub fn reset(&self) {
        self.renders
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        self.operations
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        self.alerts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    fn alert(
        &self,
        kind: AlertKind,
        subject: &str,
        message: String,
        metadata: Option<Value>,
    ) -> Alert {
        Alert {
            kind,
            subject: subject.to_string(),
            message,
            at: self.clock.system_time(),
            metadata,
        }
    }

    fn push_alerts(&self, alerts: Vec<Alert>) {
        if alerts.is_empty() {
            return;
        }
        let mut buffer = self.alerts.lock().unwrap_or_else(|p| {
            warn!("alert buffer lock poisoned");
            p.into_inner()
        });
        for alert in alerts {
            warn!(kind = %alert.kind, subject = %alert.subject, "{}", alert.message);
            buffer.push(alert);
        }
    }
}

impl<C: Clock> std::fmt::Debug for PerformanceMonitor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("tracked_series", &self.tracked_series())
            .finish()
    }
}
