//! Awaitable interval with optional jitter.
//!
//! Used where periodic work should not synchronize across instances
//! (memory sampling, background refresh); jitter spreads the ticks.

use std::time::Duration;

use rand::Rng;

/// Configuration for [`Interval`]
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Base period between ticks
    pub period: Duration,
    /// Jitter fraction in 0.0..=1.0; each tick waits `period ± period*jitter/2`
    pub jitter: Option<f64>,
}

impl IntervalConfig {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            jitter: None,
        }
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = Some(fraction.clamp(0.0, 1.0));
        self
    }
}

/// Awaitable interval; each `tick` sleeps for the (possibly jittered) period
#[derive(Debug)]
pub struct Interval {
    config: IntervalConfig,
}

impl Interval {
    pub fn new(config: IntervalConfig) -> Self {
        Self { config }
    }

    /// Duration the next tick will wait
    pub fn next_period(&self) -> Duration {
        match self.config.jitter {
            Some(fraction) if fraction > 0.0 => {
                let base = self.config.period.as_secs_f64();
                let spread = base * fraction;
                let jittered = rand::thread_rng().gen_range((base - spread / 2.0).max(0.0)..=(base + spread / 2.0));
                Duration::from_secs_f64(jittered)
            }
            _ => self.config.period,
        }
    }

    /// Wait for the next tick
    pub async fn tick(&self) {
        tokio::time::sleep(self.next_period()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_jitter_is_exact() {
        let interval = Interval::new(IntervalConfig::new(Duration::from_secs(5)));
        for _ in 0..10 {
            assert_eq!(interval.next_period(), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let interval =
            Interval::new(IntervalConfig::new(Duration::from_secs(10)).with_jitter(0.2));
        for _ in 0..100 {
            let period = interval.next_period();
            assert!(period >= Duration::from_secs(9));
            assert!(period <= Duration::from_secs(11));
        }
    }

    #[test]
    fn test_jitter_fraction_clamped() {
        let config = IntervalConfig::new(Duration::from_secs(1)).with_jitter(3.0);
        assert_eq!(config.jitter, Some(1.0));
    }
}
