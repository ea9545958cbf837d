//! Cancellable recurring tasks.
//!
//! [`recurring`] spawns a tokio task that invokes a callback at a fixed
//! period until its [`TaskHandle`] is cancelled. Scheduling is explicit:
//! components return the handle to their owner instead of holding a
//! free-running interval internally, so start and stop are always visible
//! at the call site.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Handle for cancelling a spawned recurring task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that is already cancelled, for callers that decline to spawn
    pub fn inert() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop the task; it exits at its next tick
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        debug!("recurring task cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Spawn a recurring task invoking `f` every `period`.
///
/// The first invocation happens one period after the call, not immediately.
/// Missed ticks are skipped rather than bursted.
pub fn recurring<F>(period: Duration, mut f: F) -> TaskHandle
where
    F: FnMut() + Send + 'static,
{
    let handle = TaskHandle::new();
    let flag = handle.cancelled.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of tokio's interval fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if flag.load(Ordering::SeqCst) {
                break;
            }
            f();
        }
    });

    handle
}
