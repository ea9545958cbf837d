//! Timer and interval utilities.

pub mod interval;
pub mod timer;

pub use interval::{Interval, IntervalConfig};
pub use timer::{recurring, TaskHandle};
