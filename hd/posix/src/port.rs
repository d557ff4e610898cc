//! Clock and scheduler hooks for POSIX hosts

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use hd_core::{HdTick, Port};

/// Default sleep between polls of a blocked queue operation
const DEFAULT_IDLE: Duration = Duration::from_micros(100);

/// [`Port`] on top of `std::time` and `std::thread`
///
/// Ticks are milliseconds since the port was created. Waiting tasks sleep
/// briefly between attempts. A yield requested by the dispatcher cannot
/// preempt anything on a hosted system; it is only counted.
#[derive(Debug)]
pub struct StdPort {
    start: Instant,
    idle_for: Duration,
    yields: AtomicUsize,
}

impl StdPort {
    pub fn new() -> Self {
        Self::with_idle(DEFAULT_IDLE)
    }

    /// Port sleeping `idle_for` between polls
    pub fn with_idle(idle_for: Duration) -> Self {
        log::debug!("std port started, idle {:?}", idle_for);
        Self {
            start: Instant::now(),
            idle_for,
            yields: AtomicUsize::new(0),
        }
    }

    /// Number of yields requested from interrupt context so far
    pub fn yield_count(&self) -> usize {
        self.yields.load(Ordering::Relaxed)
    }
}

impl Default for StdPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for StdPort {
    fn now(&self) -> HdTick {
        HdTick::new(self.start.elapsed().as_millis() as u64)
    }

    fn idle(&self) {
        if self.idle_for.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.idle_for);
        }
    }

    fn yield_from_isr(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }
}
