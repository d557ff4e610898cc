//! Time types and the scheduler boundary

use core::fmt;

/// Monotonic millisecond tick reported by a [`Port`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HdTick(u64);

impl HdTick {
    pub const ZERO: Self = Self(0);

    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier` (handles wraparound)
    pub fn elapsed_since(self, earlier: HdTick) -> u64 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl fmt::Display for HdTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HdTick {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "tick:{}", self.0);
    }
}

/// Timeout for blocking queue operations, in 1 ms ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HdDuration {
    ticks: u32,
}

impl HdDuration {
    /// Do not wait
    pub const ZERO: Self = Self { ticks: 0 };

    /// Wait forever
    pub const MAX: Self = Self { ticks: u32::MAX };

    pub const fn from_ticks(ticks: u32) -> Self {
        Self { ticks }
    }

    pub const fn from_millis(millis: u32) -> Self {
        Self { ticks: millis }
    }

    pub const fn from_secs(secs: u32) -> Self {
        Self {
            ticks: secs.saturating_mul(1000),
        }
    }

    pub const fn ticks(&self) -> u32 {
        self.ticks
    }

    pub const fn as_millis(&self) -> u32 {
        self.ticks
    }

    pub const fn is_zero(&self) -> bool {
        self.ticks == 0
    }

    pub const fn is_forever(&self) -> bool {
        self.ticks == u32::MAX
    }
}

impl fmt::Display for HdDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_forever() {
            write!(f, "forever")
        } else {
            write!(f, "{}ms", self.ticks)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HdDuration {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}ms", self.ticks);
    }
}

/// Scheduler boundary used by the engine
///
/// Blocking queue operations poll, calling [`Port::idle`] between attempts
/// until the timeout measured with [`Port::now`] expires. The interrupt
/// dispatcher reports a pending higher-priority wake through
/// [`Port::yield_from_isr`].
pub trait Port {
    /// Current monotonic time
    fn now(&self) -> HdTick;

    /// Give up the CPU while a task waits on a queue
    fn idle(&self);

    /// Request a context switch on interrupt exit
    fn yield_from_isr(&self) {}
}

impl<P: Port + ?Sized> Port for &P {
    fn now(&self) -> HdTick {
        (**self).now()
    }

    fn idle(&self) {
        (**self).idle()
    }

    fn yield_from_isr(&self) {
        (**self).yield_from_isr()
    }
}

/// Tracks expiry of a timeout started at a given tick
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: HdTick,
    timeout: HdDuration,
}

impl Deadline {
    pub fn start<P: Port + ?Sized>(port: &P, timeout: HdDuration) -> Self {
        Self {
            start: port.now(),
            timeout,
        }
    }

    /// True once at least `timeout` has elapsed in wall time
    ///
    /// The start tick is only partially spent when the deadline is taken, so
    /// a timeout of `n` ticks expires on the `n + 1`th tick boundary. A zero
    /// timeout is expired from the start.
    pub fn expired<P: Port + ?Sized>(&self, port: &P) -> bool {
        if self.timeout.is_forever() {
            return false;
        }
        if self.timeout.is_zero() {
            return true;
        }
        port.now().elapsed_since(self.start) > u64::from(self.timeout.ticks())
    }
}
