//! Counting credits bounding the transactions of one direction

use core::cell::Cell;
use core::convert::Infallible;

use critical_section::Mutex;

use hd_core::{HdDuration, HdResult, Port};

use crate::block_on;

/// Counting semaphore over a fixed number of credits
///
/// One credit stands for one transaction somewhere between enqueue and
/// collection: pending, in flight or completed.
pub struct Credits {
    available: Mutex<Cell<usize>>,
    total: usize,
}

impl Credits {
    pub const fn new(total: usize) -> Self {
        Self {
            available: Mutex::new(Cell::new(total)),
            total,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn available(&self) -> usize {
        critical_section::with(|cs| self.available.borrow(cs).get())
    }

    /// Credits currently handed out
    pub fn in_use(&self) -> usize {
        self.total - self.available()
    }

    pub fn try_take(&self) -> nb::Result<(), Infallible> {
        critical_section::with(|cs| {
            let available = self.available.borrow(cs);
            match available.get() {
                0 => Err(nb::Error::WouldBlock),
                n => {
                    available.set(n - 1);
                    Ok(())
                }
            }
        })
    }

    /// Take a credit, waiting up to `timeout` for one to be given back
    pub fn take_timeout<P: Port + ?Sized>(&self, port: &P, timeout: HdDuration) -> HdResult<()> {
        block_on(port, timeout, || self.try_take())
    }

    /// Give a credit back; surplus credits are dropped
    pub fn give(&self) {
        critical_section::with(|cs| {
            let available = self.available.borrow(cs);
            if available.get() < self.total {
                available.set(available.get() + 1);
            }
        });
    }
}
