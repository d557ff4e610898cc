//! Bounded FIFO shared between tasks and the interrupt dispatcher

use core::cell::RefCell;
use core::convert::Infallible;

use critical_section::Mutex;
use heapless::Deque;

use hd_core::{HdDuration, HdError, HdResult, Port};

use crate::block_on;

/// FIFO with a runtime capacity of at most `N` items
///
/// Storage for `N` items is reserved up front; the configured capacity may
/// be smaller. Every access takes a short critical section, so the queue may
/// be used from interrupt context.
pub struct HdQueue<T, const N: usize> {
    items: Mutex<RefCell<Deque<T, N>>>,
    capacity: usize,
}

impl<T, const N: usize> HdQueue<T, N> {
    /// Create an empty queue holding up to `capacity` items
    ///
    /// Fails with [`HdError::InvalidArgument`] for a zero capacity and with
    /// [`HdError::NoQueueMemory`] if `capacity` exceeds `N`.
    pub fn with_capacity(capacity: usize) -> HdResult<Self> {
        if capacity == 0 {
            return Err(HdError::InvalidArgument);
        }
        if capacity > N {
            return Err(HdError::NoQueueMemory);
        }
        Ok(Self {
            items: Mutex::new(RefCell::new(Deque::new())),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.items.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append `item`, handing it back if the queue is at capacity
    pub fn try_push(&self, item: T) -> Result<(), T> {
        critical_section::with(|cs| {
            let mut items = self.items.borrow_ref_mut(cs);
            if items.len() >= self.capacity {
                return Err(item);
            }
            items.push_back(item)
        })
    }

    /// Take the oldest item
    pub fn try_pop(&self) -> nb::Result<T, Infallible> {
        critical_section::with(|cs| self.items.borrow_ref_mut(cs).pop_front())
            .ok_or(nb::Error::WouldBlock)
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive
    pub fn pop_timeout<P: Port + ?Sized>(&self, port: &P, timeout: HdDuration) -> HdResult<T> {
        block_on(port, timeout, || self.try_pop())
    }
}
