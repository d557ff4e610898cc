#![no_std]
#![forbid(unsafe_code)]

//! # HD Queue
//!
//! Bounded FIFO queues shared between task and interrupt context, and the
//! per-direction capacity credits that keep every transaction queue from
//! overflowing. Waiting is done by polling non-blocking attempts through the
//! [`Port`](hd_core::Port) until a [`Deadline`](hd_core::Deadline) expires.

pub mod credits;
pub mod queue;

pub use credits::*;
pub use queue::*;

use core::convert::Infallible;

use hd_core::{Deadline, HdDuration, HdError, HdResult, Port};

/// Poll `attempt` until it succeeds or `timeout` runs out
///
/// The port idles between attempts. A zero timeout makes exactly one
/// attempt.
pub fn block_on<T, P, F>(port: &P, timeout: HdDuration, mut attempt: F) -> HdResult<T>
where
    P: Port + ?Sized,
    F: FnMut() -> nb::Result<T, Infallible>,
{
    let deadline = Deadline::start(port, timeout);
    loop {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(never)) => match never {},
        }
        if deadline.expired(port) {
            return Err(HdError::Timeout);
        }
        port.idle();
    }
}
