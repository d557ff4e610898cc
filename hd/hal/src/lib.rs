//! Hardware Abstraction Layer (HAL) for the half-duplex SPI slave
//!
//! Three layers live here:
//! - [`ll`]: the register block seen as a trait, one method per register
//!   operation the driver needs.
//! - [`hal`]: the stateful wrapper that maps driver events onto interrupt
//!   bits and hides silicon quirks.
//! - [`interrupt`] and [`platform`]: the collaborators the driver consumes
//!   for bus setup, interrupt registration and descriptor memory.
//!
//! With the `sim` feature, [`sim`] provides a register-level model of the
//! peripheral and a bus master to drive it from host tests.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod error;
pub mod hal;
pub mod interrupt;
pub mod ll;
pub mod platform;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export commonly used types
pub use error::{HalError, HalResult};
pub use hal::{HalConfig, SlaveHdHal};
pub use interrupt::{InterruptController, IrqHandle, IrqSource};
pub use ll::{IntrMask, LenCond, SlaveHdRegisters};
pub use platform::Platform;
