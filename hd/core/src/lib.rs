#![no_std]
#![forbid(unsafe_code)]

//! # HD Core
//!
//! Core types shared by every layer of the half-duplex SPI slave engine:
//! the error taxonomy, the event model, bus and slot configuration, the
//! caller-owned transaction descriptor and the time/port abstraction used by
//! blocking queue operations.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod config;
pub mod events;
pub mod time;
pub mod trans;

pub use config::*;
pub use events::*;
pub use time::*;
pub use trans::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the engine
pub type HdResult<T> = Result<T, HdError>;

/// Errors reported by the slave engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdError {
    /// Host id does not name a peripheral usable as a half-duplex slave
    InvalidHost,
    /// DMA channel does not exist or cannot serve this host
    InvalidDmaChannel,
    /// Argument outside of its valid range
    InvalidArgument,
    /// Transfer length is zero, above the maximum, or larger than the buffer
    InvalidLength,
    /// Buffer is not reachable by the DMA engine
    NotDmaCapable,
    /// Host is already claimed by another slot
    HostInUse,
    /// DMA channel is already claimed
    DmaInUse,
    /// Bus IO setup failed
    BusSetup,
    /// No memory left for DMA descriptors
    NoDescriptorMemory,
    /// Queue depth exceeds the storage compiled into the slot
    NoQueueMemory,
    /// Interrupt handler could not be registered
    InterruptAlloc,
    /// Slot was never initialized or is already torn down
    NotInitialized,
    /// Queue did not accept or yield an item in time
    Timeout,
}

/// Coarse classification of [`HdError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected synchronously before any state was touched
    Configuration,
    /// Resource exhaustion or ownership conflict
    Resource,
    /// Expected, recoverable wait expiry
    Timeout,
}

impl HdError {
    /// Classify the error
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::InvalidHost
            | Self::InvalidDmaChannel
            | Self::InvalidArgument
            | Self::InvalidLength
            | Self::NotDmaCapable => ErrorKind::Configuration,
            Self::HostInUse
            | Self::DmaInUse
            | Self::BusSetup
            | Self::NoDescriptorMemory
            | Self::NoQueueMemory
            | Self::InterruptAlloc
            | Self::NotInitialized => ErrorKind::Resource,
            Self::Timeout => ErrorKind::Timeout,
        }
    }

    /// True for [`HdError::Timeout`]
    pub const fn is_timeout(self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for HdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HdError::InvalidHost => write!(f, "invalid host"),
            HdError::InvalidDmaChannel => write!(f, "invalid dma channel"),
            HdError::InvalidArgument => write!(f, "invalid argument"),
            HdError::InvalidLength => write!(f, "invalid transfer length"),
            HdError::NotDmaCapable => write!(f, "buffer is not dma capable"),
            HdError::HostInUse => write!(f, "host already in use"),
            HdError::DmaInUse => write!(f, "dma channel already in use"),
            HdError::BusSetup => write!(f, "bus io setup failed"),
            HdError::NoDescriptorMemory => write!(f, "out of dma descriptor memory"),
            HdError::NoQueueMemory => write!(f, "out of queue memory"),
            HdError::InterruptAlloc => write!(f, "interrupt allocation failed"),
            HdError::NotInitialized => write!(f, "slot not initialized"),
            HdError::Timeout => write!(f, "operation timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HdError {}

#[cfg(feature = "defmt")]
impl defmt::Format for HdError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            HdError::InvalidHost => defmt::write!(fmt, "InvalidHost"),
            HdError::InvalidDmaChannel => defmt::write!(fmt, "InvalidDmaChannel"),
            HdError::InvalidArgument => defmt::write!(fmt, "InvalidArgument"),
            HdError::InvalidLength => defmt::write!(fmt, "InvalidLength"),
            HdError::NotDmaCapable => defmt::write!(fmt, "NotDmaCapable"),
            HdError::HostInUse => defmt::write!(fmt, "HostInUse"),
            HdError::DmaInUse => defmt::write!(fmt, "DmaInUse"),
            HdError::BusSetup => defmt::write!(fmt, "BusSetup"),
            HdError::NoDescriptorMemory => defmt::write!(fmt, "NoDescriptorMemory"),
            HdError::NoQueueMemory => defmt::write!(fmt, "NoQueueMemory"),
            HdError::InterruptAlloc => defmt::write!(fmt, "InterruptAlloc"),
            HdError::NotInitialized => defmt::write!(fmt, "NotInitialized"),
            HdError::Timeout => defmt::write!(fmt, "Timeout"),
        }
    }
}
