//! Error type for platform collaborators

use core::fmt;

/// Failure of a platform service during bring-up
///
/// The driver maps these onto its own error at the call site, so only the
/// cause is carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Pins, interrupt line or channel already taken by another user
    Busy,
    /// The peripheral or interrupt matrix refused the request
    HardwareError,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "resource busy"),
            Self::HardwareError => write!(f, "hardware error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

#[cfg(feature = "defmt")]
impl defmt::Format for HalError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Busy => defmt::write!(fmt, "Busy"),
            Self::HardwareError => defmt::write!(fmt, "HardwareError"),
        }
    }
}

/// Result type for platform operations
pub type HalResult<T> = Result<T, HalError>;
