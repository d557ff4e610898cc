//! Interrupt registration

use hd_core::HostId;

use crate::error::HalResult;

/// Interrupt line the driver needs serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqSource {
    /// Peripheral interrupt of an SPI host
    Peripheral(HostId),
    /// Interrupt of a DMA channel
    Dma(u8),
}

#[cfg(feature = "defmt")]
impl defmt::Format for IrqSource {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Peripheral(host) => defmt::write!(fmt, "Peripheral({})", host),
            Self::Dma(ch) => defmt::write!(fmt, "Dma({})", ch),
        }
    }
}

/// Token for a registered interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqHandle(pub u32);

/// Interrupt controller abstraction
///
/// Every allocated line must be routed to the slot's
/// `handle_interrupt` until it is freed.
pub trait InterruptController: Send + Sync {
    /// Register the dispatcher on `source`
    fn intr_alloc(&mut self, source: IrqSource) -> HalResult<IrqHandle>;

    /// Unregister a line obtained from [`InterruptController::intr_alloc`]
    fn intr_free(&mut self, handle: IrqHandle);
}
