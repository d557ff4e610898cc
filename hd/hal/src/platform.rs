//! Platform services consumed by the slave driver

use hd_core::{BusConfig, HostId};
use hd_mem::DmaMemory;

use crate::error::HalResult;
use crate::interrupt::InterruptController;
use crate::ll::SlaveHdRegisters;

/// Everything the driver needs from the chip beyond the register block:
/// bus IO routing, interrupt registration and descriptor memory
pub trait Platform: InterruptController + DmaMemory {
    /// Register block handed out by [`Platform::bus_initialize`]
    type Regs: SlaveHdRegisters;

    /// Route the bus pins of `host` and hand out its register block
    ///
    /// `dma` is the resolved DMA channel, `None` in register-only mode.
    fn bus_initialize(
        &mut self,
        host: HostId,
        bus: &BusConfig,
        dma: Option<u8>,
    ) -> HalResult<Self::Regs>;

    /// Undo [`Platform::bus_initialize`]
    ///
    /// The register block handed out for `host` must no longer be driven.
    fn bus_free(&mut self, host: HostId);
}
