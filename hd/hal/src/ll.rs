//! Register-level access to the half-duplex slave peripheral

use hd_core::SCRATCH_BUFFER_SIZE;

/// Interrupt bits of the peripheral
///
/// The same mask addresses the enable, raw, clear and force registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntrMask(u32);

impl IntrMask {
    pub const NONE: Self = Self(0);
    /// A transaction has finished, whatever its kind
    pub const TRANS_DONE: Self = Self(1 << 0);
    /// Master issued RDBUF
    pub const RDBUF: Self = Self(1 << 6);
    /// Master issued WRBUF
    pub const WRBUF: Self = Self(1 << 7);
    /// Master finished RDDMA
    pub const RDDMA: Self = Self(1 << 8);
    /// Master finished WRDMA
    pub const WRDMA: Self = Self(1 << 9);
    pub const CMD9: Self = Self(1 << 12);
    pub const CMDA: Self = Self(1 << 13);
    pub const ALL: Self = Self(u32::MAX);

    pub const fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: IntrMask) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersects(self, other: IntrMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl core::ops::BitOr for IntrMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for IntrMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Operations for which the peripheral records the transfer length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LenCond(u8);

impl LenCond {
    pub const WRBUF: Self = Self(1 << 0);
    pub const RDBUF: Self = Self(1 << 1);
    pub const WRDMA: Self = Self(1 << 2);
    pub const RDDMA: Self = Self(1 << 3);
    pub const ALL: Self = Self(0x0f);

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: LenCond) -> Self {
        Self(self.0 | other.0)
    }
}

/// Register block of one SPI peripheral in half-duplex slave mode
///
/// Implementations write registers and nothing else; sequencing lives in
/// [`crate::SlaveHdHal`].
pub trait SlaveHdRegisters: Send {
    /// Reset the slave state machine and select half-duplex slave mode
    fn slave_hd_init(&mut self);

    fn set_command_bitlen(&mut self, bits: u8);

    fn set_addr_bitlen(&mut self, bits: u8);

    fn set_dummy_bitlen(&mut self, bits: u8);

    fn set_tx_lsbfirst(&mut self, lsb_first: bool);

    fn set_rx_lsbfirst(&mut self, lsb_first: bool);

    /// Select SPI mode 0-3 and the DMA or register data path
    fn set_mode(&mut self, mode: u8, use_dma: bool);

    fn enable_intr(&mut self, mask: IntrMask);

    fn disable_intr(&mut self, mask: IntrMask);

    /// Force the raw bits of `mask`
    ///
    /// Some silicon revisions ignore forcing for some bits.
    fn set_intr(&mut self, mask: IntrMask);

    fn clear_intr(&mut self, mask: IntrMask);

    /// True if any raw bit of `mask` is set
    fn get_intr(&self, mask: IntrMask) -> bool;

    fn set_len_cond(&mut self, cond: LenCond);

    fn set_seg_mode(&mut self, seg_trans: bool);

    /// Bytes received by the last master write
    fn rx_byte_len(&self) -> usize;

    /// Halt both DMA engines, dropping any linked chain
    fn dma_stop(&mut self);

    /// Reset TX DMA engine and FIFO
    fn tx_reset(&mut self);

    /// Reset RX DMA engine and FIFO
    fn rx_reset(&mut self);

    /// Start TX DMA on the chain whose head descriptor is at `head`
    fn tx_dma_start(&mut self, head: usize);

    /// Start RX DMA on the chain whose head descriptor is at `head`
    fn rx_dma_start(&mut self, head: usize);

    /// Write the shared register buffer starting at `addr`
    fn write_buffer(&mut self, addr: usize, data: &[u8]);

    /// Read the shared register buffer starting at `addr`
    fn read_buffer(&self, addr: usize, out: &mut [u8]);
}

/// True if `[addr, addr + len)` lies inside the shared buffer
pub const fn buffer_range_valid(addr: usize, len: usize) -> bool {
    match addr.checked_add(len) {
        Some(end) => end <= SCRATCH_BUFFER_SIZE,
        None => false,
    }
}
