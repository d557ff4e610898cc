//! Register-level simulator of the half-duplex slave
//!
//! [`SimBus`] owns the simulated peripheral and plays the bus master.
//! [`SimRegisters`] is the register block the driver writes, and
//! [`SimPlatform`] hands it out together with descriptor memory and
//! interrupt lines while keeping a ledger of every acquire and release.
//!
//! The interrupt line is level-triggered: it is pending while any raw bit is
//! also enabled. Tests call the dispatcher while [`SimBus::irq_pending`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;
use core::ptr;

use spin::Mutex;

use hd_core::{BusConfig, HostId, SCRATCH_BUFFER_SIZE};
use hd_mem::{DescriptorPool, DmaDescriptor, DmaMemory};

use crate::error::{HalError, HalResult};
use crate::interrupt::{InterruptController, IrqHandle, IrqSource};
use crate::ll::{IntrMask, LenCond, SlaveHdRegisters};
use crate::platform::Platform;

/// Descriptor blocks available to a [`SimPlatform`]
pub const SIM_POOL_BLOCKS: usize = 8;

/// Descriptors per block, enough for four full descriptors per direction
pub const SIM_BLOCK_LEN: usize = 4;

#[derive(Debug)]
struct SimState {
    raw: u32,
    enabled: u32,
    non_writable: u32,
    scratch: [u8; SCRATCH_BUFFER_SIZE],
    mode: u8,
    use_dma: bool,
    command_bits: u8,
    address_bits: u8,
    dummy_bits: u8,
    tx_lsbfirst: bool,
    rx_lsbfirst: bool,
    len_cond: u8,
    seg_mode: bool,
    /// Head of the armed TX chain (`0` in register-only mode)
    tx_armed: Option<usize>,
    rx_armed: Option<usize>,
    rx_len: usize,
    tx_starts: usize,
    rx_starts: usize,
    overlap_violations: usize,
}

impl SimState {
    fn new() -> Self {
        Self {
            raw: 0,
            enabled: 0,
            non_writable: 0,
            scratch: [0; SCRATCH_BUFFER_SIZE],
            mode: 0,
            use_dma: false,
            command_bits: 0,
            address_bits: 0,
            dummy_bits: 0,
            tx_lsbfirst: false,
            rx_lsbfirst: false,
            len_cond: 0,
            seg_mode: false,
            tx_armed: None,
            rx_armed: None,
            rx_len: 0,
            tx_starts: 0,
            rx_starts: 0,
            overlap_violations: 0,
        }
    }

    /// Hardware-side latch, ignores writability
    fn latch(&mut self, mask: IntrMask) {
        self.raw |= mask.raw() | IntrMask::TRANS_DONE.raw();
    }
}

/// Simulated peripheral and bus master
#[derive(Clone)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    /// Make `mask` immune to software forcing, as on affected silicon
    pub fn with_non_writable(self, mask: IntrMask) -> Self {
        self.state.lock().non_writable = mask.raw();
        self
    }

    /// Register block driving this bus
    pub fn registers(&self) -> SimRegisters {
        SimRegisters {
            state: Arc::clone(&self.state),
        }
    }

    /// Master issues RDDMA for up to `len` bytes
    ///
    /// Returns `None` if no TX is armed.
    pub fn master_read_dma(&self, len: usize) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let head = state.tx_armed.take()?;
        let data = if state.use_dma {
            read_chain(head, len)
        } else {
            state.scratch[..len.min(SCRATCH_BUFFER_SIZE)].to_vec()
        };
        state.latch(IntrMask::RDDMA);
        Some(data)
    }

    /// Master issues WRDMA carrying `data`
    ///
    /// Returns the number of bytes accepted, `None` if no RX is armed.
    pub fn master_write_dma(&self, data: &[u8]) -> Option<usize> {
        let mut state = self.state.lock();
        let head = state.rx_armed.take()?;
        let written = if state.use_dma {
            write_chain(head, data)
        } else {
            let len = data.len().min(SCRATCH_BUFFER_SIZE);
            state.scratch[..len].copy_from_slice(&data[..len]);
            len
        };
        state.rx_len = written;
        state.latch(IntrMask::WRDMA);
        Some(written)
    }

    /// Master issues WRBUF at `addr`
    pub fn master_write_buffer(&self, addr: usize, data: &[u8]) {
        let mut state = self.state.lock();
        let start = addr.min(SCRATCH_BUFFER_SIZE);
        let end = (addr + data.len()).min(SCRATCH_BUFFER_SIZE);
        state.scratch[start..end].copy_from_slice(&data[..end - start]);
        state.latch(IntrMask::WRBUF);
    }

    /// Master issues RDBUF at `addr`
    pub fn master_read_buffer(&self, addr: usize, len: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        let start = addr.min(SCRATCH_BUFFER_SIZE);
        let end = (addr + len).min(SCRATCH_BUFFER_SIZE);
        let data = state.scratch[start..end].to_vec();
        state.latch(IntrMask::RDBUF);
        data
    }

    pub fn master_cmd9(&self) {
        self.state.lock().latch(IntrMask::CMD9);
    }

    pub fn master_cmda(&self) {
        self.state.lock().latch(IntrMask::CMDA);
    }

    /// True while the interrupt line is asserted
    pub fn irq_pending(&self) -> bool {
        let state = self.state.lock();
        state.raw & state.enabled != 0
    }

    pub fn intr_raw(&self) -> IntrMask {
        IntrMask::from_raw(self.state.lock().raw)
    }

    pub fn intr_enabled(&self) -> IntrMask {
        IntrMask::from_raw(self.state.lock().enabled)
    }

    pub fn tx_armed(&self) -> bool {
        self.state.lock().tx_armed.is_some()
    }

    pub fn rx_armed(&self) -> bool {
        self.state.lock().rx_armed.is_some()
    }

    pub fn tx_starts(&self) -> usize {
        self.state.lock().tx_starts
    }

    pub fn rx_starts(&self) -> usize {
        self.state.lock().rx_starts
    }

    /// DMA starts issued while the same direction was still armed
    pub fn overlap_violations(&self) -> usize {
        self.state.lock().overlap_violations
    }

    pub fn mode(&self) -> u8 {
        self.state.lock().mode
    }

    pub fn uses_dma(&self) -> bool {
        self.state.lock().use_dma
    }

    /// Command, address and dummy bit lengths
    pub fn phase_bits(&self) -> (u8, u8, u8) {
        let state = self.state.lock();
        (state.command_bits, state.address_bits, state.dummy_bits)
    }

    pub fn tx_lsbfirst(&self) -> bool {
        self.state.lock().tx_lsbfirst
    }

    pub fn rx_lsbfirst(&self) -> bool {
        self.state.lock().rx_lsbfirst
    }

    pub fn len_cond(&self) -> u8 {
        self.state.lock().len_cond
    }

    pub fn seg_mode(&self) -> bool {
        self.state.lock().seg_mode
    }
}

fn read_chain(head: usize, max: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut addr = head;
    while addr != 0 && out.len() < max {
        // SAFETY: `addr` comes from a chain linked by the HAL over descriptor
        // and buffer memory that stays borrowed until the TX completes.
        let desc = unsafe { ptr::read_volatile(addr as *const DmaDescriptor) };
        let take = desc.length().min(max - out.len());
        let data = unsafe { core::slice::from_raw_parts(desc.buffer() as *const u8, take) };
        out.extend_from_slice(data);
        if desc.is_eof() {
            break;
        }
        addr = desc.next();
    }
    out
}

fn write_chain(head: usize, data: &[u8]) -> usize {
    let mut written = 0;
    let mut addr = head;
    let mut last = 0;
    while addr != 0 {
        let slot = addr as *mut DmaDescriptor;
        // SAFETY: see `read_chain`; the RX buffer is exclusively lent to
        // the engine while armed.
        let mut desc = unsafe { ptr::read_volatile(slot) };
        let take = desc.size().min(data.len() - written);
        unsafe {
            ptr::copy_nonoverlapping(data[written..].as_ptr(), desc.buffer() as *mut u8, take);
        }
        desc.set_length(take);
        desc.set_eof(false);
        unsafe { ptr::write_volatile(slot, desc) };
        written += take;
        last = addr;
        if written == data.len() {
            break;
        }
        addr = desc.next();
    }
    if last != 0 {
        let slot = last as *mut DmaDescriptor;
        unsafe {
            let mut desc = ptr::read_volatile(slot);
            desc.set_eof(true);
            ptr::write_volatile(slot, desc);
        }
    }
    written
}

/// Register block of a [`SimBus`]
pub struct SimRegisters {
    state: Arc<Mutex<SimState>>,
}

impl SlaveHdRegisters for SimRegisters {
    fn slave_hd_init(&mut self) {
        let mut state = self.state.lock();
        state.tx_armed = None;
        state.rx_armed = None;
        state.rx_len = 0;
    }

    fn set_command_bitlen(&mut self, bits: u8) {
        self.state.lock().command_bits = bits;
    }

    fn set_addr_bitlen(&mut self, bits: u8) {
        self.state.lock().address_bits = bits;
    }

    fn set_dummy_bitlen(&mut self, bits: u8) {
        self.state.lock().dummy_bits = bits;
    }

    fn set_tx_lsbfirst(&mut self, lsb_first: bool) {
        self.state.lock().tx_lsbfirst = lsb_first;
    }

    fn set_rx_lsbfirst(&mut self, lsb_first: bool) {
        self.state.lock().rx_lsbfirst = lsb_first;
    }

    fn set_mode(&mut self, mode: u8, use_dma: bool) {
        let mut state = self.state.lock();
        state.mode = mode;
        state.use_dma = use_dma;
    }

    fn enable_intr(&mut self, mask: IntrMask) {
        self.state.lock().enabled |= mask.raw();
    }

    fn disable_intr(&mut self, mask: IntrMask) {
        self.state.lock().enabled &= !mask.raw();
    }

    fn set_intr(&mut self, mask: IntrMask) {
        let mut state = self.state.lock();
        let writable = mask.raw() & !state.non_writable;
        state.raw |= writable;
    }

    fn clear_intr(&mut self, mask: IntrMask) {
        self.state.lock().raw &= !mask.raw();
    }

    fn get_intr(&self, mask: IntrMask) -> bool {
        self.state.lock().raw & mask.raw() != 0
    }

    fn set_len_cond(&mut self, cond: LenCond) {
        self.state.lock().len_cond = cond.raw();
    }

    fn set_seg_mode(&mut self, seg_trans: bool) {
        self.state.lock().seg_mode = seg_trans;
    }

    fn rx_byte_len(&self) -> usize {
        self.state.lock().rx_len
    }

    fn dma_stop(&mut self) {
        let mut state = self.state.lock();
        state.tx_armed = None;
        state.rx_armed = None;
    }

    fn tx_reset(&mut self) {}

    fn rx_reset(&mut self) {
        self.state.lock().rx_len = 0;
    }

    fn tx_dma_start(&mut self, head: usize) {
        let mut state = self.state.lock();
        if state.tx_armed.is_some() {
            state.overlap_violations += 1;
        }
        state.tx_armed = Some(head);
        state.tx_starts += 1;
    }

    fn rx_dma_start(&mut self, head: usize) {
        let mut state = self.state.lock();
        if state.rx_armed.is_some() {
            state.overlap_violations += 1;
        }
        state.rx_armed = Some(head);
        state.rx_starts += 1;
    }

    fn write_buffer(&mut self, addr: usize, data: &[u8]) {
        let mut state = self.state.lock();
        state.scratch[addr..addr + data.len()].copy_from_slice(data);
    }

    fn read_buffer(&self, addr: usize, out: &mut [u8]) {
        let state = self.state.lock();
        out.copy_from_slice(&state.scratch[addr..addr + out.len()]);
    }
}

/// Platform step to fail on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFailure {
    BusInit,
    /// Fail the n-th descriptor allocation (0 = TX chain)
    Descriptors(usize),
    /// Fail the n-th interrupt registration (0 = peripheral line)
    Interrupt(usize),
}

/// Acquire/release counters of a [`SimPlatform`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub bus_inits: usize,
    pub bus_frees: usize,
    pub irq_allocs: usize,
    pub irq_frees: usize,
    pub desc_allocs: usize,
    pub desc_frees: usize,
    /// Releases of something not currently held
    pub double_frees: usize,
}

impl LedgerCounts {
    /// Every acquired resource was released exactly once
    pub fn is_balanced(&self) -> bool {
        self.bus_inits == self.bus_frees
            && self.irq_allocs == self.irq_frees
            && self.desc_allocs == self.desc_frees
            && self.double_frees == 0
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    counts: LedgerCounts,
    live_irqs: Vec<u32>,
    live_descs: Vec<usize>,
    sources: Vec<IrqSource>,
}

/// Shared view of a [`SimPlatform`]'s ledger, usable after the platform
/// moved into a driver or was dropped by a failed init
#[derive(Clone, Default)]
pub struct SimLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl SimLedger {
    pub fn counts(&self) -> LedgerCounts {
        self.inner.lock().counts
    }

    /// Sources registered so far, in order
    pub fn irq_sources(&self) -> Vec<IrqSource> {
        self.inner.lock().sources.clone()
    }
}

/// Platform services backed by a [`SimBus`]
pub struct SimPlatform {
    bus: SimBus,
    pool: DescriptorPool<SIM_POOL_BLOCKS>,
    ledger: SimLedger,
    fail: Option<SimFailure>,
    desc_calls: usize,
    irq_calls: usize,
    next_irq: u32,
}

impl SimPlatform {
    pub fn new(bus: &SimBus) -> Self {
        let storage = vec![DmaDescriptor::EMPTY; SIM_POOL_BLOCKS * SIM_BLOCK_LEN];
        let storage = Box::leak(storage.into_boxed_slice());
        Self {
            bus: bus.clone(),
            pool: DescriptorPool::new(storage, SIM_BLOCK_LEN),
            ledger: SimLedger::default(),
            fail: None,
            desc_calls: 0,
            irq_calls: 0,
            next_irq: 1,
        }
    }

    /// Fail the given step
    pub fn fail_at(mut self, failure: SimFailure) -> Self {
        self.fail = Some(failure);
        self
    }

    /// Only buffers inside `region` count as DMA-capable
    pub fn with_dma_region(mut self, region: Range<usize>) -> Self {
        self.pool = self.pool.with_dma_region(region);
        self
    }

    pub fn ledger(&self) -> SimLedger {
        self.ledger.clone()
    }

    pub fn bus(&self) -> &SimBus {
        &self.bus
    }
}

impl InterruptController for SimPlatform {
    fn intr_alloc(&mut self, source: IrqSource) -> HalResult<IrqHandle> {
        let call = self.irq_calls;
        self.irq_calls += 1;
        if self.fail == Some(SimFailure::Interrupt(call)) {
            return Err(HalError::Busy);
        }
        let handle = IrqHandle(self.next_irq);
        self.next_irq += 1;
        let mut ledger = self.ledger.inner.lock();
        ledger.counts.irq_allocs += 1;
        ledger.live_irqs.push(handle.0);
        ledger.sources.push(source);
        Ok(handle)
    }

    fn intr_free(&mut self, handle: IrqHandle) {
        let mut ledger = self.ledger.inner.lock();
        match ledger.live_irqs.iter().position(|&h| h == handle.0) {
            Some(index) => {
                ledger.live_irqs.swap_remove(index);
                ledger.counts.irq_frees += 1;
            }
            None => ledger.counts.double_frees += 1,
        }
    }
}

impl DmaMemory for SimPlatform {
    fn alloc_descriptors(&mut self, count: usize) -> Option<&'static mut [DmaDescriptor]> {
        let call = self.desc_calls;
        self.desc_calls += 1;
        if self.fail == Some(SimFailure::Descriptors(call)) {
            return None;
        }
        let block = self.pool.alloc_descriptors(count)?;
        let mut ledger = self.ledger.inner.lock();
        ledger.counts.desc_allocs += 1;
        ledger.live_descs.push(block.as_ptr() as usize);
        Some(block)
    }

    fn free_descriptors(&mut self, descs: &'static mut [DmaDescriptor]) {
        {
            let mut ledger = self.ledger.inner.lock();
            let addr = descs.as_ptr() as usize;
            match ledger.live_descs.iter().position(|&a| a == addr) {
                Some(index) => {
                    ledger.live_descs.swap_remove(index);
                    ledger.counts.desc_frees += 1;
                }
                None => {
                    ledger.counts.double_frees += 1;
                    return;
                }
            }
        }
        self.pool.free_descriptors(descs);
    }

    fn is_dma_capable(&self, addr: usize, len: usize) -> bool {
        self.pool.is_dma_capable(addr, len)
    }
}

impl Platform for SimPlatform {
    type Regs = SimRegisters;

    fn bus_initialize(
        &mut self,
        _host: HostId,
        _bus: &BusConfig,
        _dma: Option<u8>,
    ) -> HalResult<SimRegisters> {
        if self.fail == Some(SimFailure::BusInit) {
            return Err(HalError::HardwareError);
        }
        self.ledger.inner.lock().counts.bus_inits += 1;
        Ok(self.bus.registers())
    }

    fn bus_free(&mut self, _host: HostId) {
        self.ledger.inner.lock().counts.bus_frees += 1;
    }
}
