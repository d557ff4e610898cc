//! Stateful HAL over the half-duplex slave registers
//!
//! Maps driver-level [`HdEvent`]s onto interrupt bits, drives the DMA
//! engines and hides the payload-done quirk: on some silicon the RDDMA and
//! WRDMA raw bits cannot be forced by software. Those events are kicked
//! through TRANS_DONE instead until the real bit has been seen latched once.

use hd_core::{mode_index, EventMask, HdEvent, SlotConfig, SCRATCH_BUFFER_SIZE};
use hd_mem::{link_chain, DmaDescriptor};

use crate::ll::{IntrMask, LenCond, SlaveHdRegisters};

/// Register-level setup derived from the slot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalConfig {
    /// SPI mode index 0-3
    pub mode: u8,
    pub command_bits: u8,
    pub address_bits: u8,
    pub dummy_bits: u8,
    pub tx_lsbfirst: bool,
    pub rx_lsbfirst: bool,
    pub dma_enabled: bool,
}

impl HalConfig {
    pub fn from_slot(slot: &SlotConfig, dma_enabled: bool) -> Self {
        Self {
            mode: mode_index(slot.mode),
            command_bits: slot.command_bits,
            address_bits: slot.address_bits,
            dummy_bits: slot.dummy_bits,
            tx_lsbfirst: slot.tx_lsbfirst(),
            rx_lsbfirst: slot.rx_lsbfirst(),
            dma_enabled,
        }
    }
}

/// Interrupt bits behind a driver event
///
/// The DMA-ready events are raised by the dispatcher itself and have no
/// hardware source.
pub const fn event_intr(event: HdEvent) -> IntrMask {
    match event {
        HdEvent::BufTx => IntrMask::RDBUF,
        HdEvent::BufRx => IntrMask::WRBUF,
        HdEvent::Send => IntrMask::RDDMA,
        HdEvent::Recv => IntrMask::WRDMA,
        HdEvent::Cmd9 => IntrMask::CMD9,
        HdEvent::CmdA => IntrMask::CMDA,
        HdEvent::Trans => IntrMask::TRANS_DONE,
        HdEvent::SendDmaReady | HdEvent::RecvDmaReady => IntrMask::NONE,
    }
}

/// Descriptor chains and register block of one slave slot
pub struct SlaveHdHal<R: SlaveHdRegisters> {
    regs: R,
    tx_descs: Option<&'static mut [DmaDescriptor]>,
    rx_descs: Option<&'static mut [DmaDescriptor]>,
    /// Payload events whose raw bit could not be forced at init
    intr_not_triggered: EventMask,
}

impl<R: SlaveHdRegisters> SlaveHdHal<R> {
    /// Wrap `regs`; without descriptor chains the slot runs register-only
    pub fn new(
        regs: R,
        tx_descs: Option<&'static mut [DmaDescriptor]>,
        rx_descs: Option<&'static mut [DmaDescriptor]>,
    ) -> Self {
        Self {
            regs,
            tx_descs,
            rx_descs,
            intr_not_triggered: EventMask::NONE,
        }
    }

    pub fn uses_dma(&self) -> bool {
        self.tx_descs.is_some() && self.rx_descs.is_some()
    }

    /// Put the peripheral into segmented half-duplex slave mode
    pub fn init(&mut self, config: &HalConfig) {
        let regs = &mut self.regs;
        regs.slave_hd_init();
        regs.set_command_bitlen(config.command_bits);
        regs.set_addr_bitlen(config.address_bits);
        regs.set_dummy_bitlen(config.dummy_bits);
        regs.set_tx_lsbfirst(config.tx_lsbfirst);
        regs.set_rx_lsbfirst(config.rx_lsbfirst);
        regs.set_mode(config.mode, config.dma_enabled);

        regs.disable_intr(IntrMask::ALL);
        regs.clear_intr(IntrMask::ALL);

        // Pre-latch both payload bits so the first enqueue per direction
        // re-enters the dispatcher as soon as its event is enabled.
        regs.set_intr(IntrMask::RDDMA | IntrMask::WRDMA);

        self.intr_not_triggered = EventMask::NONE;
        if !regs.get_intr(IntrMask::WRDMA) {
            self.intr_not_triggered |= EventMask::RECV;
        }
        if !regs.get_intr(IntrMask::RDDMA) {
            self.intr_not_triggered |= EventMask::SEND;
        }
        if !self.intr_not_triggered.is_empty() {
            log::warn!(
                "payload interrupts not software-triggerable (mask {:#x}), kicking via TRANS_DONE",
                self.intr_not_triggered.raw()
            );
            regs.set_intr(IntrMask::TRANS_DONE);
        }

        regs.set_len_cond(LenCond::ALL);
        regs.set_seg_mode(true);
    }

    /// Events that currently rely on the TRANS_DONE fallback
    pub fn untriggerable(&self) -> EventMask {
        self.intr_not_triggered
    }

    /// Arm TX on `data`
    ///
    /// In register-only mode the payload is staged in the shared buffer.
    pub fn start_tx(&mut self, data: &[u8]) {
        self.regs.clear_intr(IntrMask::RDDMA);
        self.regs.tx_reset();
        match self.tx_descs.as_deref_mut() {
            Some(descs) => {
                let (head, _) = link_chain(descs, data.as_ptr() as usize, data.len(), false);
                self.regs.tx_dma_start(head);
            }
            None => {
                let len = data.len().min(SCRATCH_BUFFER_SIZE);
                self.regs.write_buffer(0, &data[..len]);
                self.regs.tx_dma_start(0);
            }
        }
    }

    /// Arm RX into `buf`
    pub fn start_rx(&mut self, buf: &mut [u8]) {
        self.regs.clear_intr(IntrMask::WRDMA);
        self.regs.rx_reset();
        match self.rx_descs.as_deref_mut() {
            Some(descs) => {
                let (head, _) = link_chain(descs, buf.as_mut_ptr() as usize, buf.len(), true);
                self.regs.rx_dma_start(head);
            }
            None => self.regs.rx_dma_start(0),
        }
    }

    /// Bytes written by the master into the armed RX chain
    pub fn rx_received_len(&self) -> usize {
        match self.rx_descs.as_deref() {
            Some(descs) => {
                let mut total = 0;
                for desc in descs {
                    total += desc.length();
                    if desc.is_eof() {
                        break;
                    }
                }
                total
            }
            None => self.regs.rx_byte_len(),
        }
    }

    /// Complete an RX into `buf`, returning the received length
    ///
    /// Register-only mode copies the payload out of the shared buffer.
    pub fn rx_finish(&mut self, buf: &mut [u8]) -> usize {
        let len = self.rx_received_len().min(buf.len());
        if !self.uses_dma() {
            let len = len.min(SCRATCH_BUFFER_SIZE);
            self.regs.read_buffer(0, &mut buf[..len]);
            return len;
        }
        len
    }

    /// Test and clear a notification event
    pub fn check_clear_event(&mut self, event: HdEvent) -> bool {
        let intr = event_intr(event);
        if self.regs.get_intr(intr) {
            self.regs.clear_intr(intr);
            true
        } else {
            false
        }
    }

    /// Test a completion event, disabling its source if it fired
    ///
    /// The raw bit stays latched so a later [`SlaveHdHal::invoke_event`]
    /// re-enters the dispatcher.
    pub fn check_disable_event(&mut self, event: HdEvent) -> bool {
        let intr = event_intr(event);

        let missing = self.intr_not_triggered & event.mask();
        if !missing.is_empty() {
            if missing.has(HdEvent::Recv) && self.regs.get_intr(IntrMask::WRDMA) {
                self.intr_not_triggered.remove(EventMask::RECV);
                log::debug!("WRDMA seen latched, fallback dropped for RECV");
            }
            if missing.has(HdEvent::Send) && self.regs.get_intr(IntrMask::RDDMA) {
                self.intr_not_triggered.remove(EventMask::SEND);
                log::debug!("RDDMA seen latched, fallback dropped for SEND");
            }
            if self.regs.get_intr(IntrMask::TRANS_DONE) {
                self.regs.disable_intr(IntrMask::TRANS_DONE);
            }
        }

        if self.regs.get_intr(intr) {
            self.regs.disable_intr(intr);
            true
        } else {
            false
        }
    }

    pub fn enable_event(&mut self, event: HdEvent) {
        self.regs.enable_intr(event_intr(event));
    }

    /// Enable `event` and make sure the dispatcher runs for it
    pub fn invoke_event(&mut self, event: HdEvent) {
        let mut intr = event_intr(event);
        if self
            .intr_not_triggered
            .intersects(event.mask() & (EventMask::SEND | EventMask::RECV))
        {
            intr |= IntrMask::TRANS_DONE;
        }
        self.regs.enable_intr(intr);
    }

    /// Enable the notification events in `events`
    pub fn enable_events(&mut self, events: EventMask) {
        let mut intr = IntrMask::NONE;
        for event in HdEvent::NOTIFICATIONS {
            if events.has(event) {
                intr |= event_intr(event);
            }
        }
        self.regs.enable_intr(intr);
    }

    /// Quiesce the peripheral for teardown
    ///
    /// Masks and clears every interrupt source and halts both DMA engines,
    /// so no armed chain can still reach a caller buffer.
    pub fn shutdown(&mut self) {
        let regs = &mut self.regs;
        regs.disable_intr(IntrMask::ALL);
        regs.dma_stop();
        regs.tx_reset();
        regs.rx_reset();
        regs.clear_intr(IntrMask::ALL);
    }

    /// Copy out of the shared buffer; the caller bounds-checks
    pub fn read_buffer(&self, addr: usize, out: &mut [u8]) {
        self.regs.read_buffer(addr, out);
    }

    /// Copy into the shared buffer; the caller bounds-checks
    pub fn write_buffer(&mut self, addr: usize, data: &[u8]) {
        self.regs.write_buffer(addr, data);
    }

    /// Hand back the TX and RX descriptor chains
    ///
    /// The HAL is register-only afterwards.
    pub fn take_descriptors(
        &mut self,
    ) -> (
        Option<&'static mut [DmaDescriptor]>,
        Option<&'static mut [DmaDescriptor]>,
    ) {
        (self.tx_descs.take(), self.rx_descs.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;
    use alloc::boxed::Box;
    use alloc::vec;
    use hd_core::SlotFlags;

    fn chain(len: usize) -> Option<&'static mut [DmaDescriptor]> {
        Some(Box::leak(vec![DmaDescriptor::EMPTY; len].into_boxed_slice()))
    }

    fn dma_hal(bus: &SimBus) -> SlaveHdHal<crate::sim::SimRegisters> {
        let mut hal = SlaveHdHal::new(bus.registers(), chain(2), chain(2));
        hal.init(&HalConfig::from_slot(&SlotConfig::default(), true));
        hal
    }

    #[test]
    fn init_programs_slot_config() {
        let bus = SimBus::new();
        let slot = SlotConfig::builder()
            .mode(embedded_hal::spi::MODE_3)
            .phase_bits(8, 16, 4)
            .flags(SlotFlags::RXBIT_LSBFIRST)
            .build();
        let mut hal = SlaveHdHal::new(bus.registers(), chain(1), chain(1));
        hal.init(&HalConfig::from_slot(&slot, true));

        assert_eq!(bus.mode(), 3);
        assert_eq!(bus.phase_bits(), (8, 16, 4));
        assert!(bus.rx_lsbfirst());
        assert!(!bus.tx_lsbfirst());
        assert!(bus.uses_dma());
        assert!(bus.seg_mode());
        assert_eq!(bus.len_cond(), LenCond::ALL.raw());
        assert_eq!(bus.intr_enabled(), IntrMask::NONE);
        assert!(hal.untriggerable().is_empty());
        assert!(!bus.irq_pending());
    }

    #[test]
    fn invoke_kicks_through_prelatched_bit() {
        let bus = SimBus::new();
        let mut hal = dma_hal(&bus);

        hal.invoke_event(HdEvent::Send);
        assert!(bus.irq_pending());

        let data = [0xa5u8; 10];
        hal.start_tx(&data);
        hal.enable_event(HdEvent::Send);
        assert!(!bus.irq_pending());
        assert!(!hal.check_disable_event(HdEvent::Send));

        assert_eq!(bus.master_read_dma(10).as_deref(), Some(&data[..]));
        assert!(bus.irq_pending());
        assert!(hal.check_disable_event(HdEvent::Send));
        assert!(!bus.irq_pending());
    }

    #[test]
    fn untriggerable_events_fall_back_to_trans_done() {
        let bus = SimBus::new().with_non_writable(IntrMask::RDDMA);
        let mut hal = dma_hal(&bus);
        assert_eq!(hal.untriggerable(), EventMask::SEND);

        hal.invoke_event(HdEvent::Send);
        assert!(bus.irq_pending());
        assert!(bus.intr_enabled().intersects(IntrMask::TRANS_DONE));

        let data = [1u8, 2, 3];
        hal.start_tx(&data);
        hal.enable_event(HdEvent::Send);
        // Kick still pending until the in-flight check runs
        assert!(!hal.check_disable_event(HdEvent::Send));
        assert!(!bus.irq_pending());

        bus.master_read_dma(3);
        assert!(hal.check_disable_event(HdEvent::Send));
        assert!(hal.untriggerable().is_empty());
    }

    #[test]
    fn rx_length_comes_from_the_chain() {
        let bus = SimBus::new();
        let mut hal = dma_hal(&bus);
        let mut buf = [0u8; 32];

        hal.start_rx(&mut buf);
        assert_eq!(bus.master_write_dma(&[7u8; 20]), Some(20));
        assert!(hal.check_disable_event(HdEvent::Recv));
        assert_eq!(hal.rx_finish(&mut buf), 20);
        assert_eq!(&buf[..20], &[7u8; 20]);
        assert_eq!(buf[20], 0);
    }

    #[test]
    fn register_only_mode_uses_the_shared_buffer() {
        let bus = SimBus::new();
        let mut hal = SlaveHdHal::new(bus.registers(), None, None);
        hal.init(&HalConfig::from_slot(&SlotConfig::default(), false));
        assert!(!hal.uses_dma());

        hal.start_tx(&[4u8, 5, 6]);
        assert_eq!(bus.master_read_dma(3).as_deref(), Some(&[4u8, 5, 6][..]));

        let mut buf = [0u8; 8];
        hal.start_rx(&mut buf);
        assert_eq!(bus.master_write_dma(&[9u8, 9]), Some(2));
        assert!(hal.check_disable_event(HdEvent::Recv));
        assert_eq!(hal.rx_finish(&mut buf), 2);
        assert_eq!(&buf[..3], &[9, 9, 0]);
    }

    #[test]
    fn shutdown_disarms_both_directions() {
        let bus = SimBus::new();
        let mut hal = dma_hal(&bus);
        let data = [3u8; 4];
        let mut buf = [0u8; 4];
        hal.start_tx(&data);
        hal.start_rx(&mut buf);
        hal.enable_event(HdEvent::Recv);
        assert!(bus.tx_armed() && bus.rx_armed());

        hal.shutdown();
        assert!(!bus.tx_armed());
        assert!(!bus.rx_armed());
        assert_eq!(bus.intr_enabled(), IntrMask::NONE);
        assert_eq!(bus.master_write_dma(&[1, 2]), None);
        assert_eq!(buf, [0; 4]);

        let (tx, rx) = hal.take_descriptors();
        assert!(tx.is_some() && rx.is_some());
        assert!(!hal.uses_dma());
    }

    #[test]
    fn notifications_are_cleared_on_check() {
        let bus = SimBus::new();
        let mut hal = dma_hal(&bus);
        hal.enable_events(EventMask::CMD9 | EventMask::BUF_RX);

        bus.master_cmd9();
        assert!(bus.irq_pending());
        assert!(hal.check_clear_event(HdEvent::Cmd9));
        assert!(!hal.check_clear_event(HdEvent::Cmd9));
        assert!(!hal.check_clear_event(HdEvent::CmdA));

        bus.master_write_buffer(4, &[1, 2]);
        assert!(hal.check_clear_event(HdEvent::BufRx));
        let mut out = [0u8; 2];
        hal.read_buffer(4, &mut out);
        assert_eq!(out, [1, 2]);
    }
}
