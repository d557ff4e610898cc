//! Slave slot: lifecycle and the task-facing queue operations

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Vec;

use hd_core::{
    BusConfig, Direction, EventMask, HdDuration, HdError, HdResult, HostId, Port, SlotConfig,
    TransRef, Transaction, DMA_DESCRIPTOR_BUFFER_MAX, SCRATCH_BUFFER_SIZE,
};
use hd_hal::ll::buffer_range_valid;
use hd_hal::{HalConfig, IrqHandle, IrqSource, Platform, SlaveHdHal, SlaveHdRegisters};
use hd_mem::{descriptor_count, DmaDescriptor};
use hd_queue::{Credits, HdQueue};

use crate::registry::with_claims;
use crate::sink::EventSink;

/// State touched from both task and interrupt context
pub(crate) struct Shared<'a, R: SlaveHdRegisters> {
    pub(crate) hal: SlaveHdHal<R>,
    pub(crate) tx_cur: Option<TransRef<'a>>,
    pub(crate) rx_cur: Option<TransRef<'a>>,
}

impl<'a, R: SlaveHdRegisters> Shared<'a, R> {
    pub(crate) fn current(&self, dir: Direction) -> Option<&TransRef<'a>> {
        match dir {
            Direction::Tx => self.tx_cur.as_ref(),
            Direction::Rx => self.rx_cur.as_ref(),
        }
    }

    pub(crate) fn current_mut(&mut self, dir: Direction) -> &mut Option<TransRef<'a>> {
        match dir {
            Direction::Tx => &mut self.tx_cur,
            Direction::Rx => &mut self.rx_cur,
        }
    }
}

/// A transaction the driver refused, handed back with the reason
pub struct QueueError<'a> {
    error: HdError,
    trans: TransRef<'a>,
}

impl<'a> QueueError<'a> {
    fn new(error: HdError, trans: TransRef<'a>) -> Self {
        Self { error, trans }
    }

    pub fn error(&self) -> HdError {
        self.error
    }

    pub fn into_transaction(self) -> TransRef<'a> {
        self.trans
    }

    pub fn into_parts(self) -> (HdError, TransRef<'a>) {
        (self.error, self.trans)
    }
}

impl fmt::Debug for QueueError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueError")
            .field("error", &self.error)
            .field("len", &self.trans.len())
            .field("arg", &self.trans.arg())
            .finish()
    }
}

impl fmt::Display for QueueError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction not queued: {}", self.error)
    }
}

impl From<QueueError<'_>> for HdError {
    fn from(err: QueueError<'_>) -> Self {
        err.error
    }
}

/// Everything acquired from the registry and the platform, released in
/// reverse by [`Resources::release`]. Each field is taken exactly once, so
/// releasing twice is a no-op.
struct Resources {
    host: HostId,
    host_claimed: bool,
    dma: Option<u8>,
    bus_up: bool,
    tx_descs: Option<&'static mut [DmaDescriptor]>,
    rx_descs: Option<&'static mut [DmaDescriptor]>,
    irqs: Vec<IrqHandle, 2>,
}

impl Resources {
    fn new(host: HostId) -> Self {
        Self {
            host,
            host_claimed: false,
            dma: None,
            bus_up: false,
            tx_descs: None,
            rx_descs: None,
            irqs: Vec::new(),
        }
    }

    fn take_descriptors<R: SlaveHdRegisters>(&mut self, hal: &mut SlaveHdHal<R>) {
        let (tx_descs, rx_descs) = hal.take_descriptors();
        self.tx_descs = tx_descs;
        self.rx_descs = rx_descs;
    }

    fn release<P: Platform>(&mut self, platform: &mut P) {
        while let Some(irq) = self.irqs.pop() {
            platform.intr_free(irq);
        }
        if let Some(descs) = self.rx_descs.take() {
            platform.free_descriptors(descs);
        }
        if let Some(descs) = self.tx_descs.take() {
            platform.free_descriptors(descs);
        }
        if core::mem::replace(&mut self.bus_up, false) {
            platform.bus_free(self.host);
        }
        let host = self.host;
        let dma = self.dma.take();
        let host_claimed = core::mem::replace(&mut self.host_claimed, false);
        with_claims(|claims| {
            if let Some(channel) = dma {
                claims.release_dma(channel);
            }
            if host_claimed {
                claims.release_host(host);
            }
        });
    }
}

/// Half-duplex SPI slave bound to one host
///
/// `DEPTH` is the storage reserved per queue; the configured
/// [`SlotConfig::queue_size`] may not exceed it.
pub struct SlaveHd<'a, P, S, T, const DEPTH: usize = 8>
where
    P: Platform,
    S: EventSink<'a>,
    T: Port,
{
    pub(crate) host: HostId,
    pub(crate) dma_chan: Option<u8>,
    pub(crate) max_transfer_sz: usize,
    pub(crate) subscriptions: EventMask,
    pub(crate) shared: Mutex<RefCell<Shared<'a, P::Regs>>>,
    pub(crate) sink: spin::Mutex<S>,
    pub(crate) tx_pending: HdQueue<TransRef<'a>, DEPTH>,
    pub(crate) tx_done: HdQueue<TransRef<'a>, DEPTH>,
    pub(crate) rx_pending: HdQueue<TransRef<'a>, DEPTH>,
    pub(crate) rx_done: HdQueue<TransRef<'a>, DEPTH>,
    pub(crate) tx_credits: Credits,
    pub(crate) rx_credits: Credits,
    pub(crate) port: T,
    /// `None` once torn down
    platform: Option<P>,
    res: Resources,
}

impl<'a, P, S, T, const DEPTH: usize> SlaveHd<'a, P, S, T, DEPTH>
where
    P: Platform,
    S: EventSink<'a>,
    T: Port,
{
    /// Claim `host` and bring up the slave
    ///
    /// On any failure every resource acquired so far is released again and
    /// the platform is dropped.
    pub fn init(
        host: HostId,
        bus: &BusConfig,
        slot: &SlotConfig,
        mut platform: P,
        sink: S,
        port: T,
    ) -> HdResult<Self> {
        if !host.is_slave_capable() {
            return Err(HdError::InvalidHost);
        }
        let dma = slot.dma_chan.resolve(host)?;
        if slot.queue_size == 0 {
            return Err(HdError::InvalidArgument);
        }

        let mut res = Resources::new(host);
        match Self::bring_up(&mut res, &mut platform, bus, slot, dma, &sink) {
            Ok((hal, queues, max_transfer_sz)) => {
                let subscriptions = sink.subscriptions();
                let [tx_pending, tx_done, rx_pending, rx_done] = queues;
                log::info!(
                    "{} slave up: dma {:?}, max transfer {} bytes, queue depth {}",
                    host,
                    dma,
                    max_transfer_sz,
                    slot.queue_size
                );
                Ok(Self {
                    host,
                    dma_chan: dma,
                    max_transfer_sz,
                    subscriptions,
                    shared: Mutex::new(RefCell::new(Shared {
                        hal,
                        tx_cur: None,
                        rx_cur: None,
                    })),
                    sink: spin::Mutex::new(sink),
                    tx_pending,
                    tx_done,
                    rx_pending,
                    rx_done,
                    tx_credits: Credits::new(slot.queue_size),
                    rx_credits: Credits::new(slot.queue_size),
                    port,
                    platform: Some(platform),
                    res,
                })
            }
            Err(error) => {
                log::error!("{} slave init failed: {}", host, error);
                res.release(&mut platform);
                Err(error)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn bring_up(
        res: &mut Resources,
        platform: &mut P,
        bus: &BusConfig,
        slot: &SlotConfig,
        dma: Option<u8>,
        sink: &S,
    ) -> HdResult<(SlaveHdHal<P::Regs>, [HdQueue<TransRef<'a>, DEPTH>; 4], usize)> {
        let host = res.host;
        with_claims(|claims| claims.claim_host(host))?;
        res.host_claimed = true;
        if let Some(channel) = dma {
            with_claims(|claims| claims.claim_dma(channel))?;
            res.dma = Some(channel);
        }

        let regs = platform.bus_initialize(host, bus, dma).map_err(|err| {
            log::warn!("{} bus setup failed: {}", host, err);
            HdError::BusSetup
        })?;
        res.bus_up = true;

        let max_transfer_sz = match dma {
            Some(_) => {
                let count = descriptor_count(bus.max_transfer_sz);
                res.tx_descs = Some(
                    platform
                        .alloc_descriptors(count)
                        .ok_or(HdError::NoDescriptorMemory)?,
                );
                res.rx_descs = Some(
                    platform
                        .alloc_descriptors(count)
                        .ok_or(HdError::NoDescriptorMemory)?,
                );
                count * DMA_DESCRIPTOR_BUFFER_MAX
            }
            None => SCRATCH_BUFFER_SIZE,
        };

        let queues = [
            HdQueue::with_capacity(slot.queue_size)?,
            HdQueue::with_capacity(slot.queue_size)?,
            HdQueue::with_capacity(slot.queue_size)?,
            HdQueue::with_capacity(slot.queue_size)?,
        ];

        let mut hal = SlaveHdHal::new(regs, res.tx_descs.take(), res.rx_descs.take());
        hal.init(&HalConfig::from_slot(slot, dma.is_some()));

        let mut sources: Vec<IrqSource, 2> = Vec::new();
        let _ = sources.push(IrqSource::Peripheral(host));
        if let Some(channel) = dma {
            let _ = sources.push(IrqSource::Dma(channel));
        }
        for source in sources {
            match platform.intr_alloc(source) {
                Ok(handle) => {
                    let _ = res.irqs.push(handle);
                }
                Err(err) => {
                    log::warn!("{} interrupt {:?} not registered: {}", host, source, err);
                    hal.shutdown();
                    res.take_descriptors(&mut hal);
                    return Err(HdError::InterruptAlloc);
                }
            }
        }

        hal.enable_events(sink.subscriptions());
        Ok((hal, queues, max_transfer_sz))
    }

    /// Tear the slave down, handing back the platform
    ///
    /// Both DMA engines are halted first. Transactions still pending, in
    /// flight or uncollected are abandoned. Dropping the slave performs the
    /// same teardown.
    pub fn deinit(mut self) -> HdResult<P> {
        if !crate::registry::is_host_claimed(self.host) {
            return Err(HdError::NotInitialized);
        }
        self.teardown().ok_or(HdError::NotInitialized)
    }

    fn teardown(&mut self) -> Option<P> {
        let mut platform = self.platform.take()?;
        let shared = self.shared.get_mut().get_mut();
        shared.hal.shutdown();
        shared.tx_cur = None;
        shared.rx_cur = None;
        self.res.take_descriptors(&mut shared.hal);
        self.res.release(&mut platform);
        log::info!("{} slave down", self.host);
        Some(platform)
    }

    /// Queue `trans` for transfer in direction `dir`
    ///
    /// Waits up to `timeout` while the direction already holds
    /// `queue_size` transactions that have not been collected. A refused
    /// transaction is handed back inside the error.
    pub fn queue_transaction(
        &self,
        dir: Direction,
        trans: TransRef<'a>,
        timeout: HdDuration,
    ) -> Result<(), QueueError<'a>> {
        if let Err(error) = self.validate(trans) {
            return Err(QueueError::new(error, trans));
        }

        let credits = self.credits(dir);
        if let Err(error) = credits.take_timeout(&self.port, timeout) {
            return Err(QueueError::new(error, trans));
        }
        if let Err(trans) = self.pending(dir).try_push(trans) {
            credits.give();
            return Err(QueueError::new(HdError::Timeout, trans));
        }

        critical_section::with(|cs| {
            self.shared
                .borrow_ref_mut(cs)
                .hal
                .invoke_event(dir.completion_event());
        });
        Ok(())
    }

    /// Collect the oldest finished transaction of direction `dir`
    pub fn get_transaction_result(
        &self,
        dir: Direction,
        timeout: HdDuration,
    ) -> HdResult<TransRef<'a>> {
        let trans = self.completed(dir).pop_timeout(&self.port, timeout)?;
        self.credits(dir).give();
        Ok(trans)
    }

    /// Read `out.len()` bytes of the shared buffer starting at `addr`
    pub fn read_buffer(&self, addr: usize, out: &mut [u8]) -> HdResult<()> {
        if !buffer_range_valid(addr, out.len()) {
            return Err(HdError::InvalidArgument);
        }
        critical_section::with(|cs| self.shared.borrow_ref(cs).hal.read_buffer(addr, out));
        Ok(())
    }

    /// Write `data` into the shared buffer starting at `addr`
    pub fn write_buffer(&self, addr: usize, data: &[u8]) -> HdResult<()> {
        if !buffer_range_valid(addr, data.len()) {
            return Err(HdError::InvalidArgument);
        }
        critical_section::with(|cs| {
            self.shared
                .borrow_ref_mut(cs)
                .hal
                .write_buffer(addr, data)
        });
        Ok(())
    }

    /// Run `f` on the event sink with interrupts masked
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        critical_section::with(|_| f(&mut self.sink.lock()))
    }

    /// Port the slot waits and yields through
    pub fn port(&self) -> &T {
        &self.port
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// DMA channel in use, `None` in register-only mode
    pub fn dma_channel(&self) -> Option<u8> {
        self.dma_chan
    }

    pub fn uses_dma(&self) -> bool {
        self.dma_chan.is_some()
    }

    /// Largest accepted transaction length
    pub fn max_transfer_size(&self) -> usize {
        self.max_transfer_sz
    }

    pub fn pending_len(&self, dir: Direction) -> usize {
        self.pending(dir).len()
    }

    pub fn completed_len(&self, dir: Direction) -> usize {
        self.completed(dir).len()
    }

    pub fn is_in_flight(&self, dir: Direction) -> bool {
        critical_section::with(|cs| self.shared.borrow_ref(cs).current(dir).is_some())
    }

    /// Completion events currently kicked through TRANS_DONE
    pub fn untriggerable_events(&self) -> EventMask {
        critical_section::with(|cs| self.shared.borrow_ref(cs).hal.untriggerable())
    }

    fn validate(&self, trans: &Transaction<'a>) -> HdResult<()> {
        if self.uses_dma() {
            let reachable = self
                .platform
                .as_ref()
                .is_some_and(|platform| platform.is_dma_capable(trans.addr(), trans.len()));
            if !reachable {
                return Err(HdError::NotDmaCapable);
            }
        }
        if trans.is_empty()
            || trans.len() > self.max_transfer_sz
            || trans.len() > trans.buffer().len()
        {
            return Err(HdError::InvalidLength);
        }
        Ok(())
    }

    pub(crate) fn pending(&self, dir: Direction) -> &HdQueue<TransRef<'a>, DEPTH> {
        match dir {
            Direction::Tx => &self.tx_pending,
            Direction::Rx => &self.rx_pending,
        }
    }

    pub(crate) fn completed(&self, dir: Direction) -> &HdQueue<TransRef<'a>, DEPTH> {
        match dir {
            Direction::Tx => &self.tx_done,
            Direction::Rx => &self.rx_done,
        }
    }

    pub(crate) fn credits(&self, dir: Direction) -> &Credits {
        match dir {
            Direction::Tx => &self.tx_credits,
            Direction::Rx => &self.rx_credits,
        }
    }
}

impl<'a, P, S, T, const DEPTH: usize> Drop for SlaveHd<'a, P, S, T, DEPTH>
where
    P: Platform,
    S: EventSink<'a>,
    T: Port,
{
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
