//! Shared harness for slave integration tests
#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};

use hd_hal::sim::{SimBus, SimLedger, SimPlatform};
use hd_posix::StdPort;
use hd_slave::{
    BusConfig, EventSink, HostId, NoEvents, SlaveHd, SlotConfig, TransRef, Transaction,
};

/// Host claims are process-wide; tests that init a slot run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub type SimSlave<S> = SlaveHd<'static, SimPlatform, S, StdPort>;

/// Transaction over a fresh buffer of `len` bytes set to `fill`
pub fn leak_trans(len: usize, fill: u8, arg: usize) -> TransRef<'static> {
    let buf = Box::leak(vec![fill; len].into_boxed_slice());
    Box::leak(Box::new(Transaction::new(buf).with_arg(arg)))
}

pub fn bus_config() -> BusConfig {
    BusConfig::builder()
        .pins(13, 12, 14)
        .max_transfer_sz(4096)
        .build()
}

pub fn slot_config(depth: usize) -> SlotConfig {
    SlotConfig::builder().spics_io_num(15).queue_size(depth).build()
}

/// Dropping the rig drops the slave, which releases the host again
pub struct Rig<S: EventSink<'static>> {
    pub bus: SimBus,
    pub ledger: SimLedger,
    pub slave: SimSlave<S>,
}

pub fn rig_on(bus: SimBus, slot: SlotConfig) -> Rig<NoEvents> {
    rig_with(bus, slot, NoEvents)
}

pub fn rig(depth: usize) -> Rig<NoEvents> {
    rig_on(SimBus::new(), slot_config(depth))
}

pub fn rig_with<S: EventSink<'static>>(bus: SimBus, slot: SlotConfig, sink: S) -> Rig<S> {
    let platform = SimPlatform::new(&bus);
    let ledger = platform.ledger();
    let slave = SlaveHd::init(
        HostId::SPI2,
        &bus_config(),
        &slot,
        platform,
        sink,
        StdPort::with_idle(std::time::Duration::from_micros(50)),
    )
    .expect("slave init");
    Rig { bus, ledger, slave }
}

/// Run the dispatcher while the simulated interrupt line is asserted
pub fn pump<S: EventSink<'static>>(rig: &Rig<S>) -> usize {
    let mut runs = 0;
    while rig.bus.irq_pending() {
        rig.slave.handle_interrupt();
        runs += 1;
        assert!(runs < 64, "interrupt line stuck");
    }
    runs
}
