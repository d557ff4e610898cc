//! Transfer scenarios against the simulated peripheral

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use common::{leak_trans, pump, rig, rig_on, rig_with, serial, slot_config};
use hd_hal::sim::{SimBus, SimPlatform};
use hd_hal::IntrMask;
use hd_posix::StdPort;
use hd_slave::{
    Direction, DmaChannel, EventMask, EventSink, HdDuration, HdError, HostId, IsrContext,
    NoEvents, SlaveHd, SlotConfig, TransRef, Transaction,
};

const NOW: HdDuration = HdDuration::ZERO;

#[test]
fn scenario_a_collection_frees_capacity() {
    let _guard = serial();
    let rig = rig(2);
    let slave = &rig.slave;

    slave.queue_transaction(Direction::Tx, leak_trans(16, 0x11, 1), NOW).unwrap();
    slave.queue_transaction(Direction::Tx, leak_trans(32, 0x22, 2), NOW).unwrap();
    pump(&rig);
    assert!(slave.is_in_flight(Direction::Tx));
    assert_eq!(slave.pending_len(Direction::Tx), 1);

    assert_eq!(rig.bus.master_read_dma(16), Some(vec![0x11; 16]));
    pump(&rig);

    let d1 = slave.get_transaction_result(Direction::Tx, NOW).unwrap();
    assert_eq!(d1.arg(), 1);

    slave.queue_transaction(Direction::Tx, leak_trans(8, 0x33, 3), NOW).unwrap();
    pump(&rig);

    assert_eq!(rig.bus.master_read_dma(32), Some(vec![0x22; 32]));
    pump(&rig);
    assert_eq!(rig.bus.master_read_dma(8), Some(vec![0x33; 8]));
    pump(&rig);

    let d2 = slave.get_transaction_result(Direction::Tx, NOW).unwrap();
    let d3 = slave.get_transaction_result(Direction::Tx, NOW).unwrap();
    assert_eq!((d2.arg(), d3.arg()), (2, 3));
    assert_eq!(rig.bus.tx_starts(), 3);
    assert_eq!(rig.bus.overlap_violations(), 0);
}

#[test]
fn scenario_b_full_direction_times_out() {
    let _guard = serial();
    let rig = rig(1);
    let slave = &rig.slave;

    slave.queue_transaction(Direction::Rx, leak_trans(16, 0, 1), NOW).unwrap();
    pump(&rig);

    let started = Instant::now();
    let err = slave
        .queue_transaction(Direction::Rx, leak_trans(16, 0, 2), HdDuration::from_millis(20))
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(err.error(), HdError::Timeout);
    assert_eq!(err.into_transaction().arg(), 2);
    assert_eq!(slave.pending_len(Direction::Rx), 0);

    assert_eq!(rig.bus.master_write_dma(&[5; 10]), Some(10));
    pump(&rig);

    let d1 = slave.get_transaction_result(Direction::Rx, NOW).unwrap();
    assert_eq!(d1.arg(), 1);
    assert_eq!(d1.trans_len(), 10);
    assert_eq!(d1.received(), &[5; 10]);
    assert_eq!(
        slave.get_transaction_result(Direction::Rx, NOW).unwrap_err(),
        HdError::Timeout
    );
    assert!(!slave.is_in_flight(Direction::Rx));
}

#[test]
fn scenario_c_invalid_lengths_rejected() {
    let _guard = serial();
    let rig = rig(2);
    let slave = &rig.slave;

    let buf = Box::leak(vec![0u8; 8].into_boxed_slice());
    let empty = Box::leak(Box::new(Transaction::with_len(buf, 0)));
    let err = slave.queue_transaction(Direction::Tx, empty, NOW).unwrap_err();
    assert_eq!(err.error(), HdError::InvalidLength);

    let buf = Box::leak(vec![0u8; 8].into_boxed_slice());
    let overrun = Box::leak(Box::new(Transaction::with_len(buf, 9)));
    let err = slave.queue_transaction(Direction::Rx, overrun, NOW).unwrap_err();
    assert_eq!(err.error(), HdError::InvalidLength);

    let too_big = leak_trans(slave.max_transfer_size() + 1, 0, 0);
    let err = slave.queue_transaction(Direction::Tx, too_big, NOW).unwrap_err();
    assert_eq!(HdError::from(err), HdError::InvalidLength);

    assert_eq!(slave.pending_len(Direction::Tx), 0);
    assert_eq!(slave.pending_len(Direction::Rx), 0);
    assert!(!rig.bus.irq_pending());
    assert_eq!(rig.bus.intr_enabled(), IntrMask::NONE);
}

/// Keeps every received transaction instead of queueing it
#[derive(Default)]
struct Keeper {
    held: Vec<TransRef<'static>>,
}

impl EventSink<'static> for Keeper {
    fn on_received(
        &mut self,
        trans: TransRef<'static>,
        _cx: &mut IsrContext,
    ) -> Option<TransRef<'static>> {
        self.held.push(trans);
        None
    }
}

#[test]
fn scenario_d_callback_suppresses_completion() {
    let _guard = serial();
    let rig = rig_with(SimBus::new(), slot_config(2), Keeper::default());
    let slave = &rig.slave;

    slave.queue_transaction(Direction::Rx, leak_trans(8, 0, 1), NOW).unwrap();
    slave.queue_transaction(Direction::Rx, leak_trans(8, 0, 2), NOW).unwrap();
    pump(&rig);

    assert_eq!(rig.bus.master_write_dma(&[1, 2, 3]), Some(3));
    pump(&rig);

    assert_eq!(rig.bus.rx_starts(), 2);
    assert!(slave.is_in_flight(Direction::Rx));
    assert_eq!(
        slave.get_transaction_result(Direction::Rx, NOW).unwrap_err(),
        HdError::Timeout
    );
    slave.with_sink(|sink| {
        assert_eq!(sink.held.len(), 1);
        assert_eq!(sink.held[0].arg(), 1);
        assert_eq!(sink.held[0].received(), &[1, 2, 3]);
    });

    // Suppressed completions hand their capacity back
    slave.queue_transaction(Direction::Rx, leak_trans(8, 0, 3), NOW).unwrap();
    assert_eq!(rig.bus.master_write_dma(&[4]), Some(1));
    pump(&rig);
    assert_eq!(rig.bus.master_write_dma(&[5]), Some(1));
    pump(&rig);

    let args: Vec<usize> = slave.with_sink(|sink| sink.held.iter().map(|t| t.arg()).collect());
    assert_eq!(args, vec![1, 2, 3]);
    assert_eq!(slave.completed_len(Direction::Rx), 0);
}

#[test]
fn fifo_per_direction() {
    let _guard = serial();
    let rig = rig(4);
    let slave = &rig.slave;

    for arg in 0..4 {
        slave
            .queue_transaction(Direction::Tx, leak_trans(4, arg as u8, arg), NOW)
            .unwrap();
        slave
            .queue_transaction(Direction::Rx, leak_trans(4, 0, 10 + arg), NOW)
            .unwrap();
    }
    pump(&rig);

    for arg in 0..4u8 {
        assert_eq!(rig.bus.master_write_dma(&[arg; 2]), Some(2));
        pump(&rig);
        assert_eq!(rig.bus.master_read_dma(4), Some(vec![arg; 4]));
        pump(&rig);
    }

    for arg in 0..4 {
        let tx = slave.get_transaction_result(Direction::Tx, NOW).unwrap();
        assert_eq!(tx.arg(), arg);
        let rx = slave.get_transaction_result(Direction::Rx, NOW).unwrap();
        assert_eq!(rx.arg(), 10 + arg);
        assert_eq!(rx.received(), &[arg as u8; 2]);
    }
    assert_eq!(rig.bus.overlap_violations(), 0);
}

#[test]
fn conservation_under_mixed_operations() {
    let _guard = serial();
    const DEPTH: usize = 3;
    let rig = rig(DEPTH);
    let slave = &rig.slave;

    let mut seed: u32 = 0x2545_f491;
    let mut next_arg = 0;
    let mut collected = Vec::new();

    let occupancy = |dir: Direction| {
        slave.pending_len(dir) + usize::from(slave.is_in_flight(dir)) + slave.completed_len(dir)
    };

    for _ in 0..400 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        match seed % 3 {
            0 => {
                let before = occupancy(Direction::Tx);
                match slave.queue_transaction(
                    Direction::Tx,
                    leak_trans(4, next_arg as u8, next_arg),
                    NOW,
                ) {
                    Ok(()) => next_arg += 1,
                    Err(err) => {
                        assert_eq!(err.error(), HdError::Timeout);
                        assert_eq!(before, DEPTH);
                    }
                }
            }
            1 => {
                rig.bus.master_read_dma(4);
            }
            _ => {
                if let Ok(trans) = slave.get_transaction_result(Direction::Tx, NOW) {
                    collected.push(trans.arg());
                }
            }
        }
        pump(&rig);
        assert!(occupancy(Direction::Tx) <= DEPTH);
    }

    while collected.len() < next_arg {
        rig.bus.master_read_dma(4);
        pump(&rig);
        if let Ok(trans) = slave.get_transaction_result(Direction::Tx, NOW) {
            collected.push(trans.arg());
        }
    }

    assert_eq!(collected, (0..next_arg).collect::<Vec<_>>());
    assert_eq!(occupancy(Direction::Tx), 0);
    assert_eq!(rig.bus.overlap_violations(), 0);
}

#[test]
fn threaded_backpressure() {
    let _guard = serial();
    const COUNT: usize = 24;
    let rig = rig(2);
    let slave = &rig.slave;
    let bus = &rig.bus;
    let done = AtomicBool::new(false);
    let forever = HdDuration::from_secs(5);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                if bus.tx_armed() {
                    bus.master_read_dma(16);
                }
                if bus.irq_pending() {
                    slave.handle_interrupt();
                }
                std::thread::yield_now();
            }
        });

        let collector = scope.spawn(|| {
            let mut args = Vec::new();
            for _ in 0..COUNT {
                let trans = slave.get_transaction_result(Direction::Tx, forever).unwrap();
                args.push(trans.arg());
            }
            done.store(true, Ordering::Release);
            args
        });

        for arg in 0..COUNT {
            slave
                .queue_transaction(Direction::Tx, leak_trans(16, 0, arg), forever)
                .unwrap();
        }

        let args = collector.join().unwrap();
        assert_eq!(args, (0..COUNT).collect::<Vec<_>>());
    });

    assert_eq!(bus.tx_starts(), COUNT);
    assert_eq!(bus.overlap_violations(), 0);
}

#[derive(Default)]
struct Counters {
    buf_tx: usize,
    buf_rx: usize,
    cmd9: usize,
    cmda: usize,
    send_ready: Vec<usize>,
}

impl EventSink<'static> for Counters {
    fn subscriptions(&self) -> EventMask {
        EventMask::BUF_TX | EventMask::BUF_RX | EventMask::CMD9 | EventMask::SEND_DMA_READY
    }

    fn on_buffer_tx(&mut self, _cx: &mut IsrContext) {
        self.buf_tx += 1;
    }

    fn on_buffer_rx(&mut self, _cx: &mut IsrContext) {
        self.buf_rx += 1;
    }

    fn on_cmd9(&mut self, cx: &mut IsrContext) {
        self.cmd9 += 1;
        cx.request_yield();
    }

    fn on_cmda(&mut self, _cx: &mut IsrContext) {
        self.cmda += 1;
    }

    fn on_send_dma_ready(&mut self, trans: &Transaction<'static>, _cx: &mut IsrContext) {
        self.send_ready.push(trans.arg());
    }
}

#[test]
fn notifications_reach_subscribed_hooks() {
    let _guard = serial();
    let rig = rig_with(SimBus::new(), slot_config(2), Counters::default());
    let slave = &rig.slave;

    rig.bus.master_cmd9();
    assert!(rig.bus.irq_pending());
    assert!(slave.handle_interrupt());
    assert_eq!(slave.port().yield_count(), 1);

    // Not subscribed: no interrupt at all
    rig.bus.master_cmda();
    assert!(!rig.bus.irq_pending());

    rig.bus.master_write_buffer(0, &[1, 2, 3]);
    pump(&rig);
    rig.bus.master_read_buffer(0, 3);
    pump(&rig);

    slave.queue_transaction(Direction::Tx, leak_trans(4, 0, 42), NOW).unwrap();
    pump(&rig);

    slave.with_sink(|sink| {
        assert_eq!(sink.cmd9, 1);
        assert_eq!(sink.cmda, 0);
        assert_eq!(sink.buf_rx, 1);
        assert_eq!(sink.buf_tx, 1);
        assert_eq!(sink.send_ready, vec![42]);
    });
    assert_eq!(slave.port().yield_count(), 1);
}

#[test]
fn untriggerable_payload_bits_fall_back_transparently() {
    let _guard = serial();
    let bus = SimBus::new().with_non_writable(IntrMask::RDDMA | IntrMask::WRDMA);
    let rig = rig_on(bus, slot_config(2));
    let slave = &rig.slave;
    assert_eq!(slave.untriggerable_events(), EventMask::SEND | EventMask::RECV);

    for round in 0..3u8 {
        slave
            .queue_transaction(Direction::Tx, leak_trans(4, round, round.into()), NOW)
            .unwrap();
        slave
            .queue_transaction(Direction::Rx, leak_trans(4, 0, round.into()), NOW)
            .unwrap();
        pump(&rig);
        assert!(slave.is_in_flight(Direction::Tx));
        assert!(slave.is_in_flight(Direction::Rx));

        assert_eq!(rig.bus.master_read_dma(4), Some(vec![round; 4]));
        assert_eq!(rig.bus.master_write_dma(&[round]), Some(1));
        pump(&rig);

        let tx = slave.get_transaction_result(Direction::Tx, NOW).unwrap();
        let rx = slave.get_transaction_result(Direction::Rx, NOW).unwrap();
        assert_eq!((tx.arg(), rx.arg()), (round.into(), round.into()));
        assert_eq!(rx.received(), &[round]);
    }

    assert!(slave.untriggerable_events().is_empty());
    assert_eq!(rig.bus.overlap_violations(), 0);
}

#[test]
fn register_only_mode_moves_data_through_shared_buffer() {
    let _guard = serial();
    let slot = SlotConfig::builder()
        .queue_size(2)
        .dma_chan(DmaChannel::Disabled)
        .build();
    let rig = rig_on(SimBus::new(), slot);
    let slave = &rig.slave;

    assert!(!slave.uses_dma());
    assert_eq!(slave.dma_channel(), None);
    assert_eq!(slave.max_transfer_size(), 64);
    assert_eq!(rig.ledger.counts().desc_allocs, 0);
    assert_eq!(rig.ledger.irq_sources().len(), 1);

    let err = slave
        .queue_transaction(Direction::Tx, leak_trans(65, 0, 0), NOW)
        .unwrap_err();
    assert_eq!(err.error(), HdError::InvalidLength);

    slave.queue_transaction(Direction::Tx, leak_trans(8, 0x5a, 1), NOW).unwrap();
    pump(&rig);
    assert_eq!(rig.bus.master_read_dma(8), Some(vec![0x5a; 8]));
    pump(&rig);
    assert_eq!(slave.get_transaction_result(Direction::Tx, NOW).unwrap().arg(), 1);

    slave.queue_transaction(Direction::Rx, leak_trans(8, 0, 2), NOW).unwrap();
    pump(&rig);
    assert_eq!(rig.bus.master_write_dma(&[9, 8, 7, 6, 5]), Some(5));
    pump(&rig);
    let rx = slave.get_transaction_result(Direction::Rx, NOW).unwrap();
    assert_eq!(rx.trans_len(), 5);
    assert_eq!(rx.buffer(), &[9, 8, 7, 6, 5, 0, 0, 0]);
}

#[test]
fn shared_buffer_round_trips_with_master() {
    let _guard = serial();
    let rig = rig(1);
    let slave = &rig.slave;

    slave.write_buffer(8, &[0xde, 0xad]).unwrap();
    assert_eq!(rig.bus.master_read_buffer(8, 2), vec![0xde, 0xad]);

    rig.bus.master_write_buffer(60, &[1, 2, 3, 4]);
    let mut out = [0u8; 4];
    slave.read_buffer(60, &mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4]);

    assert_eq!(slave.read_buffer(61, &mut out), Err(HdError::InvalidArgument));
    assert_eq!(slave.write_buffer(64, &[0]), Err(HdError::InvalidArgument));
    assert_eq!(slave.write_buffer(usize::MAX, &[0]), Err(HdError::InvalidArgument));
    assert!(!rig.bus.irq_pending());
}

#[test]
fn buffers_outside_dma_memory_rejected() {
    let _guard = serial();
    let bus = SimBus::new();
    let platform = SimPlatform::new(&bus).with_dma_region(0..16);
    let slave: SlaveHd<'static, _, _, _> = SlaveHd::init(
        HostId::SPI2,
        &common::bus_config(),
        &slot_config(2),
        platform,
        NoEvents,
        StdPort::new(),
    )
    .unwrap();

    let err = slave
        .queue_transaction(Direction::Tx, leak_trans(4, 0, 7), NOW)
        .unwrap_err();
    assert_eq!(err.error(), HdError::NotDmaCapable);
    assert_eq!(err.into_transaction().arg(), 7);
    assert_eq!(slave.pending_len(Direction::Tx), 0);
    slave.deinit().unwrap();
}
