//! Interrupt dispatcher
//!
//! Per direction the slot is either idle or has exactly one transaction in
//! flight. Each run drains finished transfers into the completed queues and
//! starts the next pending transfer on every idle direction.

use hd_core::{Direction, HdEvent, Port, Transaction};
use hd_hal::{Platform, SlaveHdHal, SlaveHdRegisters};

use crate::sink::{notify, EventSink, IsrContext};
use crate::slot::SlaveHd;

const DIRECTIONS: [Direction; 2] = [Direction::Tx, Direction::Rx];

impl<'a, P, S, T, const DEPTH: usize> SlaveHd<'a, P, S, T, DEPTH>
where
    P: Platform,
    S: EventSink<'a>,
    T: Port,
{
    /// Service the slave interrupt
    ///
    /// Must be called from the handler of every line the platform
    /// registered for this slot. Returns true if a callback asked for a
    /// context switch, which has then been passed to
    /// [`Port::yield_from_isr`].
    ///
    /// # Panics
    ///
    /// If a completed queue overflows, which the capacity credits rule out.
    pub fn handle_interrupt(&self) -> bool {
        let mut awoken = false;

        for event in HdEvent::NOTIFICATIONS {
            if !self.subscriptions.has(event) {
                continue;
            }
            let fired = critical_section::with(|cs| {
                self.shared.borrow_ref_mut(cs).hal.check_clear_event(event)
            });
            if fired {
                let mut cx = IsrContext::new(event);
                notify(&mut *self.sink.lock(), &mut cx);
                awoken |= cx.yield_requested();
            }
        }

        let [tx_done, rx_done] = critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            let shared = &mut *shared;
            DIRECTIONS.map(|dir| {
                if shared.current(dir).is_none()
                    || !shared.hal.check_disable_event(dir.completion_event())
                {
                    return None;
                }
                let trans = shared.current_mut(dir).take()?;
                if dir == Direction::Rx {
                    finish_rx(&mut shared.hal, trans);
                }
                Some(trans)
            })
        });

        for (dir, done) in [(Direction::Tx, tx_done), (Direction::Rx, rx_done)] {
            let Some(trans) = done else { continue };
            let mut cx = IsrContext::new(dir.completion_event());
            let kept = {
                let mut sink = self.sink.lock();
                match dir {
                    Direction::Tx => sink.on_sent(trans, &mut cx),
                    Direction::Rx => sink.on_received(trans, &mut cx),
                }
            };
            awoken |= cx.yield_requested();
            match kept {
                Some(trans) => {
                    if self.completed(dir).try_push(trans).is_err() {
                        log::error!("{} {:?} completed queue overflow", self.host, dir);
                        panic!("completed queue overflow");
                    }
                }
                None => self.credits(dir).give(),
            }
        }

        let mut started = [None, None];
        for (index, dir) in DIRECTIONS.into_iter().enumerate() {
            let idle = critical_section::with(|cs| {
                self.shared.borrow_ref(cs).current(dir).is_none()
            });
            if !idle {
                continue;
            }
            let Ok(trans) = self.pending(dir).try_pop() else {
                continue;
            };
            critical_section::with(|cs| {
                let mut shared = self.shared.borrow_ref_mut(cs);
                start(&mut shared.hal, dir, trans);
            });
            let ready = dir.ready_event();
            if self.subscriptions.has(ready) {
                let mut cx = IsrContext::new(ready);
                {
                    let mut sink = self.sink.lock();
                    match dir {
                        Direction::Tx => sink.on_send_dma_ready(trans, &mut cx),
                        Direction::Rx => sink.on_recv_dma_ready(trans, &mut cx),
                    }
                }
                awoken |= cx.yield_requested();
            }
            started[index] = Some(trans);
        }

        if started.iter().any(Option::is_some) {
            critical_section::with(|cs| {
                let mut shared = self.shared.borrow_ref_mut(cs);
                for (dir, trans) in DIRECTIONS.into_iter().zip(started) {
                    if let Some(trans) = trans {
                        *shared.current_mut(dir) = Some(trans);
                        shared.hal.enable_event(dir.completion_event());
                    }
                }
            });
        }

        if awoken {
            self.port.yield_from_isr();
        }
        awoken
    }
}

/// Arm the DMA of `dir` on the payload of `trans`
fn start<R: SlaveHdRegisters>(
    hal: &mut SlaveHdHal<R>,
    dir: Direction,
    trans: &mut Transaction<'_>,
) {
    let len = trans.len().min(trans.buffer().len());
    match dir {
        Direction::Tx => hal.start_tx(&trans.buffer()[..len]),
        Direction::Rx => hal.start_rx(&mut trans.buffer_mut()[..len]),
    }
}

/// Stamp the received length on a finished RX
fn finish_rx<R: SlaveHdRegisters>(hal: &mut SlaveHdHal<R>, trans: &mut Transaction<'_>) {
    let received = match trans.payload_mut() {
        Some(buf) => hal.rx_finish(buf),
        None => 0,
    };
    trans.set_trans_len(received);
}
