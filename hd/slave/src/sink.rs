//! Event callbacks invoked from interrupt context

use hd_core::{EventMask, HdEvent, TransRef, Transaction};

/// Per-invocation context handed to every callback
#[derive(Debug)]
pub struct IsrContext {
    event: HdEvent,
    yield_requested: bool,
}

impl IsrContext {
    pub(crate) fn new(event: HdEvent) -> Self {
        Self {
            event,
            yield_requested: false,
        }
    }

    /// Event being delivered
    pub fn event(&self) -> HdEvent {
        self.event
    }

    /// Ask the scheduler to switch tasks when the interrupt returns
    pub fn request_yield(&mut self) {
        self.yield_requested = true;
    }

    pub fn yield_requested(&self) -> bool {
        self.yield_requested
    }
}

/// Receiver of slave events
///
/// All methods run in interrupt context and must not block. Notification
/// and DMA-ready hooks only fire for events named in
/// [`EventSink::subscriptions`]; completion hooks always fire.
pub trait EventSink<'a>: Send {
    /// Notification and DMA-ready events to deliver
    fn subscriptions(&self) -> EventMask {
        EventMask::NONE
    }

    /// Master read the shared buffer
    fn on_buffer_tx(&mut self, _cx: &mut IsrContext) {}

    /// Master wrote the shared buffer
    fn on_buffer_rx(&mut self, _cx: &mut IsrContext) {}

    fn on_cmd9(&mut self, _cx: &mut IsrContext) {}

    fn on_cmda(&mut self, _cx: &mut IsrContext) {}

    /// TX DMA armed for `trans`
    fn on_send_dma_ready(&mut self, _trans: &Transaction<'a>, _cx: &mut IsrContext) {}

    /// RX DMA armed for `trans`
    fn on_recv_dma_ready(&mut self, _trans: &Transaction<'a>, _cx: &mut IsrContext) {}

    /// TX of `trans` finished
    ///
    /// Returning the reference queues it for collection. Returning `None`
    /// keeps it out of the completed queue; the sink then owns it.
    fn on_sent(&mut self, trans: TransRef<'a>, _cx: &mut IsrContext) -> Option<TransRef<'a>> {
        Some(trans)
    }

    /// RX of `trans` finished, `trans_len` already stamped
    ///
    /// Same contract as [`EventSink::on_sent`].
    fn on_received(&mut self, trans: TransRef<'a>, _cx: &mut IsrContext) -> Option<TransRef<'a>> {
        Some(trans)
    }
}

/// Sink that subscribes to nothing and queues every completion
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl<'a> EventSink<'a> for NoEvents {}

/// Deliver a notification event to the matching hook
pub(crate) fn notify<'a, S: EventSink<'a>>(sink: &mut S, cx: &mut IsrContext) {
    match cx.event() {
        HdEvent::BufTx => sink.on_buffer_tx(cx),
        HdEvent::BufRx => sink.on_buffer_rx(cx),
        HdEvent::Cmd9 => sink.on_cmd9(cx),
        HdEvent::CmdA => sink.on_cmda(cx),
        _ => {}
    }
}
