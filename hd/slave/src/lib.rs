#![no_std]
#![forbid(unsafe_code)]

//! # HD Slave
//!
//! Half-duplex SPI slave driver. A [`SlaveHd`] owns one peripheral: tasks
//! queue caller-owned [`Transaction`]s per direction, the interrupt
//! dispatcher moves them through the DMA engine one at a time, and tasks
//! collect them again in FIFO order.
//!
//! ```text
//!   queue_transaction ──> pending ──> in flight ──> completed ──> get_transaction_result
//!                          (task)      (ISR)         (ISR)          (task)
//! ```
//!
//! Every peripheral can be claimed by one slot at a time; claims live in a
//! process-wide [`registry`].

pub mod registry;
pub mod sink;
pub mod slot;

mod isr;

pub use sink::{EventSink, IsrContext, NoEvents};
pub use slot::{QueueError, SlaveHd};

pub use hd_core::{
    BusConfig, Direction, DmaChannel, EventMask, HdDuration, HdError, HdEvent, HdResult, HostId,
    SlotConfig, SlotFlags, TransRef, Transaction,
};
