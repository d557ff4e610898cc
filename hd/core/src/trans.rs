//! Caller-owned transaction descriptors

use crate::events::HdEvent;

/// Transfer direction, seen from the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Slave to master (master issues RDDMA)
    Tx,
    /// Master to slave (master issues WRDMA)
    Rx,
}

impl Direction {
    /// Completion event of this direction
    pub const fn completion_event(self) -> HdEvent {
        match self {
            Direction::Tx => HdEvent::Send,
            Direction::Rx => HdEvent::Recv,
        }
    }

    /// Event raised once a DMA of this direction is armed
    pub const fn ready_event(self) -> HdEvent {
        match self {
            Direction::Tx => HdEvent::SendDmaReady,
            Direction::Rx => HdEvent::RecvDmaReady,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Direction {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Direction::Tx => defmt::write!(fmt, "Tx"),
            Direction::Rx => defmt::write!(fmt, "Rx"),
        }
    }
}

/// One DMA transfer, owned by the caller
///
/// The driver borrows the descriptor mutably for the whole time it is
/// pending, in flight or completed, and hands the same reference back
/// through the completed queue.
#[derive(Debug)]
pub struct Transaction<'a> {
    data: &'a mut [u8],
    len: usize,
    trans_len: usize,
    arg: usize,
}

/// Reference to a transaction while the driver holds it
pub type TransRef<'a> = &'a mut Transaction<'a>;

impl<'a> Transaction<'a> {
    /// Transaction covering the whole buffer
    pub fn new(data: &'a mut [u8]) -> Self {
        let len = data.len();
        Self {
            data,
            len,
            trans_len: 0,
            arg: 0,
        }
    }

    /// Transaction covering the first `len` bytes of the buffer
    ///
    /// A `len` above the buffer size is rejected when queued.
    pub fn with_len(data: &'a mut [u8], len: usize) -> Self {
        Self {
            data,
            len,
            trans_len: 0,
            arg: 0,
        }
    }

    /// Attach a user tag
    pub fn with_arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    /// Requested length
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes actually received, stamped on RX completion
    pub fn trans_len(&self) -> usize {
        self.trans_len
    }

    pub fn set_trans_len(&mut self, len: usize) {
        self.trans_len = len;
    }

    pub fn arg(&self) -> usize {
        self.arg
    }

    pub fn set_arg(&mut self, arg: usize) {
        self.arg = arg;
    }

    /// Whole underlying buffer
    pub fn buffer(&self) -> &[u8] {
        &*self.data
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    /// The `len` bytes to transfer, `None` if `len` exceeds the buffer
    pub fn payload(&self) -> Option<&[u8]> {
        self.data.get(..self.len)
    }

    pub fn payload_mut(&mut self) -> Option<&mut [u8]> {
        self.data.get_mut(..self.len)
    }

    /// Bytes received by the last RX completion
    pub fn received(&self) -> &[u8] {
        &self.data[..self.trans_len.min(self.data.len())]
    }

    /// Start address of the buffer
    pub fn addr(&self) -> usize {
        self.data.as_ptr() as usize
    }
}
