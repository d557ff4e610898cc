//! Event model of the half-duplex slave
//!
//! Every hardware condition the driver reacts to is a named [`HdEvent`].
//! Sets of events travel as an [`EventMask`]; the HAL maps each event onto
//! one or more interrupt bits of the peripheral.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Named logical condition raised by the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HdEvent {
    /// Master read the shared register buffer
    BufTx,
    /// Master wrote the shared register buffer
    BufRx,
    /// A TX DMA was armed and is ready for the master
    SendDmaReady,
    /// TX DMA complete
    Send,
    /// An RX DMA was armed and is ready for the master
    RecvDmaReady,
    /// RX DMA complete
    Recv,
    /// Master issued custom command 9
    Cmd9,
    /// Master issued custom command A
    CmdA,
    /// Generic transaction done, only used as a fallback trigger
    Trans,
}

impl HdEvent {
    /// Notification events checked and cleared on every interrupt
    pub const NOTIFICATIONS: [HdEvent; 4] = [
        HdEvent::BufTx,
        HdEvent::BufRx,
        HdEvent::Cmd9,
        HdEvent::CmdA,
    ];

    /// Mask holding only this event
    pub const fn mask(self) -> EventMask {
        match self {
            HdEvent::BufTx => EventMask::BUF_TX,
            HdEvent::BufRx => EventMask::BUF_RX,
            HdEvent::SendDmaReady => EventMask::SEND_DMA_READY,
            HdEvent::Send => EventMask::SEND,
            HdEvent::RecvDmaReady => EventMask::RECV_DMA_READY,
            HdEvent::Recv => EventMask::RECV,
            HdEvent::Cmd9 => EventMask::CMD9,
            HdEvent::CmdA => EventMask::CMDA,
            HdEvent::Trans => EventMask::TRANS,
        }
    }
}

impl fmt::Display for HdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HdEvent::BufTx => "BUF_TX",
            HdEvent::BufRx => "BUF_RX",
            HdEvent::SendDmaReady => "SEND_DMA_READY",
            HdEvent::Send => "SEND",
            HdEvent::RecvDmaReady => "RECV_DMA_READY",
            HdEvent::Recv => "RECV",
            HdEvent::Cmd9 => "CMD9",
            HdEvent::CmdA => "CMDA",
            HdEvent::Trans => "TRANS",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HdEvent {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "HdEvent({})", self.mask().raw());
    }
}

/// Set of [`HdEvent`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct EventMask(u16);

impl EventMask {
    pub const NONE: Self = Self(0);
    pub const BUF_TX: Self = Self(1 << 0);
    pub const BUF_RX: Self = Self(1 << 1);
    pub const SEND_DMA_READY: Self = Self(1 << 2);
    pub const SEND: Self = Self(1 << 3);
    pub const RECV_DMA_READY: Self = Self(1 << 4);
    pub const RECV: Self = Self(1 << 5);
    pub const CMD9: Self = Self(1 << 6);
    pub const CMDA: Self = Self(1 << 7);
    pub const TRANS: Self = Self(1 << 8);

    /// Create a mask from its raw bits
    pub const fn from_raw(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every event of `other` is in `self`
    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any event of `other` is in `self`
    pub const fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn has(self, event: HdEvent) -> bool {
        self.intersects(event.mask())
    }

    pub const fn union(self, other: EventMask) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: EventMask) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn insert(&mut self, other: EventMask) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EventMask) {
        self.0 &= !other.0;
    }
}

impl From<HdEvent> for EventMask {
    fn from(event: HdEvent) -> Self {
        event.mask()
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "EventMask({=u16:#x})", self.0);
    }
}
