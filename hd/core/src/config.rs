//! Bus and slot configuration

use core::fmt;

use embedded_hal::spi::{Mode, Phase, Polarity, MODE_0};

/// Number of SPI host slots known to the engine (SPI1, SPI2, SPI3)
pub const MAX_HOSTS: usize = 3;

/// Number of DMA channels that can be claimed
pub const MAX_DMA_CHANNELS: usize = 3;

/// Largest transfer one DMA descriptor can carry
pub const DMA_DESCRIPTOR_BUFFER_MAX: usize = 4092;

/// Size of the shared register buffer exposed to the master
pub const SCRATCH_BUFFER_SIZE: usize = 64;

/// Physical SPI peripheral selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(pub u8);

impl HostId {
    /// Flash-attached host, never usable as a slave
    pub const SPI1: HostId = HostId(0);
    pub const SPI2: HostId = HostId(1);
    pub const SPI3: HostId = HostId(2);

    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True for hosts that support half-duplex slave mode
    pub const fn is_slave_capable(self) -> bool {
        self.0 == Self::SPI2.0 || self.0 == Self::SPI3.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SPI{}", self.0 + 1)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HostId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "SPI{}", self.0 + 1);
    }
}

/// DMA channel selection for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DmaChannel {
    /// Register-only mode, transfers limited to the scratch buffer
    Disabled,
    /// Use the channel wired to the host
    #[default]
    Auto,
    /// Explicit channel number
    Channel(u8),
}

impl DmaChannel {
    /// Resolve the channel number for `host`
    ///
    /// `Auto` picks the channel numbered like the host. Explicit channels
    /// may serve any host. Returns `Ok(None)` in register-only mode.
    pub fn resolve(self, host: HostId) -> crate::HdResult<Option<u8>> {
        match self {
            Self::Disabled => Ok(None),
            Self::Auto => Ok(Some(host.raw())),
            Self::Channel(ch) if ch != 0 && (ch as usize) < MAX_DMA_CHANNELS => Ok(Some(ch)),
            Self::Channel(_) => Err(crate::HdError::InvalidDmaChannel),
        }
    }
}

/// Convert an SPI mode to its 0-3 index
pub const fn mode_index(mode: Mode) -> u8 {
    let cpol = matches!(mode.polarity, Polarity::IdleHigh) as u8;
    let cpha = matches!(mode.phase, Phase::CaptureOnSecondTransition) as u8;
    (cpol << 1) | cpha
}

/// Bus-level configuration: pin routing and transfer size
///
/// Pins are GPIO numbers consumed by the platform's bus setup; `None`
/// leaves a line unrouted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub mosi: Option<u8>,
    pub miso: Option<u8>,
    pub sclk: Option<u8>,
    pub quadwp: Option<u8>,
    pub quadhd: Option<u8>,
    /// Maximum transfer in bytes, `0` selects one descriptor's worth
    pub max_transfer_sz: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mosi: None,
            miso: None,
            sclk: None,
            quadwp: None,
            quadhd: None,
            max_transfer_sz: 0,
        }
    }
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::default()
    }
}

/// Builder for [`BusConfig`]
#[derive(Debug, Clone, Default)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    /// Route the three mandatory lines
    pub fn pins(mut self, mosi: u8, miso: u8, sclk: u8) -> Self {
        self.config.mosi = Some(mosi);
        self.config.miso = Some(miso);
        self.config.sclk = Some(sclk);
        self
    }

    /// Route the quad-mode lines
    pub fn quad_pins(mut self, wp: u8, hd: u8) -> Self {
        self.config.quadwp = Some(wp);
        self.config.quadhd = Some(hd);
        self
    }

    pub fn max_transfer_sz(mut self, bytes: usize) -> Self {
        self.config.max_transfer_sz = bytes;
        self
    }

    pub fn build(self) -> BusConfig {
        self.config
    }
}

/// Bit-order flags of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotFlags(u8);

impl SlotFlags {
    pub const NONE: Self = Self(0);
    /// Transmit LSB first
    pub const TXBIT_LSBFIRST: Self = Self(1 << 0);
    /// Receive LSB first
    pub const RXBIT_LSBFIRST: Self = Self(1 << 1);

    pub const fn contains(self, other: SlotFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: SlotFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Slot-level configuration of the half-duplex slave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotConfig {
    /// Chip-select GPIO
    pub spics_io_num: Option<u8>,
    pub flags: SlotFlags,
    pub mode: Mode,
    pub command_bits: u8,
    pub address_bits: u8,
    pub dummy_bits: u8,
    /// Depth shared by all four transaction queues
    pub queue_size: usize,
    pub dma_chan: DmaChannel,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            spics_io_num: None,
            flags: SlotFlags::NONE,
            mode: MODE_0,
            command_bits: 8,
            address_bits: 8,
            dummy_bits: 8,
            queue_size: 4,
            dma_chan: DmaChannel::Auto,
        }
    }
}

impl SlotConfig {
    pub fn builder() -> SlotConfigBuilder {
        SlotConfigBuilder::default()
    }

    pub fn tx_lsbfirst(&self) -> bool {
        self.flags.contains(SlotFlags::TXBIT_LSBFIRST)
    }

    pub fn rx_lsbfirst(&self) -> bool {
        self.flags.contains(SlotFlags::RXBIT_LSBFIRST)
    }
}

/// Builder for [`SlotConfig`]
#[derive(Debug, Clone, Default)]
pub struct SlotConfigBuilder {
    config: SlotConfig,
}

impl SlotConfigBuilder {
    pub fn spics_io_num(mut self, pin: u8) -> Self {
        self.config.spics_io_num = Some(pin);
        self
    }

    pub fn flags(mut self, flags: SlotFlags) -> Self {
        self.config.flags = flags;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Sets command, address and dummy phase lengths in bits.
    pub fn phase_bits(mut self, command: u8, address: u8, dummy: u8) -> Self {
        self.config.command_bits = command;
        self.config.address_bits = address;
        self.config.dummy_bits = dummy;
        self
    }

    pub fn queue_size(mut self, depth: usize) -> Self {
        self.config.queue_size = depth;
        self
    }

    pub fn dma_chan(mut self, chan: DmaChannel) -> Self {
        self.config.dma_chan = chan;
        self
    }

    pub fn build(self) -> SlotConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::{MODE_1, MODE_2, MODE_3};

    #[test]
    fn mode_indices() {
        assert_eq!(mode_index(MODE_0), 0);
        assert_eq!(mode_index(MODE_1), 1);
        assert_eq!(mode_index(MODE_2), 2);
        assert_eq!(mode_index(MODE_3), 3);
    }

    #[test]
    fn dma_channel_resolution() {
        assert_eq!(DmaChannel::Disabled.resolve(HostId::SPI2), Ok(None));
        assert_eq!(DmaChannel::Auto.resolve(HostId::SPI3), Ok(Some(2)));
        assert_eq!(DmaChannel::Channel(1).resolve(HostId::SPI2), Ok(Some(1)));
        assert_eq!(DmaChannel::Channel(2).resolve(HostId::SPI2), Ok(Some(2)));
        assert_eq!(
            DmaChannel::Channel(3).resolve(HostId::SPI2),
            Err(crate::HdError::InvalidDmaChannel)
        );
        assert_eq!(
            DmaChannel::Channel(0).resolve(HostId::SPI3),
            Err(crate::HdError::InvalidDmaChannel)
        );
        assert_eq!(DmaChannel::default(), DmaChannel::Auto);
    }

    #[test]
    fn slot_config_builder() {
        let config = SlotConfig::builder()
            .mode(MODE_2)
            .phase_bits(8, 16, 4)
            .queue_size(6)
            .flags(SlotFlags::TXBIT_LSBFIRST)
            .dma_chan(DmaChannel::Disabled)
            .build();

        assert_eq!(config.mode, MODE_2);
        assert_eq!(config.address_bits, 16);
        assert_eq!(config.dummy_bits, 4);
        assert_eq!(config.queue_size, 6);
        assert!(config.tx_lsbfirst());
        assert!(!config.rx_lsbfirst());
    }

    #[test]
    fn slave_capable_hosts() {
        assert!(!HostId::SPI1.is_slave_capable());
        assert!(HostId::SPI2.is_slave_capable());
        assert!(HostId::SPI3.is_slave_capable());
        assert!(!HostId::new(7).is_slave_capable());
    }
}
