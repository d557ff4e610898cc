//! Process-wide claims on SPI hosts and DMA channels

use core::cell::RefCell;

use critical_section::Mutex;

use hd_core::{HdError, HdResult, HostId, MAX_DMA_CHANNELS, MAX_HOSTS};

/// Which hosts and DMA channels are taken
pub struct Claims {
    hosts: [bool; MAX_HOSTS],
    dma: [bool; MAX_DMA_CHANNELS],
}

impl Claims {
    pub const fn new() -> Self {
        Self {
            hosts: [false; MAX_HOSTS],
            dma: [false; MAX_DMA_CHANNELS],
        }
    }

    pub fn claim_host(&mut self, host: HostId) -> HdResult<()> {
        let slot = self.hosts.get_mut(host.index()).ok_or(HdError::InvalidHost)?;
        if *slot {
            return Err(HdError::HostInUse);
        }
        *slot = true;
        Ok(())
    }

    pub fn release_host(&mut self, host: HostId) {
        if let Some(slot) = self.hosts.get_mut(host.index()) {
            *slot = false;
        }
    }

    pub fn is_host_claimed(&self, host: HostId) -> bool {
        self.hosts.get(host.index()).copied().unwrap_or(false)
    }

    pub fn claim_dma(&mut self, channel: u8) -> HdResult<()> {
        let slot = self
            .dma
            .get_mut(channel as usize)
            .ok_or(HdError::InvalidDmaChannel)?;
        if *slot {
            return Err(HdError::DmaInUse);
        }
        *slot = true;
        Ok(())
    }

    pub fn release_dma(&mut self, channel: u8) {
        if let Some(slot) = self.dma.get_mut(channel as usize) {
            *slot = false;
        }
    }

    pub fn is_dma_claimed(&self, channel: u8) -> bool {
        self.dma.get(channel as usize).copied().unwrap_or(false)
    }
}

impl Default for Claims {
    fn default() -> Self {
        Self::new()
    }
}

static CLAIMS: Mutex<RefCell<Claims>> = Mutex::new(RefCell::new(Claims::new()));

/// Run `f` on the global claims
pub(crate) fn with_claims<F, R>(f: F) -> R
where
    F: FnOnce(&mut Claims) -> R,
{
    critical_section::with(|cs| {
        let mut claims = CLAIMS.borrow_ref_mut(cs);
        f(&mut claims)
    })
}

/// True while a slot holds `host`
pub fn is_host_claimed(host: HostId) -> bool {
    with_claims(|claims| claims.is_host_claimed(host))
}

/// True while a slot holds DMA `channel`
pub fn is_dma_claimed(channel: u8) -> bool {
    with_claims(|claims| claims.is_dma_claimed(channel))
}
