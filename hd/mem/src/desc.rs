//! Linked-list DMA descriptors
//!
//! Layout of the first word follows the GDMA linked-list format:
//! `size[11:0]`, `length[23:12]`, `suc_eof[30]`, `owner[31]`. Buffer and
//! next pointers are stored as plain addresses so that descriptor memory
//! can move between contexts.

use hd_core::DMA_DESCRIPTOR_BUFFER_MAX;

const SIZE_MASK: u32 = 0xfff;
const LENGTH_SHIFT: u32 = 12;
const SUC_EOF_BIT: u32 = 1 << 30;
const OWNER_BIT: u32 = 1 << 31;

/// Who may touch the buffer behind a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Cpu = 0,
    Dma = 1,
}

/// One hardware DMA descriptor
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaDescriptor {
    dw0: u32,
    buffer: usize,
    next: usize,
}

impl DmaDescriptor {
    pub const EMPTY: Self = Self {
        dw0: 0,
        buffer: 0,
        next: 0,
    };

    pub fn size(&self) -> usize {
        (self.dw0 & SIZE_MASK) as usize
    }

    pub fn set_size(&mut self, size: usize) {
        self.dw0 = (self.dw0 & !SIZE_MASK) | (size as u32 & SIZE_MASK);
    }

    pub fn length(&self) -> usize {
        ((self.dw0 >> LENGTH_SHIFT) & SIZE_MASK) as usize
    }

    pub fn set_length(&mut self, len: usize) {
        self.dw0 = (self.dw0 & !(SIZE_MASK << LENGTH_SHIFT))
            | ((len as u32 & SIZE_MASK) << LENGTH_SHIFT);
    }

    pub fn is_eof(&self) -> bool {
        self.dw0 & SUC_EOF_BIT != 0
    }

    pub fn set_eof(&mut self, eof: bool) {
        if eof {
            self.dw0 |= SUC_EOF_BIT;
        } else {
            self.dw0 &= !SUC_EOF_BIT;
        }
    }

    pub fn owner(&self) -> Owner {
        if self.dw0 & OWNER_BIT != 0 {
            Owner::Dma
        } else {
            Owner::Cpu
        }
    }

    pub fn set_owner(&mut self, owner: Owner) {
        match owner {
            Owner::Dma => self.dw0 |= OWNER_BIT,
            Owner::Cpu => self.dw0 &= !OWNER_BIT,
        }
    }

    /// Address of the data buffer
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Address of the next descriptor, `0` terminates the chain
    pub fn next(&self) -> usize {
        self.next
    }
}

impl Default for DmaDescriptor {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Number of descriptors needed to carry `max_transfer_sz` bytes
///
/// Always at least one.
pub const fn descriptor_count(max_transfer_sz: usize) -> usize {
    let count = max_transfer_sz.div_ceil(DMA_DESCRIPTOR_BUFFER_MAX);
    if count == 0 {
        1
    } else {
        count
    }
}

/// Link `descs` to the buffer at `addr` spanning `len` bytes
///
/// Each descriptor carries up to [`DMA_DESCRIPTOR_BUFFER_MAX`] bytes; the
/// last one is marked EOF and terminates the chain. RX descriptors are
/// linked with `length = 0` since the engine fills it in. Returns the
/// address of the head descriptor and the number of bytes linked, which is
/// short of `len` only if the chain is too small.
pub fn link_chain(
    descs: &mut [DmaDescriptor],
    addr: usize,
    len: usize,
    is_rx: bool,
) -> (usize, usize) {
    let mut remaining = len;
    let mut offset = 0;
    let mut used = 0;

    for desc in descs.iter_mut() {
        if remaining == 0 && used > 0 {
            break;
        }
        let chunk = remaining.min(DMA_DESCRIPTOR_BUFFER_MAX);
        *desc = DmaDescriptor::EMPTY;
        desc.set_size(chunk);
        desc.set_length(if is_rx { 0 } else { chunk });
        desc.set_owner(Owner::Dma);
        desc.buffer = addr + offset;
        offset += chunk;
        remaining -= chunk;
        used += 1;
    }

    if used == 0 {
        return (0, 0);
    }

    let base = descs.as_ptr() as usize;
    let stride = core::mem::size_of::<DmaDescriptor>();
    for i in 0..used {
        descs[i].next = if i + 1 < used { base + (i + 1) * stride } else { 0 };
    }
    descs[used - 1].set_eof(true);

    (base, offset)
}
