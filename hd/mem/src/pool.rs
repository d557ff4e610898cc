//! Descriptor memory

use core::ops::Range;

use heapless::Vec;

use crate::desc::DmaDescriptor;

/// Source of DMA descriptor memory and DMA reachability policy
pub trait DmaMemory {
    /// Hand out a block of at least `count` descriptors
    fn alloc_descriptors(&mut self, count: usize) -> Option<&'static mut [DmaDescriptor]>;

    /// Return a block obtained from [`DmaMemory::alloc_descriptors`]
    fn free_descriptors(&mut self, descs: &'static mut [DmaDescriptor]);

    /// True if the DMA engine can reach `len` bytes at `addr`
    fn is_dma_capable(&self, addr: usize, len: usize) -> bool;
}

/// Fixed pool of equally sized descriptor blocks
///
/// Storage is split into `BLOCKS` blocks up front. Every slot needs two
/// blocks (TX and RX).
pub struct DescriptorPool<const BLOCKS: usize> {
    free: Vec<&'static mut [DmaDescriptor], BLOCKS>,
    block_len: usize,
    total: usize,
    dma_region: Range<usize>,
}

impl<const BLOCKS: usize> DescriptorPool<BLOCKS> {
    /// Split `storage` into blocks of `block_len` descriptors
    ///
    /// Trailing descriptors that do not fill a block and blocks beyond
    /// `BLOCKS` are left unused.
    pub fn new(storage: &'static mut [DmaDescriptor], block_len: usize) -> Self {
        let mut free = Vec::new();
        if block_len > 0 {
            for block in storage.chunks_exact_mut(block_len) {
                if free.push(block).is_err() {
                    break;
                }
            }
        }
        let total = free.len();
        Self {
            free,
            block_len,
            total,
            dma_region: 0..usize::MAX,
        }
    }

    /// Restrict DMA reachability to `region`
    pub fn with_dma_region(mut self, region: Range<usize>) -> Self {
        self.dma_region = region;
        self
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Blocks carved out of the storage
    pub fn total_blocks(&self) -> usize {
        self.total
    }

    /// Blocks not currently handed out
    pub fn free_blocks(&self) -> usize {
        self.free.len()
    }
}

impl<const BLOCKS: usize> DmaMemory for DescriptorPool<BLOCKS> {
    fn alloc_descriptors(&mut self, count: usize) -> Option<&'static mut [DmaDescriptor]> {
        if count == 0 || count > self.block_len {
            return None;
        }
        let block = self.free.pop()?;
        block.fill(DmaDescriptor::EMPTY);
        Some(block)
    }

    fn free_descriptors(&mut self, descs: &'static mut [DmaDescriptor]) {
        // Blocks handed out by this pool always fit back
        let _ = self.free.push(descs);
    }

    fn is_dma_capable(&self, addr: usize, len: usize) -> bool {
        match addr.checked_add(len) {
            Some(end) => addr >= self.dma_region.start && end <= self.dma_region.end,
            None => false,
        }
    }
}
