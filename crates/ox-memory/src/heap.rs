//! Physical heap

use std::collections::BTreeMap;

use bitflags::bitflags;
use ox_core::error::MemoryError;

use crate::constants::HEAP_MIN_ALIGNMENT;

bitflags! {
    /// Allocation attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeapFlags: u32 {
        /// Backed by physical memory (hardware-visible)
        const PHYSICAL = 0b0001;
        /// Zero the block before returning it
        const ZERO     = 0b0010;
        /// Block is touched by a hardware unit (XMA, GPU)
        const DEVICE   = 0b0100;

        /// Physical, zeroed, device-visible
        const DEVICE_PHYSICAL = Self::PHYSICAL.bits() | Self::ZERO.bits() | Self::DEVICE.bits();
    }
}

impl Default for HeapFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A live heap allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapBlock {
    pub size: u32,
    pub flags: HeapFlags,
}

/// First-fit allocator over a fixed address window.
///
/// Only bookkeeping lives here; the bytes belong to the memory manager.
#[derive(Debug)]
pub struct PhysicalHeap {
    base: u32,
    end: u32,
    blocks: BTreeMap<u32, HeapBlock>,
}

impl PhysicalHeap {
    /// Create a heap spanning `[base, end)`
    pub fn new(base: u32, end: u32) -> Self {
        Self {
            base,
            end,
            blocks: BTreeMap::new(),
        }
    }

    /// Allocate `size` bytes aligned to `align` (rounded up to a power of two)
    pub fn allocate(&mut self, size: u32, align: u32, flags: HeapFlags) -> Result<u32, MemoryError> {
        if size == 0 {
            return Err(MemoryError::OutOfMemory { size });
        }
        let align = align.max(HEAP_MIN_ALIGNMENT).next_power_of_two() as u64;
        let size64 = size as u64;

        let mut cursor = self.base as u64;
        for (&addr, block) in &self.blocks {
            let candidate = align_up(cursor, align);
            if candidate + size64 <= addr as u64 {
                return Ok(self.insert(candidate as u32, size, flags));
            }
            cursor = cursor.max(addr as u64 + block.size as u64);
        }

        let candidate = align_up(cursor, align);
        if candidate + size64 <= self.end as u64 {
            return Ok(self.insert(candidate as u32, size, flags));
        }

        Err(MemoryError::OutOfMemory { size })
    }

    /// Release the block starting at `addr`
    pub fn free(&mut self, addr: u32) -> Result<HeapBlock, MemoryError> {
        self.blocks.remove(&addr).ok_or(MemoryError::InvalidFree(addr))
    }

    /// Look up the block starting at `addr`
    pub fn block(&self, addr: u32) -> Option<&HeapBlock> {
        self.blocks.get(&addr)
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.blocks.len()
    }

    fn insert(&mut self, addr: u32, size: u32, flags: HeapFlags) -> u32 {
        self.blocks.insert(addr, HeapBlock { size, flags });
        addr
    }
}

#[inline]
fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}
