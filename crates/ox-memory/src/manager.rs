//! Physical memory manager

use std::sync::Arc;

use ox_core::error::MemoryError;
use parking_lot::{Mutex, RwLock};

use crate::constants::{PHYSICAL_ADDRESS_MASK, PHYSICAL_HEAP_BASE, PHYSICAL_MEM_SIZE};
use crate::heap::{HeapFlags, PhysicalHeap};
use crate::PhysicalMemory;

/// Emulated physical memory with a physical heap.
///
/// The backing store sits behind a single reader/writer lock, so a block
/// read or write (a 64-byte XMA context, a 2 KB packet) is never observed
/// half-done by another thread.
pub struct MemoryManager {
    data: RwLock<Box<[u8]>>,
    heap: Mutex<PhysicalHeap>,
    size: u32,
}

impl MemoryManager {
    /// Create a manager backing the full 512 MB physical space
    pub fn new() -> Arc<Self> {
        Self::with_size(PHYSICAL_MEM_SIZE)
    }

    /// Create a manager with a smaller backing store (tests, tools).
    /// `size` is clamped to the physical space.
    pub fn with_size(size: u32) -> Arc<Self> {
        let size = size.clamp(PHYSICAL_HEAP_BASE * 2, PHYSICAL_MEM_SIZE);
        tracing::debug!("Physical memory: 0x{:x} bytes", size);
        Arc::new(Self {
            data: RwLock::new(vec![0u8; size as usize].into_boxed_slice()),
            heap: Mutex::new(PhysicalHeap::new(PHYSICAL_HEAP_BASE, size)),
            size,
        })
    }

    /// Size of the backing store in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Translate a guest address (physical or one of its mirrors) to an
    /// offset into the backing store
    #[inline]
    pub fn translate(&self, addr: u32) -> u32 {
        addr & PHYSICAL_ADDRESS_MASK
    }

    /// Number of live physical heap allocations
    pub fn allocation_count(&self) -> usize {
        self.heap.lock().allocation_count()
    }

    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = self.translate(addr) as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.size as usize)
            .ok_or(MemoryError::OutOfRange { addr, len })?;
        Ok(start..end)
    }
}

impl PhysicalMemory for MemoryManager {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.data.read()[range]);
        Ok(())
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, data.len())?;
        self.data.write()[range].copy_from_slice(data);
        Ok(())
    }

    fn fill(&self, addr: u32, len: usize, value: u8) -> Result<(), MemoryError> {
        let range = self.range(addr, len)?;
        self.data.write()[range].fill(value);
        Ok(())
    }

    fn alloc(&self, size: u32, align: u32, flags: HeapFlags) -> Result<u32, MemoryError> {
        let addr = self.heap.lock().allocate(size, align, flags)?;
        if flags.contains(HeapFlags::ZERO) {
            self.fill(addr, size as usize, 0)?;
        }
        tracing::trace!("Physical alloc 0x{:08x} (+0x{:x}, {:?})", addr, size, flags);
        Ok(addr)
    }

    fn free(&self, addr: u32) -> Result<(), MemoryError> {
        let block = self.heap.lock().free(self.translate(addr))?;
        tracing::trace!("Physical free 0x{:08x} (+0x{:x})", addr, block.size);
        Ok(())
    }
}
