//! Memory management for oxidized-xenon
//!
//! Hardware units never hold host pointers into guest memory. They address
//! physical memory through the [`PhysicalMemory`] capability, which performs
//! the guest-to-backing translation and keeps every call atomic with respect
//! to other callers.

pub mod constants;
pub mod heap;
pub mod manager;

pub use heap::{HeapFlags, PhysicalHeap};
pub use manager::MemoryManager;

use ox_core::error::MemoryError;

/// Physical memory access capability
pub trait PhysicalMemory: Send + Sync {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Copy `data` into memory starting at `addr`
    fn write(&self, addr: u32, data: &[u8]) -> Result<(), MemoryError>;

    /// Set `len` bytes starting at `addr` to `value`
    fn fill(&self, addr: u32, len: usize, value: u8) -> Result<(), MemoryError>;

    /// Allocate a physical block
    fn alloc(&self, size: u32, align: u32, flags: HeapFlags) -> Result<u32, MemoryError>;

    /// Free a block returned by [`PhysicalMemory::alloc`]
    fn free(&self, addr: u32) -> Result<(), MemoryError>;

    /// Read a big-endian u32
    fn read_be32(&self, addr: u32) -> Result<u32, MemoryError> {
        let mut bytes = [0u8; 4];
        self.read(addr, &mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Write a big-endian u32
    fn write_be32(&self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }
}
