//! Xbox 360 physical memory constants

/// Physical memory size (512 MB)
pub const PHYSICAL_MEM_SIZE: u32 = 0x2000_0000;

/// Mask applied to guest addresses to reach the physical backing.
/// Virtual mirrors of physical memory (0xA0000000, 0xC0000000, 0xE0000000)
/// collapse onto the same bytes.
pub const PHYSICAL_ADDRESS_MASK: u32 = PHYSICAL_MEM_SIZE - 1;

/// Physical heap base (system heap allocations with the physical flag)
pub const PHYSICAL_HEAP_BASE: u32 = 0x0001_0000;

/// Smallest physical heap alignment
pub const HEAP_MIN_ALIGNMENT: u32 = 0x10;

/// Standard page size (4 KB)
pub const PAGE_SIZE: u32 = 0x1000;
