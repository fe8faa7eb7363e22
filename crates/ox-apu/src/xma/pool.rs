//! Hardware XMA context pool
//!
//! Lock order is always pool lock, then context lock. The pool lock only
//! guards the allocation table; descriptor contents are covered by the
//! per-context locks.

use std::sync::Arc;

use ox_core::config::MAX_XMA_CONTEXTS;
use ox_core::error::ApuError;
use ox_core::{apu_debug, xma_debug};
use ox_memory::{HeapFlags, PhysicalMemory};
use parking_lot::Mutex;

use crate::codec::FrameDecoderFactory;
use crate::xma::context::XmaContext;
use crate::xma::context_data::{XmaContextData, XMA_CONTEXT_SIZE, XMA_ERROR_NONE};
use crate::xma::packet_decoder::PacketDecoder;

/// Alignment of the context array in physical memory
const CONTEXT_ARRAY_ALIGNMENT: u32 = 256;

/// Fixed-size array of hardware contexts backed by one physical block
pub struct XmaContextPool {
    memory: Arc<dyn PhysicalMemory>,
    base: u32,
    contexts: Box<[XmaContext]>,
    lock: Mutex<()>,
}

impl XmaContextPool {
    /// Allocate the descriptor array and create `count` contexts, each with
    /// its own codec instance
    pub fn new(
        memory: Arc<dyn PhysicalMemory>,
        count: u32,
        codec_factory: &FrameDecoderFactory,
    ) -> Result<Self, ApuError> {
        if count == 0 || count > MAX_XMA_CONTEXTS {
            return Err(ApuError::Configuration(format!(
                "XMA context count must be in 1..={}, got {}",
                MAX_XMA_CONTEXTS, count
            )));
        }

        let base = memory.alloc(
            XMA_CONTEXT_SIZE as u32 * count,
            CONTEXT_ARRAY_ALIGNMENT,
            HeapFlags::DEVICE_PHYSICAL,
        )?;

        let contexts = (0..count)
            .map(|id| {
                let guest_ptr = base + id * XMA_CONTEXT_SIZE as u32;
                XmaContext::new(id, guest_ptr, PacketDecoder::new(codec_factory()))
            })
            .collect();

        apu_debug!("XMA context array at 0x{:08x} ({} contexts)", base, count);

        Ok(Self {
            memory,
            base,
            contexts,
            lock: Mutex::new(()),
        })
    }

    /// Physical address of context 0
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of hardware contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Memory capability the descriptors are accessed through
    pub fn memory(&self) -> &dyn PhysicalMemory {
        &*self.memory
    }

    /// Context by hardware id
    pub fn context(&self, id: u32) -> Option<&XmaContext> {
        self.contexts.get(id as usize)
    }

    /// All contexts, in id order
    pub fn contexts(&self) -> &[XmaContext] {
        &self.contexts
    }

    /// Context whose descriptor lives at `guest_ptr`
    pub fn context_by_ptr(&self, guest_ptr: u32) -> Option<&XmaContext> {
        let offset = guest_ptr.checked_sub(self.base)?;
        if offset % XMA_CONTEXT_SIZE as u32 != 0 {
            return None;
        }
        self.context(offset / XMA_CONTEXT_SIZE as u32)
    }

    /// Hand out the first free context. Returns its descriptor address.
    pub fn allocate(&self) -> Option<u32> {
        let _pool = self.lock.lock();

        let context = self.contexts.iter().find(|c| !c.is_allocated())?;
        context.set_allocated(true);
        xma_debug!("Allocated XMA context {} at 0x{:08x}", context.id(), context.guest_ptr());
        Some(context.guest_ptr())
    }

    /// Return a context to the pool.
    ///
    /// Waits for any decode pass on the context to finish, then zeroes the
    /// descriptor and drops decoder state.
    pub fn release(&self, guest_ptr: u32) -> Result<(), ApuError> {
        let _pool = self.lock.lock();

        let context = self
            .context_by_ptr(guest_ptr)
            .ok_or(ApuError::UnknownContext(guest_ptr))?;

        let mut decoder = context.lock();
        context.set_allocated(false);
        context.set_reserved(false);
        self.memory.fill(context.guest_ptr(), XMA_CONTEXT_SIZE, 0)?;
        decoder.discard_packet();

        xma_debug!("Released XMA context {}", context.id());
        Ok(())
    }

    /// Kick command: mark the buffers present in the descriptor as valid and
    /// rewind the output write position
    pub fn kick(&self, id: u32) -> Result<(), ApuError> {
        let context = self.context(id).ok_or(ApuError::InvalidContext(id))?;

        let _decoder = context.lock();
        let addr = context.guest_ptr();
        let mut data = XmaContextData::load(self.memory(), addr)?;

        xma_debug!(
            "Kicking context {} ({}/{} bytes)",
            id,
            data.input_buffer_read_offset,
            data.input_size()
        );

        data.input_buffer_0_valid = data.input_buffer_0_ptr != 0;
        data.input_buffer_1_valid = data.input_buffer_1_ptr != 0;
        data.output_buffer_write_offset = 0;
        data.error_status = XMA_ERROR_NONE;
        data.store(self.memory(), addr)?;

        context.set_reserved(false);
        Ok(())
    }

    /// Lock command: keep the scheduler from starting a new pass on the
    /// context until it is kicked again
    pub fn reserve(&self, id: u32) -> Result<(), ApuError> {
        let context = self.context(id).ok_or(ApuError::InvalidContext(id))?;
        context.set_reserved(true);
        xma_debug!("Set context lock {}", id);
        Ok(())
    }

    /// Clear command: return the context to its power-on state. The
    /// allocation state is left alone.
    pub fn clear(&self, id: u32) -> Result<(), ApuError> {
        let context = self.context(id).ok_or(ApuError::InvalidContext(id))?;

        let mut decoder = context.lock();
        self.memory.fill(context.guest_ptr(), XMA_CONTEXT_SIZE, 0)?;
        decoder.discard_packet();
        context.set_reserved(false);

        xma_debug!("Reset context {}", id);
        Ok(())
    }

    /// Number of contexts currently allocated
    pub fn allocated_count(&self) -> usize {
        self.contexts.iter().filter(|c| c.is_allocated()).count()
    }
}

impl Drop for XmaContextPool {
    fn drop(&mut self) {
        for context in self.contexts.iter() {
            context.lock().discard_packet();
        }
        if let Err(e) = self.memory.free(self.base) {
            tracing::warn!("Failed to free XMA context array: {}", e);
        }
        apu_debug!("XMA context pool released");
    }
}
