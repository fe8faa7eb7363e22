//! APU register file
//!
//! Guests reach the register file through an MMIO window and address it
//! with 16-bit offsets. Most registers are plain storage; the XMA command
//! bands turn a written bitmask into per-context commands, and one register
//! hands out a rotating context id when read.

use std::sync::Arc;

use ox_core::error::ApuError;
use ox_core::{apu_debug, apu_trace};
use parking_lot::Mutex;

use crate::scheduler::DecoderFence;
use crate::xma::XmaContextPool;

/// Guest virtual base of the APU MMIO window
pub const APU_MMIO_BASE: u32 = 0x7FEA_0000;
/// Mask selecting the MMIO window
pub const APU_MMIO_MASK: u32 = 0xFFFF_0000;
/// Size of the register space in bytes
pub const REGISTER_SPACE_SIZE: usize = 0x1_0000;

/// Read: rotating id of the context "being processed"
pub const XMA_CURRENT_CONTEXT: u32 = 0x1818;
/// Write: kick (enable) contexts
pub const XMA_KICK_BASE: u32 = 0x1940;
/// Write: lock (disable) contexts
pub const XMA_LOCK_BASE: u32 = 0x1A40;
/// Write: clear (reset) contexts
pub const XMA_CLEAR_BASE: u32 = 0x1A80;
/// Words per command band; each word covers 32 context ids
pub const COMMAND_BAND_WORDS: u32 = 10;

/// Command carried by a band write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmaCommand {
    Kick,
    Lock,
    Clear,
}

impl XmaCommand {
    /// Map a register offset to its command and word index within the band
    pub fn decode(offset: u32) -> Option<(Self, u32)> {
        [
            (Self::Kick, XMA_KICK_BASE),
            (Self::Lock, XMA_LOCK_BASE),
            (Self::Clear, XMA_CLEAR_BASE),
        ]
        .into_iter()
        .find_map(|(command, base)| {
            let word = offset.checked_sub(base)? / 4;
            (word < COMMAND_BAND_WORDS).then_some((command, word))
        })
    }
}

/// Context ids selected by the set bits of `value` in band word `word`
pub fn context_ids(word: u32, value: u32) -> impl Iterator<Item = u32> {
    (0..32u32)
        .filter(move |bit| value & (1 << bit) != 0)
        .map(move |bit| word * 32 + bit)
}

struct RegisterState {
    words: Box<[u32]>,
    current_context: u32,
    next_context: u32,
}

/// XMA register file
pub struct RegisterFile {
    state: Mutex<RegisterState>,
    pool: Arc<XmaContextPool>,
    fence: Arc<DecoderFence>,
}

impl RegisterFile {
    /// Create the register file over a context pool and the decoder fence
    pub fn new(pool: Arc<XmaContextPool>, fence: Arc<DecoderFence>) -> Self {
        Self {
            state: Mutex::new(RegisterState {
                words: vec![0u32; REGISTER_SPACE_SIZE / 4].into_boxed_slice(),
                current_context: 0,
                next_context: 1,
            }),
            pool,
            fence,
        }
    }

    /// Read a register (host byte order)
    pub fn read(&self, offset: u32) -> Result<u32, ApuError> {
        let r = check_offset(offset)?;
        let mut state = self.state.lock();

        let value = if r == XMA_CURRENT_CONTEXT {
            // Games probing this while locking a context must never see the
            // same id twice in a row
            let count = self.pool.len() as u32;
            state.current_context = state.next_context % count;
            state.next_context = (state.current_context + 1) % count;
            state.words[(r / 4) as usize] = state.current_context;
            state.current_context
        } else {
            state.words[(r / 4) as usize]
        };

        apu_trace!("ReadRegister({:04X}) = {:08X}", r, value);
        Ok(value)
    }

    /// Write a register (host byte order), running any command it carries
    pub fn write(&self, offset: u32, value: u32) -> Result<(), ApuError> {
        let r = check_offset(offset)?;
        apu_trace!("WriteRegister({:04X}, {:08X})", r, value);

        self.state.lock().words[(r / 4) as usize] = value;

        if let Some((command, word)) = XmaCommand::decode(r) {
            self.execute(command, word, value);
        }
        Ok(())
    }

    /// Last value stored at `offset`, without read side effects
    pub fn peek(&self, offset: u32) -> Result<u32, ApuError> {
        let r = check_offset(offset)?;
        Ok(self.state.lock().words[(r / 4) as usize])
    }

    fn execute(&self, command: XmaCommand, word: u32, value: u32) {
        let mut kicked = false;

        for id in context_ids(word, value) {
            let result = match command {
                XmaCommand::Kick => self.pool.kick(id).map(|()| kicked = true),
                XmaCommand::Lock => self.pool.reserve(id),
                XmaCommand::Clear => self.pool.clear(id),
            };
            if let Err(e) = result {
                tracing::warn!("XMA {:?} for context {} ignored: {}", command, id, e);
            }
        }

        if kicked {
            apu_debug!("Signalling decoder after kick (word {}, mask {:08X})", word, value);
            self.fence.signal();
        }
    }
}

fn check_offset(offset: u32) -> Result<u32, ApuError> {
    let r = offset & 0xFFFF;
    if r % 4 != 0 {
        return Err(ApuError::Alignment(r));
    }
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameDecoder, NullFrameDecoder};
    use crate::xma::XmaContextData;
    use ox_memory::{MemoryManager, PhysicalMemory};
    use std::time::Duration;

    fn registers(count: u32) -> (Arc<MemoryManager>, Arc<XmaContextPool>, Arc<DecoderFence>, RegisterFile) {
        let memory = MemoryManager::with_size(0x10_0000);
        let factory = || Box::new(NullFrameDecoder::new()) as Box<dyn FrameDecoder>;
        let pool = Arc::new(XmaContextPool::new(memory.clone(), count, &factory).unwrap());
        let fence = Arc::new(DecoderFence::new());
        let regs = RegisterFile::new(Arc::clone(&pool), Arc::clone(&fence));
        (memory, pool, fence, regs)
    }

    #[test]
    fn test_command_decode() {
        assert_eq!(XmaCommand::decode(0x1940), Some((XmaCommand::Kick, 0)));
        assert_eq!(XmaCommand::decode(0x1964), Some((XmaCommand::Kick, 9)));
        assert_eq!(XmaCommand::decode(0x1968), None);
        assert_eq!(XmaCommand::decode(0x1A44), Some((XmaCommand::Lock, 1)));
        assert_eq!(XmaCommand::decode(0x1A80), Some((XmaCommand::Clear, 0)));
        assert_eq!(XmaCommand::decode(0x1818), None);
    }

    #[test]
    fn test_context_ids() {
        let ids: Vec<u32> = context_ids(2, 0x8000_0005).collect();
        assert_eq!(ids, vec![64, 66, 95]);
    }

    #[test]
    fn test_misaligned_access_rejected() {
        let (_memory, _pool, _fence, regs) = registers(4);
        assert_eq!(regs.write(0x1942, 1), Err(ApuError::Alignment(0x1942)));
        assert_eq!(regs.read(0x1819), Err(ApuError::Alignment(0x1819)));
        assert_eq!(regs.peek(0x1940).unwrap(), 0);
    }

    #[test]
    fn test_plain_register_storage() {
        let (_memory, _pool, _fence, regs) = registers(4);
        regs.write(0x1804, 0x0200_0000).unwrap();
        assert_eq!(regs.read(0x1804).unwrap(), 0x0200_0000);
        // Offsets are taken from the low 16 bits of the bus address
        assert_eq!(regs.read(APU_MMIO_BASE | 0x1804).unwrap(), 0x0200_0000);
    }

    #[test]
    fn test_rotating_context_id() {
        let (_memory, _pool, _fence, regs) = registers(4);
        let ids: Vec<u32> = (0..6).map(|_| regs.read(XMA_CURRENT_CONTEXT).unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn test_kick_signals_decoder() {
        let (memory, pool, fence, regs) = registers(4);
        let ptr = pool.allocate().unwrap();
        let data = XmaContextData {
            input_buffer_0_ptr: 0x8000,
            input_buffer_1_ptr: 0x9000,
            output_buffer_write_offset: 3,
            ..Default::default()
        };
        data.store(&*memory, ptr).unwrap();

        regs.write(XMA_KICK_BASE, 0x1).unwrap();

        let data = XmaContextData::load(&*memory, ptr).unwrap();
        assert!(data.input_buffer_0_valid);
        assert!(data.input_buffer_1_valid);
        assert_eq!(data.output_buffer_write_offset, 0);
        assert!(fence.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_kick_maps_band_word_and_bit() {
        let (memory, pool, fence, regs) = registers(40);
        let ptrs: Vec<u32> = (0..40).map(|_| pool.allocate().unwrap()).collect();
        for &ptr in &ptrs {
            let data = XmaContextData {
                input_buffer_0_ptr: 0x8000,
                ..Default::default()
            };
            data.store(&*memory, ptr).unwrap();
        }

        // Word 1, bit 1 names context 33 only
        regs.write(XMA_KICK_BASE + 4, 0b10).unwrap();
        assert!(fence.wait(Duration::from_millis(10)));

        for (id, &ptr) in ptrs.iter().enumerate() {
            let data = XmaContextData::load(&*memory, ptr).unwrap();
            assert_eq!(data.input_buffer_0_valid, id == 33, "context {}", id);
        }
    }

    #[test]
    fn test_kick_out_of_range_context_ignored() {
        let (_memory, _pool, fence, regs) = registers(4);
        regs.write(XMA_KICK_BASE + 4, 0x1).unwrap();
        assert!(!fence.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_lock_then_kick() {
        let (_memory, pool, _fence, regs) = registers(4);
        pool.allocate().unwrap();
        pool.allocate().unwrap();

        regs.write(XMA_LOCK_BASE, 0b10).unwrap();
        assert!(!pool.context(0).unwrap().is_reserved());
        assert!(pool.context(1).unwrap().is_reserved());

        regs.write(XMA_KICK_BASE, 0b10).unwrap();
        assert!(!pool.context(1).unwrap().is_reserved());
    }

    #[test]
    fn test_clear_resets_descriptor() {
        let (memory, pool, _fence, regs) = registers(4);
        let ptr = pool.allocate().unwrap();
        memory.fill(ptr, 64, 0x77).unwrap();

        regs.write(XMA_CLEAR_BASE, 0x1).unwrap();
        let mut bytes = [0xFFu8; 64];
        memory.read(ptr, &mut bytes).unwrap();
        assert_eq!(bytes, [0u8; 64]);
        assert!(pool.context(0).unwrap().is_allocated());
    }
}
