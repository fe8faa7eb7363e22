//! XMA hardware context descriptor
//!
//! The hardware context is 16 big-endian words of tightly packed bitfields
//! living in guest physical memory. Guests poke it directly, so the whole
//! record is always converted at once: unpack all 16 words on load, pack
//! all 16 on store. Field positions are bit offsets within the host-order
//! word (bit 0 = least significant).
//!
//! Fields the hardware documentation does not name are carried verbatim.

use ox_core::error::ApuError;
use ox_memory::PhysicalMemory;

/// Size of one hardware context in bytes
pub const XMA_CONTEXT_SIZE: usize = 64;

const XMA_CONTEXT_WORDS: usize = XMA_CONTEXT_SIZE / 4;

/// Bytes in one compressed input packet
pub const BYTES_PER_PACKET: usize = 2048;
/// PCM samples per decoded frame (per channel)
pub const SAMPLES_PER_FRAME: usize = 512;
/// PCM samples per subframe (per channel)
pub const SAMPLES_PER_SUBFRAME: usize = 128;
/// Output buffer granularity
pub const OUTPUT_BYTES_PER_BLOCK: usize = 256;
/// Largest output buffer a context can describe (5-bit block count)
pub const OUTPUT_MAX_SIZE_BYTES: usize = 31 * OUTPUT_BYTES_PER_BLOCK;
/// Bytes of packet header skipped by `input_buffer_read_offset`
pub const PACKET_HEADER_BYTES: usize = 4;

/// No error recorded
pub const XMA_ERROR_NONE: u8 = 0;
/// The codec rejected a packet
pub const XMA_ERROR_DECODE_FAILED: u8 = 1;
/// Sample rate / channel combination rejected by the codec
pub const XMA_ERROR_UNSUPPORTED_FORMAT: u8 = 2;

const _: () = assert!(XMA_CONTEXT_SIZE == XMA_CONTEXT_WORDS * 4);

#[inline]
const fn mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

#[inline]
fn get(word: u32, shift: u32, width: u32) -> u32 {
    (word >> shift) & mask(width)
}

#[inline]
fn put(word: &mut u32, shift: u32, width: u32, value: u32) {
    let m = mask(width) << shift;
    *word = (*word & !m) | ((value << shift) & m);
}

/// Sample rate selector (2-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum XmaSampleRate {
    Hz24000 = 0,
    Hz32000 = 1,
    Hz44100 = 2,
    Hz48000 = 3,
}

impl XmaSampleRate {
    /// Decode the 2-bit field
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Hz24000,
            1 => Self::Hz32000,
            2 => Self::Hz44100,
            _ => Self::Hz48000,
        }
    }

    /// Rate in Hz
    pub fn hz(self) -> u32 {
        match self {
            Self::Hz24000 => 24_000,
            Self::Hz32000 => 32_000,
            Self::Hz44100 => 44_100,
            Self::Hz48000 => 48_000,
        }
    }
}

/// Unpacked XMA context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmaContextData {
    // DWORD 0
    /// Number of 2 KB packets in input buffer 0 (12 bits)
    pub input_buffer_0_packet_count: u16,
    pub loop_count: u8,
    pub input_buffer_0_valid: bool,
    pub input_buffer_1_valid: bool,
    /// Output size in 256-byte blocks (5 bits)
    pub output_buffer_block_count: u8,
    /// Write position in 256-byte blocks (5 bits)
    pub output_buffer_write_offset: u8,

    // DWORD 1
    pub input_buffer_1_packet_count: u16,
    pub loop_subframe_end: u8,
    pub unk_dword_1_a: u8,
    pub loop_subframe_skip: u8,
    pub subframe_decode_count: u8,
    pub unk_dword_1_b: u8,
    /// See [`XmaSampleRate`] (2 bits)
    pub sample_rate: u8,
    pub is_stereo: bool,
    pub unk_dword_1_c: bool,
    pub output_buffer_valid: bool,

    // DWORD 2
    /// Read position in bits, counted from 4 bytes before the data
    /// (26 bits)
    pub input_buffer_read_offset: u32,
    /// Decoder error code, `XMA_ERROR_*` (6 bits)
    pub error_status: u8,

    // DWORD 3
    pub loop_start: u32,
    pub unk_dword_3: u8,

    // DWORD 4
    pub loop_end: u32,
    pub packet_metadata: u8,
    pub current_buffer: bool,

    // DWORD 5-8, physical addresses
    pub input_buffer_0_ptr: u32,
    pub input_buffer_1_ptr: u32,
    pub output_buffer_ptr: u32,
    pub overlap_add_ptr: u32,

    // DWORD 9
    pub output_buffer_read_offset: u8,
    pub unk_dword_9: u32,

    // DWORD 10-15
    pub unk_dwords_10_15: [u32; 6],
}

impl XmaContextData {
    /// Unpack a big-endian context block
    pub fn unpack(bytes: &[u8; XMA_CONTEXT_SIZE]) -> Self {
        let mut w = [0u32; XMA_CONTEXT_WORDS];
        for (word, chunk) in w.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let mut unk_dwords_10_15 = [0u32; 6];
        unk_dwords_10_15.copy_from_slice(&w[10..16]);

        Self {
            input_buffer_0_packet_count: get(w[0], 0, 12) as u16,
            loop_count: get(w[0], 12, 8) as u8,
            input_buffer_0_valid: get(w[0], 20, 1) != 0,
            input_buffer_1_valid: get(w[0], 21, 1) != 0,
            output_buffer_block_count: get(w[0], 22, 5) as u8,
            output_buffer_write_offset: get(w[0], 27, 5) as u8,

            input_buffer_1_packet_count: get(w[1], 0, 12) as u16,
            loop_subframe_end: get(w[1], 12, 2) as u8,
            unk_dword_1_a: get(w[1], 14, 3) as u8,
            loop_subframe_skip: get(w[1], 17, 3) as u8,
            subframe_decode_count: get(w[1], 20, 4) as u8,
            unk_dword_1_b: get(w[1], 24, 3) as u8,
            sample_rate: get(w[1], 27, 2) as u8,
            is_stereo: get(w[1], 29, 1) != 0,
            unk_dword_1_c: get(w[1], 30, 1) != 0,
            output_buffer_valid: get(w[1], 31, 1) != 0,

            input_buffer_read_offset: get(w[2], 0, 26),
            error_status: get(w[2], 26, 6) as u8,

            loop_start: get(w[3], 0, 26),
            unk_dword_3: get(w[3], 26, 6) as u8,

            loop_end: get(w[4], 0, 26),
            packet_metadata: get(w[4], 26, 5) as u8,
            current_buffer: get(w[4], 31, 1) != 0,

            input_buffer_0_ptr: w[5],
            input_buffer_1_ptr: w[6],
            output_buffer_ptr: w[7],
            overlap_add_ptr: w[8],

            output_buffer_read_offset: get(w[9], 0, 5) as u8,
            unk_dword_9: get(w[9], 5, 27),

            unk_dwords_10_15,
        }
    }

    /// Unpack from an arbitrary slice. Anything other than exactly
    /// [`XMA_CONTEXT_SIZE`] bytes is a configuration error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ApuError> {
        let block: &[u8; XMA_CONTEXT_SIZE] = bytes.try_into().map_err(|_| {
            ApuError::Configuration(format!(
                "XMA context must be {} bytes, got {}",
                XMA_CONTEXT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self::unpack(block))
    }

    /// Pack into a big-endian context block.
    ///
    /// Values wider than their field are truncated to the field width.
    pub fn pack(&self) -> [u8; XMA_CONTEXT_SIZE] {
        let mut w = [0u32; XMA_CONTEXT_WORDS];

        put(&mut w[0], 0, 12, self.input_buffer_0_packet_count as u32);
        put(&mut w[0], 12, 8, self.loop_count as u32);
        put(&mut w[0], 20, 1, self.input_buffer_0_valid as u32);
        put(&mut w[0], 21, 1, self.input_buffer_1_valid as u32);
        put(&mut w[0], 22, 5, self.output_buffer_block_count as u32);
        put(&mut w[0], 27, 5, self.output_buffer_write_offset as u32);

        put(&mut w[1], 0, 12, self.input_buffer_1_packet_count as u32);
        put(&mut w[1], 12, 2, self.loop_subframe_end as u32);
        put(&mut w[1], 14, 3, self.unk_dword_1_a as u32);
        put(&mut w[1], 17, 3, self.loop_subframe_skip as u32);
        put(&mut w[1], 20, 4, self.subframe_decode_count as u32);
        put(&mut w[1], 24, 3, self.unk_dword_1_b as u32);
        put(&mut w[1], 27, 2, self.sample_rate as u32);
        put(&mut w[1], 29, 1, self.is_stereo as u32);
        put(&mut w[1], 30, 1, self.unk_dword_1_c as u32);
        put(&mut w[1], 31, 1, self.output_buffer_valid as u32);

        put(&mut w[2], 0, 26, self.input_buffer_read_offset);
        put(&mut w[2], 26, 6, self.error_status as u32);

        put(&mut w[3], 0, 26, self.loop_start);
        put(&mut w[3], 26, 6, self.unk_dword_3 as u32);

        put(&mut w[4], 0, 26, self.loop_end);
        put(&mut w[4], 26, 5, self.packet_metadata as u32);
        put(&mut w[4], 31, 1, self.current_buffer as u32);

        w[5] = self.input_buffer_0_ptr;
        w[6] = self.input_buffer_1_ptr;
        w[7] = self.output_buffer_ptr;
        w[8] = self.overlap_add_ptr;

        put(&mut w[9], 0, 5, self.output_buffer_read_offset as u32);
        put(&mut w[9], 5, 27, self.unk_dword_9);

        w[10..16].copy_from_slice(&self.unk_dwords_10_15);

        let mut bytes = [0u8; XMA_CONTEXT_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(w.iter()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    /// Read and unpack the context at `addr`
    pub fn load(memory: &dyn PhysicalMemory, addr: u32) -> Result<Self, ApuError> {
        let mut bytes = [0u8; XMA_CONTEXT_SIZE];
        memory.read(addr, &mut bytes)?;
        Ok(Self::unpack(&bytes))
    }

    /// Pack and write the context to `addr`
    pub fn store(&self, memory: &dyn PhysicalMemory, addr: u32) -> Result<(), ApuError> {
        memory.write(addr, &self.pack())?;
        Ok(())
    }

    /// Sample rate selector as an enum
    pub fn sample_rate(&self) -> XmaSampleRate {
        XmaSampleRate::from_bits(self.sample_rate)
    }

    /// Output channel count
    pub fn channels(&self) -> u32 {
        if self.is_stereo {
            2
        } else {
            1
        }
    }

    /// Size of input buffer 0 in bytes
    pub fn input_buffer_0_size(&self) -> usize {
        self.input_buffer_0_packet_count as usize * BYTES_PER_PACKET
    }

    /// Combined size of both input buffers in bytes
    pub fn input_size(&self) -> usize {
        (self.input_buffer_0_packet_count as usize + self.input_buffer_1_packet_count as usize)
            * BYTES_PER_PACKET
    }

    /// Byte position in the input stream. Offsets that point into the
    /// leading packet header count as the start of input.
    pub fn input_byte_offset(&self) -> usize {
        (self.input_buffer_read_offset as usize / 8).saturating_sub(PACKET_HEADER_BYTES)
    }

    /// Set the read position from a byte offset
    pub fn set_input_byte_offset(&mut self, offset: usize) {
        self.input_buffer_read_offset = (((offset + PACKET_HEADER_BYTES) * 8) as u32) & mask(26);
    }

    /// Size of the output buffer in bytes
    pub fn output_size(&self) -> usize {
        self.output_buffer_block_count as usize * OUTPUT_BYTES_PER_BLOCK
    }

    /// Write position in bytes
    pub fn output_byte_offset(&self) -> usize {
        self.output_buffer_write_offset as usize * OUTPUT_BYTES_PER_BLOCK
    }

    /// Set the write position from a byte offset (whole blocks only)
    pub fn set_output_byte_offset(&mut self, offset: usize) {
        self.output_buffer_write_offset = ((offset / OUTPUT_BYTES_PER_BLOCK) as u8) & 0x1F;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(seed: u32) -> [u8; XMA_CONTEXT_SIZE] {
        let mut bytes = [0u8; XMA_CONTEXT_SIZE];
        let mut state = seed;
        for b in bytes.iter_mut() {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            *b = (state >> 16) as u8;
        }
        bytes
    }

    #[test]
    fn test_round_trip_preserves_every_bit() {
        for seed in 0..64 {
            let bytes = pattern(seed);
            assert_eq!(XmaContextData::unpack(&bytes).pack(), bytes);
        }
        assert_eq!(XmaContextData::unpack(&[0xFF; 64]).pack(), [0xFF; 64]);
        assert_eq!(XmaContextData::unpack(&[0; 64]).pack(), [0; 64]);
    }

    #[test]
    fn test_dword0_layout() {
        let mut bytes = [0u8; XMA_CONTEXT_SIZE];
        // packet count 3, buffer 0 valid, 16 blocks, write offset 5
        let word: u32 = 3 | (1 << 20) | (16 << 22) | (5 << 27);
        bytes[0..4].copy_from_slice(&word.to_be_bytes());

        let data = XmaContextData::unpack(&bytes);
        assert_eq!(data.input_buffer_0_packet_count, 3);
        assert!(data.input_buffer_0_valid);
        assert!(!data.input_buffer_1_valid);
        assert_eq!(data.output_buffer_block_count, 16);
        assert_eq!(data.output_buffer_write_offset, 5);
    }

    #[test]
    fn test_dword1_format_fields() {
        let data = XmaContextData {
            sample_rate: 3,
            is_stereo: true,
            output_buffer_valid: true,
            ..Default::default()
        };
        let bytes = data.pack();
        let word = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(word, (3 << 27) | (1 << 29) | (1 << 31));
        assert_eq!(data.sample_rate().hz(), 48_000);
        assert_eq!(data.channels(), 2);
    }

    #[test]
    fn test_pointers_are_big_endian() {
        let data = XmaContextData {
            input_buffer_0_ptr: 0x1234_5678,
            output_buffer_ptr: 0x0ABC_DEF0,
            ..Default::default()
        };
        let bytes = data.pack();
        assert_eq!(&bytes[20..24], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(&bytes[28..32], &[0x0A, 0xBC, 0xDE, 0xF0]);
    }

    #[test]
    fn test_pack_truncates_to_field_width() {
        let data = XmaContextData {
            output_buffer_write_offset: 0x3F,
            input_buffer_read_offset: 0xFFFF_FFFF,
            ..Default::default()
        };
        let round = XmaContextData::unpack(&data.pack());
        assert_eq!(round.output_buffer_write_offset, 0x1F);
        assert_eq!(round.input_buffer_read_offset, 0x03FF_FFFF);
        assert_eq!(round.error_status, 0);
        assert_eq!(round.output_buffer_block_count, 0);
    }

    #[test]
    fn test_from_slice_size_mismatch() {
        assert!(XmaContextData::from_slice(&[0u8; 64]).is_ok());
        assert!(matches!(
            XmaContextData::from_slice(&[0u8; 60]),
            Err(ApuError::Configuration(_))
        ));
    }

    #[test]
    fn test_offset_units() {
        let mut data = XmaContextData {
            input_buffer_read_offset: 32,
            ..Default::default()
        };
        assert_eq!(data.input_byte_offset(), 0);

        data.set_input_byte_offset(4096);
        assert_eq!(data.input_buffer_read_offset, 32 + 4096 * 8);

        data.set_output_byte_offset(2048 + 100);
        assert_eq!(data.output_buffer_write_offset, 8);
        assert_eq!(data.output_byte_offset(), 2048);
    }

    #[test]
    fn test_sample_rate_selector() {
        assert_eq!(XmaSampleRate::from_bits(0).hz(), 24_000);
        assert_eq!(XmaSampleRate::from_bits(1).hz(), 32_000);
        assert_eq!(XmaSampleRate::from_bits(2).hz(), 44_100);
        assert_eq!(XmaSampleRate::from_bits(3).hz(), 48_000);
    }
}
