//! Frame decoder capability
//!
//! The XMA block hands compressed packet bytes to a codec backend and gets
//! PCM frames back. The codec math itself lives outside this crate; any
//! backend implementing [`FrameDecoder`] can be plugged into the contexts.

use ox_core::error::ApuError;
use thiserror::Error;

pub mod null;

pub use null::NullFrameDecoder;

/// Failure code reported by a codec backend
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("codec error {0:#x}")]
pub struct CodecError(pub i32);

/// Validated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u32,
}

impl StreamFormat {
    /// Rates the XMA hardware can be configured for
    pub const SAMPLE_RATES: [u32; 4] = [24_000, 32_000, 44_100, 48_000];

    /// Check a sample rate / channel combination
    pub fn new(sample_rate: u32, channels: u32) -> Result<Self, ApuError> {
        if !Self::SAMPLE_RATES.contains(&sample_rate) || !(1..=2).contains(&channels) {
            return Err(ApuError::UnsupportedFormat {
                sample_rate,
                channels,
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }
}

/// Codec backend used by a context's packet decoder.
///
/// Implementations are stateful: a frame may start in one packet and end in
/// the next, so the backend keeps its bit reservoir between calls until
/// [`FrameDecoder::reset`].
pub trait FrameDecoder: Send {
    /// Switch the output format. Called before the first packet and whenever
    /// the context's format changes.
    fn configure(&mut self, format: StreamFormat) -> Result<(), CodecError>;

    /// Decode from the unconsumed tail of the current packet.
    ///
    /// Appends any completed frame's interleaved samples to `pcm` and returns
    /// how many input bytes were consumed. Returning 0 without producing
    /// samples means the packet holds nothing more.
    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> Result<usize, CodecError>;

    /// Drop any partially assembled frame
    fn reset(&mut self);
}

/// Factory producing one codec instance per hardware context
pub type FrameDecoderFactory = dyn Fn() -> Box<dyn FrameDecoder> + Send + Sync;

/// XMA packet header (first big-endian word of every 2 KB packet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmaPacketHeader {
    /// Number of frames that begin in this packet (6 bits)
    pub frame_count: u8,
    /// Bit offset of the first frame that begins in this packet (15 bits)
    pub frame_offset_bits: u16,
    /// Packet metadata (3 bits)
    pub metadata: u8,
    /// Packets to skip before the next packet of this stream (8 bits)
    pub skip_count: u8,
}

impl XmaPacketHeader {
    /// Parse the header at the start of `packet`
    pub fn parse(packet: &[u8]) -> Option<Self> {
        let word = u32::from_be_bytes(packet.get(0..4)?.try_into().ok()?);
        Some(Self {
            frame_count: (word >> 26) as u8,
            frame_offset_bits: ((word >> 11) & 0x7FFF) as u16,
            metadata: ((word >> 8) & 0x7) as u8,
            skip_count: (word & 0xFF) as u8,
        })
    }

    /// Encode into a header word
    pub fn to_word(self) -> u32 {
        ((self.frame_count as u32 & 0x3F) << 26)
            | ((self.frame_offset_bits as u32 & 0x7FFF) << 11)
            | ((self.metadata as u32 & 0x7) << 8)
            | self.skip_count as u32
    }
}
