//! Null codec backend

use super::{CodecError, FrameDecoder, StreamFormat, XmaPacketHeader};
use crate::xma::context_data::SAMPLES_PER_FRAME;

/// Codec that keeps the hardware timing but produces silence.
///
/// Each packet yields one silent frame per frame announced in its header,
/// so guests see their output buffers fill at the rate they expect.
#[derive(Debug, Default)]
pub struct NullFrameDecoder {
    format: Option<StreamFormat>,
}

impl NullFrameDecoder {
    pub fn new() -> Self {
        Self { format: None }
    }

    /// Format set by the last `configure` call
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }
}

impl FrameDecoder for NullFrameDecoder {
    fn configure(&mut self, format: StreamFormat) -> Result<(), CodecError> {
        self.format = Some(format);
        Ok(())
    }

    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> Result<usize, CodecError> {
        let Some(header) = XmaPacketHeader::parse(input) else {
            return Ok(0);
        };
        let channels = self.format.map_or(1, |f| f.channels) as usize;
        let samples = header.frame_count as usize * SAMPLES_PER_FRAME * channels;
        pcm.resize(pcm.len() + samples, 0);
        Ok(input.len())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_per_announced_frame() {
        let mut codec = NullFrameDecoder::new();
        codec.configure(StreamFormat::new(48_000, 2).unwrap()).unwrap();

        let mut packet = vec![0u8; 2048];
        packet[0..4].copy_from_slice(&(2u32 << 26).to_be_bytes());

        let mut pcm = Vec::new();
        assert_eq!(codec.decode_frame(&packet, &mut pcm).unwrap(), 2048);
        assert_eq!(pcm.len(), 2 * SAMPLES_PER_FRAME * 2);
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_truncated_input() {
        let mut codec = NullFrameDecoder::new();
        let mut pcm = Vec::new();
        assert_eq!(codec.decode_frame(&[1, 2], &mut pcm).unwrap(), 0);
        assert!(pcm.is_empty());
    }
}
