//! Per-context packet decoder
//!
//! Wraps a codec backend with the packet/frame bookkeeping the XMA block
//! needs: one 2 KB packet is staged at a time and decoded frame by frame.
//! PCM leaves the decoder in whole output blocks only; samples that do not
//! fill a block stay queued until later frames complete it.

use ox_core::error::ApuError;
use ox_core::xma_trace;

use crate::codec::{FrameDecoder, StreamFormat};
use crate::xma::context_data::{BYTES_PER_PACKET, OUTPUT_BYTES_PER_BLOCK};

/// Stateful packet decoder owned by one XMA context
pub struct PacketDecoder {
    codec: Box<dyn FrameDecoder>,
    format: Option<StreamFormat>,
    packet: Box<[u8; BYTES_PER_PACKET]>,
    packet_len: usize,
    packet_pos: usize,
    /// Decoded samples not yet handed out
    pcm: Vec<i16>,
    pcm_pos: usize,
    /// Output granule in bytes
    block_bytes: usize,
}

impl PacketDecoder {
    /// Create a decoder that hands out 256-byte output blocks
    pub fn new(codec: Box<dyn FrameDecoder>) -> Self {
        Self::with_block_size(codec, OUTPUT_BYTES_PER_BLOCK)
    }

    /// Create a decoder with a custom output granule (rounded to whole
    /// 16-bit samples)
    pub fn with_block_size(codec: Box<dyn FrameDecoder>, block_bytes: usize) -> Self {
        Self {
            codec,
            format: None,
            packet: Box::new([0; BYTES_PER_PACKET]),
            packet_len: 0,
            packet_pos: 0,
            pcm: Vec::new(),
            pcm_pos: 0,
            block_bytes: block_bytes.max(2) & !1,
        }
    }

    /// Output granule in bytes
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Stage one packet for decoding.
    ///
    /// At most [`BYTES_PER_PACKET`] bytes of `input` are used. Samples still
    /// pending from the previous packet are kept.
    pub fn prepare_packet(
        &mut self,
        input: &[u8],
        sample_rate: u32,
        channels: u32,
    ) -> Result<(), ApuError> {
        let format = StreamFormat::new(sample_rate, channels)?;
        if self.format != Some(format) {
            self.codec.configure(format).map_err(|_| ApuError::UnsupportedFormat {
                sample_rate,
                channels,
            })?;
            self.format = Some(format);
        }

        let len = input.len().min(BYTES_PER_PACKET);
        self.packet[..len].copy_from_slice(&input[..len]);
        self.packet_len = len;
        self.packet_pos = 0;
        xma_trace!("Prepared packet ({} bytes, {} Hz, {} ch)", len, sample_rate, channels);
        Ok(())
    }

    /// Write whole blocks of big-endian 16-bit PCM into
    /// `output[offset..offset + max_bytes]`.
    ///
    /// Returns the number of bytes written, always a multiple of
    /// [`PacketDecoder::block_bytes`]. 0 means the staged packet is used up
    /// and the next one should be prepared; fewer than one block of samples
    /// may still be queued at that point. The window must hold at least one
    /// block, otherwise the call fails without touching any state.
    pub fn decode_packet(
        &mut self,
        output: &mut [u8],
        offset: usize,
        max_bytes: usize,
    ) -> Result<usize, ApuError> {
        let window = max_bytes.min(output.len().saturating_sub(offset));
        let window_blocks = window / self.block_bytes;
        if window_blocks == 0 {
            return Err(ApuError::Configuration(format!(
                "output window of {} bytes is smaller than one {}-byte block",
                window, self.block_bytes
            )));
        }

        loop {
            let queued = self.pending_bytes();
            if queued >= self.block_bytes {
                let bytes = queued.min(window_blocks * self.block_bytes) / self.block_bytes
                    * self.block_bytes;
                let count = bytes / 2;
                let samples = &self.pcm[self.pcm_pos..self.pcm_pos + count];
                let dest = &mut output[offset..offset + bytes];
                for (chunk, sample) in dest.chunks_exact_mut(2).zip(samples) {
                    chunk.copy_from_slice(&sample.to_be_bytes());
                }
                self.pcm_pos += count;
                return Ok(bytes);
            }

            if self.packet_pos >= self.packet_len {
                return Ok(0);
            }

            self.pcm.drain(..self.pcm_pos);
            self.pcm_pos = 0;
            let queued_before = self.pcm.len();
            let input = &self.packet[self.packet_pos..self.packet_len];
            let consumed = self
                .codec
                .decode_frame(input, &mut self.pcm)
                .map_err(|e| ApuError::DecodeFailure(e.0))?;

            if consumed == 0 && self.pcm.len() == queued_before {
                // No progress possible on this packet
                self.packet_pos = self.packet_len;
            } else {
                self.packet_pos = (self.packet_pos + consumed).min(self.packet_len);
            }
        }
    }

    /// Drop the staged packet and any pending samples. Safe to call at any
    /// time; calling it twice is the same as calling it once.
    pub fn discard_packet(&mut self) {
        self.packet_len = 0;
        self.packet_pos = 0;
        self.pcm.clear();
        self.pcm_pos = 0;
        self.format = None;
        self.codec.reset();
    }

    /// Whether staged input or decoded samples remain
    pub fn has_pending(&self) -> bool {
        self.pcm_pos < self.pcm.len() || self.packet_pos < self.packet_len
    }

    /// Bytes of decoded PCM waiting to be handed out
    pub fn pending_bytes(&self) -> usize {
        (self.pcm.len() - self.pcm_pos) * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;

    /// Emits `frame_len` samples per call, valued by the first input byte,
    /// consuming `step` bytes each time.
    struct SteppingCodec {
        frame_len: usize,
        step: usize,
        fail: bool,
    }

    impl FrameDecoder for SteppingCodec {
        fn configure(&mut self, _format: StreamFormat) -> Result<(), CodecError> {
            Ok(())
        }

        fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> Result<usize, CodecError> {
            if self.fail {
                return Err(CodecError(-22));
            }
            pcm.extend(std::iter::repeat(input[0] as i16).take(self.frame_len));
            Ok(self.step.min(input.len()))
        }

        fn reset(&mut self) {}
    }

    /// Decoder handing out single samples, so windows can be any even size
    fn decoder(frame_len: usize, step: usize) -> PacketDecoder {
        PacketDecoder::with_block_size(
            Box::new(SteppingCodec {
                frame_len,
                step,
                fail: false,
            }),
            2,
        )
    }

    #[test]
    fn test_empty_decoder_reports_exhausted() {
        let mut dec = decoder(4, 1024);
        let mut out = [0u8; 16];
        assert_eq!(dec.decode_packet(&mut out, 0, 16).unwrap(), 0);
        assert!(!dec.has_pending());
    }

    #[test]
    fn test_frames_until_packet_exhausted() {
        let mut dec = decoder(4, 1024);
        let mut packet = [0u8; BYTES_PER_PACKET];
        packet[0] = 7;
        packet[1024] = 9;
        dec.prepare_packet(&packet, 48_000, 1).unwrap();

        let mut out = [0u8; 64];
        assert_eq!(dec.decode_packet(&mut out, 0, 64).unwrap(), 8);
        assert_eq!(&out[0..4], &[0, 7, 0, 7]);
        assert_eq!(dec.decode_packet(&mut out, 8, 56).unwrap(), 8);
        assert_eq!(&out[8..10], &[0, 9]);
        assert_eq!(dec.decode_packet(&mut out, 16, 48).unwrap(), 0);
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut dec = decoder(8, BYTES_PER_PACKET);
        let mut packet = [0u8; BYTES_PER_PACKET];
        packet[0] = 1;
        dec.prepare_packet(&packet, 32_000, 2).unwrap();

        let mut out = [0u8; 16];
        assert_eq!(dec.decode_packet(&mut out, 0, 6).unwrap(), 6);
        assert!(dec.has_pending());

        // A new packet does not drop the samples still owed
        packet[0] = 2;
        dec.prepare_packet(&packet, 32_000, 2).unwrap();
        assert_eq!(dec.decode_packet(&mut out, 6, 10).unwrap(), 10);
        assert_eq!(&out[14..16], &[0, 1]);
        assert_eq!(dec.decode_packet(&mut out, 0, 16).unwrap(), 16);
        assert_eq!(&out[0..2], &[0, 2]);
    }

    #[test]
    fn test_unsupported_format() {
        let mut dec = decoder(4, 1024);
        let packet = [0u8; BYTES_PER_PACKET];
        assert!(matches!(
            dec.prepare_packet(&packet, 11_025, 1),
            Err(ApuError::UnsupportedFormat { .. })
        ));
        assert!(!dec.has_pending());
    }

    #[test]
    fn test_decode_failure() {
        let mut dec = PacketDecoder::with_block_size(
            Box::new(SteppingCodec {
                frame_len: 4,
                step: 1024,
                fail: true,
            }),
            2,
        );
        let packet = [0u8; BYTES_PER_PACKET];
        dec.prepare_packet(&packet, 44_100, 1).unwrap();

        let mut out = [0u8; 16];
        assert_eq!(
            dec.decode_packet(&mut out, 0, 16),
            Err(ApuError::DecodeFailure(-22))
        );
    }

    #[test]
    fn test_discard_is_idempotent() {
        let mut dec = decoder(8, 1024);
        let packet = [3u8; BYTES_PER_PACKET];
        dec.prepare_packet(&packet, 48_000, 1).unwrap();
        let mut out = [0u8; 4];
        dec.decode_packet(&mut out, 0, 4).unwrap();
        assert!(dec.has_pending());

        dec.discard_packet();
        assert!(!dec.has_pending());
        dec.discard_packet();
        assert!(!dec.has_pending());
        assert_eq!(dec.decode_packet(&mut out, 0, 4).unwrap(), 0);
    }

    #[test]
    fn test_only_whole_blocks_leave_the_decoder() {
        // 300 mono samples per packet: 600 bytes, not a block multiple
        let mut dec = PacketDecoder::new(Box::new(SteppingCodec {
            frame_len: 300,
            step: BYTES_PER_PACKET,
            fail: false,
        }));
        let mut packet = [0u8; BYTES_PER_PACKET];
        packet[0] = 1;
        dec.prepare_packet(&packet, 48_000, 1).unwrap();

        let mut out = vec![0u8; 2048];
        assert_eq!(dec.decode_packet(&mut out, 0, 2048).unwrap(), 512);
        assert_eq!(dec.decode_packet(&mut out, 512, 1536).unwrap(), 0);
        assert_eq!(dec.pending_bytes(), 88);
        assert!(dec.has_pending());

        // The queued tail leads the next packet's samples
        packet[0] = 2;
        dec.prepare_packet(&packet, 48_000, 1).unwrap();
        assert_eq!(dec.decode_packet(&mut out, 512, 1536).unwrap(), 512);
        assert_eq!(&out[512 + 86..512 + 88], &[0, 1]);
        assert_eq!(&out[512 + 88..512 + 90], &[0, 2]);
        assert_eq!(dec.decode_packet(&mut out, 1024, 1024).unwrap(), 0);
        assert_eq!(dec.pending_bytes(), 176);
    }

    #[test]
    fn test_window_limits_blocks() {
        let mut dec = PacketDecoder::new(Box::new(SteppingCodec {
            frame_len: 512,
            step: BYTES_PER_PACKET,
            fail: false,
        }));
        dec.prepare_packet(&[5u8; BYTES_PER_PACKET], 24_000, 1).unwrap();

        let mut out = vec![0u8; 1024];
        // 300 bytes of room only fits one block
        assert_eq!(dec.decode_packet(&mut out, 0, 300).unwrap(), 256);
        assert_eq!(dec.pending_bytes(), 768);
        assert_eq!(dec.decode_packet(&mut out, 256, 768).unwrap(), 768);
    }

    #[test]
    fn test_window_below_one_block_rejected() {
        let mut dec = PacketDecoder::new(Box::new(SteppingCodec {
            frame_len: 512,
            step: BYTES_PER_PACKET,
            fail: false,
        }));
        dec.prepare_packet(&[5u8; BYTES_PER_PACKET], 24_000, 1).unwrap();

        let mut out = vec![0u8; 1024];
        assert!(matches!(
            dec.decode_packet(&mut out, 0, 255),
            Err(ApuError::Configuration(_))
        ));
        assert!(matches!(
            dec.decode_packet(&mut out, 1000, 1024),
            Err(ApuError::Configuration(_))
        ));
        // The staged packet is untouched and still decodes in full
        assert!(dec.has_pending());
        assert_eq!(dec.decode_packet(&mut out, 0, 1024).unwrap(), 1024);
    }
}
