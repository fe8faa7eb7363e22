//! Client frame mixer

/// Channels in a guest audio frame
pub const FRAME_CHANNELS: usize = 6;
/// Samples per channel in a guest audio frame
pub const FRAME_SAMPLES: usize = 256;
/// Size of a guest frame in memory (big-endian f32, channel-planar)
pub const FRAME_BYTES: usize = FRAME_CHANNELS * FRAME_SAMPLES * 4;

/// -3 dB, applied to centre and surround channels
const DOWNMIX_GAIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Folds 5.1 client frames down to stereo and applies a master volume.
/// Output samples are interleaved f32 PCM in the range [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct Mixer {
    volume: f32,
}

impl Mixer {
    /// Create a new mixer with unity volume.
    pub fn new() -> Self {
        Self { volume: 1.0 }
    }

    /// Create a mixer with the given master volume.
    pub fn with_volume(volume: f32) -> Self {
        let mut mixer = Self::new();
        mixer.set_volume(volume);
        mixer
    }

    /// Set master volume (clamped between 0.0 and 1.0).
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Get the current volume.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Decode a frame as stored in guest memory into six planar channels
    /// (FL, FR, C, LFE, RL, RR).
    pub fn decode_frame(bytes: &[u8; FRAME_BYTES]) -> [[f32; FRAME_SAMPLES]; FRAME_CHANNELS] {
        let mut planes = [[0.0f32; FRAME_SAMPLES]; FRAME_CHANNELS];
        for (plane, chunk) in planes.iter_mut().zip(bytes.chunks_exact(FRAME_SAMPLES * 4)) {
            for (sample, word) in plane.iter_mut().zip(chunk.chunks_exact(4)) {
                *sample = f32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            }
        }
        planes
    }

    /// Downmix six planar channels into interleaved stereo. LFE is dropped.
    pub fn downmix(&self, planes: &[[f32; FRAME_SAMPLES]; FRAME_CHANNELS]) -> Vec<f32> {
        let [fl, fr, c, _lfe, rl, rr] = planes;
        let mut output = Vec::with_capacity(FRAME_SAMPLES * 2);

        for i in 0..FRAME_SAMPLES {
            let centre = c[i] * DOWNMIX_GAIN;
            let left = fl[i] + centre + rl[i] * DOWNMIX_GAIN;
            let right = fr[i] + centre + rr[i] * DOWNMIX_GAIN;
            output.push((left * self.volume).clamp(-1.0, 1.0));
            output.push((right * self.volume).clamp(-1.0, 1.0));
        }

        output
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}
