//! Host audio drivers

use anyhow::Result;
use ox_core::config::AudioDriverKind;
use ox_core::error::ApuError;

#[cfg(feature = "cpal")]
pub mod cpal_driver;
pub mod null;

#[cfg(feature = "cpal")]
pub use cpal_driver::CpalDriver;
pub use null::NullAudioDriver;

/// Output rate of every client stream
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;
/// Channels handed to a driver (interleaved stereo)
pub const OUTPUT_CHANNELS: u16 = 2;

/// Host output used by one audio client
pub trait AudioDriver: Send {
    /// Prepare the driver for playback
    fn start(&mut self) -> Result<()>;
    /// Stop playback and release resources
    fn stop(&mut self);
    /// Queue one frame of interleaved stereo f32 samples
    fn submit_frame(&mut self, samples: &[f32]) -> Result<()>;
}

/// Build the driver selected in the configuration
pub fn create_driver(kind: AudioDriverKind) -> Result<Box<dyn AudioDriver>, ApuError> {
    match kind {
        AudioDriverKind::Null => Ok(Box::new(NullAudioDriver::new())),
        #[cfg(feature = "cpal")]
        AudioDriverKind::Cpal => Ok(Box::new(CpalDriver::new())),
        #[cfg(not(feature = "cpal"))]
        AudioDriverKind::Cpal => Err(ApuError::Driver(
            "built without the `cpal` feature".to_string(),
        )),
    }
}
