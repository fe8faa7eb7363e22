//! Null audio driver

use anyhow::Result;

use super::AudioDriver;

/// Driver with no sound output. Keeps the last frame for inspection.
#[derive(Debug, Default)]
pub struct NullAudioDriver {
    started: bool,
    frames: usize,
    last_frame: Option<Vec<f32>>,
}

impl NullAudioDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Frames accepted since the last start
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn last_frame(&self) -> Option<&[f32]> {
        self.last_frame.as_deref()
    }
}

impl AudioDriver for NullAudioDriver {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.frames = 0;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        self.last_frame = None;
    }

    fn submit_frame(&mut self, samples: &[f32]) -> Result<()> {
        if self.started {
            self.frames += 1;
            self.last_frame = Some(samples.to_vec());
        }
        Ok(())
    }
}
