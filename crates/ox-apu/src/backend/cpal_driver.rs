//! cpal audio driver
//!
//! `cpal::Stream` cannot move between threads on every host, so the stream
//! lives on its own thread. Frames reach it through a shared sample queue.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use super::{AudioDriver, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// Samples kept queued before the oldest are dropped (about 100 ms)
const MAX_QUEUED_SAMPLES: usize = (OUTPUT_SAMPLE_RATE as usize / 10) * OUTPUT_CHANNELS as usize;

/// Driver playing through the default cpal output device
pub struct CpalDriver {
    queue: Arc<Mutex<VecDeque<f32>>>,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_QUEUED_SAMPLES))),
            worker: None,
        }
    }

    /// Samples waiting for the device
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn open_stream(queue: Arc<Mutex<VecDeque<f32>>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))?;

    let config = cpal::StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate: cpal::SampleRate(OUTPUT_SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock();
                for sample in data.iter_mut() {
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
            },
            |e| tracing::error!("cpal stream error: {}", e),
            None,
        )
        .context("failed to build output stream")?;
    stream.play().context("failed to start output stream")?;
    Ok(stream)
}

impl AudioDriver for CpalDriver {
    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let queue = Arc::clone(&self.queue);

        let handle = thread::Builder::new()
            .name("Audio Output".to_string())
            .spawn(move || match open_stream(queue) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Returns on stop() or when the driver is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, handle));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("audio output thread exited during startup"))
            }
        }
    }

    fn stop(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                tracing::error!("Audio output thread panicked");
            }
        }
        self.queue.lock().clear();
    }

    fn submit_frame(&mut self, samples: &[f32]) -> Result<()> {
        let mut queue = self.queue.lock();
        queue.extend(samples.iter().copied());
        let excess = queue.len().saturating_sub(MAX_QUEUED_SAMPLES);
        queue.drain(..excess);
        Ok(())
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
