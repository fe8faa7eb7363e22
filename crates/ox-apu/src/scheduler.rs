//! XMA decode scheduler
//!
//! A background thread sleeps on a fence, and every wake-up scans the
//! whole context pool once. Contexts whose lock is held elsewhere are
//! skipped and picked up by a later pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ox_core::error::ApuError;
use ox_core::{apu_debug, xma_trace};
use ox_memory::PhysicalMemory;
use parking_lot::{Condvar, Mutex};

use crate::xma::context_data::{
    XmaContextData, BYTES_PER_PACKET, OUTPUT_BYTES_PER_BLOCK, XMA_ERROR_DECODE_FAILED,
    XMA_ERROR_UNSUPPORTED_FORMAT,
};
use crate::xma::{PacketDecoder, XmaContext, XmaContextPool};

/// Edge-triggered wake-up for the decoder thread.
///
/// Any number of signals before the waiter runs collapse into one wake-up,
/// and each wake-up consumes the signal.
#[derive(Default)]
pub struct DecoderFence {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl DecoderFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the waiter
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    /// Wait for a signal or until `timeout` elapses. Returns whether a
    /// signal was consumed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signaled, false)
    }
}

/// What one scan over the pool did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Contexts that had valid input and were run
    pub decoded: usize,
    /// Contexts skipped because their lock was held
    pub busy: usize,
    /// Contexts skipped because the guest locked them
    pub reserved: usize,
    /// Contexts whose run ended in an error
    pub failed: usize,
}

/// Progress made on one context
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub decode_calls: usize,
    pub packets: usize,
    pub bytes_written: usize,
}

/// Scan every context once and decode the ones with valid input
pub fn decode_pass(pool: &XmaContextPool) -> PassSummary {
    let mut summary = PassSummary::default();

    for context in pool.contexts() {
        let Some(mut decoder) = context.try_lock() else {
            summary.busy += 1;
            continue;
        };

        if !context.is_allocated() {
            continue;
        }
        if context.is_reserved() {
            summary.reserved += 1;
            continue;
        }

        match process_context(pool.memory(), context, &mut decoder) {
            Ok(None) => {}
            Ok(Some(stats)) => {
                summary.decoded += 1;
                xma_trace!(
                    "Context {}: {} packets, {} bytes out",
                    context.id(),
                    stats.packets,
                    stats.bytes_written
                );
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!("XMA context {} decode aborted: {}", context.id(), e);
            }
        }
    }

    summary
}

/// Run one context if either input buffer is valid. The caller holds the
/// context lock for the whole read-modify-write.
fn process_context(
    memory: &dyn PhysicalMemory,
    context: &XmaContext,
    decoder: &mut PacketDecoder,
) -> Result<Option<DecodeStats>, ApuError> {
    let addr = context.guest_ptr();
    let mut data = XmaContextData::load(memory, addr)?;

    if !data.input_buffer_0_valid && !data.input_buffer_1_valid {
        return Ok(None);
    }

    data.input_buffer_0_valid = false;
    data.input_buffer_1_valid = false;
    data.output_buffer_valid = false;

    let result = run_decode(memory, &mut data, decoder);
    if let Err(e) = &result {
        data.error_status = match e {
            ApuError::UnsupportedFormat { .. } => XMA_ERROR_UNSUPPORTED_FORMAT,
            _ => XMA_ERROR_DECODE_FAILED,
        };
    }

    data.store(memory, addr)?;
    result.map(Some)
}

/// Pull packets through the decoder until input runs out or the output
/// buffer is full, tracking positions in `data`.
fn run_decode(
    memory: &dyn PhysicalMemory,
    data: &mut XmaContextData,
    decoder: &mut PacketDecoder,
) -> Result<DecodeStats, ApuError> {
    let input_size = data.input_size();
    let buffer_0_size = data.input_buffer_0_size();
    let mut input_offset = data.input_byte_offset();

    let output_size = data.output_size();
    let start_offset = data.output_byte_offset().min(output_size);
    let mut output_offset = start_offset;
    let mut output = vec![0u8; output_size];

    let mut packet = [0u8; BYTES_PER_PACKET];
    let mut stats = DecodeStats::default();

    let outcome = loop {
        let input_remaining = input_size.saturating_sub(input_offset);
        if input_remaining == 0 && !decoder.has_pending() {
            break Ok(());
        }

        // Only whole blocks are reported back, so only whole blocks are
        // handed out; a sub-block tail stays queued in the decoder
        let output_remaining =
            (output_size - output_offset) / OUTPUT_BYTES_PER_BLOCK * OUTPUT_BYTES_PER_BLOCK;
        if output_remaining == 0 {
            // The guest kicks again with a fresh output buffer
            break Ok(());
        }

        stats.decode_calls += 1;
        let written = match decoder.decode_packet(&mut output, output_offset, output_remaining) {
            Ok(written) => written,
            Err(e) => {
                decoder.discard_packet();
                break Err(e);
            }
        };

        if written == 0 {
            if input_remaining == 0 {
                break Ok(());
            }

            let (base, offset) = if input_offset < buffer_0_size {
                (data.input_buffer_0_ptr, input_offset)
            } else {
                (data.input_buffer_1_ptr, input_offset - buffer_0_size)
            };
            let len = input_remaining.min(BYTES_PER_PACKET);
            if let Err(e) = memory.read(base.wrapping_add(offset as u32), &mut packet[..len]) {
                break Err(ApuError::from(e));
            }

            let sample_rate = data.sample_rate().hz();
            let channels = data.channels();
            if let Err(e) = decoder.prepare_packet(&packet[..len], sample_rate, channels) {
                decoder.discard_packet();
                break Err(e);
            }
            input_offset += len;
            stats.packets += 1;
        }

        output_offset += written;
        data.set_input_byte_offset(input_offset);
        data.set_output_byte_offset(output_offset);
    };

    if output_offset > start_offset {
        memory.write(
            data.output_buffer_ptr.wrapping_add(start_offset as u32),
            &output[start_offset..output_offset],
        )?;
        stats.bytes_written = output_offset - start_offset;
    }

    outcome.map(|()| stats)
}

/// Owner of the decoder thread
pub struct DecodeScheduler {
    pool: Arc<XmaContextPool>,
    fence: Arc<DecoderFence>,
    running: Arc<AtomicBool>,
    idle_interval: Duration,
    thread: Option<JoinHandle<()>>,
}

impl DecodeScheduler {
    /// Create a stopped scheduler
    pub fn new(pool: Arc<XmaContextPool>, fence: Arc<DecoderFence>, idle_interval: Duration) -> Self {
        Self {
            pool,
            fence,
            running: Arc::new(AtomicBool::new(false)),
            idle_interval,
            thread: None,
        }
    }

    /// Spawn the decoder thread
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::Release);
        let pool = Arc::clone(&self.pool);
        let fence = Arc::clone(&self.fence);
        let running = Arc::clone(&self.running);
        let idle_interval = self.idle_interval;

        let handle = thread::Builder::new()
            .name("Audio Decoder".to_string())
            .spawn(move || {
                apu_debug!("Decoder thread started");
                while running.load(Ordering::Acquire) {
                    fence.wait(idle_interval);
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    decode_pass(&pool);
                }
                apu_debug!("Decoder thread exiting");
            });

        match handle {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Stop and join the decoder thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.fence.signal();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Decoder thread panicked");
            }
        }
    }

    /// Whether the decoder thread is alive
    pub fn is_running(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::Acquire)
    }

    /// Run one pass on the calling thread
    pub fn run_pass(&self) -> PassSummary {
        decode_pass(&self.pool)
    }
}

impl Drop for DecodeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
