//! Audio clients
//!
//! A client is a guest sound renderer: it registers a callback, then pushes
//! one 5.1 frame at a time. Each frame is folded to stereo and queued on the
//! client's host driver.

use ox_core::apu_debug;
use ox_core::error::ApuError;
use ox_memory::{HeapFlags, PhysicalMemory};

use crate::backend::AudioDriver;
use crate::mixer::{Mixer, FRAME_BYTES};

/// Size of the guest block holding a client's wrapped callback argument
const WRAPPED_ARG_SIZE: u32 = 8;

/// Guest callback registered by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientCallback {
    /// Guest function address
    pub callback: u32,
    /// Argument as passed at registration
    pub callback_arg: u32,
    /// Guest address of the big-endian copy of the argument
    pub wrapped_arg_ptr: u32,
}

struct AudioClient {
    driver: Box<dyn AudioDriver>,
    callback: ClientCallback,
}

/// Fixed set of client slots
pub struct ClientTable {
    slots: Vec<Option<AudioClient>>,
    mixer: Mixer,
}

impl ClientTable {
    pub fn new(max_clients: usize, volume: f32) -> Self {
        Self {
            slots: (0..max_clients).map(|_| None).collect(),
            mixer: Mixer::with_volume(volume),
        }
    }

    /// Claim the first free slot. The driver is started before the slot is
    /// handed out; on any failure the slot stays free.
    pub fn register(
        &mut self,
        memory: &dyn PhysicalMemory,
        mut driver: Box<dyn AudioDriver>,
        callback: u32,
        callback_arg: u32,
    ) -> Result<usize, ApuError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ApuError::ClientLimit(self.slots.len()))?;

        driver.start().map_err(|e| ApuError::Driver(e.to_string()))?;

        let wrapped_arg_ptr = match memory.alloc(WRAPPED_ARG_SIZE, 0x10, HeapFlags::ZERO) {
            Ok(ptr) => ptr,
            Err(e) => {
                driver.stop();
                return Err(e.into());
            }
        };
        if let Err(e) = memory.write_be32(wrapped_arg_ptr, callback_arg) {
            driver.stop();
            let _ = memory.free(wrapped_arg_ptr);
            return Err(e.into());
        }

        self.slots[index] = Some(AudioClient {
            driver,
            callback: ClientCallback {
                callback,
                callback_arg,
                wrapped_arg_ptr,
            },
        });

        apu_debug!(
            "Registered audio client {} (callback 0x{:08x}, arg 0x{:08x})",
            index,
            callback,
            callback_arg
        );
        Ok(index)
    }

    /// Read one frame from `samples_ptr` and queue it on the client's driver
    pub fn submit_frame(
        &mut self,
        memory: &dyn PhysicalMemory,
        index: usize,
        samples_ptr: u32,
    ) -> Result<(), ApuError> {
        let client = self
            .slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(ApuError::InvalidClient(index))?;

        let mut bytes = [0u8; FRAME_BYTES];
        memory.read(samples_ptr, &mut bytes)?;

        let stereo = self.mixer.downmix(&Mixer::decode_frame(&bytes));
        client
            .driver
            .submit_frame(&stereo)
            .map_err(|e| ApuError::Driver(e.to_string()))
    }

    /// Stop the client's driver and free its slot
    pub fn unregister(&mut self, memory: &dyn PhysicalMemory, index: usize) -> Result<(), ApuError> {
        let mut client = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(ApuError::InvalidClient(index))?;

        client.driver.stop();
        memory.free(client.callback.wrapped_arg_ptr)?;
        apu_debug!("Unregistered audio client {}", index);
        Ok(())
    }

    /// Callback registered in slot `index`
    pub fn callback(&self, index: usize) -> Option<ClientCallback> {
        self.slots.get(index)?.as_ref().map(|c| c.callback)
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.mixer.set_volume(volume);
    }

    /// Unregister every client
    pub fn clear(&mut self, memory: &dyn PhysicalMemory) {
        for index in 0..self.slots.len() {
            if self.slots[index].is_some() {
                if let Err(e) = self.unregister(memory, index) {
                    tracing::warn!("Failed to unregister audio client {}: {}", index, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{FRAME_SAMPLES, FRAME_CHANNELS};
    use ox_memory::MemoryManager;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Driver sharing its submitted frames with the test
    struct CaptureDriver {
        frames: Arc<Mutex<Vec<Vec<f32>>>>,
    }

    impl AudioDriver for CaptureDriver {
        fn start(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}

        fn submit_frame(&mut self, samples: &[f32]) -> anyhow::Result<()> {
            self.frames.lock().push(samples.to_vec());
            Ok(())
        }
    }

    struct FailingDriver;

    impl AudioDriver for FailingDriver {
        fn start(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("device unplugged")
        }

        fn stop(&mut self) {}

        fn submit_frame(&mut self, _samples: &[f32]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (Box<dyn AudioDriver>, Arc<Mutex<Vec<Vec<f32>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let driver = CaptureDriver {
            frames: Arc::clone(&frames),
        };
        (Box::new(driver), frames)
    }

    #[test]
    fn test_register_wraps_argument() {
        let memory = MemoryManager::with_size(0x10_0000);
        let mut table = ClientTable::new(2, 1.0);
        let (driver, _frames) = capture();

        let index = table.register(&*memory, driver, 0x8200_1000, 0xDEAD_BEEF).unwrap();
        let cb = table.callback(index).unwrap();
        assert_eq!(cb.callback, 0x8200_1000);
        assert_eq!(memory.read_be32(cb.wrapped_arg_ptr).unwrap(), 0xDEAD_BEEF);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_client_limit() {
        let memory = MemoryManager::with_size(0x10_0000);
        let mut table = ClientTable::new(1, 1.0);
        table.register(&*memory, capture().0, 1, 2).unwrap();
        assert_eq!(
            table.register(&*memory, capture().0, 3, 4),
            Err(ApuError::ClientLimit(1))
        );
    }

    #[test]
    fn test_driver_start_failure_keeps_slot_free() {
        let memory = MemoryManager::with_size(0x10_0000);
        let mut table = ClientTable::new(1, 1.0);
        assert!(matches!(
            table.register(&*memory, Box::new(FailingDriver), 1, 2),
            Err(ApuError::Driver(_))
        ));
        assert!(table.is_empty());
        assert_eq!(memory.allocation_count(), 0);
    }

    #[test]
    fn test_submit_frame_downmixes() {
        let memory = MemoryManager::with_size(0x10_0000);
        let mut table = ClientTable::new(2, 1.0);
        let (driver, frames) = capture();
        let index = table.register(&*memory, driver, 1, 2).unwrap();

        let frame_ptr = memory.alloc(FRAME_BYTES as u32, 0x100, HeapFlags::ZERO).unwrap();
        // Front-left plane at 0.25
        for i in 0..FRAME_SAMPLES as u32 {
            memory.write_be32(frame_ptr + i * 4, 0.25f32.to_bits()).unwrap();
        }

        table.submit_frame(&*memory, index, frame_ptr).unwrap();
        let frames = frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), FRAME_SAMPLES * 2);
        assert_eq!(frames[0][0], 0.25);
        assert_eq!(frames[0][1], 0.0);
        assert_eq!(FRAME_BYTES, FRAME_CHANNELS * FRAME_SAMPLES * 4);
    }

    #[test]
    fn test_unregister_frees_slot() {
        let memory = MemoryManager::with_size(0x10_0000);
        let mut table = ClientTable::new(2, 1.0);
        let index = table.register(&*memory, capture().0, 1, 2).unwrap();
        assert_eq!(memory.allocation_count(), 1);

        table.unregister(&*memory, index).unwrap();
        assert!(table.callback(index).is_none());
        assert_eq!(memory.allocation_count(), 0);
        assert_eq!(table.unregister(&*memory, index), Err(ApuError::InvalidClient(index)));
        assert_eq!(table.submit_frame(&*memory, 5, 0), Err(ApuError::InvalidClient(5)));
    }
}
