//! APU audio system
//!
//! Owns the XMA context pool, the register file and the decoder thread,
//! plus the table of guest audio clients. Everything is wired together
//! here; nothing in the crate is global.

use std::sync::Arc;
use std::time::Duration;

use ox_core::config::{AudioDriverKind, Config};
use ox_core::error::ApuError;
use ox_core::apu_debug;
use ox_memory::PhysicalMemory;
use parking_lot::Mutex;

use crate::backend::create_driver;
use crate::client::{ClientCallback, ClientTable};
use crate::codec::FrameDecoderFactory;
use crate::registers::RegisterFile;
use crate::scheduler::{DecodeScheduler, DecoderFence, PassSummary};
use crate::xma::XmaContextPool;

/// Audio processing unit
pub struct AudioSystem {
    memory: Arc<dyn PhysicalMemory>,
    pool: Arc<XmaContextPool>,
    registers: RegisterFile,
    scheduler: DecodeScheduler,
    clients: Mutex<ClientTable>,
    driver_kind: AudioDriverKind,
}

impl AudioSystem {
    /// Build the system from configuration. The decoder thread is not
    /// started until [`AudioSystem::setup`].
    pub fn new(
        config: &Config,
        memory: Arc<dyn PhysicalMemory>,
        codec_factory: &FrameDecoderFactory,
    ) -> ox_core::Result<Self> {
        config.validate()?;

        let pool = Arc::new(XmaContextPool::new(
            Arc::clone(&memory),
            config.apu.xma_context_count,
            codec_factory,
        )?);
        let fence = Arc::new(DecoderFence::new());
        let registers = RegisterFile::new(Arc::clone(&pool), Arc::clone(&fence));
        let scheduler = DecodeScheduler::new(
            Arc::clone(&pool),
            fence,
            Duration::from_millis(config.apu.decoder_idle_interval_ms),
        );

        Ok(Self {
            memory,
            pool,
            registers,
            scheduler,
            clients: Mutex::new(ClientTable::new(config.apu.max_clients, config.audio.volume)),
            driver_kind: config.audio.driver,
        })
    }

    /// Start the decoder thread
    pub fn setup(&mut self) -> ox_core::Result<()> {
        self.scheduler.start()?;
        apu_debug!("Audio system started ({} XMA contexts)", self.pool.len());
        Ok(())
    }

    /// Stop the decoder thread and drop every client
    pub fn shutdown(&mut self) {
        self.scheduler.stop();
        self.clients.lock().clear(&*self.memory);
        apu_debug!("Audio system stopped");
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Bus read in the APU MMIO window (guest byte order)
    pub fn mmio_read(&self, addr: u32) -> Result<u32, ApuError> {
        Ok(self.registers.read(addr)?.swap_bytes())
    }

    /// Bus write in the APU MMIO window (guest byte order)
    pub fn mmio_write(&self, addr: u32, value: u32) -> Result<(), ApuError> {
        self.registers.write(addr, value.swap_bytes())
    }

    /// Hand out a free XMA context; returns its descriptor address
    pub fn allocate_xma_context(&self) -> Option<u32> {
        self.pool.allocate()
    }

    /// Return an XMA context by descriptor address
    pub fn release_xma_context(&self, guest_ptr: u32) -> Result<(), ApuError> {
        self.pool.release(guest_ptr)
    }

    /// Register a guest audio client with the configured host driver
    pub fn register_client(&self, callback: u32, callback_arg: u32) -> Result<usize, ApuError> {
        let driver = create_driver(self.driver_kind)?;
        self.clients
            .lock()
            .register(&*self.memory, driver, callback, callback_arg)
    }

    /// Queue one guest frame for client `index`
    pub fn submit_frame(&self, index: usize, samples_ptr: u32) -> Result<(), ApuError> {
        self.clients.lock().submit_frame(&*self.memory, index, samples_ptr)
    }

    pub fn unregister_client(&self, index: usize) -> Result<(), ApuError> {
        self.clients.lock().unregister(&*self.memory, index)
    }

    /// Callback and wrapped argument the dispatcher should invoke for
    /// client `index`
    pub fn client_callback(&self, index: usize) -> Option<ClientCallback> {
        self.clients.lock().callback(index)
    }

    /// Run one decode pass on the calling thread
    pub fn run_decode_pass(&self) -> PassSummary {
        self.scheduler.run_pass()
    }

    pub fn pool(&self) -> &Arc<XmaContextPool> {
        &self.pool
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
