//! XMA context pool entry

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::xma::packet_decoder::PacketDecoder;

/// One hardware XMA context.
///
/// The descriptor itself lives in guest physical memory at `guest_ptr`;
/// this struct only holds host-side state. The mutex guards the packet
/// decoder and, by convention, every read-modify-write of the descriptor.
pub struct XmaContext {
    id: u32,
    guest_ptr: u32,
    in_use: AtomicBool,
    /// Set by the lock command band, cleared by kick
    reserved: AtomicBool,
    decoder: Mutex<PacketDecoder>,
}

impl XmaContext {
    pub(crate) fn new(id: u32, guest_ptr: u32, decoder: PacketDecoder) -> Self {
        Self {
            id,
            guest_ptr,
            in_use: AtomicBool::new(false),
            reserved: AtomicBool::new(false),
            decoder: Mutex::new(decoder),
        }
    }

    /// Hardware context id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Physical address of the descriptor
    pub fn guest_ptr(&self) -> u32 {
        self.guest_ptr
    }

    /// Whether the context is handed out to the guest
    pub fn is_allocated(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub(crate) fn set_allocated(&self, in_use: bool) {
        self.in_use.store(in_use, Ordering::Release);
    }

    /// Whether the guest has disabled the context through the lock band
    pub fn is_reserved(&self) -> bool {
        self.reserved.load(Ordering::Acquire)
    }

    pub(crate) fn set_reserved(&self, reserved: bool) {
        self.reserved.store(reserved, Ordering::Release);
    }

    /// Take the context lock, blocking until it is free
    pub fn lock(&self) -> MutexGuard<'_, PacketDecoder> {
        self.decoder.lock()
    }

    /// Take the context lock if nobody holds it
    pub fn try_lock(&self) -> Option<MutexGuard<'_, PacketDecoder>> {
        self.decoder.try_lock()
    }
}
