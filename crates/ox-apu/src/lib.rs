//! Audio processing unit for oxidized-xenon
//!
//! Models the Xbox 360 XMA decoder block: a pool of 64-byte hardware
//! contexts in guest physical memory, the register file guests use to kick
//! them, and a background thread that decodes packets into PCM. Guest audio
//! clients and the host drivers they play through live here too.

pub mod audio_system;
pub mod backend;
pub mod client;
pub mod codec;
pub mod mixer;
pub mod registers;
pub mod scheduler;
pub mod xma;

pub use audio_system::AudioSystem;
pub use codec::{FrameDecoder, NullFrameDecoder};
pub use registers::RegisterFile;
pub use scheduler::{DecodeScheduler, DecoderFence};
pub use xma::{XmaContextData, XmaContextPool};
