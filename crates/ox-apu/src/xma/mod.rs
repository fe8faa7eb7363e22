//! XMA decoder hardware
//!
//! The Xbox 360 XMA block decodes compressed audio packets from guest
//! memory into 16-bit PCM. Guests describe each job with a 64-byte
//! hardware context and start it through the register file.

pub mod context;
pub mod context_data;
pub mod packet_decoder;
pub mod pool;

pub use context::XmaContext;
pub use context_data::{XmaContextData, XmaSampleRate, XMA_CONTEXT_SIZE};
pub use packet_decoder::PacketDecoder;
pub use pool::XmaContextPool;
