//! Error types for oxidized-xenon

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("APU error: {0}")]
    Apu(#[from] ApuError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Physical memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Access out of range: 0x{addr:08x} (+0x{len:x})")]
    OutOfRange { addr: u32, len: usize },

    #[error("Physical heap exhausted (requested 0x{size:x} bytes)")]
    OutOfMemory { size: u32 },

    #[error("Free of unallocated address 0x{0:08x}")]
    InvalidFree(u32),
}

/// Audio processing unit errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApuError {
    /// Fatal setup error (descriptor size, context count, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported format: {sample_rate} Hz, {channels} channel(s)")]
    UnsupportedFormat { sample_rate: u32, channels: u32 },

    /// Codec returned a failure code
    #[error("Decode failure (code {0:#x})")]
    DecodeFailure(i32),

    #[error("Misaligned register access at 0x{0:04x}")]
    Alignment(u32),

    #[error("Invalid XMA context id {0}")]
    InvalidContext(u32),

    #[error("No XMA context at address 0x{0:08x}")]
    UnknownContext(u32),

    #[error("Audio client limit reached ({0})")]
    ClientLimit(usize),

    #[error("Invalid audio client index {0}")]
    InvalidClient(usize),

    #[error("Audio driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EmulatorError>;
