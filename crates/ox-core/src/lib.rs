//! Core types shared by the oxidized-xenon crates
//!
//! Holds the error taxonomy, the TOML-backed configuration and the
//! logging setup used by the memory and APU crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{EmulatorError, Result};
