//! Logging setup for oxidized-xenon
//!
//! Levels come from [`DebugConfig`]; a `RUST_LOG` in the environment takes
//! precedence. APU code logs under the `apu` and `xma` targets through the
//! macros below, so `RUST_LOG=xma=trace` isolates the decoder.

use std::fs::File;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, DebugConfig, LogLevel};
use crate::error::Result;

/// Tracing filter for a configured level
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

/// Filter with the configured level as default directive
pub fn env_filter(config: &DebugConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level_filter(config.log_level).into())
        .from_env_lossy()
}

/// Install the global subscriber.
///
/// Fails only if the configured log file cannot be created. If another
/// subscriber is already installed it is left in place.
pub fn init(config: &Config) -> Result<()> {
    let debug = &config.debug;
    if debug.log_level == LogLevel::Off {
        return Ok(());
    }

    let file_layer = if debug.log_to_file {
        let file = File::create(&debug.log_path)?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_names(true),
        )
    } else {
        None
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(console_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}

/// Install the subscriber for a default configuration (tests, quick starts)
pub fn init_default() {
    // Default config logs to the console only, which cannot fail
    let _ = init(&Config::default());
}

// Per-target macros used by the APU crate

/// Log an APU trace message (register traffic)
#[macro_export]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "apu", $($arg)*)
    };
}

/// Log an APU debug message
#[macro_export]
macro_rules! apu_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "apu", $($arg)*)
    };
}

/// Log an XMA decoder trace message
#[macro_export]
macro_rules! xma_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "xma", $($arg)*)
    };
}

/// Log an XMA decoder debug message
#[macro_export]
macro_rules! xma_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "xma", $($arg)*)
    };
}
