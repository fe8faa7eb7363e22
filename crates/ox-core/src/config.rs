//! Configuration management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Number of XMA context ids the kick/lock/clear command bands can address
/// (10 words of 32 bits).
pub const MAX_XMA_CONTEXTS: u32 = 320;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// XMA decoder hardware settings
    pub apu: ApuConfig,
    /// Host audio output settings
    pub audio: AudioConfig,
    /// Debug settings
    pub debug: DebugConfig,
}

/// XMA decoder hardware settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApuConfig {
    /// Number of hardware XMA contexts
    pub xma_context_count: u32,
    /// Fallback wake interval of the decoder thread when no kick arrives
    pub decoder_idle_interval_ms: u64,
    /// Maximum number of registered audio clients
    pub max_clients: usize,
}

impl Default for ApuConfig {
    fn default() -> Self {
        Self {
            xma_context_count: MAX_XMA_CONTEXTS,
            decoder_idle_interval_ms: 500,
            max_clients: 8,
        }
    }
}

/// Host audio driver selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioDriverKind {
    /// No sound output
    #[default]
    Null,
    /// cpal output (requires the `cpal` feature of ox-apu)
    Cpal,
}

/// Host audio output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub driver: AudioDriverKind,
    /// Master volume, 0.0 - 1.0
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            driver: AudioDriverKind::Null,
            volume: 1.0,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Debug settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oxidized-xenon.log"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults if no file exists
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("oxidized-xenon").join("config.toml"))
    }

    /// Check values that would make the hardware model inconsistent
    pub fn validate(&self) -> Result<()> {
        let count = self.apu.xma_context_count;
        if count == 0 || count > MAX_XMA_CONTEXTS {
            return Err(ConfigError::Invalid(format!(
                "xma_context_count must be in 1..={}, got {}",
                MAX_XMA_CONTEXTS, count
            ))
            .into());
        }
        if self.apu.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be non-zero".to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.apu.xma_context_count, 320);
        assert_eq!(config.apu.max_clients, 8);
        assert_eq!(config.audio.driver, AudioDriverKind::Null);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[apu]\nxma_context_count = 4\n").unwrap();
        assert_eq!(config.apu.xma_context_count, 4);
        assert_eq!(config.apu.decoder_idle_interval_ms, 500);
        assert_eq!(config.debug.log_level, LogLevel::Info);
    }

    #[test]
    fn test_validate_rejects_context_count() {
        let mut config = Config::default();
        config.apu.xma_context_count = 321;
        assert!(config.validate().is_err());

        config.apu.xma_context_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("oxidized-xenon-config-{}", std::process::id()))
            .join("config.toml");

        let mut config = Config::default();
        config.apu.xma_context_count = 16;
        config.audio.volume = 0.5;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
