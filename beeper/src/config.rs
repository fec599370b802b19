//! Tone engine configuration (`beeper.toml`)
//!
//! Settings are stored in TOML format. Missing fields take their defaults, so
//! an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_BUFFER_COUNT;
use crate::synth::Waveform;

/// Configuration file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "beeper.toml";

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneConfig {
    /// Listener gain (default: 1.0, must be >= 0)
    #[serde(default = "default_gain")]
    pub master_gain: f32,
    /// Waveform used for tone synthesis (default: sine)
    #[serde(default)]
    pub waveform: Waveform,
    /// Backend buffers in the rotation pool (default: 2)
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
}

fn default_gain() -> f32 {
    1.0
}
fn default_buffer_count() -> usize {
    DEFAULT_BUFFER_COUNT
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            master_gain: default_gain(),
            waveform: Waveform::default(),
            buffer_count: default_buffer_count(),
        }
    }
}

/// Configuration load/save/validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("master gain must be a finite value >= 0, got {0}")]
    InvalidGain(f32),

    #[error("buffer pool needs at least one buffer, got {0}")]
    InvalidBufferCount(usize),
}

impl ToneConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.master_gain.is_finite() || self.master_gain < 0.0 {
            return Err(ConfigError::InvalidGain(self.master_gain));
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::InvalidBufferCount(self.buffer_count));
        }
        Ok(())
    }
}

/// Returns the platform-specific configuration directory.
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.beeper", "", "Beeper")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Parse and validate a configuration file
pub fn load_from(path: &Path) -> Result<ToneConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: ToneConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Write a configuration file, creating parent directories as needed
pub fn save_to(path: &Path, config: &ToneConfig) -> Result<(), ConfigError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Loads the configuration from the platform config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> ToneConfig {
    config_dir()
        .and_then(|dir| load_from(&dir.join(CONFIG_FILE_NAME)).ok())
        .unwrap_or_default()
}

/// Saves the configuration to the platform config directory.
pub fn save(config: &ToneConfig) -> Result<(), ConfigError> {
    match config_dir() {
        Some(dir) => save_to(&dir.join(CONFIG_FILE_NAME), config),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ToneConfig::default();
        assert!((config.master_gain - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.waveform, Waveform::Sine);
        assert_eq!(config.buffer_count, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: ToneConfig = toml::from_str("").unwrap();
        assert_eq!(config, ToneConfig::default());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
waveform = "square"
master_gain = 0.25
"#;
        let config: ToneConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.waveform, Waveform::Square);
        assert!((config.master_gain - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.buffer_count, 2); // default
    }

    #[test]
    fn test_config_rejects_unknown_waveform() {
        assert!(toml::from_str::<ToneConfig>("waveform = \"saw\"").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let negative = ToneConfig {
            master_gain: -0.5,
            ..ToneConfig::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::InvalidGain(_))
        ));

        let nan = ToneConfig {
            master_gain: f32::NAN,
            ..ToneConfig::default()
        };
        assert!(matches!(nan.validate(), Err(ConfigError::InvalidGain(_))));

        let empty_pool = ToneConfig {
            buffer_count: 0,
            ..ToneConfig::default()
        };
        assert!(matches!(
            empty_pool.validate(),
            Err(ConfigError::InvalidBufferCount(0))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ToneConfig {
            master_gain: 0.5,
            waveform: Waveform::Square,
            buffer_count: 3,
        };

        save_to(&path, &config).unwrap();
        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "buffer_count = 0\n").unwrap();
        assert!(matches!(
            load_from(&path),
            Err(ConfigError::InvalidBufferCount(0))
        ));

        std::fs::write(&path, "master_gain = \"loud\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_from(&dir.path().join("absent.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
