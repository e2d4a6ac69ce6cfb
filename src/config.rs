//! Configuration file loading, environment overrides and validation.

use crate::defaults;
use crate::error::{DbucksError, Result};
use crate::rewards::{RewardTier, default_tiers, validate_tiers};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub meter: MeterConfig,
    pub tone: ToneConfig,
    pub rewards: RewardsConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub analysis_window: usize,
}

/// Level estimation and session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeterConfig {
    pub reference_pressure: f64,
    pub calibration_offset_db: f64,
    pub noise_floor_db: f64,
    pub smoothing_factor: f64,
    pub buffer_size: usize,
    pub update_interval_ms: u64,
    pub session_duration_secs: u32,
}

/// Calibration tone configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToneConfig {
    pub frequency_hz: f64,
    pub duration_secs: f64,
    pub amplitude: f64,
}

/// Reward tier table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardsConfig {
    pub tiers: Vec<RewardTier>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            analysis_window: defaults::ANALYSIS_WINDOW,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            reference_pressure: defaults::REFERENCE_PRESSURE,
            calibration_offset_db: defaults::CALIBRATION_OFFSET_DB,
            noise_floor_db: defaults::NOISE_FLOOR_DB,
            smoothing_factor: defaults::SMOOTHING_FACTOR,
            buffer_size: defaults::BUFFER_SIZE,
            update_interval_ms: defaults::UPDATE_INTERVAL_MS,
            session_duration_secs: defaults::SESSION_DURATION_SECS,
        }
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            frequency_hz: defaults::TONE_FREQUENCY_HZ,
            duration_secs: defaults::TONE_DURATION_SECS,
            amplitude: defaults::TONE_AMPLITUDE,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. The result is validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DbucksError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                DbucksError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML or out-of-range values are still reported as errors.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(DbucksError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DBUCKS_AUDIO_DEVICE → audio.device
    /// - DBUCKS_CALIBRATION_OFFSET → meter.calibration_offset_db
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(device) = std::env::var("DBUCKS_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(offset) = std::env::var("DBUCKS_CALIBRATION_OFFSET")
            && !offset.is_empty()
        {
            self.meter.calibration_offset_db =
                offset
                    .trim()
                    .parse()
                    .map_err(|_| DbucksError::ConfigInvalidValue {
                        key: "DBUCKS_CALIBRATION_OFFSET".to_string(),
                        message: format!("'{}' is not a number", offset),
                    })?;
        }

        Ok(self)
    }

    /// Check value ranges that the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> DbucksError {
            DbucksError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.analysis_window == 0 {
            return Err(invalid("audio.analysis_window", "must be positive"));
        }
        if !(self.meter.reference_pressure > 0.0) {
            return Err(invalid("meter.reference_pressure", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.meter.smoothing_factor) {
            return Err(invalid(
                "meter.smoothing_factor",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.meter.buffer_size == 0 {
            return Err(invalid("meter.buffer_size", "must be at least 1"));
        }
        if self.meter.update_interval_ms == 0 {
            return Err(invalid("meter.update_interval_ms", "must be positive"));
        }
        if self.meter.session_duration_secs == 0 {
            return Err(invalid("meter.session_duration_secs", "must be positive"));
        }
        if !(self.tone.frequency_hz > 0.0) {
            return Err(invalid("tone.frequency_hz", "must be positive"));
        }
        if !(self.tone.duration_secs > 0.0) {
            return Err(invalid("tone.duration_secs", "must be positive"));
        }
        if self.tone.duration_secs > defaults::MAX_TONE_SECS {
            return Err(invalid("tone.duration_secs", "must be at most 60 seconds"));
        }
        if !(0.0..=1.0).contains(&self.tone.amplitude) {
            return Err(invalid("tone.amplitude", "must be between 0.0 and 1.0"));
        }
        validate_tiers(&self.rewards.tiers)
    }

    /// Serialize the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DbucksError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/dbucks/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dbucks")
            .join("config.toml")
    }
}
