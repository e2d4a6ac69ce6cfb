//! Calibrated sound pressure level estimation.
//!
//! Turns one frame of normalized samples into a dB SPL reading:
//! RMS, log conversion against the reference pressure, calibration offset,
//! then the noise-floor clamp.

use crate::config::Config;
use crate::defaults;

/// Immutable parameters for converting samples to a calibrated reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParams {
    /// Reference pressure in the normalized sample domain.
    pub reference_pressure: f64,
    /// Device gain correction in dB.
    pub calibration_offset_db: f64,
    /// Calibrated readings below this are reported as 0.
    pub noise_floor_db: f64,
    /// Weight of the previous smoothed value (0.0 to 1.0).
    pub smoothing_factor: f64,
    /// Capacity of the median buffer.
    pub buffer_size: usize,
    /// Level update cadence in milliseconds.
    pub update_interval_ms: u64,
    /// Session length in seconds.
    pub session_duration_secs: u32,
}

impl Default for CalibrationParams {
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

impl From<&Config> for CalibrationParams {
    fn from(config: &Config) -> Self {
        Self {
            reference_pressure: config.meter.reference_pressure,
            calibration_offset_db: config.meter.calibration_offset_db,
            noise_floor_db: config.meter.noise_floor_db,
            smoothing_factor: config.meter.smoothing_factor,
            buffer_size: config.meter.buffer_size,
            update_interval_ms: config.meter.update_interval_ms,
            session_duration_secs: config.meter.session_duration_secs,
        }
    }
}

/// Root-mean-square amplitude of the samples.
///
/// Precondition: `samples` is non-empty.
pub fn rms(samples: &[f32]) -> f64 {
    debug_assert!(!samples.is_empty(), "rms of an empty frame");
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Uncalibrated dB SPL of an RMS amplitude.
///
/// The RMS is clamped to [`defaults::RMS_EPSILON`] so silence yields a large
/// negative finite value instead of negative infinity.
pub fn rms_to_db(rms: f64, reference_pressure: f64) -> f64 {
    20.0 * (rms.max(defaults::RMS_EPSILON) / reference_pressure).log10()
}

/// Calibrated dB SPL of one frame, or 0 when below the noise floor.
///
/// A reading of exactly 0 means "silence"; levels just under the floor do
/// not continue smoothly into negative values.
///
/// Precondition: `samples` is non-empty. Empty frames are a caller bug.
pub fn estimate_db(samples: &[f32], params: &CalibrationParams) -> f64 {
    let db = rms_to_db(rms(samples), params.reference_pressure) + params.calibration_offset_db;
    if db < params.noise_floor_db {
        return 0.0;
    }
    db
}
