//! Default configuration constants for dbucks.
//!
//! Shared by the config layer, the meter and the session controller so the
//! calibrated reading stays consistent everywhere it is computed.

/// Capture and synthesis sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Reference pressure for dB SPL (20 µPa), expressed in the normalized
/// [-1.0, 1.0] sample domain.
pub const REFERENCE_PRESSURE: f64 = 0.00002;

/// Length of a recording session in seconds.
pub const SESSION_DURATION_SECS: u32 = 60;

/// Readings below this level (dB, after calibration) are reported as 0.
pub const NOISE_FLOOR_DB: f64 = -90.0;

/// Weight of the previous smoothed value in the exponential filter.
///
/// Higher values give a steadier but slower display.
pub const SMOOTHING_FACTOR: f64 = 0.8;

/// Interval between level updates in milliseconds.
pub const UPDATE_INTERVAL_MS: u64 = 100;

/// Interval of the session countdown in milliseconds.
pub const COUNTDOWN_INTERVAL_MS: u64 = 1000;

/// Device gain correction applied after the dB conversion.
///
/// Depends on microphone sensitivity; -30 dB suits typical laptop mics.
pub const CALIBRATION_OFFSET_DB: f64 = -30.0;

/// Number of raw readings kept for median filtering.
pub const BUFFER_SIZE: usize = 5;

/// Number of most recent samples analysed per level update.
///
/// Half of a 4096-point FFT frame.
pub const ANALYSIS_WINDOW: usize = 2048;

/// Lower bound applied to the RMS before taking the logarithm.
pub const RMS_EPSILON: f64 = 1e-10;

/// Default calibration tone frequency in Hz.
pub const TONE_FREQUENCY_HZ: f64 = 440.0;

/// Default calibration tone duration in seconds.
pub const TONE_DURATION_SECS: f64 = 2.0;

/// Longest calibration tone accepted, one full session.
pub const MAX_TONE_SECS: f64 = 60.0;

/// Default calibration tone gain.
pub const TONE_AMPLITUDE: f64 = 0.5;

/// Status text shown while no session is active.
pub const STATUS_READY: &str = "Ready";

/// Status text shown while a session is recording.
pub const STATUS_RECORDING: &str = "Recording...";
