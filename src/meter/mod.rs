//! Level metering: calibrated dB estimation and display smoothing.

pub mod level;
pub mod smoothing;

pub use level::{CalibrationParams, estimate_db, rms, rms_to_db};
pub use smoothing::{SmoothingState, smooth};
