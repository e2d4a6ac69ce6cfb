//! Audio input, output and file handling.

pub mod analyze;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod source;
pub mod tone;
