//! dbucks - Ambient sound level meter
//!
//! Estimates calibrated dB SPL from a microphone, smooths it for display,
//! runs fixed-length recording sessions and maps levels to reward tiers.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod meter;
pub mod output;
pub mod rewards;
pub mod session;

// Composition root - needs the real audio backend
#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;

// Audio seams (capture → meter, tone → output)
pub use audio::source::{AudioSource, CaptureBackend, TrackState};
pub use audio::tone::{Tone, TonePlayer};

// Metering
pub use meter::{CalibrationParams, SmoothingState, estimate_db, smooth};

// Sessions
pub use session::{
    RunnerCommand, RunnerHandle, SessionController, SessionPhase, SessionRunner, SessionSnapshot,
};

// Rewards
pub use rewards::{RewardTier, RewardTracker, find_tier};

// Error handling
pub use error::{DbucksError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
