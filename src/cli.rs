//! Command-line interface for dbucks
//!
//! Provides argument parsing using clap derive macros.

use crate::defaults::MAX_TONE_SECS;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Ambient sound level meter that earns tokens for quiet spaces
#[derive(Parser, Debug)]
#[command(name = "dbucks", version, about = "Ambient sound level meter")]
pub struct Cli {
    /// Subcommand to execute (default: meter)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: session events, -vv: per-frame readings)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., pipewire)
    #[arg(long, global = true, value_name = "DEVICE")]
    pub device: Option<String>,
}

/// Parse a tone duration into seconds.
///
/// Bare numbers are seconds and may be fractional (`0.5`); anything else goes
/// through `humantime` (`500ms`, `2s`).
fn parse_duration_secs(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let secs = match s.parse::<f64>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(s)
            .map(|d| d.as_secs_f64())
            .map_err(|e| e.to_string())?,
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("duration must be positive, got '{}'", s));
    }
    if secs > MAX_TONE_SECS {
        return Err(format!("duration must be at most {}s, got '{}'", MAX_TONE_SECS, s));
    }
    Ok(secs)
}

fn parse_frequency(s: &str) -> Result<f64, String> {
    let hz: f64 = s.trim().parse().map_err(|_| format!("invalid frequency '{}'", s))?;
    if !hz.is_finite() || hz <= 0.0 {
        return Err(format!("frequency must be positive, got '{}'", s));
    }
    Ok(hz)
}

fn parse_amplitude(s: &str) -> Result<f64, String> {
    let amplitude: f64 = s.trim().parse().map_err(|_| format!("invalid amplitude '{}'", s))?;
    if !(0.0..=1.0).contains(&amplitude) {
        return Err(format!("amplitude must be between 0 and 1, got '{}'", s));
    }
    Ok(amplitude)
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Record one session and show the live sound level
    Meter {
        /// Print one JSON snapshot per update instead of the live display
        #[arg(long)]
        json: bool,
    },

    /// Record one session and accrue tokens for the current tier
    Earn,

    /// Play a calibration tone or write it to a WAV file
    Tone {
        /// Tone frequency in Hz (default: 440)
        #[arg(long, short = 'f', value_name = "HZ", value_parser = parse_frequency)]
        frequency: Option<f64>,

        /// Tone length (default: 2s). Examples: 2, 0.5, 500ms
        #[arg(long, short = 'd', value_name = "DURATION", value_parser = parse_duration_secs)]
        duration: Option<f64>,

        /// Peak amplitude between 0 and 1 (default: 0.5)
        #[arg(long, short = 'a', value_name = "GAIN", value_parser = parse_amplitude)]
        amplitude: Option<f64>,

        /// Write a mono 16-bit WAV file instead of playing
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Report the sound level of a WAV recording
    Analyze {
        /// WAV file to analyze
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the reward tier table
    Tiers,

    /// List available audio input devices
    Devices,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the default configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["dbucks"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.device.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_single() {
        let cli = Cli::try_parse_from(["dbucks", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["dbucks", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_meter_json() {
        let cli = Cli::try_parse_from(["dbucks", "meter", "--json"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Meter { json: true }));
    }

    #[test]
    fn test_parse_earn_with_device() {
        let cli = Cli::try_parse_from(["dbucks", "earn", "--device", "pipewire"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Earn));
        assert_eq!(cli.device.as_deref(), Some("pipewire"));
    }

    #[test]
    fn test_parse_tone_defaults() {
        let cli = Cli::try_parse_from(["dbucks", "tone"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Tone {
                frequency: None,
                duration: None,
                amplitude: None,
                output: None,
            })
        );
    }

    #[test]
    fn test_parse_tone_options() {
        let cli = Cli::try_parse_from([
            "dbucks",
            "tone",
            "-f",
            "1000",
            "--duration",
            "500ms",
            "--amplitude",
            "0.25",
            "-o",
            "tone.wav",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Tone {
                frequency,
                duration,
                amplitude,
                output,
            }) => {
                assert_eq!(frequency, Some(1000.0));
                assert_eq!(duration, Some(0.5));
                assert_eq!(amplitude, Some(0.25));
                assert_eq!(output, Some(PathBuf::from("tone.wav")));
            }
            other => panic!("Expected Tone command, got {:?}", other),
        }
    }

    #[test]
    fn test_tone_rejects_bad_values() {
        assert!(Cli::try_parse_from(["dbucks", "tone", "--amplitude", "1.5"]).is_err());
        assert!(Cli::try_parse_from(["dbucks", "tone", "--frequency", "-440"]).is_err());
        assert!(Cli::try_parse_from(["dbucks", "tone", "--duration", "0"]).is_err());
        assert!(Cli::try_parse_from(["dbucks", "tone", "--duration", "soon"]).is_err());
        assert!(Cli::try_parse_from(["dbucks", "tone", "--duration", "1e300"]).is_err());
        assert!(Cli::try_parse_from(["dbucks", "tone", "--duration", "2h"]).is_err());
    }

    #[test]
    fn test_parse_duration_secs() {
        assert_eq!(parse_duration_secs("2"), Ok(2.0));
        assert_eq!(parse_duration_secs("1.5"), Ok(1.5));
        assert_eq!(parse_duration_secs("250ms"), Ok(0.25));
        assert_eq!(parse_duration_secs(" 3s "), Ok(3.0));
        assert!(parse_duration_secs("-1").is_err());
        assert_eq!(parse_duration_secs("60"), Ok(60.0));
        assert!(parse_duration_secs("60.5").is_err());
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from(["dbucks", "analyze", "room.wav"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Analyze {
                file: PathBuf::from("room.wav"),
                json: false,
            })
        );
    }

    #[test]
    fn test_analyze_requires_file() {
        assert!(Cli::try_parse_from(["dbucks", "analyze"]).is_err());
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["dbucks", "config", "show"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        );
        let cli = Cli::try_parse_from(["dbucks", "config", "path"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        );
    }

    #[test]
    fn test_parse_tiers_and_devices() {
        let cli = Cli::try_parse_from(["dbucks", "tiers"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Tiers));
        let cli = Cli::try_parse_from(["dbucks", "-q", "devices"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Devices));
        assert!(cli.quiet);
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from(["dbucks", "tiers", "--config", "/tmp/config.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["dbucks", "completions", "bash"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        );
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["dbucks", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["dbucks", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
