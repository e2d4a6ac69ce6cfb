//! Application commands.
//!
//! Wires configuration, the capture backend, the session runner and the
//! terminal output together for each subcommand.

use crate::audio::analyze::{AnalysisReport, analyze_file};
use crate::audio::capture::{CpalCaptureBackend, list_devices, suppress_audio_warnings};
use crate::audio::source::CaptureBackend;
use crate::audio::tone::{CpalTonePlayer, Tone, TonePlayer};
use crate::config::Config;
use crate::error::{DbucksError, Result};
use crate::meter::CalibrationParams;
use crate::output::{
    clear_line, format_analysis, format_level, format_reward_line, format_tier_table,
    render_snapshot,
};
use crate::rewards::{RewardTracker, format_tokens};
use crate::session::{SessionController, SessionPhase, SessionRunner, SessionSnapshot};
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How a metering session is presented.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeterOptions {
    pub quiet: bool,
    pub verbosity: u8,
    /// One JSON snapshot per line on stdout.
    pub json: bool,
    /// Track reward tiers and accrue tokens.
    pub earn: bool,
}

/// Outcome of one metering session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// Status of the final snapshot; "Ready" after a clean stop or timeout.
    pub status: String,
    /// Last non-silent reading.
    pub last_db: Option<f64>,
    pub tokens: f64,
    pub interrupted: bool,
}

impl SessionSummary {
    /// True when the session ended because capture failed.
    pub fn is_error(&self) -> bool {
        self.status.starts_with("Error")
    }
}

/// Build the controller from configuration.
pub fn build_controller(config: &Config, verbosity: u8) -> SessionController {
    SessionController::new(CalibrationParams::from(config))
        .with_tone_defaults(Tone::new(
            config.tone.frequency_hz,
            config.tone.duration_secs,
            config.tone.amplitude,
            config.audio.sample_rate,
        ))
        .with_verbosity(verbosity)
}

/// Run the meter against the configured microphone.
pub async fn run_meter_command(
    mut config: Config,
    device: Option<String>,
    options: MeterOptions,
) -> Result<SessionSummary> {
    suppress_audio_warnings();

    if let Some(d) = device {
        config.audio.device = Some(d);
    }

    let backend = Arc::new(CpalCaptureBackend::new(
        config.audio.device.clone(),
        config.audio.sample_rate,
        config.audio.analysis_window,
        options.verbosity,
    ));
    let summary = run_session(&config, backend, Arc::new(CpalTonePlayer::new()), options).await?;

    if !options.quiet && !options.json {
        if summary.is_error() {
            eprintln!("{}", summary.status);
        } else {
            eprintln!(
                "Session {}. Last reading: {}",
                if summary.interrupted { "stopped" } else { "complete" },
                format_level(summary.last_db)
            );
            if options.earn {
                eprintln!("Earned: {} tokens", format_tokens(summary.tokens));
            }
        }
    }
    Ok(summary)
}

/// Record one session with the given backend, rendering as it goes.
///
/// Returns once the session is back to idle: after the timeout, after a
/// capture error, or after Ctrl+C.
pub async fn run_session(
    config: &Config,
    backend: Arc<dyn CaptureBackend>,
    player: Arc<dyn TonePlayer>,
    options: MeterOptions,
) -> Result<SessionSummary> {
    let controller = build_controller(config, options.verbosity);
    let (runner, handle) = SessionRunner::new(controller, backend, player);
    let runner_task = tokio::spawn(runner.run());

    let mut snapshots = handle.subscribe();
    let mut tracker = RewardTracker::new(config.rewards.tiers.clone());
    let mut accrual = tokio::time::interval(Duration::from_secs(1));
    let mut ctrl_c = pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;
    let mut last_db = None;
    let mut last = handle.snapshot();

    handle.start().await?;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();

                if let Some(db) = snapshot.db_level.filter(|db| *db != 0.0) {
                    last_db = Some(db);
                }
                if options.earn {
                    track_rewards(&mut tracker, &snapshot);
                }
                show(&snapshot, &tracker, options);
                last = snapshot;

                if last.phase == SessionPhase::Idle {
                    break;
                }
            }
            _ = accrual.tick(), if options.earn && tracker.is_tracking() => {
                tracker.tick(Instant::now().into_std());
            }
            result = &mut ctrl_c, if !interrupted => {
                if let Err(e) = result {
                    eprintln!("Failed to listen for Ctrl+C: {}", e);
                }
                interrupted = true;
                handle.stop().await?;
            }
        }
    }

    if !options.quiet && !options.json {
        clear_line();
    }
    if let Err(e) = handle.shutdown().await
        && options.verbosity >= 1
    {
        eprintln!("{}", e);
    }
    runner_task
        .await
        .map_err(|e| DbucksError::Other(format!("Session runner failed: {}", e)))?;

    Ok(SessionSummary {
        status: last.status,
        last_db,
        tokens: tracker.total_tokens(),
        interrupted,
    })
}

fn track_rewards(tracker: &mut RewardTracker, snapshot: &SessionSnapshot) {
    let now = Instant::now().into_std();
    match snapshot.phase {
        SessionPhase::Recording => {
            tracker.start(now);
            if let Some(db) = snapshot.db_level {
                tracker.set_level(db);
            }
        }
        SessionPhase::Idle | SessionPhase::Starting => {
            if tracker.is_tracking() {
                tracker.tick(now);
                tracker.stop();
            }
        }
    }
}

fn show(snapshot: &SessionSnapshot, tracker: &RewardTracker, options: MeterOptions) {
    if options.json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to serialize snapshot: {}", e),
        }
        return;
    }
    if options.quiet {
        return;
    }
    if options.earn {
        let reward = format_reward_line(tracker.current_tier(), tracker.total_tokens());
        render_snapshot(snapshot, Some(&reward));
    } else {
        render_snapshot(snapshot, None);
    }
}

/// Play a calibration tone, or write it to `output` when given.
pub async fn run_tone_command(
    config: &Config,
    frequency: Option<f64>,
    duration: Option<f64>,
    amplitude: Option<f64>,
    output: Option<PathBuf>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    let mut tone_config = config.clone();
    if let Some(amplitude) = amplitude {
        tone_config.tone.amplitude = amplitude;
    }

    if let Some(path) = output {
        let tone = Tone::new(
            frequency.unwrap_or(tone_config.tone.frequency_hz),
            duration.unwrap_or(tone_config.tone.duration_secs),
            tone_config.tone.amplitude,
            tone_config.audio.sample_rate,
        );
        tone.write_wav(&path)?;
        if !quiet {
            println!(
                "Wrote {} Hz tone ({}s) to {}",
                tone.frequency_hz,
                tone.duration_secs,
                path.display()
            );
        }
        return Ok(());
    }

    suppress_audio_warnings();
    let player = CpalTonePlayer::new();
    play_tone(&tone_config, &player, frequency, duration, quiet, verbosity).await
}

/// Drive a controller through one tone and report its status changes.
pub async fn play_tone(
    config: &Config,
    player: &dyn TonePlayer,
    frequency: Option<f64>,
    duration: Option<f64>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    let mut controller = build_controller(config, verbosity);
    controller.play_tone(player, frequency, duration);
    let status = controller.snapshot().status;
    if !quiet {
        eprintln!("{}", status);
    }

    let Some(deadline) = controller.next_deadline() else {
        return Err(DbucksError::ToneOutput { message: status });
    };
    tokio::time::sleep(deadline.saturating_sub(controller.now())).await;
    controller.advance_to(deadline);

    if !quiet {
        eprintln!("{}", controller.snapshot().status);
    }
    Ok(())
}

/// Analyze a WAV file with the configured calibration.
pub fn run_analyze_command(config: &Config, file: &Path, json: bool) -> Result<AnalysisReport> {
    let report = analyze_file(file, &CalibrationParams::from(config))?;
    if json {
        let line = serde_json::to_string(&report)
            .map_err(|e| DbucksError::Other(format!("Failed to serialize report: {}", e)))?;
        println!("{}", line);
    } else {
        println!("{}", file.display());
        print!("{}", format_analysis(&report));
    }
    Ok(report)
}

/// Print the configured reward tiers.
pub fn print_tiers(config: &Config) {
    print!("{}", format_tier_table(&config.rewards.tiers));
}

/// List available audio input devices.
pub fn print_devices() -> Result<()> {
    suppress_audio_warnings();
    let devices = list_devices()?;

    if devices.is_empty() {
        return Err(DbucksError::DeviceNotFound {
            device: "any input".to_string(),
        });
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    Ok(())
}
