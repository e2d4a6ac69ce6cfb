//! Recording session state machine.
//!
//! A [`SessionController`] owns at most one capture source and the timers
//! that drive it. Starting is split into [`SessionController::begin_start`]
//! and [`SessionController::complete_start`] so the permission request can be
//! awaited outside the controller; every stop bumps a generation counter, and
//! a grant carrying an older generation is released without touching state.

use crate::audio::source::{AudioSource, CaptureBackend};
use crate::audio::tone::{Tone, TonePlayer};
use crate::defaults;
use crate::error::{DbucksError, Result};
use crate::meter::{CalibrationParams, SmoothingState, estimate_db, smooth};
use crate::session::scheduler::{Scheduler, TimerId, TimerName};
use serde::Serialize;
use std::time::Duration;

pub const STATUS_REQUESTING: &str = "Requesting microphone access...";
pub const STATUS_PLAYING_TONE: &str = "Playing tone...";
pub const STATUS_TONE_FINISHED: &str = "Tone finished";
pub const STATUS_TONE_ERROR: &str = "Error playing tone";

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    /// Waiting for the capture device to be granted.
    Starting,
    Recording,
}

/// Read-only view of the session published to the display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub is_recording: bool,
    /// Smoothed reading; `None` until the first level update.
    pub db_level: Option<f64>,
    pub remaining_time_seconds: u32,
    pub status: String,
    pub is_muted: bool,
    pub phase: SessionPhase,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Timeout,
    CaptureError,
    Restart,
}

/// Proof that a start was requested for a particular generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "pass the ticket to complete_start"]
pub struct StartTicket {
    generation: u64,
}

pub struct SessionController {
    params: CalibrationParams,
    tone: Tone,
    scheduler: Scheduler,
    source: Option<Box<dyn AudioSource>>,
    smoothing: SmoothingState,
    phase: SessionPhase,
    generation: u64,
    elapsed_secs: u32,
    remaining_secs: u32,
    db_level: Option<f64>,
    is_muted: bool,
    status: String,
    level_timer: Option<TimerId>,
    countdown_timer: Option<TimerId>,
    tone_timer: Option<TimerId>,
    verbosity: u8,
}

impl SessionController {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            tone: Tone::new(
                defaults::TONE_FREQUENCY_HZ,
                defaults::TONE_DURATION_SECS,
                defaults::TONE_AMPLITUDE,
                defaults::SAMPLE_RATE,
            ),
            scheduler: Scheduler::new(),
            source: None,
            smoothing: SmoothingState::new(),
            phase: SessionPhase::Idle,
            generation: 0,
            elapsed_secs: 0,
            remaining_secs: params.session_duration_secs,
            db_level: None,
            is_muted: false,
            status: defaults::STATUS_READY.to_string(),
            level_timer: None,
            countdown_timer: None,
            tone_timer: None,
            verbosity: 0,
        }
    }

    /// Tone used when `play_tone` is called without overrides.
    pub fn with_tone_defaults(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase == SessionPhase::Recording
    }

    /// Seconds recorded in the current session.
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    /// Virtual time of the controller's scheduler.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// When the next timer is due, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_recording: self.is_recording(),
            db_level: self.db_level,
            remaining_time_seconds: self.remaining_secs,
            status: self.status.clone(),
            is_muted: self.is_muted,
            phase: self.phase,
        }
    }

    /// Release any running session and wait for a capture device.
    pub fn begin_start(&mut self) -> StartTicket {
        if self.phase != SessionPhase::Idle {
            self.stop_with(StopReason::Restart);
        } else {
            self.generation += 1;
        }
        self.phase = SessionPhase::Starting;
        self.status = STATUS_REQUESTING.to_string();
        if self.verbosity >= 1 {
            eprintln!("Session {}: requesting capture device", self.generation);
        }
        StartTicket {
            generation: self.generation,
        }
    }

    /// Finish a start with the result of the capture request.
    ///
    /// Returns false when the ticket is stale; a granted source is then
    /// stopped and dropped and nothing else changes.
    pub fn complete_start(
        &mut self,
        ticket: StartTicket,
        result: Result<Box<dyn AudioSource>>,
    ) -> bool {
        if ticket.generation != self.generation || self.phase != SessionPhase::Starting {
            if let Ok(source) = result {
                if self.verbosity >= 1 {
                    eprintln!(
                        "Session {}: releasing late capture grant",
                        ticket.generation
                    );
                }
                self.release_source(source);
            }
            return false;
        }

        match result {
            Ok(source) => {
                self.is_muted = !source.track_state().is_live();
                self.source = Some(source);
                self.phase = SessionPhase::Recording;
                self.smoothing.reset();
                self.elapsed_secs = 0;
                self.remaining_secs = self.params.session_duration_secs;
                self.db_level = None;
                self.status = defaults::STATUS_RECORDING.to_string();
                self.level_timer = Some(self.scheduler.every(
                    TimerName::LevelUpdate,
                    Duration::from_millis(self.params.update_interval_ms),
                ));
                self.countdown_timer = Some(self.scheduler.every(
                    TimerName::Countdown,
                    Duration::from_millis(defaults::COUNTDOWN_INTERVAL_MS),
                ));
                if self.verbosity >= 1 {
                    eprintln!("Session {}: recording", self.generation);
                }
            }
            Err(e) => {
                if self.verbosity >= 1 {
                    eprintln!("Session {}: start failed: {}", self.generation, e);
                }
                self.stop_with(StopReason::CaptureError);
                self.status = e.status_message();
            }
        }
        true
    }

    /// Request a capture device and start recording.
    pub async fn start(&mut self, backend: &dyn CaptureBackend) -> bool {
        let ticket = self.begin_start();
        let result = backend.acquire().await;
        self.complete_start(ticket, result)
    }

    /// End the session and reset the display. Safe to call at any time.
    pub fn stop(&mut self) {
        self.stop_with(StopReason::Requested);
    }

    fn stop_with(&mut self, reason: StopReason) {
        if self.phase != SessionPhase::Idle && self.verbosity >= 1 {
            eprintln!(
                "Session {}: stopped ({:?}) after {}s",
                self.generation, reason, self.elapsed_secs
            );
        }

        if let Some(source) = self.source.take() {
            self.release_source(source);
        }
        for timer in [self.level_timer.take(), self.countdown_timer.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(timer);
        }

        self.generation += 1;
        self.phase = SessionPhase::Idle;
        self.smoothing.reset();
        self.elapsed_secs = 0;
        self.remaining_secs = self.params.session_duration_secs;
        self.db_level = None;
        self.is_muted = false;
        self.status = defaults::STATUS_READY.to_string();
    }

    fn release_source(&self, mut source: Box<dyn AudioSource>) {
        if let Err(e) = source.stop() {
            eprintln!("Failed to release capture device: {}", e);
        }
    }

    /// Start a calibration tone, falling back to the configured defaults.
    ///
    /// The tone's completion timer is independent of the recording timers
    /// and survives `stop`.
    pub fn play_tone(
        &mut self,
        player: &dyn TonePlayer,
        frequency_hz: Option<f64>,
        duration_secs: Option<f64>,
    ) {
        let tone = Tone {
            frequency_hz: frequency_hz.unwrap_or(self.tone.frequency_hz),
            duration_secs: duration_secs.unwrap_or(self.tone.duration_secs),
            ..self.tone
        };

        if let Some(timer) = self.tone_timer.take() {
            self.scheduler.cancel(timer);
        }

        match tone.validate().and_then(|()| player.play(&tone)) {
            Ok(()) => {
                self.status = STATUS_PLAYING_TONE.to_string();
                let duration =
                    Duration::try_from_secs_f64(tone.duration_secs).unwrap_or(Duration::ZERO);
                self.tone_timer = Some(self.scheduler.once(TimerName::ToneFinished, duration));
                if self.verbosity >= 1 {
                    eprintln!(
                        "Playing {} Hz tone for {}s",
                        tone.frequency_hz, tone.duration_secs
                    );
                }
            }
            Err(e) => {
                eprintln!("Error playing tone: {}", e);
                self.status = STATUS_TONE_ERROR.to_string();
            }
        }
    }

    /// Fire the earliest timer due at or before `until`.
    pub fn fire_next(&mut self, until: Duration) -> Option<TimerName> {
        let (id, name) = self.scheduler.pop_due(until)?;
        match name {
            TimerName::LevelUpdate => self.on_level_update(),
            TimerName::Countdown => self.on_countdown(),
            TimerName::ToneFinished => {
                if self.tone_timer == Some(id) {
                    self.tone_timer = None;
                    self.status = STATUS_TONE_FINISHED.to_string();
                }
            }
        }
        Some(name)
    }

    /// Fire every timer due up to `t` and move the clock there.
    pub fn advance_to(&mut self, t: Duration) -> usize {
        let mut fired = 0;
        while self.fire_next(t).is_some() {
            fired += 1;
        }
        self.scheduler.advance_to(t);
        fired
    }

    /// Fire every timer due within `by` of the current time.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.advance_to(self.scheduler.now() + by)
    }

    fn on_level_update(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };

        let track = source.track_state();
        if !track.is_live() {
            if self.verbosity >= 2 && !self.is_muted {
                eprintln!("Capture track {:?}; reporting silence", track);
            }
            self.db_level = Some(0.0);
            self.is_muted = true;
            return;
        }

        match source.read_frame() {
            Ok(frame) if frame.is_empty() => {}
            Ok(frame) => {
                let raw = estimate_db(&frame.samples, &self.params);
                let smoothed = smooth(
                    raw,
                    &mut self.smoothing,
                    self.params.buffer_size,
                    self.params.smoothing_factor,
                );
                if self.verbosity >= 2 {
                    eprintln!("frame {}: raw {:.2} dB, smoothed {:.1} dB", frame.sequence, raw, smoothed);
                }
                self.db_level = Some(smoothed);
                self.is_muted = false;
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_countdown(&mut self) {
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        self.elapsed_secs += 1;
        if self.remaining_secs == 0 {
            self.stop_with(StopReason::Timeout);
        }
    }

    /// Capture errors end the session; the cause stays in the status line.
    fn fail(&mut self, error: DbucksError) {
        if self.verbosity >= 1 {
            let kind = if error.is_capture_error() { "capture" } else { "session" };
            eprintln!("Session {}: {} failed: {}", self.generation, kind, error);
        }
        self.stop_with(StopReason::CaptureError);
        self.status = error.status_message();
    }
}
