//! Audio capture abstraction: sources, track state and the permission-gated backend.

use crate::audio::frame::AudioFrame;
use crate::error::{DbucksError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Liveness of the capture track as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Delivering audio.
    Live,
    /// Temporarily silent at the source (no data arriving).
    Muted,
    /// Disabled by the user or the platform.
    Disabled,
    /// The device went away; the track will not deliver again.
    Ended,
}

impl TrackState {
    /// True when frames from this track should be metered.
    pub fn is_live(self) -> bool {
        self == TrackState::Live
    }
}

/// Trait for audio capture devices.
///
/// This trait allows swapping implementations (real microphone vs mock).
/// A source is owned by exactly one recording session.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<()>;

    /// Pull the most recent analysis window.
    fn read_frame(&mut self) -> Result<AudioFrame>;

    /// Current track liveness.
    fn track_state(&self) -> TrackState;
}

/// Asynchronous acquisition of a capture device.
///
/// Acquisition may block on a user-facing permission prompt, so it is the
/// one point where a session awaits an external event. The returned source
/// is already started.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn AudioSource>>;
}

/// Observable handle onto a mock source, kept by tests after the source
/// itself has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    started: Arc<AtomicBool>,
    stop_calls: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    track: Arc<Mutex<Option<TrackState>>>,
}

impl MockProbe {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Change the track state seen by the session from outside.
    pub fn set_track_state(&self, state: TrackState) {
        if let Ok(mut track) = self.track.lock() {
            *track = Some(state);
        }
    }
}

/// Mock audio source for testing
#[derive(Debug)]
pub struct MockAudioSource {
    samples: Vec<f32>,
    sequence: u64,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
    probe: MockProbe,
}

impl MockAudioSource {
    /// Create a new mock audio source returning a silent window
    pub fn new() -> Self {
        Self {
            samples: vec![0.0; crate::defaults::ANALYSIS_WINDOW],
            sequence: 0,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            probe: MockProbe::default(),
        }
    }

    /// Configure the mock to return specific samples
    pub fn with_samples(mut self, samples: Vec<f32>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Handle for observing this source after it has been moved.
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(DbucksError::Capture {
                message: self.error_message.clone(),
            });
        }
        self.probe.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.probe.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<AudioFrame> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_read {
            return Err(DbucksError::Capture {
                message: self.error_message.clone(),
            });
        }
        let frame = AudioFrame::new(self.sequence, self.samples.clone());
        self.sequence += 1;
        Ok(frame)
    }

    fn track_state(&self) -> TrackState {
        self.probe
            .track
            .lock()
            .ok()
            .and_then(|track| *track)
            .unwrap_or(TrackState::Live)
    }
}

/// Outcome a [`MockCaptureBackend`] produces on acquisition.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Hand out a started source with these samples.
    Grant(Vec<f32>),
    Deny,
    NoDevice,
    Fail(String),
}

/// Capture backend for tests; optionally holds acquisition until released.
pub struct MockCaptureBackend {
    outcome: MockOutcome,
    gate: Option<Arc<tokio::sync::Notify>>,
    probes: Mutex<Vec<MockProbe>>,
}

impl MockCaptureBackend {
    pub fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            gate: None,
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Hold every acquisition until `gate.notify_one()` is called, like a
    /// permission prompt waiting on the user.
    pub fn with_gate(mut self, gate: Arc<tokio::sync::Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Probes of every source handed out so far.
    pub fn probes(&self) -> Vec<MockProbe> {
        self.probes.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CaptureBackend for MockCaptureBackend {
    async fn acquire(&self) -> Result<Box<dyn AudioSource>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.outcome {
            MockOutcome::Grant(samples) => {
                let mut source = MockAudioSource::new().with_samples(samples.clone());
                source.start()?;
                if let Ok(mut probes) = self.probes.lock() {
                    probes.push(source.probe());
                }
                Ok(Box::new(source))
            }
            MockOutcome::Deny => Err(DbucksError::PermissionDenied {
                message: "user dismissed the prompt".to_string(),
            }),
            MockOutcome::NoDevice => Err(DbucksError::DeviceNotFound {
                device: "default".to_string(),
            }),
            MockOutcome::Fail(message) => Err(DbucksError::Capture {
                message: message.clone(),
            }),
        }
    }
}
