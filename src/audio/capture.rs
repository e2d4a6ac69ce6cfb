//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::frame::AudioFrame;
use crate::audio::source::{AudioSource, CaptureBackend, TrackState};
use crate::error::{DbucksError, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA messages that occur during audio backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not microphones).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List input devices, filtering unusable ones and marking preferred ones
/// with "\[recommended\]".
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().input_devices());
    let devices = devices.map_err(|e| DbucksError::Capture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Pick the input device: by exact name, else PipeWire/Pulse, else the host default.
fn find_input_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let mut devices = host.input_devices().map_err(|e| DbucksError::Capture {
            message: format!("Failed to enumerate devices: {}", e),
        })?;

        if let Some(name) = device_name {
            return devices
                .find(|dev| dev.name().is_ok_and(|n| n == name))
                .ok_or_else(|| DbucksError::DeviceNotFound {
                    device: name.to_string(),
                });
        }

        for device in devices {
            if let Ok(name) = device.name()
                && is_preferred_device(&name)
            {
                return Ok(device);
            }
        }

        host.default_input_device()
            .ok_or_else(|| DbucksError::DeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Map a stream construction failure onto the capture error taxonomy.
fn classify_build_error(err: &cpal::BuildStreamError) -> DbucksError {
    if matches!(err, cpal::BuildStreamError::DeviceNotAvailable) {
        return DbucksError::DeviceNotFound {
            device: "default".to_string(),
        };
    }
    let message = err.to_string();
    if is_permission_message(&message) {
        DbucksError::PermissionDenied { message }
    } else {
        DbucksError::Capture { message }
    }
}

fn play_error(err: &cpal::PlayStreamError) -> DbucksError {
    let message = err.to_string();
    if is_permission_message(&message) {
        DbucksError::PermissionDenied { message }
    } else {
        DbucksError::Capture {
            message: format!("Failed to start audio stream: {}", message),
        }
    }
}

/// How long a fresh stream gets to deliver its first callback.
const STARTUP_GRACE: std::time::Duration = std::time::Duration::from_millis(200);

/// A preferred-config stream that stayed silent through the startup grace
/// period is rebuilt at the native config. A native stream is kept as is.
fn needs_native_fallback(callbacks: u64, native: bool) -> bool {
    callbacks == 0 && !native
}

fn is_permission_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["permission", "denied", "not allowed", "eacces"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched through the Mutex in CpalAudioSource,
/// and only to pause or drop it.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Latest samples shared between the cpal callback and the session.
struct CaptureShared {
    window: Mutex<VecDeque<f32>>,
    callbacks: AtomicU64,
    ended: AtomicBool,
}

impl CaptureShared {
    fn push_mono(&self, mono: impl Iterator<Item = f32>, capacity: usize) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut window) = self.window.lock() {
            window.extend(mono);
            let excess = window.len().saturating_sub(capacity);
            window.drain(..excess);
        }
    }
}

/// Microphone source backed by a cpal input stream.
///
/// Keeps the latest `window` mono samples; each `read_frame` returns them,
/// zero-padded at the front until enough audio has arrived.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    shared: Arc<CaptureShared>,
    window: usize,
    sample_rate: u32,
    sequence: u64,
    callbacks_at_last_read: u64,
    verbosity: u8,
}

impl CpalAudioSource {
    /// Open the named device (or the best default).
    pub fn new(device_name: Option<&str>, sample_rate: u32, window: usize) -> Result<Self> {
        let device = find_input_device(device_name)?;
        Ok(Self {
            device,
            stream: Mutex::new(None),
            shared: Arc::new(CaptureShared {
                window: Mutex::new(VecDeque::with_capacity(window)),
                callbacks: AtomicU64::new(0),
                ended: AtomicBool::new(false),
            }),
            window,
            sample_rate,
            sequence: 0,
            callbacks_at_last_read: 0,
            verbosity: 0,
        })
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Build a mono f32 stream at the requested rate, falling back to the
    /// device's native config with channel mixdown.
    ///
    /// The flag is true when the stream already runs at the native config.
    fn build_stream(&self) -> Result<(cpal::Stream, bool)> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::clone(&self.shared);
        let capacity = self.window;
        let preferred = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                shared.push_mono(data.iter().copied(), capacity);
            },
            self.error_callback(),
            None,
        );

        match preferred {
            Ok(stream) => Ok((stream, false)),
            Err(e @ cpal::BuildStreamError::DeviceNotAvailable) => Err(classify_build_error(&e)),
            // Mono at the requested rate is not offered; use what the device has.
            Err(_) => Ok((self.build_stream_native()?, true)),
        }
    }

    /// Stream at the device's default config, mixed down to mono.
    ///
    /// The level is computed on whatever rate the device runs at; RMS does not
    /// depend on the sample rate.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| DbucksError::Capture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let channels = default_config.channels().max(1) as usize;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        if self.verbosity >= 2 {
            eprintln!(
                "dbucks: using native audio format ({}ch/{}Hz/{:?})",
                channels,
                default_config.sample_rate(),
                default_config.sample_format(),
            );
        }

        let shared = Arc::clone(&self.shared);
        let capacity = self.window;

        let built = match default_config.sample_format() {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = data
                        .chunks_exact(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32);
                    shared.push_mono(mono, capacity);
                },
                self.error_callback(),
                None,
            ),
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = data.chunks_exact(channels).map(|frame| {
                        frame.iter().map(|&s| s as f32 / 32768.0).sum::<f32>() / channels as f32
                    });
                    shared.push_mono(mono, capacity);
                },
                self.error_callback(),
                None,
            ),
            fmt => {
                return Err(DbucksError::Capture {
                    message: format!(
                        "Unsupported native sample format: {:?}. \
                         Try specifying a device with --device.",
                        fmt
                    ),
                });
            }
        };

        built.map_err(|e| classify_build_error(&e))
    }

    /// Stream errors are not fatal here: a lost device marks the track ended
    /// and the session reports it as muted until stopped.
    fn error_callback(&self) -> impl FnMut(cpal::StreamError) + Send + 'static {
        let shared = Arc::clone(&self.shared);
        let verbosity = self.verbosity;
        move |err| {
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                shared.ended.store(true, Ordering::SeqCst);
            }
            if verbosity >= 1 {
                eprintln!("Audio stream error: {}", err);
            }
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| DbucksError::Capture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        if stream_guard.is_some() {
            return Ok(());
        }

        let (stream, native) = self.build_stream()?;
        stream.play().map_err(|e| play_error(&e))?;

        // Some PipeWire-ALSA setups accept a non-native config but never
        // deliver data.
        std::thread::sleep(STARTUP_GRACE);

        let callbacks = self.shared.callbacks.load(Ordering::Relaxed);
        let stream = if needs_native_fallback(callbacks, native) {
            if self.verbosity >= 1 {
                eprintln!("dbucks: no audio after {:?}, retrying at native config", STARTUP_GRACE);
            }
            drop(stream);
            if let Ok(mut window) = self.shared.window.lock() {
                window.clear();
            }

            let native_stream = self.build_stream_native()?;
            native_stream.play().map_err(|e| play_error(&e))?;
            native_stream
        } else {
            stream
        };

        *stream_guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| DbucksError::Capture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            // Dropping the stream releases the device even if pause fails.
            let paused = sendable_stream.0.pause();
            drop(sendable_stream);
            paused.map_err(|e| DbucksError::Capture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<AudioFrame> {
        let window = self.shared.window.lock().map_err(|e| DbucksError::Capture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;

        let mut samples = vec![0.0f32; self.window.saturating_sub(window.len())];
        samples.extend(window.iter().copied());
        drop(window);

        self.callbacks_at_last_read = self.shared.callbacks.load(Ordering::Relaxed);

        let frame = AudioFrame::new(self.sequence, samples);
        self.sequence += 1;
        Ok(frame)
    }

    fn track_state(&self) -> TrackState {
        if self.shared.ended.load(Ordering::SeqCst) {
            return TrackState::Ended;
        }
        if self.stream.lock().map(|s| s.is_none()).unwrap_or(true) {
            return TrackState::Disabled;
        }
        if self.sequence > 0
            && self.shared.callbacks.load(Ordering::Relaxed) == self.callbacks_at_last_read
        {
            TrackState::Muted
        } else {
            TrackState::Live
        }
    }
}

/// Capture backend opening the system microphone through cpal.
pub struct CpalCaptureBackend {
    device: Option<String>,
    sample_rate: u32,
    window: usize,
    verbosity: u8,
}

impl CpalCaptureBackend {
    pub fn new(device: Option<String>, sample_rate: u32, window: usize, verbosity: u8) -> Self {
        Self {
            device,
            sample_rate,
            window,
            verbosity,
        }
    }
}

#[async_trait]
impl CaptureBackend for CpalCaptureBackend {
    async fn acquire(&self) -> Result<Box<dyn AudioSource>> {
        let device = self.device.clone();
        let (sample_rate, window, verbosity) = (self.sample_rate, self.window, self.verbosity);

        // Opening the device can block on the sound server; keep it off the
        // event loop.
        tokio::task::spawn_blocking(move || -> Result<Box<dyn AudioSource>> {
            let mut source = CpalAudioSource::new(device.as_deref(), sample_rate, window)?
                .with_verbosity(verbosity);
            source.start()?;
            Ok(Box::new(source))
        })
        .await
        .map_err(|e| DbucksError::Capture {
            message: format!("Capture task failed: {}", e),
        })?
    }
}
