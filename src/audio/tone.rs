//! Calibration tone: sine synthesis, playback and WAV export.

use crate::defaults::MAX_TONE_SECS;
use crate::error::{DbucksError, Result};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed-frequency sine burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration_secs: f64,
    /// Peak amplitude in [0.0, 1.0].
    pub amplitude: f64,
    pub sample_rate: u32,
}

impl Tone {
    pub fn new(frequency_hz: f64, duration_secs: f64, amplitude: f64, sample_rate: u32) -> Self {
        Self {
            frequency_hz,
            duration_secs,
            amplitude,
            sample_rate,
        }
    }

    /// Number of samples in the burst, capped at [`MAX_TONE_SECS`].
    pub fn len(&self) -> usize {
        let secs = self.duration_secs.clamp(0.0, MAX_TONE_SECS);
        (self.sample_rate as f64 * secs).floor() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject tones that cannot be played or written.
    pub fn validate(&self) -> Result<()> {
        if !(self.frequency_hz > 0.0 && self.frequency_hz.is_finite()) {
            return Err(DbucksError::ToneOutput {
                message: format!("frequency must be positive, got {}", self.frequency_hz),
            });
        }
        if !(self.duration_secs > 0.0 && self.duration_secs <= MAX_TONE_SECS) {
            return Err(DbucksError::ToneOutput {
                message: format!(
                    "duration must be between 0 and {}s, got {}",
                    MAX_TONE_SECS, self.duration_secs
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(DbucksError::ToneOutput {
                message: format!("amplitude must be between 0 and 1, got {}", self.amplitude),
            });
        }
        Ok(())
    }

    /// Sample `index` of the burst, or silence past its end.
    pub fn sample_at(&self, index: usize) -> f32 {
        if index >= self.len() {
            return 0.0;
        }
        let step = 2.0 * PI * self.frequency_hz / self.sample_rate as f64;
        ((step * index as f64).sin() * self.amplitude) as f32
    }

    /// Synthesize the burst as normalized mono samples.
    pub fn samples(&self) -> Vec<f32> {
        (0..self.len()).map(|i| self.sample_at(i)).collect()
    }

    /// Write the burst as a mono 16-bit PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).map_err(|e| DbucksError::Wav {
            message: format!("Failed to create {}: {}", path.display(), e),
        })?;

        for sample in (0..self.len()).map(|i| self.sample_at(i)) {
            let pcm = (sample as f64 * i16::MAX as f64).floor() as i16;
            writer.write_sample(pcm).map_err(|e| DbucksError::Wav {
                message: format!("Failed to write sample: {}", e),
            })?;
        }

        writer.finalize().map_err(|e| DbucksError::Wav {
            message: format!("Failed to finalize {}: {}", path.display(), e),
        })
    }
}

/// Routes a tone to an audio output.
///
/// `play` returns once playback has begun; the tone ends on its own after
/// its duration.
pub trait TonePlayer: Send + Sync {
    fn play(&self, tone: &Tone) -> Result<()>;
}

/// Player that records requests instead of producing sound.
#[derive(Debug, Default)]
pub struct MockTonePlayer {
    played: Mutex<Vec<Tone>>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockTonePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<Tone> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TonePlayer for MockTonePlayer {
    fn play(&self, tone: &Tone) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DbucksError::ToneOutput {
                message: "no output device".to_string(),
            });
        }
        if let Ok(mut played) = self.played.lock() {
            played.push(*tone);
        }
        Ok(())
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_player::CpalTonePlayer;

#[cfg(feature = "cpal-audio")]
mod cpal_player {
    use super::{Tone, TonePlayer};
    use crate::audio::capture::with_suppressed_stderr;
    use crate::error::{DbucksError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// See `capture::SendableStream`; the stream is only dropped or replaced.
    struct SendableStream(#[allow(dead_code)] cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Plays tones on the default output device.
    ///
    /// The output stream stays open after the burst ends and outputs silence
    /// until the next tone replaces it or the player is dropped.
    pub struct CpalTonePlayer {
        current: Mutex<Option<SendableStream>>,
    }

    impl CpalTonePlayer {
        pub fn new() -> Self {
            Self {
                current: Mutex::new(None),
            }
        }
    }

    impl Default for CpalTonePlayer {
        fn default() -> Self {
            Self::new()
        }
    }

    fn output_error(message: String) -> DbucksError {
        DbucksError::ToneOutput { message }
    }

    impl TonePlayer for CpalTonePlayer {
        fn play(&self, tone: &Tone) -> Result<()> {
            tone.validate()?;
            let device = with_suppressed_stderr(|| cpal::default_host().default_output_device())
                .ok_or_else(|| output_error("No audio output device".to_string()))?;
            let default_config = device
                .default_output_config()
                .map_err(|e| output_error(format!("Failed to query output config: {}", e)))?;

            let channels = default_config.channels().max(1) as usize;
            let device_rate = default_config.sample_rate();
            let stream_config: cpal::StreamConfig = default_config.clone().into();

            // Synthesize at the device rate so the pitch is right.
            let burst = Tone {
                sample_rate: device_rate,
                ..*tone
            };
            let position = Arc::new(AtomicUsize::new(0));
            let err_fn = |e| eprintln!("Tone output error: {}", e);

            let stream = match default_config.sample_format() {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &stream_config,
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in out.chunks_mut(channels) {
                            let i = position.fetch_add(1, Ordering::Relaxed);
                            frame.fill(burst.sample_at(i));
                        }
                    },
                    err_fn,
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &stream_config,
                    move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        for frame in out.chunks_mut(channels) {
                            let i = position.fetch_add(1, Ordering::Relaxed);
                            frame.fill((burst.sample_at(i) * i16::MAX as f32) as i16);
                        }
                    },
                    err_fn,
                    None,
                ),
                fmt => {
                    return Err(output_error(format!(
                        "Unsupported output sample format: {:?}",
                        fmt
                    )));
                }
            }
            .map_err(|e| output_error(format!("Failed to build output stream: {}", e)))?;

            stream
                .play()
                .map_err(|e| output_error(format!("Failed to start output stream: {}", e)))?;

            let mut current = self
                .current
                .lock()
                .map_err(|e| output_error(format!("Failed to lock output stream: {}", e)))?;
            *current = Some(SendableStream(stream));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::rms;
    use tempfile::TempDir;

    #[test]
    fn test_tone_length() {
        let tone = Tone::new(440.0, 2.0, 0.5, 44100);
        assert_eq!(tone.len(), 88200);
        assert_eq!(tone.samples().len(), 88200);
        assert!(Tone::new(440.0, 0.0, 0.5, 44100).is_empty());
    }

    #[test]
    fn test_tone_peak_and_rms() {
        let tone = Tone::new(441.0, 1.0, 0.5, 44100);
        let samples = tone.samples();
        let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!(peak <= 0.5 + 1e-6);
        assert!(peak > 0.49);
        // sine RMS is peak / sqrt(2)
        assert!((rms(&samples) - 0.5 / 2f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_tone_starts_at_zero_phase() {
        let samples = Tone::new(1000.0, 0.01, 1.0, 8000).samples();
        assert_eq!(samples[0], 0.0);
        // quarter period at 1 kHz / 8 kHz is sample 2
        assert!((samples[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_write_wav_header_and_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = Tone::new(440.0, 0.5, 0.5, 44100);
        tone.write_wav(&path).unwrap();

        // 44-byte header plus 2 bytes per sample
        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, 44 + 2 * 22050);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 22050);
    }

    #[test]
    fn test_oversized_tone_is_rejected() {
        let tone = Tone::new(440.0, 1e300, 0.5, 44100);
        assert!(matches!(tone.validate(), Err(DbucksError::ToneOutput { .. })));
        assert_eq!(tone.len(), 44100 * 60);
        assert_eq!(tone.sample_at(usize::MAX), 0.0);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.wav");
        assert!(matches!(tone.write_wav(&path), Err(DbucksError::ToneOutput { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_validate_accepts_longest_tone() {
        assert!(Tone::new(440.0, MAX_TONE_SECS, 1.0, 44100).validate().is_ok());
        assert!(Tone::new(440.0, 0.0, 0.5, 44100).validate().is_err());
        assert!(Tone::new(f64::NAN, 1.0, 0.5, 44100).validate().is_err());
    }

    #[test]
    fn test_write_wav_to_missing_dir_fails() {
        let tone = Tone::new(440.0, 0.1, 0.5, 44100);
        let result = tone.write_wav(Path::new("/nonexistent-dir-dbucks/tone.wav"));
        assert!(matches!(result, Err(DbucksError::Wav { .. })));
    }

    #[test]
    fn test_mock_player_records_tones() {
        let player = MockTonePlayer::new();
        let tone = Tone::new(880.0, 1.0, 0.25, 44100);
        player.play(&tone).unwrap();
        assert_eq!(player.played(), vec![tone]);

        let failing = MockTonePlayer::failing();
        assert!(failing.play(&tone).is_err());
        assert_eq!(failing.calls(), 1);
    }
}
