//! Offline level analysis of recorded WAV files.

use crate::error::{DbucksError, Result};
use crate::meter::{CalibrationParams, estimate_db, rms, rms_to_db};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Level summary of a whole recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of mono samples after mixdown.
    pub samples: usize,
    pub duration_secs: f64,
    pub rms: f64,
    /// dB SPL with no calibration offset and no floor.
    pub raw_db: f64,
    /// Reading as the live meter would report it.
    pub calibrated_db: f64,
}

/// Analyze a WAV file on disk.
pub fn analyze_file(path: &Path, params: &CalibrationParams) -> Result<AnalysisReport> {
    let file = std::fs::File::open(path).map_err(|e| DbucksError::Wav {
        message: format!("Failed to open {}: {}", path.display(), e),
    })?;
    analyze_reader(std::io::BufReader::new(file), params)
}

/// Analyze WAV data from any reader.
pub fn analyze_reader<R: Read>(reader: R, params: &CalibrationParams) -> Result<AnalysisReport> {
    let (samples, spec) = read_mono(reader)?;
    if samples.is_empty() {
        return Err(DbucksError::Wav {
            message: "WAV file contains no samples".to_string(),
        });
    }

    let level = rms(&samples);
    Ok(AnalysisReport {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples: samples.len(),
        duration_secs: samples.len() as f64 / spec.sample_rate.max(1) as f64,
        rms: level,
        raw_db: rms_to_db(level, params.reference_pressure),
        calibrated_db: estimate_db(&samples, params),
    })
}

/// Decode into normalized mono samples in [-1.0, 1.0].
fn read_mono<R: Read>(reader: R) -> Result<(Vec<f32>, hound::WavSpec)> {
    let mut wav = hound::WavReader::new(reader).map_err(|e| DbucksError::Wav {
        message: format!("Failed to parse WAV file: {}", e),
    })?;
    let spec = wav.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            wav.samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| DbucksError::Wav {
        message: format!("Failed to read WAV samples: {}", e),
    })?;

    let channels = spec.channels.max(1) as usize;
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tone::Tone;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn wav_bytes<S: hound::Sample + Copy>(spec: hound::WavSpec, samples: &[S]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_analyze_exported_tone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        Tone::new(440.0, 1.0, 0.5, 44100).write_wav(&path).unwrap();

        let report = analyze_file(&path, &CalibrationParams::default()).unwrap();
        assert_eq!(report.sample_rate, 44100);
        assert_eq!(report.channels, 1);
        assert_eq!(report.samples, 44100);
        assert!((report.duration_secs - 1.0).abs() < 1e-9);

        // 0.5 / sqrt(2) against 2e-5 is about 84.95 dB
        assert!((report.raw_db - 84.95).abs() < 0.05, "raw {}", report.raw_db);
        assert!((report.calibrated_db - (report.raw_db - 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_stereo_mixdown() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // left at half scale, right silent: mono is quarter scale
        let interleaved: Vec<i16> = (0..800).flat_map(|_| [16384i16, 0]).collect();
        let bytes = wav_bytes(spec, &interleaved);

        let report = analyze_reader(Cursor::new(bytes), &CalibrationParams::default()).unwrap();
        assert_eq!(report.channels, 2);
        assert_eq!(report.samples, 800);
        assert!((report.rms - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_analyze_float_samples() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, &[0.1f32; 480]);

        let report = analyze_reader(Cursor::new(bytes), &CalibrationParams::default()).unwrap();
        // 20 * log10(0.1 / 2e-5) = 73.98
        assert!((report.raw_db - 73.979).abs() < 0.01);
    }

    #[test]
    fn test_analyze_silence_reports_floor() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[0i16; 100]);

        let report = analyze_reader(Cursor::new(bytes), &CalibrationParams::default()).unwrap();
        assert_eq!(report.calibrated_db, 0.0);
        assert!(report.raw_db.is_finite());
    }

    #[test]
    fn test_analyze_empty_file_is_error() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes::<i16>(spec, &[]);
        let result = analyze_reader(Cursor::new(bytes), &CalibrationParams::default());
        assert!(matches!(result, Err(DbucksError::Wav { .. })));
    }

    #[test]
    fn test_analyze_rejects_garbage() {
        let result = analyze_reader(Cursor::new(b"not a wav".to_vec()), &CalibrationParams::default());
        assert!(matches!(result, Err(DbucksError::Wav { .. })));
    }

    #[test]
    fn test_analyze_missing_file() {
        let result = analyze_file(Path::new("/nonexistent/dbucks.wav"), &CalibrationParams::default());
        assert!(matches!(result, Err(DbucksError::Wav { .. })));
    }
}
