//! Audio loading: decode an uploaded file to mono samples at the analysis
//! sample rate.

pub mod loader;
pub mod resampler;

use thiserror::Error;

pub use loader::{decode_mono, AudioLoader};
pub use resampler::{resample, AudioResampler, RESAMPLE_MARGIN_FRAMES};

/// Errors that can occur while loading audio
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio too short: {duration_secs:.3}s (min {min_secs}s)")]
    TooShort { duration_secs: f64, min_secs: f64 },

    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// A finite mono clip at a known sample rate
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds (length / sample rate)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;
    use std::path::{Path, PathBuf};

    /// Encode mono f32 samples as a 16-bit PCM WAV file in memory
    pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    pub fn write_wav(dir: &Path, name: &str, samples: &[f32], sample_rate: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, wav_bytes(samples, sample_rate, 1)).unwrap();
        path
    }

    pub fn sine(freq_hz: f32, secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
        let n = (secs * sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * freq_hz * t).sin() * amplitude
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_duration() {
        let clip = AudioClip::new(vec![0.0; 11025], 22050);
        assert_eq!(clip.len(), 11025);
        assert!((clip.duration_secs() - 0.5).abs() < 1e-9);
        assert!(!clip.is_empty());
    }

    #[test]
    fn test_zero_rate_duration() {
        let clip = AudioClip::new(vec![0.0; 10], 0);
        assert_eq!(clip.duration_secs(), 0.0);
    }
}
