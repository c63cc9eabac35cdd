use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::{resample, AudioClip, AudioError, RESAMPLE_MARGIN_FRAMES};
use crate::config::{FeatureConfig, PolicyConfig};

/// Decodes uploaded audio files into clips at the analysis sample rate
#[derive(Debug, Clone)]
pub struct AudioLoader {
    target_sample_rate: u32,
    min_duration_secs: f64,
    max_decode_secs: f64,
    /// Audio past this point is never analysed, so it is not resampled
    analysis_secs: Option<f64>,
}

impl AudioLoader {
    pub fn new(target_sample_rate: u32, min_duration_secs: f64, max_decode_secs: f64) -> Self {
        Self {
            target_sample_rate,
            min_duration_secs,
            max_decode_secs,
            analysis_secs: None,
        }
    }

    /// Only resample the first `secs` of each clip (plus resampler margin)
    pub fn with_analysis_window(mut self, secs: f64) -> Self {
        self.analysis_secs = Some(secs);
        self
    }

    pub fn from_config(features: &FeatureConfig, policy: &PolicyConfig) -> Self {
        Self::new(
            features.sample_rate,
            policy.min_duration_secs,
            policy.max_decode_secs,
        )
        .with_analysis_window(features.analysis_secs)
    }

    pub fn min_duration_secs(&self) -> f64 {
        self.min_duration_secs
    }

    /// Load a file as a mono clip at the target rate.
    ///
    /// The duration check runs on the full native-rate decode, before any
    /// resampling work is done. With an analysis window set, only the native
    /// samples that can reach the window are resampled.
    pub fn load(&self, path: &Path) -> Result<AudioClip, AudioError> {
        let native = decode_mono(path, self.max_decode_secs)?;
        let duration_secs = native.duration_secs();

        debug!(
            "Decoded {:?}: {} samples at {} Hz ({:.3}s)",
            path,
            native.len(),
            native.sample_rate(),
            duration_secs
        );

        if duration_secs < self.min_duration_secs {
            return Err(AudioError::TooShort {
                duration_secs,
                min_secs: self.min_duration_secs,
            });
        }

        let mut kept = native.samples();
        if let Some(secs) = self.analysis_secs {
            let keep =
                (secs * native.sample_rate() as f64).ceil() as usize + RESAMPLE_MARGIN_FRAMES;
            if keep < kept.len() {
                debug!("Resampling {} of {} native samples", keep, kept.len());
                kept = &kept[..keep];
            }
        }

        let samples = resample(kept, native.sample_rate(), self.target_sample_rate)?;

        Ok(AudioClip::new(samples, self.target_sample_rate))
    }
}

/// Decode the first audio track of a file at its native rate, averaging
/// channels to mono. Decoding stops after `max_secs` of audio.
pub fn decode_mono(path: &Path, max_secs: f64) -> Result<AudioClip, AudioError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("no audio track".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let track_id = track.id;
    let max_frames = (max_secs * sample_rate as f64).ceil() as usize;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        samples.extend(
            buffer
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );

        if samples.len() >= max_frames {
            debug!("Decode cap reached at {}s", max_secs);
            samples.truncate(max_frames);
            break;
        }
    }

    if samples.is_empty() {
        return Err(AudioError::Decode("no audio samples decoded".to_string()));
    }

    Ok(AudioClip::new(samples, sample_rate))
}
