//! Feature extraction: turns a clip into the fixed-length vector the scaler
//! and classifier were trained on.
//!
//! ## Pipeline
//!
//! 1. Truncate to the analysis window (3 s)
//! 2. Pre-emphasis (first-order high-pass, coefficient 0.97)
//! 3. Centered STFT, 2048-sample Hann window, hop 512, power spectrum
//! 4. Per-frame features, each averaged over time:
//!    - 40 MFCCs (orthonormal DCT of the 128-band mel spectrogram in dB)
//!    - 12 chroma bins (per-frame max-normalized, filterbank tuned to the
//!      clip's estimated pitch deviation unless a tuning is configured)
//!    - 128 mel band energies
//! 5. Concatenate `[mfcc, chroma, mel]`, zero non-finite values, fit to the
//!    model dimension
//!
//! The concatenation is 180 values and the model dimension is 63, so the fit
//! keeps the MFCCs, the chroma and the first 11 mel bands. The persisted
//! scaler and classifier depend on this exact layout.

pub mod filters;
pub mod spectral;

use thiserror::Error;
use tracing::debug;

use crate::audio::AudioClip;
use crate::config::FeatureConfig;
use filters::{
    apply_filterbank, chroma_filterbank, dct_basis, estimate_tuning, mel_filterbank,
    normalize_frames_max, power_to_db, time_mean,
};
pub use spectral::StftProcessor;

/// Center octave of the chroma octave weighting
const CHROMA_CENTER_OCTAVE: f64 = 5.0;

/// Width (in octaves) of the chroma octave weighting
const CHROMA_OCTAVE_WIDTH: f64 = 2.0;

/// Errors that can occur during feature extraction
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Empty signal")]
    EmptySignal,

    #[error("Audio buffer is not finite everywhere")]
    NonFiniteInput,

    #[error("Sample rate mismatch: expected {expected} Hz, got {actual} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
}

/// Fixed-length feature vector handed to the scaler
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Build a vector of exactly `dim` components: non-finite values become
    /// zero, then the vector is zero-padded or truncated on the right.
    pub fn from_raw(mut values: Vec<f32>, dim: usize) -> Self {
        for v in values.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        Self(fit_to_dimension(values, dim))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Zero-pad or truncate on the right to exactly `dim` values
pub fn fit_to_dimension(mut values: Vec<f32>, dim: usize) -> Vec<f32> {
    values.resize(dim, 0.0);
    values
}

/// First-order pre-emphasis `y[n] = x[n] - coef * x[n-1]`.
///
/// The sample before `x[0]` is linearly extrapolated as `2 * x[0] - x[1]`.
pub fn preemphasis(signal: &[f32], coef: f32) -> Vec<f32> {
    let Some(&first) = signal.first() else {
        return Vec::new();
    };
    let before_first = match signal.get(1) {
        Some(&second) => 2.0 * first - second,
        None => first,
    };

    let mut out = Vec::with_capacity(signal.len());
    out.push(first - coef * before_first);
    out.extend(signal.windows(2).map(|w| w[1] - coef * w[0]));
    out
}

/// Stateless feature extractor with precomputed FFT plan and filterbanks.
///
/// Safe to share across threads; `extract` only reads its state.
pub struct FeatureExtractor {
    config: FeatureConfig,
    stft: StftProcessor,
    mel_basis: Vec<Vec<f32>>,
    /// Present only when the tuning is fixed by configuration
    chroma_basis: Option<Vec<Vec<f32>>>,
    dct_basis: Vec<Vec<f32>>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self, ExtractionError> {
        validate(&config)?;

        let nyquist = config.sample_rate as f64 / 2.0;
        let mel_basis = mel_filterbank(config.sample_rate, config.n_fft, config.n_mels, 0.0, nyquist);
        let chroma_basis = config
            .tuning
            .map(|tuning| build_chroma_basis(&config, tuning as f64));
        let dct_basis = dct_basis(config.n_mfcc, config.n_mels);
        let stft = StftProcessor::new(config.n_fft, config.hop_length);

        debug!(
            "Feature extractor ready: {} Hz, n_fft={}, hop={}, {} mfcc + {} chroma + {} mel -> {}",
            config.sample_rate,
            config.n_fft,
            config.hop_length,
            config.n_mfcc,
            config.n_chroma,
            config.n_mels,
            config.feature_dim
        );

        Ok(Self {
            config,
            stft,
            mel_basis,
            chroma_basis,
            dct_basis,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn feature_dim(&self) -> usize {
        self.config.feature_dim
    }

    /// Extract the feature vector of a clip at the configured sample rate
    pub fn extract(&self, clip: &AudioClip) -> Result<FeatureVector, ExtractionError> {
        if clip.sample_rate() != self.config.sample_rate {
            return Err(ExtractionError::SampleRateMismatch {
                expected: self.config.sample_rate,
                actual: clip.sample_rate(),
            });
        }

        let n = clip.len().min(self.config.analysis_samples());
        let signal = &clip.samples()[..n];

        if signal.is_empty() {
            return Err(ExtractionError::EmptySignal);
        }
        if signal.iter().any(|s| !s.is_finite()) {
            return Err(ExtractionError::NonFiniteInput);
        }

        let emphasized = preemphasis(signal, self.config.preemphasis);
        let power = self.stft.power_spectrogram(&emphasized)?;

        let mel = apply_filterbank(&self.mel_basis, &power);

        let mut mel_db = mel.clone();
        power_to_db(&mut mel_db, self.config.top_db);
        let mfcc = apply_filterbank(&self.dct_basis, &mel_db);

        let mut chroma = match &self.chroma_basis {
            Some(basis) => apply_filterbank(basis, &power),
            None => {
                let tuning = estimate_tuning(
                    &power,
                    self.config.sample_rate,
                    self.config.n_fft,
                    self.config.n_chroma,
                );
                debug!("Estimated chroma tuning: {:+.2} bins", tuning);
                apply_filterbank(&build_chroma_basis(&self.config, tuning), &power)
            }
        };
        normalize_frames_max(&mut chroma);

        let mut values = Vec::with_capacity(self.config.raw_dim());
        values.extend(time_mean(&mfcc, self.config.n_mfcc));
        values.extend(time_mean(&chroma, self.config.n_chroma));
        values.extend(time_mean(&mel, self.config.n_mels));

        debug!(
            "Extracted {} raw features from {} frames",
            values.len(),
            power.len()
        );

        Ok(FeatureVector::from_raw(values, self.config.feature_dim))
    }
}

fn build_chroma_basis(config: &FeatureConfig, tuning: f64) -> Vec<Vec<f32>> {
    chroma_filterbank(
        config.sample_rate,
        config.n_fft,
        config.n_chroma,
        tuning,
        CHROMA_CENTER_OCTAVE,
        CHROMA_OCTAVE_WIDTH,
    )
}

fn validate(config: &FeatureConfig) -> Result<(), ExtractionError> {
    let invalid = |msg: &str| Err(ExtractionError::InvalidConfig(msg.to_string()));

    if config.sample_rate == 0 {
        return invalid("sample_rate must be positive");
    }
    if config.n_fft < 2 || config.n_fft % 2 != 0 {
        return invalid("n_fft must be an even number >= 2");
    }
    if config.hop_length == 0 {
        return invalid("hop_length must be positive");
    }
    if config.n_mels == 0 || config.n_chroma == 0 {
        return invalid("n_mels and n_chroma must be positive");
    }
    if config.n_mfcc > config.n_mels {
        return invalid("n_mfcc cannot exceed n_mels");
    }
    if config.feature_dim == 0 {
        return invalid("feature_dim must be positive");
    }
    if config.analysis_secs.is_nan() || config.analysis_secs <= 0.0 {
        return invalid("analysis_secs must be positive");
    }
    if config.tuning.is_some_and(|t| !t.is_finite()) {
        return invalid("tuning must be finite");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::sine;
    use proptest::prelude::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::default()).unwrap()
    }

    #[test]
    fn test_silence_extracts_finite_vector() {
        let clip = AudioClip::new(vec![0.0; 3 * 22050], 22050);
        let features = extractor().extract(&clip).unwrap();

        assert_eq!(features.len(), 63);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));

        // Every mel band sits at the -100 dB floor, so only the DC cepstral
        // coefficient is non-zero: -100 * sqrt(128)
        let c0 = features.as_slice()[0];
        assert!((c0 - (-100.0 * 128f32.sqrt())).abs() < 0.05, "c0 = {}", c0);
        assert!(features.as_slice()[1..40].iter().all(|v| v.abs() < 1e-2));
        assert!(features.as_slice()[40..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_minimum_length_clip() {
        let clip = AudioClip::new(sine(300.0, 0.5, 22050, 0.3), 22050);
        let features = extractor().extract(&clip).unwrap();
        assert_eq!(features.len(), 63);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_tone_chroma_lands_on_a() {
        let clip = AudioClip::new(sine(440.0, 2.0, 22050, 0.5), 22050);
        let features = extractor().extract(&clip).unwrap();

        let chroma = &features.as_slice()[40..52];
        let best = chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(best, 9);
        assert!(chroma[9] > 0.99);
    }

    fn chroma_of(extractor: &FeatureExtractor, samples: Vec<f32>) -> Vec<f32> {
        let features = extractor.extract(&AudioClip::new(samples, 22050)).unwrap();
        features.as_slice()[40..52].to_vec()
    }

    #[test]
    fn test_sharp_tone_chroma_follows_estimated_tuning() {
        // 45 cents above A4
        let chroma = chroma_of(&extractor(), sine(451.7, 2.0, 22050, 0.5));
        assert!(chroma[9] > 0.99, "A = {}", chroma[9]);
        assert!(chroma[10] < 0.4, "A# = {}", chroma[10]);
    }

    #[test]
    fn test_configured_tuning_overrides_estimate() {
        let fixed = FeatureExtractor::new(FeatureConfig {
            tuning: Some(0.0),
            ..Default::default()
        })
        .unwrap();
        // Without adapting to the clip the sharp tone bleeds into A#
        let chroma = chroma_of(&fixed, sine(451.7, 2.0, 22050, 0.5));
        assert!(chroma[10] > 0.7, "A# = {}", chroma[10]);
    }

    #[test]
    fn test_estimate_tuning_of_detuned_tones() {
        let stft = StftProcessor::new(2048, 512);
        let tuning_of = |hz: f32| {
            let emphasized = preemphasis(&sine(hz, 1.0, 22050, 0.5), 0.97);
            let power = stft.power_spectrogram(&emphasized).unwrap();
            estimate_tuning(&power, 22050, 2048, 12)
        };

        let sharp = tuning_of(451.7);
        assert!((0.4..=0.5).contains(&sharp), "tuning = {}", sharp);
        let in_tune = tuning_of(440.0);
        assert!(in_tune.abs() <= 0.05, "tuning = {}", in_tune);
    }

    #[test]
    fn test_rejects_non_finite_tuning() {
        let config = FeatureConfig {
            tuning: Some(f32::NAN),
            ..Default::default()
        };
        assert!(matches!(
            FeatureExtractor::new(config),
            Err(ExtractionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let clip = AudioClip::new(sine(180.0, 1.5, 22050, 0.4), 22050);
        let ex = extractor();
        let a = ex.extract(&clip).unwrap();
        let b = ex.extract(&clip).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_only_analysis_window_is_used() {
        let long = sine(250.0, 5.0, 22050, 0.4);
        let ex = extractor();
        let full = ex.extract(&AudioClip::new(long.clone(), 22050)).unwrap();
        let cut = ex
            .extract(&AudioClip::new(long[..66150].to_vec(), 22050))
            .unwrap();
        assert_eq!(full, cut);
    }

    #[test]
    fn test_rejects_wrong_sample_rate() {
        let clip = AudioClip::new(vec![0.0; 16000], 16000);
        assert!(matches!(
            extractor().extract(&clip),
            Err(ExtractionError::SampleRateMismatch {
                expected: 22050,
                actual: 16000
            })
        ));
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        let ex = extractor();
        assert!(matches!(
            ex.extract(&AudioClip::new(Vec::new(), 22050)),
            Err(ExtractionError::EmptySignal)
        ));

        let mut samples = vec![0.1; 22050];
        samples[100] = f32::NAN;
        assert!(matches!(
            ex.extract(&AudioClip::new(samples, 22050)),
            Err(ExtractionError::NonFiniteInput)
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = FeatureConfig {
            n_mfcc: 200,
            ..Default::default()
        };
        assert!(matches!(
            FeatureExtractor::new(config),
            Err(ExtractionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_preemphasis() {
        let out = preemphasis(&[1.0, 2.0, 4.0], 0.5);
        // x[-1] extrapolated as 2*1 - 2 = 0
        assert_eq!(out, vec![1.0, 1.5, 3.0]);
        assert_eq!(preemphasis(&[2.0], 0.5), vec![1.0]);
        assert!(preemphasis(&[], 0.97).is_empty());
    }

    #[test]
    fn test_from_raw_zeroes_non_finite() {
        let v = FeatureVector::from_raw(vec![1.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY], 5);
        assert_eq!(v.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_fit_preserves_prefix(values in proptest::collection::vec(-1e6f32..1e6, 0..200)) {
            let fitted = fit_to_dimension(values.clone(), 63);
            prop_assert_eq!(fitted.len(), 63);

            let keep = values.len().min(63);
            prop_assert_eq!(&fitted[..keep], &values[..keep]);
            prop_assert!(fitted[keep..].iter().all(|&v| v == 0.0));
        }
    }
}
