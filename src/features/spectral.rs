//! Short-time Fourier transform producing frame-wise power spectra.

use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

use super::ExtractionError;

/// Centered STFT with a periodic Hann window and zero padding.
///
/// The FFT plan and window are computed once and shared; each call allocates
/// its own working buffers so a single processor can serve concurrent
/// requests.
pub struct StftProcessor {
    n_fft: usize,
    hop_length: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl StftProcessor {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        // Periodic Hann: the DFT-even variant used for spectral analysis
        let window: Vec<f32> = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_fft as f32).cos()))
            .collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        Self {
            n_fft,
            hop_length,
            fft,
            window,
        }
    }

    /// Number of frequency bins per frame (n_fft / 2 + 1)
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn n_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Compute `|X|^2` for every frame.
    ///
    /// # Returns
    /// Power spectrogram where the outer dim is time frames and the inner dim
    /// is frequency bins
    pub fn power_spectrogram(&self, signal: &[f32]) -> Result<Vec<Vec<f32>>, ExtractionError> {
        if signal.is_empty() {
            return Err(ExtractionError::EmptySignal);
        }

        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let n_frames = 1 + (padded.len() - self.n_fft) / self.hop_length;

        let mut fft_input = self.fft.make_input_vec();
        let mut fft_output = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();

        let mut spectrogram = Vec::with_capacity(n_frames);

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_length;
            let frame = &padded[start..start + self.n_fft];

            for ((dst, &sample), &w) in fft_input.iter_mut().zip(frame).zip(&self.window) {
                *dst = sample * w;
            }

            self.fft
                .process_with_scratch(&mut fft_input, &mut fft_output, &mut scratch)
                .map_err(|e| ExtractionError::Fft(e.to_string()))?;

            spectrogram.push(
                fft_output
                    .iter()
                    .map(|c| c.re * c.re + c.im * c.im)
                    .collect(),
            );
        }

        Ok(spectrogram)
    }
}
