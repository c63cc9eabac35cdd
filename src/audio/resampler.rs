use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use super::AudioError;

/// Input chunk size fed to the FFT resampler
const CHUNK_FRAMES: usize = 1024;

/// Input frames that can still influence earlier output through chunking and
/// filter latency; keep this many past the last sample whose output matters
pub const RESAMPLE_MARGIN_FRAMES: usize = 4 * CHUNK_FRAMES;

/// Mono FFT resampler between two fixed rates
pub struct AudioResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    input_frames: usize,
}

impl AudioResampler {
    /// Create a new resampler from `from_rate` to `to_rate`
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, AudioError> {
        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio: {:.4})",
            from_rate,
            to_rate,
            to_rate as f64 / from_rate as f64
        );

        let channels = 1;
        let resampler = FftFixedIn::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_FRAMES,
            2, // sub_chunks for quality
            channels,
        )
        .map_err(|e| AudioError::Resample(e.to_string()))?;

        let input_buffer = vec![vec![0.0f32; CHUNK_FRAMES]; channels];
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            input_frames: CHUNK_FRAMES,
        })
    }

    /// Get the number of input frames needed for the next `process` call
    pub fn input_frames_next(&self) -> usize {
        self.input_frames
    }

    /// Number of leading output frames that are filter latency
    pub fn output_delay(&self) -> usize {
        self.resampler.output_delay()
    }

    /// Process exactly `input_frames_next()` samples
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioError> {
        if input.len() != self.input_frames {
            return Err(AudioError::Resample(format!(
                "Input length {} doesn't match expected {}",
                input.len(),
                self.input_frames
            )));
        }

        self.input_buffer[0].copy_from_slice(input);

        let (_, output_frames) = self
            .resampler
            .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        Ok(self.output_buffer[0][..output_frames].to_vec())
    }

    /// Process a final short chunk, or flush the filter tail with `None`
    pub fn process_partial(&mut self, input: Option<&[f32]>) -> Result<Vec<f32>, AudioError> {
        let wave_in: Option<&[&[f32]]> = input.as_ref().map(std::slice::from_ref);

        let (_, output_frames) = self
            .resampler
            .process_partial_into_buffer(wave_in, &mut self.output_buffer, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        Ok(self.output_buffer[0][..output_frames].to_vec())
    }

    /// Reset the resampler state
    pub fn reset(&mut self) {
        self.resampler.reset();
    }
}

/// Resample a complete mono clip.
///
/// The output has exactly `ceil(len * to_rate / from_rate)` samples with the
/// resampler latency removed.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = AudioResampler::new(from_rate, to_rate)?;
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

    let mut chunks = samples.chunks_exact(resampler.input_frames_next());
    for chunk in &mut chunks {
        output.extend(resampler.process(chunk)?);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        output.extend(resampler.process_partial(Some(remainder))?);
    }

    while output.len() < expected + delay {
        let tail = resampler.process_partial(None)?;
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}
