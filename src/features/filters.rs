//! Filterbanks and transforms applied to the power spectrogram.
//!
//! Filterbanks are built in f64 and stored as f32 rows; each row holds the
//! weights of one output band over the `n_fft / 2 + 1` FFT bins.

/// Floor applied before taking the log of a power value
pub const AMIN: f32 = 1e-10;

const SLANEY_F_SP: f64 = 200.0 / 3.0;
const SLANEY_MIN_LOG_HZ: f64 = 1000.0;
const SLANEY_MIN_LOG_MEL: f64 = SLANEY_MIN_LOG_HZ / SLANEY_F_SP;

fn slaney_logstep() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert frequency to the Slaney mel scale (linear below 1 kHz, log above)
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= SLANEY_MIN_LOG_HZ {
        SLANEY_MIN_LOG_MEL + (hz / SLANEY_MIN_LOG_HZ).ln() / slaney_logstep()
    } else {
        hz / SLANEY_F_SP
    }
}

/// Convert Slaney mel back to frequency
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= SLANEY_MIN_LOG_MEL {
        SLANEY_MIN_LOG_HZ * (slaney_logstep() * (mel - SLANEY_MIN_LOG_MEL)).exp()
    } else {
        SLANEY_F_SP * mel
    }
}

/// `n` frequencies equally spaced on the mel scale between `fmin` and `fmax`
fn mel_frequencies(n: usize, fmin: f64, fmax: f64) -> Vec<f64> {
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    (0..n)
        .map(|i| {
            let mel = if n > 1 {
                mel_min + (mel_max - mel_min) * i as f64 / (n - 1) as f64
            } else {
                mel_min
            };
            mel_to_hz(mel)
        })
        .collect()
}

/// Center frequency of every rfft bin
fn fft_frequencies(sample_rate: f64, n_fft: usize) -> Vec<f64> {
    (0..=n_fft / 2)
        .map(|k| k as f64 * sample_rate / n_fft as f64)
        .collect()
}

/// Triangular mel filterbank with Slaney area normalization
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    fmin: f64,
    fmax: f64,
) -> Vec<Vec<f32>> {
    let fft_freqs = fft_frequencies(sample_rate as f64, n_fft);
    let mel_f = mel_frequencies(n_mels + 2, fmin, fmax);
    let fdiff: Vec<f64> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    (0..n_mels)
        .map(|i| {
            let enorm = 2.0 / (mel_f[i + 2] - mel_f[i]);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - mel_f[i]) / fdiff[i];
                    let upper = (mel_f[i + 2] - f) / fdiff[i + 1];
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

/// Chroma filterbank projecting FFT bins onto `n_chroma` pitch classes.
///
/// Gaussian bumps around each pitch class, L2-normalized per FFT bin,
/// weighted by a Gaussian over octaves centred on `center_octave`, and
/// rotated so that row 0 is C.
pub fn chroma_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_chroma: usize,
    tuning: f64,
    center_octave: f64,
    octave_width: f64,
) -> Vec<Vec<f32>> {
    let nc = n_chroma as f64;
    let a440 = 440.0 * 2f64.powf(tuning / nc);

    // Fractional chroma bin of every FFT bin (bin 0 extrapolated below bin 1)
    let mut frq_bins = Vec::with_capacity(n_fft);
    frq_bins.push(0.0);
    for k in 1..n_fft {
        let hz = k as f64 * sample_rate as f64 / n_fft as f64;
        frq_bins.push(nc * (hz / (a440 / 16.0)).log2());
    }
    frq_bins[0] = frq_bins[1] - 1.5 * nc;

    let mut bin_widths: Vec<f64> = frq_bins
        .windows(2)
        .map(|w| (w[1] - w[0]).max(1.0))
        .collect();
    bin_widths.push(1.0);

    let half = (nc / 2.0).round();
    let mut weights = vec![vec![0.0f64; n_fft]; n_chroma];
    for (c, row) in weights.iter_mut().enumerate() {
        for (k, w) in row.iter_mut().enumerate() {
            let d = (frq_bins[k] - c as f64 + half + 10.0 * nc).rem_euclid(nc) - half;
            *w = (-0.5 * (2.0 * d / bin_widths[k]).powi(2)).exp();
        }
    }

    for k in 0..n_fft {
        let norm = weights.iter().map(|row| row[k] * row[k]).sum::<f64>().sqrt();
        let octave_weight = (-0.5 * ((frq_bins[k] / nc - center_octave) / octave_width).powi(2)).exp();
        let scale = if norm > f64::MIN_POSITIVE { 1.0 / norm } else { 1.0 };
        for row in weights.iter_mut() {
            row[k] *= scale * octave_weight;
        }
    }

    // Rotate so the first row is C rather than A
    let shift = 3 * (n_chroma / 12);
    let n_bins = n_fft / 2 + 1;
    (0..n_chroma)
        .map(|c| {
            weights[(c + shift) % n_chroma][..n_bins]
                .iter()
                .map(|&w| w as f32)
                .collect()
        })
        .collect()
}

/// Frequency range searched for tuning peaks
const TUNING_FMIN: f64 = 150.0;
const TUNING_FMAX: f64 = 4000.0;

/// Peaks below this fraction of their frame's maximum are ignored
const PEAK_THRESHOLD: f64 = 0.1;

/// Histogram resolution of the tuning estimate, in fractions of a bin
pub const TUNING_RESOLUTION: f64 = 0.01;

/// Interpolated spectral peaks `(frequency, magnitude)` of every frame.
///
/// A bin counts as a peak when it exceeds `PEAK_THRESHOLD` of its frame's
/// maximum and is a local maximum along frequency. Its frequency and height
/// are refined with a parabola through the two neighbouring bins.
pub fn spectral_peaks(power: &[Vec<f32>], sample_rate: u32, n_fft: usize) -> Vec<(f64, f64)> {
    let bin_hz = sample_rate as f64 / n_fft as f64;
    let fmax = TUNING_FMAX.min(sample_rate as f64 / 2.0);
    let mut peaks = Vec::new();

    for frame in power {
        let floor = PEAK_THRESHOLD * frame.iter().fold(0.0f64, |m, &v| m.max(v as f64));
        let gated = |i: usize| {
            let v = frame[i] as f64;
            if v > floor {
                v
            } else {
                0.0
            }
        };

        for i in 1..frame.len().saturating_sub(1) {
            let hz = i as f64 * bin_hz;
            if hz < TUNING_FMIN || hz >= fmax {
                continue;
            }
            let here = gated(i);
            if !(here > gated(i - 1) && here >= gated(i + 1)) {
                continue;
            }

            let (prev, cur, next) = (frame[i - 1] as f64, frame[i] as f64, frame[i + 1] as f64);
            let slope = 0.5 * (next - prev);
            let mut curvature = 2.0 * cur - next - prev;
            if curvature.abs() < f64::MIN_POSITIVE {
                curvature += 1.0;
            }
            let shift = slope / curvature;

            let pitch = (i as f64 + shift) * bin_hz;
            if pitch > 0.0 {
                peaks.push((pitch, cur + 0.5 * slope * shift));
            }
        }
    }
    peaks
}

/// Most common deviation of `frequencies` from A440 equal temperament, in
/// fractions of a bin, quantized to `resolution`. Returns 0 when no positive
/// frequency is given.
pub fn pitch_tuning(frequencies: &[f64], resolution: f64, bins_per_octave: usize) -> f64 {
    let n_hist = ((1.0 / resolution).ceil() as usize).max(1);
    let width = 1.0 / n_hist as f64;
    let mut counts = vec![0usize; n_hist];
    let mut seen = false;

    for &f in frequencies.iter().filter(|f| f.is_finite() && **f > 0.0) {
        let mut residual = (bins_per_octave as f64 * (f / (440.0 / 16.0)).log2()).rem_euclid(1.0);
        if residual >= 0.5 {
            residual -= 1.0;
        }
        let idx = (((residual + 0.5) / width).floor() as usize).min(n_hist - 1);
        counts[idx] += 1;
        seen = true;
    }
    if !seen {
        return 0.0;
    }

    // First bin wins ties
    let (best, _) = counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best });
    -0.5 + best as f64 * width
}

/// Estimate the tuning offset (fractions of a chroma bin) of a power
/// spectrogram from its stronger half of spectral peaks.
pub fn estimate_tuning(
    power: &[Vec<f32>],
    sample_rate: u32,
    n_fft: usize,
    bins_per_octave: usize,
) -> f64 {
    let peaks = spectral_peaks(power, sample_rate, n_fft);
    if peaks.is_empty() {
        return 0.0;
    }

    let mut mags: Vec<f64> = peaks.iter().map(|&(_, m)| m).collect();
    mags.sort_by(|a, b| a.total_cmp(b));
    let mid = mags.len() / 2;
    let threshold = if mags.len() % 2 == 1 {
        mags[mid]
    } else {
        0.5 * (mags[mid - 1] + mags[mid])
    };

    let pitches: Vec<f64> = peaks
        .iter()
        .filter(|&&(_, m)| m >= threshold)
        .map(|&(p, _)| p)
        .collect();
    pitch_tuning(&pitches, TUNING_RESOLUTION, bins_per_octave)
}

/// Orthonormal DCT-II basis, `n_out` rows over `n_in` inputs
pub fn dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..n_in)
                .map(|i| {
                    let angle = std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n);
                    (scale * angle.cos()) as f32
                })
                .collect()
        })
        .collect()
}

/// Project every frame through a filterbank (`frames x bins` -> `frames x rows`)
pub fn apply_filterbank(basis: &[Vec<f32>], frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
    frames
        .iter()
        .map(|frame| {
            basis
                .iter()
                .map(|row| row.iter().zip(frame).map(|(w, x)| w * x).sum())
                .collect()
        })
        .collect()
}

/// Convert power to decibels in place (reference 1.0), keeping at most
/// `top_db` of range below the global peak.
pub fn power_to_db(frames: &mut [Vec<f32>], top_db: f32) {
    let mut peak = f32::NEG_INFINITY;
    for value in frames.iter_mut().flatten() {
        *value = 10.0 * value.max(AMIN).log10();
        peak = peak.max(*value);
    }

    let floor = peak - top_db;
    for value in frames.iter_mut().flatten() {
        *value = value.max(floor);
    }
}

/// Divide each frame by its largest magnitude; all-zero frames stay zero
pub fn normalize_frames_max(frames: &mut [Vec<f32>]) {
    for frame in frames.iter_mut() {
        let peak = frame.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        if peak > f32::MIN_POSITIVE {
            for v in frame.iter_mut() {
                *v /= peak;
            }
        }
    }
}

/// Mean of each column over all frames
pub fn time_mean(frames: &[Vec<f32>], n_cols: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; n_cols];
    for frame in frames {
        for (sum, &v) in sums.iter_mut().zip(frame) {
            *sum += v as f64;
        }
    }
    let n = frames.len().max(1) as f64;
    sums.into_iter().map(|s| (s / n) as f32).collect()
}
