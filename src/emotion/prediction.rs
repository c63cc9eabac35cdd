use thiserror::Error;
use tracing::debug;

use super::{Emotion, EMOTION_COUNT};

/// Tolerance for classifier output that should already sum to one
const MASS_TOLERANCE: f32 = 1e-4;

/// Errors raised when classifier output is not a usable distribution
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Expected {expected} scores, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Score for {label} is not a valid probability: {value}")]
    InvalidScore { label: Emotion, value: f32 },

    #[error("Scores sum to zero")]
    ZeroMass,
}

/// Probability distribution over the emotion labels
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    probabilities: [f32; EMOTION_COUNT],
}

impl Prediction {
    /// Validate raw classifier scores as a probability distribution.
    ///
    /// Scores must be finite and non-negative (tiny negative rounding noise
    /// is clamped). A distribution whose mass is off by more than the
    /// tolerance is renormalized.
    pub fn from_scores(scores: &[f32]) -> Result<Self, PredictionError> {
        if scores.len() != EMOTION_COUNT {
            return Err(PredictionError::WrongLength {
                expected: EMOTION_COUNT,
                actual: scores.len(),
            });
        }

        let mut probabilities = [0.0f32; EMOTION_COUNT];
        for (i, (&score, slot)) in scores.iter().zip(probabilities.iter_mut()).enumerate() {
            if !score.is_finite() || score < -MASS_TOLERANCE {
                return Err(PredictionError::InvalidScore {
                    label: Emotion::ALL[i],
                    value: score,
                });
            }
            *slot = score.max(0.0);
        }

        let mass: f32 = probabilities.iter().sum();
        if mass <= 0.0 {
            return Err(PredictionError::ZeroMass);
        }
        if (mass - 1.0).abs() > MASS_TOLERANCE {
            debug!("Renormalizing classifier output with mass {:.6}", mass);
            for p in probabilities.iter_mut() {
                *p /= mass;
            }
        }

        Ok(Self { probabilities })
    }

    pub fn probabilities(&self) -> &[f32; EMOTION_COUNT] {
        &self.probabilities
    }

    pub fn probability(&self, emotion: Emotion) -> f32 {
        self.probabilities[emotion.index()]
    }

    /// Labels with their probabilities, in output order
    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.iter().copied().zip(self.probabilities.iter().copied())
    }

    /// Most probable label; ties go to the label that comes first
    pub fn top(&self) -> (Emotion, f32) {
        let mut best = 0;
        for (i, &p) in self.probabilities.iter().enumerate().skip(1) {
            if p > self.probabilities[best] {
                best = i;
            }
        }
        (Emotion::ALL[best], self.probabilities[best])
    }
}
