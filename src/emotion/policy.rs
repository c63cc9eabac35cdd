use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::{Emotion, Prediction, EMOTION_COUNT};
use crate::config::PolicyConfig;

/// Label reported when no emotion clears the confidence floor
pub const UNCERTAIN_LABEL: &str = "uncertain";

/// Message attached to an uncertain verdict
pub const LOW_CONFIDENCE_MESSAGE: &str = "Low confidence in prediction";

/// Per-label percentages rounded to two decimals, in label order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentages([f64; EMOTION_COUNT]);

impl Percentages {
    pub fn from_prediction(prediction: &Prediction) -> Self {
        let mut values = [0.0f64; EMOTION_COUNT];
        for (slot, &p) in values.iter_mut().zip(prediction.probabilities()) {
            *slot = round_percent(p);
        }
        Self(values)
    }

    pub fn get(&self, emotion: Emotion) -> f64 {
        self.0[emotion.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().copied().zip(self.0.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}

// Serialized as a JSON object keyed by label, preserving label order
impl Serialize for Percentages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(EMOTION_COUNT))?;
        for (emotion, pct) in self.iter() {
            map.serialize_entry(emotion.as_str(), &pct)?;
        }
        map.end()
    }
}

/// `p * 100` rounded to two decimal places
/// Percentage rounded to two decimals, ties to even on the exact binary value.
///
/// `(x * 100.0).round()` rounds the already-rounded product and sends exact
/// halves such as 3.125 away from zero; the sign of the fused `x * 100 - mid`
/// tells which side of the midpoint `x` really lies on.
fn round_percent(p: f32) -> f64 {
    let pct = p as f64 * 100.0;
    if !pct.is_finite() {
        return pct;
    }
    let lower = (pct * 100.0).floor();
    let offset = pct.mul_add(100.0, -(lower + 0.5));
    let hundredths = if offset > 0.0 {
        lower + 1.0
    } else if offset < 0.0 {
        lower
    } else if lower % 2.0 == 0.0 {
        lower
    } else {
        lower + 1.0
    };
    hundredths / 100.0
}

/// User-facing outcome of a prediction
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Confident {
        emotion: Emotion,
        confidence: f64,
        probabilities: Percentages,
    },
    Uncertain {
        probabilities: Percentages,
    },
}

impl Verdict {
    pub fn is_uncertain(&self) -> bool {
        matches!(self, Self::Uncertain { .. })
    }

    /// Reported label: the emotion name, or "uncertain"
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confident { emotion, .. } => emotion.as_str(),
            Self::Uncertain { .. } => UNCERTAIN_LABEL,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::Confident { confidence, .. } => Some(*confidence),
            Self::Uncertain { .. } => None,
        }
    }

    pub fn probabilities(&self) -> &Percentages {
        match self {
            Self::Confident { probabilities, .. } | Self::Uncertain { probabilities } => {
                probabilities
            }
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("emotion", self.label())?;
        match self {
            Self::Confident { confidence, .. } => map.serialize_entry("confidence", confidence)?,
            Self::Uncertain { .. } => map.serialize_entry("message", LOW_CONFIDENCE_MESSAGE)?,
        }
        map.serialize_entry("probabilities", self.probabilities())?;
        map.end()
    }
}

/// Confidence-gated decision rule
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    confidence_threshold_percent: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD_PERCENT)
    }
}

impl DecisionPolicy {
    /// Default confidence floor in percent
    pub const DEFAULT_THRESHOLD_PERCENT: f64 = 20.0;

    pub fn new(confidence_threshold_percent: f64) -> Self {
        Self {
            confidence_threshold_percent,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(config.confidence_threshold_percent)
    }

    pub fn threshold_percent(&self) -> f64 {
        self.confidence_threshold_percent
    }

    /// Turn a distribution into a verdict.
    ///
    /// The top label is picked on the raw probabilities; the floor is
    /// compared against its rounded percentage.
    pub fn decide(&self, prediction: &Prediction) -> Verdict {
        let probabilities = Percentages::from_prediction(prediction);
        let (emotion, _) = prediction.top();
        let confidence = probabilities.get(emotion);

        if confidence < self.confidence_threshold_percent {
            Verdict::Uncertain { probabilities }
        } else {
            Verdict::Confident {
                emotion,
                confidence,
                probabilities,
            }
        }
    }
}
