//! Emotion labels, classifier output and the confidence-gated decision policy.

mod labels;
mod policy;
mod prediction;

pub use labels::{Emotion, EMOTION_COUNT};
pub use policy::{DecisionPolicy, Percentages, Verdict, LOW_CONFIDENCE_MESSAGE, UNCERTAIN_LABEL};
pub use prediction::{Prediction, PredictionError};
