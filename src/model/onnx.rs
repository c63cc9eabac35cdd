//! ONNX Runtime classifier backend.
//!
//! Expects a graph taking a `[1, feature_dim]` float tensor and producing
//! eight class probabilities as its first output.

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
#[cfg(feature = "onnx")]
use std::sync::Mutex;
use std::path::Path;

use super::{EmotionClassifier, ModelError, NormalizedFeatureVector};
use crate::emotion::{Prediction, EMOTION_COUNT};

/// Classifier backed by an ONNX Runtime session
#[cfg(feature = "onnx")]
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_dim: usize,
}

#[cfg(feature = "onnx")]
impl OnnxClassifier {
    /// Load the model and verify it maps `input_dim` features to the label set
    pub fn new(path: &Path, n_threads: usize, input_dim: usize) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::ModelLoadError(format!(
                "Model not found at {:?}",
                path
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::ModelLoadError(e.to_string()))?
            .with_intra_threads(n_threads)
            .map_err(|e: ort::Error| ModelError::ModelLoadError(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e: ort::Error| ModelError::ModelLoadError(e.to_string()))?;

        let classifier = Self {
            session: Mutex::new(session),
            input_dim,
        };

        // Probe with a zero vector so shape problems surface at startup
        let probe = classifier.run(&vec![0.0; input_dim])?;
        if probe.len() != EMOTION_COUNT {
            return Err(ModelError::DimensionMismatch {
                expected: EMOTION_COUNT,
                actual: probe.len(),
            });
        }

        tracing::info!("ONNX classifier initialized with model: {:?}", path);
        Ok(classifier)
    }

    fn run(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        let input_shape = [1_usize, features.len()];
        let input_tensor = Value::from_array((input_shape, features.to_vec()))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| ModelError::InferenceError("No output from model".to_string()))?;

        let output_tensor = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        Ok(output_tensor.1.iter().copied().collect())
    }
}

#[cfg(feature = "onnx")]
impl EmotionClassifier for OnnxClassifier {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn output_dim(&self) -> usize {
        EMOTION_COUNT
    }

    fn predict(&self, features: &NormalizedFeatureVector) -> Result<Prediction, ModelError> {
        if features.len() != self.input_dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim,
                actual: features.len(),
            });
        }
        let scores = self.run(features.as_slice())?;
        Ok(Prediction::from_scores(&scores)?)
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxClassifier;

#[cfg(not(feature = "onnx"))]
impl OnnxClassifier {
    pub fn new(_path: &Path, _n_threads: usize, _input_dim: usize) -> Result<Self, ModelError> {
        Err(ModelError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "onnx"))]
impl EmotionClassifier for OnnxClassifier {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn input_dim(&self) -> usize {
        0
    }

    fn output_dim(&self) -> usize {
        EMOTION_COUNT
    }

    fn predict(&self, _features: &NormalizedFeatureVector) -> Result<Prediction, ModelError> {
        Err(ModelError::FeatureNotEnabled)
    }
}
