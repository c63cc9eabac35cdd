//! Trained artifacts: the feature scaler and the emotion classifier.
//!
//! Both are loaded once at startup and shared read-only across requests.
//! Dimensions are checked at load so a mismatched pair fails fast instead of
//! on the first request.

mod dense;
mod onnx;
mod scaler;

use std::path::Path;
use thiserror::Error;
use tracing::info;

pub use dense::{Activation, DenseNetwork};
pub use onnx::OnnxClassifier;
pub use scaler::{NormalizedFeatureVector, StandardScaler};

use crate::emotion::{Prediction, PredictionError, EMOTION_COUNT};
use crate::features::FeatureVector;

/// Errors that can occur loading or running the trained artifacts
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid classifier output: {0}")]
    InvalidOutput(#[from] PredictionError),

    #[error("Feature not enabled")]
    FeatureNotEnabled,
}

/// A trained model mapping a normalized feature vector to label probabilities
pub trait EmotionClassifier: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;

    fn predict(&self, features: &NormalizedFeatureVector) -> Result<Prediction, ModelError>;
}

/// Pick a classifier backend by file extension (`.onnx`, otherwise JSON)
pub fn load_classifier(
    path: &Path,
    n_threads: usize,
    input_dim: usize,
) -> Result<Box<dyn EmotionClassifier>, ModelError> {
    let is_onnx = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("onnx"))
        .unwrap_or(false);

    if is_onnx {
        Ok(Box::new(OnnxClassifier::new(path, n_threads, input_dim)?))
    } else {
        Ok(Box::new(DenseNetwork::load(path)?))
    }
}

/// Scaler and classifier, validated against each other
pub struct ModelArtifacts {
    scaler: StandardScaler,
    classifier: Box<dyn EmotionClassifier>,
}

impl std::fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifacts")
            .field("feature_dim", &self.scaler.dim())
            .field("classifier", &self.classifier.name())
            .finish()
    }
}

impl ModelArtifacts {
    /// Pair a scaler with a classifier, checking both against `feature_dim`
    pub fn new(
        scaler: StandardScaler,
        classifier: Box<dyn EmotionClassifier>,
        feature_dim: usize,
    ) -> Result<Self, ModelError> {
        if scaler.dim() != feature_dim {
            return Err(ModelError::DimensionMismatch {
                expected: feature_dim,
                actual: scaler.dim(),
            });
        }
        if classifier.input_dim() != feature_dim {
            return Err(ModelError::DimensionMismatch {
                expected: feature_dim,
                actual: classifier.input_dim(),
            });
        }
        if classifier.output_dim() != EMOTION_COUNT {
            return Err(ModelError::DimensionMismatch {
                expected: EMOTION_COUNT,
                actual: classifier.output_dim(),
            });
        }
        Ok(Self { scaler, classifier })
    }

    /// Load both artifacts from disk
    pub fn load(
        classifier_path: &Path,
        scaler_path: &Path,
        n_threads: usize,
        feature_dim: usize,
    ) -> Result<Self, ModelError> {
        let scaler = StandardScaler::load(scaler_path)?;
        let classifier = load_classifier(classifier_path, n_threads, feature_dim)?;
        let artifacts = Self::new(scaler, classifier, feature_dim)?;

        info!(
            "Model artifacts ready: {} classifier, {} features -> {} labels",
            artifacts.classifier.name(),
            feature_dim,
            EMOTION_COUNT
        );
        Ok(artifacts)
    }

    pub fn feature_dim(&self) -> usize {
        self.scaler.dim()
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &dyn EmotionClassifier {
        self.classifier.as_ref()
    }

    /// Normalize then classify
    pub fn score(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        let normalized = self.scaler.normalize(features)?;
        self.classifier.predict(&normalized)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Artifacts that ignore their input and always output `softmax(logits)`
    pub fn constant_artifacts(feature_dim: usize, logits: [f32; EMOTION_COUNT]) -> ModelArtifacts {
        let network = DenseNetwork::from_layers(vec![(
            vec![vec![0.0; EMOTION_COUNT]; feature_dim],
            logits.to_vec(),
            Activation::Softmax,
        )])
        .unwrap();
        ModelArtifacts::new(
            StandardScaler::identity(feature_dim),
            Box::new(network),
            feature_dim,
        )
        .unwrap()
    }

    /// Write a matching scaler/classifier pair as JSON files
    pub fn write_artifacts(
        dir: &Path,
        feature_dim: usize,
        logits: [f32; EMOTION_COUNT],
    ) -> (std::path::PathBuf, std::path::PathBuf) {
        let classifier_path = dir.join("emotion_classifier.json");
        let scaler_path = dir.join("feature_scaler.json");

        let classifier = serde_json::json!({
            "layers": [{
                "weights": vec![vec![0.0f32; EMOTION_COUNT]; feature_dim],
                "bias": logits.to_vec(),
                "activation": "softmax"
            }]
        });
        let scaler = serde_json::json!({
            "mean": vec![0.0f32; feature_dim],
            "scale": vec![1.0f32; feature_dim],
        });
        std::fs::write(&classifier_path, classifier.to_string()).unwrap();
        std::fs::write(&scaler_path, scaler.to_string()).unwrap();

        (classifier_path, scaler_path)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::emotion::Emotion;

    #[test]
    fn test_score_pipeline() {
        let mut logits = [0.0; EMOTION_COUNT];
        logits[Emotion::Calm.index()] = 4.0;
        let artifacts = constant_artifacts(63, logits);

        let p = artifacts
            .score(&FeatureVector::from_raw(vec![0.5; 63], 63))
            .unwrap();
        assert_eq!(p.top().0, Emotion::Calm);
    }

    #[test]
    fn test_scaler_dimension_must_match() {
        let network = DenseNetwork::from_layers(vec![(
            vec![vec![0.0; 8]; 63],
            vec![0.0; 8],
            Activation::Softmax,
        )])
        .unwrap();
        let result = ModelArtifacts::new(StandardScaler::identity(40), Box::new(network), 63);
        assert!(matches!(
            result,
            Err(ModelError::DimensionMismatch {
                expected: 63,
                actual: 40
            })
        ));
    }

    #[test]
    fn test_classifier_dimensions_must_match() {
        let wrong_input = DenseNetwork::from_layers(vec![(
            vec![vec![0.0; 8]; 62],
            vec![0.0; 8],
            Activation::Softmax,
        )])
        .unwrap();
        assert!(ModelArtifacts::new(StandardScaler::identity(63), Box::new(wrong_input), 63).is_err());

        let wrong_output = DenseNetwork::from_layers(vec![(
            vec![vec![0.0; 7]; 63],
            vec![0.0; 7],
            Activation::Softmax,
        )])
        .unwrap();
        assert!(matches!(
            ModelArtifacts::new(StandardScaler::identity(63), Box::new(wrong_output), 63),
            Err(ModelError::DimensionMismatch {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut logits = [0.0; EMOTION_COUNT];
        logits[Emotion::Fearful.index()] = 3.0;
        let (classifier, scaler) = write_artifacts(dir.path(), 63, logits);

        let artifacts = ModelArtifacts::load(&classifier, &scaler, 1, 63).unwrap();
        assert_eq!(artifacts.feature_dim(), 63);
        assert_eq!(artifacts.classifier().name(), "dense");
    }

    #[test]
    fn test_load_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelArtifacts::load(
            &dir.path().join("missing.json"),
            &dir.path().join("missing_scaler.json"),
            1,
            63,
        );
        assert!(matches!(result, Err(ModelError::ModelLoadError(_))));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_extension_needs_feature() {
        let result = load_classifier(Path::new("model.ONNX"), 1, 63);
        assert!(matches!(result, Err(ModelError::FeatureNotEnabled)));
    }
}
