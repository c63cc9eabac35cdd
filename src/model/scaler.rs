//! Feature standardization with parameters fitted at training time.

use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use super::ModelError;
use crate::features::FeatureVector;

/// On-disk scaler layout; accepts both plain and scikit-learn attribute names
#[derive(Debug, Deserialize)]
struct ScalerFile {
    #[serde(alias = "mean_")]
    mean: Vec<f32>,
    #[serde(alias = "scale_")]
    scale: Vec<f32>,
}

/// Per-component affine transform `(x - mean) / scale`
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

/// Feature vector after standardization
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeatureVector(Vec<f32>);

impl NormalizedFeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl StandardScaler {
    /// Create a scaler; zero scales (constant training features) become 1.
    pub fn new(mean: Vec<f32>, mut scale: Vec<f32>) -> Result<Self, ModelError> {
        if mean.len() != scale.len() {
            return Err(ModelError::ModelLoadError(format!(
                "Scaler has {} means but {} scales",
                mean.len(),
                scale.len()
            )));
        }
        if mean.is_empty() {
            return Err(ModelError::ModelLoadError("Scaler is empty".to_string()));
        }
        if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::ModelLoadError(
                "Scaler contains non-finite values".to_string(),
            ));
        }

        let mut zeroed = 0;
        for s in scale.iter_mut() {
            if *s == 0.0 {
                *s = 1.0;
                zeroed += 1;
            }
        }
        if zeroed > 0 {
            warn!("Scaler has {} zero scales, treating them as 1", zeroed);
        }

        Ok(Self { mean, scale })
    }

    /// Load a scaler from a JSON file
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModelError::ModelLoadError(format!("Failed to read scaler {:?}: {}", path, e))
        })?;
        let file: ScalerFile = serde_json::from_str(&content).map_err(|e| {
            ModelError::ModelLoadError(format!("Failed to parse scaler {:?}: {}", path, e))
        })?;

        let scaler = Self::new(file.mean, file.scale)?;
        info!("Scaler loaded from {:?} ({} features)", path, scaler.dim());
        Ok(scaler)
    }

    /// Identity transform of the given width
    pub fn identity(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            scale: vec![1.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Standardize a feature vector of exactly `dim()` components
    pub fn normalize(&self, features: &FeatureVector) -> Result<NormalizedFeatureVector, ModelError> {
        if features.len() != self.dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim(),
                actual: features.len(),
            });
        }

        Ok(NormalizedFeatureVector(
            features
                .as_slice()
                .iter()
                .zip(self.mean.iter().zip(&self.scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let scaler = StandardScaler::new(vec![1.0, 2.0, 3.0], vec![2.0, 0.5, 1.0]).unwrap();
        let features = FeatureVector::from_raw(vec![3.0, 1.0, 3.0], 3);
        let normalized = scaler.normalize(&features).unwrap();
        assert_eq!(normalized.as_slice(), &[1.0, -2.0, 0.0]);
    }

    #[test]
    fn test_zero_scale_treated_as_one() {
        let scaler = StandardScaler::new(vec![1.0, 1.0], vec![0.0, 2.0]).unwrap();
        let normalized = scaler
            .normalize(&FeatureVector::from_raw(vec![4.0, 5.0], 2))
            .unwrap();
        assert_eq!(normalized.as_slice(), &[3.0, 2.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = StandardScaler::identity(63);
        let result = scaler.normalize(&FeatureVector::from_raw(vec![0.0; 10], 10));
        assert!(matches!(
            result,
            Err(ModelError::DimensionMismatch {
                expected: 63,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(StandardScaler::new(vec![0.0; 3], vec![1.0; 2]).is_err());
        assert!(StandardScaler::new(vec![], vec![]).is_err());
        assert!(StandardScaler::new(vec![f32::NAN], vec![1.0]).is_err());
    }

    #[test]
    fn test_load_sklearn_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        std::fs::write(&path, r#"{"mean_": [0.5, 1.5], "scale_": [2.0, 4.0], "n_features_in_": 2}"#)
            .unwrap();

        let scaler = StandardScaler::load(&path).unwrap();
        assert_eq!(scaler.dim(), 2);
        let normalized = scaler
            .normalize(&FeatureVector::from_raw(vec![2.5, 5.5], 2))
            .unwrap();
        assert_eq!(normalized.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StandardScaler::load(&path),
            Err(ModelError::ModelLoadError(_))
        ));
    }
}
