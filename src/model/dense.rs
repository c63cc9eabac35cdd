//! Feed-forward dense network evaluated with ndarray.
//!
//! The network is stored as JSON:
//!
//! ```json
//! { "layers": [ { "weights": [[...], ...], "bias": [...], "activation": "relu" }, ... ] }
//! ```
//!
//! `weights` is laid out `[input][output]`, matching a Keras `Dense` kernel.
//! Dropout is inactive at inference and batch normalization is expected to be
//! folded into the preceding layer at export.

use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::{EmotionClassifier, ModelError, NormalizedFeatureVector};
use crate::emotion::Prediction;

/// Per-layer nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    Softmax,
}

impl Activation {
    fn apply(self, x: &mut Array1<f32>) {
        match self {
            Self::Linear => {}
            Self::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Self::Tanh => x.mapv_inplace(f32::tanh),
            Self::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Softmax => {
                let max = x.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                x.mapv_inplace(|v| (v - max).exp());
                let sum = x.sum();
                if sum > 0.0 {
                    *x /= sum;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LayerFile {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    #[serde(default = "default_activation")]
    activation: Activation,
}

fn default_activation() -> Activation {
    Activation::Linear
}

#[derive(Debug, Deserialize)]
struct NetworkFile {
    layers: Vec<LayerFile>,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl DenseLayer {
    fn from_file(index: usize, layer: LayerFile) -> Result<Self, ModelError> {
        let rows = layer.weights.len();
        let cols = layer.weights.first().map(Vec::len).unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(ModelError::ModelLoadError(format!(
                "Layer {} has empty weights",
                index
            )));
        }
        if layer.weights.iter().any(|row| row.len() != cols) {
            return Err(ModelError::ModelLoadError(format!(
                "Layer {} has ragged weight rows",
                index
            )));
        }
        if layer.bias.len() != cols {
            return Err(ModelError::ModelLoadError(format!(
                "Layer {} bias has {} entries, expected {}",
                index,
                layer.bias.len(),
                cols
            )));
        }

        let flat: Vec<f32> = layer.weights.into_iter().flatten().collect();
        if flat.iter().chain(layer.bias.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::ModelLoadError(format!(
                "Layer {} contains non-finite parameters",
                index
            )));
        }

        let weights = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| ModelError::ModelLoadError(e.to_string()))?;

        Ok(Self {
            weights,
            bias: Array1::from(layer.bias),
            activation: layer.activation,
        })
    }

    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let mut out = input.dot(&self.weights) + &self.bias;
        self.activation.apply(&mut out);
        out
    }
}

/// Stack of dense layers ending in a probability output
#[derive(Debug, Clone)]
pub struct DenseNetwork {
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Build a network from `(weights [in][out], bias, activation)` triples
    pub fn from_layers(
        layers: Vec<(Vec<Vec<f32>>, Vec<f32>, Activation)>,
    ) -> Result<Self, ModelError> {
        let files = layers
            .into_iter()
            .map(|(weights, bias, activation)| LayerFile {
                weights,
                bias,
                activation,
            })
            .collect();
        Self::from_file(NetworkFile { layers: files })
    }

    fn from_file(file: NetworkFile) -> Result<Self, ModelError> {
        if file.layers.is_empty() {
            return Err(ModelError::ModelLoadError(
                "Network has no layers".to_string(),
            ));
        }

        let layers = file
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| DenseLayer::from_file(i, layer))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, pair) in layers.windows(2).enumerate() {
            let out = pair[0].weights.ncols();
            let next_in = pair[1].weights.nrows();
            if out != next_in {
                return Err(ModelError::ModelLoadError(format!(
                    "Layer {} outputs {} values but layer {} expects {}",
                    i,
                    out,
                    i + 1,
                    next_in
                )));
            }
        }

        Ok(Self { layers })
    }

    /// Load a network from a JSON file
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModelError::ModelLoadError(format!("Failed to read classifier {:?}: {}", path, e))
        })?;
        let file: NetworkFile = serde_json::from_str(&content).map_err(|e| {
            ModelError::ModelLoadError(format!("Failed to parse classifier {:?}: {}", path, e))
        })?;

        let network = Self::from_file(file)?;
        info!(
            "Dense classifier loaded from {:?}: {} layers, {} -> {}",
            path,
            network.layers.len(),
            network.input_dim(),
            network.output_dim()
        );
        Ok(network)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn forward(&self, input: &[f32]) -> Array1<f32> {
        let mut x = Array1::from(input.to_vec());
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        x
    }
}

impl EmotionClassifier for DenseNetwork {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn input_dim(&self) -> usize {
        self.layers.first().map(|l| l.weights.nrows()).unwrap_or(0)
    }

    fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.weights.ncols()).unwrap_or(0)
    }

    fn predict(&self, features: &NormalizedFeatureVector) -> Result<Prediction, ModelError> {
        if features.len() != self.input_dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim(),
                actual: features.len(),
            });
        }

        let scores = self.forward(features.as_slice());
        Ok(Prediction::from_scores(&scores.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;
    use crate::features::FeatureVector;
    use crate::model::StandardScaler;

    fn normalized(values: Vec<f32>) -> NormalizedFeatureVector {
        let dim = values.len();
        StandardScaler::identity(dim)
            .normalize(&FeatureVector::from_raw(values, dim))
            .unwrap()
    }

    #[test]
    fn test_softmax_output() {
        // 2 inputs -> 8 outputs; input 0 drives "happy", input 1 drives "sad"
        let mut weights = vec![vec![0.0; 8]; 2];
        weights[0][2] = 5.0;
        weights[1][3] = 5.0;
        let net =
            DenseNetwork::from_layers(vec![(weights, vec![0.0; 8], Activation::Softmax)]).unwrap();

        assert_eq!(net.input_dim(), 2);
        assert_eq!(net.output_dim(), 8);

        let p = net.predict(&normalized(vec![1.0, 0.0])).unwrap();
        assert_eq!(p.top().0, Emotion::Happy);
        assert!((p.probabilities().iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let p = net.predict(&normalized(vec![0.0, 1.0])).unwrap();
        assert_eq!(p.top().0, Emotion::Sad);
    }

    #[test]
    fn test_hidden_relu_layer() {
        // Hidden unit fires only for positive input; negative input gives uniform output
        let hidden = (vec![vec![1.0]], vec![0.0], Activation::Relu);
        let mut out_w = vec![vec![0.0; 8]];
        out_w[0][4] = 10.0;
        let output = (out_w, vec![0.0; 8], Activation::Softmax);
        let net = DenseNetwork::from_layers(vec![hidden, output]).unwrap();

        assert_eq!(net.layer_count(), 2);
        assert_eq!(net.predict(&normalized(vec![1.0])).unwrap().top().0, Emotion::Angry);

        let uniform = net.predict(&normalized(vec![-1.0])).unwrap();
        assert!((uniform.probability(Emotion::Angry) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_activations() {
        let mut x = Array1::from(vec![-1.0f32, 0.0, 2.0]);
        Activation::Relu.apply(&mut x);
        assert_eq!(x.to_vec(), vec![0.0, 0.0, 2.0]);

        let mut x = Array1::from(vec![0.0f32]);
        Activation::Sigmoid.apply(&mut x);
        assert!((x[0] - 0.5).abs() < 1e-6);

        let mut x = Array1::from(vec![1000.0f32, 1000.0]);
        Activation::Softmax.apply(&mut x);
        assert!((x[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_input_dimension_checked() {
        let net = DenseNetwork::from_layers(vec![(
            vec![vec![0.0; 8]; 3],
            vec![0.0; 8],
            Activation::Softmax,
        )])
        .unwrap();
        assert!(matches!(
            net.predict(&normalized(vec![0.0; 2])),
            Err(ModelError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_rejects_malformed_layers() {
        assert!(DenseNetwork::from_layers(vec![]).is_err());
        // Bias length mismatch
        assert!(DenseNetwork::from_layers(vec![(
            vec![vec![0.0; 8]; 2],
            vec![0.0; 7],
            Activation::Softmax
        )])
        .is_err());
        // Ragged rows
        assert!(DenseNetwork::from_layers(vec![(
            vec![vec![0.0; 8], vec![0.0; 7]],
            vec![0.0; 8],
            Activation::Softmax
        )])
        .is_err());
        // Chained shape mismatch
        assert!(DenseNetwork::from_layers(vec![
            (vec![vec![0.0; 4]; 2], vec![0.0; 4], Activation::Relu),
            (vec![vec![0.0; 8]; 5], vec![0.0; 8], Activation::Softmax),
        ])
        .is_err());
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        let layer = serde_json::json!({
            "layers": [{
                "weights": vec![vec![0.0f32; 8]; 4],
                "bias": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0],
                "activation": "softmax"
            }]
        });
        std::fs::write(&path, layer.to_string()).unwrap();

        let net = DenseNetwork::load(&path).unwrap();
        let p = net.predict(&normalized(vec![0.0; 4])).unwrap();
        assert_eq!(p.top().0, Emotion::Surprised);
    }

    #[test]
    fn test_unnormalized_linear_output_rejected_when_negative() {
        let net = DenseNetwork::from_layers(vec![(
            vec![vec![-1.0; 8]],
            vec![0.0; 8],
            Activation::Linear,
        )])
        .unwrap();
        assert!(matches!(
            net.predict(&normalized(vec![1.0])),
            Err(ModelError::InvalidOutput(_))
        ));
    }
}
