//! Learned stress models
//!
//! The shipped classifier is a small feed-forward network
//! (4 → 32 → 16 → 8 → 1, sigmoid output) trained on the normalized feature
//! space. Batch normalization is folded into the dense weights when the
//! artifact is exported, so inference is a plain chain of dense layers.
//!
//! Artifact format (JSON):
//! ```json
//! {
//!   "name": "stress-mlp-v1",
//!   "layers": [
//!     { "weights": [[...4 inputs...], ...32 rows], "bias": [...32], "activation": "relu" },
//!     ...
//!     { "weights": [[...8 inputs...]], "bias": [0.1], "activation": "sigmoid" }
//!   ]
//! }
//! ```
//! `weights` is row-major: one row per output unit.

use crate::error::StressError;
use crate::types::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed-shape model: exactly 4 inputs, exactly 1 probability out
pub trait StressModel: Send + Sync {
    fn predict(&self, input: &[f32]) -> Result<f32, StressError>;

    fn name(&self) -> &str {
        "model"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Sigmoid,
    Linear,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Linear => x,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    fn input_size(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn output_size(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                self.activation.apply(sum + b)
            })
            .collect()
    }
}

/// Feed-forward network loaded from a JSON weights artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModel {
    #[serde(default = "default_model_name")]
    pub name: String,
    pub layers: Vec<DenseLayer>,
}

fn default_model_name() -> String {
    "dense".to_string()
}

impl DenseModel {
    /// Parse an artifact and check its shape
    pub fn from_json(json: &str) -> Result<Self, StressError> {
        let model: DenseModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: &Path) -> Result<Self, StressError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Layers must chain from 4 inputs down to a single output
    pub fn validate(&self) -> Result<(), StressError> {
        if self.layers.is_empty() {
            return Err(StressError::ModelError("model has no layers".to_string()));
        }

        let mut expected_inputs = FeatureVector::LEN;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.output_size() == 0 {
                return Err(StressError::ModelError(format!("layer {i} has no units")));
            }
            if layer.bias.len() != layer.output_size() {
                return Err(StressError::ModelError(format!(
                    "layer {i}: {} bias values for {} units",
                    layer.bias.len(),
                    layer.output_size()
                )));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != expected_inputs) {
                return Err(StressError::ModelError(format!(
                    "layer {i}: expected {expected_inputs} inputs per unit, found {}",
                    row.len()
                )));
            }
            let finite = layer
                .weights
                .iter()
                .flatten()
                .chain(&layer.bias)
                .all(|v| v.is_finite());
            if !finite {
                return Err(StressError::ModelError(format!(
                    "layer {i} contains non-finite parameters"
                )));
            }
            expected_inputs = layer.output_size();
        }

        if expected_inputs != 1 {
            return Err(StressError::ModelError(format!(
                "model must produce 1 output, produces {expected_inputs}"
            )));
        }
        Ok(())
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::input_size)
    }
}

impl StressModel for DenseModel {
    fn predict(&self, input: &[f32]) -> Result<f32, StressError> {
        if input.len() != self.input_size() {
            return Err(StressError::InvalidVector {
                expected: self.input_size(),
                actual: input.len(),
            });
        }

        let output = self
            .layers
            .iter()
            .fold(input.to_vec(), |activations, layer| layer.forward(&activations));

        match output.as_slice() {
            [probability] if probability.is_finite() => Ok(*probability),
            [_] => Err(StressError::ModelError("model produced a non-finite output".to_string())),
            other => Err(StressError::ModelError(format!(
                "model produced {} outputs",
                other.len()
            ))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single sigmoid unit over the 4 inputs
    fn logistic_json(weights: [f32; 4], bias: f32) -> String {
        serde_json::json!({
            "name": "logistic",
            "layers": [
                { "weights": [weights], "bias": [bias], "activation": "sigmoid" }
            ]
        })
        .to_string()
    }

    #[test]
    fn test_single_unit_model() {
        let model = DenseModel::from_json(&logistic_json([0.0; 4], 0.0)).unwrap();
        let p = model.predict(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((p - 0.5).abs() < 1e-6);
        assert_eq!(model.name(), "logistic");
    }

    #[test]
    fn test_hidden_layer_forward() {
        let json = r#"{
            "layers": [
                { "weights": [[1, 0, 0, 0], [0, -1, 0, 0]], "bias": [0, 0], "activation": "relu" },
                { "weights": [[1, 1]], "bias": [0], "activation": "linear" }
            ]
        }"#;
        let model = DenseModel::from_json(json).unwrap();
        // relu(2) + relu(-3) = 2
        assert_eq!(model.predict(&[2.0, 3.0, 0.0, 0.0]).unwrap(), 2.0);
        // relu(-1) + relu(1) = 1
        assert_eq!(model.predict(&[-1.0, -1.0, 0.0, 0.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let json = r#"{"layers": [{ "weights": [[1, 1, 1]], "bias": [0], "activation": "sigmoid" }]}"#;
        assert!(matches!(DenseModel::from_json(json), Err(StressError::ModelError(_))));
    }

    #[test]
    fn test_rejects_multiple_outputs() {
        let json = r#"{"layers": [{ "weights": [[1, 1, 1, 1], [1, 1, 1, 1]], "bias": [0, 0], "activation": "sigmoid" }]}"#;
        assert!(DenseModel::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_bias_mismatch() {
        let json = r#"{"layers": [{ "weights": [[1, 1, 1, 1]], "bias": [0, 1], "activation": "sigmoid" }]}"#;
        assert!(DenseModel::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_empty_model() {
        assert!(DenseModel::from_json(r#"{"layers": []}"#).is_err());
        assert!(DenseModel::from_json("not json").is_err());
    }

    #[test]
    fn test_predict_rejects_wrong_arity() {
        let model = DenseModel::from_json(&logistic_json([1.0; 4], 0.0)).unwrap();
        assert!(matches!(
            model.predict(&[1.0, 2.0]),
            Err(StressError::InvalidVector {
                expected: 4,
                actual: 2
            })
        ));
    }
}
