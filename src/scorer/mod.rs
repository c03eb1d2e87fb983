//! Stress scoring
//!
//! Maps a normalized feature vector to a probability, a 0-100 score and a
//! three-level bucket. A learned model is used when one is loaded; any model
//! failure silently degrades to the deterministic heuristic.

pub mod heuristic;
pub mod model;

use crate::config::{HeuristicWeights, LevelThresholds, StressConfig};
use crate::error::StressError;
use crate::types::{FeatureVector, PredictionSource, StressAnalysis, StressLevel};
use std::path::Path;
use std::sync::Arc;

pub use heuristic::heuristic_probability;
pub use model::{DenseModel, StressModel};

/// Probability reported for malformed input vectors
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// Scorer with an optional learned model
#[derive(Clone)]
pub struct StressScorer {
    model: Option<Arc<dyn StressModel>>,
    weights: HeuristicWeights,
    thresholds: LevelThresholds,
}

impl std::fmt::Debug for StressScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StressScorer")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("weights", &self.weights)
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

impl Default for StressScorer {
    fn default() -> Self {
        Self::heuristic_only(&StressConfig::default())
    }
}

impl StressScorer {
    /// Scorer that always uses the fallback formula
    pub fn heuristic_only(config: &StressConfig) -> Self {
        Self {
            model: None,
            weights: config.heuristic.clone(),
            thresholds: config.thresholds.clone(),
        }
    }

    pub fn with_model(config: &StressConfig, model: Arc<dyn StressModel>) -> Self {
        Self {
            model: Some(model),
            ..Self::heuristic_only(config)
        }
    }

    /// Load a model artifact; a missing or corrupt file leaves the scorer
    /// on the heuristic path
    pub fn with_model_file(config: &StressConfig, path: &Path) -> Self {
        match DenseModel::from_file(path) {
            Ok(model) => {
                log::info!("loaded stress model '{}' from {}", model.name, path.display());
                Self::with_model(config, Arc::new(model))
            }
            Err(e) => {
                log::warn!(
                    "stress model unavailable ({}): {e}; using heuristic",
                    path.display()
                );
                Self::heuristic_only(config)
            }
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Stress probability and the path that produced it
    pub fn predict_with_source(&self, vector: &FeatureVector) -> (f64, PredictionSource) {
        if let Some(model) = &self.model {
            match model.predict(&vector.to_f32_array()) {
                Ok(p) if p.is_finite() => {
                    return (f64::from(p).clamp(0.0, 1.0), PredictionSource::Model);
                }
                Ok(p) => log::debug!("model '{}' returned {p}; using heuristic", model.name()),
                Err(e) => log::debug!("model '{}' failed: {e}; using heuristic", model.name()),
            }
        }
        (
            heuristic_probability(vector, &self.weights),
            PredictionSource::Heuristic,
        )
    }

    pub fn predict(&self, vector: &FeatureVector) -> f64 {
        self.predict_with_source(vector).0
    }

    /// Predict from an untyped slice; the wrong arity yields the neutral 0.5
    pub fn predict_slice(&self, values: &[f64]) -> f64 {
        match self.try_predict_slice(values) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("{e}; returning neutral probability");
                NEUTRAL_PROBABILITY
            }
        }
    }

    pub fn try_predict_slice(&self, values: &[f64]) -> Result<f64, StressError> {
        let vector = FeatureVector::from_slice(values)?;
        Ok(self.predict(&vector))
    }

    pub fn classify(&self, probability: f64) -> StressLevel {
        StressLevel::from_probability(probability, &self.thresholds)
    }

    pub fn analyze(&self, vector: &FeatureVector) -> StressAnalysis {
        let (probability, source) = self.predict_with_source(vector);
        StressAnalysis {
            probability,
            score: score_from_probability(probability),
            level: self.classify(probability),
            source,
        }
    }
}

/// `round(prob * 100)` clamped to [0, 100]
pub fn score_from_probability(probability: f64) -> u8 {
    if probability.is_nan() {
        return score_from_probability(NEUTRAL_PROBABILITY);
    }
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel(f32);

    impl StressModel for FixedModel {
        fn predict(&self, _input: &[f32]) -> Result<f32, StressError> {
            Ok(self.0)
        }
    }

    struct BrokenModel;

    impl StressModel for BrokenModel {
        fn predict(&self, _input: &[f32]) -> Result<f32, StressError> {
            Err(StressError::ModelError("interpreter crashed".to_string()))
        }
    }

    #[test]
    fn test_heuristic_reference_values() {
        let scorer = StressScorer::default();
        assert_eq!(scorer.predict(&FeatureVector::new(0.0, 0.0, 0.0, 0.0)), 0.3);
        assert_eq!(scorer.predict(&FeatureVector::new(1.0, 1.0, 1.0, 0.0)), 1.0);
    }

    #[test]
    fn test_model_is_preferred() {
        let scorer = StressScorer::with_model(&StressConfig::default(), Arc::new(FixedModel(0.8)));
        let (p, source) = scorer.predict_with_source(&FeatureVector::new(0.0, 0.0, 0.0, 0.0));
        assert!((p - 0.8).abs() < 1e-6);
        assert_eq!(source, PredictionSource::Model);
    }

    #[test]
    fn test_model_output_is_clamped() {
        let scorer = StressScorer::with_model(&StressConfig::default(), Arc::new(FixedModel(1.7)));
        assert_eq!(scorer.predict(&FeatureVector::new(0.0, 0.0, 0.0, 0.0)), 1.0);
    }

    #[test]
    fn test_failing_model_falls_back() {
        let scorer = StressScorer::with_model(&StressConfig::default(), Arc::new(BrokenModel));
        let analysis = scorer.analyze(&FeatureVector::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(analysis.probability, 0.3);
        assert_eq!(analysis.source, PredictionSource::Heuristic);
    }

    #[test]
    fn test_non_finite_model_output_falls_back() {
        let scorer = StressScorer::with_model(&StressConfig::default(), Arc::new(FixedModel(f32::NAN)));
        let (p, source) = scorer.predict_with_source(&FeatureVector::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(p, 0.3);
        assert_eq!(source, PredictionSource::Heuristic);
    }

    #[test]
    fn test_missing_model_file_degrades() {
        let scorer = StressScorer::with_model_file(
            &StressConfig::default(),
            Path::new("/nonexistent/stress_model.json"),
        );
        assert!(!scorer.has_model());
        assert_eq!(scorer.predict(&FeatureVector::new(0.0, 0.0, 0.0, 0.0)), 0.3);
    }

    #[test]
    fn test_wrong_arity_is_neutral() {
        let scorer = StressScorer::default();
        assert_eq!(scorer.predict_slice(&[1.0, 1.0, 1.0]), 0.5);
        assert_eq!(scorer.predict_slice(&[]), 0.5);
        assert_eq!(scorer.predict_slice(&[0.0, 0.0, 0.0, 0.0]), 0.3);
        assert!(scorer.try_predict_slice(&[1.0; 5]).is_err());
    }

    #[test]
    fn test_classify_partitions_unit_interval() {
        let scorer = StressScorer::default();
        let mut previous = StressLevel::Low;
        for i in 0..=1000 {
            let p = i as f64 / 1000.0;
            let level = scorer.classify(p);
            assert!(level >= previous, "classify is not monotonic at {p}");
            previous = level;
        }
        assert_eq!(scorer.classify(0.30), StressLevel::Low);
        assert_eq!(scorer.classify(0.65), StressLevel::Medium);
        assert_eq!(scorer.classify(0.66), StressLevel::High);
    }

    #[test]
    fn test_score_from_probability() {
        assert_eq!(score_from_probability(0.0), 0);
        assert_eq!(score_from_probability(1.0), 100);
        assert_eq!(score_from_probability(0.304), 30);
        assert_eq!(score_from_probability(-0.2), 0);
        assert_eq!(score_from_probability(1.4), 100);

        let mut previous = 0;
        for i in 0..=1000 {
            let score = score_from_probability(i as f64 / 1000.0);
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_analyze_composes() {
        let scorer = StressScorer::default();
        let analysis = scorer.analyze(&FeatureVector::new(1.0, 0.5, 0.0, 0.0));
        // 0.15 + 0.2 + 0.3 = 0.65
        assert!((analysis.probability - 0.65).abs() < 1e-12);
        assert_eq!(analysis.score, 65);
        assert_eq!(analysis.source, PredictionSource::Heuristic);
    }
}
