//! Decoder configuration loaded from JSON.
//!
//! Every section falls back to its defaults, so a file only needs the keys it
//! changes:
//!
//! ```
//! use neurocrop::config::DecoderConfig;
//!
//! let config = DecoderConfig::from_json_str(r#"{ "crop": { "input_length": 400 } }"#).unwrap();
//! assert_eq!(config.crop.input_length, 400);
//! assert_eq!(config.sampler.batch_size, 32);
//! ```
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::band_power::BandPowerConfig;
use crate::decoding::{AggregationRule, ConfigError, PredictionAggregator, SamplerConfig, TrainingConfig};
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Model input window in samples.
    pub input_length: usize,
    /// Batch size for sequential evaluation passes.
    pub eval_batch_size: usize,
}
impl Default for CropConfig {
    fn default() -> Self {
        Self {
            input_length: 500,
            eval_batch_size: 64,
        }
    }
}
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub rule: AggregationRule,
    pub record_votes: bool,
}
impl AggregatorConfig {
    pub fn build(&self) -> PredictionAggregator {
        PredictionAggregator::new(self.rule).with_votes(self.record_votes)
    }
}
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub crop: CropConfig,
    pub sampler: SamplerConfig,
    pub training: TrainingConfig,
    pub aggregator: AggregatorConfig,
    pub model: BandPowerConfig,
}
impl DecoderConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crop.input_length == 0 {
            return Err(ConfigError::Invalid("crop.input_length must be positive".into()));
        }
        if self.crop.eval_batch_size == 0 || self.sampler.batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be positive".into()));
        }
        if self.training.max_epochs == 0 {
            return Err(ConfigError::Invalid("training.max_epochs must be positive".into()));
        }
        if self.model.kernel_length == 0 || self.model.kernel_length > self.crop.input_length {
            return Err(ConfigError::Invalid(format!(
                "model.kernel_length {} must be in 1..={}",
                self.model.kernel_length, self.crop.input_length
            )));
        }
        if !self.model.learning_rate.is_finite() || self.model.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid("model.learning_rate must be positive".into()));
        }
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::{Metric, SamplingMode, StopCriterion};
    use std::io::Write;
    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "sampler": { "mode": "balanced", "seed": 9 },
            "aggregator": { "rule": "sum" },
            "training": {
                "max_epochs": 40,
                "stop": { "kind": "or", "criteria": [
                    { "kind": "max_epochs", "epochs": 40 },
                    { "kind": "no_decrease", "metric": "valid_misclass", "patience": 5, "min_decrease": 0.0 }
                ] }
            }
        }"#;
        let config = DecoderConfig::from_json_str(json).unwrap();
        assert_eq!(config.sampler.mode, SamplingMode::Balanced);
        assert_eq!(config.sampler.seed, 9);
        assert_eq!(config.sampler.batch_size, 32);
        assert_eq!(config.aggregator.rule, AggregationRule::Sum);
        assert_eq!(config.crop, CropConfig::default());
        match &config.training.stop {
            StopCriterion::Or { criteria } => {
                assert_eq!(criteria.len(), 2);
                assert!(matches!(
                    criteria[1],
                    StopCriterion::NoDecrease { metric: Metric::ValidMisclass, patience: 5, .. }
                ));
            }
            other => panic!("unexpected stop criterion {other:?}"),
        }
    }
    #[test]
    fn rejects_inconsistent_values() {
        let err = DecoderConfig::from_json_str(r#"{ "crop": { "input_length": 100 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = DecoderConfig::from_json_str(r#"{ "sampler": { "batch_size": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = DecoderConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let written = DecoderConfig {
            crop: CropConfig {
                input_length: 300,
                eval_batch_size: 16,
            },
            ..DecoderConfig::default()
        };
        write!(file, "{}", serde_json::to_string(&written).unwrap()).unwrap();
        let loaded = DecoderConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, written);
        assert!(matches!(
            DecoderConfig::load_from_file("/nonexistent/neurocrop.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
