use thiserror::Error;
use crate::decoding::TrialId;
/// Boxed error raised by a model collaborator. Passed through untouched.
pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("trial {trial_id} has {trial_len} samples, shorter than the input window of {input_len}")]
    TrialTooShort {
        trial_id: TrialId,
        trial_len: usize,
        input_len: usize,
    },
    #[error("no valid trials remain after cropping ({rejected} rejected)")]
    NoValidTrials { rejected: usize },
    #[error("class {class} has no eligible crops for balanced sampling")]
    EmptyClassBucket { class: usize },
    #[error("trial {trial_id} is not fully covered by crop predictions: {detail}")]
    IncompleteTrialCoverage { trial_id: TrialId, detail: String },
    #[error("channel count mismatch in trial {trial_id}: expected {expected}, got {actual}")]
    ChannelMismatch {
        trial_id: TrialId,
        expected: usize,
        actual: usize,
    },
    #[error("trial {trial_id} has label {label}, outside [0, {n_classes})")]
    LabelOutOfRange {
        trial_id: TrialId,
        label: usize,
        n_classes: usize,
    },
    #[error("trial id {0} appears more than once")]
    DuplicateTrialId(TrialId),
    #[error("trial {0} has no samples")]
    EmptyTrial(TrialId),
    #[error("invalid crop geometry: input length {input_len}, output length {output_len}")]
    InvalidCropGeometry { input_len: usize, output_len: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("model output has shape {actual:?}, expected {expected:?}")]
    ModelOutputShape {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    #[error("crop prediction for trial {trial_id} has shape {actual:?}, expected {expected:?}")]
    PredictionShape {
        trial_id: TrialId,
        /// `(output_length, n_classes)`
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error(transparent)]
    Model(ModelError),
}
impl DecodeError {
    /// Wraps a collaborator failure without altering it.
    pub fn model(err: ModelError) -> Self {
        DecodeError::Model(err)
    }
}
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}
