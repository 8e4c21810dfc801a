// src/decoding/mod.rs
pub mod aggregate;
pub mod crop;
pub mod error;
pub mod loss;
pub mod model;
pub mod sampler;
pub mod source;
pub mod training;
pub mod trial;
// Flat re-exports for callers outside the module.
pub use aggregate::{argmax, AggregatedPrediction, AggregationRule, CropPrediction, PredictionAggregator};
pub use crop::{Crop, CropIndexer, CropPlan, PlannedTrial};
pub use error::{ConfigError, DecodeError, ModelError};
pub use loss::{correct_crops, CrossEntropyLoss, Loss, LossFunction};
pub use model::{ComputeModel, CropBatch};
pub use sampler::{BatchSampler, EpochBatches, SamplerConfig, SamplerRng, SamplingMode};
pub use source::{ManualSource, TrialRecord, TrialSource};
pub use training::{
    EpochMetrics, EpochRecord, Evaluation, EvaluationSummary, History, LoopState, Metric,
    StopCriterion, TrainingConfig, TrainingLoop,
};
pub use trial::{Trial, TrialId, TrialSet};
