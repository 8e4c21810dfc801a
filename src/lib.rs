// src/lib.rs
//! Cropped-training decoding of multi-channel EEG trials.
//!
//! Trials are cut into overlapping input crops ([`decoding::CropIndexer`]),
//! batched ([`decoding::BatchSampler`]), fed to an opaque
//! [`decoding::ComputeModel`] by the [`decoding::TrainingLoop`], and the dense
//! per-crop predictions are folded back into one decision per trial
//! ([`decoding::PredictionAggregator`]).
pub mod band_power;
pub mod config;
pub mod decoding;
pub mod synthetic;
