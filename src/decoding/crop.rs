//! Crop placement for dense (per time step) decoding.
//!
//! A model with a receptive field maps an input window of `input_length`
//! samples onto `output_length` predictions. Crop `k` of a trial starts at
//! sample `s_k` and, in output index space, predicts positions
//! `s_k .. s_k + output_length`. Starts advance by `output_length` so outputs
//! tile the trial; only the last crop is pulled back to end on the final
//! sample.
use std::ops::Range;
use log::warn;
use ndarray::ArrayView2;
use crate::decoding::model::ComputeModel;
use crate::decoding::{DecodeError, TrialId, TrialSet};
/// A lookup into one trial: which samples to feed to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Crop {
    pub trial_id: TrialId,
    /// Position of the trial inside its `TrialSet`.
    pub trial_index: usize,
    pub start_sample: usize,
    pub input_length: usize,
    pub output_length: usize,
    pub label: usize,
}
impl Crop {
    /// Output positions this crop predicts, in trial output index space.
    pub fn output_range(&self) -> Range<usize> {
        self.start_sample..self.start_sample + self.output_length
    }
    /// First trial sample that receives a prediction from this crop.
    pub fn first_predicted_sample(&self) -> usize {
        self.start_sample + self.input_length - self.output_length
    }
    pub fn view<'a>(&self, trials: &'a TrialSet) -> Option<ArrayView2<'a, f32>> {
        let trial = trials.get(self.trial_index)?;
        if trial.id() != self.trial_id || self.start_sample + self.input_length > trial.num_samples() {
            return None;
        }
        Some(trial.window(self.start_sample, self.input_length))
    }
}
/// Computes crop start offsets for a fixed input/output geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropIndexer {
    input_length: usize,
    output_length: usize,
}
impl CropIndexer {
    pub fn new(input_length: usize, output_length: usize) -> Result<Self, DecodeError> {
        if output_length == 0 || output_length > input_length {
            return Err(DecodeError::InvalidCropGeometry {
                input_len: input_length,
                output_len: output_length,
            });
        }
        Ok(Self {
            input_length,
            output_length,
        })
    }
    /// Asks the model once how many predictions it yields for `input_length`.
    pub fn from_model<M: ComputeModel + ?Sized>(
        model: &M,
        input_length: usize,
    ) -> Result<Self, DecodeError> {
        let output_length = model
            .output_length_for(input_length)
            .map_err(DecodeError::model)?;
        Self::new(input_length, output_length)
    }
    pub fn input_length(&self) -> usize {
        self.input_length
    }
    pub fn output_length(&self) -> usize {
        self.output_length
    }
    /// Number of output positions a trial of `trial_len` samples must cover.
    /// Zero for trials too short to yield a crop.
    pub fn output_span(&self, trial_len: usize) -> usize {
        if trial_len < self.input_length {
            return 0;
        }
        trial_len + self.output_length - self.input_length
    }
    /// Start offsets for one trial. Pure: identical arguments give identical offsets.
    pub fn starts_for(&self, trial_id: TrialId, trial_len: usize) -> Result<Vec<usize>, DecodeError> {
        if trial_len < self.input_length {
            return Err(DecodeError::TrialTooShort {
                trial_id,
                trial_len,
                input_len: self.input_length,
            });
        }
        let last_start = trial_len - self.input_length;
        let mut starts: Vec<usize> = (0..=last_start).step_by(self.output_length).collect();
        if starts.last() != Some(&last_start) {
            starts.push(last_start);
        }
        Ok(starts)
    }
    /// Crops every usable trial. Too-short trials are collected, not dropped.
    pub fn index_trials(&self, trials: &TrialSet) -> Result<CropPlan, DecodeError> {
        let mut crops = Vec::new();
        let mut planned = Vec::new();
        let mut rejected = Vec::new();
        for (trial_index, trial) in trials.iter().enumerate() {
            let starts = match self.starts_for(trial.id(), trial.num_samples()) {
                Ok(starts) => starts,
                Err(err) => {
                    warn!("skipping trial: {err}");
                    rejected.push(err);
                    continue;
                }
            };
            let first = crops.len();
            crops.extend(starts.into_iter().map(|start_sample| Crop {
                trial_id: trial.id(),
                trial_index,
                start_sample,
                input_length: self.input_length,
                output_length: self.output_length,
                label: trial.label(),
            }));
            planned.push(PlannedTrial {
                trial_id: trial.id(),
                trial_index,
                label: trial.label(),
                crops: first..crops.len(),
                output_span: self.output_span(trial.num_samples()),
            });
        }
        if planned.is_empty() {
            return Err(DecodeError::NoValidTrials {
                rejected: rejected.len(),
            });
        }
        Ok(CropPlan {
            indexer: *self,
            n_classes: trials.n_classes(),
            crops,
            trials: planned,
            rejected,
        })
    }
}
/// Bookkeeping for one trial that produced crops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedTrial {
    pub trial_id: TrialId,
    pub trial_index: usize,
    pub label: usize,
    /// Indices into [`CropPlan::crops`].
    pub crops: Range<usize>,
    /// Output positions `0..output_span` the crops must cover.
    pub output_span: usize,
}
/// All crops for a trial set plus the per-trial problems met on the way.
#[derive(Debug)]
pub struct CropPlan {
    indexer: CropIndexer,
    n_classes: usize,
    crops: Vec<Crop>,
    trials: Vec<PlannedTrial>,
    rejected: Vec<DecodeError>,
}
impl CropPlan {
    pub fn indexer(&self) -> CropIndexer {
        self.indexer
    }
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
    pub fn crops(&self) -> &[Crop] {
        &self.crops
    }
    pub fn trials(&self) -> &[PlannedTrial] {
        &self.trials
    }
    /// Per-trial problems (currently only `TrialTooShort`).
    pub fn rejected(&self) -> &[DecodeError] {
        &self.rejected
    }
    pub fn planned(&self, trial_id: TrialId) -> Option<&PlannedTrial> {
        self.trials.iter().find(|t| t.trial_id == trial_id)
    }
    pub fn crops_of(&self, trial_id: TrialId) -> &[Crop] {
        self.planned(trial_id)
            .map(|t| &self.crops[t.crops.clone()])
            .unwrap_or(&[])
    }
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for crop in &self.crops {
            counts[crop.label] += 1;
        }
        counts
    }
}
