use ndarray::{s, Array3, ArrayView2};
use crate::decoding::aggregate::CropPrediction;
use crate::decoding::error::ModelError;
use crate::decoding::loss::Loss;
use crate::decoding::{Crop, DecodeError, TrialSet};
/// Trainable decoder seen as a capability set.
///
/// The engine never looks inside: it asks once for the output length of its
/// input window, feeds stacked crops to `forward` and hands the loss back to
/// `update_parameters`. Errors are forwarded to the caller unchanged.
pub trait ComputeModel {
    fn n_classes(&self) -> usize;
    fn output_length_for(&self, input_length: usize) -> Result<usize, ModelError>;
    /// Scores shaped `batch x output_length x n_classes`.
    fn forward(&mut self, batch: &CropBatch) -> Result<Array3<f32>, ModelError>;
    fn update_parameters(&mut self, loss: &Loss) -> Result<(), ModelError>;
}
/// Crops plus their signal windows stacked as `batch x channels x input_length`.
#[derive(Clone, Debug)]
pub struct CropBatch {
    crops: Vec<Crop>,
    inputs: Array3<f32>,
}
impl CropBatch {
    pub fn gather(trials: &TrialSet, crops: Vec<Crop>) -> Result<Self, DecodeError> {
        let input_length = crops.first().map(|c| c.input_length).unwrap_or(0);
        let mut inputs = Array3::zeros((crops.len(), trials.n_channels(), input_length));
        for (i, crop) in crops.iter().enumerate() {
            if crop.input_length != input_length {
                return Err(DecodeError::InvalidConfig(
                    "crops in one batch must share an input length".into(),
                ));
            }
            let view = crop.view(trials).ok_or_else(|| {
                DecodeError::InvalidConfig(format!(
                    "crop at {} does not fit trial {}",
                    crop.start_sample, crop.trial_id
                ))
            })?;
            inputs.slice_mut(s![i, .., ..]).assign(&view);
        }
        Ok(Self { crops, inputs })
    }
    pub fn len(&self) -> usize {
        self.crops.len()
    }
    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }
    pub fn crops(&self) -> &[Crop] {
        &self.crops
    }
    pub fn inputs(&self) -> &Array3<f32> {
        &self.inputs
    }
    pub fn input(&self, index: usize) -> ArrayView2<'_, f32> {
        self.inputs.slice(s![index, .., ..])
    }
    pub fn labels(&self) -> Vec<usize> {
        self.crops.iter().map(|c| c.label).collect()
    }
    /// Checks the model output shape against the batch.
    pub fn check_scores(&self, scores: &Array3<f32>, n_classes: usize) -> Result<(), DecodeError> {
        let output_length = self.crops.first().map(|c| c.output_length).unwrap_or(0);
        let expected = (self.len(), output_length, n_classes);
        let actual = scores.dim();
        if actual != expected {
            return Err(DecodeError::ModelOutputShape { expected, actual });
        }
        Ok(())
    }
    /// Splits batch scores into one aligned prediction per crop.
    pub fn predictions(
        &self,
        scores: &Array3<f32>,
        n_classes: usize,
    ) -> Result<Vec<CropPrediction>, DecodeError> {
        self.check_scores(scores, n_classes)?;
        Ok(self
            .crops
            .iter()
            .enumerate()
            .map(|(i, crop)| CropPrediction {
                trial_id: crop.trial_id,
                output_start: crop.start_sample,
                output_length: crop.output_length,
                scores: scores.slice(s![i, .., ..]).to_owned(),
            })
            .collect())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::{CropIndexer, TrialRecord};
    use ndarray::Array2;
    fn trials() -> TrialSet {
        let signal = Array2::from_shape_fn((2, 12), |(c, t)| (c * 100 + t) as f32);
        TrialSet::new(2, vec![TrialRecord::new(4, signal, 1)]).unwrap()
    }
    #[test]
    fn gather_stacks_crop_windows() {
        let trials = trials();
        let plan = CropIndexer::new(6, 2).unwrap().index_trials(&trials).unwrap();
        let batch = CropBatch::gather(&trials, plan.crops().to_vec()).unwrap();
        assert_eq!(batch.inputs().dim(), (4, 2, 6));
        assert_eq!(batch.input(1)[[0, 0]], 2.0);
        assert_eq!(batch.input(3)[[1, 5]], 111.0);
        assert_eq!(batch.labels(), vec![1, 1, 1, 1]);
    }
    #[test]
    fn predictions_follow_crop_offsets() {
        let trials = trials();
        let plan = CropIndexer::new(6, 2).unwrap().index_trials(&trials).unwrap();
        let batch = CropBatch::gather(&trials, plan.crops().to_vec()).unwrap();
        let scores = Array3::<f32>::zeros((4, 2, 3));
        let preds = batch.predictions(&scores, 3).unwrap();
        let starts: Vec<_> = preds.iter().map(|p| p.output_start).collect();
        assert_eq!(starts, vec![0, 2, 4, 6]);
        let bad = Array3::<f32>::zeros((4, 3, 3));
        assert!(matches!(
            batch.predictions(&bad, 3),
            Err(DecodeError::ModelOutputShape { .. })
        ));
    }
}
