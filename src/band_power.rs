// src/band_power.rs
//! Log band-power features and a linear dense decoder built on them.
use ndarray::{s, Array1, Array2, Array3, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::decoding::{ComputeModel, CropBatch, Loss, ModelError};
/// Offset that keeps `ln` finite on flat signals.
const POWER_FLOOR: f64 = 1e-6;
/// Log variance of a window: the usual EEG band-power proxy.
pub fn log_band_power(window: ArrayView1<'_, f32>) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let n = window.len() as f64;
    // remove residual DC before taking the power
    let mean = window.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|&v| {
            let diff = f64::from(v) - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (variance + POWER_FLOOR).ln() as f32
}
/// `log_band_power` of every `kernel`-sample window of `row`, stride 1.
pub fn sliding_log_power(row: ArrayView1<'_, f32>, kernel: usize) -> Array1<f32> {
    if kernel == 0 || row.len() < kernel {
        return Array1::zeros(0);
    }
    let mut sum = vec![0.0_f64; row.len() + 1];
    let mut sum_sq = vec![0.0_f64; row.len() + 1];
    for (i, &v) in row.iter().enumerate() {
        let v = f64::from(v);
        sum[i + 1] = sum[i] + v;
        sum_sq[i + 1] = sum_sq[i] + v * v;
    }
    let k = kernel as f64;
    Array1::from_shape_fn(row.len() - kernel + 1, |t| {
        let mean = (sum[t + kernel] - sum[t]) / k;
        let variance = ((sum_sq[t + kernel] - sum_sq[t]) / k - mean * mean).max(0.0);
        (variance + POWER_FLOOR).ln() as f32
    })
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandPowerConfig {
    /// Receptive field in samples.
    pub kernel_length: usize,
    pub learning_rate: f32,
    pub seed: u64,
}
impl Default for BandPowerConfig {
    fn default() -> Self {
        Self {
            kernel_length: 250,
            learning_rate: 0.5,
            seed: 1,
        }
    }
}
/// Per output step: log band power of each channel over the receptive field,
/// then a linear map to class logits. Trained with plain SGD.
pub struct BandPowerModel {
    weights: Array2<f32>, // classes x channels
    bias: Array1<f32>,
    kernel_length: usize,
    learning_rate: f32,
    cached_features: Option<Array3<f32>>, // batch x steps x channels
}
impl BandPowerModel {
    pub fn new(n_channels: usize, n_classes: usize, config: &BandPowerConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let weights = Array2::from_shape_fn((n_classes, n_channels), |_| rng.gen_range(-0.01..0.01));
        Self {
            weights,
            bias: Array1::zeros(n_classes),
            kernel_length: config.kernel_length.max(1),
            learning_rate: config.learning_rate,
            cached_features: None,
        }
    }
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }
    fn features(&self, batch: &CropBatch) -> Result<Array3<f32>, ModelError> {
        let (n, channels, len) = batch.inputs().dim();
        if channels != self.weights.ncols() {
            return Err(format!(
                "expected {} channels, batch has {channels}",
                self.weights.ncols()
            )
            .into());
        }
        let steps = self.output_length_for(len)?;
        let mut features = Array3::zeros((n, steps, channels));
        for b in 0..n {
            for c in 0..channels {
                let row = batch.inputs().slice(s![b, c, ..]);
                features
                    .slice_mut(s![b, .., c])
                    .assign(&sliding_log_power(row, self.kernel_length));
            }
        }
        Ok(features)
    }
}
impl ComputeModel for BandPowerModel {
    fn n_classes(&self) -> usize {
        self.weights.nrows()
    }
    fn output_length_for(&self, input_length: usize) -> Result<usize, ModelError> {
        if input_length < self.kernel_length {
            return Err(format!(
                "input of {input_length} samples is shorter than the {}-sample receptive field",
                self.kernel_length
            )
            .into());
        }
        Ok(input_length - self.kernel_length + 1)
    }
    fn forward(&mut self, batch: &CropBatch) -> Result<Array3<f32>, ModelError> {
        let features = self.features(batch)?;
        let (n, steps, _) = features.dim();
        let mut scores = Array3::zeros((n, steps, self.n_classes()));
        for (b, crop_features) in features.outer_iter().enumerate() {
            let logits = crop_features.dot(&self.weights.t()) + &self.bias;
            scores.slice_mut(s![b, .., ..]).assign(&logits);
        }
        self.cached_features = Some(features);
        Ok(scores)
    }
    fn update_parameters(&mut self, loss: &Loss) -> Result<(), ModelError> {
        let features = self
            .cached_features
            .take()
            .ok_or("update_parameters called without a preceding forward pass")?;
        let (n, steps, _) = features.dim();
        if loss.grad.dim() != (n, steps, self.n_classes()) {
            return Err(format!(
                "loss gradient shape {:?} does not match the last forward pass",
                loss.grad.dim()
            )
            .into());
        }
        let mut grad_weights = Array2::<f32>::zeros(self.weights.raw_dim());
        let mut grad_bias = Array1::<f32>::zeros(self.bias.raw_dim());
        for (grad, crop_features) in loss.grad.outer_iter().zip(features.outer_iter()) {
            grad_weights += &grad.t().dot(&crop_features);
            grad_bias += &grad.sum_axis(Axis(0));
        }
        self.weights.scaled_add(-self.learning_rate, &grad_weights);
        self.bias.scaled_add(-self.learning_rate, &grad_bias);
        Ok(())
    }
}
