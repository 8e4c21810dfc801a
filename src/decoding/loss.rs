use ndarray::{Array3, Axis};
use crate::decoding::aggregate::argmax;
/// Scalar loss for a batch plus its gradient with respect to the scores.
#[derive(Clone, Debug)]
pub struct Loss {
    pub value: f32,
    /// Same shape as the scores: `batch x output_length x n_classes`.
    pub grad: Array3<f32>,
}
pub trait LossFunction {
    fn compute_loss(&self, scores: &Array3<f32>, labels: &[usize]) -> Loss;
}
/// Softmax cross-entropy over class logits, averaged over crops and time steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossEntropyLoss;
impl LossFunction for CrossEntropyLoss {
    fn compute_loss(&self, scores: &Array3<f32>, labels: &[usize]) -> Loss {
        let (n_crops, n_steps, n_classes) = scores.dim();
        let mut grad = Array3::zeros(scores.raw_dim());
        let count = (n_crops * n_steps) as f32;
        if count == 0.0 || n_classes == 0 {
            return Loss { value: 0.0, grad };
        }
        let mut total = 0.0_f64;
        for (b, &label) in labels.iter().enumerate().take(n_crops) {
            for t in 0..n_steps {
                let logits = scores.slice(ndarray::s![b, t, ..]);
                let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                let exp: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
                let sum: f32 = exp.iter().sum();
                for (c, e) in exp.iter().enumerate() {
                    let p = e / sum;
                    let target = if c == label { 1.0 } else { 0.0 };
                    grad[[b, t, c]] = (p - target) / count;
                }
                total -= f64::from((exp[label] / sum).max(f32::MIN_POSITIVE).ln());
            }
        }
        Loss {
            value: (total / f64::from(count)) as f32,
            grad,
        }
    }
}
/// Crops whose time-averaged scores pick their label.
pub fn correct_crops(scores: &Array3<f32>, labels: &[usize]) -> usize {
    scores
        .outer_iter()
        .zip(labels)
        .filter(|(crop_scores, label)| {
            crop_scores
                .mean_axis(Axis(0))
                .map(|mean| argmax(mean.view()) == **label)
                .unwrap_or(false)
        })
        .count()
}
