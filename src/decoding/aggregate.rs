//! Trial-level decisions from dense crop predictions.
//!
//! Every output row of every crop prediction is added once to the tally of
//! the output position it covers. Overlapping crops (the clamped last crop of
//! a trial) contribute independently. A tally is reduced to one score vector
//! per trial and the arg-max class wins; equal scores resolve to the lower
//! class index.
use std::collections::HashMap;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use crate::decoding::crop::CropPlan;
use crate::decoding::{DecodeError, TrialId};
/// Dense model output for one crop, aligned to the trial's output positions.
#[derive(Clone, Debug, PartialEq)]
pub struct CropPrediction {
    pub trial_id: TrialId,
    pub output_start: usize,
    pub output_length: usize,
    /// `output_length x n_classes`.
    pub scores: Array2<f32>,
}
/// One decision per trial.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedPrediction {
    pub trial_id: TrialId,
    pub predicted_label: usize,
    pub trial_scores: Array1<f32>,
    pub contributing_crops: usize,
    /// Arg-max class of every output position, when requested.
    pub per_timestep_votes: Option<Vec<usize>>,
}
/// How per-position tallies are reduced to one trial score vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    /// Sum over every covering crop and every position.
    Sum,
    /// Per-position mean over covering crops, then mean over positions.
    #[default]
    Mean,
    /// Each position votes for its arg-max class.
    Vote,
}
/// Index of the largest score; ties go to the lower index.
pub fn argmax(scores: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &v) in scores.iter().enumerate() {
        if v > best_score {
            best = i;
            best_score = v;
        }
    }
    best
}
struct TrialTally {
    sums: Array2<f64>, // position x class
    counts: Vec<usize>,
    contributing: usize,
}
impl TrialTally {
    fn new(n_classes: usize) -> Self {
        Self {
            sums: Array2::zeros((0, n_classes)),
            counts: Vec::new(),
            contributing: 0,
        }
    }
    fn add(&mut self, prediction: &CropPrediction) {
        let end = prediction.output_start + prediction.output_length;
        if end > self.counts.len() {
            let mut grown = Array2::zeros((end, self.sums.ncols()));
            grown
                .slice_mut(ndarray::s![..self.counts.len(), ..])
                .assign(&self.sums);
            self.sums = grown;
            self.counts.resize(end, 0);
        }
        for (offset, row) in prediction.scores.outer_iter().enumerate() {
            let pos = prediction.output_start + offset;
            let mut tally = self.sums.row_mut(pos);
            tally.zip_mut_with(&row, |acc, &s| *acc += f64::from(s));
            self.counts[pos] += 1;
        }
        self.contributing += 1;
    }
    fn first_gap(&self) -> Option<usize> {
        self.counts.iter().position(|&c| c == 0)
    }
    fn position_means(&self) -> Array2<f64> {
        let mut means = self.sums.clone();
        for (mut row, &count) in means.outer_iter_mut().zip(&self.counts) {
            row /= count as f64;
        }
        means
    }
}
#[derive(Clone, Copy, Debug, Default)]
pub struct PredictionAggregator {
    rule: AggregationRule,
    record_votes: bool,
}
impl PredictionAggregator {
    pub fn new(rule: AggregationRule) -> Self {
        Self {
            rule,
            record_votes: false,
        }
    }
    pub fn with_votes(mut self, record_votes: bool) -> Self {
        self.record_votes = record_votes;
        self
    }
    /// One prediction per trial id present, in order of first appearance.
    pub fn aggregate(
        &self,
        predictions: &[CropPrediction],
    ) -> Result<Vec<AggregatedPrediction>, DecodeError> {
        let (order, tallies) = self.tally(predictions)?;
        order
            .into_iter()
            .zip(tallies)
            .map(|(trial_id, tally)| self.reduce(trial_id, &tally))
            .collect()
    }
    /// Like [`aggregate`](Self::aggregate) but checks the result against the
    /// plan the predictions were made from: every planned trial must be
    /// covered over its full output span by exactly its planned crops.
    pub fn aggregate_plan(
        &self,
        plan: &CropPlan,
        predictions: &[CropPrediction],
    ) -> Result<Vec<AggregatedPrediction>, DecodeError> {
        let (order, tallies) = self.tally(predictions)?;
        let mut by_id: HashMap<TrialId, TrialTally> = order.into_iter().zip(tallies).collect();
        let mut results = Vec::with_capacity(plan.trials().len());
        for planned in plan.trials() {
            let tally = by_id.remove(&planned.trial_id).ok_or_else(|| {
                DecodeError::IncompleteTrialCoverage {
                    trial_id: planned.trial_id,
                    detail: "no crop predictions".into(),
                }
            })?;
            let expected = planned.crops.len();
            if tally.contributing != expected {
                return Err(DecodeError::IncompleteTrialCoverage {
                    trial_id: planned.trial_id,
                    detail: format!("{} crop predictions for {expected} crops", tally.contributing),
                });
            }
            if tally.counts.len() != planned.output_span {
                return Err(DecodeError::IncompleteTrialCoverage {
                    trial_id: planned.trial_id,
                    detail: format!(
                        "predictions span {} positions, expected {}",
                        tally.counts.len(),
                        planned.output_span
                    ),
                });
            }
            results.push(self.reduce(planned.trial_id, &tally)?);
        }
        if let Some(stray) = by_id.keys().min() {
            return Err(DecodeError::IncompleteTrialCoverage {
                trial_id: *stray,
                detail: "predictions for a trial outside the crop plan".into(),
            });
        }
        Ok(results)
    }
    fn tally(
        &self,
        predictions: &[CropPrediction],
    ) -> Result<(Vec<TrialId>, Vec<TrialTally>), DecodeError> {
        let n_classes = predictions.first().map(|p| p.scores.ncols()).unwrap_or(0);
        let mut order = Vec::new();
        let mut tallies: Vec<TrialTally> = Vec::new();
        let mut slot_of: HashMap<TrialId, usize> = HashMap::new();
        for prediction in predictions {
            let (rows, cols) = prediction.scores.dim();
            if rows != prediction.output_length || cols != n_classes {
                return Err(DecodeError::PredictionShape {
                    trial_id: prediction.trial_id,
                    expected: (prediction.output_length, n_classes),
                    actual: (rows, cols),
                });
            }
            let slot = *slot_of.entry(prediction.trial_id).or_insert_with(|| {
                order.push(prediction.trial_id);
                tallies.push(TrialTally::new(n_classes));
                tallies.len() - 1
            });
            tallies[slot].add(prediction);
        }
        debug!(
            "tallied {} crop predictions over {} trials",
            predictions.len(),
            order.len()
        );
        Ok((order, tallies))
    }
    fn reduce(&self, trial_id: TrialId, tally: &TrialTally) -> Result<AggregatedPrediction, DecodeError> {
        if tally.contributing == 0 || tally.counts.is_empty() {
            return Err(DecodeError::IncompleteTrialCoverage {
                trial_id,
                detail: "no crop predictions".into(),
            });
        }
        if let Some(pos) = tally.first_gap() {
            return Err(DecodeError::IncompleteTrialCoverage {
                trial_id,
                detail: format!("output position {pos} is not covered by any crop"),
            });
        }
        let n_classes = tally.sums.ncols();
        let position_votes = || -> Vec<usize> {
            tally
                .sums
                .outer_iter()
                .map(|row| argmax(row.mapv(|v| v as f32).view()))
                .collect()
        };
        let trial_scores: Array1<f32> = match self.rule {
            AggregationRule::Sum => tally.sums.sum_axis(ndarray::Axis(0)).mapv(|v| v as f32),
            AggregationRule::Mean => {
                let means = tally.position_means();
                let total = means.sum_axis(ndarray::Axis(0));
                (total / tally.counts.len() as f64).mapv(|v| v as f32)
            }
            AggregationRule::Vote => {
                let mut votes = Array1::zeros(n_classes);
                for class in position_votes() {
                    votes[class] += 1.0;
                }
                votes
            }
        };
        Ok(AggregatedPrediction {
            trial_id,
            predicted_label: argmax(trial_scores.view()),
            trial_scores,
            contributing_crops: tally.contributing,
            per_timestep_votes: self.record_votes.then(position_votes),
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::{CropIndexer, TrialRecord, TrialSet};
    use ndarray::array;
    fn prediction(trial: u32, start: usize, rows: Array2<f32>) -> CropPrediction {
        CropPrediction {
            trial_id: TrialId(trial),
            output_start: start,
            output_length: rows.nrows(),
            scores: rows,
        }
    }
    fn uniform(trial: u32, start: usize, len: usize, row: &[f32]) -> CropPrediction {
        let scores = Array2::from_shape_fn((len, row.len()), |(_, c)| row[c]);
        prediction(trial, start, scores)
    }
    #[test]
    fn reference_trial_resolves_to_class_zero() {
        let indexer = CropIndexer::new(500, 100).unwrap();
        let starts = indexer.starts_for(TrialId(0), 1000).unwrap();
        assert_eq!(starts.len(), 6);
        let preds: Vec<_> = starts
            .iter()
            .map(|&s| uniform(0, s, 100, &[0.9, 0.05, 0.05]))
            .collect();
        let out = PredictionAggregator::default().aggregate(&preds).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].predicted_label, 0);
        assert_eq!(out[0].contributing_crops, 6);
    }
    #[test]
    fn ties_resolve_to_lower_class() {
        let preds = vec![uniform(1, 0, 4, &[0.2, 0.4, 0.4])];
        for rule in [AggregationRule::Sum, AggregationRule::Mean, AggregationRule::Vote] {
            let out = PredictionAggregator::new(rule).aggregate(&preds).unwrap();
            assert_eq!(out[0].predicted_label, 1, "{rule:?}");
        }
        let flat = vec![uniform(1, 0, 4, &[0.5, 0.5])];
        let out = PredictionAggregator::default().aggregate(&flat).unwrap();
        assert_eq!(out[0].predicted_label, 0);
    }
    #[test]
    fn sum_and_mean_weigh_overlaps_differently() {
        let preds = vec![
            prediction(0, 0, array![[0.0, 3.0], [2.0, 0.0]]),
            prediction(0, 1, array![[2.0, 0.0], [0.0, 0.0]]),
        ];
        let sum = PredictionAggregator::new(AggregationRule::Sum)
            .aggregate(&preds)
            .unwrap();
        assert_eq!(sum[0].trial_scores, array![4.0_f32, 3.0]);
        assert_eq!(sum[0].predicted_label, 0);
        let mean = PredictionAggregator::new(AggregationRule::Mean)
            .aggregate(&preds)
            .unwrap();
        assert!((mean[0].trial_scores[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((mean[0].trial_scores[1] - 1.0).abs() < 1e-6);
        assert_eq!(mean[0].predicted_label, 1);
        let vote = PredictionAggregator::new(AggregationRule::Vote)
            .with_votes(true)
            .aggregate(&preds)
            .unwrap();
        assert_eq!(vote[0].per_timestep_votes, Some(vec![1, 0, 0]));
        assert_eq!(vote[0].trial_scores, array![2.0_f32, 1.0]);
        assert_eq!(vote[0].predicted_label, 0);
    }
    #[test]
    fn mean_is_invariant_to_crop_count() {
        let short: Vec<_> = (0..3).map(|k| uniform(0, k * 2, 2, &[1.0, 2.0])).collect();
        let long: Vec<_> = (0..5).map(|k| uniform(1, k * 2, 2, &[1.0, 2.0])).collect();
        let preds: Vec<_> = short.into_iter().chain(long).collect();
        let mean = PredictionAggregator::new(AggregationRule::Mean)
            .aggregate(&preds)
            .unwrap();
        assert_eq!(mean[0].trial_scores, mean[1].trial_scores);
        let sum = PredictionAggregator::new(AggregationRule::Sum)
            .aggregate(&preds)
            .unwrap();
        assert_eq!(sum[0].trial_scores, array![6.0_f32, 12.0]);
        assert_eq!(sum[1].trial_scores, array![10.0_f32, 20.0]);
    }
    #[test]
    fn output_keeps_first_appearance_order_and_is_idempotent() {
        let preds = vec![
            uniform(9, 0, 2, &[0.0, 1.0]),
            uniform(3, 0, 2, &[1.0, 0.0]),
            uniform(9, 2, 2, &[0.0, 1.0]),
        ];
        let aggregator = PredictionAggregator::new(AggregationRule::Sum).with_votes(true);
        let first = aggregator.aggregate(&preds).unwrap();
        let second = aggregator.aggregate(&preds).unwrap();
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|p| p.trial_id.0).collect();
        assert_eq!(ids, vec![9, 3]);
        assert_eq!(first[0].contributing_crops, 2);
    }
    #[test]
    fn gaps_are_reported() {
        let preds = vec![uniform(2, 0, 2, &[1.0, 0.0]), uniform(2, 4, 2, &[1.0, 0.0])];
        let err = PredictionAggregator::default().aggregate(&preds).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::IncompleteTrialCoverage { trial_id: TrialId(2), .. }
        ));
    }
    #[test]
    fn class_count_mismatch_is_a_shape_error() {
        let preds = vec![uniform(0, 0, 2, &[1.0, 0.0]), uniform(0, 2, 2, &[1.0, 0.0, 0.0])];
        let err = PredictionAggregator::default().aggregate(&preds).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::PredictionShape {
                trial_id: TrialId(0),
                expected: (2, 2),
                actual: (2, 3),
            }
        ));
        assert_eq!(
            err.to_string(),
            "crop prediction for trial #0 has shape (2, 3), expected (2, 2)"
        );
    }
    #[test]
    fn plan_checks_conserve_crop_counts() {
        let records = vec![
            TrialRecord::new(0, Array2::zeros((1, 20)), 0),
            TrialRecord::new(1, Array2::zeros((1, 13)), 1),
        ];
        let trials = TrialSet::new(2, records).unwrap();
        let plan = CropIndexer::new(10, 4).unwrap().index_trials(&trials).unwrap();
        let preds: Vec<_> = plan
            .crops()
            .iter()
            .map(|c| uniform(c.trial_id.0, c.start_sample, c.output_length, &[0.0, 1.0]))
            .collect();
        let aggregator = PredictionAggregator::default();
        let out = aggregator.aggregate_plan(&plan, &preds).unwrap();
        assert_eq!(out.len(), 2);
        for (agg, planned) in out.iter().zip(plan.trials()) {
            assert_eq!(agg.trial_id, planned.trial_id);
            assert_eq!(agg.contributing_crops, planned.crops.len());
        }
        // drop trial 1 entirely
        let only_first: Vec<_> = preds.iter().filter(|p| p.trial_id == TrialId(0)).cloned().collect();
        let err = aggregator.aggregate_plan(&plan, &only_first).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::IncompleteTrialCoverage { trial_id: TrialId(1), .. }
        ));
        // duplicate a prediction
        let mut doubled = preds.clone();
        doubled.push(preds[0].clone());
        assert!(aggregator.aggregate_plan(&plan, &doubled).is_err());
        // stray trial
        let mut stray = preds.clone();
        stray.push(uniform(42, 0, 4, &[1.0, 0.0]));
        let err = aggregator.aggregate_plan(&plan, &stray).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::IncompleteTrialCoverage { trial_id: TrialId(42), .. }
        ));
    }
}
