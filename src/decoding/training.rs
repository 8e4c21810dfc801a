//! Epoch driver for cropped training and exhaustive trial-level evaluation.
use std::time::Instant;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::config::DecoderConfig;
use crate::decoding::aggregate::{AggregatedPrediction, CropPrediction, PredictionAggregator};
use crate::decoding::crop::{CropIndexer, CropPlan};
use crate::decoding::loss::{correct_crops, LossFunction};
use crate::decoding::model::{ComputeModel, CropBatch};
use crate::decoding::sampler::{BatchSampler, SamplerConfig};
use crate::decoding::{DecodeError, TrialId, TrialSet};
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TrainLoss,
    /// 1 - per-crop accuracy on the training epoch.
    TrainMisclass,
    ValidLoss,
    /// 1 - trial-level accuracy on the validation set.
    ValidMisclass,
}
/// When `fit` should stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopCriterion {
    MaxEpochs { epochs: usize },
    /// Stop once `metric` has not dropped below `(1 - min_decrease) * best`
    /// for `patience` epochs.
    NoDecrease {
        metric: Metric,
        patience: usize,
        min_decrease: f32,
    },
    Or { criteria: Vec<StopCriterion> },
}
impl StopCriterion {
    pub fn should_stop(&self, history: &History) -> bool {
        match self {
            StopCriterion::MaxEpochs { epochs } => history.len() >= *epochs,
            StopCriterion::NoDecrease {
                metric,
                patience,
                min_decrease,
            } => {
                let values: Vec<f32> = history.records().iter().filter_map(|r| r.metric(*metric)).collect();
                let Some((&first, rest)) = values.split_first() else {
                    return false;
                };
                let mut best = first;
                let mut best_at = 0;
                for (i, &value) in rest.iter().enumerate() {
                    if value < (1.0 - min_decrease) * best {
                        best = value;
                        best_at = i + 1;
                    }
                }
                values.len() - 1 - best_at >= *patience
            }
            StopCriterion::Or { criteria } => criteria.iter().any(|c| c.should_stop(history)),
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Hard cap, applied even if `stop` never fires.
    pub max_epochs: usize,
    pub stop: StopCriterion,
}
impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_epochs: 30,
            stop: StopCriterion::MaxEpochs { epochs: 30 },
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Training { epoch: usize },
    Evaluating,
}
/// Aggregate metrics of one training epoch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochMetrics {
    /// 1-based.
    pub epoch: usize,
    pub mean_loss: f32,
    pub crop_accuracy: f32,
    pub n_crops: usize,
    pub n_batches: usize,
    pub elapsed_ms: u128,
}
/// Result of an exhaustive, sequential pass over a trial set.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub crop_accuracy: f32,
    pub trial_accuracy: f32,
    pub predictions: Vec<AggregatedPrediction>,
    /// Trials too short to crop.
    pub rejected: Vec<TrialId>,
}
impl Evaluation {
    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            loss: self.loss,
            crop_accuracy: self.crop_accuracy,
            trial_accuracy: self.trial_accuracy,
            n_trials: self.predictions.len(),
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub loss: f32,
    pub crop_accuracy: f32,
    pub trial_accuracy: f32,
    pub n_trials: usize,
}
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochRecord {
    pub train: EpochMetrics,
    pub valid: Option<EvaluationSummary>,
}
impl EpochRecord {
    pub fn metric(&self, metric: Metric) -> Option<f32> {
        match metric {
            Metric::TrainLoss => Some(self.train.mean_loss),
            Metric::TrainMisclass => Some(1.0 - self.train.crop_accuracy),
            Metric::ValidLoss => self.valid.as_ref().map(|v| v.loss),
            Metric::ValidMisclass => self.valid.as_ref().map(|v| 1.0 - v.trial_accuracy),
        }
    }
}
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct History {
    records: Vec<EpochRecord>,
}
impl History {
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }
    fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }
}
#[derive(Default)]
struct PassTotals {
    loss: f64,
    correct: usize,
    crops: usize,
    batches: usize,
}
impl PassTotals {
    fn mean_loss(&self) -> f32 {
        if self.crops == 0 {
            0.0
        } else {
            (self.loss / self.crops as f64) as f32
        }
    }
    fn accuracy(&self) -> f32 {
        if self.crops == 0 {
            0.0
        } else {
            self.correct as f32 / self.crops as f32
        }
    }
}
/// Owns the crop plan and sampler of one training set and drives epochs over it.
pub struct TrainingLoop<'a> {
    trials: &'a TrialSet,
    plan: CropPlan,
    sampler: BatchSampler,
    aggregator: PredictionAggregator,
    config: TrainingConfig,
    eval_batch_size: usize,
    state: LoopState,
    epochs_completed: usize,
    history: History,
}
impl<'a> TrainingLoop<'a> {
    pub fn new(
        trials: &'a TrialSet,
        indexer: CropIndexer,
        sampler_config: SamplerConfig,
        aggregator: PredictionAggregator,
        config: TrainingConfig,
    ) -> Result<Self, DecodeError> {
        if config.max_epochs == 0 {
            return Err(DecodeError::InvalidConfig("max_epochs must be positive".into()));
        }
        let plan = indexer.index_trials(trials)?;
        if !plan.rejected().is_empty() {
            warn!(
                "{} of {} training trials are too short for {}-sample crops",
                plan.rejected().len(),
                trials.len(),
                indexer.input_length()
            );
        }
        let eval_batch_size = sampler_config.batch_size;
        let sampler = BatchSampler::new(&plan, sampler_config)?;
        info!(
            "cropped {} trials into {} crops ({} in, {} out)",
            plan.trials().len(),
            plan.crops().len(),
            indexer.input_length(),
            indexer.output_length()
        );
        Ok(Self {
            trials,
            plan,
            sampler,
            aggregator,
            config,
            eval_batch_size,
            state: LoopState::Idle,
            epochs_completed: 0,
            history: History::default(),
        })
    }
    /// Queries the model's output length once and wires every component from `config`.
    pub fn from_config<M: ComputeModel + ?Sized>(
        model: &M,
        trials: &'a TrialSet,
        config: &DecoderConfig,
    ) -> Result<Self, DecodeError> {
        let indexer = CropIndexer::from_model(model, config.crop.input_length)?;
        let mut training = Self::new(
            trials,
            indexer,
            config.sampler.clone(),
            config.aggregator.build(),
            config.training.clone(),
        )?;
        training.eval_batch_size = config.crop.eval_batch_size.max(1);
        Ok(training)
    }
    pub fn state(&self) -> LoopState {
        self.state
    }
    pub fn plan(&self) -> &CropPlan {
        &self.plan
    }
    pub fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }
    pub fn history(&self) -> &History {
        &self.history
    }
    /// One pass over every training batch with parameter updates.
    pub fn run_epoch<M, L>(&mut self, model: &mut M, loss_fn: &L) -> Result<EpochMetrics, DecodeError>
    where
        M: ComputeModel + ?Sized,
        L: LossFunction + ?Sized,
    {
        check_classes(model, self.trials)?;
        let epoch = self.epochs_completed + 1;
        self.state = LoopState::Training { epoch };
        let started = Instant::now();
        let result = self.train_batches(model, loss_fn, self.epochs_completed as u64);
        self.state = LoopState::Idle;
        let totals = result?;
        self.epochs_completed = epoch;
        self.sampler.seek(epoch as u64);
        let metrics = EpochMetrics {
            epoch,
            mean_loss: totals.mean_loss(),
            crop_accuracy: totals.accuracy(),
            n_crops: totals.crops,
            n_batches: totals.batches,
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            "epoch {epoch}: loss {:.4}, crop accuracy {:.3} over {} crops",
            metrics.mean_loss, metrics.crop_accuracy, metrics.n_crops
        );
        Ok(metrics)
    }
    /// Batches are drawn for `sampler_epoch` so a failed epoch is retried
    /// with the same shuffle.
    fn train_batches<M, L>(
        &self,
        model: &mut M,
        loss_fn: &L,
        sampler_epoch: u64,
    ) -> Result<PassTotals, DecodeError>
    where
        M: ComputeModel + ?Sized,
        L: LossFunction + ?Sized,
    {
        let n_classes = self.trials.n_classes();
        let mut totals = PassTotals::default();
        for crops in self.sampler.epoch_batches(sampler_epoch)? {
            let batch = CropBatch::gather(self.trials, crops)?;
            let scores = model.forward(&batch).map_err(DecodeError::model)?;
            batch.check_scores(&scores, n_classes)?;
            let labels = batch.labels();
            let loss = loss_fn.compute_loss(&scores, &labels);
            model.update_parameters(&loss).map_err(DecodeError::model)?;
            totals.loss += f64::from(loss.value) * batch.len() as f64;
            totals.correct += correct_crops(&scores, &labels);
            totals.crops += batch.len();
            totals.batches += 1;
            debug!("batch {}: loss {:.4}", totals.batches, loss.value);
        }
        Ok(totals)
    }
    /// Sequential, update-free pass over `trials` with trial-level aggregation.
    pub fn evaluate<M, L>(
        &mut self,
        model: &mut M,
        loss_fn: &L,
        trials: &TrialSet,
    ) -> Result<Evaluation, DecodeError>
    where
        M: ComputeModel + ?Sized,
        L: LossFunction + ?Sized,
    {
        check_classes(model, trials)?;
        self.state = LoopState::Evaluating;
        let result = self.evaluate_inner(model, loss_fn, trials);
        self.state = LoopState::Idle;
        result
    }
    /// Evaluates on the set this loop trains on.
    pub fn evaluate_training_set<M, L>(&mut self, model: &mut M, loss_fn: &L) -> Result<Evaluation, DecodeError>
    where
        M: ComputeModel + ?Sized,
        L: LossFunction + ?Sized,
    {
        let trials = self.trials;
        self.evaluate(model, loss_fn, trials)
    }
    fn evaluate_inner<M, L>(
        &self,
        model: &mut M,
        loss_fn: &L,
        trials: &TrialSet,
    ) -> Result<Evaluation, DecodeError>
    where
        M: ComputeModel + ?Sized,
        L: LossFunction + ?Sized,
    {
        let plan = self.plan.indexer().index_trials(trials)?;
        let sampler = BatchSampler::new(&plan, SamplerConfig::sequential(self.eval_batch_size))?;
        let mut totals = PassTotals::default();
        let mut predictions: Vec<CropPrediction> = Vec::with_capacity(plan.crops().len());
        for crops in sampler.epoch_batches(0)? {
            let batch = CropBatch::gather(trials, crops)?;
            let scores = model.forward(&batch).map_err(DecodeError::model)?;
            let labels = batch.labels();
            predictions.extend(batch.predictions(&scores, trials.n_classes())?);
            let loss = loss_fn.compute_loss(&scores, &labels);
            totals.loss += f64::from(loss.value) * batch.len() as f64;
            totals.correct += correct_crops(&scores, &labels);
            totals.crops += batch.len();
            totals.batches += 1;
        }
        let aggregated = self.aggregator.aggregate_plan(&plan, &predictions)?;
        let correct_trials = aggregated
            .iter()
            .zip(plan.trials())
            .filter(|(prediction, planned)| prediction.predicted_label == planned.label)
            .count();
        let rejected = plan
            .rejected()
            .iter()
            .filter_map(|err| match err {
                DecodeError::TrialTooShort { trial_id, .. } => Some(*trial_id),
                _ => None,
            })
            .collect();
        let evaluation = Evaluation {
            loss: totals.mean_loss(),
            crop_accuracy: totals.accuracy(),
            trial_accuracy: correct_trials as f32 / aggregated.len() as f32,
            predictions: aggregated,
            rejected,
        };
        info!(
            "evaluated {} trials: loss {:.4}, crop accuracy {:.3}, trial accuracy {:.3}",
            evaluation.predictions.len(),
            evaluation.loss,
            evaluation.crop_accuracy,
            evaluation.trial_accuracy
        );
        Ok(evaluation)
    }
    /// Trains until the stop criterion fires or `max_epochs` is reached,
    /// evaluating on `valid` after every epoch when given.
    pub fn fit<M, L>(
        &mut self,
        model: &mut M,
        loss_fn: &L,
        valid: Option<&TrialSet>,
    ) -> Result<&History, DecodeError>
    where
        M: ComputeModel + ?Sized,
        L: LossFunction + ?Sized,
    {
        while self.history.len() < self.config.max_epochs && !self.config.stop.should_stop(&self.history) {
            let train = self.run_epoch(model, loss_fn)?;
            let summary = match valid {
                Some(set) => Some(self.evaluate(model, loss_fn, set)?.summary()),
                None => None,
            };
            self.history.push(EpochRecord {
                train,
                valid: summary,
            });
        }
        info!("training stopped after {} epochs", self.history.len());
        Ok(&self.history)
    }
}
fn check_classes<M: ComputeModel + ?Sized>(model: &M, trials: &TrialSet) -> Result<(), DecodeError> {
    if model.n_classes() != trials.n_classes() {
        return Err(DecodeError::InvalidConfig(format!(
            "model predicts {} classes, trials have {}",
            model.n_classes(),
            trials.n_classes()
        )));
    }
    Ok(())
}
