use ndarray::Array2;
use neurocrop::band_power::{BandPowerConfig, BandPowerModel};
use neurocrop::config::{CropConfig, DecoderConfig};
use neurocrop::decoding::{
    AggregationRule, CropIndexer, CropPrediction, CrossEntropyLoss, DecodeError, PredictionAggregator,
    SamplerConfig, SamplingMode, StopCriterion, TrainingConfig, TrainingLoop, TrialId, TrialRecord,
    TrialSet,
};
use neurocrop::synthetic::{SyntheticConfig, SyntheticTrials};
fn synthetic(n_trials: usize, seed: u64) -> TrialSet {
    let config = SyntheticConfig {
        n_trials,
        min_samples: 300,
        max_samples: 450,
        seed,
        ..SyntheticConfig::default()
    };
    TrialSet::from_source(2, &mut SyntheticTrials::new(config)).unwrap()
}
fn decoder_config(mode: SamplingMode, epochs: usize) -> DecoderConfig {
    DecoderConfig {
        crop: CropConfig {
            input_length: 200,
            eval_batch_size: 32,
        },
        sampler: SamplerConfig {
            batch_size: 16,
            mode,
            drop_last: false,
            seed: 99,
        },
        training: TrainingConfig {
            max_epochs: epochs,
            stop: StopCriterion::MaxEpochs { epochs },
        },
        model: BandPowerConfig {
            kernel_length: 100,
            learning_rate: 0.5,
            seed: 4,
        },
        ..DecoderConfig::default()
    }
}
#[test]
fn reference_trial_yields_six_crops_and_class_zero() {
    let indexer = CropIndexer::new(500, 100).unwrap();
    let starts = indexer.starts_for(TrialId(0), 1000).unwrap();
    assert_eq!(starts, vec![0, 100, 200, 300, 400, 500]);
    let predictions: Vec<_> = starts
        .iter()
        .map(|&start| CropPrediction {
            trial_id: TrialId(0),
            output_start: start,
            output_length: 100,
            scores: Array2::from_shape_fn((100, 4), |(_, c)| if c == 0 { 0.7 } else { 0.1 }),
        })
        .collect();
    for rule in [AggregationRule::Sum, AggregationRule::Mean, AggregationRule::Vote] {
        let aggregated = PredictionAggregator::new(rule).aggregate(&predictions).unwrap();
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].predicted_label, 0);
        assert_eq!(aggregated[0].contributing_crops, 6);
    }
    assert!(matches!(
        indexer.starts_for(TrialId(1), 400),
        Err(DecodeError::TrialTooShort { .. })
    ));
}
#[test]
fn band_power_model_learns_synthetic_classes() {
    let trials = synthetic(40, 7);
    let (train, valid) = trials.split_fraction(0.75).unwrap();
    let config = decoder_config(SamplingMode::Shuffled, 12);
    let mut model = BandPowerModel::new(train.n_channels(), 2, &config.model);
    let mut training = TrainingLoop::from_config(&model, &train, &config).unwrap();
    let history = training
        .fit(&mut model, &CrossEntropyLoss, Some(&valid))
        .unwrap()
        .clone();
    assert_eq!(history.len(), 12);
    let first = &history.records()[0];
    let last = history.last().unwrap();
    assert!(last.train.mean_loss < first.train.mean_loss);
    let evaluation = training.evaluate(&mut model, &CrossEntropyLoss, &valid).unwrap();
    assert_eq!(evaluation.predictions.len(), valid.len());
    assert!(evaluation.trial_accuracy >= 0.8, "trial accuracy {}", evaluation.trial_accuracy);
    assert_eq!(
        last.valid.as_ref().unwrap().trial_accuracy,
        evaluation.trial_accuracy
    );
}
#[test]
fn identical_seeds_replay_identically() {
    let trials = synthetic(12, 3);
    let config = decoder_config(SamplingMode::Balanced, 3);
    let run = || {
        let mut model = BandPowerModel::new(trials.n_channels(), 2, &config.model);
        let mut training = TrainingLoop::from_config(&model, &trials, &config).unwrap();
        let losses: Vec<f32> = (0..3)
            .map(|_| training.run_epoch(&mut model, &CrossEntropyLoss).unwrap().mean_loss)
            .collect();
        (losses, model.weights().clone())
    };
    let (losses_a, weights_a) = run();
    let (losses_b, weights_b) = run();
    assert_eq!(losses_a, losses_b);
    assert_eq!(weights_a, weights_b);
}
#[test]
fn balanced_training_needs_every_class() {
    let records = (0..4u32).map(|i| TrialRecord::new(i, Array2::zeros((4, 400)), 0));
    let trials = TrialSet::new(2, records).unwrap();
    let config = decoder_config(SamplingMode::Balanced, 2);
    let mut model = BandPowerModel::new(4, 2, &config.model);
    let mut training = TrainingLoop::from_config(&model, &trials, &config).unwrap();
    let err = training.run_epoch(&mut model, &CrossEntropyLoss).unwrap_err();
    assert!(matches!(err, DecodeError::EmptyClassBucket { class: 1 }));
}
#[test]
fn short_trials_are_reported_not_dropped() {
    let mut records: Vec<_> = (0..4u32)
        .map(|i| TrialRecord::new(i, Array2::from_elem((4, 300), i as f32), (i % 2) as usize))
        .collect();
    records.push(TrialRecord::new(10, Array2::zeros((4, 150)), 1));
    let trials = TrialSet::new(2, records).unwrap();
    let config = decoder_config(SamplingMode::Sequential, 1);
    let mut model = BandPowerModel::new(4, 2, &config.model);
    let mut training = TrainingLoop::from_config(&model, &trials, &config).unwrap();
    assert_eq!(training.plan().rejected().len(), 1);
    let evaluation = training
        .evaluate_training_set(&mut model, &CrossEntropyLoss)
        .unwrap();
    assert_eq!(evaluation.rejected, vec![TrialId(10)]);
    assert_eq!(evaluation.predictions.len(), 4);
    let only_short = TrialSet::new(2, vec![TrialRecord::new(0, Array2::zeros((4, 150)), 0)]).unwrap();
    assert!(matches!(
        TrainingLoop::from_config(&model, &only_short, &config),
        Err(DecodeError::NoValidTrials { rejected: 1 })
    ));
}
