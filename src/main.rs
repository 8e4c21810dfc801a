// src/main.rs
use anyhow::{Context, Result};
use log::info;
use neurocrop::band_power::BandPowerModel;
use neurocrop::config::DecoderConfig;
use neurocrop::decoding::{CrossEntropyLoss, TrainingLoop, TrialSet};
use neurocrop::synthetic::{SyntheticConfig, SyntheticTrials};
use serde::Deserialize;
/// Decoder settings plus the synthetic recording used in place of a loader.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfig {
    decoder: DecoderConfig,
    data: SyntheticConfig,
    valid_fraction: Option<f64>,
}
fn load_run_config() -> Result<RunConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(RunConfig::default());
    };
    let contents =
        std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let run: RunConfig =
        serde_json::from_str(&contents).with_context(|| format!("failed to parse {path}"))?;
    run.decoder.validate()?;
    Ok(run)
}
fn main() -> Result<()> {
    env_logger::init();
    let run = load_run_config()?;
    let n_classes = run.data.n_classes;
    let trials = TrialSet::from_source(n_classes, &mut SyntheticTrials::new(run.data.clone()))
        .context("failed to build the synthetic trial set")?;
    let (train, valid) = trials.split_fraction(1.0 - run.valid_fraction.unwrap_or(0.2))?;
    info!("{} training trials, {} validation trials", train.len(), valid.len());
    let mut model = BandPowerModel::new(train.n_channels(), n_classes, &run.decoder.model);
    let loss = CrossEntropyLoss;
    let mut training = TrainingLoop::from_config(&model, &train, &run.decoder)?;
    let valid_set = (!valid.is_empty()).then_some(&valid);
    let history = training.fit(&mut model, &loss, valid_set)?;
    println!("{}", serde_json::to_string_pretty(history)?);
    let evaluation = match valid_set {
        Some(set) => training.evaluate(&mut model, &loss, set)?,
        None => training.evaluate_training_set(&mut model, &loss)?,
    };
    for prediction in &evaluation.predictions {
        println!(
            "trial {} -> class {} ({} crops)",
            prediction.trial_id, prediction.predicted_label, prediction.contributing_crops
        );
    }
    println!(
        "trial accuracy {:.3}, crop accuracy {:.3}, loss {:.4}",
        evaluation.trial_accuracy, evaluation.crop_accuracy, evaluation.loss
    );
    Ok(())
}
