use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::decoding::crop::{Crop, CropPlan};
use crate::decoding::DecodeError;
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Plan order, every crop once. Used for evaluation.
    #[default]
    Sequential,
    /// Every crop once, fresh permutation per epoch.
    Shuffled,
    /// Class-stratified batches; minority classes are reused within an epoch.
    Balanced,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub batch_size: usize,
    pub mode: SamplingMode,
    pub drop_last: bool,
    pub seed: u64,
}
impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            mode: SamplingMode::Shuffled,
            drop_last: false,
            seed: 328_774,
        }
    }
}
impl SamplerConfig {
    pub fn sequential(batch_size: usize) -> Self {
        Self {
            batch_size,
            mode: SamplingMode::Sequential,
            ..Self::default()
        }
    }
}
/// Explicit random state: the generator of an epoch depends only on seed and epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerRng {
    seed: u64,
    epoch: u64,
}
impl SamplerRng {
    pub fn new(seed: u64) -> Self {
        Self { seed, epoch: 0 }
    }
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
    pub fn advance(&mut self) {
        self.epoch += 1;
    }
    pub fn seek(&mut self, epoch: u64) {
        self.epoch = epoch;
    }
    /// Generator for `epoch`, independent of the current counter.
    pub fn for_epoch(&self, epoch: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ epoch.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}
/// Turns a crop plan into minibatches, one epoch at a time.
pub struct BatchSampler {
    crops: Vec<Crop>,
    n_classes: usize,
    config: SamplerConfig,
    rng: SamplerRng,
}
impl BatchSampler {
    pub fn new(plan: &CropPlan, config: SamplerConfig) -> Result<Self, DecodeError> {
        if config.batch_size == 0 {
            return Err(DecodeError::InvalidConfig("batch size must be positive".into()));
        }
        Ok(Self {
            crops: plan.crops().to_vec(),
            n_classes: plan.n_classes(),
            rng: SamplerRng::new(config.seed),
            config,
        })
    }
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }
    pub fn n_crops(&self) -> usize {
        self.crops.len()
    }
    /// Index of the epoch `next_epoch` will produce.
    pub fn epoch(&self) -> u64 {
        self.rng.epoch()
    }
    pub fn batches_per_epoch(&self) -> usize {
        let full = self.crops.len() / self.config.batch_size;
        let partial = self.crops.len() % self.config.batch_size != 0;
        if partial && !self.config.drop_last {
            full + 1
        } else {
            full
        }
    }
    /// Batches of the current epoch; advances the epoch counter on success.
    pub fn next_epoch(&mut self) -> Result<EpochBatches, DecodeError> {
        let batches = self.epoch_batches(self.rng.epoch())?;
        self.rng.advance();
        Ok(batches)
    }
    /// Moves the counter so the next `next_epoch` produces `epoch`.
    pub fn seek(&mut self, epoch: u64) {
        self.rng.seek(epoch);
    }
    /// Batches of any epoch. Calling twice with the same epoch yields the same batches.
    pub fn epoch_batches(&self, epoch: u64) -> Result<EpochBatches, DecodeError> {
        let order = match self.config.mode {
            SamplingMode::Sequential => self.crops.clone(),
            SamplingMode::Shuffled => {
                let mut order = self.crops.clone();
                order.shuffle(&mut self.rng.for_epoch(epoch));
                order
            }
            SamplingMode::Balanced => self.balanced_order(&mut self.rng.for_epoch(epoch))?,
        };
        debug!(
            "epoch {epoch}: {} crops in {:?} order",
            order.len(),
            self.config.mode
        );
        Ok(EpochBatches {
            order,
            batch_size: self.config.batch_size,
            drop_last: self.config.drop_last,
            cursor: 0,
        })
    }
    fn balanced_order(&self, rng: &mut StdRng) -> Result<Vec<Crop>, DecodeError> {
        let mut buckets: Vec<Vec<Crop>> = vec![Vec::new(); self.n_classes];
        for crop in &self.crops {
            buckets[crop.label].push(*crop);
        }
        if let Some(class) = buckets.iter().position(|b| b.is_empty()) {
            return Err(DecodeError::EmptyClassBucket { class });
        }
        for bucket in &mut buckets {
            bucket.shuffle(rng);
        }
        let mut cursors = vec![0; self.n_classes];
        let total = self.crops.len();
        let mut order = Vec::with_capacity(total);
        while order.len() < total {
            let len = self.config.batch_size.min(total - order.len());
            let offset = rng.gen_range(0..self.n_classes);
            let mut batch = Vec::with_capacity(len);
            for slot in 0..len {
                let class = (offset + slot) % self.n_classes;
                let bucket = &mut buckets[class];
                if cursors[class] == bucket.len() {
                    bucket.shuffle(rng);
                    cursors[class] = 0;
                }
                batch.push(bucket[cursors[class]]);
                cursors[class] += 1;
            }
            batch.shuffle(rng);
            order.extend(batch);
        }
        Ok(order)
    }
}
/// Lazy batches of a single epoch. Never spills into the next epoch.
pub struct EpochBatches {
    order: Vec<Crop>,
    batch_size: usize,
    drop_last: bool,
    cursor: usize,
}
impl Iterator for EpochBatches {
    type Item = Vec<Crop>;
    fn next(&mut self) -> Option<Vec<Crop>> {
        let remaining = self.order.len() - self.cursor;
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }
        let end = self.cursor + remaining.min(self.batch_size);
        let batch = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }
}
