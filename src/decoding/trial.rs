use std::collections::HashMap;
use std::fmt;
use ndarray::{s, Array2, ArrayView2};
use crate::decoding::source::{TrialRecord, TrialSource};
use crate::decoding::DecodeError;
/// Stable identifier used to group crops and predictions back to their trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrialId(pub u32);
impl From<u32> for TrialId {
    fn from(value: u32) -> Self {
        TrialId(value)
    }
}
impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
/// One continuous labelled recording, immutable once it is part of a set.
#[derive(Clone, Debug)]
pub struct Trial {
    id: TrialId,
    signal: Array2<f32>, // channels x samples
    label: usize,
}
impl Trial {
    pub fn id(&self) -> TrialId {
        self.id
    }
    pub fn label(&self) -> usize {
        self.label
    }
    pub fn signal(&self) -> ArrayView2<'_, f32> {
        self.signal.view()
    }
    pub fn num_channels(&self) -> usize {
        self.signal.nrows()
    }
    pub fn num_samples(&self) -> usize {
        self.signal.ncols()
    }
    /// Borrow `len` samples of every channel starting at `start`.
    ///
    /// Callers are expected to have validated the window against
    /// [`Trial::num_samples`]; crops produced by the indexer always are.
    pub fn window(&self, start: usize, len: usize) -> ArrayView2<'_, f32> {
        self.signal.slice(s![.., start..start + len])
    }
}
/// Ordered, validated collection of trials sharing one channel layout.
#[derive(Clone, Debug)]
pub struct TrialSet {
    trials: Vec<Trial>,
    n_channels: usize,
    n_classes: usize,
    index_by_id: HashMap<TrialId, usize>,
}
impl TrialSet {
    /// Validates and takes ownership of the records.
    ///
    /// Every record must have at least one sample, the same channel count as
    /// the first record, a label below `n_classes` and a unique id.
    pub fn new(
        n_classes: usize,
        records: impl IntoIterator<Item = TrialRecord>,
    ) -> Result<Self, DecodeError> {
        if n_classes == 0 {
            return Err(DecodeError::InvalidConfig(
                "a trial set needs at least one class".into(),
            ));
        }
        let mut trials = Vec::new();
        let mut index_by_id = HashMap::new();
        let mut n_channels = None;
        for record in records {
            if record.num_samples() == 0 {
                return Err(DecodeError::EmptyTrial(record.id));
            }
            let expected = *n_channels.get_or_insert(record.num_channels());
            if record.num_channels() != expected {
                return Err(DecodeError::ChannelMismatch {
                    trial_id: record.id,
                    expected,
                    actual: record.num_channels(),
                });
            }
            if record.label >= n_classes {
                return Err(DecodeError::LabelOutOfRange {
                    trial_id: record.id,
                    label: record.label,
                    n_classes,
                });
            }
            if index_by_id.insert(record.id, trials.len()).is_some() {
                return Err(DecodeError::DuplicateTrialId(record.id));
            }
            trials.push(Trial {
                id: record.id,
                signal: record.signal,
                label: record.label,
            });
        }
        Ok(Self {
            trials,
            n_channels: n_channels.unwrap_or(0),
            n_classes,
            index_by_id,
        })
    }
    /// Drains a loader into a validated set.
    pub fn from_source<S: TrialSource>(n_classes: usize, source: &mut S) -> Result<Self, DecodeError> {
        let mut records = Vec::new();
        while let Some(record) = source.next_record()? {
            records.push(record);
        }
        Self::new(n_classes, records)
    }
    pub fn len(&self) -> usize {
        self.trials.len()
    }
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
    pub fn get(&self, index: usize) -> Option<&Trial> {
        self.trials.get(index)
    }
    pub fn index_of(&self, id: TrialId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }
    pub fn by_id(&self, id: TrialId) -> Option<&Trial> {
        self.index_of(id).map(|i| &self.trials[i])
    }
    pub fn iter(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter()
    }
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for trial in &self.trials {
            counts[trial.label] += 1;
        }
        counts
    }
    /// Splits off the first `round(len * first_fraction)` trials, keeping order.
    pub fn split_fraction(&self, first_fraction: f64) -> Result<(TrialSet, TrialSet), DecodeError> {
        if !(0.0..=1.0).contains(&first_fraction) {
            return Err(DecodeError::InvalidConfig(format!(
                "split fraction {first_fraction} is outside [0, 1]"
            )));
        }
        let n_first = (self.trials.len() as f64 * first_fraction).round() as usize;
        let first = TrialSet::new(self.n_classes, self.records(0..n_first))?;
        let second = TrialSet::new(self.n_classes, self.records(n_first..self.trials.len()))?;
        Ok((first, second))
    }
    /// Appends `other` after `self`. Ids must stay unique across both sets.
    pub fn concat(&self, other: &TrialSet) -> Result<TrialSet, DecodeError> {
        if self.n_classes != other.n_classes {
            return Err(DecodeError::InvalidConfig(format!(
                "cannot concatenate sets with {} and {} classes",
                self.n_classes, other.n_classes
            )));
        }
        let records = self
            .records(0..self.len())
            .chain(other.records(0..other.len()));
        TrialSet::new(self.n_classes, records)
    }
    fn records(&self, range: std::ops::Range<usize>) -> impl Iterator<Item = TrialRecord> + '_ {
        self.trials[range].iter().map(|t| TrialRecord {
            id: t.id,
            signal: t.signal.clone(),
            label: t.label,
        })
    }
}
