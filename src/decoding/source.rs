use std::collections::VecDeque;
use ndarray::Array2;
use crate::decoding::{DecodeError, TrialId};
/// One labelled recording segment as handed over by a loader.
#[derive(Clone, Debug)]
pub struct TrialRecord {
    pub id: TrialId,
    pub signal: Array2<f32>, // channels x samples
    pub label: usize,
}
impl TrialRecord {
    pub fn new(id: u32, signal: Array2<f32>, label: usize) -> Self {
        Self {
            id: TrialId(id),
            signal,
            label,
        }
    }
    pub fn num_channels(&self) -> usize {
        self.signal.nrows()
    }
    pub fn num_samples(&self) -> usize {
        self.signal.ncols()
    }
}
/// Anything that can yield trial records in a stable order.
pub trait TrialSource {
    fn next_record(&mut self) -> Result<Option<TrialRecord>, DecodeError>;
}
/// In-memory source useful for tests and deterministic replay.
pub struct ManualSource {
    queue: VecDeque<TrialRecord>,
}
impl ManualSource {
    pub fn new(records: impl IntoIterator<Item = TrialRecord>) -> Self {
        Self {
            queue: records.into_iter().collect(),
        }
    }
}
impl TrialSource for ManualSource {
    fn next_record(&mut self) -> Result<Option<TrialRecord>, DecodeError> {
        Ok(self.queue.pop_front())
    }
}
