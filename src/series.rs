//! Append-only sample accumulator
//!
//! Every history in the crate (margin excess, performances, matrix cells,
//! distribution draws) grows and shrinks only through this type.

use serde::Serialize;

/// Ordered, append-only sequence of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleSeries {
    values: Vec<f64>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Append a batch in order.
    pub fn append(&mut self, batch: &[f64]) {
        self.values.extend_from_slice(batch);
    }

    /// Keep only the last `keep_last` samples; `0` empties the series.
    pub fn truncate(&mut self, keep_last: usize) {
        let len = self.values.len();
        if keep_last < len {
            self.values.drain(..len - keep_last);
        }
    }

    /// Drop everything recorded after the first `len` samples.
    pub(crate) fn rollback(&mut self, len: usize) {
        self.values.truncate(len);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Population variance (denominator `n`), Welford update.
    pub fn variance(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }

        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (idx, &x) in self.values.iter().enumerate() {
            let delta = x - mean;
            mean += delta / (idx + 1) as f64;
            m2 += delta * (x - mean);
        }
        Some(m2 / self.values.len() as f64)
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Mean over finite samples only (NaN-flagged cells are skipped).
    pub fn finite_mean(&self) -> Option<f64> {
        let (sum, count) = self
            .values
            .iter()
            .filter(|x| x.is_finite())
            .fold((0.0, 0usize), |(s, c), &x| (s + x, c + 1));
        (count > 0).then(|| sum / count as f64)
    }
}

impl From<Vec<f64>> for SampleSeries {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}
