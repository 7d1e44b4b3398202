//! Margin nodes and performance accumulators
//!
//! A [`MarginNode`] pairs a capability ("decided value") with a requirement
//! ("target threshold") and tracks their difference, the excess. Its three
//! histories always have the same length. A [`Performance`] is the same idea
//! over a single stream.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::cdf::{compute_cdf, CdfCurve, CdfSummary, DEFAULT_BINS};
use crate::distribution::Distribution;
use crate::error::{ensure_len, MarginError, Result};
use crate::series::SampleSeries;

/// Which side of the threshold the decided value has to stay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginKind {
    #[default]
    MustExceed,
    MustNotExceed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    MoreIsBetter,
    LessIsBetter,
    #[default]
    Unconstrained,
}

#[derive(Debug, Clone)]
pub struct MarginNode {
    label: String,
    cutoff: f64,
    buffer_limit: f64,
    kind: MarginKind,
    target: SampleSeries,
    decided_value: SampleSeries,
    excess: SampleSeries,
}

impl MarginNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cutoff: 0.9,
            buffer_limit: 0.0,
            kind: MarginKind::MustExceed,
            target: SampleSeries::new(),
            decided_value: SampleSeries::new(),
            excess: SampleSeries::new(),
        }
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_buffer_limit(mut self, buffer_limit: f64) -> Self {
        self.buffer_limit = buffer_limit;
        self
    }

    pub fn with_kind(mut self, kind: MarginKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn buffer_limit(&self) -> f64 {
        self.buffer_limit
    }

    pub fn kind(&self) -> MarginKind {
        self.kind
    }

    /// Record one trial.
    pub fn evaluate(&mut self, decided_value: f64, target: f64) {
        self.decided_value.push(decided_value);
        self.target.push(target);
        self.excess.push(decided_value - target);
    }

    /// Record a batch of trials; both slices must have the same length.
    pub fn evaluate_batch(&mut self, decided_values: &[f64], targets: &[f64]) -> Result<()> {
        ensure_len("margin node batch", decided_values.len(), targets.len())?;
        let excess: Vec<f64> = decided_values
            .iter()
            .zip(targets)
            .map(|(d, t)| d - t)
            .collect();
        self.decided_value.append(decided_values);
        self.target.append(targets);
        self.excess.append(&excess);
        Ok(())
    }

    pub fn target(&self) -> &SampleSeries {
        &self.target
    }

    pub fn decided_value(&self) -> &SampleSeries {
        &self.decided_value
    }

    pub fn excess(&self) -> &SampleSeries {
        &self.excess
    }

    pub fn len(&self) -> usize {
        self.excess.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excess.is_empty()
    }

    pub fn cdf_curve(&self, bins: usize) -> Result<CdfCurve> {
        compute_cdf(self.excess.values(), bins)
    }

    /// Excess limit and reliability using the node's own cutoff and buffer.
    pub fn compute_cdf(&self, bins: usize) -> Result<CdfSummary> {
        self.cdf_curve(bins)?.summarize(self.cutoff, self.buffer_limit)
    }

    pub fn compute_cdf_default(&self) -> Result<CdfSummary> {
        self.compute_cdf(DEFAULT_BINS)
    }

    /// 1-D distribution over `[min, max]` of the excess histogram, for
    /// resampling the observed margin.
    pub fn excess_distribution(&self, bins: usize) -> Result<Distribution> {
        let values = self.excess.values();
        if bins == 0 {
            return Err(MarginError::Configuration(
                "number of histogram bins must be positive".to_string(),
            ));
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !(max > min) {
            return Err(MarginError::InsufficientData {
                context: format!("excess histogram of {}", self.label),
                needed: 2,
                got: values.len().min(1),
            });
        }

        let width = (max - min) / bins as f64;
        let mut counts = Array1::<f64>::zeros(bins);
        for &value in values {
            let bin = (((value - min) / width) as usize).min(bins - 1);
            counts[bin] += 1.0;
        }

        Ok(Distribution::new(counts.into_dyn(), &[min], &[max])?
            .with_label(format!("{} excess", self.label)))
    }

    /// Keep the last `keep_last` trials of all three histories.
    pub fn reset(&mut self, keep_last: usize) {
        self.target.truncate(keep_last);
        self.decided_value.truncate(keep_last);
        self.excess.truncate(keep_last);
    }

    pub(crate) fn rollback(&mut self, len: usize) {
        self.target.rollback(len);
        self.decided_value.rollback(len);
        self.excess.rollback(len);
    }
}

#[derive(Debug, Clone)]
pub struct Performance {
    label: String,
    polarity: Polarity,
    values: SampleSeries,
}

impl Performance {
    pub fn new(label: impl Into<String>, polarity: Polarity) -> Self {
        Self {
            label: label.into(),
            polarity,
            values: SampleSeries::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn record(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn record_batch(&mut self, values: &[f64]) {
        self.values.append(values);
    }

    pub fn values(&self) -> &SampleSeries {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reset(&mut self, keep_last: usize) {
        self.values.truncate(keep_last);
    }

    pub(crate) fn rollback(&mut self, len: usize) {
        self.values.rollback(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution as _, Normal};

    #[test]
    fn scalar_evaluation_records_excess() {
        let mut node = MarginNode::new("E1");
        node.evaluate(5.8, 4.0);
        assert_eq!(node.len(), 1);
        assert!((node.excess().values()[0] - 1.8).abs() < 1e-12);
        assert_eq!(node.target().values(), &[4.0]);
        assert_eq!(node.decided_value().values(), &[5.8]);
    }

    #[test]
    fn batch_requires_equal_lengths() {
        let mut node = MarginNode::new("E1");
        assert!(matches!(
            node.evaluate_batch(&[1.0, 2.0], &[1.0]),
            Err(MarginError::LengthMismatch { .. })
        ));
        assert!(node.is_empty());

        node.evaluate_batch(&[3.0, 2.0], &[1.0, 1.0]).unwrap();
        assert_eq!(node.excess().values(), &[2.0, 1.0]);
    }

    #[test]
    fn stochastic_excess_combines_gaussians() {
        let decided = Normal::new(4.6, 0.3).unwrap();
        let target = Normal::new(4.0, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(31);
        let mut node = MarginNode::new("E1");
        for _ in 0..10_000 {
            let d = decided.sample(&mut rng);
            let t = target.sample(&mut rng);
            node.evaluate(d, t);
        }

        let mean = node.excess().mean().unwrap();
        let variance = node.excess().variance().unwrap();
        assert!((mean - 0.6).abs() / 0.6 < 0.1);
        assert!((variance - 0.18).abs() / 0.18 < 0.1);
    }

    #[test]
    fn node_cdf_uses_own_thresholds() {
        let normal = Normal::new(0.6, 0.18f64.sqrt()).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let mut node = MarginNode::new("E1").with_cutoff(0.9).with_buffer_limit(0.0);
        for _ in 0..50_000 {
            node.evaluate(normal.sample(&mut rng), 0.0);
        }
        let summary = node.compute_cdf_default().unwrap();
        assert!((summary.reliability - 0.9214).abs() / 0.9214 < 0.1);
        assert!((summary.excess_limit - 1.1437).abs() / 1.1437 < 0.1);
    }

    #[test]
    fn cdf_needs_enough_samples() {
        let mut node = MarginNode::new("E1");
        node.evaluate(1.0, 0.0);
        assert!(matches!(
            node.compute_cdf(500),
            Err(MarginError::InsufficientData { .. })
        ));
    }

    #[test]
    fn reset_keeps_histories_aligned() {
        let mut node = MarginNode::new("E1");
        for i in 0..5 {
            node.evaluate(i as f64, 0.5);
        }
        node.reset(2);
        assert_eq!(node.decided_value().values(), &[3.0, 4.0]);
        assert_eq!(node.target().len(), 2);
        assert_eq!(node.excess().values(), &[2.5, 3.5]);

        node.reset(0);
        assert!(node.is_empty());
        assert!(node.target().is_empty());
    }

    #[test]
    fn excess_distribution_spans_observed_range() {
        let mut node = MarginNode::new("E1");
        node.evaluate_batch(&[1.0, 2.0, 3.0, 4.0], &[0.0; 4]).unwrap();
        let dist = node.excess_distribution(4).unwrap();
        assert_eq!(dist.lower(), &[1.0]);
        assert_eq!(dist.upper(), &[4.0]);
        assert_eq!(dist.total_mass(), 4.0);
    }

    #[test]
    fn performance_accumulates_and_resets() {
        let mut perf = Performance::new("weight", Polarity::LessIsBetter);
        perf.record(1.0);
        perf.record_batch(&[2.0, 3.0]);
        assert_eq!(perf.len(), 3);
        perf.reset(1);
        assert_eq!(perf.values().values(), &[3.0]);
        assert_eq!(perf.polarity(), Polarity::LessIsBetter);
    }
}
