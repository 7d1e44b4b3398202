//! Empirical CDF of a sample vector
//!
//! A histogram with `bins` equal-width bins over `[min, max]` is accumulated
//! into a CDF evaluated at the bin centres. From the curve two figures of
//! merit are read off: the value at which the CDF first reaches `cutoff`, and
//! the probability of staying at or above `buffer_limit`.

use serde::Serialize;

use crate::error::{MarginError, Result};

pub const DEFAULT_BINS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdfCurve {
    pub centres: Vec<f64>,
    pub cdf: Vec<f64>,
    first_edge: f64,
    last_edge: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CdfSummary {
    pub cutoff: f64,
    pub buffer_limit: f64,
    /// Value at which the CDF first reaches `cutoff`.
    pub excess_limit: f64,
    /// Probability of a sample lying at or above `buffer_limit`.
    pub reliability: f64,
}

pub fn compute_cdf(values: &[f64], bins: usize) -> Result<CdfCurve> {
    if bins == 0 {
        return Err(MarginError::Configuration(
            "number of cdf bins must be positive".to_string(),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MarginError::Configuration(
            "cdf samples must be finite".to_string(),
        ));
    }

    let mut distinct = values.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < bins.max(2) {
        return Err(MarginError::InsufficientData {
            context: "cdf histogram".to_string(),
            needed: bins.max(2),
            got: distinct.len(),
        });
    }

    let min = distinct[0];
    let max = distinct[distinct.len() - 1];
    let width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &value in values {
        let bin = (((value - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    let total = values.len() as f64;
    let mut running = 0usize;
    let cdf = counts
        .iter()
        .map(|&count| {
            running += count;
            running as f64 / total
        })
        .collect();
    let centres = (0..bins)
        .map(|bin| min + (bin as f64 + 0.5) * width)
        .collect();

    Ok(CdfCurve {
        centres,
        cdf,
        first_edge: min,
        last_edge: max,
    })
}

/// Curve plus, when both thresholds are given, its summary. Passing only one
/// threshold is rejected.
pub fn compute_cdf_with_limits(
    values: &[f64],
    bins: usize,
    cutoff: Option<f64>,
    buffer_limit: Option<f64>,
) -> Result<(CdfCurve, Option<CdfSummary>)> {
    match (cutoff, buffer_limit) {
        (Some(cutoff), Some(buffer_limit)) => {
            let curve = compute_cdf(values, bins)?;
            let summary = curve.summarize(cutoff, buffer_limit)?;
            Ok((curve, Some(summary)))
        }
        (None, None) => Ok((compute_cdf(values, bins)?, None)),
        _ => Err(MarginError::Configuration(
            "cutoff and buffer_limit must be given together".to_string(),
        )),
    }
}

impl CdfCurve {
    pub fn len(&self) -> usize {
        self.centres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centres.is_empty()
    }

    pub fn summarize(&self, cutoff: f64, buffer_limit: f64) -> Result<CdfSummary> {
        if !(cutoff > 0.0 && cutoff < 1.0) {
            return Err(MarginError::Configuration(format!(
                "cutoff must lie in (0, 1), got {cutoff}"
            )));
        }
        if !(buffer_limit >= self.first_edge && buffer_limit <= self.last_edge) {
            return Err(MarginError::InsufficientData {
                context: format!(
                    "buffer limit {buffer_limit} outside observed range [{}, {}]",
                    self.first_edge, self.last_edge
                ),
                needed: 1,
                got: 0,
            });
        }

        let excess_limit = self
            .cdf
            .iter()
            .position(|&p| p >= cutoff)
            .map(|i| self.centres[i]);
        let buffer_cdf = self
            .centres
            .iter()
            .position(|&c| c >= buffer_limit)
            .map(|i| self.cdf[i]);

        match (excess_limit, buffer_cdf) {
            (Some(excess_limit), Some(buffer_cdf)) => Ok(CdfSummary {
                cutoff,
                buffer_limit,
                excess_limit,
                reliability: 1.0 - buffer_cdf,
            }),
            // buffer limit in the upper half of the last bin
            (Some(excess_limit), None) => Ok(CdfSummary {
                cutoff,
                buffer_limit,
                excess_limit,
                reliability: 0.0,
            }),
            (None, _) => Err(MarginError::InsufficientData {
                context: format!("cdf never reaches cutoff {cutoff}"),
                needed: 1,
                got: 0,
            }),
        }
    }
}
