//! Discretized N-dimensional probability distributions
//!
//! A [`Distribution`] holds a non-negative density sampled on a `(k,)^d` grid
//! over a cubical support box and draws samples by inverse-CDF lookup. The
//! flattened density is sorted ascending before the cumulative sum is built,
//! which keeps high-contrast densities from losing their small bins to
//! cancellation; the permutation is undone when mapping draws back to the grid.

use nalgebra::DMatrix;
use ndarray::ArrayD;
use rand::Rng;

use crate::error::{MarginError, Result};
use crate::series::SampleSeries;

pub mod gaussian;
pub mod uniform;

pub use gaussian::GaussianDistribution;
pub use uniform::UniformDistribution;

/// Relative tolerance used when checking that every axis has the same width.
const WIDTH_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionOptions {
    /// Sort the density before building the cumulative sum.
    pub sort: bool,
    /// Treat the grid as a piecewise-constant continuous density.
    pub interpolation: bool,
}

impl Default for DistributionOptions {
    fn default() -> Self {
        Self {
            sort: true,
            interpolation: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Distribution {
    label: String,
    shape: Vec<usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    options: DistributionOptions,
    sort_index: Option<Vec<usize>>,
    cdf: Vec<f64>,
    history: Vec<SampleSeries>,
}

impl Distribution {
    pub fn new(density: ArrayD<f64>, lower: &[f64], upper: &[f64]) -> Result<Self> {
        Self::with_options(density, lower, upper, DistributionOptions::default())
    }

    /// Same bounds on every axis.
    pub fn with_scalar_bounds(density: ArrayD<f64>, lower: f64, upper: f64) -> Result<Self> {
        let dims = density.ndim();
        Self::new(density, &vec![lower; dims], &vec![upper; dims])
    }

    pub fn with_options(
        density: ArrayD<f64>,
        lower: &[f64],
        upper: &[f64],
        options: DistributionOptions,
    ) -> Result<Self> {
        let dims = density.ndim();
        if dims == 0 || density.is_empty() {
            return Err(MarginError::InvalidDistribution(
                "density must have at least one axis and one grid point".to_string(),
            ));
        }
        if lower.len() != dims || upper.len() != dims {
            return Err(MarginError::Configuration(format!(
                "density has {dims} axes but bounds have {} and {} entries",
                lower.len(),
                upper.len()
            )));
        }
        if density.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(MarginError::InvalidDistribution(
                "density values must be finite and non-negative".to_string(),
            ));
        }
        if (0..dims).any(|axis| !(upper[axis] > lower[axis])) {
            return Err(MarginError::InvalidDistribution(
                "upper support bound must exceed the lower bound on every axis".to_string(),
            ));
        }
        let width = upper[0] - lower[0];
        if (0..dims).any(|axis| {
            ((upper[axis] - lower[axis]) - width).abs() > WIDTH_TOLERANCE * width.abs().max(1.0)
        }) {
            return Err(MarginError::InvalidDistribution(
                "support box must have the same width on every axis".to_string(),
            ));
        }

        let shape = density.shape().to_vec();
        let flat: Vec<f64> = density.iter().copied().collect();

        let (sort_index, ordered) = if options.sort {
            let mut index: Vec<usize> = (0..flat.len()).collect();
            index.sort_by(|&a, &b| flat[a].total_cmp(&flat[b]));
            let ordered = index.iter().map(|&i| flat[i]).collect();
            (Some(index), ordered)
        } else {
            (None, flat)
        };

        let cdf: Vec<f64> = ordered
            .iter()
            .scan(0.0, |acc, &p| {
                *acc += p;
                Some(*acc)
            })
            .collect();

        if cdf.last().copied().unwrap_or(0.0) <= 0.0 {
            return Err(MarginError::InvalidDistribution(
                "density has zero total mass".to_string(),
            ));
        }

        Ok(Self {
            label: String::new(),
            shape,
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            options,
            sort_index,
            cdf,
            history: vec![SampleSeries::new(); dims],
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn options(&self) -> DistributionOptions {
        self.options
    }

    /// Sum of all density values; the density is implicitly normalized by it.
    pub fn total_mass(&self) -> f64 {
        self.cdf.last().copied().unwrap_or(0.0)
    }

    /// Draw `n` samples, returned as a `ndim x n` matrix and appended to the
    /// sample history.
    pub fn sample<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> DMatrix<f64> {
        let dims = self.ndim();
        let total = self.total_mass();
        let last = self.cdf.len() - 1;
        let mut batch = DMatrix::<f64>::zeros(dims, n);
        let mut coords = vec![0usize; dims];

        for col in 0..n {
            let choice = rng.gen::<f64>() * total;
            let mut index = self.cdf.partition_point(|&c| c <= choice).min(last);
            if let Some(sort_index) = &self.sort_index {
                index = sort_index[index];
            }

            for axis in (0..dims).rev() {
                coords[axis] = index % self.shape[axis];
                index /= self.shape[axis];
            }

            for axis in 0..dims {
                let mut grid = coords[axis] as f64;
                if self.options.interpolation {
                    grid += rng.gen::<f64>();
                }
                batch[(axis, col)] = self.transform(axis, grid);
            }
        }

        for (axis, series) in self.history.iter_mut().enumerate() {
            let row: Vec<f64> = batch.row(axis).iter().copied().collect();
            series.append(&row);
        }

        batch
    }

    /// Map a (fractional) grid index on `axis` to physical space.
    fn transform(&self, axis: usize, grid: f64) -> f64 {
        let resolution = self.shape[axis] as f64;
        self.lower[axis] + grid * (self.upper[axis] - self.lower[axis]) / resolution
    }

    /// All drawn samples so far, `ndim x total`.
    pub fn samples(&self) -> DMatrix<f64> {
        let dims = self.ndim();
        let n = self.history.first().map_or(0, SampleSeries::len);
        DMatrix::from_fn(dims, n, |axis, col| self.history[axis].values()[col])
    }

    pub fn axis_samples(&self, axis: usize) -> Option<&SampleSeries> {
        self.history.get(axis)
    }

    pub fn n_samples(&self) -> usize {
        self.history.first().map_or(0, SampleSeries::len)
    }

    /// Clear the sample history; the density is untouched.
    pub fn reset(&mut self) {
        for series in &mut self.history {
            series.truncate(0);
        }
    }

    pub(crate) fn rollback(&mut self, len: usize) {
        for series in &mut self.history {
            series.rollback(len);
        }
    }
}
