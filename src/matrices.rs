//! Trial-indexed sensitivity matrices
//!
//! Both matrices are grids of [`SampleSeries`] indexed `[node][other][trial]`;
//! every computation appends one full slice so all cells share a trial count.

use nalgebra::{DMatrix, DVector};

use crate::error::{ensure_len, Result};
use crate::series::SampleSeries;

#[derive(Debug, Clone, PartialEq)]
pub struct TrialMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<SampleSeries>,
}

impl TrialMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![SampleSeries::new(); rows * cols],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn n_trials(&self) -> usize {
        self.cells.first().map_or(0, SampleSeries::len)
    }

    pub fn push_slice(&mut self, slice: &DMatrix<f64>) -> Result<()> {
        ensure_len("matrix slice rows", self.rows, slice.nrows())?;
        ensure_len("matrix slice columns", self.cols, slice.ncols())?;
        for i in 0..self.rows {
            for j in 0..self.cols {
                self.cells[i * self.cols + j].push(slice[(i, j)]);
            }
        }
        Ok(())
    }

    pub fn cell(&self, row: usize, col: usize) -> &[f64] {
        self.cells[row * self.cols + col].values()
    }

    pub fn slice(&self, trial: usize) -> Option<DMatrix<f64>> {
        (trial < self.n_trials())
            .then(|| DMatrix::from_fn(self.rows, self.cols, |i, j| self.cell(i, j)[trial]))
    }

    pub fn last_slice(&self) -> Option<DMatrix<f64>> {
        self.n_trials().checked_sub(1).and_then(|t| self.slice(t))
    }

    /// Per-cell mean over finite trials; NaN where a cell has none.
    pub fn mean(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows, self.cols, |i, j| {
            self.cells[i * self.cols + j]
                .finite_mean()
                .unwrap_or(f64::NAN)
        })
    }

    pub fn truncate(&mut self, keep_last: usize) {
        for cell in &mut self.cells {
            cell.truncate(keep_last);
        }
    }
}

/// `(n_nodes x n_performances)` slices. Non-finite cells, where the surrogate
/// predicts zero performance at the limit, are masked as undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactMatrix {
    values: TrialMatrix,
    undefined: Vec<Vec<bool>>,
}

impl ImpactMatrix {
    pub fn new(n_nodes: usize, n_performances: usize) -> Self {
        Self {
            values: TrialMatrix::new(n_nodes, n_performances),
            undefined: Vec::new(),
        }
    }

    pub fn push_slice(&mut self, slice: &DMatrix<f64>) -> Result<()> {
        self.values.push_slice(slice)?;
        // row-major, matching the absorption failure mask
        let mask = slice.transpose().iter().map(|v| !v.is_finite()).collect();
        self.undefined.push(mask);
        Ok(())
    }

    /// Whether the `(node, performance)` cell of `trial` had no finite value.
    pub fn undefined(&self, trial: usize, node: usize, performance: usize) -> bool {
        let cols = self.values.shape().1;
        self.undefined
            .get(trial)
            .and_then(|mask| mask.get(node * cols + performance))
            .copied()
            .unwrap_or(false)
    }

    pub fn undefined_count(&self) -> usize {
        self.undefined.iter().flatten().filter(|u| **u).count()
    }

    pub fn values(&self) -> &TrialMatrix {
        &self.values
    }

    pub fn cell(&self, node: usize, performance: usize) -> &[f64] {
        self.values.cell(node, performance)
    }

    pub fn slice(&self, trial: usize) -> Option<DMatrix<f64>> {
        self.values.slice(trial)
    }

    /// Mean over defined trials only; see [`ImpactMatrix::undefined`].
    pub fn mean(&self) -> DMatrix<f64> {
        self.values.mean()
    }

    pub fn n_trials(&self) -> usize {
        self.undefined.len()
    }

    pub fn truncate(&mut self, keep_last: usize) {
        self.values.truncate(keep_last);
        if keep_last < self.undefined.len() {
            self.undefined.drain(..self.undefined.len() - keep_last);
        }
    }
}

/// `(n_nodes x n_specs)` slices, a failure mask per trial, and the
/// per-spec deterioration at which the first node is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorptionMatrix {
    values: TrialMatrix,
    deteriorations: TrialMatrix,
    failures: Vec<Vec<bool>>,
    deterioration_vector: Vec<SampleSeries>,
}

impl AbsorptionMatrix {
    pub fn new(n_nodes: usize, n_specs: usize) -> Self {
        Self {
            values: TrialMatrix::new(n_nodes, n_specs),
            deteriorations: TrialMatrix::new(n_nodes, n_specs),
            failures: Vec::new(),
            deterioration_vector: vec![SampleSeries::new(); n_specs],
        }
    }

    /// Append one trial. `failed` is row-major `n_nodes x n_specs`.
    pub fn push_trial(
        &mut self,
        absorption: &DMatrix<f64>,
        deterioration: &DMatrix<f64>,
        failed: Vec<bool>,
        deterioration_vector: &DVector<f64>,
    ) -> Result<()> {
        let (rows, cols) = self.values.shape();
        ensure_len("absorption failure mask", rows * cols, failed.len())?;
        ensure_len(
            "deterioration vector",
            self.deterioration_vector.len(),
            deterioration_vector.len(),
        )?;
        self.values.push_slice(absorption)?;
        self.deteriorations.push_slice(deterioration)?;
        self.failures.push(failed);
        for (series, value) in self
            .deterioration_vector
            .iter_mut()
            .zip(deterioration_vector.iter())
        {
            series.push(*value);
        }
        Ok(())
    }

    pub fn values(&self) -> &TrialMatrix {
        &self.values
    }

    pub fn deteriorations(&self) -> &TrialMatrix {
        &self.deteriorations
    }

    pub fn cell(&self, node: usize, spec: usize) -> &[f64] {
        self.values.cell(node, spec)
    }

    pub fn slice(&self, trial: usize) -> Option<DMatrix<f64>> {
        self.values.slice(trial)
    }

    pub fn mean(&self) -> DMatrix<f64> {
        self.values.mean()
    }

    pub fn n_trials(&self) -> usize {
        self.failures.len()
    }

    /// Whether the root solve for `(node, spec)` failed in `trial`.
    pub fn failed(&self, trial: usize, node: usize, spec: usize) -> bool {
        let cols = self.values.shape().1;
        self.failures
            .get(trial)
            .and_then(|mask| mask.get(node * cols + spec))
            .copied()
            .unwrap_or(false)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.iter().flatten().filter(|f| **f).count()
    }

    pub fn deterioration_vector(&self, spec: usize) -> &[f64] {
        self.deterioration_vector[spec].values()
    }

    pub fn mean_deterioration_vector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.deterioration_vector.len(),
            self.deterioration_vector
                .iter()
                .map(|s| s.finite_mean().unwrap_or(f64::NAN)),
        )
    }

    pub fn truncate(&mut self, keep_last: usize) {
        self.values.truncate(keep_last);
        self.deteriorations.truncate(keep_last);
        if keep_last < self.failures.len() {
            self.failures.drain(..self.failures.len() - keep_last);
        }
        for series in &mut self.deterioration_vector {
            series.truncate(keep_last);
        }
    }
}
