//! Polynomial response surface mapping margin excess to performance
//!
//! Inputs are standardized column-wise, then a full polynomial basis of
//! degree 1 or 2 (with cross terms) is fitted to every output at once by
//! SVD least squares. Evaluation outside the training range simply
//! extrapolates the polynomial.

use nalgebra::{DMatrix, DVector};

use crate::error::{ensure_len, MarginError, Result};

#[derive(Debug, Clone)]
pub struct PolynomialSurrogate {
    degree: usize,
    mean: DVector<f64>,
    scale: DVector<f64>,
    /// `n_terms x n_outputs`.
    coefficients: DMatrix<f64>,
    residual_rms: f64,
}

/// Number of basis terms for `inputs` variables.
pub fn n_terms(inputs: usize, degree: usize) -> usize {
    match degree {
        1 => 1 + inputs,
        _ => 1 + inputs + inputs * (inputs + 1) / 2,
    }
}

fn basis(z: &[f64], degree: usize, out: &mut Vec<f64>) {
    out.clear();
    out.push(1.0);
    out.extend_from_slice(z);
    if degree == 2 {
        for j in 0..z.len() {
            for k in j..z.len() {
                out.push(z[j] * z[k]);
            }
        }
    }
}

impl PolynomialSurrogate {
    /// `x` is `n_samples x n_inputs`, `y` is `n_samples x n_outputs`.
    pub fn fit(x: &DMatrix<f64>, y: &DMatrix<f64>, degree: usize) -> Result<Self> {
        if !(1..=2).contains(&degree) {
            return Err(MarginError::Configuration(format!(
                "surrogate degree must be 1 or 2, got {degree}"
            )));
        }
        ensure_len("surrogate training rows", x.nrows(), y.nrows())?;
        if x.ncols() == 0 || y.ncols() == 0 {
            return Err(MarginError::Configuration(
                "surrogate needs at least one input and one output".to_string(),
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(MarginError::Configuration(
                "surrogate training data must be finite".to_string(),
            ));
        }

        let n = x.nrows();
        let inputs = x.ncols();
        let terms = n_terms(inputs, degree);
        if n < terms {
            return Err(MarginError::InsufficientData {
                context: format!("degree-{degree} surrogate over {inputs} inputs"),
                needed: terms,
                got: n,
            });
        }

        let mean = DVector::from_iterator(inputs, x.column_iter().map(|c| c.mean()));
        let scale = DVector::from_iterator(
            inputs,
            x.column_iter().map(|c| {
                let sd = c.variance().sqrt();
                if sd > 0.0 {
                    sd
                } else {
                    1.0
                }
            }),
        );

        let mut design = DMatrix::<f64>::zeros(n, terms);
        let mut z = vec![0.0; inputs];
        let mut row = Vec::with_capacity(terms);
        for i in 0..n {
            for j in 0..inputs {
                z[j] = (x[(i, j)] - mean[j]) / scale[j];
            }
            basis(&z, degree, &mut row);
            for (t, value) in row.iter().enumerate() {
                design[(i, t)] = *value;
            }
        }

        let svd = design.clone().svd(true, true);
        let eps = svd.singular_values.max() * 1e-12;
        let coefficients = svd
            .solve(y, eps)
            .map_err(|e| MarginError::Configuration(format!("surrogate fit failed: {e}")))?;

        let residuals = &design * &coefficients - y;
        let residual_rms = (residuals.norm_squared() / residuals.len() as f64).sqrt();

        Ok(Self {
            degree,
            mean,
            scale,
            coefficients,
            residual_rms,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn n_inputs(&self) -> usize {
        self.mean.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Root-mean-square training residual over all outputs.
    pub fn residual_rms(&self) -> f64 {
        self.residual_rms
    }

    pub fn predict(&self, x: &[f64]) -> Result<Vec<f64>> {
        ensure_len("surrogate input", self.n_inputs(), x.len())?;
        let z: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(j, v)| (v - self.mean[j]) / self.scale[j])
            .collect();
        let mut row = Vec::with_capacity(self.coefficients.nrows());
        basis(&z, self.degree, &mut row);
        let phi = DVector::from_vec(row);
        Ok((self.coefficients.transpose() * phi).iter().copied().collect())
    }

    /// Row-wise prediction, `n x n_outputs`.
    pub fn predict_matrix(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let mut out = DMatrix::<f64>::zeros(x.nrows(), self.n_outputs());
        for (i, row) in x.row_iter().enumerate() {
            let input: Vec<f64> = row.iter().copied().collect();
            for (j, value) in self.predict(&input)?.into_iter().enumerate() {
                out[(i, j)] = value;
            }
        }
        Ok(out)
    }
}
