//! Multivariate Gaussian built on the discretized sampler
//!
//! The support box is `mean ± 3·sqrt(max eigenvalue)` on every axis, sampled
//! with [`GRID_RESOLUTION`] points per axis. The closed-form helpers are exact
//! and independent of the grid.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{ArrayD, IxDyn};
use rand::Rng;

use super::Distribution;
use crate::doe::gridsamp;
use crate::error::{MarginError, Result};

pub const GRID_RESOLUTION: usize = 50;

/// Half-width of the support box in units of the largest standard deviation.
const SUPPORT_SIGMAS: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct GaussianDistribution {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    inverse: DMatrix<f64>,
    determinant: f64,
    eigenvalues: DVector<f64>,
    distribution: Distribution,
}

impl GaussianDistribution {
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let dims = mean.len();
        if dims == 0 {
            return Err(MarginError::Configuration(
                "mean vector must not be empty".to_string(),
            ));
        }
        if covariance.shape() != (dims, dims) {
            return Err(MarginError::Configuration(format!(
                "covariance must be {dims}x{dims}, got {}x{}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        let scale = covariance.amax().max(f64::MIN_POSITIVE);
        if (&covariance - covariance.transpose()).amax() > 1e-9 * scale {
            return Err(MarginError::InvalidDistribution(
                "covariance matrix must be symmetric".to_string(),
            ));
        }

        let eigenvalues = SymmetricEigen::new(covariance.clone()).eigenvalues;
        if eigenvalues.iter().any(|&l| !(l > 0.0)) {
            return Err(MarginError::InvalidDistribution(
                "covariance matrix must be positive definite".to_string(),
            ));
        }
        let inverse = covariance.clone().try_inverse().ok_or_else(|| {
            MarginError::InvalidDistribution("covariance matrix is singular".to_string())
        })?;
        let determinant = covariance.determinant();

        let radius = SUPPORT_SIGMAS * eigenvalues.max().sqrt();
        let lower: Vec<f64> = mean.iter().map(|m| m - radius).collect();
        let upper: Vec<f64> = mean.iter().map(|m| m + radius).collect();

        let grid = gridsamp(&lower, &upper, &[GRID_RESOLUTION])?;
        let density = density_at(&grid, &mean, &inverse, normalization(dims, determinant));
        let shape = IxDyn(&vec![GRID_RESOLUTION; dims]);
        let pdf = ArrayD::from_shape_vec(shape, density.as_slice().to_vec())
            .map_err(|e| MarginError::InvalidDistribution(e.to_string()))?;
        let distribution = Distribution::new(pdf, &lower, &upper)?;

        Ok(Self {
            mean,
            covariance,
            inverse,
            determinant,
            eigenvalues,
            distribution,
        })
    }

    pub fn univariate(mean: f64, variance: f64) -> Result<Self> {
        Self::new(
            DVector::from_element(1, mean),
            DMatrix::from_element(1, 1, variance),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.distribution = self.distribution.with_label(label);
        self
    }

    pub fn ndim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn eigenvalues(&self) -> &DVector<f64> {
        &self.eigenvalues
    }

    fn normalization(&self) -> f64 {
        normalization(self.ndim(), self.determinant)
    }

    /// Density at each row of `points` (`n_points x ndim`).
    pub fn compute_density(&self, points: &DMatrix<f64>) -> DVector<f64> {
        density_at(points, &self.mean, &self.inverse, self.normalization())
    }

    /// Density on the hyper-ellipsoid at Mahalanobis radius `r`.
    pub fn compute_density_r(&self, r: f64) -> f64 {
        (-r * r / 2.0).exp() / self.normalization()
    }

    /// Volume of the hyper-ellipsoid `(x-mu)' Sigma^-1 (x-mu) = r^2`.
    pub fn compute_volume(&self, r: f64) -> f64 {
        let d = self.ndim();
        let unit_ball = if d % 2 == 0 {
            PI.powi((d / 2) as i32) / factorial(d / 2)
        } else {
            2f64.powi(d as i32) * PI.powi(((d - 1) / 2) as i32) * factorial((d - 1) / 2)
                / factorial(d)
        };
        unit_ball * self.determinant.sqrt() * r.powi(d as i32)
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn distribution_mut(&mut self) -> &mut Distribution {
        &mut self.distribution
    }

    pub fn sample<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> DMatrix<f64> {
        self.distribution.sample(n, rng)
    }

    pub fn reset(&mut self) {
        self.distribution.reset();
    }

    pub fn into_distribution(self) -> Distribution {
        self.distribution
    }
}

fn normalization(dims: usize, determinant: f64) -> f64 {
    ((2.0 * PI).powi(dims as i32) * determinant).sqrt()
}

fn density_at(
    points: &DMatrix<f64>,
    mean: &DVector<f64>,
    inverse: &DMatrix<f64>,
    norm: f64,
) -> DVector<f64> {
    DVector::from_iterator(
        points.nrows(),
        points.row_iter().map(|row| {
            let diff = row.transpose() - mean;
            let mahalanobis_sq = (diff.transpose() * inverse * &diff)[(0, 0)];
            (-mahalanobis_sq / 2.0).exp() / norm
        }),
    )
}

impl From<GaussianDistribution> for Distribution {
    fn from(gaussian: GaussianDistribution) -> Self {
        gaussian.into_distribution()
    }
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn moments(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn univariate_sampling_matches_parameters() {
        let mut gaussian = GaussianDistribution::univariate(10.0, 25.0).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let batch = gaussian.sample(100_000, &mut rng);
        let (mean, sd) = moments(batch.as_slice());

        assert!((mean - 10.0).abs() / 10.0 < 0.05);
        assert!((sd - 5.0).abs() / 5.0 < 0.10);
    }

    #[test]
    fn bivariate_sampling_recovers_means() {
        let mean = DVector::from_vec(vec![10.0, -4.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let mut gaussian = GaussianDistribution::new(mean, cov).unwrap();
        let mut rng = StdRng::seed_from_u64(77);
        let batch = gaussian.sample(50_000, &mut rng);

        let row0: Vec<f64> = batch.row(0).iter().copied().collect();
        let row1: Vec<f64> = batch.row(1).iter().copied().collect();
        assert!((moments(&row0).0 - 10.0).abs() < 0.1);
        assert!((moments(&row1).0 + 4.0).abs() < 0.1);
    }

    #[test]
    fn support_is_three_sigma_of_largest_axis() {
        let mean = DVector::from_vec(vec![0.0, 0.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[9.0, 0.0, 0.0, 1.0]);
        let gaussian = GaussianDistribution::new(mean, cov).unwrap();
        let dist = gaussian.distribution();
        assert_eq!(dist.shape(), &[GRID_RESOLUTION, GRID_RESOLUTION]);
        assert!((dist.lower()[1] + 9.0).abs() < 1e-12);
        assert!((dist.upper()[0] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn density_at_mean_and_radius() {
        let gaussian = GaussianDistribution::univariate(1.0, 4.0).unwrap();
        let norm = (2.0 * PI * 4.0).sqrt();
        let points = DMatrix::from_column_slice(2, 1, &[1.0, 3.0]);
        let density = gaussian.compute_density(&points);

        assert!((density[0] - 1.0 / norm).abs() < 1e-12);
        assert!((density[1] - (-0.5f64).exp() / norm).abs() < 1e-12);
        assert!((gaussian.compute_density_r(1.0) - density[1]).abs() < 1e-12);
    }

    #[test]
    fn ellipsoid_volume_uses_ball_formula() {
        let one = GaussianDistribution::univariate(0.0, 4.0).unwrap();
        // interval of half-width 2r
        assert!((one.compute_volume(1.5) - 6.0).abs() < 1e-12);

        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 1.0]);
        let two = GaussianDistribution::new(DVector::zeros(2), cov).unwrap();
        assert!((two.compute_volume(1.0) - 2.0 * PI).abs() < 1e-12);

        let three = GaussianDistribution::new(DVector::zeros(3), DMatrix::identity(3, 3)).unwrap();
        assert!((three.compute_volume(2.0) - 4.0 / 3.0 * PI * 8.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_covariance() {
        let mean = DVector::from_vec(vec![0.0, 0.0]);
        let asymmetric = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.1, 1.0]);
        assert!(matches!(
            GaussianDistribution::new(mean.clone(), asymmetric),
            Err(MarginError::InvalidDistribution(_))
        ));

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(
            GaussianDistribution::new(mean.clone(), indefinite),
            Err(MarginError::InvalidDistribution(_))
        ));

        assert!(matches!(
            GaussianDistribution::new(mean, DMatrix::identity(3, 3)),
            Err(MarginError::Configuration(_))
        ));
    }
}
