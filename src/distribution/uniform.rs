//! Box-uniform distribution over `centre ± range`.

use nalgebra::DMatrix;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;

use super::{Distribution, DistributionOptions};
use crate::error::{ensure_len, MarginError, Result};

pub const GRID_RESOLUTION: usize = 50;

/// Upper bound on the per-axis resolution tried when aligning cell edges.
const MAX_RESOLUTION: usize = 4 * GRID_RESOLUTION;

const EDGE_TOLERANCE: f64 = 1e-9;

/// Smallest resolution from `GRID_RESOLUTION` up whose cell edges fall on
/// every axis' `centre ± range`. Without one, partial cells carry their
/// overlap fraction and draws may stray up to one cell past the range.
fn aligned_resolution(half_width: f64, ranges: &[f64]) -> usize {
    (GRID_RESOLUTION..=MAX_RESOLUTION)
        .find(|&k| {
            ranges.iter().all(|r| {
                let offset = (half_width - r) * k as f64 / (2.0 * half_width);
                (offset - offset.round()).abs() < EDGE_TOLERANCE * k as f64
            })
        })
        .unwrap_or(GRID_RESOLUTION)
}

#[derive(Debug, Clone)]
pub struct UniformDistribution {
    centres: Vec<f64>,
    ranges: Vec<f64>,
    distribution: Distribution,
}

impl UniformDistribution {
    /// `ranges` are half-widths. The support is padded to the widest axis so
    /// the box stays cubical; each cell is weighted by its overlap with the
    /// axis' own range.
    pub fn new(centres: &[f64], ranges: &[f64]) -> Result<Self> {
        let dims = centres.len();
        if dims == 0 {
            return Err(MarginError::Configuration(
                "uniform distribution needs at least one axis".to_string(),
            ));
        }
        ensure_len("uniform ranges", dims, ranges.len())?;
        if ranges.iter().any(|r| !(*r > 0.0) || !r.is_finite()) {
            return Err(MarginError::InvalidDistribution(
                "uniform ranges must be positive and finite".to_string(),
            ));
        }

        let half_width = ranges.iter().copied().fold(0.0, f64::max);
        let lower: Vec<f64> = centres.iter().map(|c| c - half_width).collect();
        let upper: Vec<f64> = centres.iter().map(|c| c + half_width).collect();

        let resolution = aligned_resolution(half_width, ranges);
        let cell = 2.0 * half_width / resolution as f64;
        let density = ArrayD::from_shape_fn(IxDyn(&vec![resolution; dims]), |index| {
            (0..dims)
                .map(|axis| {
                    let left = lower[axis] + index[axis] as f64 * cell;
                    let lo = centres[axis] - ranges[axis];
                    let hi = centres[axis] + ranges[axis];
                    let overlap = ((left + cell).min(hi) - left.max(lo)).max(0.0) / cell;
                    // snap rounding noise on aligned edges
                    if overlap < EDGE_TOLERANCE {
                        0.0
                    } else if overlap > 1.0 - EDGE_TOLERANCE {
                        1.0
                    } else {
                        overlap
                    }
                })
                .product::<f64>()
        });

        let distribution =
            Distribution::with_options(density, &lower, &upper, DistributionOptions::default())?;

        Ok(Self {
            centres: centres.to_vec(),
            ranges: ranges.to_vec(),
            distribution,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.distribution = self.distribution.with_label(label);
        self
    }

    pub fn centres(&self) -> &[f64] {
        &self.centres
    }

    pub fn ranges(&self) -> &[f64] {
        &self.ranges
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn sample<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> DMatrix<f64> {
        self.distribution.sample(n, rng)
    }

    pub fn into_distribution(self) -> Distribution {
        self.distribution
    }
}

impl From<UniformDistribution> for Distribution {
    fn from(uniform: UniformDistribution) -> Self {
        uniform.into_distribution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn samples_stay_inside_each_axis_range() {
        let mut uniform = UniformDistribution::new(&[1.0, 10.0], &[0.5, 2.0]).unwrap();
        // cell edges at multiples of 0.5 need a multiple of eight cells
        assert_eq!(uniform.distribution().shape(), &[56, 56]);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let batch = uniform.sample(20_000, &mut rng);
        let first: Vec<f64> = batch.row(0).iter().copied().collect();
        let second: Vec<f64> = batch.row(1).iter().copied().collect();
        let tol = 1e-9;
        assert!(first.iter().all(|x| (0.5 - tol..=1.5 + tol).contains(x)));
        assert!(second.iter().all(|x| (8.0 - tol..=12.0 + tol).contains(x)));

        let mean0 = first.iter().sum::<f64>() / first.len() as f64;
        let mean1 = second.iter().sum::<f64>() / second.len() as f64;
        assert!((mean0 - 1.0).abs() < 0.02);
        assert!((mean1 - 10.0).abs() < 0.05);
        let below_centre = first.iter().filter(|&&x| x < 1.0).count() as f64 / 20_000.0;
        assert!((below_centre - 0.5).abs() < 0.02);
    }

    #[test]
    fn unaligned_ranges_weight_partial_cells() {
        let uniform = UniformDistribution::new(&[0.0, 0.0], &[1.0, 2f64.sqrt()]).unwrap();
        let distribution = uniform.distribution();
        assert_eq!(distribution.shape(), &[GRID_RESOLUTION, GRID_RESOLUTION]);
        // full mass equals the area of the declared box in cell units
        let cell = 2.0 * 2f64.sqrt() / GRID_RESOLUTION as f64;
        let expected = (2.0 / cell) * (2.0 * 2f64.sqrt() / cell);
        assert!((distribution.total_mass() - expected).abs() < 1e-6);
    }

    #[test]
    fn support_is_padded_to_widest_range() {
        let uniform = UniformDistribution::new(&[0.0, 0.0], &[1.0, 3.0]).unwrap();
        assert_eq!(uniform.distribution().lower(), &[-3.0, -3.0]);
        assert_eq!(uniform.distribution().upper(), &[3.0, 3.0]);
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(UniformDistribution::new(&[0.0], &[0.0]).is_err());
        assert!(matches!(
            UniformDistribution::new(&[0.0, 1.0], &[1.0]),
            Err(MarginError::LengthMismatch { .. })
        ));
    }
}
