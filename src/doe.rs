//! Design of experiments
//!
//! Full-factorial grids and Latin hypercube designs over a bounded box. A
//! design is stored scaled to the unit box; `unscaled()` maps it back to the
//! physical bounds.

use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{MarginError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoeMethod {
    Grid,
    LatinHypercube,
}

/// Number of samples: one count for every axis, or one per axis (grid only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleCount {
    Uniform(usize),
    PerAxis(Vec<usize>),
}

impl From<usize> for SampleCount {
    fn from(count: usize) -> Self {
        SampleCount::Uniform(count)
    }
}

impl From<Vec<usize>> for SampleCount {
    fn from(counts: Vec<usize>) -> Self {
        SampleCount::PerAxis(counts)
    }
}

/// Experimental design: bounds plus a sample matrix (rows = samples).
#[derive(Debug, Clone)]
pub struct Design {
    lower: Vec<f64>,
    upper: Vec<f64>,
    method: DoeMethod,
    scaled: DMatrix<f64>,
}

impl Design {
    pub fn new<R: Rng + ?Sized>(
        lower: &[f64],
        upper: &[f64],
        counts: impl Into<SampleCount>,
        method: DoeMethod,
        rng: &mut R,
    ) -> Result<Self> {
        validate_bounds(lower, upper)?;
        let dims = lower.len();
        let counts = counts.into();

        let scaled = match method {
            DoeMethod::Grid => {
                let mut per_axis = expand_counts(&counts, dims)?;
                // degenerate axes contribute a single constant column
                for (axis, count) in per_axis.iter_mut().enumerate() {
                    if upper[axis] == lower[axis] {
                        *count = (*count).min(1);
                    }
                }
                gridsamp(&vec![0.0; dims], &vec![1.0; dims], &per_axis)?
            }
            DoeMethod::LatinHypercube => match counts {
                SampleCount::Uniform(n) if n > 0 => latin_hypercube(dims, n, rng),
                SampleCount::Uniform(_) => {
                    return Err(MarginError::Configuration(
                        "latin hypercube sample count must be positive".to_string(),
                    ))
                }
                SampleCount::PerAxis(_) => {
                    return Err(MarginError::Configuration(
                        "latin hypercube designs take a single sample count".to_string(),
                    ))
                }
            },
        };

        Ok(Self {
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            method,
            scaled,
        })
    }

    /// Samples in the unit box.
    pub fn scaled(&self) -> &DMatrix<f64> {
        &self.scaled
    }

    /// Samples mapped onto `[lower, upper]`.
    pub fn unscaled(&self) -> DMatrix<f64> {
        // bounds were validated against the sample width in `new`
        unscale_columns(&self.scaled, &self.lower, &self.upper)
    }

    pub fn method(&self) -> DoeMethod {
        self.method
    }

    pub fn n_samples(&self) -> usize {
        self.scaled.nrows()
    }

    pub fn dims(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }
}

fn validate_bounds(lower: &[f64], upper: &[f64]) -> Result<()> {
    if lower.len() != upper.len() {
        return Err(MarginError::Configuration(format!(
            "lower bounds have {} entries but upper bounds have {}",
            lower.len(),
            upper.len()
        )));
    }
    if let Some(axis) = (0..lower.len()).find(|&i| !(upper[i] >= lower[i])) {
        return Err(MarginError::Configuration(format!(
            "upper bound {} is below lower bound {} on axis {axis}",
            upper[axis], lower[axis]
        )));
    }
    Ok(())
}

fn expand_counts(counts: &SampleCount, dims: usize) -> Result<Vec<usize>> {
    match counts {
        SampleCount::Uniform(n) => Ok(vec![*n; dims]),
        SampleCount::PerAxis(per_axis) if per_axis.len() == dims => Ok(per_axis.clone()),
        SampleCount::PerAxis(per_axis) if per_axis.len() == 1 => Ok(vec![per_axis[0]; dims]),
        SampleCount::PerAxis(per_axis) => Err(MarginError::Configuration(format!(
            "length of counts must be either 1 or {dims}, got {}",
            per_axis.len()
        ))),
    }
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i + 1 == count { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Full-factorial grid over `[lower, upper]` with `counts[j]` points on axis
/// `j`. The first axis varies slowest; rows = `prod(counts)`.
pub fn gridsamp(lower: &[f64], upper: &[f64], counts: &[usize]) -> Result<DMatrix<f64>> {
    validate_bounds(lower, upper)?;
    let dims = lower.len();
    let counts = expand_counts(&SampleCount::PerAxis(counts.to_vec()), dims)?;

    let axes: Vec<Vec<f64>> = (0..dims)
        .map(|axis| {
            let count = if upper[axis] == lower[axis] {
                counts[axis].min(1)
            } else {
                counts[axis]
            };
            linspace(lower[axis], upper[axis], count)
        })
        .collect();

    let rows: usize = if dims == 0 {
        0
    } else {
        axes.iter().map(Vec::len).product()
    };
    let mut grid = DMatrix::<f64>::zeros(rows, dims);

    for row in 0..rows {
        let mut rem = row;
        for axis in (0..dims).rev() {
            let len = axes[axis].len();
            grid[(row, axis)] = axes[axis][rem % len];
            rem /= len;
        }
    }

    Ok(grid)
}

fn latin_hypercube<R: Rng + ?Sized>(dims: usize, n: usize, rng: &mut R) -> DMatrix<f64> {
    let mut design = DMatrix::<f64>::zeros(n, dims);
    let mut strata: Vec<usize> = (0..n).collect();

    for axis in 0..dims {
        strata.shuffle(rng);
        for (row, &stratum) in strata.iter().enumerate() {
            design[(row, axis)] = (stratum as f64 + rng.gen::<f64>()) / n as f64;
        }
    }

    design
}

fn check_columns(x: &DMatrix<f64>, lower: &[f64], upper: &[f64]) -> Result<()> {
    validate_bounds(lower, upper)?;
    if x.ncols() != lower.len() {
        return Err(MarginError::Configuration(format!(
            "samples have {} columns but bounds have {} entries",
            x.ncols(),
            lower.len()
        )));
    }
    Ok(())
}

/// Map physical samples onto the unit box. Degenerate axes map to zero.
pub fn scale(x: &DMatrix<f64>, lower: &[f64], upper: &[f64]) -> Result<DMatrix<f64>> {
    check_columns(x, lower, upper)?;
    let mut out = x.clone();
    for (col, mut column) in out.column_iter_mut().enumerate() {
        let span = upper[col] - lower[col];
        for value in column.iter_mut() {
            *value = if span == 0.0 {
                0.0
            } else {
                (*value - lower[col]) / span
            };
        }
    }
    Ok(out)
}

/// Map unit-box samples onto `[lower, upper]`.
pub fn unscale(x: &DMatrix<f64>, lower: &[f64], upper: &[f64]) -> Result<DMatrix<f64>> {
    check_columns(x, lower, upper)?;
    Ok(unscale_columns(x, lower, upper))
}

fn unscale_columns(x: &DMatrix<f64>, lower: &[f64], upper: &[f64]) -> DMatrix<f64> {
    let mut out = x.clone();
    for (col, mut column) in out.column_iter_mut().enumerate() {
        for value in column.iter_mut() {
            *value = lower[col] + *value * (upper[col] - lower[col]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn grid_orders_first_axis_slowest() {
        let grid = gridsamp(&[0.0, 10.0], &[1.0, 20.0], &[2, 3]).unwrap();
        assert_eq!(grid.nrows(), 6);
        assert_eq!(grid.row(0).iter().copied().collect::<Vec<_>>(), vec![0.0, 10.0]);
        assert_eq!(grid.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, 15.0]);
        assert_eq!(grid.row(3).iter().copied().collect::<Vec<_>>(), vec![1.0, 10.0]);
        assert_eq!(grid.row(5).iter().copied().collect::<Vec<_>>(), vec![1.0, 20.0]);
    }

    #[test]
    fn scalar_count_broadcasts() {
        let grid = gridsamp(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[4]).unwrap();
        assert_eq!(grid.nrows(), 64);
        assert_eq!(grid.ncols(), 3);
    }

    #[test]
    fn degenerate_axis_is_constant_column() {
        let grid = gridsamp(&[0.0, 2.0], &[1.0, 2.0], &[5, 5]).unwrap();
        assert_eq!(grid.nrows(), 5);
        assert!(grid.column(1).iter().all(|&v| v == 2.0));
    }

    #[test]
    fn invalid_bounds_are_configuration_errors() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            Design::new(&[0.0, 0.0], &[1.0], 4_usize, DoeMethod::Grid, &mut rng),
            Err(MarginError::Configuration(_))
        ));
        assert!(matches!(
            Design::new(&[1.0], &[0.0], 4_usize, DoeMethod::Grid, &mut rng),
            Err(MarginError::Configuration(_))
        ));
        assert!(matches!(
            Design::new(&[0.0, 0.0], &[1.0, 1.0], vec![2_usize, 3, 4], DoeMethod::Grid, &mut rng),
            Err(MarginError::Configuration(_))
        ));
        assert!(matches!(
            Design::new(&[0.0], &[1.0], vec![3_usize], DoeMethod::LatinHypercube, &mut rng),
            Err(MarginError::Configuration(_))
        ));
    }

    #[test]
    fn latin_hypercube_is_stratified() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_usize;
        let design = Design::new(&[0.0, 0.0], &[1.0, 1.0], n, DoeMethod::LatinHypercube, &mut rng)
            .unwrap();
        assert_eq!(design.n_samples(), n);

        for axis in 0..2 {
            let mut strata: Vec<usize> = design
                .scaled()
                .column(axis)
                .iter()
                .map(|&v| (v * n as f64).floor() as usize)
                .collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn scale_and_unscale_are_inverse() {
        let lower = [-3.0, 10.0, 0.5];
        let upper = [7.0, 12.5, 0.75];
        let mut rng = StdRng::seed_from_u64(11);
        let design =
            Design::new(&lower, &upper, 50_usize, DoeMethod::LatinHypercube, &mut rng).unwrap();

        let physical = design.unscaled();
        let back = scale(&physical, &lower, &upper).unwrap();
        assert!((&back - design.scaled()).amax() < 1e-12);

        let forward = unscale(&back, &lower, &upper).unwrap();
        assert!((forward - physical).amax() < 1e-12);
    }

    #[test]
    fn scale_rejects_mismatched_bounds() {
        let x = DMatrix::from_row_slice(1, 2, &[0.5, 0.5]);
        assert!(matches!(
            scale(&x, &[0.0], &[1.0]),
            Err(MarginError::Configuration(_))
        ));
        assert!(matches!(
            unscale(&x, &[0.0, 0.0], &[1.0]),
            Err(MarginError::Configuration(_))
        ));
        assert!(matches!(
            unscale(&x, &[0.0, 2.0], &[1.0, 1.0]),
            Err(MarginError::Configuration(_))
        ));
        assert!(scale(&x, &[0.0, 0.0], &[1.0, 2.0]).is_ok());
    }

    #[test]
    fn unscaled_grid_spans_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let design = Design::new(&[-1.0], &[3.0], 5_usize, DoeMethod::Grid, &mut rng).unwrap();
        let x = design.unscaled();
        let values: Vec<f64> = x.column(0).iter().copied().collect();
        assert_eq!(values, vec![-1.0, 0.0, 1.0, 2.0, 3.0]);
    }
}
