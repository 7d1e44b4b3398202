//! Bracketed scalar root finding
//!
//! A bracket is grown geometrically from the starting point, first in the
//! hinted direction and then in the opposite one, and the root is refined
//! with Brent's method. Both phases have hard iteration limits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MarginError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RootOptions {
    pub max_expansions: usize,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            max_expansions: 30,
            max_iter: 100,
            tolerance: 1e-12,
        }
    }
}

#[derive(Debug, Error)]
pub enum RootSearchError {
    #[error("no sign change within {expansions} bracket expansions")]
    NoSignChange { expansions: usize },
    #[error("not converged after {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("function is not finite at {at}")]
    NonFinite { at: f64 },
    #[error(transparent)]
    Evaluation(#[from] MarginError),
}

/// Initial bracket step for a starting point `x0`.
pub fn default_step(x0: f64) -> f64 {
    if x0 == 0.0 {
        1.0
    } else {
        0.1 * x0.abs()
    }
}

/// Root of `f` nearest to `x0` along `direction` (sign only), falling back
/// to the opposite direction.
pub fn find_root<F>(
    mut f: F,
    x0: f64,
    step: f64,
    direction: f64,
    options: &RootOptions,
) -> Result<f64, RootSearchError>
where
    F: FnMut(f64) -> Result<f64, MarginError>,
{
    let f0 = f(x0)?;
    if !f0.is_finite() {
        return Err(RootSearchError::NonFinite { at: x0 });
    }
    if f0 == 0.0 {
        return Ok(x0);
    }

    let hint = if direction < 0.0 { -1.0 } else { 1.0 };
    for sign in [hint, -hint] {
        let (mut a, mut fa) = (x0, f0);
        let mut dx = sign * step.abs();
        for _ in 0..options.max_expansions {
            let b = a + dx;
            let fb = f(b)?;
            if !fb.is_finite() {
                break;
            }
            if fa * fb <= 0.0 {
                return brent(&mut f, a, b, fa, fb, options);
            }
            a = b;
            fa = fb;
            dx *= 2.0;
        }
    }

    Err(RootSearchError::NoSignChange {
        expansions: options.max_expansions,
    })
}

/// Brent's method on a bracket with `fa * fb <= 0`.
pub fn brent<F>(
    f: &mut F,
    a: f64,
    b: f64,
    fa: f64,
    fb: f64,
    options: &RootOptions,
) -> Result<f64, RootSearchError>
where
    F: FnMut(f64) -> Result<f64, MarginError>,
{
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }

    let (mut a, mut b, mut fa, mut fb) = (a, b, fa, fb);
    let (mut c, mut fc) = (b, fb);
    let (mut d, mut e) = (b - a, b - a);

    for _ in 0..options.max_iter {
        if (fb > 0.0) == (fc > 0.0) {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol = 2.0 * f64::EPSILON * b.abs() + 0.5 * options.tolerance;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol || fb == 0.0 {
            return Ok(b);
        }

        if e.abs() >= tol && fa.abs() > fb.abs() {
            // inverse quadratic interpolation, or secant when a == c
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0)),
                    (q - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * xm * q - (tol * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;
        b += if d.abs() > tol { d } else { tol.copysign(xm) };
        fb = f(b)?;
        if !fb.is_finite() {
            return Err(RootSearchError::NonFinite { at: b });
        }
    }

    Err(RootSearchError::NotConverged {
        iterations: options.max_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_root_in_hinted_direction_first() {
        // roots at 1 and -3
        let f = |x: f64| Ok(4.0 - (x * x + 2.0 * x + 1.0));
        let options = RootOptions::default();

        let down = find_root(f, 1.2, default_step(1.2), -1.0, &options).unwrap();
        assert!((down - 1.0).abs() < 1e-10);

        let up = find_root(f, -2.0, default_step(-2.0), 1.0, &options).unwrap();
        assert!((up - 1.0).abs() < 1e-10);
    }

    #[test]
    fn falls_back_to_opposite_direction() {
        let f = |x: f64| Ok(x - 0.4);
        let root = find_root(f, 1.0, 0.1, 1.0, &RootOptions::default()).unwrap();
        assert!((root - 0.4).abs() < 1e-10);
    }

    #[test]
    fn reports_missing_sign_change() {
        let f = |x: f64| Ok(x * x + 1.0);
        let options = RootOptions {
            max_expansions: 10,
            ..RootOptions::default()
        };
        assert!(matches!(
            find_root(f, 1.0, 0.1, 1.0, &options),
            Err(RootSearchError::NoSignChange { expansions: 10 })
        ));
    }

    #[test]
    fn brent_converges_on_transcendental() {
        let mut f = |x: f64| Ok(x.cos() - x);
        let root = brent(&mut f, 0.0, 1.0, 1.0, 1f64.cos() - 1.0, &RootOptions::default()).unwrap();
        assert!((root - 0.739_085_133_215_160_6).abs() < 1e-10);
    }

    #[test]
    fn evaluation_errors_propagate() {
        let f = |_x: f64| Err(MarginError::Model("diverged".to_string()));
        assert!(matches!(
            find_root(f, 1.0, 0.1, 1.0, &RootOptions::default()),
            Err(RootSearchError::Evaluation(_))
        ));
    }
}
