//! Eigenvalues of symmetric matrices by classical Jacobi rotations.
//!
//! Each iteration zeroes the largest off-diagonal pair with a two-sided
//! Givens rotation; for the small dense matrices produced by
//! [`Hessian`](super::hessian::Hessian) this is robust and fast enough that
//! linking an external LAPACK is not worth the dependency.

use super::error::{Error, Result};
use ndarray::ArrayView2;
use std::f64::consts::FRAC_PI_4;

/// Maximum number of rotations before the iteration is declared divergent.
pub const MAX_SWEEPS: usize = 100;

/// Off-diagonal Frobenius mass below which the matrix counts as diagonal.
pub const CONVERGENCE_TOL: f64 = 1e-12;

/// Off-diagonal Frobenius mass `sqrt(2 * sum_{i<j} m[i,j]^2)`.
fn off_diagonal_norm(m: &ndarray::Array2<f64>) -> f64 {
    let n = m.nrows();
    let mut sum = 0.0;

    for i in 0..n {
        for j in (i + 1)..n {
            sum += m[[i, j]] * m[[i, j]];
        }
    }

    (2.0 * sum).sqrt()
}

fn sorted_diagonal(m: &ndarray::Array2<f64>) -> Vec<f64> {
    let mut eigenvalues: Vec<f64> = m.diag().to_vec();
    eigenvalues.sort_by(|a, b| b.total_cmp(a));
    eigenvalues
}

/// Computes the eigenvalues of a symmetric matrix, sorted descending by
/// signed value. The input is copied; the caller's matrix is not modified.
///
/// # Errors
///
/// Returns [`Error::NumericalInstability`] if the iteration has not
/// converged after [`MAX_SWEEPS`] rotations.
///
/// # Panics
///
/// Panics if `matrix` is empty or not square. Symmetry is assumed, not
/// checked; only the upper triangle drives the pivot search.
pub fn symmetric_eigenvalues(matrix: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
    let n = matrix.nrows();
    assert_eq!(n, matrix.ncols());
    assert!(n > 0);

    let mut m = matrix.to_owned();

    for _ in 0..MAX_SWEEPS {
        if off_diagonal_norm(&m) < CONVERGENCE_TOL {
            return Ok(sorted_diagonal(&m));
        }

        // largest off-diagonal entry picks the rotation plane
        let mut p = 0;
        let mut q = 1;
        let mut max = m[[0, 1]].abs();

        for i in 0..n {
            for j in (i + 1)..n {
                if m[[i, j]].abs() > max {
                    max = m[[i, j]].abs();
                    p = i;
                    q = j;
                }
            }
        }

        let app = m[[p, p]];
        let aqq = m[[q, q]];
        let apq = m[[p, q]];

        let theta = if (app - aqq).abs() < 1e-15 {
            FRAC_PI_4
        } else {
            0.5 * (2.0 * apq).atan2(aqq - app)
        };

        let c = theta.cos();
        let s = theta.sin();

        for i in 0..n {
            if i != p && i != q {
                let aip = m[[i, p]];
                let aiq = m[[i, q]];

                let rotated_p = c.mul_add(aip, -s * aiq);
                let rotated_q = s.mul_add(aip, c * aiq);

                m[[i, p]] = rotated_p;
                m[[p, i]] = rotated_p;
                m[[i, q]] = rotated_q;
                m[[q, i]] = rotated_q;
            }
        }

        m[[p, p]] = (c * c).mul_add(app, (s * s).mul_add(aqq, -2.0 * s * c * apq));
        m[[q, q]] = (s * s).mul_add(app, (c * c).mul_add(aqq, 2.0 * s * c * apq));
        m[[p, q]] = 0.0;
        m[[q, p]] = 0.0;
    }

    if off_diagonal_norm(&m) < CONVERGENCE_TOL {
        return Ok(sorted_diagonal(&m));
    }

    Err(Error::NumericalInstability(format!(
        "Jacobi iteration did not converge within {MAX_SWEEPS} sweeps"
    )))
}
