//! Second-order curvature of the pricing function.
//!
//! The Hessian captures where the pricing manifold bends: large eigenvalues
//! mean strong convexity or concavity, a large condition number means the
//! curvature is concentrated in few directions, and a saddle (indefinite
//! spectrum) is where delta-style linear hedges fail fastest.

use super::context::EngineContext;
use super::error::{Error, Result};
use super::jacobi;
use super::state_space::{MAX_DIMENSIONS, StateSpace};
use arrayvec::ArrayVec;
use ndarray::Array2;

/// Eigenvalues with absolute value below this threshold count as zero for
/// conditioning purposes.
const ZERO_EIGENVALUE: f64 = 1e-15;

/// Finite sentinel returned instead of an infinite condition number.
pub const CONDITION_SENTINEL: f64 = 1e15;

/// Dense symmetric matrix of second partial derivatives at a query point.
///
/// Both triangles are stored explicitly and written in lockstep, so the
/// matrix is symmetric bitwise. Eigenvalues are computed lazily on first
/// query, cached, and invalidated whenever the matrix is recomputed. All
/// observers are total and return zero until a compute succeeds.
pub struct Hessian<'ctx> {
    ctx: &'ctx EngineContext,
    matrix: Array2<f64>,
    point: Vec<f64>,
    eigenvalues: Vec<f64>,
    valid: bool,
    eigen_valid: bool,
}

impl<'ctx> Hessian<'ctx> {
    /// Creates a Hessian workspace for `num_dims` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless
    /// `1 <= num_dims <= MAX_DIMENSIONS`.
    pub fn new(ctx: &'ctx EngineContext, num_dims: usize) -> Result<Self> {
        if num_dims == 0 || num_dims > MAX_DIMENSIONS {
            return ctx.fail(Error::InvalidArgument(format!(
                "Hessian dimension count must be in [1, {MAX_DIMENSIONS}], got {num_dims}"
            )));
        }

        Ok(Self {
            ctx,
            matrix: Array2::zeros((num_dims, num_dims)),
            point: Vec::new(),
            eigenvalues: Vec::new(),
            valid: false,
            eigen_valid: false,
        })
    }

    /// Returns the number of dimensions this workspace was created for.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.matrix.nrows()
    }

    /// Returns whether the last compute succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Computes the Hessian at `point` by central differences over the
    /// interpolated value field of `space`, using each axis' grid spacing as
    /// the step along that axis (see [`Gradient::compute`] for why).
    ///
    /// [`Gradient::compute`]: super::gradient::Gradient::compute
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `space` or `point` disagree
    /// with this workspace's dimension count, and [`Error::NotInitialized`]
    /// if the value field has not been mapped.
    pub fn compute(&mut self, space: &StateSpace<'_>, point: &[f64]) -> Result<()> {
        let n = self.matrix.nrows();

        if space.num_dimensions() != n {
            return self.ctx.fail(Error::DimensionMismatch {
                expected: n,
                found: space.num_dimensions(),
            });
        }
        if point.len() != n {
            return self.ctx.fail(Error::DimensionMismatch {
                expected: n,
                found: point.len(),
            });
        }
        if !space.is_populated() {
            return self
                .ctx
                .fail(Error::NotInitialized("state space values not mapped".to_owned()));
        }

        self.valid = false;
        self.eigen_valid = false;

        let f_center = space.interpolate(point);
        let mut probe: ArrayVec<f64, MAX_DIMENSIONS> = point.iter().copied().collect();

        // diagonal: second partials along one axis
        for i in 0..n {
            let h = space.dimension(i).spacing();

            probe[i] = point[i] + h;
            let f_plus = space.interpolate(&probe);

            probe[i] = point[i] - h;
            let f_minus = space.interpolate(&probe);

            probe[i] = point[i];

            self.matrix[[i, i]] = (f_plus - 2.0 * f_center + f_minus) / (h * h);
        }

        // mixed partials from the four-corner stencil
        for i in 0..n {
            for j in (i + 1)..n {
                let h_i = space.dimension(i).spacing();
                let h_j = space.dimension(j).spacing();

                probe[i] = point[i] + h_i;
                probe[j] = point[j] + h_j;
                let f_pp = space.interpolate(&probe);

                probe[j] = point[j] - h_j;
                let f_pm = space.interpolate(&probe);

                probe[i] = point[i] - h_i;
                let f_mm = space.interpolate(&probe);

                probe[j] = point[j] + h_j;
                let f_mp = space.interpolate(&probe);

                probe[i] = point[i];
                probe[j] = point[j];

                let mixed = (f_pp - f_pm - f_mp + f_mm) / (4.0 * h_i * h_j);

                self.matrix[[i, j]] = mixed;
                self.matrix[[j, i]] = mixed;
            }
        }

        self.point = point.to_vec();
        self.valid = true;

        Ok(())
    }

    /// Computes the Hessian by evaluating the pricing callback directly,
    /// bypassing the tabulated grid. `step` overrides the engine context's
    /// bump size; the step is uniform across axes in this mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `point` disagrees with this
    /// workspace's dimension count, [`Error::InvalidArgument`] for a
    /// non-positive `step`, and [`Error::PricingEngineFailed`] if the
    /// callback produces a non-finite value at `point`.
    pub fn compute_direct<F>(&mut self, f: F, point: &[f64], step: Option<f64>) -> Result<()>
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = self.matrix.nrows();

        if point.len() != n {
            return self.ctx.fail(Error::DimensionMismatch {
                expected: n,
                found: point.len(),
            });
        }

        let h = step.unwrap_or_else(|| self.ctx.bump_size());
        if h.is_nan() || h <= 0.0 {
            return self
                .ctx
                .fail(Error::InvalidArgument(format!("step must be positive, got {h}")));
        }

        self.valid = false;
        self.eigen_valid = false;

        let f_center = f(point);
        if !f_center.is_finite() {
            return self.ctx.fail(Error::PricingEngineFailed(format!(
                "callback returned non-finite value {f_center}"
            )));
        }

        let mut probe: ArrayVec<f64, MAX_DIMENSIONS> = point.iter().copied().collect();

        for i in 0..n {
            probe[i] = point[i] + h;
            let f_plus = f(&probe);

            probe[i] = point[i] - h;
            let f_minus = f(&probe);

            probe[i] = point[i];

            self.matrix[[i, i]] = (f_plus - 2.0 * f_center + f_minus) / (h * h);
        }

        for i in 0..n {
            for j in (i + 1)..n {
                probe[i] = point[i] + h;
                probe[j] = point[j] + h;
                let f_pp = f(&probe);

                probe[j] = point[j] - h;
                let f_pm = f(&probe);

                probe[i] = point[i] - h;
                let f_mm = f(&probe);

                probe[j] = point[j] + h;
                let f_mp = f(&probe);

                probe[i] = point[i];
                probe[j] = point[j];

                let mixed = (f_pp - f_pm - f_mp + f_mm) / (4.0 * h * h);

                self.matrix[[i, j]] = mixed;
                self.matrix[[j, i]] = mixed;
            }
        }

        self.point = point.to_vec();
        self.valid = true;

        Ok(())
    }

    /// Returns entry `(i, j)`, or `0.0` if nothing has been computed or the
    /// indices are out of range.
    #[must_use]
    pub fn entry(&self, i: usize, j: usize) -> f64 {
        if !self.valid {
            return 0.0;
        }

        self.matrix.get([i, j]).copied().unwrap_or(0.0)
    }

    /// Returns the full matrix of the last successful compute.
    #[must_use]
    pub const fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Returns the query point of the last successful compute; empty until
    /// then.
    #[must_use]
    pub fn point(&self) -> &[f64] {
        if self.valid { &self.point } else { &[] }
    }

    /// Returns the trace, or `0.0` if nothing has been computed.
    #[must_use]
    pub fn trace(&self) -> f64 {
        if !self.valid {
            return 0.0;
        }

        self.matrix.diag().sum()
    }

    /// Returns the Frobenius norm, or `0.0` if nothing has been computed.
    #[must_use]
    pub fn frobenius_norm(&self) -> f64 {
        if !self.valid {
            return 0.0;
        }

        self.matrix.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    fn ensure_eigenvalues(&mut self) -> Result<()> {
        if self.eigen_valid {
            return Ok(());
        }
        if !self.valid {
            return self
                .ctx
                .fail(Error::NotInitialized("Hessian matrix not computed".to_owned()));
        }

        match jacobi::symmetric_eigenvalues(self.matrix.view()) {
            Ok(eigenvalues) => {
                self.eigenvalues = eigenvalues;
                self.eigen_valid = true;
                Ok(())
            }
            Err(err) => self.ctx.fail(err),
        }
    }

    /// Returns the eigenvalues sorted descending by signed value, computing
    /// and caching them on first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before a successful compute and
    /// [`Error::NumericalInstability`] if the eigensolver diverges.
    pub fn eigenvalues(&mut self) -> Result<&[f64]> {
        self.ensure_eigenvalues()?;
        Ok(&self.eigenvalues)
    }

    /// Returns the condition number `|lambda|_max / |lambda|_min` over the
    /// numerically nonzero part of the spectrum.
    ///
    /// Eigenvalues below `1e-15` in magnitude are excluded from the
    /// minimum: a flat direction (exact zero curvature, routine at clamped
    /// domain boundaries) is benign, not ill-conditioned. An effectively
    /// zero matrix reports `0.0`, and the ratio is capped at the finite
    /// [`CONDITION_SENTINEL`] so downstream arithmetic stays finite.
    /// Returns `0.0` if nothing has been computed or the eigensolver fails.
    #[must_use]
    pub fn condition_number(&mut self) -> f64 {
        if self.ensure_eigenvalues().is_err() {
            return 0.0;
        }

        let nonzero = self
            .eigenvalues
            .iter()
            .map(|v| v.abs())
            .filter(|&v| v > ZERO_EIGENVALUE);

        let (max_abs, min_abs) = nonzero.fold((0.0_f64, f64::INFINITY), |(max, min), v| {
            (v.max(max), v.min(min))
        });

        if max_abs < ZERO_EIGENVALUE {
            return 0.0;
        }

        (max_abs / min_abs).min(CONDITION_SENTINEL)
    }

    /// Returns whether all eigenvalues are strictly positive (locally convex
    /// surface). Returns `false` if the spectrum is unavailable.
    #[must_use]
    pub fn is_positive_definite(&mut self) -> bool {
        self.ensure_eigenvalues().is_ok() && self.eigenvalues.iter().all(|&v| v > 0.0)
    }

    /// Returns whether all eigenvalues are strictly negative (locally
    /// concave surface). Returns `false` if the spectrum is unavailable.
    #[must_use]
    pub fn is_negative_definite(&mut self) -> bool {
        self.ensure_eigenvalues().is_ok() && self.eigenvalues.iter().all(|&v| v < 0.0)
    }

    /// Returns whether the spectrum mixes signs: a saddle region,
    /// particularly unstable for hedging. Returns `false` if the spectrum is
    /// unavailable.
    #[must_use]
    pub fn is_indefinite(&mut self) -> bool {
        self.ensure_eigenvalues().is_ok()
            && self.eigenvalues.iter().any(|&v| v > 0.0)
            && self.eigenvalues.iter().any(|&v| v < 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_space::{Dimension, DimensionKind};
    use float_cmp::assert_approx_eq;

    fn paraboloid_space(ctx: &EngineContext) -> StateSpace<'_> {
        let mut space = StateSpace::new(ctx);
        for name in ["x", "y"] {
            space
                .add_dimension(
                    Dimension::new(DimensionKind::Custom, name, -5.0, 5.0, 21).unwrap(),
                )
                .unwrap();
        }
        space.map_values(|c| c[0] * c[0] + c[1] * c[1]).unwrap();
        space
    }

    #[test]
    fn observers_are_zero_before_compute() {
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();

        assert_eq!(hess.entry(0, 0), 0.0);
        assert_eq!(hess.trace(), 0.0);
        assert_eq!(hess.frobenius_norm(), 0.0);
        assert_eq!(hess.condition_number(), 0.0);
        assert!(hess.eigenvalues().is_err());
    }

    #[test]
    fn hessian_of_paraboloid_on_grid() {
        let ctx = EngineContext::new();
        let space = paraboloid_space(&ctx);
        let mut hess = Hessian::new(&ctx, 2).unwrap();

        hess.compute(&space, &[2.0, 3.0]).unwrap();

        assert_approx_eq!(f64, hess.entry(0, 0), 2.0, epsilon = 0.2);
        assert_approx_eq!(f64, hess.entry(1, 1), 2.0, epsilon = 0.2);
        assert_approx_eq!(f64, hess.entry(0, 1), 0.0, epsilon = 0.2);
        assert_approx_eq!(f64, hess.trace(), 4.0, epsilon = 0.4);
        assert_approx_eq!(f64, hess.frobenius_norm(), 8.0_f64.sqrt(), epsilon = 0.5);

        let eigenvalues = hess.eigenvalues().unwrap();
        assert_approx_eq!(f64, eigenvalues[0], 2.0, epsilon = 0.2);
        assert_approx_eq!(f64, eigenvalues[1], 2.0, epsilon = 0.2);
    }

    #[test]
    fn matrix_is_stored_symmetrically() {
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 3).unwrap();
        hess.compute_direct(
            |c| c[0] * c[1] + c[1] * c[2] * c[2] + c[0] * c[0] * c[2],
            &[0.7, -1.3, 2.1],
            Some(1e-4),
        )
        .unwrap();

        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(hess.entry(i, j).to_bits(), hess.entry(j, i).to_bits());
            }
        }
    }

    #[test]
    fn quadratic_form_recovers_two_q() {
        // f(x) = x^T Q x with Q = [[1, 0.5], [0.5, 2]] has Hessian 2 Q
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();
        hess.compute_direct(
            |c| c[1].mul_add(c[1] * 2.0, c[0].mul_add(c[0], c[0] * c[1])),
            &[0.4, -0.9],
            Some(1e-3),
        )
        .unwrap();

        assert_approx_eq!(f64, hess.entry(0, 0), 2.0, epsilon = 1e-4);
        assert_approx_eq!(f64, hess.entry(0, 1), 1.0, epsilon = 1e-4);
        assert_approx_eq!(f64, hess.entry(1, 1), 4.0, epsilon = 1e-4);
        assert_approx_eq!(f64, hess.trace(), 6.0, epsilon = 1e-3);
        assert!(hess.is_positive_definite());
        assert!(!hess.is_indefinite());
    }

    #[test]
    fn recompute_invalidates_eigenvalue_cache() {
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();

        hess.compute_direct(|c| c[0] * c[0] + c[1] * c[1], &[0.0, 0.0], Some(1e-3))
            .unwrap();
        let first = hess.eigenvalues().unwrap()[0];
        assert_approx_eq!(f64, first, 2.0, epsilon = 1e-4);

        hess.compute_direct(
            |c| 3.0 * c[0] * c[0] + 3.0 * c[1] * c[1],
            &[0.0, 0.0],
            Some(1e-3),
        )
        .unwrap();
        let second = hess.eigenvalues().unwrap()[0];
        assert_approx_eq!(f64, second, 6.0, epsilon = 1e-3);
    }

    #[test]
    fn flat_surface_conditioning_is_benign() {
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();
        hess.compute_direct(|c| 3.0_f64.mul_add(c[0], 4.0 * c[1]), &[1.0, 1.0], Some(1e-3))
            .unwrap();

        assert_eq!(hess.condition_number(), 0.0);
    }

    #[test]
    fn flat_directions_do_not_count_as_ill_conditioned() {
        // curvature only along x: the zero y eigenvalue is excluded and the
        // remaining spectrum is perfectly conditioned
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();
        hess.compute_direct(|c| c[0] * c[0], &[0.0, 0.0], Some(1e-3)).unwrap();

        assert_approx_eq!(f64, hess.condition_number(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn extreme_ratio_is_capped_at_the_sentinel() {
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();
        hess.compute_direct(
            |c| 1e8_f64.mul_add(c[0] * c[0], 1e-8 * c[1] * c[1]),
            &[0.0, 0.0],
            Some(1e-3),
        )
        .unwrap();

        // spectrum {2e8, 2e-8} has ratio 1e16; the report stays finite
        assert_approx_eq!(f64, hess.condition_number(), CONDITION_SENTINEL, ulps = 2);
    }

    #[test]
    fn saddle_is_indefinite() {
        let ctx = EngineContext::new();
        let mut hess = Hessian::new(&ctx, 2).unwrap();
        hess.compute_direct(|c| c[0] * c[0] - c[1] * c[1], &[0.0, 0.0], Some(1e-3))
            .unwrap();

        assert!(hess.is_indefinite());
        assert!(!hess.is_positive_definite());
        assert!(!hess.is_negative_definite());
    }
}
