//! First-order sensitivity of the pricing function.
//!
//! The gradient is the continuous generalization of the Greeks: the partial
//! along a spot axis is a delta, along a volatility axis a vega, and so on.
//! Its magnitude measures overall sensitivity at a point, its direction the
//! steepest price change.

use super::context::EngineContext;
use super::error::{Error, Result};
use super::state_space::{MAX_DIMENSIONS, StateSpace};
use arrayvec::ArrayVec;

/// Gradient norms below this threshold are treated as zero when normalizing.
const ZERO_NORM: f64 = 1e-15;

/// First partial derivatives of the pricing function at a query point.
///
/// A `Gradient` is a reusable workspace: construct it once for a dimension
/// count, then call [`Self::compute`] for as many points as needed. All
/// observers are total and return zero until a compute succeeds.
pub struct Gradient<'ctx> {
    ctx: &'ctx EngineContext,
    partials: Vec<f64>,
    point: Vec<f64>,
    value: f64,
    valid: bool,
}

impl<'ctx> Gradient<'ctx> {
    /// Creates a gradient workspace for `num_dims` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless
    /// `1 <= num_dims <= MAX_DIMENSIONS`.
    pub fn new(ctx: &'ctx EngineContext, num_dims: usize) -> Result<Self> {
        if num_dims == 0 || num_dims > MAX_DIMENSIONS {
            return ctx.fail(Error::InvalidArgument(format!(
                "gradient dimension count must be in [1, {MAX_DIMENSIONS}], got {num_dims}"
            )));
        }

        Ok(Self {
            ctx,
            partials: vec![0.0; num_dims],
            point: Vec::new(),
            value: 0.0,
            valid: false,
        })
    }

    /// Returns the number of dimensions this workspace was created for.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.partials.len()
    }

    /// Returns whether the last compute succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Computes the gradient at `point` by central differences over the
    /// interpolated value field of `space`.
    ///
    /// The step along each axis is that axis' grid spacing. A fixed relative
    /// bump would alias against the piecewise-linear reconstruction; probing
    /// at exactly one node spacing keeps the stencil on well-defined
    /// segments of the interpolant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `space` or `point` disagree
    /// with this workspace's dimension count, and [`Error::NotInitialized`]
    /// if the value field has not been mapped.
    pub fn compute(&mut self, space: &StateSpace<'_>, point: &[f64]) -> Result<()> {
        let n = self.partials.len();

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

        let value = space.interpolate(point);
        let mut probe: ArrayVec<f64, MAX_DIMENSIONS> = point.iter().copied().collect();

        for d in 0..n {
            let h = space.dimension(d).spacing();

            probe[d] = point[d] + h;
            let f_plus = space.interpolate(&probe);

            probe[d] = point[d] - h;
            let f_minus = space.interpolate(&probe);

            probe[d] = point[d];

            self.partials[d] = (f_plus - f_minus) / (2.0 * h);
        }

        self.value = value;
        self.point = point.to_vec();
        self.valid = true;

        Ok(())
    }

    /// Computes the gradient by evaluating the pricing callback directly,
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
        let n = self.partials.len();

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

        let value = f(point);
        if !value.is_finite() {
            return self.ctx.fail(Error::PricingEngineFailed(format!(
                "callback returned non-finite value {value}"
            )));
        }

        let mut probe: ArrayVec<f64, MAX_DIMENSIONS> = point.iter().copied().collect();

        for d in 0..n {
            probe[d] = point[d] + h;
            let f_plus = f(&probe);

            probe[d] = point[d] - h;
            let f_minus = f(&probe);

            probe[d] = point[d];

            self.partials[d] = (f_plus - f_minus) / (2.0 * h);
        }

        self.value = value;
        self.point = point.to_vec();
        self.valid = true;

        Ok(())
    }

    /// Returns the partial derivative along axis `d`, or `0.0` if nothing
    /// has been computed or `d` is out of range.
    #[must_use]
    pub fn partial(&self, d: usize) -> f64 {
        if !self.valid {
            return 0.0;
        }

        self.partials.get(d).copied().unwrap_or(0.0)
    }

    /// Returns all partial derivatives; empty until a compute succeeds.
    #[must_use]
    pub fn partials(&self) -> &[f64] {
        if self.valid { &self.partials } else { &[] }
    }

    /// Returns the function value at the query point, or `0.0` if nothing
    /// has been computed.
    #[must_use]
    pub const fn value(&self) -> f64 {
        if self.valid { self.value } else { 0.0 }
    }

    /// Returns the query point of the last successful compute; empty until
    /// then.
    #[must_use]
    pub fn point(&self) -> &[f64] {
        if self.valid { &self.point } else { &[] }
    }

    /// Returns the Euclidean norm of the gradient.
    #[must_use]
    pub fn norm(&self) -> f64 {
        if !self.valid {
            return 0.0;
        }

        self.partials.iter().map(|p| p * p).sum::<f64>().sqrt()
    }

    /// Returns the maximum absolute partial derivative.
    #[must_use]
    pub fn linf_norm(&self) -> f64 {
        if !self.valid {
            return 0.0;
        }

        self.partials.iter().fold(0.0, |max, p| p.abs().max(max))
    }

    /// Returns the axis with the largest absolute partial derivative; ties
    /// resolve to the lowest index. Returns `0` if nothing has been
    /// computed.
    #[must_use]
    pub fn most_sensitive(&self) -> usize {
        if !self.valid {
            return 0;
        }

        let mut index = 0;
        let mut max = 0.0;

        for (d, p) in self.partials.iter().enumerate() {
            if p.abs() > max {
                max = p.abs();
                index = d;
            }
        }

        index
    }

    /// Returns the unit direction of steepest ascent, or the zero vector if
    /// the gradient is effectively zero or nothing has been computed.
    #[must_use]
    pub fn direction(&self) -> Vec<f64> {
        let norm = self.norm();

        if norm < ZERO_NORM {
            return vec![0.0; self.partials.len()];
        }

        self.partials.iter().map(|p| p / norm).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_space::{Dimension, DimensionKind};
    use float_cmp::assert_approx_eq;

    fn square_space(ctx: &EngineContext) -> StateSpace<'_> {
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
    fn rejects_bad_dimension_counts() {
        let ctx = EngineContext::new();
        assert!(Gradient::new(&ctx, 0).is_err());
        assert!(Gradient::new(&ctx, 17).is_err());
    }

    #[test]
    fn observers_are_zero_before_compute() {
        let ctx = EngineContext::new();
        let grad = Gradient::new(&ctx, 3).unwrap();

        assert!(!grad.is_valid());
        assert_eq!(grad.partial(0), 0.0);
        assert_eq!(grad.norm(), 0.0);
        assert_eq!(grad.linf_norm(), 0.0);
        assert_eq!(grad.most_sensitive(), 0);
        assert!(grad.partials().is_empty());
        assert_eq!(grad.direction(), vec![0.0; 3]);
    }

    #[test]
    fn gradient_of_paraboloid_on_grid() {
        let ctx = EngineContext::new();
        let space = square_space(&ctx);
        let mut grad = Gradient::new(&ctx, 2).unwrap();

        grad.compute(&space, &[2.0, 3.0]).unwrap();

        assert_approx_eq!(f64, grad.partial(0), 4.0, epsilon = 0.1);
        assert_approx_eq!(f64, grad.partial(1), 6.0, epsilon = 0.1);
        assert_approx_eq!(f64, grad.norm(), 52.0_f64.sqrt(), epsilon = 0.2);
        assert_eq!(grad.most_sensitive(), 1);
    }

    #[test]
    fn direct_mode_recovers_linear_coefficients() {
        let ctx = EngineContext::new();
        let mut grad = Gradient::new(&ctx, 3).unwrap();

        grad.compute_direct(
            |c| 2.0_f64.mul_add(c[0], (-0.5_f64).mul_add(c[1], 7.0 * c[2])) + 1.0,
            &[0.3, -1.2, 4.0],
            None,
        )
        .unwrap();

        assert_approx_eq!(f64, grad.partial(0), 2.0, epsilon = 1e-6);
        assert_approx_eq!(f64, grad.partial(1), -0.5, epsilon = 1e-6);
        assert_approx_eq!(f64, grad.partial(2), 7.0, epsilon = 1e-6);
        assert_eq!(grad.most_sensitive(), 2);
    }

    #[test]
    fn direction_is_a_unit_vector() {
        let ctx = EngineContext::new();
        let mut grad = Gradient::new(&ctx, 2).unwrap();
        grad.compute_direct(|c| 3.0_f64.mul_add(c[0], 4.0 * c[1]), &[0.0, 0.0], None)
            .unwrap();

        let dir = grad.direction();
        assert_approx_eq!(f64, dir[0], 0.6, epsilon = 1e-6);
        assert_approx_eq!(f64, dir[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn flat_function_has_zero_direction() {
        let ctx = EngineContext::new();
        let mut grad = Gradient::new(&ctx, 2).unwrap();
        grad.compute_direct(|_| 42.0, &[1.0, 1.0], None).unwrap();

        assert_eq!(grad.direction(), vec![0.0, 0.0]);
    }

    #[test]
    fn mismatched_space_is_rejected() {
        let ctx = EngineContext::new();
        let space = square_space(&ctx);
        let mut grad = Gradient::new(&ctx, 3).unwrap();

        assert!(grad.compute(&space, &[0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn unmapped_space_is_rejected() {
        let ctx = EngineContext::new();
        let mut space = StateSpace::new(&ctx);
        space
            .add_dimension(Dimension::new(DimensionKind::Spot, "s", 0.0, 1.0, 5).unwrap())
            .unwrap();

        let mut grad = Gradient::new(&ctx, 1).unwrap();
        assert!(grad.compute(&space, &[0.5]).is_err());
    }
}
