//! Discretized state space: the manifold on which all analyses operate.
//!
//! A [`StateSpace`] is a uniform Cartesian grid over up to sixteen named risk
//! factors. Scalar values produced by a pricing callback are tabulated once
//! per grid node and afterwards reconstructed anywhere inside the domain by
//! multilinear interpolation, which is what the finite-difference operators
//! in [`gradient`](super::gradient) and [`hessian`](super::hessian) probe.

use super::context::EngineContext;
use super::error::{Error, Result};
use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

/// Maximum number of dimensions a state space can carry.
pub const MAX_DIMENSIONS: usize = 16;

/// Informational tag describing what a dimension represents.
///
/// The analyses treat every dimension identically; the kind is carried for
/// reporting and for joining results back onto market data.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DimensionKind {
    /// Underlying price.
    Spot,
    /// Implied or realized volatility.
    Volatility,
    /// Interest rate.
    Rate,
    /// Time to maturity.
    Time,
    /// Correlation parameter.
    Correlation,
    /// Liquidity score or bid-ask spread.
    Liquidity,
    /// Funding cost.
    Funding,
    /// User-defined dimension.
    Custom,
}

/// A single named axis of the state space.
///
/// Node values are uniformly spaced over the closed interval
/// `[lower, upper]`; the last node is forced exactly onto `upper` so that
/// repeated accumulation of the spacing cannot drift past the domain.
/// Dimensions are immutable once attached to a [`StateSpace`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Dimension {
    kind: DimensionKind,
    name: String,
    lower: f64,
    upper: f64,
    nodes: Vec<f64>,
}

impl Dimension {
    /// Constructs a dimension with `nodes` uniformly spaced sample points
    /// over `[lower, upper]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the bounds are not finite with
    /// `lower < upper`, or if `nodes < 2`.
    pub fn new(
        kind: DimensionKind,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
        nodes: usize,
    ) -> Result<Self> {
        if nodes < 2 {
            return Err(Error::InvalidArgument(
                "dimension must have at least 2 nodes".to_owned(),
            ));
        }
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(Error::InvalidArgument(format!(
                "dimension bounds [{lower}, {upper}] must be finite with lower < upper"
            )));
        }

        let step = (upper - lower) / super::convert::f64_from_usize(nodes - 1);
        let mut node_values: Vec<f64> = (0..nodes)
            .map(|k| super::convert::f64_from_usize(k).mul_add(step, lower))
            .collect();
        // pin the endpoint so boundary clamping is exact
        node_values[nodes - 1] = upper;

        Ok(Self {
            kind,
            name: name.into(),
            lower,
            upper,
            nodes: node_values,
        })
    }

    /// Returns the informational kind of this dimension.
    #[must_use]
    pub const fn kind(&self) -> DimensionKind {
        self.kind
    }

    /// Returns the name of this dimension.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the lower bound of the domain.
    #[must_use]
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Returns the upper bound of the domain.
    #[must_use]
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Returns the number of sample nodes.
    #[must_use]
    pub fn nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the uniform spacing between adjacent nodes. This is also the
    /// finite-difference step used for stencils over the interpolated field.
    #[must_use]
    pub fn spacing(&self) -> f64 {
        (self.upper - self.lower) / super::convert::f64_from_usize(self.nodes.len() - 1)
    }

    /// Returns the node values of this dimension.
    #[must_use]
    pub fn node_values(&self) -> &[f64] {
        &self.nodes
    }

    /// Returns the value of node `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn node(&self, index: usize) -> f64 {
        self.nodes[index]
    }

    /// Locates the bracketing node pair for `x` after clamping to the
    /// domain. Returns `(lo, hi, t)` with `t` in `[0, 1]`; on either
    /// boundary `hi == lo` and `t == 0`.
    fn bracket(&self, x: f64) -> (usize, usize, f64) {
        let last = self.nodes.len() - 1;

        if x <= self.lower {
            return (0, 0, 0.0);
        }
        if x >= self.upper {
            return (last, last, 0.0);
        }

        for k in 0..last {
            if x >= self.nodes[k] && x <= self.nodes[k + 1] {
                let range = self.nodes[k + 1] - self.nodes[k];
                let t = if range > 1e-15 {
                    (x - self.nodes[k]) / range
                } else {
                    0.0
                };
                return (k, k + 1, t);
            }
        }

        // unreachable for x strictly inside [lower, upper], kept as a
        // defensive clamp against pathological rounding
        (last, last, 0.0)
    }

    /// Returns the index of the node closest to `x`; ties resolve to the
    /// lower index.
    fn nearest(&self, x: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;

        for (k, &node) in self.nodes.iter().enumerate() {
            let dist = (node - x).abs();
            if dist < best_dist {
                best_dist = dist;
                best = k;
            }
        }

        best
    }
}

/// Uniform Cartesian grid over up to [`MAX_DIMENSIONS`] risk factors,
/// together with the tabulated values of the pricing function.
pub struct StateSpace<'ctx> {
    ctx: &'ctx EngineContext,
    dims: Vec<Dimension>,
    strides: Vec<usize>,
    total_points: usize,
    values: Vec<f64>,
    populated: bool,
}

impl<'ctx> StateSpace<'ctx> {
    /// Creates an empty state space borrowing `ctx`.
    #[must_use]
    pub const fn new(ctx: &'ctx EngineContext) -> Self {
        Self {
            ctx,
            dims: Vec::new(),
            strides: Vec::new(),
            total_points: 0,
            values: Vec::new(),
            populated: false,
        }
    }

    /// Returns the engine context this space was created from.
    #[must_use]
    pub const fn context(&self) -> &'ctx EngineContext {
        self.ctx
    }

    /// Attaches `dim` as the next axis. Any previously mapped value field is
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the space already carries
    /// [`MAX_DIMENSIONS`] dimensions.
    pub fn add_dimension(&mut self, dim: Dimension) -> Result<()> {
        if self.dims.len() >= MAX_DIMENSIONS {
            return self.ctx.fail(Error::InvalidArgument(format!(
                "state space is limited to {MAX_DIMENSIONS} dimensions"
            )));
        }

        self.dims.push(dim);
        self.recompute_strides();

        self.values.clear();
        self.populated = false;

        Ok(())
    }

    /// Returns the number of attached dimensions.
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.dims.len()
    }

    /// Returns the attached dimensions in axis order.
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    /// Returns axis `d`.
    ///
    /// # Panics
    ///
    /// Panics if `d` is out of bounds.
    #[must_use]
    pub fn dimension(&self, d: usize) -> &Dimension {
        &self.dims[d]
    }

    /// Returns the total number of grid nodes.
    #[must_use]
    pub const fn total_points(&self) -> usize {
        self.total_points
    }

    /// Returns whether [`Self::map_values`] has populated the value field.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.populated
    }

    fn recompute_strides(&mut self) {
        let n = self.dims.len();
        self.strides = vec![1; n];

        for d in (0..n.saturating_sub(1)).rev() {
            self.strides[d] = self.strides[d + 1] * self.dims[d + 1].nodes();
        }

        self.total_points = self.strides.first().map_or(0, |&s| s * self.dims[0].nodes());
    }

    /// Converts a multi-index into a flat row-major index.
    ///
    /// # Panics
    ///
    /// Panics if `multi` has the wrong length or any component is out of
    /// bounds for its axis.
    #[must_use]
    pub fn flat_index(&self, multi: &[usize]) -> usize {
        assert_eq!(multi.len(), self.dims.len());
        assert!(
            multi
                .iter()
                .zip(&self.dims)
                .all(|(&k, dim)| k < dim.nodes()),
            "multi-index {multi:?} is out of bounds"
        );

        multi
            .iter()
            .zip(&self.strides)
            .map(|(&k, &stride)| k * stride)
            .sum()
    }

    /// Converts a flat row-major index into a multi-index.
    ///
    /// # Panics
    ///
    /// Panics if `flat` is out of bounds.
    #[must_use]
    pub fn multi_index(&self, flat: usize) -> ArrayVec<usize, MAX_DIMENSIONS> {
        assert!(flat < self.total_points);

        let mut remainder = flat;
        self.strides
            .iter()
            .map(|&stride| {
                let k = remainder / stride;
                remainder %= stride;
                k
            })
            .collect()
    }

    /// Returns the coordinates of the grid node with flat index `flat`.
    ///
    /// # Panics
    ///
    /// Panics if `flat` is out of bounds.
    #[must_use]
    pub fn coordinates(&self, flat: usize) -> ArrayVec<f64, MAX_DIMENSIONS> {
        self.multi_index(flat)
            .into_iter()
            .zip(&self.dims)
            .map(|(k, dim)| dim.node(k))
            .collect()
    }

    /// Evaluates `f` once per grid node and stores the results. The order in
    /// which nodes are visited is implementation-defined; `f` must be pure
    /// with respect to caller-visible state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if no dimensions are attached, and
    /// [`Error::PricingEngineFailed`] if `f` produces a non-finite value; in
    /// the latter case the value field is left unpopulated.
    pub fn map_values<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&[f64]) -> f64,
    {
        if self.dims.is_empty() {
            return self
                .ctx
                .fail(Error::NotInitialized("state space has no dimensions".to_owned()));
        }

        self.populated = false;
        self.values = vec![0.0; self.total_points];

        for flat in 0..self.total_points {
            let coords = self.coordinates(flat);
            let value = f(&coords);

            if !value.is_finite() {
                return self.ctx.fail(Error::PricingEngineFailed(format!(
                    "callback returned non-finite value {value} at node {flat}"
                )));
            }

            self.values[flat] = value;
        }

        self.populated = true;

        Ok(())
    }

    /// Returns the stored value at flat index `flat`, or `0.0` if the field
    /// is unpopulated or the index is out of range.
    #[must_use]
    pub fn value(&self, flat: usize) -> f64 {
        if !self.populated {
            return 0.0;
        }

        self.values.get(flat).copied().unwrap_or(0.0)
    }

    /// Multilinearly interpolates the stored field at `point`, clamping each
    /// coordinate to its axis domain. Returns `0.0` if the field is
    /// unpopulated; callers that need to distinguish this from a genuine
    /// zero should check [`Self::is_populated`] first.
    ///
    /// # Panics
    ///
    /// Panics if `point` has the wrong length.
    #[must_use]
    pub fn interpolate(&self, point: &[f64]) -> f64 {
        assert_eq!(point.len(), self.dims.len());

        if !self.populated {
            return 0.0;
        }

        let n = self.dims.len();
        let mut lo: ArrayVec<usize, MAX_DIMENSIONS> = ArrayVec::new();
        let mut hi: ArrayVec<usize, MAX_DIMENSIONS> = ArrayVec::new();
        let mut t: ArrayVec<f64, MAX_DIMENSIONS> = ArrayVec::new();

        for (dim, &x) in self.dims.iter().zip(point) {
            let (k_lo, k_hi, frac) = dim.bracket(x);
            lo.push(k_lo);
            hi.push(k_hi);
            t.push(frac);
        }

        // sum over the 2^n corners of the bracketing cell
        let mut result = 0.0;

        for corner in 0..1_usize << n {
            let mut weight = 1.0;
            let mut flat = 0;

            for d in 0..n {
                let use_hi = (corner >> d) & 1 == 1;
                let k = if use_hi { hi[d] } else { lo[d] };
                weight *= if use_hi { t[d] } else { 1.0 - t[d] };
                flat += k * self.strides[d];
            }

            result += weight * self.values[flat];
        }

        result
    }

    /// Returns the flat index of the grid node with the smallest per-axis
    /// absolute deviation from `point`; ties resolve to the lower index.
    ///
    /// # Panics
    ///
    /// Panics if `point` has the wrong length or no dimensions are attached.
    #[must_use]
    pub fn nearest_index(&self, point: &[f64]) -> usize {
        assert_eq!(point.len(), self.dims.len());
        assert!(!self.dims.is_empty());

        self.dims
            .iter()
            .zip(point)
            .zip(&self.strides)
            .map(|((dim, &x), &stride)| dim.nearest(x) * stride)
            .sum()
    }
}
