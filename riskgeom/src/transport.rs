//! Transport metric: the cost of moving between states.
//!
//! Standard risk measures treat every movement through state space equally.
//! In practice selling into illiquidity, carrying funding constraints or
//! unwinding concentrated positions makes some paths far more expensive
//! than their Euclidean length suggests. A [`TransportMetric`] encodes those
//! frictions as a sampled Riemannian metric tensor field
//! `ds^2 = sum_ij g_ij(x) dx_i dx_j`; path costs are line integrals of the
//! local length element.

use super::context::EngineContext;
use super::error::{Error, Result};
use super::state_space::MAX_DIMENSIONS;
use itertools::izip;
use ndarray::Array2;

/// Maximum number of tensor samples a metric can own.
pub const MAX_METRIC_SAMPLES: usize = 1024;

/// Number of sub-intervals used by the geodesic line integral.
pub const GEODESIC_STEPS: usize = 100;

/// Softening added to sample distances in inverse-distance weights.
const IDW_EPSILON: f64 = 1e-10;

/// A metric tensor observed at one location of the state space.
///
/// The tensor is assumed symmetric positive-definite; the library does not
/// validate this, but semi-definite input degrades gracefully (costs clamp
/// at zero instead of producing NaN).
pub struct MetricSample {
    coordinates: Vec<f64>,
    tensor: Array2<f64>,
}

impl MetricSample {
    /// Returns the location of this sample.
    #[must_use]
    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    /// Returns the sampled tensor.
    #[must_use]
    pub const fn tensor(&self) -> &Array2<f64> {
        &self.tensor
    }
}

/// Evaluates the quadratic form `v^T G v`.
fn quadratic_form(tensor: &Array2<f64>, v: &[f64]) -> f64 {
    let mut result = 0.0;

    for (i, &vi) in v.iter().enumerate() {
        for (j, &vj) in v.iter().enumerate() {
            result += vi * tensor[[i, j]] * vj;
        }
    }

    result
}

/// Length of displacement `v` under `tensor`, clamped at zero for
/// semi-definite input.
fn metric_length(tensor: &Array2<f64>, v: &[f64]) -> f64 {
    quadratic_form(tensor, v).max(0.0).sqrt()
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Sampled symmetric positive-definite tensor field with inverse-distance
/// interpolation and an approximate geodesic distance.
pub struct TransportMetric<'ctx> {
    ctx: &'ctx EngineContext,
    num_dims: usize,
    samples: Vec<MetricSample>,
    default_tensor: Option<Array2<f64>>,
    interpolation_radius: f64,
}

impl<'ctx> TransportMetric<'ctx> {
    /// Creates an empty metric borrowing `ctx`. The dimension count is
    /// fixed by the first sample or default tensor.
    #[must_use]
    pub const fn new(ctx: &'ctx EngineContext) -> Self {
        Self {
            ctx,
            num_dims: 0,
            samples: Vec::new(),
            default_tensor: None,
            interpolation_radius: 0.0,
        }
    }

    /// Returns the dimension count, or `0` while the metric is empty.
    #[must_use]
    pub const fn num_dimensions(&self) -> usize {
        self.num_dims
    }

    /// Returns the number of stored samples.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Returns the stored samples.
    #[must_use]
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Returns the interpolation radius; `0` means every sample contributes
    /// everywhere.
    #[must_use]
    pub const fn interpolation_radius(&self) -> f64 {
        self.interpolation_radius
    }

    /// Sets the interpolation radius. Non-positive values mean global
    /// interpolation.
    pub fn set_interpolation_radius(&mut self, radius: f64) {
        self.interpolation_radius = if radius > 0.0 { radius } else { 0.0 };
    }

    fn check_dims(&mut self, found: usize) -> Result<()> {
        if found == 0 || found > MAX_DIMENSIONS {
            return self.ctx.fail(Error::InvalidArgument(format!(
                "metric dimension count must be in [1, {MAX_DIMENSIONS}], got {found}"
            )));
        }

        if self.num_dims == 0 {
            self.num_dims = found;
            return Ok(());
        }

        if found != self.num_dims {
            return self.ctx.fail(Error::DimensionMismatch {
                expected: self.num_dims,
                found,
            });
        }

        Ok(())
    }

    /// Records the metric tensor observed at `coordinates`. The first
    /// sample fixes the metric's dimension count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the tensor is not square with
    /// the coordinate length, if the dimension count is unsupported, or if
    /// [`MAX_METRIC_SAMPLES`] samples are already stored;
    /// [`Error::DimensionMismatch`] if the sample disagrees with the fixed
    /// dimension count.
    pub fn add_sample(&mut self, coordinates: &[f64], tensor: Array2<f64>) -> Result<()> {
        if tensor.nrows() != coordinates.len() || tensor.ncols() != coordinates.len() {
            return self.ctx.fail(Error::InvalidArgument(format!(
                "tensor shape {:?} does not match {} coordinates",
                tensor.shape(),
                coordinates.len()
            )));
        }
        if self.samples.len() >= MAX_METRIC_SAMPLES {
            return self.ctx.fail(Error::InvalidArgument(format!(
                "transport metric is limited to {MAX_METRIC_SAMPLES} samples"
            )));
        }

        self.check_dims(coordinates.len())?;

        self.samples.push(MetricSample {
            coordinates: coordinates.to_vec(),
            tensor,
        });

        Ok(())
    }

    /// Sets the tensor used where no samples contribute. Fixes the
    /// dimension count if no sample has done so yet. Without a default the
    /// identity is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `tensor` is not square with a
    /// supported dimension count, or [`Error::DimensionMismatch`] if it
    /// disagrees with the fixed dimension count.
    pub fn set_default_tensor(&mut self, tensor: Array2<f64>) -> Result<()> {
        if tensor.nrows() != tensor.ncols() {
            return self.ctx.fail(Error::InvalidArgument(format!(
                "default tensor must be square, got {:?}",
                tensor.shape()
            )));
        }

        self.check_dims(tensor.nrows())?;

        self.default_tensor = Some(tensor);

        Ok(())
    }

    fn default_tensor(&self) -> Array2<f64> {
        self.default_tensor
            .clone()
            .unwrap_or_else(|| Array2::eye(self.num_dims))
    }

    /// Interpolates the tensor field at `coordinates` by inverse-distance
    /// weighting with exponent two. Samples outside a non-zero
    /// interpolation radius are skipped; if nothing contributes the default
    /// tensor (identity when unset) is returned.
    ///
    /// # Panics
    ///
    /// Panics if the metric is empty or `coordinates` has the wrong length.
    #[must_use]
    pub fn tensor_at(&self, coordinates: &[f64]) -> Array2<f64> {
        assert!(self.num_dims > 0, "metric dimension count not fixed yet");
        assert_eq!(coordinates.len(), self.num_dims);

        let mut accumulated = Array2::zeros((self.num_dims, self.num_dims));
        let mut total_weight = 0.0;

        for sample in &self.samples {
            let distance = euclidean_distance(coordinates, &sample.coordinates);

            if self.interpolation_radius > 0.0 && distance > self.interpolation_radius {
                continue;
            }

            let weight = ((distance + IDW_EPSILON) * (distance + IDW_EPSILON)).recip();
            total_weight += weight;
            accumulated.scaled_add(weight, &sample.tensor);
        }

        if total_weight > 0.0 {
            accumulated /= total_weight;
            accumulated
        } else {
            self.default_tensor()
        }
    }

    /// Approximates the geodesic distance from `a` to `b`: the straight
    /// segment is split into [`GEODESIC_STEPS`] sub-intervals and the local
    /// length element is evaluated at each midpoint. Exact for a constant
    /// field, first-order accurate for slowly varying fields; no
    /// boundary-value solve is attempted.
    ///
    /// An empty metric (dimension count not fixed) falls back to the
    /// Euclidean distance, which is the sentinel used by callers without a
    /// friction model.
    ///
    /// # Panics
    ///
    /// Panics if `a` and `b` have different lengths.
    #[must_use]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());

        if self.num_dims == 0 {
            return euclidean_distance(a, b);
        }
        if a.len() != self.num_dims {
            return 0.0;
        }

        let steps = super::convert::f64_from_usize(GEODESIC_STEPS);
        let delta: Vec<f64> = izip!(a, b).map(|(x, y)| (y - x) / steps).collect();

        let mut midpoint = vec![0.0; self.num_dims];
        let mut total = 0.0;

        for s in 0..GEODESIC_STEPS {
            let offset = super::convert::f64_from_usize(s) + 0.5;

            for (m, &start, &d) in izip!(&mut midpoint, a, &delta) {
                *m = offset.mul_add(d, start);
            }

            total += metric_length(&self.tensor_at(&midpoint), &delta);
        }

        total
    }

    /// Local cost `sqrt(v^T G(c) v)` of displacement `v` at `coordinates`.
    /// Returns `0.0` for an empty metric or mismatched lengths.
    #[must_use]
    pub fn local_cost(&self, coordinates: &[f64], displacement: &[f64]) -> f64 {
        if self.num_dims == 0
            || coordinates.len() != self.num_dims
            || displacement.len() != self.num_dims
        {
            return 0.0;
        }

        metric_length(&self.tensor_at(coordinates), displacement)
    }

    /// Total cost of a polyline: the sum of pairwise geodesic distances
    /// between consecutive waypoints. Fewer than two waypoints cost `0.0`.
    #[must_use]
    pub fn path_cost(&self, waypoints: &[Vec<f64>]) -> f64 {
        waypoints
            .windows(2)
            .map(|pair| self.distance(&pair[0], &pair[1]))
            .sum()
    }

    /// Ratio of transport distance to Euclidean distance from `a` to `b`.
    /// A ratio above one means the path is expensive relative to its
    /// length; degenerate inputs (coincident endpoints) report `1.0`.
    #[must_use]
    pub fn friction_ratio(&self, a: &[f64], b: &[f64]) -> f64 {
        let euclidean = euclidean_distance(a, b);

        if euclidean < 1e-15 {
            return 1.0;
        }

        self.distance(a, b) / euclidean
    }

    /// Builds a diagonal tensor from per-axis liquidity scores: higher
    /// liquidity means cheaper movement, so each diagonal entry is the
    /// reciprocal of the score (capped for vanishing liquidity).
    #[must_use]
    pub fn tensor_from_liquidity(liquidity: &[f64]) -> Array2<f64> {
        Array2::from_diag(
            &liquidity
                .iter()
                .map(|&liq| if liq > 1e-10 { liq.recip() } else { 1e10 })
                .collect::<ndarray::Array1<f64>>(),
        )
    }

    /// Builds a diagonal tensor from market-impact coefficients: movement
    /// along axis `i` costs `1 + impact_i * |position_i|` per unit.
    ///
    /// # Panics
    ///
    /// Panics if `positions` and `impact` have different lengths.
    #[must_use]
    pub fn tensor_from_impact(positions: &[f64], impact: &[f64]) -> Array2<f64> {
        assert_eq!(positions.len(), impact.len());

        Array2::from_diag(
            &izip!(positions, impact)
                .map(|(&pos, &coeff)| coeff.mul_add(pos.abs(), 1.0))
                .collect::<ndarray::Array1<f64>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use ndarray::arr2;

    #[test]
    fn empty_metric_falls_back_to_euclidean() {
        let ctx = EngineContext::new();
        let metric = TransportMetric::new(&ctx);

        assert_approx_eq!(
            f64,
            metric.distance(&[0.0, 0.0], &[3.0, 4.0]),
            5.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn identity_sample_reproduces_euclidean_distance() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric.add_sample(&[0.0, 0.0], Array2::eye(2)).unwrap();

        assert_approx_eq!(
            f64,
            metric.distance(&[0.0, 0.0], &[3.0, 4.0]),
            5.0,
            epsilon = 1e-9
        );
        assert_eq!(metric.num_dimensions(), 2);
    }

    #[test]
    fn constant_diagonal_metric_scales_axes() {
        // doubling cost along x only: ds^2 = 4 dx^2 + dy^2
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric
            .add_sample(&[0.0, 0.0], arr2(&[[4.0, 0.0], [0.0, 1.0]]))
            .unwrap();

        assert_approx_eq!(f64, metric.distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0, epsilon = 1e-9);
        assert_approx_eq!(f64, metric.distance(&[0.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn interpolation_blends_samples_by_proximity() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric.add_sample(&[0.0], arr2(&[[1.0]])).unwrap();
        metric.add_sample(&[10.0], arr2(&[[9.0]])).unwrap();

        // midway the inverse-square weights are equal
        let mid = metric.tensor_at(&[5.0]);
        assert_approx_eq!(f64, mid[[0, 0]], 5.0, epsilon = 1e-6);

        // close to a sample its tensor dominates
        let near = metric.tensor_at(&[0.001]);
        assert!(near[[0, 0]] < 1.01);
    }

    #[test]
    fn radius_excludes_distant_samples() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric.add_sample(&[0.0], arr2(&[[9.0]])).unwrap();
        metric.set_interpolation_radius(1.0);

        // inside the radius the sample contributes
        assert_approx_eq!(f64, metric.tensor_at(&[0.5])[[0, 0]], 9.0, epsilon = 1e-6);

        // outside it the default (identity) applies
        assert_approx_eq!(f64, metric.tensor_at(&[5.0])[[0, 0]], 1.0, ulps = 2);
    }

    #[test]
    fn default_tensor_applies_where_nothing_contributes() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric.set_default_tensor(arr2(&[[16.0]])).unwrap();

        // no samples at all: the default governs the whole field
        assert_approx_eq!(f64, metric.distance(&[0.0], &[1.0]), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn mismatched_sample_dimensions_are_rejected() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric.add_sample(&[0.0, 0.0], Array2::eye(2)).unwrap();

        assert!(metric.add_sample(&[0.0], Array2::eye(1)).is_err());
        assert!(metric.add_sample(&[0.0, 0.0], Array2::eye(3)).is_err());
    }

    #[test]
    fn sample_capacity_is_enforced() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);

        for i in 0..MAX_METRIC_SAMPLES {
            let x = crate::convert::f64_from_usize(i);
            metric.add_sample(&[x], arr2(&[[1.0]])).unwrap();
        }

        assert!(metric.add_sample(&[-1.0], arr2(&[[1.0]])).is_err());
        assert_eq!(metric.num_samples(), MAX_METRIC_SAMPLES);
    }

    #[test]
    fn semi_definite_input_does_not_produce_nan() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        // rank-one tensor: displacements along (1, -1) have zero length
        metric
            .add_sample(&[0.0, 0.0], arr2(&[[1.0, 1.0], [1.0, 1.0]]))
            .unwrap();

        let cost = metric.local_cost(&[0.0, 0.0], &[1.0, -1.0]);
        assert!(cost.is_finite());
        assert_eq!(cost, 0.0);

        let distance = metric.distance(&[0.0, 0.0], &[1.0, -1.0]);
        assert!(distance.is_finite());
    }

    #[test]
    fn path_cost_sums_segment_distances() {
        let ctx = EngineContext::new();
        let metric = TransportMetric::new(&ctx);

        let path = vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![3.0, 8.0]];
        assert_approx_eq!(f64, metric.path_cost(&path), 9.0, epsilon = 1e-9);
        assert_eq!(metric.path_cost(&path[..1]), 0.0);
    }

    #[test]
    fn friction_ratio_reads_relative_cost() {
        let ctx = EngineContext::new();
        let mut metric = TransportMetric::new(&ctx);
        metric.add_sample(&[0.0], arr2(&[[4.0]])).unwrap();

        assert_approx_eq!(f64, metric.friction_ratio(&[0.0], &[1.0]), 2.0, epsilon = 1e-6);
        assert_approx_eq!(f64, metric.friction_ratio(&[0.5], &[0.5]), 1.0, ulps = 2);
    }

    #[test]
    fn liquidity_tensor_inverts_scores() {
        let tensor = TransportMetric::tensor_from_liquidity(&[2.0, 0.5, 0.0]);

        assert_approx_eq!(f64, tensor[[0, 0]], 0.5, ulps = 2);
        assert_approx_eq!(f64, tensor[[1, 1]], 2.0, ulps = 2);
        assert_approx_eq!(f64, tensor[[2, 2]], 1e10, ulps = 2);
        assert_eq!(tensor[[0, 1]], 0.0);
    }

    #[test]
    fn impact_tensor_grows_with_position() {
        let tensor = TransportMetric::tensor_from_impact(&[10.0, -4.0], &[0.1, 0.5]);

        assert_approx_eq!(f64, tensor[[0, 0]], 2.0, ulps = 2);
        assert_approx_eq!(f64, tensor[[1, 1]], 3.0, ulps = 2);
    }
}
