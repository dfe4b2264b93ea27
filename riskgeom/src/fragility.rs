//! Fragility scoring: where small perturbations generate large effects.
//!
//! The score composes four normalized views of a point's local geometry:
//! gradient magnitude (first-order sensitivity), curvature magnitude
//! (where linear hedges fail), spectral conditioning (how anisotropic the
//! curvature is) and proximity to a constraint surface. Each component maps
//! to `[0, 1]`, the weighted combination is clamped back to `[0, 1]`, and a
//! full-grid sweep turns the scores into a dense field plus a sparse list
//! of flagged points.

use super::constraint::ConstraintSurface;
use super::context::EngineContext;
use super::convert;
use super::error::{Error, Result};
use super::gradient::Gradient;
use super::hessian::Hessian;
use super::state_space::StateSpace;
use serde::{Deserialize, Serialize};

/// Weights, scales and thresholds of the fragility composition.
///
/// The weights default to `(0.25, 0.30, 0.25, 0.20)` and sum to one; they
/// may be retuned, and the composite stays clamped to `[0, 1]` regardless.
/// `gradient_scale` and `curvature_scale` must be positive and
/// `condition_threshold` must exceed one.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FragilityConfig {
    /// Weight of the gradient component.
    pub gradient_weight: f64,
    /// Weight of the curvature component.
    pub curvature_weight: f64,
    /// Weight of the conditioning component.
    pub condition_weight: f64,
    /// Weight of the constraint-proximity component.
    pub constraint_weight: f64,
    /// Gradient norm that maps to a component value of one half.
    pub gradient_scale: f64,
    /// Curvature Frobenius norm that maps to a component value of one half.
    pub curvature_scale: f64,
    /// Condition number at which the conditioning component saturates.
    pub condition_threshold: f64,
    /// Signed distance below which constraint proximity starts to score.
    pub constraint_threshold: f64,
    /// Composite score at or above which a node is recorded as fragile.
    pub fragility_threshold: f64,
}

impl Default for FragilityConfig {
    fn default() -> Self {
        Self {
            gradient_weight: 0.25,
            curvature_weight: 0.30,
            condition_weight: 0.25,
            constraint_weight: 0.20,
            gradient_scale: 1.0,
            curvature_scale: 1.0,
            condition_threshold: 100.0,
            constraint_threshold: 0.1,
            fragility_threshold: 0.5,
        }
    }
}

impl FragilityConfig {
    /// Maps a gradient norm to `[0, 1)` via `x / (1 + x)` with
    /// `x = norm / gradient_scale`.
    #[must_use]
    pub fn gradient_component(&self, norm: f64) -> f64 {
        let x = norm / self.gradient_scale;
        x / (1.0 + x)
    }

    /// Maps a curvature Frobenius norm to `[0, 1)` via `x / (1 + x)` with
    /// `x = frobenius / curvature_scale`.
    #[must_use]
    pub fn curvature_component(&self, frobenius: f64) -> f64 {
        let x = frobenius / self.curvature_scale;
        x / (1.0 + x)
    }

    /// Maps a condition number to `[0, 1]`: zero below one, then
    /// `ln(condition) / ln(condition_threshold)` clamped to `[0, 1]`.
    #[must_use]
    pub fn conditioning_component(&self, condition: f64) -> f64 {
        if condition < 1.0 {
            return 0.0;
        }

        (condition.ln() / self.condition_threshold.ln()).clamp(0.0, 1.0)
    }

    /// Maps a signed constraint distance to `[0, 1]`: one at or past the
    /// boundary, zero beyond `constraint_threshold`, linear in between.
    #[must_use]
    pub fn constraint_component(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            return 1.0;
        }
        if distance >= self.constraint_threshold {
            return 0.0;
        }

        1.0 - distance / self.constraint_threshold
    }

    /// Combines the four components into the composite score, clamped to
    /// `[0, 1]`.
    #[must_use]
    pub fn combine(&self, gradient: f64, curvature: f64, conditioning: f64, constraint: f64) -> f64 {
        let score = self.gradient_weight.mul_add(
            gradient,
            self.curvature_weight.mul_add(
                curvature,
                self.condition_weight
                    .mul_add(conditioning, self.constraint_weight * constraint),
            ),
        );

        score.clamp(0.0, 1.0)
    }
}

/// Reporting band for a fragility score.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub enum RegionClass {
    /// Score below `0.25`.
    Stable,
    /// Score in `[0.25, 0.50)`.
    Sensitive,
    /// Score in `[0.50, 0.75)`.
    Fragile,
    /// Score of `0.75` or above.
    Critical,
}

impl RegionClass {
    /// Classifies a composite score into its reporting band.
    #[must_use]
    pub fn classify(score: f64) -> Self {
        if score < 0.25 {
            Self::Stable
        } else if score < 0.50 {
            Self::Sensitive
        } else if score < 0.75 {
            Self::Fragile
        } else {
            Self::Critical
        }
    }

    /// Returns the band name in upper case, as used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Sensitive => "SENSITIVE",
            Self::Fragile => "FRAGILE",
            Self::Critical => "CRITICAL",
        }
    }
}

/// A grid node whose composite score reached the fragility threshold,
/// together with the local geometry that produced the score.
#[derive(Clone, Debug)]
pub struct FragilePoint {
    coordinates: Vec<f64>,
    score: f64,
    curvature: f64,
    gradient_norm: f64,
    near_constraint: bool,
}

impl FragilePoint {
    /// Returns the coordinates of the point. The map owns the storage; the
    /// caller receives a borrow.
    #[must_use]
    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    /// Returns the composite fragility score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Returns the curvature proxy (Hessian Frobenius norm).
    #[must_use]
    pub const fn curvature(&self) -> f64 {
        self.curvature
    }

    /// Returns the gradient norm.
    #[must_use]
    pub const fn gradient_norm(&self) -> f64 {
        self.gradient_norm
    }

    /// Returns whether the point sits within the constraint-proximity
    /// threshold of a constraint surface. Sweeps run without a surface
    /// report `false` (unknown).
    #[must_use]
    pub const fn near_constraint(&self) -> bool {
        self.near_constraint
    }

    /// Returns the reporting band of this point's score.
    #[must_use]
    pub fn class(&self) -> RegionClass {
        RegionClass::classify(self.score)
    }
}

/// Dense fragility field over a state space, plus the sparse list of nodes
/// at or above the fragility threshold and aggregate statistics.
pub struct FragilityMap<'a, 'ctx> {
    ctx: &'ctx EngineContext,
    space: &'a StateSpace<'ctx>,
    config: FragilityConfig,
    scores: Vec<f64>,
    points: Vec<FragilePoint>,
    computed: bool,
    max_score: f64,
    mean_score: f64,
    fragile_fraction: f64,
}

impl<'a, 'ctx> FragilityMap<'a, 'ctx> {
    /// Creates a map over `space` with the default configuration.
    #[must_use]
    pub fn new(space: &'a StateSpace<'ctx>) -> Self {
        Self {
            ctx: space.context(),
            space,
            config: FragilityConfig::default(),
            scores: Vec::new(),
            points: Vec::new(),
            computed: false,
            max_score: 0.0,
            mean_score: 0.0,
            fragile_fraction: 0.0,
        }
    }

    /// Returns the current configuration.
    #[must_use]
    pub const fn config(&self) -> &FragilityConfig {
        &self.config
    }

    /// Replaces the configuration. Does not invalidate an already computed
    /// field; recompute to apply.
    pub fn set_config(&mut self, config: FragilityConfig) {
        self.config = config;
    }

    /// Sweeps every grid node, scoring local geometry without constraint
    /// information; the constraint component is zero and the
    /// near-constraint flag of recorded points is `false` (unknown).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the space's value field has not
    /// been mapped. Per-node gradient or Hessian failures are swallowed:
    /// the node scores zero and the sweep continues.
    pub fn compute(&mut self) -> Result<()> {
        self.sweep(None)
    }

    /// Like [`Self::compute`], but joins `constraints`: the constraint
    /// component enters each node's score and the near-constraint flag is
    /// evaluated for real.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the space's value field has not
    /// been mapped.
    pub fn compute_with_constraints(&mut self, constraints: &ConstraintSurface<'_>) -> Result<()> {
        self.sweep(Some(constraints))
    }

    fn sweep(&mut self, constraints: Option<&ConstraintSurface<'_>>) -> Result<()> {
        if !self.space.is_populated() {
            return self
                .ctx
                .fail(Error::NotInitialized("state space values not mapped".to_owned()));
        }

        let total = self.space.total_points();
        let n = self.space.num_dimensions();

        self.scores = vec![0.0; total];
        self.points.clear();
        self.computed = false;
        self.max_score = 0.0;

        let mut grad = Gradient::new(self.ctx, n)?;
        let mut hess = Hessian::new(self.ctx, n)?;

        let mut sum = 0.0;
        let mut fragile = 0_usize;

        for flat in 0..total {
            let coords = self.space.coordinates(flat);

            // a pathological node must not abort the sweep; it simply
            // scores zero
            if grad.compute(self.space, &coords).is_err() {
                continue;
            }
            if hess.compute(self.space, &coords).is_err() {
                continue;
            }

            let gradient_norm = grad.norm();
            let frobenius = hess.frobenius_norm();
            let condition = hess.condition_number();

            let (constraint_component, near_constraint) = constraints.map_or((0.0, false), |s| {
                let distance = s.min_signed_distance(&coords);
                (
                    self.config.constraint_component(distance),
                    distance < self.config.constraint_threshold,
                )
            });

            let score = self.config.combine(
                self.config.gradient_component(gradient_norm),
                self.config.curvature_component(frobenius),
                self.config.conditioning_component(condition),
                constraint_component,
            );

            self.scores[flat] = score;
            sum += score;
            if score > self.max_score {
                self.max_score = score;
            }

            if score >= self.config.fragility_threshold {
                fragile += 1;
                self.points.push(FragilePoint {
                    coordinates: coords.to_vec(),
                    score,
                    curvature: frobenius,
                    gradient_norm,
                    near_constraint,
                });
            }
        }

        if total > 0 {
            self.mean_score = sum / convert::f64_from_usize(total);
            self.fragile_fraction = convert::f64_from_usize(fragile) / convert::f64_from_usize(total);
        } else {
            self.mean_score = 0.0;
            self.fragile_fraction = 0.0;
        }

        self.computed = true;

        Ok(())
    }

    /// Scores a single point, optionally against a constraint surface, with
    /// full error reporting instead of the sweep's swallow-and-continue.
    ///
    /// # Errors
    ///
    /// Propagates gradient and Hessian computation failures.
    pub fn score_point(
        &self,
        point: &[f64],
        constraints: Option<&ConstraintSurface<'_>>,
    ) -> Result<FragilePoint> {
        let n = self.space.num_dimensions();

        let mut grad = Gradient::new(self.ctx, n)?;
        let mut hess = Hessian::new(self.ctx, n)?;

        grad.compute(self.space, point)?;
        hess.compute(self.space, point)?;

        let gradient_norm = grad.norm();
        let frobenius = hess.frobenius_norm();
        let condition = hess.condition_number();

        let (constraint_component, near_constraint) = constraints.map_or((0.0, false), |s| {
            let distance = s.min_signed_distance(point);
            (
                self.config.constraint_component(distance),
                distance < self.config.constraint_threshold,
            )
        });

        let score = self.config.combine(
            self.config.gradient_component(gradient_norm),
            self.config.curvature_component(frobenius),
            self.config.conditioning_component(condition),
            constraint_component,
        );

        Ok(FragilePoint {
            coordinates: point.to_vec(),
            score,
            curvature: frobenius,
            gradient_norm,
            near_constraint,
        })
    }

    /// Returns whether a sweep has completed.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        self.computed
    }

    /// Returns the dense score field, one entry per grid node; empty until
    /// a sweep completes.
    #[must_use]
    pub fn scores(&self) -> &[f64] {
        if self.computed { &self.scores } else { &[] }
    }

    /// Returns the score at the grid node nearest to `coords`, or `0.0`
    /// before a sweep completes.
    ///
    /// # Panics
    ///
    /// Panics if `coords` has the wrong length for the underlying space.
    #[must_use]
    pub fn score_at(&self, coords: &[f64]) -> f64 {
        if !self.computed {
            return 0.0;
        }

        let flat = self.space.nearest_index(coords);
        self.scores.get(flat).copied().unwrap_or(0.0)
    }

    /// Returns the recorded fragile points, in sweep order.
    #[must_use]
    pub fn points(&self) -> &[FragilePoint] {
        &self.points
    }

    /// Returns the maximum score seen by the last sweep.
    #[must_use]
    pub const fn max_score(&self) -> f64 {
        self.max_score
    }

    /// Returns the mean score over all grid nodes.
    #[must_use]
    pub const fn mean_score(&self) -> f64 {
        self.mean_score
    }

    /// Returns the fraction of grid nodes at or above the fragility
    /// threshold.
    #[must_use]
    pub const fn fragile_fraction(&self) -> f64 {
        self.fragile_fraction
    }
}
