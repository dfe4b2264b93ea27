//! Constraint surfaces: the boundaries of the admissible state space.
//!
//! Constraints represent limitations that pricing models ignore: position
//! and regulatory limits, margin floors, liquidity ceilings. Near a
//! constraint boundary the geometry of risk changes abruptly, so the
//! [`fragility`](super::fragility) scorer treats proximity to a surface as a
//! risk component in its own right. The signed distance convention is
//! positive inside the admissible set, zero on the boundary and negative
//! outside.

use super::context::EngineContext;
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of constraints a surface can own.
pub const MAX_CONSTRAINTS: usize = 64;

/// Default tolerance for equality constraints.
pub const DEFAULT_EQUALITY_TOLERANCE: f64 = 1e-10;

/// Default penalty rate applied to violated soft constraints.
const DEFAULT_PENALTY_RATE: f64 = 10.0;

/// Informational tag describing what a constraint models.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConstraintKind {
    /// Bid-ask spread or market depth threshold.
    Liquidity,
    /// Maximum position size.
    PositionLimit,
    /// Margin or collateral requirement.
    Margin,
    /// Regulatory limit.
    Regulatory,
    /// User-defined constraint.
    Custom,
}

/// How strictly a constraint binds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Hardness {
    /// Crossing the boundary is inadmissible.
    Hard,
    /// Crossing the boundary accrues a penalty proportional to the depth of
    /// the violation.
    Soft,
    /// The boundary itself moves with market state; treated like `Soft` by
    /// the queries here.
    Dynamic,
}

/// Which side of the threshold is admissible.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    /// Values above the threshold violate.
    Upper,
    /// Values below the threshold violate.
    Lower,
    /// Values away from the threshold (beyond the tolerance) violate.
    Equality,
}

/// What a constraint evaluates at a query coordinate.
enum Evaluator {
    /// The coordinate of a single axis.
    Dimension(usize),
    /// A user-supplied function of the full coordinate vector.
    Custom(Box<dyn Fn(&[f64]) -> f64>),
}

/// A single admissibility condition.
pub struct Constraint {
    kind: ConstraintKind,
    name: String,
    active: bool,
    evaluator: Evaluator,
    direction: Direction,
    threshold: f64,
    hardness: Hardness,
    penalty_rate: f64,
    tolerance: f64,
}

impl Constraint {
    /// Creates a constraint bounding the coordinate of axis `dimension`.
    #[must_use]
    pub fn on_dimension(
        kind: ConstraintKind,
        name: impl Into<String>,
        dimension: usize,
        direction: Direction,
        threshold: f64,
        hardness: Hardness,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            active: true,
            evaluator: Evaluator::Dimension(dimension),
            direction,
            threshold,
            hardness,
            penalty_rate: DEFAULT_PENALTY_RATE,
            tolerance: DEFAULT_EQUALITY_TOLERANCE,
        }
    }

    /// Creates a constraint bounding the value of a user-supplied function
    /// of the full coordinate vector.
    #[must_use]
    pub fn with_evaluator(
        kind: ConstraintKind,
        name: impl Into<String>,
        evaluator: impl Fn(&[f64]) -> f64 + 'static,
        direction: Direction,
        threshold: f64,
        hardness: Hardness,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            active: true,
            evaluator: Evaluator::Custom(Box::new(evaluator)),
            direction,
            threshold,
            hardness,
            penalty_rate: DEFAULT_PENALTY_RATE,
            tolerance: DEFAULT_EQUALITY_TOLERANCE,
        }
    }

    /// Returns the informational kind.
    #[must_use]
    pub const fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the constraint participates in surface queries.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables the constraint.
    pub const fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Returns the admissibility direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the hardness.
    #[must_use]
    pub const fn hardness(&self) -> Hardness {
        self.hardness
    }

    /// Returns the soft penalty rate.
    #[must_use]
    pub const fn penalty_rate(&self) -> f64 {
        self.penalty_rate
    }

    /// Sets the penalty rate accrued per unit of soft violation depth.
    pub const fn set_penalty_rate(&mut self, rate: f64) {
        self.penalty_rate = rate;
    }

    /// Returns the equality tolerance.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Sets the equality tolerance.
    pub const fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Evaluates the constrained quantity at `coords`. A dimension-bound
    /// constraint whose axis is out of range evaluates to `0.0`.
    #[must_use]
    pub fn evaluate(&self, coords: &[f64]) -> f64 {
        match &self.evaluator {
            Evaluator::Dimension(d) => coords.get(*d).copied().unwrap_or(0.0),
            Evaluator::Custom(f) => f(coords),
        }
    }

    /// Returns whether `coords` violates this constraint. Inactive
    /// constraints never violate.
    #[must_use]
    pub fn is_violated(&self, coords: &[f64]) -> bool {
        if !self.active {
            return false;
        }

        let value = self.evaluate(coords);

        match self.direction {
            Direction::Upper => value > self.threshold,
            Direction::Lower => value < self.threshold,
            Direction::Equality => (value - self.threshold).abs() > self.tolerance,
        }
    }

    /// Returns the signed distance of `coords` to this constraint's
    /// boundary: positive when satisfied, zero on the boundary, negative
    /// when violated.
    #[must_use]
    pub fn signed_distance(&self, coords: &[f64]) -> f64 {
        let value = self.evaluate(coords);

        match self.direction {
            Direction::Upper => self.threshold - value,
            Direction::Lower => value - self.threshold,
            Direction::Equality => self.tolerance - (value - self.threshold).abs(),
        }
    }
}

/// An ordered collection of up to [`MAX_CONSTRAINTS`] constraints forming
/// the admissible region of the state space.
pub struct ConstraintSurface<'ctx> {
    ctx: &'ctx EngineContext,
    constraints: Vec<Constraint>,
}

impl<'ctx> ConstraintSurface<'ctx> {
    /// Creates an empty surface borrowing `ctx`.
    #[must_use]
    pub const fn new(ctx: &'ctx EngineContext) -> Self {
        Self {
            ctx,
            constraints: Vec::new(),
        }
    }

    /// Appends `constraint` to the surface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the surface already owns
    /// [`MAX_CONSTRAINTS`] constraints.
    pub fn push(&mut self, constraint: Constraint) -> Result<()> {
        if self.constraints.len() >= MAX_CONSTRAINTS {
            return self.ctx.fail(Error::InvalidArgument(format!(
                "constraint surface is limited to {MAX_CONSTRAINTS} constraints"
            )));
        }

        self.constraints.push(constraint);

        Ok(())
    }

    /// Returns the number of owned constraints, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns whether the surface owns no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Returns the constraint at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Constraint> {
        self.constraints.get(index)
    }

    /// Returns the constraint at `index` mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Constraint> {
        self.constraints.get_mut(index)
    }

    fn active(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_active())
    }

    /// Returns whether any active constraint is violated at `coords`.
    #[must_use]
    pub fn is_violated(&self, coords: &[f64]) -> bool {
        self.active().any(|c| c.is_violated(coords))
    }

    /// Returns whether any active *hard* constraint is violated at `coords`.
    #[must_use]
    pub fn any_hard_violation(&self, coords: &[f64]) -> bool {
        self.active()
            .filter(|c| c.hardness() == Hardness::Hard)
            .any(|c| c.is_violated(coords))
    }

    /// Returns the minimum signed distance over all active constraints, or
    /// positive infinity if none are active.
    #[must_use]
    pub fn min_signed_distance(&self, coords: &[f64]) -> f64 {
        self.active()
            .map(|c| c.signed_distance(coords))
            .fold(f64::INFINITY, f64::min)
    }

    /// Returns the index of the most binding active constraint (smallest
    /// signed distance), or `None` if none are active.
    #[must_use]
    pub fn most_binding(&self, coords: &[f64]) -> Option<usize> {
        let mut best = None;
        let mut best_distance = f64::INFINITY;

        for (index, constraint) in self.constraints.iter().enumerate() {
            if !constraint.is_active() {
                continue;
            }

            let distance = constraint.signed_distance(coords);
            if distance < best_distance {
                best_distance = distance;
                best = Some(index);
            }
        }

        best
    }

    /// Returns the total penalty accrued by violated active soft and
    /// dynamic constraints: the sum of `penalty_rate * violation_depth`.
    #[must_use]
    pub fn soft_penalty(&self, coords: &[f64]) -> f64 {
        self.active()
            .filter(|c| c.hardness() != Hardness::Hard)
            .map(|c| c.penalty_rate() * (-c.signed_distance(coords)).max(0.0))
            .sum()
    }
}
