#![allow(missing_docs)]

//! End-to-end scenarios against surfaces with closed-form geometry.

use float_cmp::assert_approx_eq;
use ndarray::arr2;
use riskgeom::constraint::{Constraint, ConstraintKind, ConstraintSurface, Direction, Hardness};
use riskgeom::context::EngineContext;
use riskgeom::error::ErrorCode;
use riskgeom::fragility::FragilityMap;
use riskgeom::gradient::Gradient;
use riskgeom::hessian::Hessian;
use riskgeom::jacobi;
use riskgeom::state_space::{Dimension, DimensionKind, StateSpace};
use riskgeom::transport::TransportMetric;

fn plane(ctx: &EngineContext, lower: f64, upper: f64, nodes: usize) -> StateSpace<'_> {
    let mut space = StateSpace::new(ctx);
    space
        .add_dimension(Dimension::new(DimensionKind::Spot, "x", lower, upper, nodes).unwrap())
        .unwrap();
    space
        .add_dimension(Dimension::new(DimensionKind::Volatility, "y", lower, upper, nodes).unwrap())
        .unwrap();
    space
}

#[test]
fn gradient_of_squared_norm_in_two_dimensions() {
    let ctx = EngineContext::new();
    let mut space = plane(&ctx, -5.0, 5.0, 21);
    space.map_values(|c| c[0] * c[0] + c[1] * c[1]).unwrap();

    let mut grad = Gradient::new(&ctx, 2).unwrap();
    grad.compute(&space, &[2.0, 3.0]).unwrap();

    assert_approx_eq!(f64, grad.partial(0), 4.0, epsilon = 0.1);
    assert_approx_eq!(f64, grad.partial(1), 6.0, epsilon = 0.1);
    assert_approx_eq!(f64, grad.norm(), 52.0_f64.sqrt(), epsilon = 0.2);
}

#[test]
fn hessian_of_squared_norm_in_two_dimensions() {
    let ctx = EngineContext::new();
    let mut space = plane(&ctx, -5.0, 5.0, 21);
    space.map_values(|c| c[0] * c[0] + c[1] * c[1]).unwrap();

    let mut hess = Hessian::new(&ctx, 2).unwrap();
    hess.compute(&space, &[2.0, 3.0]).unwrap();

    assert_approx_eq!(f64, hess.entry(0, 0), 2.0, epsilon = 0.2);
    assert_approx_eq!(f64, hess.entry(1, 1), 2.0, epsilon = 0.2);
    assert_approx_eq!(f64, hess.entry(0, 1), 0.0, epsilon = 0.2);
    assert_approx_eq!(f64, hess.entry(1, 0), 0.0, epsilon = 0.2);
    assert_approx_eq!(f64, hess.trace(), 4.0, epsilon = 0.4);
    assert_approx_eq!(f64, hess.frobenius_norm(), 8.0_f64.sqrt(), epsilon = 0.5);

    let eigenvalues = hess.eigenvalues().unwrap();
    assert_approx_eq!(f64, eigenvalues[0], 2.0, epsilon = 0.2);
    assert_approx_eq!(f64, eigenvalues[1], 2.0, epsilon = 0.2);
}

#[test]
fn linear_field_calibration() {
    // f(x) = a.x + b: the central-difference gradient recovers a exactly up
    // to rounding and the Hessian vanishes
    let ctx = EngineContext::new();
    let mut space = plane(&ctx, 0.0, 4.0, 9);
    space
        .map_values(|c| 1.5_f64.mul_add(c[0], (-2.5_f64).mul_add(c[1], 0.75)))
        .unwrap();

    let mut grad = Gradient::new(&ctx, 2).unwrap();
    grad.compute(&space, &[1.3, 2.7]).unwrap();
    assert_approx_eq!(f64, grad.partial(0), 1.5, epsilon = 1e-6);
    assert_approx_eq!(f64, grad.partial(1), -2.5, epsilon = 1e-6);

    let mut hess = Hessian::new(&ctx, 2).unwrap();
    hess.compute(&space, &[2.0, 2.0]).unwrap();
    for i in 0..2 {
        for j in 0..2 {
            assert_approx_eq!(f64, hess.entry(i, j), 0.0, epsilon = 1e-6);
        }
    }
}

#[test]
fn transport_distance_with_empty_metric() {
    let ctx = EngineContext::new();
    let metric = TransportMetric::new(&ctx);

    assert_approx_eq!(f64, metric.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0, epsilon = 0.1);
}

#[test]
fn constraint_signed_distance_around_the_threshold() {
    let ctx = EngineContext::new();
    let mut surface = ConstraintSurface::new(&ctx);
    surface
        .push(Constraint::on_dimension(
            ConstraintKind::PositionLimit,
            "limit",
            0,
            Direction::Upper,
            10.0,
            Hardness::Hard,
        ))
        .unwrap();

    assert_approx_eq!(f64, surface.min_signed_distance(&[9.0, -3.0]), 1.0, ulps = 2);
    assert_approx_eq!(
        f64,
        surface.min_signed_distance(&[10.0, 7.0]),
        0.0,
        epsilon = 1e-12
    );
    assert_approx_eq!(f64, surface.min_signed_distance(&[11.0, 0.0]), -1.0, ulps = 2);
}

#[test]
fn fragility_of_a_linear_surface_stays_below_threshold() {
    let ctx = EngineContext::new();
    let mut space = plane(&ctx, 0.0, 10.0, 11);
    space.map_values(|c| 3.0_f64.mul_add(c[0], 4.0 * c[1])).unwrap();

    let mut map = FragilityMap::new(&space);
    map.compute().unwrap();

    // in the interior: gradient norm 5 with scale 1 contributes
    // 0.25 * 5/6, everything else is zero
    let expected = 0.25 * (5.0 / 6.0);
    let interior = space.flat_index(&[5, 5]);
    assert_approx_eq!(f64, map.scores()[interior], expected, epsilon = 0.02);

    assert!(map.points().is_empty());
    assert_eq!(map.fragile_fraction(), 0.0);
    assert!(map.max_score() < 0.5);
}

#[test]
fn jacobi_on_a_diagonal_three_by_three() {
    let m = arr2(&[[4.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]]);
    let eigenvalues = jacobi::symmetric_eigenvalues(m.view()).unwrap();

    assert_approx_eq!(f64, eigenvalues[0], 4.0, epsilon = 1e-10);
    assert_approx_eq!(f64, eigenvalues[1], 2.0, epsilon = 1e-10);
    assert_approx_eq!(f64, eigenvalues[2], 1.0, epsilon = 1e-10);
}

#[test]
fn quadratic_form_full_pipeline() {
    // f(x) = x^T Q x + a.x with Q = [[2, 0.5], [0.5, 1]], a = (1, -1)
    let ctx = EngineContext::new();
    let mut space = plane(&ctx, -2.0, 2.0, 41);
    space
        .map_values(|c| {
            2.0 * c[0] * c[0] + c[0] * c[1] + c[1] * c[1] + c[0] - c[1]
        })
        .unwrap();

    let mut hess = Hessian::new(&ctx, 2).unwrap();
    hess.compute(&space, &[0.5, -0.5]).unwrap();

    // Hessian of a quadratic is 2Q everywhere
    assert_approx_eq!(f64, hess.entry(0, 0), 4.0, epsilon = 0.05);
    assert_approx_eq!(f64, hess.entry(0, 1), 1.0, epsilon = 0.05);
    assert_approx_eq!(f64, hess.entry(1, 1), 2.0, epsilon = 0.05);
    assert_approx_eq!(f64, hess.trace(), 6.0, epsilon = 0.1);

    // eigenvalues of [[4, 1], [1, 2]] are 3 +- sqrt(2)
    let eigenvalues = hess.eigenvalues().unwrap().to_vec();
    assert_approx_eq!(f64, eigenvalues[0], 3.0 + 2.0_f64.sqrt(), epsilon = 0.05);
    assert_approx_eq!(f64, eigenvalues[1], 3.0 - 2.0_f64.sqrt(), epsilon = 0.05);

    let condition = hess.condition_number();
    let expected = (3.0 + 2.0_f64.sqrt()) / (3.0 - 2.0_f64.sqrt());
    assert_approx_eq!(f64, condition, expected, epsilon = 0.1);

    let mut grad = Gradient::new(&ctx, 2).unwrap();
    grad.compute(&space, &[0.5, -0.5]).unwrap();
    // grad f = 2Q x + a = (4*0.5 + 1*(-0.5) + 1, 1*0.5 + 2*(-0.5) - 1)
    assert_approx_eq!(f64, grad.partial(0), 2.5, epsilon = 0.05);
    assert_approx_eq!(f64, grad.partial(1), -1.5, epsilon = 0.05);
}

#[test]
fn identity_metric_sample_matches_euclidean() {
    let ctx = EngineContext::new();
    let mut metric = TransportMetric::new(&ctx);
    metric.add_sample(&[1.0, 1.0], ndarray::Array2::eye(2)).unwrap();

    assert_approx_eq!(
        f64,
        metric.distance(&[0.0, 0.0], &[3.0, 4.0]),
        5.0,
        epsilon = 1e-9
    );
}

#[test]
fn error_channel_reports_the_last_failure() {
    let ctx = EngineContext::new();
    let mut space = StateSpace::new(&ctx);
    space
        .add_dimension(Dimension::new(DimensionKind::Spot, "s", 0.0, 1.0, 5).unwrap())
        .unwrap();

    // analysis before map_values is a state error
    let mut grad = Gradient::new(&ctx, 1).unwrap();
    assert!(grad.compute(&space, &[0.5]).is_err());
    assert_eq!(ctx.last_error(), ErrorCode::NotInitialized);

    ctx.clear_last_error();
    assert_eq!(ctx.last_error(), ErrorCode::Success);
}

#[test]
fn fragility_sweep_joined_with_constraints_flags_the_boundary_band() {
    let ctx = EngineContext::new();
    let mut space = plane(&ctx, 0.0, 10.0, 11);
    space.map_values(|c| 3.0_f64.mul_add(c[0], 4.0 * c[1])).unwrap();

    let mut surface = ConstraintSurface::new(&ctx);
    surface
        .push(Constraint::on_dimension(
            ConstraintKind::Regulatory,
            "x_cap",
            0,
            Direction::Upper,
            10.0,
            Hardness::Hard,
        ))
        .unwrap();

    let mut map = FragilityMap::new(&space);
    map.compute_with_constraints(&surface).unwrap();

    // nodes on the x = 10 boundary gain the full constraint component;
    // with default weights that lifts them past the fragility threshold
    let on_boundary = map.score_at(&[10.0, 5.0]);
    let in_interior = map.score_at(&[5.0, 5.0]);
    assert!(on_boundary > in_interior);

    assert!(
        map.points()
            .iter()
            .any(|p| p.near_constraint() && (p.coordinates()[0] - 10.0).abs() < 1e-12)
    );
}
