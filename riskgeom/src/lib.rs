//! `riskgeom` computes the geometry of a scalar pricing function over a
//! discretized risk-factor manifold: gradient and Hessian fields by finite
//! differences, fragility scores flagging where linear risk models break
//! down, admissibility against declared constraint surfaces, and transport
//! costs under a spatially varying metric tensor.
//!
//! Statistical risk measures what appears; geometric risk describes what is
//! possible.

pub mod constraint;
pub mod context;
mod convert;
pub mod error;
pub mod fragility;
pub mod gradient;
pub mod hessian;
pub mod jacobi;
pub mod state_space;
pub mod transport;
pub mod version;
