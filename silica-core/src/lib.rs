//! Silica: preconditioned conjugate gradients for large sparse lattice systems
//!
//! This library implements a domain-decomposition-preconditioned CG solver
//! for Hermitian positive-definite systems discretized on a 4-dimensional
//! lattice. It supports:
//!
//! - **Mixed precision**: full-precision residuals with single-precision
//!   per-iteration operator products
//! - **Inner-outer preconditioning**: an approximate CG solve on an
//!   overlap-extended domain applied as the preconditioner
//! - **Checkerboard layouts**: full and single-parity site subsets with
//!   lexicographic or even/odd storage orders
//! - **Partition-scoped reductions**: inner products are explicitly global
//!   (across partitions) or local (this partition only)
//!
//! # Algorithm
//!
//! The outer iteration is conjugate gradients with a twist: because the
//! preconditioner is an iterative solve that differs from iteration to
//! iteration, the beta recurrence is Polak–Ribière-style (subtracting the
//! stale cross term) instead of Fletcher–Reeves. The preconditioner
//! application extends the residual onto an overlap-widened copy of the
//! local domain, runs a short CG there with all reductions kept
//! partition-local, and crops the result back.
//!
//! # Example
//!
//! ```ignore
//! use silica_core::{
//!     Field, FieldParams, LinearSystem, Parity, PreconCg, PreconditionParams,
//!     Precision, SinglePartition, SiteOrder, SiteSubset, SolverConfig,
//!     StencilOperator,
//! };
//!
//! let params = FieldParams {
//!     dims: [8, 16, 16, 16],
//!     precision: Precision::Double,
//!     subset: SiteSubset::Parity,
//!     parity: Parity::Even,
//!     order: SiteOrder::EvenOdd,
//!     nface: 0,
//! };
//! let b = /* right-hand side */ Field::zeros(params);
//! let mut x = Field::zeros_like(&b);
//!
//! let full = StencilOperator::new(0.01, Precision::Double);
//! let sloppy = StencilOperator::new(0.01, Precision::Single);
//! let precon = StencilOperator::new(0.01, Precision::Single);
//! let system = LinearSystem::new(&full, &sloppy, &precon);
//!
//! let config = SolverConfig {
//!     precision_sloppy: Precision::Single,
//!     preconditioner: Some(PreconditionParams::default()),
//!     ..Default::default()
//! };
//!
//! let comm = SinglePartition;
//! let solver = PreconCg::new(system, config, &comm)?;
//! let report = solver.solve(&mut x, &b)?;
//!
//! println!("Status: {}", report.status);
//! println!("True residual: {:.3e}", report.true_res);
//! ```
//!
//! # References
//!
//! - QUDA: additive-Schwarz preconditioned CG on lattice gauge systems
//! - Lüscher: Schwarz-alternating domain decomposition for lattice QCD
//! - Golub & Van Loan: flexible/inexact preconditioned conjugate gradients

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod field;
pub mod geometry;
pub mod linalg;
pub mod operator;
pub mod problem;
pub mod solver;
pub mod util;

// Re-export main types
pub use domain::comm::{PartitionComm, ReductionScope, SinglePartition};
pub use field::{Field, FieldData, FieldError, FieldParams};
pub use geometry::DomainGeometry;
pub use operator::{LatticeOperator, LinearSystem, StencilOperator};
pub use problem::{
    ConfigError, Parity, PreconditionParams, Precision, SiteOrder, SiteSubset,
    SolveReport, SolveStatus, SolverConfig,
};
pub use solver::outer::PreconCg;
pub use solver::SolverError;

/// Single-partition convenience entry point.
///
/// Builds the driver over [`SinglePartition`] and solves `mat · x = b` in
/// place. Multi-partition callers construct [`PreconCg`] directly with
/// their own [`PartitionComm`].
///
/// # Example
///
/// ```ignore
/// use silica_core::{solve, LinearSystem, SolverConfig, StencilOperator, Precision};
///
/// let op = StencilOperator::new(0.01, Precision::Double);
/// let system = LinearSystem::uniform(&op);
/// let report = solve(system, SolverConfig::default(), &mut x, &b)?;
/// ```
pub fn solve(
    system: LinearSystem<'_>,
    config: SolverConfig,
    x: &mut Field,
    b: &Field,
) -> Result<SolveReport, SolverError> {
    let comm = SinglePartition;
    let solver = PreconCg::new(system, config, &comm)?;
    solver.solve(x, b)
}
