//! End-to-end tests of the preconditioned CG driver.
//!
//! These run the full pipeline on lattices small enough that an
//! independent dense solve (or a direct operator application) can confirm
//! the answer.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use proptest::prelude::*;

use silica_core::domain::comm::ReduceCtx;
use silica_core::field::kernels;
use silica_core::{
    solve, Field, FieldError, FieldParams, LatticeOperator, LinearSystem, Parity,
    PreconCg, PreconditionParams, Precision, SinglePartition, SiteOrder, SiteSubset,
    SolveStatus, SolverConfig, StencilOperator,
};

fn pseudo_fill(f: &mut Field, seed: usize) {
    for idx in 0..f.len() {
        let re = ((7 * idx + 3 * seed) % 19) as f64 - 9.0;
        let im = ((13 * idx + seed) % 11) as f64 - 5.0;
        f.set_site(idx, Complex64::new(re, im));
    }
}

fn full_params(dims: [usize; 4], precision: Precision) -> FieldParams {
    FieldParams {
        dims,
        precision,
        subset: SiteSubset::Full,
        parity: Parity::Even,
        order: SiteOrder::Lexicographic,
        nface: 0,
    }
}

fn parity_params(dims: [usize; 4], precision: Precision) -> FieldParams {
    FieldParams {
        dims,
        precision,
        subset: SiteSubset::Parity,
        parity: Parity::Even,
        order: SiteOrder::EvenOdd,
        nface: 0,
    }
}

fn plain_config(tol: f64, max_iter: usize) -> SolverConfig {
    SolverConfig {
        tol,
        max_iter,
        precision_sloppy: Precision::Double,
        preconditioner: None,
        verbose: false,
        track_residual_history: false,
    }
}

/// Relative residual recomputed outside the solver.
fn residual_norm_ratio(op: &dyn LatticeOperator, x: &Field, b: &Field) -> f64 {
    let comm = SinglePartition;
    let rctx = ReduceCtx::global(&comm);
    let mut ax = Field::zeros_like(x);
    let mut tmp = Field::zeros_like(x);
    op.apply(&mut ax, x, &mut tmp).unwrap();
    let mut diff = b.clone();
    kernels::axpy(-1.0, &ax, &mut diff).unwrap();
    (kernels::norm2(&diff, &rctx) / kernels::norm2(b, &rctx)).sqrt()
}

/// Dense Hermitian operator over a flat site list, for cross-checking the
/// driver against an LU solve.
struct DenseOperator {
    matrix: DMatrix<Complex64>,
    precision: Precision,
}

impl DenseOperator {
    /// B·Bᴴ + n·I is Hermitian positive-definite for any B.
    fn hermitian_pd(n: usize) -> Self {
        let b = DMatrix::from_fn(n, n, |row, col| {
            Complex64::new(
                ((row * 5 + col * 3) % 7) as f64 - 3.0,
                ((row * 2 + col * 11) % 5) as f64 - 2.0,
            )
        });
        let matrix = &b * b.adjoint()
            + DMatrix::from_diagonal_element(n, n, Complex64::new(n as f64, 0.0));
        Self { matrix, precision: Precision::Double }
    }
}

impl LatticeOperator for DenseOperator {
    fn apply(
        &self,
        out: &mut Field,
        input: &Field,
        _tmp: &mut Field,
    ) -> Result<(), FieldError> {
        let n = input.len();
        for row in 0..n {
            let mut acc = Complex64::new(0.0, 0.0);
            for col in 0..n {
                acc += self.matrix[(row, col)] * input.site(col);
            }
            out.set_site(row, acc);
        }
        Ok(())
    }

    fn precision(&self) -> Precision {
        self.precision
    }
}

#[test]
fn test_solution_matches_dense_lu() {
    // 4 sites on a [4,1,1,1] line; the operator is an explicit 4x4
    // Hermitian positive-definite matrix, so LU gives the exact answer.
    let op = DenseOperator::hermitian_pd(4);
    let system = LinearSystem::uniform(&op);

    let mut b = Field::zeros(full_params([4, 1, 1, 1], Precision::Double));
    pseudo_fill(&mut b, 1);
    let mut x = Field::zeros_like(&b);

    let report = solve(system, plain_config(1e-10, 50), &mut x, &b).unwrap();

    println!("\n=== Dense cross-check ===");
    println!("status = {}, iters = {}, true_res = {:.3e}",
             report.status, report.iters, report.true_res);

    assert_eq!(report.status, SolveStatus::Converged);
    // Finite termination: a 4x4 system is solved in at most 4 CG steps.
    assert!(report.iters <= 4, "took {} iterations", report.iters);

    let rhs = DVector::from_fn(4, |i, _| b.site(i));
    let reference = op.matrix.clone().lu().solve(&rhs).expect("LU solve failed");
    for i in 0..4 {
        let got = x.site(i);
        let want = reference[i];
        assert!(
            (got - want).norm() < 1e-7,
            "site {}: got {} want {}",
            i,
            got,
            want
        );
    }
}

#[test]
fn test_exact_inverse_preconditioner_converges_in_one_sweep() {
    // With the inner solve driven to 1e-12, the preconditioner application
    // is A^-1 to near machine accuracy, so the very first search direction
    // already solves the system.
    let comm = SinglePartition;
    let op = StencilOperator::new(0.5, Precision::Double);
    let system = LinearSystem::uniform(&op);

    let config = SolverConfig {
        preconditioner: Some(PreconditionParams {
            tol: 1e-12,
            max_iter: 500,
            precision: Precision::Double,
            overlap: [0, 0, 0, 0],
        }),
        ..plain_config(1e-8, 50)
    };
    let solver = PreconCg::new(system, config, &comm).unwrap();

    let mut b = Field::zeros(parity_params([2, 4, 4, 2], Precision::Double));
    pseudo_fill(&mut b, 2);
    let mut x = Field::zeros_like(&b);

    let report = solver.solve(&mut x, &b).unwrap();
    assert_eq!(report.status, SolveStatus::Converged);
    assert_eq!(
        report.iters, 1,
        "exact preconditioner needed {} outer iterations",
        report.iters
    );
    assert!(residual_norm_ratio(&op, &x, &b) <= 1e-8);
}

#[test]
fn test_reported_true_residual_matches_recomputation() {
    let op = StencilOperator::new(1.0, Precision::Double);
    let system = LinearSystem::uniform(&op);

    let mut b = Field::zeros(full_params([4, 4, 4, 2], Precision::Double));
    pseudo_fill(&mut b, 3);
    let mut x = Field::zeros_like(&b);

    let report = solve(system, plain_config(1e-10, 200), &mut x, &b).unwrap();
    let recomputed = residual_norm_ratio(&op, &x, &b);

    assert!(
        (report.true_res - recomputed).abs() <= 1e-15 + 1e-10 * recomputed,
        "report says {:.6e}, recomputation says {:.6e}",
        report.true_res,
        recomputed
    );
}

#[test]
fn test_mixed_precision_preconditioned_solve_end_to_end() {
    let comm = SinglePartition;
    let full = StencilOperator::new(0.25, Precision::Double);
    let sloppy = StencilOperator::new(0.25, Precision::Single);
    let precon = StencilOperator::new(0.25, Precision::Single);
    let system = LinearSystem::new(&full, &sloppy, &precon);

    let config = SolverConfig {
        tol: 1e-5,
        max_iter: 500,
        precision_sloppy: Precision::Single,
        preconditioner: Some(PreconditionParams {
            tol: 0.05,
            max_iter: 8,
            precision: Precision::Single,
            overlap: [1, 1, 1, 1],
        }),
        verbose: true,
        track_residual_history: true,
    };
    let solver = PreconCg::new(system, config, &comm).unwrap();

    let mut b = Field::zeros(parity_params([4, 8, 6, 4], Precision::Double));
    pseudo_fill(&mut b, 4);
    let mut x = Field::zeros_like(&b);

    let report = solver.solve(&mut x, &b).unwrap();

    println!("\n=== Mixed precision ===");
    println!("status = {}, iters = {}, true_res = {:.3e}",
             report.status, report.iters, report.true_res);
    println!("times: solve = {} ms, operator = {} ms, inner = {} ms",
             report.solve_time_ms, report.operator_time_ms, report.inner_time_ms);

    assert_eq!(report.status, SolveStatus::Converged);
    // The recurrence ran on single-precision products; the double-precision
    // exit residual may sit a little above the iterated one.
    assert!(report.true_res <= 1e-4, "true_res = {:.3e}", report.true_res);
    assert_eq!(report.residual_history.len(), report.iters);
    assert!(report.operator_time_ms <= report.solve_time_ms);
    assert!(report.inner_time_ms <= report.solve_time_ms);

    // Verify at full precision, independently of the report.
    assert!(residual_norm_ratio(&full, &x, &b) <= 1e-4);
}

#[test]
fn test_overlap_widths_agree_on_the_solution() {
    // The overlap changes the preconditioner, never the answer: solves at
    // different widths must agree within the outer tolerance.
    let comm = SinglePartition;
    let op = StencilOperator::new(0.5, Precision::Double);
    let system = LinearSystem::uniform(&op);

    let mut b = Field::zeros(parity_params([4, 8, 6, 2], Precision::Double));
    pseudo_fill(&mut b, 5);

    let mut solutions = Vec::new();
    for overlap in [[0, 0, 0, 0], [1, 0, 1, 0], [2, 2, 2, 0]] {
        let config = SolverConfig {
            preconditioner: Some(PreconditionParams {
                tol: 0.05,
                max_iter: 7,
                precision: Precision::Double,
                overlap,
            }),
            ..plain_config(1e-10, 300)
        };
        let solver = PreconCg::new(system, config, &comm).unwrap();
        let mut x = Field::zeros_like(&b);
        let report = solver.solve(&mut x, &b).unwrap();
        assert_eq!(report.status, SolveStatus::Converged, "overlap {:?}", overlap);
        solutions.push(x);
    }

    let rctx = ReduceCtx::global(&comm);
    let b2 = kernels::norm2(&b, &rctx);
    for other in &solutions[1..] {
        let mut diff = solutions[0].clone();
        kernels::axpy(-1.0, other, &mut diff).unwrap();
        let rel = (kernels::norm2(&diff, &rctx) / b2).sqrt();
        assert!(rel < 1e-7, "solutions diverge by {:.3e}", rel);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_plain_solve_converges_for_positive_mass(
        mass2 in 0.5f64..4.0,
        seed in 0usize..64,
    ) {
        let op = StencilOperator::new(mass2, Precision::Double);
        let system = LinearSystem::uniform(&op);

        let mut b = Field::zeros(full_params([4, 4, 4, 2], Precision::Double));
        pseudo_fill(&mut b, seed);
        let mut x = Field::zeros_like(&b);

        let mut config = plain_config(1e-6, 400);
        config.track_residual_history = true;
        let report = solve(system, config, &mut x, &b).unwrap();

        prop_assert_eq!(report.status, SolveStatus::Converged);
        prop_assert!(report.true_res <= 1e-6);
        prop_assert_eq!(report.residual_history.len(), report.iters);
        prop_assert!(
            report.residual_history.last().unwrap() < &report.residual_history[0]
        );
        // What contracts monotonically is the A-norm of the error; the
        // residual 2-norm may wiggle, bounded per step by the condition
        // number of the stencil.
        let kappa = (mass2 + 16.0) / mass2;
        for pair in report.residual_history.windows(2) {
            prop_assert!(
                pair[1] <= kappa * pair[0] * (1.0 + 1e-9),
                "residual grew from {:.6e} to {:.6e}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn prop_preconditioned_solve_converges_for_positive_mass(
        mass2 in 0.5f64..4.0,
        seed in 0usize..64,
    ) {
        let comm = SinglePartition;
        let op = StencilOperator::new(mass2, Precision::Double);
        let system = LinearSystem::uniform(&op);

        let config = SolverConfig {
            preconditioner: Some(PreconditionParams {
                tol: 0.1,
                max_iter: 6,
                precision: Precision::Double,
                overlap: [1, 1, 0, 0],
            }),
            ..plain_config(1e-6, 400)
        };
        let solver = PreconCg::new(system, config, &comm).unwrap();

        let mut b = Field::zeros(parity_params([2, 4, 4, 2], Precision::Double));
        pseudo_fill(&mut b, seed);
        let mut x = Field::zeros_like(&b);

        let report = solver.solve(&mut x, &b).unwrap();
        prop_assert_eq!(report.status, SolveStatus::Converged);
        prop_assert!(residual_norm_ratio(&op, &x, &b) <= 1e-6);
    }
}
