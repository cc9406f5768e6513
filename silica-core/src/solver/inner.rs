//! Inner solve: plain CG at the precondition tier.
//!
//! The preconditioner application is itself a short conjugate-gradient
//! run on the overlap-extended residual. It is configured exclusively by
//! [`derive_inner_config`] from the outer configuration, runs at one
//! uniform precision, and performs every reduction partition-locally;
//! the driver hands it no global reduction path at all.

use crate::domain::comm::{PartitionComm, ReduceCtx};
use crate::field::{kernels, Field};
use crate::operator::LatticeOperator;
use crate::problem::{Precision, SolverConfig};
use crate::solver::SolverError;
use crate::util::logging::diagnostics_enabled;

/// Inner-solver configuration. Always derived, never set directly.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerConfig {
    /// Relative tolerance of the inner solve
    pub tol: f64,

    /// Inner iteration cap
    pub max_iter: usize,

    /// Uniform precision: both storage tiers of the inner solve collapse
    /// to the precondition tier
    pub precision: Precision,

    /// Residual-refresh threshold. Derivation pins this to an unreachable
    /// value: the inner solve is an approximation already, so a refreshed
    /// residual buys nothing.
    pub reliable_delta: f64,

    /// Whether the source buffer must survive the solve. When the sloppy
    /// and precondition tiers differ the caller's copy into the extended
    /// buffer is itself the precision conversion, so the source may be
    /// consumed as scratch.
    pub preserve_source: bool,

    /// Summary line after each inner solve
    pub verbose: bool,
}

/// Derive the inner-solver configuration from the outer one. Returns
/// `None` when no preconditioner is configured.
pub fn derive_inner_config(outer: &SolverConfig) -> Option<InnerConfig> {
    let precon = outer.preconditioner.as_ref()?;
    Some(InnerConfig {
        tol: precon.tol,
        max_iter: precon.max_iter,
        precision: precon.precision,
        reliable_delta: 1e-20,
        preserve_source: outer.precision_sloppy == precon.precision,
        verbose: outer.verbose,
    })
}

/// What an inner solve did, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerReport {
    /// Iterations taken
    pub iters: usize,
    /// Residual refreshes from a fresh operator application
    pub resid_updates: usize,
}

/// Plain (unpreconditioned) CG used as the preconditioner application.
#[derive(Debug, Clone)]
pub struct InnerCg {
    config: InnerConfig,
}

impl InnerCg {
    pub fn new(config: InnerConfig) -> Self {
        Self { config }
    }

    /// Solve `op · x = src` starting from the incoming `x` as the initial
    /// guess. Non-convergence is silent: the outer recurrence absorbs an
    /// approximate application.
    ///
    /// When the configuration does not preserve the source, `src` is
    /// consumed as the residual workspace.
    pub fn solve(
        &self,
        x: &mut Field,
        src: &mut Field,
        op: &dyn LatticeOperator,
        comm: &dyn PartitionComm,
    ) -> Result<InnerReport, SolverError> {
        let rctx = ReduceCtx::local(comm);

        let src2 = kernels::norm2(src, &rctx);
        let stop = src2 * self.config.tol * self.config.tol;
        let refresh_below = src2 * self.config.reliable_delta * self.config.reliable_delta;

        let mut r_owned = if self.config.preserve_source {
            Some(Field::copy_of(src, src.params)?)
        } else {
            None
        };
        let (r, src_kept): (&mut Field, Option<&Field>) = match r_owned.as_mut() {
            Some(copy) => (copy, Some(&*src)),
            None => (src, None),
        };

        // r = src - A·x for the caller's guess
        let mut ap = Field::zeros_like(x);
        let mut tmp = Field::zeros_like(x);
        op.apply(&mut ap, x, &mut tmp)?;
        kernels::axpy(-1.0, &ap, r)?;
        let mut r2 = kernels::norm2(r, &rctx);

        let mut p = Field::copy_of(r, r.params)?;
        let mut iters = 0;
        let mut resid_updates = 0;

        while r2 > stop && iters < self.config.max_iter {
            op.apply(&mut ap, &p, &mut tmp)?;
            let pap = kernels::re_dot(&p, &ap, &rctx)?;
            if pap <= 0.0 {
                // lost positivity; leave quietly with the current iterate
                break;
            }
            let alpha = r2 / pap;

            let cg_norm = kernels::axpy_cg_norm(-alpha, &ap, r, &rctx)?;
            let r2_old = r2;
            r2 = cg_norm.re;
            let beta = r2 / r2_old;
            kernels::axpy_zpbx(alpha, &mut p, x, r, beta)?;
            iters += 1;

            if diagnostics_enabled() {
                eprintln!(
                    "  inner iter {:4} r2={:.3e} alpha={:.3e} beta={:.3e}",
                    iters, r2, alpha, beta
                );
            }

            // A refresh re-reads the source, so it only runs when the
            // source was preserved.
            if r2 < refresh_below {
                if let Some(b) = src_kept {
                    op.apply(&mut ap, x, &mut tmp)?;
                    kernels::convert_into(r, b)?;
                    kernels::axpy(-1.0, &ap, r)?;
                    r2 = kernels::norm2(r, &rctx);
                    resid_updates += 1;
                }
            }
        }

        if self.config.verbose {
            println!("  inner solve: {:4} iterations, r2 = {:.4e}", iters, r2);
        }

        Ok(InnerReport { iters, resid_updates })
    }
}
