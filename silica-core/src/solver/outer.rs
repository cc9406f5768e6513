//! The preconditioned conjugate-gradient driver.
//!
//! The outer iteration runs CG at full/sloppy precision and, when a
//! preconditioner is configured, applies it by extending the residual
//! onto the overlap domain and running the inner solve there with
//! partition-local reductions. Because that inner solve changes from
//! iteration to iteration, the preconditioned path uses the
//! Polak–Ribière-style beta recurrence; the plain path keeps
//! Fletcher–Reeves.

use std::time::Instant;

use crate::domain::comm::{PartitionComm, ReduceCtx};
use crate::domain::extend::{crop, extend};
use crate::field::{kernels, Field, FieldParams};
use crate::geometry::DomainGeometry;
use crate::operator::{LatticeOperator, LinearSystem};
use crate::problem::{ConfigError, SolveReport, SolveStatus, SolverConfig};
use crate::solver::inner::{derive_inner_config, InnerCg, InnerReport};
use crate::solver::SolverError;
use crate::util::logging::diagnostics_enabled;
use crate::util::timer::{PerfSection, PerfTimers};

/// Fletcher–Reeves recurrence for the plain path.
fn beta_fletcher_reeves(r2_new: f64, r2_old: f64) -> f64 {
    r2_new / r2_old
}

/// Polak–Ribière-style recurrence for the preconditioned path. The inner
/// solve differs from one iteration to the next, so the recurrence
/// subtracts the stale cross term instead of assuming a fixed
/// preconditioner.
fn beta_polak_ribiere(rminvr_new: f64, r_new_minvr_old: f64, rminvr_old: f64) -> f64 {
    (rminvr_new - r_new_minvr_old) / rminvr_old
}

/// Solve-scoped workspace of the preconditioner application.
struct PreconBuffers {
    /// Preconditioned residual on the base domain, full precision
    minvr: Field,
    /// Residual moved onto the overlap-extended domain
    rpre: Field,
    /// Inner solution on the extended domain
    minvrpre: Field,
}

/// Move the residual onto the extended domain, run the inner solve there,
/// and bring the result back. At zero overlap the extended domain is the
/// base domain and both moves collapse to a precision-converting copy.
fn apply_preconditioner(
    inner: &InnerCg,
    op: &dyn LatticeOperator,
    bufs: &mut PreconBuffers,
    r: &Field,
    geom: &DomainGeometry,
    comm: &dyn PartitionComm,
    timers: &mut PerfTimers,
) -> Result<InnerReport, SolverError> {
    let bypass = geom.max_overlap() == 0;

    {
        let _g = timers.scoped(PerfSection::ExtendCrop);
        if bypass {
            kernels::convert_into(&mut bufs.rpre, r)?;
        } else {
            extend(&mut bufs.rpre, r, geom, comm)?;
        }
    }

    // The extended residual doubles as the inner initial guess.
    {
        let _g = timers.scoped(PerfSection::VectorKernels);
        kernels::convert_into(&mut bufs.minvrpre, &bufs.rpre)?;
    }

    let report = {
        let _g = timers.scoped(PerfSection::InnerSolve);
        inner.solve(&mut bufs.minvrpre, &mut bufs.rpre, op, comm)?
    };

    {
        let _g = timers.scoped(PerfSection::ExtendCrop);
        if bypass {
            kernels::convert_into(&mut bufs.minvr, &bufs.minvrpre)?;
        } else {
            crop(&mut bufs.minvr, &bufs.minvrpre, geom)?;
        }
    }

    Ok(report)
}

/// Preconditioned conjugate gradients over a three-tier operator system.
pub struct PreconCg<'a> {
    system: LinearSystem<'a>,
    config: SolverConfig,
    inner: Option<InnerCg>,
    comm: &'a dyn PartitionComm,
}

impl<'a> PreconCg<'a> {
    /// Validate the configuration against the full-precision handle and
    /// derive the inner solver once.
    pub fn new(
        system: LinearSystem<'a>,
        config: SolverConfig,
        comm: &'a dyn PartitionComm,
    ) -> Result<Self, ConfigError> {
        config.validate(system.mat.precision())?;
        let inner = derive_inner_config(&config).map(InnerCg::new);
        Ok(Self { system, config, inner, comm })
    }

    /// Solve `mat · x = b`, updating `x` in place from its incoming value.
    ///
    /// Runs until the iterated `‖r‖²` meets `tol² · ‖b‖²` or the iteration
    /// cap; both outcomes are `Ok`, distinguished by [`SolveStatus`]. The
    /// reported `true_res` always comes from a fresh full-precision
    /// operator application at exit.
    pub fn solve(&self, x: &mut Field, b: &Field) -> Result<SolveReport, SolverError> {
        let solve_start = Instant::now();
        let mut timers = PerfTimers::default();
        let rctx = ReduceCtx::global(self.comm);

        let geom = DomainGeometry::new(b.params.full_dims(), self.config.overlap())?;

        // The residual carries the halo width the extension reads.
        let mut r = Field::copy_of(
            b,
            FieldParams { nface: geom.max_overlap(), ..b.params },
        )?;
        let mut y = Field::zeros_like(b);

        let sloppy_params = FieldParams {
            precision: self.config.precision_sloppy,
            nface: 0,
            ..x.params
        };
        let mut ap = Field::zeros(sloppy_params);
        let mut tmp = Field::zeros(sloppy_params);

        let mut precon = match (&self.inner, &self.config.preconditioner) {
            (Some(inner), Some(params)) => {
                let ext_params = r.params.for_extended(&geom, params.precision);
                Some((
                    inner,
                    PreconBuffers {
                        minvr: Field::zeros_like(b),
                        rpre: Field::zeros(ext_params),
                        minvrpre: Field::zeros(ext_params),
                    },
                ))
            }
            _ => None,
        };

        // r = b - A·x from the caller's guess
        {
            let _g = timers.scoped(PerfSection::OperatorApply);
            self.system.mat.apply(&mut r, x, &mut y)?;
        }
        let mut r2 = kernels::xmy_norm(b, &mut r, &rctx)?;
        let mut resid_updates = 1;

        let b2 = kernels::norm2(b, &rctx);
        let stop = b2 * self.config.tol * self.config.tol;

        let mut rminvr = 0.0;
        let mut p = match &mut precon {
            Some((inner, bufs)) => {
                apply_preconditioner(
                    inner,
                    self.system.mat_precon,
                    bufs,
                    &r,
                    &geom,
                    self.comm,
                    &mut timers,
                )?;
                rminvr = kernels::re_dot(&r, &bufs.minvr, &rctx)?;
                Field::copy_of(&bufs.minvr, bufs.minvr.params)?
            }
            None => Field::copy_of(&r, r.params)?,
        };

        let mut residual_history = Vec::new();
        let mut k = 0;

        if self.config.verbose {
            println!(
                "{:>5} {:>14} {:>12} {:>12}",
                "iter", "r2/b2", "alpha", "beta"
            );
        }

        while r2 > stop && k < self.config.max_iter {
            {
                let _g = timers.scoped(PerfSection::OperatorApply);
                self.system.mat_sloppy.apply(&mut ap, &p, &mut tmp)?;
            }
            let pap = kernels::re_dot(&p, &ap, &rctx)?;
            let alpha = match &precon {
                Some(_) => rminvr / pap,
                None => r2 / pap,
            };

            // Fused update: r -= alpha·ap, returning the new norm and the
            // cross term packed in one reduction.
            let cg_norm = kernels::axpy_cg_norm(-alpha, &ap, &mut r, &rctx)?;

            let beta = match &mut precon {
                Some((inner, bufs)) => {
                    let rminvr_old = rminvr;
                    // Read against the previous inner solution before the
                    // new one overwrites it.
                    let r_new_minvr_old = kernels::re_dot(&r, &bufs.minvr, &rctx)?;
                    let inner_report = apply_preconditioner(
                        inner,
                        self.system.mat_precon,
                        bufs,
                        &r,
                        &geom,
                        self.comm,
                        &mut timers,
                    )?;
                    if diagnostics_enabled() {
                        eprintln!(
                            "  precondition: {} inner iterations",
                            inner_report.iters
                        );
                    }
                    rminvr = kernels::re_dot(&r, &bufs.minvr, &rctx)?;
                    r2 = cg_norm.re;
                    let beta = beta_polak_ribiere(rminvr, r_new_minvr_old, rminvr_old);
                    kernels::axpy_zpbx(alpha, &mut p, x, &bufs.minvr, beta)?;
                    beta
                }
                None => {
                    let r2_old = r2;
                    r2 = cg_norm.re;
                    let beta = beta_fletcher_reeves(r2, r2_old);
                    kernels::axpy_zpbx(alpha, &mut p, x, &r, beta)?;
                    beta
                }
            };

            k += 1;
            if self.config.track_residual_history {
                residual_history.push(r2);
            }
            if self.config.verbose {
                println!("{:>5} {:>14.6e} {:>12.4e} {:>12.4e}", k, r2 / b2, alpha, beta);
            }
            if diagnostics_enabled() {
                eprintln!("outer iter {:4} r2={:.3e} pap={:.3e}", k, r2, pap);
            }
        }

        let status = if r2 <= stop {
            SolveStatus::Converged
        } else {
            SolveStatus::MaxIterations
        };

        // Exit residual from a fresh full-precision application.
        {
            let _g = timers.scoped(PerfSection::OperatorApply);
            self.system.mat.apply(&mut r, x, &mut y)?;
        }
        let true_r2 = kernels::xmy_norm(b, &mut r, &rctx)?;
        resid_updates += 1;
        let true_res = (true_r2 / b2).sqrt();

        let report = SolveReport {
            status,
            iters: k,
            true_res,
            resid_updates,
            residual_history,
            solve_time_ms: solve_start.elapsed().as_millis() as u64,
            operator_time_ms: timers.operator_apply.as_millis() as u64,
            inner_time_ms: (timers.inner_solve + timers.extend_crop).as_millis() as u64,
        };

        if self.config.verbose {
            println!(
                "pcg: {} after {} iterations, true residual {:.6e} ({} ms)",
                report.status, report.iters, report.true_res, report.solve_time_ms
            );
        }

        Ok(report)
    }
}
