//! Solver configuration, status, and report types.
//!
//! This module defines the knobs of the outer PCG driver, the precision
//! tier model, and the result types returned to callers.

use std::fmt;

use thiserror::Error;

/// Numeric storage precision of a field or operator tier.
///
/// The driver works with three tiers: full (the precision of `b`, `x`, and
/// the residual), sloppy (per-iteration operator products), and
/// precondition (the inner solve). Tiers must be ordered
/// full ≥ sloppy ≥ precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// 64-bit components
    Double,
    /// 32-bit components
    Single,
}

impl Precision {
    /// Component width in bits, for tier-ordering comparisons.
    pub fn bits(&self) -> u32 {
        match self {
            Precision::Double => 64,
            Precision::Single => 32,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Double => write!(f, "double"),
            Precision::Single => write!(f, "single"),
        }
    }
}

/// Which sites of the lattice a field stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSubset {
    /// Every site
    Full,
    /// One checkerboard parity only; the stored dimension-0 extent is half
    /// the full lattice extent
    Parity,
}

/// Checkerboard parity of a site: the coordinate sum modulo 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// Parity after displacing a site by a coordinate offset summing to `by`.
    pub fn shifted(self, by: usize) -> Parity {
        if by % 2 == 0 {
            self
        } else {
            match self {
                Parity::Even => Parity::Odd,
                Parity::Odd => Parity::Even,
            }
        }
    }

    /// 0 for even, 1 for odd.
    pub fn index(self) -> usize {
        match self {
            Parity::Even => 0,
            Parity::Odd => 1,
        }
    }
}

/// Storage ordering of sites within a full-subset field.
///
/// Parity-subset fields are inherently a single checkerboard block and
/// ignore this attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteOrder {
    /// Plain lexicographic order (dimension 0 fastest)
    Lexicographic,
    /// Even-parity block followed by the odd-parity block, each in
    /// checkerboard order
    EvenOdd,
}

/// Precondition-tier knobs of the outer configuration.
///
/// Present on [`SolverConfig`] iff the driver should apply an inner-solve
/// preconditioner. The inner solver's own configuration is derived from
/// these fields, never set directly.
#[derive(Debug, Clone, PartialEq)]
pub struct PreconditionParams {
    /// Relative tolerance of the inner solve
    pub tol: f64,

    /// Inner iteration cap (kept small; the inner solve is approximate by
    /// design)
    pub max_iter: usize,

    /// Uniform precision of the inner solve
    pub precision: Precision,

    /// Per-dimension domain-overlap widths for the extended sublattice.
    /// All zeros bypasses the extend/crop stage entirely.
    pub overlap: [usize; 4],
}

impl Default for PreconditionParams {
    fn default() -> Self {
        Self {
            tol: 1e-2,
            max_iter: 10,
            precision: Precision::Single,
            overlap: [1, 1, 1, 1],
        }
    }
}

/// Outer solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Relative outer tolerance: convergence when ‖r‖² ≤ tol² · ‖b‖²
    pub tol: f64,

    /// Outer iteration cap
    pub max_iter: usize,

    /// Precision tier of the per-iteration operator products
    pub precision_sloppy: Precision,

    /// Inner-solve preconditioner knobs (None = plain CG)
    pub preconditioner: Option<PreconditionParams>,

    /// Per-iteration progress table on stdout
    pub verbose: bool,

    /// Record the iterated ‖r‖² sequence in the report
    pub track_residual_history: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        // Environment overrides mirror the command-line-free way these
        // solves are usually driven from batch scripts.
        let tol = std::env::var("SILICA_TOL")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(1e-8);
        let max_iter = std::env::var("SILICA_MAXITER")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1000);

        Self {
            tol,
            max_iter,
            precision_sloppy: Precision::Double,
            preconditioner: None,
            verbose: std::env::var("SILICA_VERBOSE")
                .ok()
                .map(|s| s == "1")
                .unwrap_or(false),
            track_residual_history: false,
        }
    }
}

impl SolverConfig {
    /// Validate tolerances, iteration caps, and precision-tier ordering.
    ///
    /// `full` is the precision of the full tier (the operator the residual
    /// is recomputed with); configuration violations are fatal, unlike
    /// non-convergence.
    pub fn validate(&self, full: Precision) -> Result<(), ConfigError> {
        if !(self.tol > 0.0) {
            return Err(ConfigError::NonPositiveTol { which: "tol", value: self.tol });
        }
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroMaxIter { which: "max_iter" });
        }
        if full.bits() < self.precision_sloppy.bits() {
            return Err(ConfigError::PrecisionOrder {
                full,
                sloppy: self.precision_sloppy,
                precondition: self.preconditioner.as_ref().map(|p| p.precision),
            });
        }
        if let Some(precon) = &self.preconditioner {
            if !(precon.tol > 0.0) {
                return Err(ConfigError::NonPositiveTol {
                    which: "preconditioner.tol",
                    value: precon.tol,
                });
            }
            if precon.max_iter == 0 {
                return Err(ConfigError::ZeroMaxIter { which: "preconditioner.max_iter" });
            }
            if self.precision_sloppy.bits() < precon.precision.bits() {
                return Err(ConfigError::PrecisionOrder {
                    full,
                    sloppy: self.precision_sloppy,
                    precondition: Some(precon.precision),
                });
            }
        }
        Ok(())
    }

    /// Overlap widths, zeros when no preconditioner is configured.
    pub fn overlap(&self) -> [usize; 4] {
        self.preconditioner
            .as_ref()
            .map(|p| p.overlap)
            .unwrap_or([0; 4])
    }
}

/// Configuration and geometry errors. These are the only fatal conditions;
/// running out of iterations is a normal return.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{which} must be positive, got {value}")]
    NonPositiveTol { which: &'static str, value: f64 },

    #[error("{which} must be at least 1")]
    ZeroMaxIter { which: &'static str },

    #[error("precision tiers must be ordered full >= sloppy >= precondition, got full={full}, sloppy={sloppy}, precondition={precondition:?}")]
    PrecisionOrder {
        full: Precision,
        sloppy: Precision,
        precondition: Option<Precision>,
    },

    #[error("overlap {overlap} exceeds base extent {extent} in dimension {dim}")]
    OverlapTooWide { dim: usize, overlap: usize, extent: usize },

    #[error("parity fields need an even dimension-0 extent, got {0}")]
    OddParityExtent(usize),
}

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The iterated residual met the tolerance
    Converged,

    /// Iteration cap reached; the solution is the best iterate so far
    MaxIterations,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "Converged"),
            SolveStatus::MaxIterations => write!(f, "Max Iterations"),
        }
    }
}

/// Solve report. The solution itself is written into the caller's field.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Outcome status
    pub status: SolveStatus,

    /// Outer iterations completed
    pub iters: usize,

    /// Relative true residual ‖b − A·x‖ / ‖b‖ at exit, recomputed with a
    /// fresh full-precision operator application
    pub true_res: f64,

    /// Count of residual computations taken from a fresh operator
    /// application (initial residual and the exit recomputation; inner
    /// reliable refreshes are reported by the inner solver)
    pub resid_updates: usize,

    /// Iterated ‖r‖² per outer iteration (empty unless tracking is enabled)
    pub residual_history: Vec<f64>,

    /// Total solve time (milliseconds)
    pub solve_time_ms: u64,

    /// Time spent in operator applications (milliseconds)
    pub operator_time_ms: u64,

    /// Time spent in the inner solve, including extend/crop (milliseconds)
    pub inner_time_ms: u64,
}
