//! The preconditioned conjugate-gradient driver and its inner solver.

pub mod inner;
pub mod outer;

use thiserror::Error;

use crate::field::FieldError;
use crate::problem::ConfigError;

/// Errors surfaced by the solver layer. Configuration and field-shape
/// violations are fatal; running out of iterations is a normal return
/// carried in the report status.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Field(#[from] FieldError),
}
