//! Dense linear algebra over batched lattice data.

pub mod batch;

pub use batch::{batch_invert, BatchStats, LinalgError};
