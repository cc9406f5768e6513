//! Shared utilities: diagnostics gating and solve-section timing.

pub mod logging;
pub mod timer;
