//! Partition communication seam.
//!
//! The solver core never talks to a network itself; it calls through
//! [`PartitionComm`] for the two cross-partition concerns it has: summing
//! reduction results and sourcing halo data for the overlap-extended
//! field. Reduction calls carry an explicit [`ReductionScope`]; the inner
//! solve runs entirely under [`ReductionScope::Local`] so its dot products
//! never synchronize partitions.

use num_complex::Complex64;

use crate::field::{Field, FieldError};
use crate::geometry::DomainGeometry;

/// Whether a reduction crosses partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionScope {
    /// Sum over every partition
    Global,
    /// Keep the partition-local sum
    Local,
}

/// Cross-partition services consumed by the solver.
pub trait PartitionComm {
    /// Sum a scalar across partitions under the given scope. `Local` is
    /// the identity for every implementation.
    fn reduce_sum(&self, local: f64, scope: ReductionScope) -> f64;

    /// Pairwise complex sum, same contract as [`reduce_sum`](Self::reduce_sum).
    fn reduce_sum_complex(&self, local: Complex64, scope: ReductionScope) -> Complex64;

    /// Fill the halo sites of the extended field `dst` (the sites whose
    /// base coordinates fall outside the local base sublattice) from
    /// neighbor-partition data for `src`.
    fn fill_halo(
        &self,
        dst: &mut Field,
        src: &Field,
        geom: &DomainGeometry,
    ) -> Result<(), FieldError>;
}

/// Single-partition implementation: the lattice is periodic and entirely
/// local, so reductions are the identity and halo data wraps around.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePartition;

impl PartitionComm for SinglePartition {
    fn reduce_sum(&self, local: f64, _scope: ReductionScope) -> f64 {
        local
    }

    fn reduce_sum_complex(&self, local: Complex64, _scope: ReductionScope) -> Complex64 {
        local
    }

    fn fill_halo(
        &self,
        dst: &mut Field,
        src: &Field,
        geom: &DomainGeometry,
    ) -> Result<(), FieldError> {
        let dst_params = dst.params;
        for idx in 0..dst.len() {
            let base = geom.base_coords_of(dst_params.coords_of(idx));
            if !geom.in_base(base) {
                let wrapped = geom.wrap_into_base(base);
                dst.set_site(idx, src.site(src.params.site_index(wrapped)));
            }
        }
        Ok(())
    }
}

/// A partition communicator paired with a reduction scope, handed to every
/// reducing kernel so the scope decision is visible at each call site.
#[derive(Clone, Copy)]
pub struct ReduceCtx<'a> {
    comm: &'a dyn PartitionComm,
    scope: ReductionScope,
}

impl<'a> ReduceCtx<'a> {
    pub fn new(comm: &'a dyn PartitionComm, scope: ReductionScope) -> Self {
        Self { comm, scope }
    }

    /// Globally-scoped context for the outer iteration.
    pub fn global(comm: &'a dyn PartitionComm) -> Self {
        Self::new(comm, ReductionScope::Global)
    }

    /// Partition-local context for the inner solve.
    pub fn local(comm: &'a dyn PartitionComm) -> Self {
        Self::new(comm, ReductionScope::Local)
    }

    pub fn sum(&self, local: f64) -> f64 {
        self.comm.reduce_sum(local, self.scope)
    }

    pub fn sum_complex(&self, local: Complex64) -> Complex64 {
        self.comm.reduce_sum_complex(local, self.scope)
    }
}
