//! The discretized-operator seam.
//!
//! The driver never defines the operator's stencil mathematics; it applies
//! opaque handles at three precision tiers. [`StencilOperator`] is the
//! reference implementation used by tests and benches: a shifted periodic
//! nearest-neighbor Laplacian, symmetric positive definite for any
//! positive mass shift.

use num_complex::{Complex32, Complex64};
use rayon::prelude::*;

use crate::field::{Field, FieldData, FieldError, FieldParams};
use crate::problem::{Precision, SiteSubset};

/// A linear operator over lattice fields at one precision tier.
pub trait LatticeOperator {
    /// out = A · input. `tmp` is scratch for implementations that need an
    /// intermediate field; it must be shaped like `out`.
    fn apply(&self, out: &mut Field, input: &Field, tmp: &mut Field)
        -> Result<(), FieldError>;

    /// The precision tier this handle was built for.
    fn precision(&self) -> Precision;
}

/// The three operator tiers the driver consumes: full precision for
/// residuals, sloppy for the per-iteration product, precondition for the
/// inner solve.
#[derive(Clone, Copy)]
pub struct LinearSystem<'a> {
    pub mat: &'a dyn LatticeOperator,
    pub mat_sloppy: &'a dyn LatticeOperator,
    pub mat_precon: &'a dyn LatticeOperator,
}

impl<'a> LinearSystem<'a> {
    pub fn new(
        mat: &'a dyn LatticeOperator,
        mat_sloppy: &'a dyn LatticeOperator,
        mat_precon: &'a dyn LatticeOperator,
    ) -> Self {
        Self { mat, mat_sloppy, mat_precon }
    }

    /// One handle for every tier.
    pub fn uniform(mat: &'a dyn LatticeOperator) -> Self {
        Self { mat, mat_sloppy: mat, mat_precon: mat }
    }
}

/// Shifted periodic Laplacian: out = (m² + 8)·in − Σ_d (in₊d + in₋d).
///
/// On parity-subset fields the hop distance is two sites so that
/// neighbors stay on the stored checkerboard; the operator is then the
/// same stencil on the distance-2 sublattice. Eigenvalues lie in
/// [m², m² + 16], so the operator is SPD whenever m² > 0.
#[derive(Debug, Clone, Copy)]
pub struct StencilOperator {
    mass2: f64,
    precision: Precision,
}

impl StencilOperator {
    pub fn new(mass2: f64, precision: Precision) -> Self {
        Self { mass2, precision }
    }
}

fn stencil_site(
    idx: usize,
    out_params: &FieldParams,
    input: &Field,
    mass2: f64,
) -> Complex64 {
    let coords = out_params.coords_of(idx);
    let full = out_params.full_dims();
    let step = match out_params.subset {
        SiteSubset::Full => 1,
        SiteSubset::Parity => 2,
    };

    let mut acc = (mass2 + 8.0) * input.site(input.params.site_index(coords));
    for d in 0..4 {
        let hop = step % full[d];
        let mut fwd = coords;
        fwd[d] = (coords[d] + hop) % full[d];
        let mut bwd = coords;
        bwd[d] = (coords[d] + full[d] - hop) % full[d];
        acc -= input.site(input.params.site_index(fwd));
        acc -= input.site(input.params.site_index(bwd));
    }
    acc
}

impl LatticeOperator for StencilOperator {
    fn apply(
        &self,
        out: &mut Field,
        input: &Field,
        _tmp: &mut Field,
    ) -> Result<(), FieldError> {
        if out.params.full_dims() != input.params.full_dims() {
            return Err(FieldError::ShapeMismatch {
                left: out.params.full_dims(),
                right: input.params.full_dims(),
            });
        }
        if out.params.subset != input.params.subset
            || out.params.parity != input.params.parity
        {
            return Err(FieldError::LayoutMismatch(
                "operator input and output must store the same sites",
            ));
        }

        let out_params = out.params;
        let mass2 = self.mass2;
        match &mut out.data {
            FieldData::F64(v) => {
                v.par_iter_mut().enumerate().for_each(|(idx, o)| {
                    *o = stencil_site(idx, &out_params, input, mass2);
                });
            }
            FieldData::F32(v) => {
                v.par_iter_mut().enumerate().for_each(|(idx, o)| {
                    let z = stencil_site(idx, &out_params, input, mass2);
                    *o = Complex32::new(z.re as f32, z.im as f32);
                });
            }
        }
        Ok(())
    }

    fn precision(&self) -> Precision {
        self.precision
    }
}
