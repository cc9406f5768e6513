//! Lattice fields: owned complex-valued site data plus the attributes the
//! geometry and kernel layers dispatch on.
//!
//! A field stores one complex value per site in a contiguous vector at
//! either storage precision. Precision is a runtime attribute so that the
//! three solver tiers (full, sloppy, precondition) share one container
//! type; kernels match on the storage once and run over slices.

pub mod kernels;

use num_complex::{Complex32, Complex64};
use thiserror::Error;

use crate::geometry::{
    checkerboard_index, coords_for_checkerboard, coords_for_lexicographic, lexicographic_index,
    site_parity, DomainGeometry,
};
use crate::problem::{Parity, Precision, SiteOrder, SiteSubset};

/// Field shape and storage attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldParams {
    /// Storage extents per dimension. For a `Parity` subset this is the
    /// full lattice with dimension 0 halved.
    pub dims: [usize; 4],

    /// Storage precision
    pub precision: Precision,

    /// Which sites are stored
    pub subset: SiteSubset,

    /// Stored checkerboard (meaningful only for `Parity` subsets)
    pub parity: Parity,

    /// Site ordering for `Full` subsets. `EvenOdd` needs an even
    /// dimension-0 extent.
    pub order: SiteOrder,

    /// Halo width the field is prepared to exchange across partitions
    pub nface: usize,
}

impl FieldParams {
    /// Number of stored sites.
    pub fn site_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Full lattice extents: dimension 0 doubled for parity subsets.
    pub fn full_dims(&self) -> [usize; 4] {
        match self.subset {
            SiteSubset::Full => self.dims,
            SiteSubset::Parity => {
                let mut dims = self.dims;
                dims[0] *= 2;
                dims
            }
        }
    }

    /// Storage index of a site given in full-lattice coordinates.
    pub fn site_index(&self, coords: [usize; 4]) -> usize {
        match self.subset {
            SiteSubset::Parity => {
                debug_assert_eq!(site_parity(coords), self.parity);
                checkerboard_index(coords, self.full_dims())
            }
            SiteSubset::Full => match self.order {
                SiteOrder::Lexicographic => lexicographic_index(coords, self.dims),
                SiteOrder::EvenOdd => {
                    debug_assert_eq!(self.dims[0] % 2, 0);
                    let half = self.site_count() / 2;
                    match site_parity(coords) {
                        Parity::Even => checkerboard_index(coords, self.dims),
                        Parity::Odd => half + checkerboard_index(coords, self.dims),
                    }
                }
            },
        }
    }

    /// Full-lattice coordinates of a storage index. Inverse of
    /// [`site_index`](Self::site_index).
    pub fn coords_of(&self, idx: usize) -> [usize; 4] {
        match self.subset {
            SiteSubset::Parity => coords_for_checkerboard(idx, self.parity, self.full_dims()),
            SiteSubset::Full => match self.order {
                SiteOrder::Lexicographic => coords_for_lexicographic(idx, self.dims),
                SiteOrder::EvenOdd => {
                    let half = self.site_count() / 2;
                    if idx < half {
                        coords_for_checkerboard(idx, Parity::Even, self.dims)
                    } else {
                        coords_for_checkerboard(idx - half, Parity::Odd, self.dims)
                    }
                }
            },
        }
    }

    /// Parameters of the overlap-extended scratch field the preconditioner
    /// operates on: extents grown to the extended sublattice (dimension 0
    /// halved again for parity subsets), the stored checkerboard shifted by
    /// the total overlap, ordering inherited, no halo of its own.
    pub fn for_extended(&self, geom: &DomainGeometry, precision: Precision) -> FieldParams {
        let dims = match self.subset {
            SiteSubset::Full => geom.y,
            SiteSubset::Parity => {
                let mut dims = geom.y;
                dims[0] /= 2;
                dims
            }
        };
        FieldParams {
            dims,
            precision,
            subset: self.subset,
            parity: self.parity.shifted(geom.overlap_shift()),
            order: self.order,
            nface: 0,
        }
    }
}

/// Site storage at one of the two precisions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    F64(Vec<Complex64>),
    F32(Vec<Complex32>),
}

impl FieldData {
    fn zeros(precision: Precision, len: usize) -> FieldData {
        match precision {
            Precision::Double => FieldData::F64(vec![Complex64::new(0.0, 0.0); len]),
            Precision::Single => FieldData::F32(vec![Complex32::new(0.0, 0.0); len]),
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        match self {
            FieldData::F64(v) => v.len(),
            FieldData::F32(v) => v.len(),
        }
    }

    /// True when no values are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A lattice field: attributes plus owned site data.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub params: FieldParams,
    pub data: FieldData,
}

impl Field {
    /// Zero-filled field with the given attributes.
    pub fn zeros(params: FieldParams) -> Field {
        let data = FieldData::zeros(params.precision, params.site_count());
        Field { params, data }
    }

    /// Zero-filled field shaped like `other`.
    pub fn zeros_like(other: &Field) -> Field {
        Field::zeros(other.params)
    }

    /// Copy of `src` with attribute overrides, converting precision when
    /// the override differs. Extents, subset, checkerboard, and ordering
    /// must match; only precision and halo width may change.
    pub fn copy_of(src: &Field, params: FieldParams) -> Result<Field, FieldError> {
        if params.dims != src.params.dims {
            return Err(FieldError::ShapeMismatch {
                left: params.dims,
                right: src.params.dims,
            });
        }
        if params.subset != src.params.subset
            || params.parity != src.params.parity
            || params.order != src.params.order
        {
            return Err(FieldError::LayoutMismatch("copy cannot reorder sites"));
        }
        let mut dst = Field::zeros(params);
        kernels::convert_into(&mut dst, src)?;
        Ok(dst)
    }

    /// Number of stored sites.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no sites are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Storage precision.
    pub fn precision(&self) -> Precision {
        self.params.precision
    }

    /// Read a site by storage index, upcast to double.
    pub fn site(&self, idx: usize) -> Complex64 {
        match &self.data {
            FieldData::F64(v) => v[idx],
            FieldData::F32(v) => Complex64::new(v[idx].re as f64, v[idx].im as f64),
        }
    }

    /// Write a site by storage index, rounding to the storage precision.
    pub fn set_site(&mut self, idx: usize, value: Complex64) {
        match &mut self.data {
            FieldData::F64(v) => v[idx] = value,
            FieldData::F32(v) => v[idx] = Complex32::new(value.re as f32, value.im as f32),
        }
    }

    /// Reset every site to zero.
    pub fn zero_fill(&mut self) {
        match &mut self.data {
            FieldData::F64(v) => v.fill(Complex64::new(0.0, 0.0)),
            FieldData::F32(v) => v.fill(Complex32::new(0.0, 0.0)),
        }
    }
}

/// Field shape and storage errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field extents differ: {left:?} vs {right:?}")]
    ShapeMismatch { left: [usize; 4], right: [usize; 4] },

    #[error("field layouts are incompatible: {0}")]
    LayoutMismatch(&'static str),

    #[error("operands must share one precision, got {left} and {right}")]
    PrecisionMismatch { left: Precision, right: Precision },

    #[error("field carries a halo of width {nface}, the extension needs {needed}")]
    HaloTooNarrow { nface: usize, needed: usize },
}
