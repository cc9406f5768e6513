//! Overlap extension and interior restriction.
//!
//! `extend` moves a base-sublattice field onto its overlap-extended copy:
//! interior sites are copied directly (offset by the overlap widths), halo
//! sites are sourced from neighbor partitions through the communication
//! seam. `crop` is the inverse restriction back to base coordinates. Both
//! convert precision between the tiers they bridge. At zero overlap both
//! degenerate to assignment; the driver bypasses them entirely in that
//! case.

use crate::domain::comm::PartitionComm;
use crate::field::{Field, FieldError};
use crate::geometry::DomainGeometry;
use crate::problem::SiteSubset;

fn check_geometry(
    base: &Field,
    extended: &Field,
    geom: &DomainGeometry,
) -> Result<(), FieldError> {
    if base.params.full_dims() != geom.x {
        return Err(FieldError::ShapeMismatch {
            left: base.params.full_dims(),
            right: geom.x,
        });
    }
    if extended.params.full_dims() != geom.y {
        return Err(FieldError::ShapeMismatch {
            left: extended.params.full_dims(),
            right: geom.y,
        });
    }
    if base.params.subset != extended.params.subset {
        return Err(FieldError::LayoutMismatch(
            "base and extended fields must store the same site subset",
        ));
    }
    if base.params.subset == SiteSubset::Parity
        && extended.params.parity != base.params.parity.shifted(geom.overlap_shift())
    {
        return Err(FieldError::LayoutMismatch(
            "extended checkerboard must be the base checkerboard shifted by the total overlap",
        ));
    }
    Ok(())
}

/// Fill every site of the extended field from the base field: interior by
/// direct copy, halo through the partition communicator. The base field
/// must carry a halo at least as wide as the largest overlap.
pub fn extend(
    dst: &mut Field,
    src: &Field,
    geom: &DomainGeometry,
    comm: &dyn PartitionComm,
) -> Result<(), FieldError> {
    check_geometry(src, dst, geom)?;
    let needed = geom.max_overlap();
    if src.params.nface < needed {
        return Err(FieldError::HaloTooNarrow {
            nface: src.params.nface,
            needed,
        });
    }

    let dst_params = dst.params;
    for idx in 0..dst.len() {
        let base = geom.base_coords_of(dst_params.coords_of(idx));
        if geom.in_base(base) {
            let coords = [
                base[0] as usize,
                base[1] as usize,
                base[2] as usize,
                base[3] as usize,
            ];
            dst.set_site(idx, src.site(src.params.site_index(coords)));
        }
    }
    comm.fill_halo(dst, src, geom)
}

/// Restrict the extended field back to base coordinates, dropping the
/// halo. Purely local.
pub fn crop(dst: &mut Field, src: &Field, geom: &DomainGeometry) -> Result<(), FieldError> {
    check_geometry(dst, src, geom)?;

    let dst_params = dst.params;
    for idx in 0..dst.len() {
        let base = dst_params.coords_of(idx);
        let ext = [
            base[0] + geom.overlap[0],
            base[1] + geom.overlap[1],
            base[2] + geom.overlap[2],
            base[3] + geom.overlap[3],
        ];
        dst.set_site(idx, src.site(src.params.site_index(ext)));
    }
    Ok(())
}
