//! Lattice and extended-sublattice geometry.
//!
//! Coordinates are always full-lattice coordinates `[x0, x1, x2, x3]` with
//! dimension 0 fastest. Parity-subset fields store one checkerboard of the
//! full lattice; their storage extent in dimension 0 is half the full
//! extent, and sites are addressed by checkerboard index (lexicographic
//! rank divided by two).

use crate::problem::{ConfigError, Parity};

/// Base and overlap-extended sublattice extents.
///
/// `x` are the full base extents, `y[d] = x[d] + 2 * overlap[d]` the
/// extents of the overlap-extended sublattice the preconditioner operates
/// on. A site at extended coordinates `e` corresponds to base coordinates
/// `e - overlap`, which fall outside `[0, x)` exactly on halo sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainGeometry {
    /// Full base lattice extents
    pub x: [usize; 4],
    /// Extended extents, x + 2 * overlap per dimension
    pub y: [usize; 4],
    /// Per-dimension overlap widths
    pub overlap: [usize; 4],
}

impl DomainGeometry {
    /// Build the geometry for given base extents and overlap widths.
    ///
    /// Checkerboard addressing halves dimension 0, so an odd dimension-0
    /// extent is rejected. An overlap wider than the base extent would
    /// make halo sites wrap past their own source region and is rejected
    /// as well.
    pub fn new(x: [usize; 4], overlap: [usize; 4]) -> Result<Self, ConfigError> {
        if x[0] % 2 != 0 {
            return Err(ConfigError::OddParityExtent(x[0]));
        }
        let mut y = [0usize; 4];
        for d in 0..4 {
            if overlap[d] > x[d] {
                return Err(ConfigError::OverlapTooWide {
                    dim: d,
                    overlap: overlap[d],
                    extent: x[d],
                });
            }
            y[d] = x[d] + 2 * overlap[d];
        }
        Ok(Self { x, y, overlap })
    }

    /// Largest of the four overlap widths. Zero means the extend/crop
    /// stage degenerates to direct assignment.
    pub fn max_overlap(&self) -> usize {
        self.overlap.iter().copied().max().unwrap_or(0)
    }

    /// Sum of the overlap widths; the checkerboard of an extended site is
    /// the base checkerboard shifted by this amount.
    pub fn overlap_shift(&self) -> usize {
        self.overlap.iter().sum()
    }

    /// Number of sites in the full base lattice.
    pub fn base_volume(&self) -> usize {
        self.x.iter().product()
    }

    /// Number of sites in the extended sublattice.
    pub fn extended_volume(&self) -> usize {
        self.y.iter().product()
    }

    /// Base coordinates of an extended-sublattice site. Components are
    /// negative or >= x[d] on halo sites.
    pub fn base_coords_of(&self, ext: [usize; 4]) -> [isize; 4] {
        let mut base = [0isize; 4];
        for d in 0..4 {
            base[d] = ext[d] as isize - self.overlap[d] as isize;
        }
        base
    }

    /// Whether unwrapped base coordinates lie inside the local base
    /// sublattice.
    pub fn in_base(&self, coords: [isize; 4]) -> bool {
        (0..4).all(|d| coords[d] >= 0 && (coords[d] as usize) < self.x[d])
    }

    /// Wrap unwrapped base coordinates periodically into the base lattice.
    pub fn wrap_into_base(&self, coords: [isize; 4]) -> [usize; 4] {
        let mut wrapped = [0usize; 4];
        for d in 0..4 {
            let extent = self.x[d] as isize;
            wrapped[d] = coords[d].rem_euclid(extent) as usize;
        }
        wrapped
    }
}

/// Checkerboard parity of a site: coordinate sum modulo 2.
pub fn site_parity(coords: [usize; 4]) -> Parity {
    if (coords[0] + coords[1] + coords[2] + coords[3]) % 2 == 0 {
        Parity::Even
    } else {
        Parity::Odd
    }
}

/// Lexicographic rank of a site, dimension 0 fastest.
pub fn lexicographic_index(coords: [usize; 4], dims: [usize; 4]) -> usize {
    coords[0] + dims[0] * (coords[1] + dims[1] * (coords[2] + dims[2] * coords[3]))
}

/// Checkerboard index of a site within its parity block: the
/// lexicographic rank divided by two. `dims` are full extents with an
/// even dimension 0.
pub fn checkerboard_index(coords: [usize; 4], dims: [usize; 4]) -> usize {
    lexicographic_index(coords, dims) / 2
}

/// Reconstruct full coordinates from a checkerboard index and parity.
///
/// Inverse of [`checkerboard_index`] restricted to one parity:
/// `idx = x0/2 + (dims[0]/2) * (x1 + dims[1] * (x2 + dims[2] * x3))`.
pub fn coords_for_checkerboard(idx: usize, parity: Parity, dims: [usize; 4]) -> [usize; 4] {
    let half0 = dims[0] / 2;
    let x0_half = idx % half0;
    let mut rest = idx / half0;
    let x1 = rest % dims[1];
    rest /= dims[1];
    let x2 = rest % dims[2];
    let x3 = rest / dims[2];
    // Dimension 0 carries the parity adjustment.
    let x0 = 2 * x0_half + (x1 + x2 + x3 + parity.index()) % 2;
    [x0, x1, x2, x3]
}

/// Reconstruct full coordinates from a lexicographic rank.
pub fn coords_for_lexicographic(idx: usize, dims: [usize; 4]) -> [usize; 4] {
    let x0 = idx % dims[0];
    let mut rest = idx / dims[0];
    let x1 = rest % dims[1];
    rest /= dims[1];
    let x2 = rest % dims[2];
    let x3 = rest / dims[2];
    [x0, x1, x2, x3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_extents() {
        let geom = DomainGeometry::new([8, 4, 4, 4], [2, 1, 0, 1]).unwrap();
        assert_eq!(geom.y, [12, 6, 4, 6]);
        assert_eq!(geom.max_overlap(), 2);
        assert_eq!(geom.overlap_shift(), 4);
        assert_eq!(geom.base_volume(), 8 * 4 * 4 * 4);
        assert_eq!(geom.extended_volume(), 12 * 6 * 4 * 6);
    }

    #[test]
    fn test_overlap_wider_than_extent_is_rejected() {
        let err = DomainGeometry::new([4, 4, 4, 4], [0, 5, 0, 0]).unwrap_err();
        assert!(matches!(err, ConfigError::OverlapTooWide { dim: 1, .. }));
    }

    #[test]
    fn test_odd_dimension0_extent_is_rejected() {
        let err = DomainGeometry::new([3, 3, 1, 1], [0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, ConfigError::OddParityExtent(3));

        // Odd extents in the other dimensions are legitimate.
        assert!(DomainGeometry::new([4, 3, 1, 1], [0, 0, 0, 0]).is_ok());
    }

    #[test]
    fn test_base_coords_and_wrap() {
        let geom = DomainGeometry::new([4, 4, 4, 4], [1, 1, 1, 1]).unwrap();
        assert_eq!(geom.base_coords_of([0, 1, 5, 2]), [-1, 0, 4, 1]);
        assert!(!geom.in_base([-1, 0, 4, 1]));
        assert!(geom.in_base([0, 0, 3, 1]));
        assert_eq!(geom.wrap_into_base([-1, 0, 4, 1]), [3, 0, 0, 1]);
    }

    #[test]
    fn test_checkerboard_round_trip() {
        let dims = [4, 4, 2, 2];
        for parity in [Parity::Even, Parity::Odd] {
            let half_volume: usize = dims.iter().product::<usize>() / 2;
            for idx in 0..half_volume {
                let coords = coords_for_checkerboard(idx, parity, dims);
                assert_eq!(site_parity(coords), parity);
                assert_eq!(checkerboard_index(coords, dims), idx);
                for d in 0..4 {
                    assert!(coords[d] < dims[d]);
                }
            }
        }
    }

    #[test]
    fn test_lexicographic_round_trip() {
        let dims = [4, 2, 3, 2];
        let volume: usize = dims.iter().product();
        for idx in 0..volume {
            let coords = coords_for_lexicographic(idx, dims);
            assert_eq!(lexicographic_index(coords, dims), idx);
        }
    }

    #[test]
    fn test_same_parity_sites_share_no_checkerboard_index() {
        let dims = [4, 2, 2, 2];
        let mut seen = vec![false; dims.iter().product::<usize>() / 2];
        for x3 in 0..dims[3] {
            for x2 in 0..dims[2] {
                for x1 in 0..dims[1] {
                    for x0 in 0..dims[0] {
                        let coords = [x0, x1, x2, x3];
                        if site_parity(coords) == Parity::Even {
                            let idx = checkerboard_index(coords, dims);
                            assert!(!seen[idx], "collision at {:?}", coords);
                            seen[idx] = true;
                        }
                    }
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
