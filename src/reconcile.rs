//! Reconciling declared dimension sizes with the planes actually present.
//!
//! Embedded metadata declares `SizeZ`, `SizeC` and `SizeT` for a series and lists fragments,
//! each mapping a run of directories onto logical planes. The fragments are replayed into an
//! occupancy cube indexed `[z][c][t]`, and the cube is matched against a fixed list of shapes.
//! A shape either confirms the declared sizes or collapses some axes to a single index. A cube
//! that matches no shape is an error; nothing is guessed.

use std::fmt;

use thiserror::Error;

use crate::dimensions::{to_zct, Axis, DimensionOrder, PlaneAddress, Sizes};

/// Reconciliation failures, reported with the offending fragment where there is one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReconcileError {
    /// The occupied planes form no supported layout.
    #[error(
        "{occupied} occupied planes match no plane layout for declared sizes Z={size_z} C={size_c} T={size_t}"
    )]
    NoCanonicalShape {
        /// Number of occupied cells.
        occupied: usize,
        /// Declared Z size.
        size_z: usize,
        /// Declared effective C size.
        size_c: usize,
        /// Declared T size.
        size_t: usize,
    },

    /// A fragment starts outside, or runs past the end of, the declared sizes.
    #[error("fragment {fragment} addresses plane (z={z}, c={c}, t={t}) outside the declared sizes")]
    FragmentOutOfRange {
        /// Index of the fragment.
        fragment: usize,
        /// Z of the first plane out of range.
        z: usize,
        /// C of the first plane out of range.
        c: usize,
        /// T of the first plane out of range.
        t: usize,
    },

    /// A fragment points at a directory the resource does not have.
    #[error("fragment {fragment} references directory {ifd} of resource {resource}, which has {ifd_count}")]
    IfdOutOfRange {
        /// Index of the fragment.
        fragment: usize,
        /// Resource the fragment points into.
        resource: usize,
        /// Directory index requested.
        ifd: usize,
        /// Directories present in the resource.
        ifd_count: usize,
    },

    /// The declared sizes describe far more planes than the resources hold.
    #[error(
        "declared sizes Z={size_z} C={size_c} T={size_t} exceed the {present} directories present"
    )]
    TooManyPlanes {
        /// Declared Z size.
        size_z: usize,
        /// Declared effective C size.
        size_c: usize,
        /// Declared T size.
        size_t: usize,
        /// Directories present over all resources.
        present: usize,
    },

    /// A declared size is zero.
    #[error("declared sizes Z={size_z} C={size_c} T={size_t} contain an empty axis")]
    EmptyDimension {
        /// Declared Z size.
        size_z: usize,
        /// Declared effective C size.
        size_c: usize,
        /// Declared T size.
        size_t: usize,
    },
}

/// Declared planes allowed per directory present; sparse acquisitions stay well below this.
pub const MAX_DECLARED_PER_IFD: usize = 4096;

/// Upper bound on the declared plane count of one series.
pub const MAX_DECLARED_PLANES: usize = 1 << 24;

/// A run of consecutive planes stored in consecutive directories of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneFragment {
    /// Resource (file) the directories belong to.
    pub resource: usize,
    /// First directory of the run.
    pub ifd: usize,
    /// Logical Z of the first plane.
    pub first_z: usize,
    /// Logical effective C of the first plane.
    pub first_c: usize,
    /// Logical T of the first plane.
    pub first_t: usize,
    /// Number of planes in the run.
    pub plane_count: usize,
}

impl PlaneFragment {
    /// A run of `plane_count` planes from directory `ifd` of `resource`, starting at `(0, 0, 0)`.
    pub fn new(resource: usize, ifd: usize, plane_count: usize) -> Self {
        Self {
            resource,
            ifd,
            first_z: 0,
            first_c: 0,
            first_t: 0,
            plane_count,
        }
    }

    /// Set the logical start of the run.
    pub fn starting_at(mut self, z: usize, c: usize, t: usize) -> Self {
        self.first_z = z;
        self.first_c = c;
        self.first_t = t;
        self
    }
}

/// The layouts an occupancy cube can take, in matching priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalShape {
    /// Every cell is occupied; sizes are kept.
    Full,
    /// Only `z = 0` is occupied, fully across C and T.
    CollapsedZ,
    /// Only `t = 0` is occupied, fully across Z and C.
    CollapsedT,
    /// Only `c = 0` is occupied, fully across Z and T.
    CollapsedC,
    /// Only Z varies.
    FreeZ,
    /// Only T varies.
    FreeT,
    /// Only C varies.
    FreeC,
    /// A single plane.
    SinglePlane,
}

impl CanonicalShape {
    const PRIORITY: [(CanonicalShape, &'static [Axis]); 8] = [
        (CanonicalShape::Full, &[]),
        (CanonicalShape::CollapsedZ, &[Axis::Z]),
        (CanonicalShape::CollapsedT, &[Axis::T]),
        (CanonicalShape::CollapsedC, &[Axis::C]),
        (CanonicalShape::FreeZ, &[Axis::C, Axis::T]),
        (CanonicalShape::FreeT, &[Axis::Z, Axis::C]),
        (CanonicalShape::FreeC, &[Axis::Z, Axis::T]),
        (CanonicalShape::SinglePlane, &[Axis::Z, Axis::C, Axis::T]),
    ];

    /// Axes this shape collapses to a single index.
    pub fn collapsed_axes(&self) -> &'static [Axis] {
        Self::PRIORITY
            .iter()
            .find(|(shape, _)| shape == self)
            .map(|(_, axes)| *axes)
            .unwrap_or(&[])
    }
}

impl fmt::Display for CanonicalShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where a logical plane is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneSource {
    /// Resource holding the plane.
    pub resource: usize,
    /// Directory within the resource.
    pub ifd: usize,
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Reconciled Z size.
    pub size_z: usize,
    /// Reconciled effective C size.
    pub size_c: usize,
    /// Reconciled T size.
    pub size_t: usize,
    /// The shape the occupancy matched.
    pub shape: CanonicalShape,
    planes: Vec<PlaneSource>,
}

impl Reconciliation {
    /// Number of logical planes after reconciliation.
    pub fn image_count(&self) -> usize {
        self.planes.len()
    }

    /// Source of logical plane `no`, in the order the reconciliation was run with.
    pub fn plane(&self, no: usize) -> Option<PlaneSource> {
        self.planes.get(no).copied()
    }

    /// All plane sources, indexed by logical plane.
    pub fn planes(&self) -> &[PlaneSource] {
        &self.planes
    }
}

/// Occupancy of every `(z, c, t)` cell.
struct OccupancyCube {
    sizes: Sizes,
    cells: Vec<Option<PlaneSource>>,
}

impl OccupancyCube {
    /// `cells` must be the already bounded product of `sizes`.
    fn new(sizes: Sizes, cells: usize) -> Self {
        Self {
            sizes,
            cells: vec![None; cells],
        }
    }

    fn offset(&self, address: PlaneAddress) -> usize {
        (address.z * self.sizes.c + address.c) * self.sizes.t + address.t
    }

    fn get(&self, address: PlaneAddress) -> Option<PlaneSource> {
        self.cells[self.offset(address)]
    }

    fn mark(&mut self, address: PlaneAddress, source: PlaneSource) {
        let offset = self.offset(address);
        if self.cells[offset].is_none() {
            self.cells[offset] = Some(source);
        } else {
            tracing::trace!(?address, "plane claimed by more than one fragment");
        }
    }

    fn occupied(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    fn addresses(&self) -> impl Iterator<Item = PlaneAddress> + '_ {
        (0..self.sizes.z).flat_map(move |z| {
            (0..self.sizes.c)
                .flat_map(move |c| (0..self.sizes.t).map(move |t| PlaneAddress::new(z, c, t)))
        })
    }

    /// Every occupied cell lies at index 0 of each collapsed axis, and the index-0 slice is
    /// fully occupied along the remaining axes.
    fn matches(&self, collapsed: &[Axis]) -> bool {
        self.addresses().all(|address| {
            let in_slice = collapsed.iter().all(|axis| address.get(*axis) == 0);
            self.get(address).is_some() == in_slice
        })
    }
}

/// Replays fragments into an occupancy cube and classifies the result.
///
/// `ifd_counts[r]` is the number of directories physically present in resource `r`.
#[derive(Debug, Clone)]
pub struct Reconciler {
    order: DimensionOrder,
    sizes: Sizes,
}

impl Reconciler {
    /// Reconcile against the declared sizes; `size_c` is the effective channel count.
    ///
    /// Fragments are replayed in `order`: the first non-XY axis advances fastest and wraps at its
    /// declared size into the next one.
    pub fn new(order: DimensionOrder, size_z: usize, size_c: usize, size_t: usize) -> Self {
        Self {
            order,
            sizes: Sizes {
                z: size_z,
                c: size_c,
                t: size_t,
            },
        }
    }

    /// Run the reconciliation.
    pub fn reconcile(
        &self,
        fragments: &[PlaneFragment],
        ifd_counts: &[usize],
    ) -> Result<Reconciliation, ReconcileError> {
        let sizes = self.sizes;
        if sizes.z == 0 || sizes.c == 0 || sizes.t == 0 {
            return Err(ReconcileError::EmptyDimension {
                size_z: sizes.z,
                size_c: sizes.c,
                size_t: sizes.t,
            });
        }

        let present = ifd_counts.iter().fold(0usize, |sum, n| sum.saturating_add(*n));
        let limit = present
            .max(1)
            .saturating_mul(MAX_DECLARED_PER_IFD)
            .min(MAX_DECLARED_PLANES);
        let cells = sizes
            .checked_product()
            .filter(|cells| *cells <= limit)
            .ok_or(ReconcileError::TooManyPlanes {
                size_z: sizes.z,
                size_c: sizes.c,
                size_t: sizes.t,
                present,
            })?;

        let mut cube = OccupancyCube::new(sizes, cells);
        for (index, fragment) in fragments.iter().enumerate() {
            self.replay(&mut cube, index, fragment, ifd_counts)?;
        }

        let (shape, collapsed) = CanonicalShape::PRIORITY
            .iter()
            .find(|(_, collapsed)| cube.matches(collapsed))
            .copied()
            .ok_or(ReconcileError::NoCanonicalShape {
                occupied: cube.occupied(),
                size_z: sizes.z,
                size_c: sizes.c,
                size_t: sizes.t,
            })?;

        let reconciled = |axis: Axis| {
            if collapsed.contains(&axis) {
                1
            } else {
                sizes.get(axis)
            }
        };
        let (size_z, size_c, size_t) = (reconciled(Axis::Z), reconciled(Axis::C), reconciled(Axis::T));
        tracing::debug!(%shape, size_z, size_c, size_t, "reconciled plane layout");

        let mut planes = Vec::with_capacity(size_z * size_c * size_t);
        for no in 0..size_z * size_c * size_t {
            // Cannot fail: `no` is below the product of the reconciled sizes
            let Ok(address) = to_zct(&self.order, size_z, size_c, size_t, no) else {
                break;
            };
            if let Some(source) = cube.get(address) {
                planes.push(source);
            }
        }

        Ok(Reconciliation {
            size_z,
            size_c,
            size_t,
            shape,
            planes,
        })
    }

    fn replay(
        &self,
        cube: &mut OccupancyCube,
        index: usize,
        fragment: &PlaneFragment,
        ifd_counts: &[usize],
    ) -> Result<(), ReconcileError> {
        let ifd_count = ifd_counts.get(fragment.resource).copied().unwrap_or(0);
        let mut address = PlaneAddress::new(fragment.first_z, fragment.first_c, fragment.first_t);

        for q in 0..fragment.plane_count {
            let out_of_range = address.z >= self.sizes.z
                || address.c >= self.sizes.c
                || address.t >= self.sizes.t;
            if out_of_range {
                return Err(ReconcileError::FragmentOutOfRange {
                    fragment: index,
                    z: address.z,
                    c: address.c,
                    t: address.t,
                });
            }

            let ifd = fragment.ifd + q;
            if ifd >= ifd_count {
                return Err(ReconcileError::IfdOutOfRange {
                    fragment: index,
                    resource: fragment.resource,
                    ifd,
                    ifd_count,
                });
            }

            cube.mark(
                address,
                PlaneSource {
                    resource: fragment.resource,
                    ifd,
                },
            );
            address = self.advance(address);
        }
        Ok(())
    }

    /// Step to the next plane in dimension order; each axis wraps at its declared size into the
    /// next slower one.
    ///
    /// The slowest axis does not wrap back to 0. A fragment running past the last plane is
    /// reported as [`ReconcileError::FragmentOutOfRange`] instead of overwriting its own start,
    /// which is stricter than wrapping every axis.
    fn advance(&self, mut address: PlaneAddress) -> PlaneAddress {
        let axes = self.order.axes();
        for (rank, axis) in axes.iter().enumerate() {
            let next = address.get(*axis) + 1;
            let is_slowest = rank == axes.len() - 1;
            if next < self.sizes.get(*axis) || is_slowest {
                address.set(*axis, next);
                return address;
            }
            address.set(*axis, 0);
        }
        address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_cover(size_z: usize, size_c: usize, size_t: usize) -> Vec<PlaneFragment> {
        vec![PlaneFragment::new(0, 0, size_z * size_c * size_t)]
    }

    #[test]
    fn full_cover_keeps_sizes() {
        let reconciler = Reconciler::new(DimensionOrder::XYZCT, 3, 2, 4);
        let result = reconciler.reconcile(&full_cover(3, 2, 4), &[24]).unwrap();
        assert_eq!(result.shape, CanonicalShape::Full);
        assert_eq!((result.size_z, result.size_c, result.size_t), (3, 2, 4));
        assert_eq!(result.image_count(), 24);
        // Replay in XYZCT order maps plane `no` to directory `no`
        for no in 0..24 {
            assert_eq!(result.plane(no), Some(PlaneSource { resource: 0, ifd: no }));
        }
    }

    #[test]
    fn only_first_z_collapses_z() {
        let reconciler = Reconciler::new(DimensionOrder::XYZCT, 5, 2, 3);
        // One fragment per (c, t) at z = 0
        let fragments: Vec<_> = (0..3)
            .flat_map(|t| (0..2).map(move |c| (c, t)))
            .enumerate()
            .map(|(i, (c, t))| PlaneFragment::new(0, i, 1).starting_at(0, c, t))
            .collect();
        let result = reconciler.reconcile(&fragments, &[6]).unwrap();
        assert_eq!(result.shape, CanonicalShape::CollapsedZ);
        assert_eq!((result.size_z, result.size_c, result.size_t), (1, 2, 3));
        assert_eq!(result.image_count(), 6);
    }

    #[test]
    fn free_axis_shapes() {
        // Declared 4 x 3 x 5 but only T varies.
        let reconciler = Reconciler::new(DimensionOrder::XYTCZ, 4, 3, 5);
        let result = reconciler
            .reconcile(&[PlaneFragment::new(0, 0, 5)], &[5])
            .unwrap();
        assert_eq!(result.shape, CanonicalShape::FreeT);
        assert_eq!((result.size_z, result.size_c, result.size_t), (1, 1, 5));

        let reconciler = Reconciler::new(DimensionOrder::XYCZT, 2, 3, 2);
        let result = reconciler
            .reconcile(&[PlaneFragment::new(0, 0, 3)], &[3])
            .unwrap();
        assert_eq!(result.shape, CanonicalShape::FreeC);
        assert_eq!((result.size_z, result.size_c, result.size_t), (1, 3, 1));
    }

    #[test]
    fn single_plane() {
        let reconciler = Reconciler::new(DimensionOrder::XYZCT, 2, 2, 2);
        let result = reconciler
            .reconcile(&[PlaneFragment::new(0, 0, 1)], &[1])
            .unwrap();
        assert_eq!(result.shape, CanonicalShape::SinglePlane);
        assert_eq!(result.image_count(), 1);
    }

    #[test]
    fn unclassifiable_cube_fails() {
        let reconciler = Reconciler::new(DimensionOrder::XYZCT, 2, 2, 1);
        // Planes at (0,0) and (1,1): a diagonal
        let fragments = [
            PlaneFragment::new(0, 0, 1),
            PlaneFragment::new(0, 1, 1).starting_at(1, 1, 0),
        ];
        assert!(matches!(
            reconciler.reconcile(&fragments, &[2]),
            Err(ReconcileError::NoCanonicalShape { occupied: 2, .. })
        ));
    }

    #[test]
    fn fragment_errors() {
        let reconciler = Reconciler::new(DimensionOrder::XYZCT, 2, 1, 1);
        assert!(matches!(
            reconciler.reconcile(&[PlaneFragment::new(0, 0, 3)], &[3]),
            Err(ReconcileError::FragmentOutOfRange {
                fragment: 0,
                z: 0,
                c: 0,
                t: 1
            })
        ));
        assert!(matches!(
            reconciler.reconcile(&[PlaneFragment::new(0, 1, 2)], &[2]),
            Err(ReconcileError::IfdOutOfRange {
                fragment: 0,
                ifd: 2,
                ifd_count: 2,
                ..
            })
        ));
        assert!(matches!(
            Reconciler::new(DimensionOrder::XYZCT, 0, 1, 1).reconcile(&[], &[]),
            Err(ReconcileError::EmptyDimension { .. })
        ));
    }

    #[test]
    fn oversized_declarations_are_refused() {
        let huge = Reconciler::new(DimensionOrder::XYZCT, 1 << 40, 1, 1 << 30);
        assert!(matches!(
            huge.reconcile(&[PlaneFragment::new(0, 0, 1)], &[1]),
            Err(ReconcileError::TooManyPlanes { present: 1, .. })
        ));

        let sparse = Reconciler::new(DimensionOrder::XYZCT, 200_000, 1, 200_000);
        assert!(matches!(
            sparse.reconcile(&[PlaneFragment::new(0, 0, 1)], &[1]),
            Err(ReconcileError::TooManyPlanes { .. })
        ));

        // Heavily sparse but plausible: one plane of a 64-slice stack.
        let result = Reconciler::new(DimensionOrder::XYZCT, 64, 1, 1)
            .reconcile(&[PlaneFragment::new(0, 0, 1)], &[1])
            .unwrap();
        assert_eq!(result.shape, CanonicalShape::SinglePlane);
    }
}
