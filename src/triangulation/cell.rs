use super::{BoundaryId, SubdomainId, EXPECTED_NUM_LEVELS};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Position of a [Cell] in the per-level cell arrays of a Triangulation
///
/// Indices of existing cells are unaffected by the refinement of other cells.
/// Slots freed by coarsening may be handed to new cells later on.
///
/// `CellIndex`es are ordered by level, then by index. This is the order of the "all cells" traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex {
    pub level: usize,
    pub index: usize,
}

impl CellIndex {
    pub const fn new(level: usize, index: usize) -> Self {
        Self { level, index }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.level, self.index)
    }
}

/// State of one face of a [Cell]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceState {
    /// The face is shared with another cell. The neighbor is on the same level if such a cell exists,
    /// otherwise it is the (active) coarser cell on the other side of a hanging face.
    Neighbor(CellIndex),
    /// The face lies on the boundary of the domain
    Boundary(BoundaryId),
}

impl FaceState {
    pub fn boundary_id(&self) -> Option<BoundaryId> {
        match self {
            Self::Boundary(id) => Some(*id),
            Self::Neighbor(_) => None,
        }
    }

    pub fn neighbor(&self) -> Option<CellIndex> {
        match self {
            Self::Neighbor(cell) => Some(*cell),
            Self::Boundary(_) => None,
        }
    }
}

/// A tensor-product cell (segment, quadrilateral, hexahedron...) stored in a level array
///
/// ## Layout
/// Local numbering follows the tensor structure of the reference cell `[0, 1]^D`:
/// * bit `d` of a vertex number is the vertex's position (0: lower, 1: upper) along direction `d`
/// * face `2d + s` is made of the vertices whose bit `d` equals `s`
/// * bit `d` of a child number is the child's position along direction `d`
///
/// In 2D:
/// ```text
///               3
///         2 --------- 3              2 ----- * ----- 3
///         |           |              |   2   |   3   |
///      0  |           |  1           * ----- * ----- *
///         |           |              |   0   |   1   |
///         0 --------- 1              0 ----- * ----- 1
///               2
///      vertices and faces               children
/// ```
#[derive(Debug, Clone)]
pub struct Cell {
    pub(crate) vertices: SmallVec<[usize; 8]>,
    pub(crate) faces: SmallVec<[FaceState; 6]>,
    pub(crate) parent: Option<CellIndex>,
    pub(crate) children: Option<SmallVec<[usize; 8]>>,
    pub(crate) subdomain_id: SubdomainId,
    pub(crate) refine_flag: bool,
    pub(crate) coarsen_flag: bool,
    pub(crate) active_index: Option<usize>,
    pub(crate) used: bool,
}

impl Cell {
    pub(crate) fn new(
        vertices: SmallVec<[usize; 8]>,
        faces: SmallVec<[FaceState; 6]>,
        parent: Option<CellIndex>,
        subdomain_id: SubdomainId,
    ) -> Self {
        Self {
            vertices,
            faces,
            parent,
            children: None,
            subdomain_id,
            refine_flag: false,
            coarsen_flag: false,
            active_index: None,
            used: true,
        }
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    /// Cells without children are "active": they are the unit of computation for downstream consumers
    pub fn is_active(&self) -> bool {
        self.used && self.children.is_none()
    }
}

// ----------------------------------------------------------------------------------------------------
// Reference cell numbering
// ----------------------------------------------------------------------------------------------------

pub(crate) const fn vertices_per_cell(dim: usize) -> usize {
    1 << dim
}

pub(crate) const fn faces_per_cell(dim: usize) -> usize {
    2 * dim
}

/// Local vertex numbers of a face (ascending)
pub(crate) fn face_vertices(dim: usize, face: usize) -> SmallVec<[usize; 4]> {
    let (direction, side) = (face / 2, face % 2);
    (0..vertices_per_cell(dim))
        .filter(|v| (v >> direction) & 1 == side)
        .collect()
}

/// Does a child lie against face `face` of its parent
pub(crate) fn child_on_face(child: usize, face: usize) -> bool {
    (child >> (face / 2)) & 1 == face % 2
}

/// Key identifying a (sub-)object by its vertices, independent of local orientation
pub(crate) fn sorted_key<I: IntoIterator<Item = usize>>(vertices: I) -> SmallVec<[usize; 8]> {
    let mut key: SmallVec<[usize; 8]> = vertices.into_iter().collect();
    key.sort_unstable();
    key
}

// ----------------------------------------------------------------------------------------------------
// Stable cell identifiers
// ----------------------------------------------------------------------------------------------------

/// Identifier of a cell that survives refinement, coarsening and reuse of arena slots
///
/// A `CellId` is the index of the level-0 ancestor followed by the child numbers along the path from it.
/// It is written as `<coarse cell>_<path length>:<child numbers>`, e.g. `3_2:01`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    pub coarse_cell: usize,
    pub child_path: SmallVec<[u8; EXPECTED_NUM_LEVELS]>,
}

impl CellId {
    /// Level of the identified cell
    pub fn level(&self) -> usize {
        self.child_path.len()
    }

    /// Identifier of the parent cell, if any
    pub fn parent(&self) -> Option<Self> {
        if self.child_path.is_empty() {
            None
        } else {
            Some(Self {
                coarse_cell: self.coarse_cell,
                child_path: SmallVec::from(&self.child_path[..self.child_path.len() - 1]),
            })
        }
    }

    /// Is `self` an ancestor of (or equal to) `other`
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.coarse_cell == other.coarse_cell && other.child_path.starts_with(&self.child_path)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}:", self.coarse_cell, self.child_path.len())?;
        for child in self.child_path.iter() {
            write!(f, "{}", child)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCellIdError(String);

impl fmt::Display for ParseCellIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}' is not a valid CellId", self.0)
    }
}

impl std::error::Error for ParseCellIdError {}

impl FromStr for CellId {
    type Err = ParseCellIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCellIdError(s.to_string());

        let (coarse, rest) = s.split_once('_').ok_or_else(err)?;
        let (length, path) = rest.split_once(':').ok_or_else(err)?;

        let coarse_cell: usize = coarse.parse().map_err(|_| err())?;
        let length: usize = length.parse().map_err(|_| err())?;

        let child_path = path
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<SmallVec<[u8; EXPECTED_NUM_LEVELS]>>>()
            .ok_or_else(err)?;

        if child_path.len() != length {
            return Err(err());
        }

        Ok(Self {
            coarse_cell,
            child_path,
        })
    }
}
