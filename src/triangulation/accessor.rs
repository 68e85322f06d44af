use super::boundary::mean;
use super::cell::{face_vertices, faces_per_cell, Cell, CellId, CellIndex, FaceState};
use super::{BoundaryId, Point, SubdomainId, Triangulation};

use smallvec::SmallVec;
use std::fmt;

/// Read-only view of one cell of a [Triangulation]
///
/// `CellRef`s are small `Copy` values (a borrow of the triangulation and a [CellIndex]); holding one keeps the
/// triangulation borrowed, so it can't be refined, merged into or cleared in the meantime.
#[derive(Clone, Copy)]
pub struct CellRef<'a, const D: usize> {
    tria: &'a Triangulation<D>,
    index: CellIndex,
}

impl<'a, const D: usize> CellRef<'a, D> {
    pub(crate) fn new(tria: &'a Triangulation<D>, index: CellIndex) -> Self {
        Self { tria, index }
    }

    fn data(&self) -> &'a Cell {
        self.tria.cell_unchecked(self.index)
    }

    pub fn triangulation(&self) -> &'a Triangulation<D> {
        self.tria
    }

    pub fn index(&self) -> CellIndex {
        self.index
    }

    pub fn level(&self) -> usize {
        self.index.level
    }

    /// Refinement-surviving identifier of this cell
    pub fn id(&self) -> CellId {
        self.tria
            .cell_id(self.index)
            .expect("CellRefs always point to existing cells")
    }

    pub fn is_active(&self) -> bool {
        self.data().is_active()
    }

    pub fn has_children(&self) -> bool {
        self.data().has_children()
    }

    /// Position of this cell in the active-cell ordering, `None` if it has children
    pub fn active_cell_index(&self) -> Option<usize> {
        self.data().active_index
    }

    pub fn parent(&self) -> Option<Self> {
        self.data().parent.map(|parent| Self::new(self.tria, parent))
    }

    pub fn n_children(&self) -> usize {
        self.data().children.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    pub fn child(&self, child_no: usize) -> Option<Self> {
        self.data()
            .children
            .as_ref()
            .and_then(|children| children.get(child_no))
            .map(|child| Self::new(self.tria, CellIndex::new(self.index.level + 1, *child)))
    }

    pub fn children(&self) -> impl Iterator<Item = CellRef<'a, D>> + 'a {
        let tria = self.tria;
        let level = self.index.level + 1;
        self.data()
            .children
            .iter()
            .flat_map(|children| children.iter())
            .map(move |child| CellRef::new(tria, CellIndex::new(level, *child)))
    }

    // ----------------------------------------------------------------------------------------------------
    // Geometry
    // ----------------------------------------------------------------------------------------------------

    /// Global indices of the cell's vertices (tensor-product order)
    pub fn vertex_indices(&self) -> &'a [usize] {
        &self.data().vertices
    }

    pub fn vertex_index(&self, vertex: usize) -> usize {
        self.data().vertices[vertex]
    }

    pub fn vertex(&self, vertex: usize) -> &'a Point<D> {
        self.tria.vertices.point(self.data().vertices[vertex])
    }

    pub fn vertices(&self) -> SmallVec<[Point<D>; 8]> {
        self.data()
            .vertices
            .iter()
            .map(|v| *self.tria.vertices.point(*v))
            .collect()
    }

    /// Average of the cell's vertices
    pub fn center(&self) -> Point<D> {
        mean(&self.vertices())
    }

    /// Largest distance between two opposite vertices
    pub fn diameter(&self) -> f64 {
        let n = self.data().vertices.len();
        (0..n / 2)
            .map(|v| nalgebra::distance(self.vertex(v), self.vertex(n - 1 - v)))
            .fold(0.0, f64::max)
    }

    // ----------------------------------------------------------------------------------------------------
    // Faces
    // ----------------------------------------------------------------------------------------------------

    pub fn n_faces(&self) -> usize {
        faces_per_cell(D)
    }

    pub fn face(&self, face_no: usize) -> FaceRef<'a, D> {
        assert!(
            face_no < faces_per_cell(D),
            "Face {} does not exist on a {}D cell!",
            face_no,
            D
        );
        FaceRef {
            cell: *self,
            face_no,
        }
    }

    pub fn faces(&self) -> impl Iterator<Item = FaceRef<'a, D>> + 'a {
        let cell = *self;
        (0..faces_per_cell(D)).map(move |face_no| FaceRef { cell, face_no })
    }

    pub fn face_state(&self, face_no: usize) -> FaceState {
        self.data().faces[face_no]
    }

    pub fn at_boundary(&self, face_no: usize) -> bool {
        matches!(self.face_state(face_no), FaceState::Boundary(_))
    }

    /// Does any face of this cell lie on the boundary
    pub fn touches_boundary(&self) -> bool {
        self.data()
            .faces
            .iter()
            .any(|f| matches!(f, FaceState::Boundary(_)))
    }

    pub fn boundary_id(&self, face_no: usize) -> Option<BoundaryId> {
        self.face_state(face_no).boundary_id()
    }

    /// Neighbor across a face: on the same level if it exists, otherwise the coarser cell on the other side
    pub fn neighbor(&self, face_no: usize) -> Option<CellIndex> {
        self.face_state(face_no).neighbor()
    }

    pub fn neighbor_cell(&self, face_no: usize) -> Option<Self> {
        self.neighbor(face_no).map(|n| Self::new(self.tria, n))
    }

    // ----------------------------------------------------------------------------------------------------
    // Tags and flags
    // ----------------------------------------------------------------------------------------------------

    pub fn subdomain_id(&self) -> SubdomainId {
        self.data().subdomain_id
    }

    pub fn refine_flag_set(&self) -> bool {
        self.data().refine_flag
    }

    pub fn coarsen_flag_set(&self) -> bool {
        self.data().coarsen_flag
    }
}

impl<'a, const D: usize> PartialEq for CellRef<'a, D> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tria, other.tria) && self.index == other.index
    }
}

impl<'a, const D: usize> Eq for CellRef<'a, D> {}

impl<'a, const D: usize> fmt::Debug for CellRef<'a, D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CellRef")
            .field("index", &self.index)
            .field("vertices", &self.data().vertices)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Read-only view of one face of a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceRef<'a, const D: usize> {
    cell: CellRef<'a, D>,
    face_no: usize,
}

impl<'a, const D: usize> FaceRef<'a, D> {
    pub fn cell(&self) -> CellRef<'a, D> {
        self.cell
    }

    pub fn face_no(&self) -> usize {
        self.face_no
    }

    pub fn at_boundary(&self) -> bool {
        self.cell.at_boundary(self.face_no)
    }

    /// `None` for interior faces
    pub fn boundary_id(&self) -> Option<BoundaryId> {
        self.cell.boundary_id(self.face_no)
    }

    pub fn neighbor(&self) -> Option<CellRef<'a, D>> {
        self.cell.neighbor_cell(self.face_no)
    }

    pub fn vertex_indices(&self) -> SmallVec<[usize; 4]> {
        face_vertices(D, self.face_no)
            .iter()
            .map(|v| self.cell.vertex_index(*v))
            .collect()
    }

    pub fn vertices(&self) -> SmallVec<[Point<D>; 4]> {
        face_vertices(D, self.face_no)
            .iter()
            .map(|v| *self.cell.vertex(*v))
            .collect()
    }

    pub fn center(&self) -> Point<D> {
        mean(&self.vertices())
    }
}
