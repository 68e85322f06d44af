/// Cell accessors handed out by traversals
pub mod accessor;
/// Shape descriptions used to place new vertices on curved boundaries
pub mod boundary;
/// Cells, faces and identifiers
pub mod cell;
/// Ordered and predicate-filtered traversal
pub mod iteration;
/// Reading and writing meshes as JSON
pub mod json_io;
/// Execution of refinement and coarsening flags
mod refinement;
/// Deduplicated storage of vertex coordinates
pub(crate) mod vertex;

use crate::error::TriaError;
use accessor::CellRef;
use boundary::{Boundary, BoundaryRegistry};
pub use cell::CellIndex;
use cell::{
    child_on_face, face_vertices, faces_per_cell, sorted_key, vertices_per_cell, Cell, CellId,
    FaceState,
};
use vertex::{VertexMatcher, VertexStore};

use log::{debug, info};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A point in D-dimensional real space
pub type Point<const D: usize> = nalgebra::Point<f64, D>;

/// Tag identifying which named boundary a face belongs to
pub type BoundaryId = u32;

/// Tag used to partition active cells
pub type SubdomainId = u32;

/// Boundary id given to boundary faces that were not assigned one
pub const DEFAULT_BOUNDARY_ID: BoundaryId = 0;

/// Reserved boundary id. Faces can never carry it.
pub const INVALID_BOUNDARY_ID: BoundaryId = BoundaryId::MAX;

/// Default maximum refinement level. Refinements creating cells beyond this level fail.
pub const MAX_REFINEMENT_LEVEL: usize = 16;

/// Default distance under which two coordinates are considered to be the same vertex
pub const VERTEX_MATCHING_TOLERANCE: f64 = 1e-12;

/// The expected refinement depth. This determines the stack allocation size of some `SmallVec`s related to refinement.
pub const EXPECTED_NUM_LEVELS: usize = 8;

/// Configuration of a [Triangulation]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriaSettings {
    /// Refinements that would create cells on a level above this one are rejected
    pub max_level: usize,
    /// Vertices closer than this are merged when a triangulation is created
    pub vertex_tolerance: f64,
}

impl Default for TriaSettings {
    fn default() -> Self {
        Self {
            max_level: MAX_REFINEMENT_LEVEL,
            vertex_tolerance: VERTEX_MATCHING_TOLERANCE,
        }
    }
}

/// Description of a coarse cell passed to [Triangulation::create_triangulation]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellData {
    /// `2^D` vertex indices in tensor-product order (see [Cell])
    pub vertices: SmallVec<[usize; 8]>,
    pub subdomain_id: SubdomainId,
}

impl CellData {
    pub fn new(vertices: &[usize]) -> Self {
        Self {
            vertices: SmallVec::from(vertices),
            subdomain_id: 0,
        }
    }
}

/// Boundary id of one coarse boundary face, identified by its vertices (in any order)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryFaceData {
    pub vertices: SmallVec<[usize; 4]>,
    pub boundary_id: BoundaryId,
}

impl BoundaryFaceData {
    pub fn new(vertices: &[usize], boundary_id: BoundaryId) -> Self {
        Self {
            vertices: SmallVec::from(vertices),
            boundary_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Level {
    pub(crate) cells: Vec<Cell>,
    pub(crate) free_slots: Vec<usize>,
}

/// A hierarchical, adaptively refined mesh of tensor-product cells in D dimensions
///
/// The `Triangulation` owns:
/// * the geometry store (vertex coordinates, identified by stable indices)
/// * one array of [Cell]s per refinement level. Parents and children refer to one another by [CellIndex],
///     cells are only ever owned by their level's array.
/// * the registry mapping boundary ids to [Boundary] descriptions
///
/// A `Triangulation` is created empty and populated once (by a generator, [Triangulation::create_triangulation],
/// a merge or a flatten). Afterwards it changes only through refinement/coarsening flags and
/// [Triangulation::execute_refinement], or through [Triangulation::clear].
///
/// Traversing or mutating a triangulation that has no cells is a programming error and panics.
#[derive(Debug, Clone)]
pub struct Triangulation<const D: usize> {
    pub(crate) vertices: VertexStore<D>,
    pub(crate) levels: Vec<Level>,
    pub(crate) boundaries: BoundaryRegistry<D>,
    /// vertex at the center of each refined sub-object, keyed by the sorted corner vertices of the sub-object
    pub(crate) sub_object_centers: HashMap<SmallVec<[usize; 8]>, usize>,
    pub(crate) n_active: usize,
    settings: TriaSettings,
}

impl<const D: usize> Default for Triangulation<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Triangulation<D> {
    /// Construct an empty Triangulation with default [TriaSettings]
    pub fn new() -> Self {
        Self::with_settings(TriaSettings::default())
    }

    pub fn with_settings(settings: TriaSettings) -> Self {
        Self {
            vertices: VertexStore::new(),
            levels: Vec::new(),
            boundaries: BoundaryRegistry::new(),
            sub_object_centers: HashMap::new(),
            n_active: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &TriaSettings {
        &self.settings
    }

    /// Populate an empty Triangulation from a list of vertices and coarse cells
    ///
    /// * Vertices closer than the configured tolerance are merged
    /// * Faces shared by two cells become interior faces; all other faces are boundary faces with the
    ///     [DEFAULT_BOUNDARY_ID] unless `boundary_faces` says otherwise
    ///
    /// Nothing is modified if an `Err` is returned.
    pub fn create_triangulation(
        &mut self,
        vertices: Vec<Point<D>>,
        cells: Vec<CellData>,
        boundary_faces: &[BoundaryFaceData],
    ) -> Result<(), TriaError> {
        if !self.is_empty() {
            return Err(TriaError::NotEmpty);
        }
        if D == 0 {
            return Err(TriaError::UnsupportedDimension {
                generator: "create_triangulation",
                dim: D,
            });
        }
        if cells.is_empty() {
            return Err(TriaError::InvalidCellData(String::from(
                "at least one cell is required",
            )));
        }

        // merge coincident vertices
        let mut matcher = VertexMatcher::new(self.settings.vertex_tolerance)?;
        let vertex_map = vertices
            .iter()
            .enumerate()
            .map(|(id, point)| matcher.insert(*point, id))
            .collect::<Result<Vec<usize>, TriaError>>()?;
        let points = matcher.into_points();

        // validate and renumber the cells
        let mut cell_vertices: Vec<SmallVec<[usize; 8]>> = Vec::with_capacity(cells.len());
        for (cell_id, cell) in cells.iter().enumerate() {
            if cell.vertices.len() != vertices_per_cell(D) {
                return Err(TriaError::InvalidCellData(format!(
                    "cell {} has {} vertices, a {}D cell needs {}",
                    cell_id,
                    cell.vertices.len(),
                    D,
                    vertices_per_cell(D)
                )));
            }

            let mut renumbered: SmallVec<[usize; 8]> = SmallVec::with_capacity(cell.vertices.len());
            for vertex_id in cell.vertices.iter() {
                match vertex_map.get(*vertex_id) {
                    Some(new_id) => renumbered.push(*new_id),
                    None => {
                        return Err(TriaError::InvalidCellData(format!(
                            "cell {} refers to vertex {}, but there are only {} vertices",
                            cell_id,
                            vertex_id,
                            vertices.len()
                        )))
                    }
                }
            }

            if sorted_key(renumbered.iter().copied())
                .windows(2)
                .any(|w| w[0] == w[1])
            {
                return Err(TriaError::InvalidCellData(format!(
                    "cell {} is degenerate (repeated vertices)",
                    cell_id
                )));
            }

            cell_vertices.push(renumbered);
        }

        // match faces between cells
        let mut face_owners: HashMap<SmallVec<[usize; 8]>, SmallVec<[(usize, usize); 2]>> =
            HashMap::new();
        for (cell_id, verts) in cell_vertices.iter().enumerate() {
            for face in 0..faces_per_cell(D) {
                let key = sorted_key(face_vertices(D, face).iter().map(|v| verts[*v]));
                let owners = face_owners.entry(key).or_default();
                if owners.len() == 2 {
                    return Err(TriaError::InvalidCellData(format!(
                        "face {} of cell {} is shared by more than two cells",
                        face, cell_id
                    )));
                }
                owners.push((cell_id, face));
            }
        }

        let mut boundary_ids: HashMap<SmallVec<[usize; 8]>, BoundaryId> = HashMap::new();
        for face_data in boundary_faces {
            if face_data.boundary_id == INVALID_BOUNDARY_ID {
                return Err(TriaError::InvalidBoundaryId(face_data.boundary_id));
            }

            let key = face_data
                .vertices
                .iter()
                .map(|v| vertex_map.get(*v).copied())
                .collect::<Option<SmallVec<[usize; 8]>>>()
                .map(sorted_key)
                .ok_or_else(|| {
                    TriaError::InvalidCellData(format!(
                        "boundary face {:?} refers to a vertex that does not exist",
                        face_data.vertices
                    ))
                })?;

            match face_owners.get(&key).map(|owners| owners.len()) {
                Some(1) => {
                    boundary_ids.insert(key, face_data.boundary_id);
                }
                Some(_) => {
                    return Err(TriaError::InvalidCellData(format!(
                        "boundary id given for the interior face {:?}",
                        face_data.vertices
                    )))
                }
                None => {
                    return Err(TriaError::InvalidCellData(format!(
                        "boundary face {:?} is not a face of any cell",
                        face_data.vertices
                    )))
                }
            }
        }

        let mut level_0 = Level::default();
        for (cell_id, (verts, data)) in cell_vertices.iter().zip(cells.iter()).enumerate() {
            let faces = (0..faces_per_cell(D))
                .map(|face| {
                    let key = sorted_key(face_vertices(D, face).iter().map(|v| verts[*v]));
                    let owners = &face_owners[&key];
                    match owners.iter().find(|(other, _)| *other != cell_id) {
                        Some((other, _)) => FaceState::Neighbor(CellIndex::new(0, *other)),
                        None => FaceState::Boundary(
                            boundary_ids.get(&key).copied().unwrap_or(DEFAULT_BOUNDARY_ID),
                        ),
                    }
                })
                .collect();

            level_0
                .cells
                .push(Cell::new(verts.clone(), faces, None, data.subdomain_id));
        }

        debug!(
            "Creating triangulation: {} input vertices merged into {}, {} cells",
            vertices.len(),
            points.len(),
            cells.len()
        );

        self.vertices = VertexStore::from_points(points);
        self.levels = vec![level_0];
        self.update_caches();

        info!(
            "Created {}D triangulation with {} cells and {} vertices",
            D,
            self.n_active,
            self.n_vertices()
        );

        Ok(())
    }

    /// Release all cells, vertices and boundary descriptions
    ///
    /// The triangulation can be populated again afterwards.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.levels.clear();
        self.boundaries.clear();
        self.sub_object_centers.clear();
        self.n_active = 0;
    }

    // ----------------------------------------------------------------------------------------------------
    // General Data Retrieval
    // ----------------------------------------------------------------------------------------------------

    /// Does the Triangulation have no cells (never populated, or cleared)
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub(crate) fn assert_populated(&self) {
        assert!(
            !self.is_empty(),
            "Triangulation has no cells (it was never populated or it has been cleared); Cannot traverse or modify it!"
        );
    }

    /// Number of refinement levels (level 0 is the coarse mesh)
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Number of cells on all levels
    pub fn n_cells(&self) -> usize {
        self.levels
            .iter()
            .map(|level| level.cells.iter().filter(|c| c.used).count())
            .sum()
    }

    /// Number of cells on one level
    pub fn n_cells_on_level(&self, level: usize) -> usize {
        self.levels
            .get(level)
            .map(|l| l.cells.iter().filter(|c| c.used).count())
            .unwrap_or(0)
    }

    /// Number of leaf cells (cached, recomputed after every mutation)
    pub fn n_active_cells(&self) -> usize {
        self.n_active
    }

    /// Number of vertices referenced by at least one cell
    pub fn n_vertices(&self) -> usize {
        self.vertices.n_used()
    }

    /// Coordinates of a vertex, if it is in use
    pub fn vertex(&self, id: usize) -> Option<&Point<D>> {
        if self.vertices.is_used(id) {
            Some(self.vertices.point(id))
        } else {
            None
        }
    }

    /// Iterate over the used vertices and their ids
    pub fn vertices(&self) -> impl Iterator<Item = (usize, &Point<D>)> + '_ {
        self.vertices.iter_used()
    }

    /// Get an accessor for a cell
    pub fn cell(&self, index: CellIndex) -> Option<CellRef<'_, D>> {
        self.cell_data(index).map(|_| CellRef::new(self, index))
    }

    pub(crate) fn cell_data(&self, index: CellIndex) -> Option<&Cell> {
        self.levels
            .get(index.level)
            .and_then(|level| level.cells.get(index.index))
            .filter(|cell| cell.used)
    }

    /// Panics if the cell does not exist; only use for indices produced by the triangulation itself
    pub(crate) fn cell_unchecked(&self, index: CellIndex) -> &Cell {
        &self.levels[index.level].cells[index.index]
    }

    fn cell_mut(&mut self, index: CellIndex) -> Result<&mut Cell, TriaError> {
        self.levels
            .get_mut(index.level)
            .and_then(|level| level.cells.get_mut(index.index))
            .filter(|cell| cell.used)
            .ok_or(TriaError::CellDoesntExist(index))
    }

    /// Refinement-surviving identifier of a cell
    pub fn cell_id(&self, index: CellIndex) -> Result<CellId, TriaError> {
        self.cell_data(index)
            .ok_or(TriaError::CellDoesntExist(index))?;

        let mut child_path: SmallVec<[u8; EXPECTED_NUM_LEVELS]> = SmallVec::new();
        let mut current = index;
        while let Some(parent) = self.cell_unchecked(current).parent {
            let child_no = self
                .cell_unchecked(parent)
                .children
                .as_ref()
                .and_then(|children| children.iter().position(|c| *c == current.index))
                .expect("Parent does not list its child; the cell tree is corrupted!");
            child_path.push(child_no as u8);
            current = parent;
        }
        child_path.reverse();

        Ok(CellId {
            coarse_cell: current.index,
            child_path,
        })
    }

    /// Current arena position of the cell identified by `id`, if that cell exists
    pub fn cell_from_id(&self, id: &CellId) -> Option<CellIndex> {
        let mut current = CellIndex::new(0, id.coarse_cell);
        self.cell_data(current)?;

        for child_no in id.child_path.iter() {
            let children = self.cell_unchecked(current).children.as_ref()?;
            current = CellIndex::new(current.level + 1, *children.get(*child_no as usize)?);
        }

        Some(current)
    }

    // ----------------------------------------------------------------------------------------------------
    // Boundary descriptions
    // ----------------------------------------------------------------------------------------------------

    /// Register the shape of boundary `id`, replacing any earlier description for that id
    pub fn set_boundary(
        &mut self,
        id: BoundaryId,
        boundary: Arc<dyn Boundary<D>>,
    ) -> Result<(), TriaError> {
        if id == INVALID_BOUNDARY_ID {
            return Err(TriaError::InvalidBoundaryId(id));
        }
        if self.boundaries.set(id, boundary).is_some() {
            debug!("Replaced boundary description for id {}", id);
        }
        Ok(())
    }

    /// Remove the description of boundary `id`; new vertices on it will be placed with straight averages
    pub fn reset_boundary(&mut self, id: BoundaryId) {
        self.boundaries.reset(id);
    }

    /// Description registered for boundary `id`
    pub fn boundary(&self, id: BoundaryId) -> Option<&Arc<dyn Boundary<D>>> {
        self.boundaries.get(id)
    }

    /// Ids that have a registered description
    pub fn registered_boundary_ids(&self) -> Vec<BoundaryId> {
        self.boundaries.ids().collect()
    }

    // ----------------------------------------------------------------------------------------------------
    // Flags and tags
    // ----------------------------------------------------------------------------------------------------

    /// Flag an active cell for refinement
    pub fn set_refine_flag(&mut self, index: CellIndex) -> Result<(), TriaError> {
        self.assert_populated();
        let cell = self.cell_mut(index)?;
        if cell.has_children() {
            return Err(TriaError::CellNotActive(index));
        }
        cell.refine_flag = true;
        cell.coarsen_flag = false;
        Ok(())
    }

    pub fn clear_refine_flag(&mut self, index: CellIndex) -> Result<(), TriaError> {
        self.assert_populated();
        self.cell_mut(index)?.refine_flag = false;
        Ok(())
    }

    /// Flag an active cell for coarsening. Its parent is coarsened if all of its siblings are flagged as well.
    pub fn set_coarsen_flag(&mut self, index: CellIndex) -> Result<(), TriaError> {
        self.assert_populated();
        let cell = self.cell_mut(index)?;
        if cell.has_children() {
            return Err(TriaError::CellNotActive(index));
        }
        cell.coarsen_flag = true;
        cell.refine_flag = false;
        Ok(())
    }

    pub fn clear_coarsen_flag(&mut self, index: CellIndex) -> Result<(), TriaError> {
        self.assert_populated();
        self.cell_mut(index)?.coarsen_flag = false;
        Ok(())
    }

    pub fn set_subdomain_id(
        &mut self,
        index: CellIndex,
        subdomain_id: SubdomainId,
    ) -> Result<(), TriaError> {
        self.assert_populated();
        self.cell_mut(index)?.subdomain_id = subdomain_id;
        Ok(())
    }

    /// Set the boundary id of a boundary face of a cell
    ///
    /// The id is also given to the faces of the cell's descendants that lie on this face.
    pub fn set_boundary_id(
        &mut self,
        index: CellIndex,
        face: usize,
        boundary_id: BoundaryId,
    ) -> Result<(), TriaError> {
        self.assert_populated();
        if face >= faces_per_cell(D) {
            return Err(TriaError::FaceOutOfRange { face, dim: D });
        }
        if boundary_id == INVALID_BOUNDARY_ID {
            return Err(TriaError::InvalidBoundaryId(boundary_id));
        }
        if let FaceState::Neighbor(_) = self.cell_mut(index)?.faces[face] {
            return Err(TriaError::InteriorFace { cell: index, face });
        }

        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            let cell = &mut self.levels[current.level].cells[current.index];
            cell.faces[face] = FaceState::Boundary(boundary_id);
            if let Some(children) = &cell.children {
                stack.extend(
                    children
                        .iter()
                        .enumerate()
                        .filter(|(child_no, _)| child_on_face(*child_no, face))
                        .map(|(_, child)| CellIndex::new(current.level + 1, *child)),
                );
            }
        }

        Ok(())
    }

    /// Give every boundary face (on every level) the same boundary id
    pub fn set_all_boundary_ids(&mut self, boundary_id: BoundaryId) -> Result<(), TriaError> {
        self.assert_populated();
        if boundary_id == INVALID_BOUNDARY_ID {
            return Err(TriaError::InvalidBoundaryId(boundary_id));
        }

        for level in self.levels.iter_mut() {
            for cell in level.cells.iter_mut().filter(|c| c.used) {
                for face in cell.faces.iter_mut() {
                    if let FaceState::Boundary(id) = face {
                        *id = boundary_id;
                    }
                }
            }
        }

        Ok(())
    }

    /// All boundary ids used by active boundary faces
    pub fn boundary_ids(&self) -> Vec<BoundaryId> {
        let mut ids: BTreeSet<BoundaryId> = BTreeSet::new();
        for level in self.levels.iter() {
            for cell in level.cells.iter().filter(|c| c.is_active()) {
                ids.extend(cell.faces.iter().filter_map(|f| f.boundary_id()));
            }
        }
        ids.into_iter().collect()
    }

    // ----------------------------------------------------------------------------------------------------
    // Cache maintenance
    // ----------------------------------------------------------------------------------------------------

    /// Recompute everything derived from the cell tree: active indices and count, vertex usage,
    /// and trailing empty levels
    pub(crate) fn update_caches(&mut self) {
        while self
            .levels
            .last()
            .map(|level| level.cells.iter().all(|c| !c.used))
            .unwrap_or(false)
        {
            self.levels.pop();
        }

        let mut next_active = 0;
        let mut used = vec![false; self.vertices.len()];
        for level in self.levels.iter_mut() {
            for cell in level.cells.iter_mut() {
                if cell.is_active() {
                    cell.active_index = Some(next_active);
                    next_active += 1;
                } else {
                    cell.active_index = None;
                }

                if cell.used {
                    for v in cell.vertices.iter() {
                        used[*v] = true;
                    }
                }
            }
        }
        self.n_active = next_active;

        let released = self.vertices.set_usage(used);
        if !released.is_empty() {
            debug!("Released {} vertices", released.len());
            let vertices = &self.vertices;
            self.sub_object_centers
                .retain(|_, center| vertices.is_used(*center));
        }
    }
}
