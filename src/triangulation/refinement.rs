use super::boundary::mean;
use super::cell::{
    child_on_face, face_vertices, faces_per_cell, sorted_key, vertices_per_cell, Cell, CellIndex,
    FaceState,
};
use super::{BoundaryId, Level, Point, Triangulation, DEFAULT_BOUNDARY_ID};
use crate::error::TriaError;

use log::{debug, info, warn};
use smallvec::{smallvec, SmallVec};
use std::collections::{BTreeSet, HashMap, HashSet};

/*
    Refinement works on the "lattice" of a parent cell: the 3^D points with local coordinates in {0, 1/2, 1}^D.
    A lattice point is written as D digits in {0, 1, 2}; the digits equal to 1 are its "free" directions.

    - 0 free directions: a vertex of the parent
    - 1 free direction: the midpoint of an edge
    - k free directions: the center of a k-dimensional sub-object (face center, cell center, ...)

    The corners of the sub-object centered at a lattice point are the parent vertices obtained by replacing each
    free digit by 0 or 2. Vertex `v` of child `c` is the lattice point with digits `c_d + v_d`.
*/

fn lattice_size(dim: usize) -> usize {
    3_usize.pow(dim as u32)
}

fn lattice_digits<const D: usize>(mut point: usize) -> [usize; D] {
    let mut digits = [0; D];
    for digit in digits.iter_mut() {
        *digit = point % 3;
        point /= 3;
    }
    digits
}

fn lattice_point<const D: usize>(digits: &[usize; D]) -> usize {
    digits.iter().rev().fold(0, |acc, digit| acc * 3 + digit)
}

/// Local numbers of the parent vertices spanning the sub-object centered at a lattice point
fn sub_object_corners<const D: usize>(digits: &[usize; D]) -> SmallVec<[usize; 8]> {
    let free: SmallVec<[usize; 3]> = (0..D).filter(|d| digits[*d] == 1).collect();

    (0..(1_usize << free.len()))
        .map(|combination| {
            (0..D).fold(0, |vertex, d| {
                let bit = match free.iter().position(|f| *f == d) {
                    Some(pos) => (combination >> pos) & 1,
                    None => digits[d] / 2,
                };
                vertex | (bit << d)
            })
        })
        .collect()
}

fn n_free<const D: usize>(digits: &[usize; D]) -> usize {
    digits.iter().filter(|d| **d == 1).count()
}

impl Level {
    /// Store a cell in a free slot (or at the end) and return its index
    fn insert(&mut self, cell: Cell) -> usize {
        match self.free_slots.pop() {
            Some(slot) => {
                self.cells[slot] = cell;
                slot
            }
            None => {
                self.cells.push(cell);
                self.cells.len() - 1
            }
        }
    }
}

impl<const D: usize> Triangulation<D> {
    // ----------------------------------------------------------------------------------------------------
    // Public refinement interface
    // ----------------------------------------------------------------------------------------------------

    /// Refine every active cell `times` times
    ///
    /// Fails without changing anything if `times` is negative, or if the finest cells would end up
    /// above the configured maximum level.
    pub fn refine_global(&mut self, times: i32) -> Result<(), TriaError> {
        self.assert_populated();
        if times < 0 {
            return Err(TriaError::NegativeRefinement(times));
        }
        if times == 0 {
            return Ok(());
        }

        let finest = self
            .active_cells()
            .map(|cell| cell.level())
            .max()
            .unwrap_or(0);
        let requested = finest + times as usize;
        if requested > self.settings().max_level {
            return Err(TriaError::ExceedsMaxLevel {
                requested,
                max_level: self.settings().max_level,
            });
        }

        for _ in 0..times {
            for level in self.levels.iter_mut() {
                for cell in level.cells.iter_mut().filter(|c| c.is_active()) {
                    cell.refine_flag = true;
                    cell.coarsen_flag = false;
                }
            }
            self.execute_refinement()?;
        }

        Ok(())
    }

    /// Coarsen and refine cells according to their flags
    ///
    /// 1. The set of cells to refine is extended until no two active cells sharing a face would differ by
    ///     more than one level
    /// 2. Cells whose children are all active and flagged for coarsening lose their children.
    ///     Partially flagged families are left alone.
    /// 3. Flagged cells get `2^D` children. Vertices are shared with previously refined neighbors, and vertices
    ///     on boundary faces are placed by the [Boundary](super::boundary::Boundary) registered for the face.
    /// 4. Neighbor links, the active-cell cache and vertex usage are recomputed, and all flags are cleared.
    ///
    /// All checks happen before anything is modified: an `Err` leaves the triangulation (and its flags) untouched.
    pub fn execute_refinement(&mut self) -> Result<(), TriaError> {
        self.assert_populated();

        let refine_set = self.refinement_closure();
        if let Some(requested) = refine_set.iter().map(|cell| cell.level + 1).max() {
            if requested > self.settings().max_level {
                return Err(TriaError::ExceedsMaxLevel {
                    requested,
                    max_level: self.settings().max_level,
                });
            }
        }

        let coarsen_set = self.coarsening_candidates(&refine_set)?;

        // ---- no failures past this point ----

        for parent in coarsen_set.iter() {
            self.remove_children(*parent);
        }

        let new_cells = self.create_children(&refine_set);
        self.rebuild_neighbors(&new_cells);

        for level in self.levels.iter_mut() {
            for cell in level.cells.iter_mut() {
                cell.refine_flag = false;
                cell.coarsen_flag = false;
            }
        }
        self.update_caches();

        info!(
            "Refined {} cells and coarsened {}; {} active cells on {} levels",
            refine_set.len(),
            coarsen_set.len(),
            self.n_active,
            self.levels.len()
        );

        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // Flag preparation
    // ----------------------------------------------------------------------------------------------------

    fn refinement_closure(&self) -> BTreeSet<CellIndex> {
        let mut refine_set: BTreeSet<CellIndex> = self
            .active_cells()
            .filter(|cell| cell.refine_flag_set())
            .map(|cell| cell.index())
            .collect();
        let n_flagged = refine_set.len();

        let mut queue: Vec<CellIndex> = refine_set.iter().copied().collect();
        while let Some(index) = queue.pop() {
            for face in self.cell_unchecked(index).faces.iter() {
                if let FaceState::Neighbor(neighbor) = face {
                    if neighbor.level < index.level
                        && self.cell_unchecked(*neighbor).is_active()
                        && refine_set.insert(*neighbor)
                    {
                        queue.push(*neighbor);
                    }
                }
            }
        }

        if refine_set.len() > n_flagged {
            debug!(
                "Refinement closure added {} cells to the {} flagged ones",
                refine_set.len() - n_flagged,
                n_flagged
            );
        }

        refine_set
    }

    /// Parents whose children will be removed
    fn coarsening_candidates(
        &self,
        refine_set: &BTreeSet<CellIndex>,
    ) -> Result<Vec<CellIndex>, TriaError> {
        let parents: BTreeSet<CellIndex> = self
            .active_cells()
            .filter(|cell| cell.coarsen_flag_set())
            .filter_map(|cell| cell.parent().map(|p| p.index()))
            .collect();

        let mut accepted = Vec::with_capacity(parents.len());
        for parent in parents {
            let family_flagged = self.child_indices(parent).all(|child| {
                let cell = self.cell_unchecked(child);
                cell.is_active() && cell.coarsen_flag && !refine_set.contains(&child)
            });

            if family_flagged {
                accepted.push(parent);
            } else {
                warn!(
                    "Not all children of cell {} can be coarsened; ignoring their coarsen flags",
                    parent
                );
            }
        }

        let removed: HashSet<CellIndex> = accepted
            .iter()
            .flat_map(|parent| self.child_indices(*parent))
            .collect();

        // removing a family must not put its parent next to cells two levels finer
        for parent in accepted.iter() {
            for (child_no, child) in self.child_indices(*parent).enumerate() {
                for face in (0..faces_per_cell(D)).filter(|f| child_on_face(child_no, *f)) {
                    if let FaceState::Neighbor(neighbor) = self.cell_unchecked(child).faces[face] {
                        if neighbor.level == child.level
                            && !removed.contains(&neighbor)
                            && (self.cell_unchecked(neighbor).has_children()
                                || refine_set.contains(&neighbor))
                        {
                            return Err(TriaError::CoarseningConflict(*parent));
                        }
                    }
                }
            }
        }

        Ok(accepted)
    }

    fn child_indices(&self, parent: CellIndex) -> impl Iterator<Item = CellIndex> + '_ {
        self.cell_unchecked(parent)
            .children
            .iter()
            .flat_map(|children| children.iter())
            .map(move |child| CellIndex::new(parent.level + 1, *child))
    }

    // ----------------------------------------------------------------------------------------------------
    // Mutation
    // ----------------------------------------------------------------------------------------------------

    fn remove_children(&mut self, parent: CellIndex) {
        let children = self.levels[parent.level].cells[parent.index]
            .children
            .take()
            .expect("Only cells with children can be coarsened");

        let child_level = &mut self.levels[parent.level + 1];
        for child in children {
            let cell = &mut child_level.cells[child];
            cell.used = false;
            cell.children = None;
            cell.active_index = None;
            child_level.free_slots.push(child);
        }
    }

    /// Boundary id of every sub-object lying on a boundary face of an active cell
    fn boundary_sub_objects(&self) -> HashMap<SmallVec<[usize; 8]>, BoundaryId> {
        let mut on_boundary = HashMap::new();
        for cell in self.active_cells() {
            for face in 0..faces_per_cell(D) {
                if let Some(boundary_id) = cell.boundary_id(face) {
                    let (direction, side) = (face / 2, face % 2);
                    for point in 0..lattice_size(D) {
                        let digits = lattice_digits::<D>(point);
                        if digits[direction] == 2 * side && n_free(&digits) > 0 {
                            let key = sorted_key(
                                sub_object_corners(&digits)
                                    .iter()
                                    .map(|v| cell.vertex_index(*v)),
                            );
                            on_boundary.entry(key).or_insert(boundary_id);
                        }
                    }
                }
            }
        }
        on_boundary
    }

    /// Vertex ids of every lattice point of a cell, creating the missing ones
    fn lattice_vertices(
        &mut self,
        parent: CellIndex,
        on_boundary: &HashMap<SmallVec<[usize; 8]>, BoundaryId>,
    ) -> Vec<usize> {
        let parent_vertices = self.cell_unchecked(parent).vertices.clone();

        // sub-objects are visited from low to high dimension, so the centers of their facets already exist
        let mut points: Vec<usize> = (0..lattice_size(D)).collect();
        points.sort_by_key(|p| n_free(&lattice_digits::<D>(*p)));

        let mut ids = vec![usize::MAX; lattice_size(D)];
        for point in points {
            let digits = lattice_digits::<D>(point);
            let corners: SmallVec<[usize; 8]> = sub_object_corners(&digits)
                .iter()
                .map(|v| parent_vertices[*v])
                .collect();

            if corners.len() == 1 {
                ids[point] = corners[0];
                continue;
            }

            let key = sorted_key(corners.iter().copied());
            if let Some(existing) = self.sub_object_centers.get(&key) {
                ids[point] = *existing;
                continue;
            }

            let location = match on_boundary.get(&key) {
                Some(boundary_id) => {
                    let corner_points: SmallVec<[Point<D>; 8]> =
                        corners.iter().map(|v| *self.vertices.point(*v)).collect();
                    self.boundaries.in_between(*boundary_id, &corner_points)
                }
                None if corners.len() == 2 => {
                    mean(&[*self.vertices.point(corners[0]), *self.vertices.point(corners[1])])
                }
                None => {
                    // average of the centers of the facets
                    let facet_points: SmallVec<[Point<D>; 6]> = (0..D)
                        .filter(|d| digits[*d] == 1)
                        .flat_map(|d| {
                            [0, 2].into_iter().map(move |side| {
                                let mut facet = digits;
                                facet[d] = side;
                                lattice_point(&facet)
                            })
                        })
                        .map(|facet| *self.vertices.point(ids[facet]))
                        .collect();
                    mean(&facet_points)
                }
            };

            let id = self.vertices.push(location);
            self.sub_object_centers.insert(key, id);
            ids[point] = id;
        }

        ids
    }

    /// Create the children of every cell in the refine set, returning their indices
    fn create_children(&mut self, refine_set: &BTreeSet<CellIndex>) -> HashSet<CellIndex> {
        let mut new_cells = HashSet::with_capacity(refine_set.len() * vertices_per_cell(D));
        if refine_set.is_empty() {
            return new_cells;
        }

        let on_boundary = self.boundary_sub_objects();
        let n_vertices_before = self.vertices.n_used();

        for parent in refine_set.iter() {
            let lattice = self.lattice_vertices(*parent, &on_boundary);
            let subdomain_id = self.cell_unchecked(*parent).subdomain_id;

            if self.levels.len() == parent.level + 1 {
                self.levels.push(Level::default());
            }

            let mut children: SmallVec<[usize; 8]> = SmallVec::new();
            for child_no in 0..vertices_per_cell(D) {
                let vertices = (0..vertices_per_cell(D))
                    .map(|v| {
                        let mut digits = [0; D];
                        for (d, digit) in digits.iter_mut().enumerate() {
                            *digit = ((child_no >> d) & 1) + ((v >> d) & 1);
                        }
                        lattice[lattice_point(&digits)]
                    })
                    .collect();

                // faces are placeholders until the neighbors are rebuilt
                let faces = smallvec![FaceState::Boundary(DEFAULT_BOUNDARY_ID); faces_per_cell(D)];
                let child = Cell::new(vertices, faces, Some(*parent), subdomain_id);

                let index = self.levels[parent.level + 1].insert(child);
                new_cells.insert(CellIndex::new(parent.level + 1, index));
                children.push(index);
            }

            self.levels[parent.level].cells[parent.index].children = Some(children);
        }

        debug!(
            "Created {} cells and {} vertices",
            new_cells.len(),
            self.vertices.n_used() - n_vertices_before
        );

        new_cells
    }

    /// Recompute the face states of all cells above level 0
    ///
    /// Faces of a child lying on a face of its parent start from the parent's state (boundary ids are inherited,
    /// neighbors become the coarse neighbor of a hanging face); faces shared by two cells of the same level are
    /// then linked to one another. Boundary faces of cells that existed before keep their (possibly reassigned) ids.
    fn rebuild_neighbors(&mut self, new_cells: &HashSet<CellIndex>) {
        for level in 1..self.levels.len() {
            let mut states: Vec<(usize, SmallVec<[Option<FaceState>; 6]>)> = Vec::new();
            let mut owners: HashMap<SmallVec<[usize; 8]>, SmallVec<[(usize, usize); 2]>> =
                HashMap::new();

            for (index, cell) in self.levels[level].cells.iter().enumerate() {
                if !cell.used {
                    continue;
                }
                let this = CellIndex::new(level, index);
                let parent_index = cell.parent.expect("Cells above level 0 have a parent");
                let parent = self.cell_unchecked(parent_index);
                let child_no = parent
                    .children
                    .as_ref()
                    .and_then(|children| children.iter().position(|c| *c == index))
                    .expect("Parent does not list its child; the cell tree is corrupted!");

                let face_states = (0..faces_per_cell(D))
                    .map(|face| {
                        if !new_cells.contains(&this) {
                            if let FaceState::Boundary(id) = cell.faces[face] {
                                return Some(FaceState::Boundary(id));
                            }
                        }
                        if child_on_face(child_no, face) {
                            Some(parent.faces[face])
                        } else {
                            None
                        }
                    })
                    .collect::<SmallVec<[Option<FaceState>; 6]>>();

                for (face, state) in face_states.iter().enumerate() {
                    if !matches!(state, Some(FaceState::Boundary(_))) {
                        let key = sorted_key(
                            face_vertices(D, face).iter().map(|v| cell.vertices[*v]),
                        );
                        owners.entry(key).or_default().push((index, face));
                    }
                }

                states.push((index, face_states));
            }

            let slot_of: HashMap<usize, usize> = states
                .iter()
                .enumerate()
                .map(|(slot, (index, _))| (*index, slot))
                .collect();

            for pair in owners.values().filter(|o| o.len() == 2) {
                let [(a, face_a), (b, face_b)] = [pair[0], pair[1]];
                states[slot_of[&a]].1[face_a] = Some(FaceState::Neighbor(CellIndex::new(level, b)));
                states[slot_of[&b]].1[face_b] = Some(FaceState::Neighbor(CellIndex::new(level, a)));
            }

            for (index, face_states) in states {
                let cell = &mut self.levels[level].cells[index];
                for (face, state) in face_states.into_iter().enumerate() {
                    cell.faces[face] = state.unwrap_or_else(|| {
                        panic!(
                            "Interior face {} of cell {}.{} has no neighbor; the cell tree is corrupted!",
                            face, level, index
                        )
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_generator;
    use crate::triangulation::TriaSettings;

    fn unit_cube<const D: usize>() -> Triangulation<D> {
        let mut tria = Triangulation::<D>::new();
        grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
        tria
    }

    fn two_cells() -> Triangulation<2> {
        let mut tria = Triangulation::<2>::new();
        grid_generator::subdivided_hyper_rectangle(
            &mut tria,
            [2, 1],
            Point::from([0.0, 0.0]),
            Point::from([2.0, 1.0]),
            false,
        )
        .unwrap();
        tria
    }

    #[test]
    fn lattice_numbering() {
        assert_eq!(lattice_digits::<2>(5), [2, 1]);
        assert_eq!(lattice_point(&[2, 1]), 5);
        assert_eq!(sub_object_corners(&[1, 0]).as_slice(), &[0, 1]);
        assert_eq!(sub_object_corners(&[2, 1]).as_slice(), &[1, 3]);
        assert_eq!(sub_object_corners(&[1, 1]).as_slice(), &[0, 1, 2, 3]);
        assert_eq!(sub_object_corners(&[2, 2]).as_slice(), &[3]);
    }

    #[test]
    fn global_refinement_counts() {
        let mut line = unit_cube::<1>();
        line.refine_global(3).unwrap();
        assert_eq!(line.n_active_cells(), 8);
        assert_eq!(line.n_vertices(), 9);

        let mut square = unit_cube::<2>();
        square.refine_global(1).unwrap();
        assert_eq!(square.n_active_cells(), 4);
        square.refine_global(1).unwrap();
        assert_eq!(square.n_active_cells(), 16);
        assert_eq!(square.n_vertices(), 25);
        assert_eq!(square.n_levels(), 3);
        assert_eq!(square.n_cells(), 21);

        let mut cube = unit_cube::<3>();
        cube.refine_global(2).unwrap();
        assert_eq!(cube.n_active_cells(), 64);
        assert_eq!(cube.n_vertices(), 125);
    }

    #[test]
    fn children_contain_parent_vertices() {
        let mut cube = unit_cube::<3>();
        cube.refine_global(2).unwrap();

        for cell in cube.cells() {
            assert_eq!(cell.is_active(), !cell.has_children());
            if cell.has_children() {
                assert_eq!(cell.n_children(), 8);
                let child_vertices: HashSet<usize> = cell
                    .children()
                    .flat_map(|child| child.vertex_indices().to_vec())
                    .collect();
                assert!(cell
                    .vertex_indices()
                    .iter()
                    .all(|v| child_vertices.contains(v)));
            }
        }
    }

    #[test]
    fn invalid_global_refinements() {
        let mut tria = Triangulation::<2>::with_settings(TriaSettings {
            max_level: 2,
            ..TriaSettings::default()
        });
        grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();

        assert!(matches!(
            tria.refine_global(-1),
            Err(TriaError::NegativeRefinement(-1))
        ));
        assert!(matches!(
            tria.refine_global(3),
            Err(TriaError::ExceedsMaxLevel {
                requested: 3,
                max_level: 2
            })
        ));
        assert_eq!(tria.n_active_cells(), 1);
        assert_eq!(tria.n_levels(), 1);

        tria.refine_global(2).unwrap();
        assert_eq!(tria.n_active_cells(), 16);

        // flags are left in place when execution is rejected
        let cell = tria.begin_active().unwrap();
        tria.set_refine_flag(cell).unwrap();
        assert!(tria.execute_refinement().is_err());
        assert!(tria.cell(cell).unwrap().refine_flag_set());
        assert_eq!(tria.n_active_cells(), 16);
    }

    #[test]
    fn shared_vertices_created_once() {
        let mut tria = two_cells();
        assert_eq!(tria.n_vertices(), 6);

        tria.set_refine_flag(CellIndex::new(0, 0)).unwrap();
        tria.execute_refinement().unwrap();
        // 4 edge midpoints (one hanging on the shared face) and a center
        assert_eq!(tria.n_vertices(), 11);
        assert_eq!(tria.n_active_cells(), 5);

        tria.set_refine_flag(CellIndex::new(0, 1)).unwrap();
        tria.execute_refinement().unwrap();
        // the hanging vertex is reused: a 5 x 3 grid of vertices
        assert_eq!(tria.n_vertices(), 15);
        assert_eq!(tria.n_active_cells(), 8);

        // children of both cells along the shared face are neighbors on level 1
        let left = tria.cell(CellIndex::new(0, 0)).unwrap();
        let right = tria.cell(CellIndex::new(0, 1)).unwrap();
        assert_eq!(left.child(1).unwrap().neighbor(1), Some(right.child(0).unwrap().index()));
        assert_eq!(left.child(3).unwrap().neighbor(1), Some(right.child(2).unwrap().index()));
    }

    #[test]
    fn closure_limits_level_difference() {
        let mut tria = two_cells();
        tria.set_refine_flag(CellIndex::new(0, 0)).unwrap();
        tria.execute_refinement().unwrap();

        // refining a child touching the coarse right cell forces the right cell to be refined as well
        let child = tria.cell(CellIndex::new(0, 0)).unwrap().child(1).unwrap().index();
        tria.set_refine_flag(child).unwrap();
        tria.execute_refinement().unwrap();

        assert!(tria.cell(CellIndex::new(0, 1)).unwrap().has_children());
        for cell in tria.active_cells() {
            for face in 0..4 {
                if let Some(neighbor) = cell.neighbor_cell(face) {
                    assert!(cell.level() - neighbor.level() <= 1);
                }
            }
        }
    }

    #[test]
    fn coarsening_restores_parent() {
        let mut tria = unit_cube::<2>();
        tria.refine_global(1).unwrap();

        let children: Vec<CellIndex> = tria.active_cells().map(|c| c.index()).collect();
        for child in children.iter() {
            tria.set_coarsen_flag(*child).unwrap();
        }
        tria.execute_refinement().unwrap();

        assert_eq!(tria.n_levels(), 1);
        assert_eq!(tria.n_active_cells(), 1);
        assert_eq!(tria.n_vertices(), 4);
        assert!(tria.cell(CellIndex::new(0, 0)).unwrap().is_active());

        // refining again reuses nothing stale
        tria.refine_global(1).unwrap();
        assert_eq!(tria.n_active_cells(), 4);
        assert_eq!(tria.n_vertices(), 9);
    }

    #[test]
    fn refine_coarsen_cycles_reuse_vertex_slots() {
        let mut tria = unit_cube::<2>();

        for _ in 0..50 {
            tria.refine_global(1).unwrap();
            assert_eq!(tria.n_vertices(), 9);

            let children: Vec<CellIndex> = tria.active_cells().map(|c| c.index()).collect();
            for child in children {
                tria.set_coarsen_flag(child).unwrap();
            }
            tria.execute_refinement().unwrap();
            assert_eq!(tria.n_vertices(), 4);
        }

        assert_eq!(tria.vertices.len(), 9);
        assert!(tria.sub_object_centers.is_empty());
    }

    #[test]
    fn incremental_refinement_in_3d() {
        let mut tria = unit_cube::<3>();
        tria.refine_global(1).unwrap();
        assert_eq!(tria.n_vertices(), 27);

        // one cell at a time, every step leaves hanging vertices on the unrefined neighbors
        let coarse: Vec<CellIndex> = tria.active_cells().map(|c| c.index()).collect();
        for (n, cell) in coarse.iter().enumerate() {
            tria.set_refine_flag(*cell).unwrap();
            tria.execute_refinement().unwrap();
            assert_eq!(tria.n_active_cells(), 8 + 7 * (n + 1));
        }
        assert_eq!(tria.n_active_cells(), 64);
        assert_eq!(tria.n_vertices(), 125);
        assert!(tria.active_cells().all(|c| c.level() == 2));

        let corner = tria.begin_active().unwrap();
        tria.set_refine_flag(corner).unwrap();
        tria.execute_refinement().unwrap();
        assert_eq!(tria.n_active_cells(), 71);
        assert_eq!(tria.n_vertices(), 144);

        let children: Vec<CellIndex> = tria
            .cell(corner)
            .unwrap()
            .children()
            .map(|c| c.index())
            .collect();
        assert_eq!(children.len(), 8);
        for child in children {
            tria.set_coarsen_flag(child).unwrap();
        }
        tria.execute_refinement().unwrap();
        assert_eq!(tria.n_active_cells(), 64);
        assert_eq!(tria.n_vertices(), 125);
        assert_eq!(tria.n_levels(), 3);
        assert!(tria.cell(corner).unwrap().is_active());
    }

    #[test]
    fn partial_coarsen_flags_are_ignored() {
        let mut tria = unit_cube::<2>();
        tria.refine_global(1).unwrap();
        let first = tria.begin_active().unwrap();
        tria.set_coarsen_flag(first).unwrap();
        tria.execute_refinement().unwrap();

        assert_eq!(tria.n_active_cells(), 4);
        assert!(!tria.cell(first).unwrap().coarsen_flag_set());
    }

    #[test]
    fn coarsening_next_to_finer_cells_is_rejected() {
        let mut tria = two_cells();
        tria.refine_global(1).unwrap();

        // refine the child of the left cell that touches the right cell
        let left_child = tria.cell(CellIndex::new(0, 0)).unwrap().child(1).unwrap().index();
        tria.set_refine_flag(left_child).unwrap();
        tria.execute_refinement().unwrap();
        let n_active = tria.n_active_cells();

        let right_children: Vec<CellIndex> = tria
            .cell(CellIndex::new(0, 1))
            .unwrap()
            .children()
            .map(|c| c.index())
            .collect();
        for child in right_children {
            tria.set_coarsen_flag(child).unwrap();
        }

        assert!(matches!(
            tria.execute_refinement(),
            Err(TriaError::CoarseningConflict(cell)) if cell == CellIndex::new(0, 1)
        ));
        assert_eq!(tria.n_active_cells(), n_active);
    }

    #[test]
    fn boundary_ids_are_inherited() {
        let mut tria = Triangulation::<2>::new();
        grid_generator::hyper_cube(&mut tria, 0.0, 1.0, true).unwrap();
        tria.refine_global(2).unwrap();

        for face in tria.active_boundary_faces() {
            let c = face.center();
            let expected = if c.x.abs() < 1e-12 {
                0
            } else if (c.x - 1.0).abs() < 1e-12 {
                1
            } else if c.y.abs() < 1e-12 {
                2
            } else {
                3
            };
            assert_eq!(face.boundary_id(), Some(expected));
        }
        assert_eq!(tria.active_boundary_faces().count(), 16);
    }

    #[test]
    fn reassigned_boundary_ids_survive_refinement() {
        let mut tria = unit_cube::<2>();
        tria.refine_global(1).unwrap();
        let first = tria.begin_active().unwrap();
        tria.set_boundary_id(first, 0, 9).unwrap();

        let other = tria.next_active(first).unwrap();
        tria.set_refine_flag(other).unwrap();
        tria.execute_refinement().unwrap();

        assert_eq!(tria.cell(first).unwrap().boundary_id(0), Some(9));
    }

    #[test]
    fn cell_ids_survive_refinement_and_coarsening() {
        let mut tria = unit_cube::<2>();
        tria.refine_global(1).unwrap();

        let last = tria.active_cells().last().unwrap().index();
        let id = tria.cell_id(last).unwrap();
        let center = tria.cell(last).unwrap().center();
        assert_eq!(id.to_string(), "0_1:3");

        let first = tria.begin_active().unwrap();
        tria.set_refine_flag(first).unwrap();
        tria.execute_refinement().unwrap();

        let found = tria.cell_from_id(&id).unwrap();
        assert!((tria.cell(found).unwrap().center() - center).norm() < 1e-14);

        // coarsen the refined child again; slots are reused but the id still resolves
        let grandchildren: Vec<CellIndex> = tria.active_cells_on_level(2).map(|c| c.index()).collect();
        for cell in grandchildren {
            tria.set_coarsen_flag(cell).unwrap();
        }
        tria.execute_refinement().unwrap();
        assert_eq!(tria.n_levels(), 2);
        assert_eq!(tria.cell_from_id(&id), Some(found));
        assert!(tria.cell_from_id(&"0_2:00".parse().unwrap()).is_none());
    }

    #[test]
    #[should_panic(expected = "Triangulation has no cells")]
    fn refine_after_clear() {
        let mut tria = unit_cube::<2>();
        tria.clear();
        let _ = tria.refine_global(1);
    }
}
