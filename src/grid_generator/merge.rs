use crate::error::TriaError;
use crate::triangulation::cell::{face_vertices, faces_per_cell, sorted_key};
use crate::triangulation::vertex::VertexMatcher;
use crate::triangulation::{
    BoundaryFaceData, CellData, Point, Triangulation, VERTEX_MATCHING_TOLERANCE,
};

use log::{debug, info};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

/// Policy of [merge_triangulations]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeOptions {
    /// Vertices of the two inputs closer than this are merged
    pub tolerance: f64,
    /// Keep the boundary ids of surviving boundary faces (otherwise they all get id 0)
    pub copy_boundary_ids: bool,
    /// Report cells of the second input that coincide with cells of the first as errors instead of dropping them
    pub force_distinct_boundaries: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            tolerance: VERTEX_MATCHING_TOLERANCE,
            copy_boundary_ids: false,
            force_distinct_boundaries: false,
        }
    }
}

/// Combine two single-level triangulations into the empty triangulation `result`
///
/// * vertices within `options.tolerance` of one another are merged
/// * cells of `a` come first, followed by the cells of `b`
/// * faces present (with the same vertices) in both inputs become interior faces. Faces that only overlap
///     partially, like the coarse side of a hanging face, stay separate boundary faces.
///
/// Boundary descriptions are not copied; register them on `result` as needed.
/// Nothing is written to `result` if an `Err` is returned.
pub fn merge_triangulations<const D: usize>(
    a: &Triangulation<D>,
    b: &Triangulation<D>,
    result: &mut Triangulation<D>,
    options: &MergeOptions,
) -> Result<(), TriaError> {
    a.assert_populated();
    b.assert_populated();
    if !result.is_empty() {
        return Err(TriaError::NotEmpty);
    }
    if a.n_levels() > 1 || b.n_levels() > 1 {
        return Err(TriaError::RefinedMergeInput);
    }

    let mut matcher = VertexMatcher::new(options.tolerance)?;
    let vertex_map_a = match_vertices(a, &mut matcher)?;
    let vertex_map_b = match_vertices(b, &mut matcher)?;
    let vertices = matcher.into_points();

    let mut cells: Vec<CellData> = Vec::with_capacity(a.n_active_cells() + b.n_active_cells());
    let mut cell_keys: HashSet<SmallVec<[usize; 8]>> = HashSet::new();

    for cell in a.active_cells() {
        let vertices: SmallVec<[usize; 8]> =
            cell.vertex_indices().iter().map(|v| vertex_map_a[v]).collect();
        cell_keys.insert(sorted_key(vertices.iter().copied()));
        cells.push(CellData {
            vertices,
            subdomain_id: cell.subdomain_id(),
        });
    }

    let mut n_deduplicated = 0;
    for cell in b.active_cells() {
        let vertices: SmallVec<[usize; 8]> =
            cell.vertex_indices().iter().map(|v| vertex_map_b[v]).collect();

        if cell_keys.contains(&sorted_key(vertices.iter().copied())) {
            if options.force_distinct_boundaries {
                return Err(TriaError::CoincidentCells(cell.index().index));
            }
            n_deduplicated += 1;
            continue;
        }

        cells.push(CellData {
            vertices,
            subdomain_id: cell.subdomain_id(),
        });
    }

    // count how many merged cells own each face
    let mut face_counts: HashMap<SmallVec<[usize; 8]>, usize> = HashMap::new();
    for cell in cells.iter() {
        for face in 0..faces_per_cell(D) {
            let key = sorted_key(face_vertices(D, face).iter().map(|v| cell.vertices[*v]));
            *face_counts.entry(key).or_default() += 1;
        }
    }

    let mut boundary_faces: Vec<BoundaryFaceData> = Vec::new();
    if options.copy_boundary_ids {
        let surviving_a = surviving_boundary_faces(a, &vertex_map_a, &face_counts);
        let surviving_b = surviving_boundary_faces(b, &vertex_map_b, &face_counts);

        // a face surviving in both inputs (duplicated cells) keeps the id it has in `a`
        let mut seen: HashSet<SmallVec<[usize; 8]>> = HashSet::new();
        boundary_faces.extend(
            surviving_a
                .into_iter()
                .chain(surviving_b)
                .filter(|f| seen.insert(sorted_key(f.vertices.iter().copied()))),
        );
    }

    debug!(
        "Merging {} + {} cells: {} merged vertices, {} duplicated cells dropped",
        a.n_active_cells(),
        b.n_active_cells(),
        vertices.len(),
        n_deduplicated
    );

    result.create_triangulation(vertices, cells, &boundary_faces)?;

    info!(
        "Merged triangulations into {} cells with {} boundary faces",
        result.n_active_cells(),
        result.active_boundary_faces().count()
    );

    Ok(())
}

/// Map from the used vertex ids of `tria` to ids in the matcher
fn match_vertices<const D: usize>(
    tria: &Triangulation<D>,
    matcher: &mut VertexMatcher<D>,
) -> Result<HashMap<usize, usize>, TriaError> {
    tria.vertices()
        .map(|(id, point)| Ok((id, matcher.insert(*point, id)?)))
        .collect()
}

/// Boundary faces of `tria` (renumbered) that are not shared with a cell of the other input
fn surviving_boundary_faces<const D: usize>(
    tria: &Triangulation<D>,
    vertex_map: &HashMap<usize, usize>,
    face_counts: &HashMap<SmallVec<[usize; 8]>, usize>,
) -> Vec<BoundaryFaceData> {
    tria.active_boundary_faces()
        .filter_map(|face| {
            let vertices: SmallVec<[usize; 4]> =
                face.vertex_indices().iter().map(|v| vertex_map[v]).collect();
            let key = sorted_key(vertices.iter().copied());

            match (face.boundary_id(), face_counts.get(&key)) {
                (Some(boundary_id), Some(1)) => Some(BoundaryFaceData {
                    vertices,
                    boundary_id,
                }),
                _ => None,
            }
        })
        .collect()
}

/// Copy the active cells of `source` into the empty triangulation `target` as a single-level mesh
///
/// Subdomain ids, boundary ids and registered boundary descriptions are carried over.
/// Faces that were hanging in `source` become (separate) boundary faces with the default id.
pub fn flatten_triangulation<const D: usize>(
    source: &Triangulation<D>,
    target: &mut Triangulation<D>,
) -> Result<(), TriaError> {
    source.assert_populated();
    if !target.is_empty() {
        return Err(TriaError::NotEmpty);
    }

    let mut renumbering: HashMap<usize, usize> = HashMap::new();
    let mut vertices: Vec<Point<D>> = Vec::new();
    let mut renumber = |id: usize| {
        *renumbering.entry(id).or_insert_with(|| {
            vertices.push(*source.vertices.point(id));
            vertices.len() - 1
        })
    };

    let mut cells = Vec::with_capacity(source.n_active_cells());
    let mut boundary_faces = Vec::new();
    for cell in source.active_cells() {
        let cell_vertices: SmallVec<[usize; 8]> =
            cell.vertex_indices().iter().map(|v| renumber(*v)).collect();

        for face in cell.faces().filter(|f| f.at_boundary()) {
            if let Some(boundary_id) = face.boundary_id() {
                boundary_faces.push(BoundaryFaceData {
                    vertices: face_vertices(D, face.face_no())
                        .iter()
                        .map(|v| cell_vertices[*v])
                        .collect(),
                    boundary_id,
                });
            }
        }

        cells.push(CellData {
            vertices: cell_vertices,
            subdomain_id: cell.subdomain_id(),
        });
    }

    target.create_triangulation(vertices, cells, &boundary_faces)?;
    target.boundaries = source.boundaries.clone();

    debug!(
        "Flattened {} levels into {} cells",
        source.n_levels(),
        target.n_active_cells()
    );

    Ok(())
}
