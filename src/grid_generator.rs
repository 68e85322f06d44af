/*!
Generators populating an empty [Triangulation] with standard coarse meshes.

All generators fail with [TriaError::NotEmpty] if the triangulation was already populated.

"Colorizing" a box-shaped mesh gives the domain faces normal to direction `d` the boundary id `2d` (lower side)
and `2d + 1` (upper side), matching the local face numbering of a cell. Without colorizing, all boundary faces
carry the [DEFAULT_BOUNDARY_ID](crate::triangulation::DEFAULT_BOUNDARY_ID).
*/

/// Merging independently built triangulations, flattening refined ones
pub mod merge;

use crate::error::TriaError;
use crate::triangulation::boundary::SphericalBoundary;
use crate::triangulation::{BoundaryFaceData, BoundaryId, CellData, Point, Triangulation};

use smallvec::SmallVec;
use std::sync::Arc;

/// Mesh of `[left, right]^D` made of a single cell
pub fn hyper_cube<const D: usize>(
    tria: &mut Triangulation<D>,
    left: f64,
    right: f64,
    colorize: bool,
) -> Result<(), TriaError> {
    hyper_rectangle(
        tria,
        Point::from([left; D]),
        Point::from([right; D]),
        colorize,
    )
}

/// Mesh of the box spanned by two opposite corners, made of a single cell
pub fn hyper_rectangle<const D: usize>(
    tria: &mut Triangulation<D>,
    p1: Point<D>,
    p2: Point<D>,
    colorize: bool,
) -> Result<(), TriaError> {
    subdivided_hyper_rectangle(tria, [1; D], p1, p2, colorize)
}

/// Mesh of the box spanned by two opposite corners, with `repetitions[d]` cells along direction `d`
///
/// Vertices and cells are numbered with the x index running fastest.
pub fn subdivided_hyper_rectangle<const D: usize>(
    tria: &mut Triangulation<D>,
    repetitions: [usize; D],
    p1: Point<D>,
    p2: Point<D>,
    colorize: bool,
) -> Result<(), TriaError> {
    if D == 0 {
        return Err(TriaError::UnsupportedDimension {
            generator: "subdivided_hyper_rectangle",
            dim: D,
        });
    }
    if repetitions.iter().any(|r| *r == 0) {
        return Err(TriaError::InvalidCellData(format!(
            "repetitions must be positive, found {:?}",
            repetitions
        )));
    }

    let mut lower = [0.0; D];
    let mut upper = [0.0; D];
    for d in 0..D {
        lower[d] = p1[d].min(p2[d]);
        upper[d] = p1[d].max(p2[d]);
        if upper[d] - lower[d] <= 0.0 {
            return Err(TriaError::InvalidCellData(format!(
                "the box is degenerate along direction {}",
                d
            )));
        }
    }

    // vertex lattice with (repetitions + 1) points per direction
    let points_per_direction: [usize; D] = repetitions.map(|r| r + 1);
    let vertex_stride = strides(&points_per_direction);
    let cell_stride = strides(&repetitions);

    let n_vertices: usize = points_per_direction.iter().product();
    let vertices: Vec<Point<D>> = (0..n_vertices)
        .map(|id| {
            let mut coords = [0.0; D];
            for d in 0..D {
                let i = (id / vertex_stride[d]) % points_per_direction[d];
                let step = (upper[d] - lower[d]) / repetitions[d] as f64;
                coords[d] = if i == repetitions[d] {
                    upper[d]
                } else {
                    lower[d] + step * i as f64
                };
            }
            Point::from(coords)
        })
        .collect();

    let n_cells: usize = repetitions.iter().product();
    let mut cells = Vec::with_capacity(n_cells);
    let mut boundary_faces = Vec::new();

    for cell_id in 0..n_cells {
        let position: [usize; D] =
            std::array::from_fn(|d| (cell_id / cell_stride[d]) % repetitions[d]);

        let cell_vertices: SmallVec<[usize; 8]> = (0..(1_usize << D))
            .map(|v| {
                (0..D)
                    .map(|d| (position[d] + ((v >> d) & 1)) * vertex_stride[d])
                    .sum()
            })
            .collect();

        if colorize {
            for d in 0..D {
                for side in 0..2 {
                    let at_domain_face = if side == 0 {
                        position[d] == 0
                    } else {
                        position[d] == repetitions[d] - 1
                    };

                    if at_domain_face {
                        let face_vertices: SmallVec<[usize; 4]> = cell_vertices
                            .iter()
                            .enumerate()
                            .filter(|(v, _)| (v >> d) & 1 == side)
                            .map(|(_, id)| *id)
                            .collect();
                        boundary_faces.push(BoundaryFaceData {
                            vertices: face_vertices,
                            boundary_id: (2 * d + side) as BoundaryId,
                        });
                    }
                }
            }
        }

        cells.push(CellData {
            vertices: cell_vertices,
            subdomain_id: 0,
        });
    }

    tria.create_triangulation(vertices, cells, &boundary_faces)
}

/// L-shaped domain: the cube `[left, right]^D` without its upper octant (quadrant in 2D)
///
/// Made of `2^D - 1` cells. Only defined for `D >= 2`.
pub fn hyper_l<const D: usize>(
    tria: &mut Triangulation<D>,
    left: f64,
    right: f64,
) -> Result<(), TriaError> {
    if D < 2 {
        return Err(TriaError::UnsupportedDimension {
            generator: "hyper_l",
            dim: D,
        });
    }
    if right <= left {
        return Err(TriaError::InvalidCellData(format!(
            "hyper_l needs left < right, found [{}, {}]",
            left, right
        )));
    }

    let stride = strides(&[3; D]);
    let coordinates = [left, 0.5 * (left + right), right];

    // the upper corner (last lattice point) only belongs to the removed cell
    let n_vertices = 3_usize.pow(D as u32) - 1;
    let vertices = (0..n_vertices)
        .map(|id| Point::from(std::array::from_fn::<f64, D, _>(|d| coordinates[(id / stride[d]) % 3])))
        .collect();

    let cells = (0..(1_usize << D) - 1)
        .map(|cell_id| {
            let vertices: SmallVec<[usize; 8]> = (0..(1_usize << D))
                .map(|v| {
                    (0..D)
                        .map(|d| (((cell_id >> d) & 1) + ((v >> d) & 1)) * stride[d])
                        .sum()
                })
                .collect();
            CellData {
                vertices,
                subdomain_id: 0,
            }
        })
        .collect();

    tria.create_triangulation(vertices, cells, &[])
}

/// Ball of the given radius made of a central cube surrounded by `2D` cells
///
/// All boundary faces get the id 0, and a [SphericalBoundary] is registered for that id so refinement
/// keeps new boundary vertices on the sphere.
pub fn hyper_ball<const D: usize>(
    tria: &mut Triangulation<D>,
    center: Point<D>,
    radius: f64,
) -> Result<(), TriaError> {
    if D == 0 {
        return Err(TriaError::UnsupportedDimension {
            generator: "hyper_ball",
            dim: D,
        });
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(TriaError::InvalidCellData(format!(
            "the radius of a ball must be positive, found {}",
            radius
        )));
    }

    let n_corners = 1_usize << D;
    let sqrt_d = (D as f64).sqrt();

    // inner cube corners at half the radius, outer corners on the sphere along the same directions
    let corner_direction = |corner: usize| {
        nalgebra::SVector::<f64, D>::from_fn(|d, _| if (corner >> d) & 1 == 1 { 1.0 } else { -1.0 })
            / sqrt_d
    };
    let vertices: Vec<Point<D>> = (0..n_corners)
        .map(|c| center + corner_direction(c) * (0.5 * radius))
        .chain((0..n_corners).map(|c| center + corner_direction(c) * radius))
        .collect();

    let mut cells = vec![CellData::new(&(0..n_corners).collect::<Vec<_>>())];
    for d in 0..D {
        for side in 0..2 {
            // along direction d the cell goes from the inner face to the sphere (or back on the lower side)
            let vertices: SmallVec<[usize; 8]> = (0..n_corners)
                .map(|v| {
                    let corner = (v & !(1 << d)) | (side << d);
                    let outer = ((v >> d) & 1) == side;
                    if outer {
                        n_corners + corner
                    } else {
                        corner
                    }
                })
                .collect();
            cells.push(CellData {
                vertices,
                subdomain_id: 0,
            });
        }
    }

    tria.create_triangulation(vertices, cells, &[])?;
    tria.set_boundary(0, Arc::new(SphericalBoundary::new(center, radius)))?;

    Ok(())
}

/// Offsets between consecutive entries along each direction of an x-fastest lattice
fn strides<const D: usize>(counts: &[usize; D]) -> [usize; D] {
    let mut strides = [1; D];
    for d in 1..D {
        strides[d] = strides[d - 1] * counts[d - 1];
    }
    strides
}
