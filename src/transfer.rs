//! Geometric transfer between two (possibly non-nested) triangulations of the same domain.
//!
//! Cells are mapped from the unit cell with the multilinear (Q1) map through their vertices.
//! Fine cells are related to the coarse active cell containing their center; vertex values are transferred
//! by evaluating the coarse multilinear interpolant at the fine vertices.

use crate::dofs::{DofHandler, DofLayout};
use crate::error::TriaError;
use crate::triangulation::accessor::CellRef;
use crate::triangulation::{CellIndex, Point, Triangulation};

use log::{debug, trace};
use nalgebra::{SMatrix, SVector};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Slack (in unit coordinates) when deciding whether a point lies inside a cell
pub const POINT_IN_CELL_TOLERANCE: f64 = 1e-10;

const MAX_NEWTON_ITERATIONS: usize = 30;

// ----------------------------------------------------------------------------------------------------
// Multilinear cell geometry
// ----------------------------------------------------------------------------------------------------

/// Values of the `2^D` multilinear shape functions at a point of the unit cell
pub fn shape_values<const D: usize>(unit: &Point<D>) -> SmallVec<[f64; 8]> {
    (0..(1_usize << D))
        .map(|v| {
            (0..D)
                .map(|d| {
                    if (v >> d) & 1 == 1 {
                        unit[d]
                    } else {
                        1.0 - unit[d]
                    }
                })
                .product::<f64>()
        })
        .collect()
}

/// Gradients of the `2^D` multilinear shape functions at a point of the unit cell
pub fn shape_gradients<const D: usize>(unit: &Point<D>) -> SmallVec<[SVector<f64, D>; 8]> {
    (0..(1_usize << D))
        .map(|v| {
            SVector::<f64, D>::from_fn(|d, _| {
                (0..D)
                    .map(|e| {
                        let upper = (v >> e) & 1 == 1;
                        match (e == d, upper) {
                            (true, true) => 1.0,
                            (true, false) => -1.0,
                            (false, true) => unit[e],
                            (false, false) => 1.0 - unit[e],
                        }
                    })
                    .product::<f64>()
            })
        })
        .collect()
}

impl<'a, const D: usize> CellRef<'a, D> {
    /// Image of a point of the unit cell under the cell's multilinear map
    pub fn transform_unit_to_real(&self, unit: &Point<D>) -> Point<D> {
        let coords = shape_values(unit)
            .iter()
            .enumerate()
            .fold(SVector::<f64, D>::zeros(), |acc, (v, n)| {
                acc + self.vertex(v).coords * *n
            });
        Point::from(coords)
    }

    /// Jacobian of the multilinear map at a point of the unit cell
    pub fn jacobian(&self, unit: &Point<D>) -> SMatrix<f64, D, D> {
        shape_gradients(unit)
            .iter()
            .enumerate()
            .fold(SMatrix::<f64, D, D>::zeros(), |acc, (v, grad)| {
                acc + self.vertex(v).coords * grad.transpose()
            })
    }

    /// Unit-cell coordinates of a real point, found with Newton's method on the multilinear map
    ///
    /// Returns `None` if the iteration does not converge or the Jacobian becomes singular. The result may lie
    /// outside the unit cell for points outside the cell.
    pub fn transform_real_to_unit(&self, point: &Point<D>) -> Option<Point<D>> {
        let scale = self.diameter().max(f64::MIN_POSITIVE);
        let mut unit = Point::from([0.5; D]);

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let residual = self.transform_unit_to_real(&unit) - point;
            if residual.norm() <= 1e-13 * scale {
                return Some(unit);
            }

            let step = self.jacobian(&unit).try_inverse()? * residual;
            unit -= step;

            if !unit.coords.iter().all(|c| c.is_finite()) {
                return None;
            }
        }

        trace!("Newton iteration did not converge in cell {}", self.index());
        None
    }

    /// Does the cell contain the point (up to [POINT_IN_CELL_TOLERANCE] in unit coordinates)
    pub fn contains_point(&self, point: &Point<D>) -> bool {
        if !self.bounding_box_contains(point) {
            return false;
        }
        self.transform_real_to_unit(point)
            .map(|unit| in_unit_cell(&unit))
            .unwrap_or(false)
    }

    fn bounding_box_contains(&self, point: &Point<D>) -> bool {
        let slack = POINT_IN_CELL_TOLERANCE * self.diameter();
        (0..D).all(|d| {
            let (lower, upper) = self
                .vertices()
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v[d]), hi.max(v[d]))
                });
            point[d] >= lower - slack && point[d] <= upper + slack
        })
    }
}

fn in_unit_cell<const D: usize>(unit: &Point<D>) -> bool {
    unit.coords
        .iter()
        .all(|c| *c >= -POINT_IN_CELL_TOLERANCE && *c <= 1.0 + POINT_IN_CELL_TOLERANCE)
}

// ----------------------------------------------------------------------------------------------------
// Point location
// ----------------------------------------------------------------------------------------------------

/// The active cell containing a point, along with the point's unit-cell coordinates in it
///
/// The cell hierarchy is searched top down; if curved boundaries moved children outside of their parent, all
/// active cells are searched. Points on faces between cells belong to the first cell in traversal order.
pub fn find_active_cell_around_point<const D: usize>(
    tria: &Triangulation<D>,
    point: &Point<D>,
) -> Result<(CellIndex, Point<D>), TriaError> {
    tria.assert_populated();

    let mut stack: Vec<CellRef<'_, D>> = tria.cells_on_level(0).collect();
    stack.reverse();
    while let Some(cell) = stack.pop() {
        if !cell.contains_point(point) {
            continue;
        }
        if cell.is_active() {
            if let Some(unit) = cell.transform_real_to_unit(point) {
                return Ok((cell.index(), unit));
            }
        } else {
            let mut children: Vec<CellRef<'_, D>> = cell.children().collect();
            children.reverse();
            stack.extend(children);
        }
    }

    tria.active_cells()
        .find_map(|cell| {
            if cell.contains_point(point) {
                cell.transform_real_to_unit(point)
                    .map(|unit| (cell.index(), unit))
            } else {
                None
            }
        })
        .ok_or_else(|| TriaError::PointNotFound(format!("{:?}", point.coords.as_slice())))
}

// ----------------------------------------------------------------------------------------------------
// Two-level transfer
// ----------------------------------------------------------------------------------------------------

/// Relation between the active cells of a fine and a coarse triangulation covering the same domain
///
/// The meshes don't need to be related by refinement.
#[derive(Debug, Clone)]
pub struct GridTransfer<'a, const D: usize> {
    fine: &'a Triangulation<D>,
    coarse: &'a Triangulation<D>,
    /// active index of the coarse cell containing the center of each fine active cell
    fine_to_coarse: Vec<usize>,
    /// active indices of the fine cells whose centers lie in each coarse active cell
    coarse_to_fine: Vec<Vec<usize>>,
    /// fine active cell containing the center of each coarse active cell
    coarse_center_owner: Vec<usize>,
}

impl<'a, const D: usize> GridTransfer<'a, D> {
    pub fn new(fine: &'a Triangulation<D>, coarse: &'a Triangulation<D>) -> Result<Self, TriaError> {
        let fine_to_coarse = locate_centers(fine, coarse)?;
        let coarse_center_owner = locate_centers(coarse, fine)?;

        let mut coarse_to_fine = vec![Vec::new(); coarse.n_active_cells()];
        for (fine_cell, coarse_cell) in fine_to_coarse.iter().enumerate() {
            coarse_to_fine[*coarse_cell].push(fine_cell);
        }

        debug!(
            "Grid transfer between {} fine and {} coarse cells",
            fine_to_coarse.len(),
            coarse_to_fine.len()
        );

        Ok(Self {
            fine,
            coarse,
            fine_to_coarse,
            coarse_to_fine,
            coarse_center_owner,
        })
    }

    pub fn fine(&self) -> &'a Triangulation<D> {
        self.fine
    }

    pub fn coarse(&self) -> &'a Triangulation<D> {
        self.coarse
    }

    /// Active index of the coarse cell associated with a fine active cell
    pub fn coarse_cell_of(&self, fine_active_index: usize) -> Option<usize> {
        self.fine_to_coarse.get(fine_active_index).copied()
    }

    /// Active indices of the fine cells associated with a coarse active cell
    pub fn fine_cells_of(&self, coarse_active_index: usize) -> &[usize] {
        self.coarse_to_fine
            .get(coarse_active_index)
            .map(|cells| cells.as_slice())
            .unwrap_or(&[])
    }

    /// Copy each coarse cell value to the fine cells associated with it
    pub fn prolongate_cell_values(&self, coarse_values: &[f64]) -> Result<Vec<f64>, TriaError> {
        check_length("coarse cell values", coarse_values, self.coarse.n_active_cells())?;
        Ok(self
            .fine_to_coarse
            .iter()
            .map(|coarse_cell| coarse_values[*coarse_cell])
            .collect())
    }

    /// Average the fine cell values over each coarse cell
    ///
    /// A coarse cell without associated fine cells (possible for non-nested meshes) takes the value of the fine
    /// cell containing its center.
    pub fn restrict_cell_values(&self, fine_values: &[f64]) -> Result<Vec<f64>, TriaError> {
        check_length("fine cell values", fine_values, self.fine.n_active_cells())?;
        Ok(self
            .coarse_to_fine
            .iter()
            .zip(self.coarse_center_owner.iter())
            .map(|(fine_cells, owner)| {
                if fine_cells.is_empty() {
                    fine_values[*owner]
                } else {
                    fine_cells.iter().map(|c| fine_values[*c]).sum::<f64>() / fine_cells.len() as f64
                }
            })
            .collect())
    }

    /// Evaluate the coarse multilinear field at every fine vertex
    ///
    /// Both handlers must use [DofLayout::PerVertex] with the same number of components, on the fine and coarse
    /// triangulations of this transfer.
    pub fn prolongate_vertex_values(
        &self,
        fine_dofs: &DofHandler<'_, D>,
        coarse_dofs: &DofHandler<'_, D>,
        coarse_values: &[f64],
    ) -> Result<Vec<f64>, TriaError> {
        let components = match (fine_dofs.layout(), coarse_dofs.layout()) {
            (
                Some(DofLayout::PerVertex { components: fine }),
                Some(DofLayout::PerVertex { components: coarse }),
            ) if fine == coarse => fine,
            (None, _) | (_, None) => return Err(TriaError::DofsNotDistributed),
            (fine, coarse) => {
                return Err(TriaError::LayoutMismatch(format!(
                    "vertex transfer needs equal PerVertex layouts, found {:?} and {:?}",
                    fine, coarse
                )))
            }
        };
        if !std::ptr::eq(fine_dofs.triangulation(), self.fine)
            || !std::ptr::eq(coarse_dofs.triangulation(), self.coarse)
        {
            return Err(TriaError::LayoutMismatch(String::from(
                "the dof handlers are not built on the triangulations of this transfer",
            )));
        }
        check_length("coarse vertex values", coarse_values, coarse_dofs.n_dofs())?;

        // each fine vertex is searched first in the coarse cell associated with one of its fine cells
        let mut hints: HashMap<usize, usize> = HashMap::new();
        for cell in self.fine.active_cells() {
            let active_index = cell.active_cell_index().unwrap_or_default();
            for v in cell.vertex_indices() {
                hints.entry(*v).or_insert(self.fine_to_coarse[active_index]);
            }
        }
        let hints: Vec<(usize, usize)> = hints.into_iter().collect();
        let coarse_cells: Vec<CellIndex> = self.coarse.active_cells().map(|c| c.index()).collect();

        let evaluated = hints
            .par_iter()
            .map(|(vertex, hint)| -> Result<(usize, SmallVec<[f64; 4]>), TriaError> {
                let point = self
                    .fine
                    .vertex(*vertex)
                    .ok_or_else(|| TriaError::PointNotFound(format!("vertex {}", vertex)))?;

                let hinted = self.coarse.cell(coarse_cells[*hint]);
                let (cell, unit) = match hinted.and_then(|cell| {
                    if cell.contains_point(point) {
                        cell.transform_real_to_unit(point).map(|unit| (cell.index(), unit))
                    } else {
                        None
                    }
                }) {
                    Some(found) => found,
                    None => find_active_cell_around_point(self.coarse, point)?,
                };

                let dofs = coarse_dofs.cell_dofs(cell)?;
                let weights = shape_values(&unit);
                let values: SmallVec<[f64; 4]> = (0..components)
                    .map(|c| {
                        weights
                            .iter()
                            .enumerate()
                            .map(|(v, w)| w * coarse_values[dofs[v * components + c]])
                            .sum::<f64>()
                    })
                    .collect();

                Ok((*vertex, values))
            })
            .collect::<Result<Vec<(usize, SmallVec<[f64; 4]>)>, TriaError>>()?;

        let mut fine_values = vec![0.0; fine_dofs.n_dofs()];
        for (vertex, values) in evaluated {
            for (c, value) in values.into_iter().enumerate() {
                if let Some(dof) = fine_dofs.vertex_dof(vertex, c) {
                    fine_values[dof] = value;
                }
            }
        }

        Ok(fine_values)
    }
}

fn check_length(name: &str, values: &[f64], expected: usize) -> Result<(), TriaError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(TriaError::DataVectorLength {
            name: name.to_string(),
            found: values.len(),
            expected,
        })
    }
}

/// Active index of the cell of `target` containing the center of each active cell of `source`
fn locate_centers<const D: usize>(
    source: &Triangulation<D>,
    target: &Triangulation<D>,
) -> Result<Vec<usize>, TriaError> {
    let centers: Vec<Point<D>> = source.active_cells().map(|cell| cell.center()).collect();

    centers
        .par_iter()
        .map(|center| -> Result<usize, TriaError> {
            let (cell, _) = find_active_cell_around_point(target, center)?;
            target
                .cell(cell)
                .and_then(|c| c.active_cell_index())
                .ok_or(TriaError::CellNotActive(cell))
        })
        .collect()
}
