//! Numbering of degrees of freedom on the active cells of a Triangulation.
//! Only the numbering is done here: no shape functions, no constraints for hanging vertices.

use crate::error::TriaError;
use crate::triangulation::{BoundaryId, CellIndex, Triangulation};

use log::debug;
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};

/// Where degrees of freedom live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DofLayout {
    /// `components` dofs on every active cell (piecewise constant fields)
    PerCell { components: usize },
    /// `components` dofs on every vertex of an active cell (continuous multilinear fields)
    PerVertex { components: usize },
}

impl DofLayout {
    pub fn components(&self) -> usize {
        match self {
            Self::PerCell { components } | Self::PerVertex { components } => *components,
        }
    }

    pub fn dofs_per_cell(&self, dim: usize) -> usize {
        match self {
            Self::PerCell { components } => *components,
            Self::PerVertex { components } => components * (1 << dim),
        }
    }
}

/// Degrees of freedom of one layout distributed over a borrowed [Triangulation]
///
/// Dofs are numbered in active-cell order. With [DofLayout::PerVertex], a vertex gets its dofs when it is first
/// encountered, and the components of one vertex (or cell) are numbered consecutively, so the component of
/// dof `i` is always `i % components`.
#[derive(Debug, Clone)]
pub struct DofHandler<'a, const D: usize> {
    tria: &'a Triangulation<D>,
    layout: Option<DofLayout>,
    cell_dofs: Vec<SmallVec<[usize; 8]>>,
    vertex_dofs: HashMap<usize, usize>,
    n_dofs: usize,
}

impl<'a, const D: usize> DofHandler<'a, D> {
    pub fn new(tria: &'a Triangulation<D>) -> Self {
        tria.assert_populated();
        Self {
            tria,
            layout: None,
            cell_dofs: Vec::new(),
            vertex_dofs: HashMap::new(),
            n_dofs: 0,
        }
    }

    pub fn triangulation(&self) -> &'a Triangulation<D> {
        self.tria
    }

    pub fn layout(&self) -> Option<DofLayout> {
        self.layout
    }

    /// Number the degrees of freedom of `layout`, replacing any earlier numbering
    pub fn distribute_dofs(&mut self, layout: DofLayout) -> Result<(), TriaError> {
        let components = layout.components();
        if components == 0 {
            return Err(TriaError::ZeroComponents);
        }

        let mut cell_dofs = Vec::with_capacity(self.tria.n_active_cells());
        let mut vertex_dofs = HashMap::new();
        let mut next_dof = 0;

        for cell in self.tria.active_cells() {
            let dofs: SmallVec<[usize; 8]> = match layout {
                DofLayout::PerCell { .. } => {
                    let first = next_dof;
                    next_dof += components;
                    (first..next_dof).collect()
                }
                DofLayout::PerVertex { .. } => cell
                    .vertex_indices()
                    .iter()
                    .flat_map(|v| {
                        let first = *vertex_dofs.entry(*v).or_insert_with(|| {
                            next_dof += components;
                            next_dof - components
                        });
                        first..first + components
                    })
                    .collect(),
            };
            cell_dofs.push(dofs);
        }

        debug!(
            "Distributed {} dofs ({:?}) on {} active cells",
            next_dof,
            layout,
            cell_dofs.len()
        );

        self.layout = Some(layout);
        self.cell_dofs = cell_dofs;
        self.vertex_dofs = vertex_dofs;
        self.n_dofs = next_dof;
        Ok(())
    }

    /// Total number of dofs (0 before distribution)
    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    fn distributed_layout(&self) -> Result<DofLayout, TriaError> {
        self.layout.ok_or(TriaError::DofsNotDistributed)
    }

    /// Dofs of an active cell
    pub fn cell_dofs(&self, cell: CellIndex) -> Result<&[usize], TriaError> {
        self.distributed_layout()?;
        let active_index = self
            .tria
            .cell(cell)
            .ok_or(TriaError::CellDoesntExist(cell))?
            .active_cell_index()
            .ok_or(TriaError::CellNotActive(cell))?;
        Ok(&self.cell_dofs[active_index])
    }

    /// Dofs of the cell with the given active index
    pub fn active_cell_dofs(&self, active_index: usize) -> Option<&[usize]> {
        self.cell_dofs.get(active_index).map(|dofs| dofs.as_slice())
    }

    /// Dof of one component at a vertex (only for [DofLayout::PerVertex])
    pub fn vertex_dof(&self, vertex: usize, component: usize) -> Option<usize> {
        match self.layout {
            Some(DofLayout::PerVertex { components }) if component < components => {
                self.vertex_dofs.get(&vertex).map(|first| first + component)
            }
            _ => None,
        }
    }

    /// Component of a dof
    pub fn component_of(&self, dof: usize) -> Option<usize> {
        match self.layout {
            Some(layout) if dof < self.n_dofs => Some(dof % layout.components()),
            _ => None,
        }
    }

    /// Marks the dofs of the components selected by `mask`
    pub fn extract_dofs(&self, mask: &[bool]) -> Result<Vec<bool>, TriaError> {
        let components = self.distributed_layout()?.components();
        if mask.len() != components {
            return Err(TriaError::ComponentMaskLength {
                found: mask.len(),
                expected: components,
            });
        }
        Ok((0..self.n_dofs).map(|dof| mask[dof % components]).collect())
    }

    /// Marks the dofs of one component
    pub fn dofs_of_component(&self, component: usize) -> Result<Vec<bool>, TriaError> {
        let components = self.distributed_layout()?.components();
        if component >= components {
            return Err(TriaError::ComponentOutOfRange {
                component,
                components,
            });
        }
        let mask: Vec<bool> = (0..components).map(|c| c == component).collect();
        self.extract_dofs(&mask)
    }

    /// Dofs on boundary faces with one of the given ids (all boundary faces if `ids` is empty)
    ///
    /// With [DofLayout::PerCell], these are the dofs of the cells owning such a face.
    pub fn boundary_dofs(&self, ids: &[BoundaryId]) -> Result<BTreeSet<usize>, TriaError> {
        let layout = self.distributed_layout()?;
        let components = layout.components();

        let mut dofs = BTreeSet::new();
        for face in self.tria.active_boundary_faces() {
            let selected = match face.boundary_id() {
                Some(id) => ids.is_empty() || ids.contains(&id),
                None => false,
            };
            if !selected {
                continue;
            }

            match layout {
                DofLayout::PerCell { .. } => {
                    if let Some(active_index) = face.cell().active_cell_index() {
                        dofs.extend(self.cell_dofs[active_index].iter().copied());
                    }
                }
                DofLayout::PerVertex { .. } => {
                    for v in face.vertex_indices() {
                        if let Some(first) = self.vertex_dofs.get(&v) {
                            dofs.extend(*first..*first + components);
                        }
                    }
                }
            }
        }

        Ok(dofs)
    }
}
