//! Gathering of cell-wise output data ("patches") from a selection of active cells.
//! Writing patches to a particular file format is left to the caller.

use crate::dofs::DofHandler;
use crate::error::TriaError;
use crate::triangulation::iteration::{first_matching, next_matching, CellPredicate, Traversal};
use crate::triangulation::{CellIndex, Point, Triangulation};

use log::debug;
use smallvec::SmallVec;

/// Selects the first cell to output
pub type FirstCellFn<'a, const D: usize> =
    Box<dyn Fn(&Triangulation<D>) -> Option<CellIndex> + 'a>;

/// Selects the cell following a previously selected one
pub type NextCellFn<'a, const D: usize> =
    Box<dyn Fn(&Triangulation<D>, CellIndex) -> Option<CellIndex> + 'a>;

/// How the entries of a data vector are indexed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataVectorType {
    /// one value per active cell, indexed by active cell index
    CellData,
    /// one value per degree of freedom of the attached [DofHandler]
    DofData,
}

#[derive(Debug, Clone)]
struct DataEntry {
    name: String,
    kind: DataVectorType,
    values: Vec<f64>,
}

/// Output data of one selected cell
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<const D: usize> {
    pub cell: CellIndex,
    pub active_index: usize,
    pub vertices: SmallVec<[Point<D>; 8]>,
    /// One row per data vector (in the order they were added):
    /// a single value for cell data, the values of the cell's dofs for dof data
    pub data: Vec<SmallVec<[f64; 8]>>,
}

/// Builds [Patch]es from the active cells of a triangulation and the data vectors living on them
///
/// By default every active cell is output. [DataOut::set_cell_selection] replaces the selection with a
/// `first`/`next` pair of functions; patch `k` always describes the `k`-th selected cell.
pub struct DataOut<'a, const D: usize> {
    tria: Option<&'a Triangulation<D>>,
    dof_handler: Option<&'a DofHandler<'a, D>>,
    first_cell: FirstCellFn<'a, D>,
    next_cell: NextCellFn<'a, D>,
    data: Vec<DataEntry>,
    patches: Vec<Patch<D>>,
}

impl<'a, const D: usize> Default for DataOut<'a, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const D: usize> DataOut<'a, D> {
    pub fn new() -> Self {
        Self {
            tria: None,
            dof_handler: None,
            first_cell: Box::new(|tria: &Triangulation<D>| tria.begin_active()),
            next_cell: Box::new(|tria: &Triangulation<D>, cell: CellIndex| tria.next_active(cell)),
            data: Vec::new(),
            patches: Vec::new(),
        }
    }

    pub fn attach_triangulation(&mut self, tria: &'a Triangulation<D>) {
        self.tria = Some(tria);
    }

    /// Attach a dof handler (and its triangulation) for [DataVectorType::DofData] vectors
    pub fn attach_dof_handler(&mut self, dof_handler: &'a DofHandler<'a, D>) {
        self.tria = Some(dof_handler.triangulation());
        self.dof_handler = Some(dof_handler);
    }

    /// Output the cells produced by `first` and repeated calls of `next`, stopping at `None`
    pub fn set_cell_selection<F, N>(&mut self, first: F, next: N)
    where
        F: Fn(&Triangulation<D>) -> Option<CellIndex> + 'a,
        N: Fn(&Triangulation<D>, CellIndex) -> Option<CellIndex> + 'a,
    {
        self.first_cell = Box::new(first);
        self.next_cell = Box::new(next);
    }

    /// Output the active cells satisfying `predicate`
    pub fn set_cell_filter<P>(&mut self, predicate: P)
    where
        P: CellPredicate<D> + Clone + 'a,
    {
        let first_predicate = predicate.clone();
        self.set_cell_selection(
            move |tria| first_matching(tria, Traversal::Active, tria.begin_active(), &first_predicate),
            move |tria, cell| next_matching(tria, Traversal::Active, cell, &predicate),
        );
    }

    /// Add a named data vector
    ///
    /// Cell data needs one entry per active cell, dof data one entry per dof of the attached handler.
    pub fn add_data_vector(
        &mut self,
        values: Vec<f64>,
        name: impl Into<String>,
        kind: DataVectorType,
    ) -> Result<(), TriaError> {
        let entry = DataEntry {
            name: name.into(),
            kind,
            values,
        };
        self.check_length(&entry)?;
        self.data.push(entry);
        Ok(())
    }

    /// Number of entries a data vector of this kind needs with the current attachments
    fn expected_length(&self, kind: DataVectorType) -> Result<usize, TriaError> {
        match kind {
            DataVectorType::CellData => Ok(self
                .tria
                .ok_or(TriaError::NoTriangulation)?
                .n_active_cells()),
            DataVectorType::DofData => {
                let dof_handler = self.dof_handler.ok_or(TriaError::DofsNotDistributed)?;
                dof_handler.layout().ok_or(TriaError::DofsNotDistributed)?;
                Ok(dof_handler.n_dofs())
            }
        }
    }

    fn check_length(&self, entry: &DataEntry) -> Result<(), TriaError> {
        let expected = self.expected_length(entry.kind)?;
        if entry.values.len() == expected {
            Ok(())
        } else {
            Err(TriaError::DataVectorLength {
                name: entry.name.clone(),
                found: entry.values.len(),
                expected,
            })
        }
    }

    pub fn data_names(&self) -> Vec<&str> {
        self.data.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Build one patch per selected cell
    ///
    /// Fails if the selection yields a cell that doesn't exist or isn't active, or if a data vector doesn't fit
    /// the triangulation or dof handler attached now.
    pub fn build_patches(&mut self) -> Result<&[Patch<D>], TriaError> {
        let tria = self.tria.ok_or(TriaError::NoTriangulation)?;
        tria.assert_populated();
        for entry in self.data.iter() {
            self.check_length(entry)?;
        }

        let mut patches = Vec::new();
        let mut position = (self.first_cell)(tria);
        while let Some(index) = position {
            let cell = tria.cell(index).ok_or(TriaError::CellDoesntExist(index))?;
            let active_index = cell
                .active_cell_index()
                .ok_or(TriaError::CellNotActive(index))?;

            let data = self
                .data
                .iter()
                .map(|entry| -> Result<SmallVec<[f64; 8]>, TriaError> {
                    match entry.kind {
                        DataVectorType::CellData => {
                            Ok(SmallVec::from_elem(entry.values[active_index], 1))
                        }
                        DataVectorType::DofData => {
                            let dof_handler =
                                self.dof_handler.ok_or(TriaError::DofsNotDistributed)?;
                            Ok(dof_handler
                                .cell_dofs(index)?
                                .iter()
                                .map(|dof| entry.values[*dof])
                                .collect())
                        }
                    }
                })
                .collect::<Result<Vec<SmallVec<[f64; 8]>>, TriaError>>()?;

            patches.push(Patch {
                cell: index,
                active_index,
                vertices: cell.vertices(),
                data,
            });

            position = (self.next_cell)(tria, index);
        }

        debug!(
            "Built {} patches with {} data vectors",
            patches.len(),
            self.data.len()
        );

        self.patches = patches;
        Ok(&self.patches)
    }

    /// Patches of the last [DataOut::build_patches] call
    pub fn patches(&self) -> &[Patch<D>] {
        &self.patches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dofs::DofLayout;
    use crate::grid_generator;
    use crate::triangulation::iteration::filters::SubdomainEqualTo;

    fn refined_square() -> Triangulation<2> {
        let mut tria = Triangulation::new();
        grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
        tria.refine_global(1).unwrap();
        tria
    }

    #[test]
    fn all_active_cells_by_default() {
        let tria = refined_square();
        let mut data_out = DataOut::new();
        data_out.attach_triangulation(&tria);
        data_out
            .add_data_vector(vec![0.0, 1.0, 2.0, 3.0], "cell_data", DataVectorType::CellData)
            .unwrap();

        let patches = data_out.build_patches().unwrap();
        assert_eq!(patches.len(), 4);
        for (k, patch) in patches.iter().enumerate() {
            assert_eq!(patch.active_index, k);
            assert_eq!(patch.data[0].as_slice(), &[k as f64]);
            assert_eq!(patch.vertices.len(), 4);
        }
    }

    #[test]
    fn selection_skipping_the_first_cell() {
        let mut tria = refined_square();
        let first = tria.begin_active().unwrap();
        tria.set_subdomain_id(first, 1).unwrap();

        let mut data_out = DataOut::new();
        data_out.attach_triangulation(&tria);
        data_out.set_cell_filter(SubdomainEqualTo(0));
        data_out
            .add_data_vector(vec![0.0, 1.0, 2.0, 3.0], "cell_data", DataVectorType::CellData)
            .unwrap();

        let patches = data_out.build_patches().unwrap();
        assert_eq!(patches.len(), 3);
        assert_eq!(
            patches.iter().map(|p| p.data[0][0]).collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0]
        );
        assert!(patches.iter().all(|p| p.cell != first));
    }

    #[test]
    fn dof_data_rows() {
        let tria = refined_square();
        let mut dofs = DofHandler::new(&tria);
        dofs.distribute_dofs(DofLayout::PerVertex { components: 1 })
            .unwrap();
        let values: Vec<f64> = (0..dofs.n_dofs()).map(|d| d as f64).collect();

        let mut data_out = DataOut::new();
        data_out.attach_dof_handler(&dofs);
        data_out
            .add_data_vector(values, "solution", DataVectorType::DofData)
            .unwrap();
        data_out
            .add_data_vector(vec![5.0; 4], "error", DataVectorType::CellData)
            .unwrap();
        assert_eq!(data_out.data_names(), vec!["solution", "error"]);

        let patches = data_out.build_patches().unwrap();
        assert_eq!(patches[0].data[0].as_slice(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(patches[3].data[1].as_slice(), &[5.0]);
    }

    #[test]
    fn invalid_data_and_selections() {
        let tria = refined_square();
        let mut data_out = DataOut::new();
        assert!(matches!(
            data_out.add_data_vector(vec![0.0; 4], "a", DataVectorType::CellData),
            Err(TriaError::NoTriangulation)
        ));

        data_out.attach_triangulation(&tria);
        assert!(matches!(
            data_out.add_data_vector(vec![0.0; 3], "a", DataVectorType::CellData),
            Err(TriaError::DataVectorLength {
                found: 3,
                expected: 4,
                ..
            })
        ));
        assert!(matches!(
            data_out.add_data_vector(vec![0.0; 9], "b", DataVectorType::DofData),
            Err(TriaError::DofsNotDistributed)
        ));

        // a selection that starts on the (refined) coarse cell
        data_out.set_cell_selection(|_| Some(CellIndex::new(0, 0)), |_, _| None);
        assert!(matches!(
            data_out.build_patches(),
            Err(TriaError::CellNotActive(_))
        ));
    }

    #[test]
    fn data_is_checked_against_the_current_attachment() {
        let mut single = Triangulation::<2>::new();
        grid_generator::hyper_cube(&mut single, 0.0, 1.0, false).unwrap();
        let refined = refined_square();

        let mut data_out = DataOut::new();
        data_out.attach_triangulation(&single);
        data_out
            .add_data_vector(vec![1.0], "coarse", DataVectorType::CellData)
            .unwrap();
        assert_eq!(data_out.build_patches().unwrap().len(), 1);

        data_out.attach_triangulation(&refined);
        assert!(matches!(
            data_out.build_patches(),
            Err(TriaError::DataVectorLength {
                found: 1,
                expected: 4,
                ..
            })
        ));

        let mut dofs = DofHandler::new(&refined);
        dofs.distribute_dofs(DofLayout::PerCell { components: 1 })
            .unwrap();
        let mut vertex_dofs = DofHandler::new(&refined);
        vertex_dofs
            .distribute_dofs(DofLayout::PerVertex { components: 1 })
            .unwrap();

        let mut dof_out = DataOut::new();
        dof_out.attach_dof_handler(&dofs);
        dof_out
            .add_data_vector(vec![0.0; 4], "per_cell", DataVectorType::DofData)
            .unwrap();
        dof_out.attach_dof_handler(&vertex_dofs);
        assert!(matches!(
            dof_out.build_patches(),
            Err(TriaError::DataVectorLength {
                found: 4,
                expected: 9,
                ..
            })
        ));
    }
}
