/*!
# FEM Tria

Hierarchical, adaptively refined meshes of tensor-product cells (intervals, quadrilaterals, hexahedra) for
Finite Element computations.

A [Triangulation] is populated once, by one of the [grid_generator]s or from a [JSON mesh file](Triangulation::from_file),
and then changes through refinement and coarsening flags:

```
use fem_tria::{grid_generator, Triangulation};

let mut tria = Triangulation::<2>::new();
grid_generator::hyper_cube(&mut tria, -1.0, 1.0, true).unwrap();
tria.refine_global(2).unwrap();

// refine the first active cell once more
let first = tria.begin_active().unwrap();
tria.set_refine_flag(first).unwrap();
tria.execute_refinement().unwrap();

assert_eq!(tria.n_active_cells(), 16 + 3);
```

Consumers work on the active cells of a triangulation: a [DofHandler] numbers degrees of freedom, [DataOut]
collects per-cell output, and [GridTransfer] moves cell and vertex data between two meshes of the same domain.
*/

/// Errors returned by every fallible operation of the crate
pub mod error;

/// The hierarchical mesh and its cells, faces, traversals and refinement
pub mod triangulation;

pub mod grid_generator;

/// Degree of freedom numbering
pub mod dofs;

pub mod data_out;

pub mod transfer;

pub use data_out::{DataOut, DataVectorType, Patch};
pub use dofs::{DofHandler, DofLayout};
pub use error::TriaError;
pub use grid_generator::merge::{flatten_triangulation, merge_triangulations, MergeOptions};
pub use transfer::{find_active_cell_around_point, GridTransfer};
pub use triangulation::accessor::{CellRef, FaceRef};
pub use triangulation::boundary::{Boundary, FunctionBoundary, SphericalBoundary, StraightBoundary};
pub use triangulation::cell::{CellId, CellIndex, FaceState};
pub use triangulation::{
    BoundaryFaceData, BoundaryId, CellData, Point, SubdomainId, TriaSettings, Triangulation,
};
