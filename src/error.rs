use crate::triangulation::{BoundaryId, CellIndex};
use thiserror::Error;

/// Errors produced while building, refining, merging or querying a [Triangulation](crate::Triangulation)
///
/// Every variant is returned before the triangulation being operated on is mutated,
/// so a failed call leaves it exactly as it was.
#[derive(Debug, Error)]
pub enum TriaError {
    // --- invalid requests ---
    #[error("Negative refinement depth ({0}); Cannot refine!")]
    NegativeRefinement(i32),
    #[error("Refinement would create cells on level {requested}, over the maximum of {max_level}; Cannot refine!")]
    ExceedsMaxLevel { requested: usize, max_level: usize },
    #[error("Cell {0} does not exist!")]
    CellDoesntExist(CellIndex),
    #[error("Cell {0} has children; Only active cells can be flagged for refinement!")]
    CellNotActive(CellIndex),
    #[error("Face {face} does not exist on a {dim}D cell!")]
    FaceOutOfRange { face: usize, dim: usize },
    #[error("Face {face} of cell {cell} is an interior face; Cannot assign a boundary id!")]
    InteriorFace { cell: CellIndex, face: usize },
    #[error("Boundary id {0} is reserved!")]
    InvalidBoundaryId(BoundaryId),
    #[error("Triangulation already has cells; Call clear() before populating it again!")]
    NotEmpty,
    #[error("Invalid cell data: {0}")]
    InvalidCellData(String),
    #[error("The {generator} generator does not support {dim}D triangulations!")]
    UnsupportedDimension { generator: &'static str, dim: usize },

    // --- geometric inconsistencies ---
    #[error("Coarsening the children of cell {0} would leave a face with a two-level hanging node; Cannot coarsen!")]
    CoarseningConflict(CellIndex),
    #[error("Merge inputs must be single-level meshes; flatten the refined input before merging!")]
    RefinedMergeInput,
    #[error("Vertex matching tolerance must be positive and finite (got {0})!")]
    InvalidTolerance(f64),
    #[error("Vertex {vertex} lies within the matching tolerance of {candidates} distinct vertices; Cannot decide which to merge with!")]
    AmbiguousVertexMatch { vertex: usize, candidates: usize },
    #[error("Cell {0} of the second triangulation coincides with a cell of the first; Cannot merge!")]
    CoincidentCells(usize),
    #[error("No active cell contains the point {0}!")]
    PointNotFound(String),

    // --- consumers ---
    #[error("Dofs have not been distributed!")]
    DofsNotDistributed,
    #[error("A dof layout needs at least one component!")]
    ZeroComponents,
    #[error("Component {component} does not exist in a layout with {components} components!")]
    ComponentOutOfRange { component: usize, components: usize },
    #[error("Component mask has {found} entries but the layout has {expected} components!")]
    ComponentMaskLength { found: usize, expected: usize },
    #[error("Dof layouts are incompatible: {0}")]
    LayoutMismatch(String),
    #[error("No triangulation attached; Cannot build patches!")]
    NoTriangulation,
    #[error("Data vector '{name}' has {found} entries but {expected} were expected!")]
    DataVectorLength {
        name: String,
        found: usize,
        expected: usize,
    },

    // --- mesh files ---
    #[error("Malformed mesh file: {0}")]
    MeshFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
