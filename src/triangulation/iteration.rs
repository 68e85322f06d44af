use super::accessor::{CellRef, FaceRef};
use super::cell::{CellIndex, FaceState};
use super::{SubdomainId, Triangulation};

/// Order in which cells are visited
///
/// Both orders go level by level, and by index within a level. They are deterministic and
/// stable between calls as long as the triangulation is not mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    /// every cell, including cells with children
    All,
    /// only cells without children
    Active,
}

impl Traversal {
    fn accepts<const D: usize>(&self, tria: &Triangulation<D>, index: CellIndex) -> bool {
        match (self, tria.cell_data(index)) {
            (_, None) => false,
            (Self::All, Some(_)) => true,
            (Self::Active, Some(cell)) => cell.is_active(),
        }
    }

    /// First cell in this order, `None` (the end sentinel) if there is none
    pub fn first<const D: usize>(&self, tria: &Triangulation<D>) -> Option<CellIndex> {
        tria.assert_populated();
        self.scan_from(tria, CellIndex::new(0, 0))
    }

    /// Cell following `position` in this order
    pub fn next<const D: usize>(
        &self,
        tria: &Triangulation<D>,
        position: CellIndex,
    ) -> Option<CellIndex> {
        tria.assert_populated();
        self.scan_from(tria, CellIndex::new(position.level, position.index + 1))
    }

    /// First accepted cell at or after `start`
    fn scan_from<const D: usize>(
        &self,
        tria: &Triangulation<D>,
        start: CellIndex,
    ) -> Option<CellIndex> {
        let mut index = start.index;
        for level in start.level..tria.levels.len() {
            let n_slots = tria.levels[level].cells.len();
            while index < n_slots {
                let candidate = CellIndex::new(level, index);
                if self.accepts(tria, candidate) {
                    return Some(candidate);
                }
                index += 1;
            }
            index = 0;
        }
        None
    }
}

// ----------------------------------------------------------------------------------------------------
// Plain traversal
// ----------------------------------------------------------------------------------------------------

/// Iterator over the cells of a triangulation in a given [Traversal] order
#[derive(Clone)]
pub struct Cells<'a, const D: usize> {
    tria: &'a Triangulation<D>,
    order: Traversal,
    position: Option<CellIndex>,
    level: Option<usize>,
}

impl<'a, const D: usize> Iterator for Cells<'a, D> {
    type Item = CellRef<'a, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.position?;
        if let Some(level) = self.level {
            if current.level != level {
                self.position = None;
                return None;
            }
        }
        self.position = self.order.next(self.tria, current);
        Some(CellRef::new(self.tria, current))
    }
}

impl<const D: usize> Triangulation<D> {
    fn traversal(&self, order: Traversal, level: Option<usize>) -> Cells<'_, D> {
        self.assert_populated();
        let position = match level {
            Some(l) => order.scan_from(self, CellIndex::new(l, 0)),
            None => order.first(self),
        };
        Cells {
            tria: self,
            order,
            position,
            level,
        }
    }

    /// Iterate over all cells (including refined ones) level by level
    pub fn cells(&self) -> Cells<'_, D> {
        self.traversal(Traversal::All, None)
    }

    /// Iterate over the active (leaf) cells in active-index order
    pub fn active_cells(&self) -> Cells<'_, D> {
        self.traversal(Traversal::Active, None)
    }

    /// Iterate over the cells on one level
    pub fn cells_on_level(&self, level: usize) -> Cells<'_, D> {
        self.traversal(Traversal::All, Some(level))
    }

    /// Iterate over the active cells on one level
    pub fn active_cells_on_level(&self, level: usize) -> Cells<'_, D> {
        self.traversal(Traversal::Active, Some(level))
    }

    /// First active cell, `None` if there is none
    pub fn begin_active(&self) -> Option<CellIndex> {
        Traversal::Active.first(self)
    }

    /// Active cell following `cell`
    pub fn next_active(&self, cell: CellIndex) -> Option<CellIndex> {
        Traversal::Active.next(self, cell)
    }

    /// Iterate over every active face exactly once
    ///
    /// Interior faces between two active cells on the same level are reported by the cell with the lower index.
    /// Hanging faces are reported by the finer cell; the coarse face they refine is not active.
    pub fn active_faces(&self) -> impl Iterator<Item = FaceRef<'_, D>> + '_ {
        self.active_cells().flat_map(move |cell| {
            cell.faces().filter(move |face| match cell.face_state(face.face_no()) {
                FaceState::Boundary(_) => true,
                FaceState::Neighbor(other) => {
                    let neighbor = self.cell_unchecked(other);
                    if other.level < cell.level() {
                        true
                    } else {
                        neighbor.is_active() && cell.index() < other
                    }
                }
            })
        })
    }

    /// Iterate over the boundary faces of the active cells
    pub fn active_boundary_faces(&self) -> impl Iterator<Item = FaceRef<'_, D>> + '_ {
        self.active_cells()
            .flat_map(|cell| cell.faces().filter(|face| face.at_boundary()))
    }
}

// ----------------------------------------------------------------------------------------------------
// Filtered traversal
// ----------------------------------------------------------------------------------------------------

/// A condition on cells used to filter traversals
pub trait CellPredicate<const D: usize> {
    fn matches(&self, cell: &CellRef<'_, D>) -> bool;
}

impl<const D: usize, F> CellPredicate<D> for F
where
    F: Fn(&CellRef<'_, D>) -> bool,
{
    fn matches(&self, cell: &CellRef<'_, D>) -> bool {
        self(cell)
    }
}

/// First cell at or after `start` (in `order`) satisfying `predicate`
pub fn first_matching<const D: usize, P: CellPredicate<D>>(
    tria: &Triangulation<D>,
    order: Traversal,
    start: Option<CellIndex>,
    predicate: &P,
) -> Option<CellIndex> {
    let mut position = start;
    while let Some(current) = position {
        if order.accepts(tria, current) && predicate.matches(&CellRef::new(tria, current)) {
            return Some(current);
        }
        position = order.next(tria, current);
    }
    None
}

/// First cell strictly after `after` (in `order`) satisfying `predicate`
pub fn next_matching<const D: usize, P: CellPredicate<D>>(
    tria: &Triangulation<D>,
    order: Traversal,
    after: CellIndex,
    predicate: &P,
) -> Option<CellIndex> {
    first_matching(tria, order, order.next(tria, after), predicate)
}

/// Lazy predicate-filtered traversal
///
/// The only state is the current position (`None` once the end is reached), so a filtered traversal can be
/// restarted from any cell it yielded earlier with [FilteredIterator::starting_at] and will reproduce the same
/// remaining sequence.
#[derive(Clone)]
pub struct FilteredIterator<'a, const D: usize, P> {
    tria: &'a Triangulation<D>,
    order: Traversal,
    predicate: P,
    position: Option<CellIndex>,
}

impl<'a, const D: usize, P: CellPredicate<D>> FilteredIterator<'a, D, P> {
    /// Positioned at the first matching cell
    pub fn new(tria: &'a Triangulation<D>, order: Traversal, predicate: P) -> Self {
        let position = first_matching(tria, order, order.first(tria), &predicate);
        Self {
            tria,
            order,
            predicate,
            position,
        }
    }

    /// Positioned at the first matching cell at or after `start`
    pub fn starting_at(
        tria: &'a Triangulation<D>,
        order: Traversal,
        start: CellIndex,
        predicate: P,
    ) -> Self {
        tria.assert_populated();
        let position = first_matching(tria, order, Some(start), &predicate);
        Self {
            tria,
            order,
            predicate,
            position,
        }
    }

    /// Current position, `None` at the end
    pub fn position(&self) -> Option<CellIndex> {
        self.position
    }

    /// Move to the next matching cell
    pub fn advance(&mut self) {
        if let Some(current) = self.position {
            self.position = next_matching(self.tria, self.order, current, &self.predicate);
        }
    }
}

impl<'a, const D: usize, P: CellPredicate<D>> Iterator for FilteredIterator<'a, D, P> {
    type Item = CellRef<'a, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.position?;
        self.advance();
        Some(CellRef::new(self.tria, current))
    }
}

/// Common predicates
pub mod filters {
    use super::*;

    #[derive(Clone, Copy, Debug)]
    pub struct SubdomainEqualTo(pub SubdomainId);

    impl<const D: usize> CellPredicate<D> for SubdomainEqualTo {
        fn matches(&self, cell: &CellRef<'_, D>) -> bool {
            cell.subdomain_id() == self.0
        }
    }

    #[derive(Clone, Copy, Debug)]
    pub struct LevelEqualTo(pub usize);

    impl<const D: usize> CellPredicate<D> for LevelEqualTo {
        fn matches(&self, cell: &CellRef<'_, D>) -> bool {
            cell.level() == self.0
        }
    }

    #[derive(Clone, Copy, Debug)]
    pub struct Active;

    impl<const D: usize> CellPredicate<D> for Active {
        fn matches(&self, cell: &CellRef<'_, D>) -> bool {
            cell.is_active()
        }
    }

    /// Cells with at least one face on the boundary
    #[derive(Clone, Copy, Debug)]
    pub struct AtBoundary;

    impl<const D: usize> CellPredicate<D> for AtBoundary {
        fn matches(&self, cell: &CellRef<'_, D>) -> bool {
            cell.touches_boundary()
        }
    }

    #[derive(Clone, Copy, Debug)]
    pub struct RefineFlagSet;

    impl<const D: usize> CellPredicate<D> for RefineFlagSet {
        fn matches(&self, cell: &CellRef<'_, D>) -> bool {
            cell.refine_flag_set()
        }
    }

    #[derive(Clone, Copy, Debug)]
    pub struct CoarsenFlagSet;

    impl<const D: usize> CellPredicate<D> for CoarsenFlagSet {
        fn matches(&self, cell: &CellRef<'_, D>) -> bool {
            cell.coarsen_flag_set()
        }
    }
}
