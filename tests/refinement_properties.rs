use fem_tria::{grid_generator, CellIndex, Triangulation};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn global_refinement_of_a_square(times in 0_i32..5) {
        let mut tria = Triangulation::<2>::new();
        grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
        tria.refine_global(times).unwrap();

        let n = 1_usize << times;
        prop_assert_eq!(tria.n_active_cells(), n * n);
        prop_assert_eq!(tria.n_vertices(), (n + 1) * (n + 1));
        prop_assert_eq!(tria.n_levels(), times as usize + 1);
    }

    #[test]
    fn global_refinement_of_a_cube(times in 0_i32..3) {
        let mut tria = Triangulation::<3>::new();
        grid_generator::hyper_cube(&mut tria, -1.0, 1.0, false).unwrap();
        tria.refine_global(times).unwrap();

        prop_assert_eq!(tria.n_active_cells(), 8_usize.pow(times as u32));
    }

    #[test]
    fn children_contain_parent_vertices(first in 0_usize..4, second in 0_usize..4) {
        let mut tria = Triangulation::<2>::new();
        grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
        tria.refine_global(1).unwrap();
        tria.set_refine_flag(CellIndex::new(1, first)).unwrap();
        tria.set_refine_flag(CellIndex::new(1, second)).unwrap();
        tria.execute_refinement().unwrap();

        for cell in tria.cells().filter(|cell| cell.has_children()) {
            prop_assert_eq!(cell.n_children(), 4);
            let child_vertices: Vec<usize> = cell
                .children()
                .flat_map(|child| child.vertex_indices().to_vec())
                .collect();
            for v in cell.vertex_indices() {
                prop_assert!(child_vertices.contains(v));
            }
        }
        for cell in tria.active_cells() {
            prop_assert!(!cell.has_children());
        }
    }
}

#[test]
#[should_panic]
fn traversal_after_clear_panics() {
    let mut tria = Triangulation::<2>::new();
    grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
    tria.clear();
    let _ = tria.active_cells().count();
}

#[test]
#[should_panic]
fn flagging_after_clear_panics() {
    let mut tria = Triangulation::<2>::new();
    grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
    tria.clear();
    let _ = tria.set_refine_flag(CellIndex::new(0, 0));
}
