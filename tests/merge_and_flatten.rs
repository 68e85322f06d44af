use fem_tria::{
    flatten_triangulation, grid_generator, merge_triangulations, CellIndex, MergeOptions, Point,
    Triangulation,
};
use std::collections::{BTreeMap, BTreeSet};

type CenterKey = [i64; 2];

fn center_key(point: &Point<2>) -> CenterKey {
    [
        (point.x * 1e6).round() as i64,
        (point.y * 1e6).round() as i64,
    ]
}

/// active cells (by center) mapped to the centers of their neighbors
fn adjacency(tria: &Triangulation<2>) -> BTreeMap<CenterKey, BTreeSet<CenterKey>> {
    tria.active_cells()
        .map(|cell| {
            let neighbors = (0..cell.n_faces())
                .filter_map(|face| cell.neighbor_cell(face))
                .map(|neighbor| center_key(&neighbor.center()))
                .collect();
            (center_key(&cell.center()), neighbors)
        })
        .collect()
}

fn colorized_rectangle(p1: [f64; 2], p2: [f64; 2], id_offset: u32) -> Triangulation<2> {
    let mut tria = Triangulation::new();
    grid_generator::hyper_rectangle(&mut tria, Point::from(p1), Point::from(p2), true).unwrap();

    let boundary_faces: Vec<(CellIndex, usize, u32)> = tria
        .active_boundary_faces()
        .map(|face| {
            (
                face.cell().index(),
                face.face_no(),
                face.boundary_id().unwrap(),
            )
        })
        .collect();
    for (cell, face, id) in boundary_faces {
        tria.set_boundary_id(cell, face, id + id_offset).unwrap();
    }
    tria
}

fn strict_options() -> MergeOptions {
    MergeOptions {
        tolerance: 1e-6,
        copy_boundary_ids: true,
        force_distinct_boundaries: true,
    }
}

#[test]
fn merged_rectangles_share_an_interior_face() {
    let left = colorized_rectangle([-1.0, -1.0], [0.0, 1.0], 0);
    let right = colorized_rectangle([0.0, -1.0], [1.0, 1.0], 4);

    let mut merged = Triangulation::new();
    merge_triangulations(&left, &right, &mut merged, &strict_options()).unwrap();

    assert_eq!(merged.n_active_cells(), 2);
    assert_eq!(merged.n_vertices(), 6);
    assert_eq!(merged.active_boundary_faces().count(), 6);
    assert_eq!(merged.boundary_ids(), vec![0, 2, 3, 5, 6, 7]);

    let left_cell = merged.cell(CellIndex::new(0, 0)).unwrap();
    assert!(!left_cell.at_boundary(1));
    assert_eq!(left_cell.boundary_id(1), None);
    assert_eq!(left_cell.neighbor(1), Some(CellIndex::new(0, 1)));
    assert_eq!(left_cell.boundary_id(0), Some(0));

    let right_cell = merged.cell(CellIndex::new(0, 1)).unwrap();
    assert_eq!(right_cell.boundary_id(1), Some(5));
    assert_eq!(right_cell.boundary_id(3), Some(7));
}

#[test]
fn hanging_faces_stay_boundary_faces_after_merge() {
    let left = colorized_rectangle([-1.0, -1.0], [0.0, 1.0], 0);
    let mut right = colorized_rectangle([0.0, -1.0], [1.0, 1.0], 4);
    right.refine_global(1).unwrap();

    let mut flat_right = Triangulation::new();
    flatten_triangulation(&right, &mut flat_right).unwrap();
    assert_eq!(flat_right.n_levels(), 1);
    assert_eq!(flat_right.n_active_cells(), 4);

    let mut merged = Triangulation::new();
    merge_triangulations(&left, &flat_right, &mut merged, &strict_options()).unwrap();

    assert_eq!(merged.n_active_cells(), 5);
    assert_eq!(merged.n_vertices(), 11);
    // the coarse face and the two fine faces at x = 0 are all boundary faces
    assert_eq!(merged.active_boundary_faces().count(), 4 + 8);
    assert_eq!(merged.boundary_ids(), vec![0, 1, 2, 3, 4, 5, 6, 7]);

    let left_cell = merged.cell(CellIndex::new(0, 0)).unwrap();
    assert!(left_cell.at_boundary(1));
    assert_eq!(left_cell.boundary_id(1), Some(1));

    let interior_faces = merged
        .active_cells()
        .flat_map(|cell| (0..cell.n_faces()).filter(move |f| !cell.at_boundary(*f)))
        .count();
    // the 2x2 block has 4 shared faces, each seen from both sides
    assert_eq!(interior_faces, 8);
}

#[test]
fn flatten_round_trip_is_isomorphic() {
    let mut source = Triangulation::<2>::new();
    grid_generator::subdivided_hyper_rectangle(
        &mut source,
        [2, 1],
        Point::from([0.0, 0.0]),
        Point::from([2.0, 1.0]),
        true,
    )
    .unwrap();
    source.refine_global(2).unwrap();

    let mut flat = Triangulation::new();
    flatten_triangulation(&source, &mut flat).unwrap();
    assert_eq!(flat.n_active_cells(), source.n_active_cells());
    assert_eq!(flat.n_vertices(), source.n_vertices());
    assert_eq!(adjacency(&flat), adjacency(&source));
    assert_eq!(flat.boundary_ids(), source.boundary_ids());

    source.refine_global(1).unwrap();
    flat.refine_global(1).unwrap();
    assert_eq!(flat.n_active_cells(), 2 * 64);
    assert_eq!(flat.n_active_cells(), source.n_active_cells());
    assert_eq!(adjacency(&flat), adjacency(&source));
}

#[test]
fn flatten_then_local_refinement_matches() {
    let mut source = Triangulation::<2>::new();
    grid_generator::hyper_cube(&mut source, 0.0, 1.0, false).unwrap();
    source.refine_global(1).unwrap();

    let mut flat = Triangulation::new();
    flatten_triangulation(&source, &mut flat).unwrap();

    // the same flag on both: the cell at the origin
    let origin_cell = |tria: &Triangulation<2>| {
        tria.active_cells()
            .find(|cell| center_key(&cell.center()) == center_key(&Point::from([0.25, 0.25])))
            .map(|cell| cell.index())
            .unwrap()
    };
    let in_source = origin_cell(&source);
    let in_flat = origin_cell(&flat);
    source.set_refine_flag(in_source).unwrap();
    flat.set_refine_flag(in_flat).unwrap();
    source.execute_refinement().unwrap();
    flat.execute_refinement().unwrap();

    assert_eq!(flat.n_active_cells(), 7);
    assert_eq!(flat.n_vertices(), source.n_vertices());

    let active_centers = |tria: &Triangulation<2>| -> BTreeSet<CenterKey> {
        tria.active_cells().map(|c| center_key(&c.center())).collect()
    };
    assert_eq!(active_centers(&flat), active_centers(&source));
}
