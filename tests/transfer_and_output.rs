use fem_tria::triangulation::iteration::filters::SubdomainEqualTo;
use fem_tria::{
    grid_generator, DataOut, DataVectorType, DofHandler, DofLayout, GridTransfer, Point,
    Triangulation,
};

fn linear(point: &Point<2>) -> f64 {
    1.0 + 2.0 * point.x - 3.0 * point.y
}

#[test]
fn non_nested_vertex_transfer_reproduces_linear_functions() {
    let mut coarse = Triangulation::<2>::new();
    grid_generator::subdivided_hyper_rectangle(
        &mut coarse,
        [3, 3],
        Point::from([0.0, 0.0]),
        Point::from([1.0, 1.0]),
        false,
    )
    .unwrap();

    let mut fine = Triangulation::<2>::new();
    grid_generator::subdivided_hyper_rectangle(
        &mut fine,
        [4, 5],
        Point::from([0.0, 0.0]),
        Point::from([1.0, 1.0]),
        false,
    )
    .unwrap();
    fine.refine_global(1).unwrap();

    let mut coarse_dofs = DofHandler::new(&coarse);
    coarse_dofs
        .distribute_dofs(DofLayout::PerVertex { components: 1 })
        .unwrap();
    let mut fine_dofs = DofHandler::new(&fine);
    fine_dofs
        .distribute_dofs(DofLayout::PerVertex { components: 1 })
        .unwrap();

    let mut coarse_values = vec![0.0; coarse_dofs.n_dofs()];
    for (vertex, point) in coarse.vertices() {
        coarse_values[coarse_dofs.vertex_dof(vertex, 0).unwrap()] = linear(point);
    }

    let transfer = GridTransfer::new(&fine, &coarse).unwrap();
    let fine_values = transfer
        .prolongate_vertex_values(&fine_dofs, &coarse_dofs, &coarse_values)
        .unwrap();

    for (vertex, point) in fine.vertices() {
        let dof = fine_dofs.vertex_dof(vertex, 0).unwrap();
        assert!(
            (fine_values[dof] - linear(point)).abs() < 1e-10,
            "wrong value at {:?}",
            point
        );
    }

    // every fine cell is associated with exactly one coarse cell
    let associated: usize = (0..coarse.n_active_cells())
        .map(|c| transfer.fine_cells_of(c).len())
        .sum();
    assert_eq!(associated, fine.n_active_cells());
}

#[test]
fn non_nested_cell_transfer_keeps_constants() {
    let mut coarse = Triangulation::<2>::new();
    grid_generator::hyper_l(&mut coarse, -1.0, 1.0).unwrap();
    coarse.refine_global(1).unwrap();

    let mut fine = Triangulation::<2>::new();
    grid_generator::hyper_l(&mut fine, -1.0, 1.0).unwrap();
    fine.refine_global(3).unwrap();

    let transfer = GridTransfer::new(&fine, &coarse).unwrap();
    let restricted = transfer
        .restrict_cell_values(&vec![2.5; fine.n_active_cells()])
        .unwrap();
    assert!(restricted.iter().all(|v| (v - 2.5).abs() < 1e-14));

    let prolongated = transfer
        .prolongate_cell_values(&vec![-1.0; coarse.n_active_cells()])
        .unwrap();
    assert_eq!(prolongated.len(), fine.n_active_cells());
}

#[test]
fn patches_of_a_subdomain() {
    let mut tria = Triangulation::<2>::new();
    grid_generator::hyper_cube(&mut tria, 0.0, 1.0, false).unwrap();
    tria.refine_global(2).unwrap();

    let skipped: Vec<_> = tria
        .active_cells()
        .filter(|cell| cell.center().x < 0.5)
        .map(|cell| cell.index())
        .collect();
    for cell in skipped.iter() {
        tria.set_subdomain_id(*cell, 3).unwrap();
    }

    let cell_values: Vec<f64> = (0..tria.n_active_cells()).map(|c| c as f64).collect();
    let mut data_out = DataOut::new();
    data_out.attach_triangulation(&tria);
    data_out.set_cell_filter(SubdomainEqualTo(0));
    data_out
        .add_data_vector(cell_values, "active_index", DataVectorType::CellData)
        .unwrap();

    let patches = data_out.build_patches().unwrap();
    assert_eq!(patches.len(), 8);
    for patch in patches {
        assert_eq!(patch.data[0][0], patch.active_index as f64);
        assert!(!skipped.contains(&patch.cell));
    }
    assert!(patches.windows(2).all(|w| w[0].active_index < w[1].active_index));
}
