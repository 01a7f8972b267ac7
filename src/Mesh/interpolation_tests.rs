#[cfg(test)]
mod tests {
    use crate::Mesh::PolyMesh::{BlockMeshSpec, PolyMesh};
    use crate::Mesh::interpolation::{CellPointFaceInterpolation, GradInterpolationConstantTet};
    use crate::Mesh::tet_decomposition::TetFacePointCellDecomposition;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (PolyMesh, TetFacePointCellDecomposition) {
        let spec = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0), [3, 3, 3]);
        let mesh = PolyMesh::block(&spec).unwrap();
        let decomposition = TetFacePointCellDecomposition::new(&mesh).unwrap();
        (mesh, decomposition)
    }

    #[test]
    fn test_uniform_field_is_reproduced() {
        let (mesh, decomposition) = setup();
        let interp = CellPointFaceInterpolation::new(&mesh, vec![2.5; mesh.n_cells()]);
        let mut rng = StdRng::seed_from_u64(1);
        for cell in 0..mesh.n_cells() {
            let (p, tet) = decomposition.random_point_in_cell(cell, &mut rng);
            assert_relative_eq!(interp.interpolate(&decomposition, &p, tet), 2.5, epsilon = 1e-12);
        }
        let vector_field = vec![Vector3::new(1.0, -2.0, 0.5); mesh.n_cells()];
        let interp = CellPointFaceInterpolation::new(&mesh, vector_field);
        let (p, tet) = decomposition.random_point_in_cell(13, &mut rng);
        let v = interp.interpolate(&decomposition, &p, tet);
        assert_relative_eq!(v.y, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cell_centre_returns_cell_value() {
        let (mesh, decomposition) = setup();
        let values: Vec<f64> = (0..mesh.n_cells()).map(|c| c as f64).collect();
        let interp = CellPointFaceInterpolation::new(&mesh, values);
        for cell in 0..mesh.n_cells() {
            let centre = mesh.cell_centre(cell);
            let tet = decomposition.find_tet(cell, &centre).unwrap();
            assert_relative_eq!(
                interp.interpolate(&decomposition, &centre, tet),
                cell as f64,
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_linear_field_in_interior_cell() {
        let (mesh, decomposition) = setup();
        let values: Vec<f64> = mesh.cell_centres().iter().map(|c| 3.0 * c.x - c.z).collect();
        let interp = CellPointFaceInterpolation::new(&mesh, values.clone());
        // the central cell has all face and point values reconstructed from a linear field
        let cell = 13;
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            let (p, tet) = decomposition.random_point_in_cell(cell, &mut rng);
            assert_relative_eq!(interp.interpolate(&decomposition, &p, tet), 3.0 * p.x - p.z, epsilon = 1e-10);
        }
        let grad = GradInterpolationConstantTet::new(&mesh, values);
        for &tet in &decomposition.cell_tetrahedra()[cell] {
            let g = grad.interpolate(&decomposition, tet);
            assert_relative_eq!(g.x, 3.0, epsilon = 1e-10);
            assert_relative_eq!(g.y, 0.0, epsilon = 1e-10);
            assert_relative_eq!(g.z, -1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_boundary_faces_take_owner_value() {
        let (mesh, _) = setup();
        let values: Vec<f64> = (0..mesh.n_cells()).map(|c| c as f64 * 0.5).collect();
        let interp = CellPointFaceInterpolation::new(&mesh, values);
        for face in mesh.n_internal_faces()..mesh.n_faces() {
            assert_relative_eq!(interp.face_value(face), mesh.face_owner(face) as f64 * 0.5);
        }
    }
}
