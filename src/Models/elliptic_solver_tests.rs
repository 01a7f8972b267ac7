#[cfg(test)]
mod tests {
    use crate::Mesh::PolyMesh::{BlockMeshSpec, PatchKind, PolyMesh};
    use crate::Models::elliptic_solver::{EllipticSolver, PcgPoissonSolver, PoissonProblem, SolverError};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const NX: usize = 50;

    fn channel_mesh() -> PolyMesh {
        PolyMesh::block(&BlockMeshSpec::channel(Vector3::new(1.0, 0.1, 0.1), [NX, 1, 1], true)).unwrap()
    }

    fn open_patches(mesh: &PolyMesh) -> Vec<bool> {
        mesh.patches()
            .iter()
            .map(|p| matches!(p.kind, PatchKind::Inlet | PatchKind::Outlet))
            .collect()
    }

    #[test]
    fn test_one_dimensional_dirichlet_problem() {
        // phi'' = -2, phi(0) = phi(1) = 0 has the solution x (1 - x); the two-point scheme with
        // half-cell boundary distances reproduces it up to the constant dx^2 / 4
        let mesh = channel_mesh();
        let source = vec![-2.0; mesh.n_cells()];
        let fixed = open_patches(&mesh);
        let problem = PoissonProblem {
            mesh: &mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference: None,
        };
        let mut solver = PcgPoissonSolver::new(1e-12, 1000);
        let phi = solver.solve(&problem).unwrap();
        let dx = 1.0 / NX as f64;
        for cell in 0..mesh.n_cells() {
            let x = mesh.cell_centre(cell).x;
            assert_relative_eq!(phi[cell], x * (1.0 - x) + 0.25 * dx * dx, epsilon = 1e-8);
        }
        assert!(solver.last_iterations > 0);
        assert!(solver.last_residual < 1e-12);
    }

    #[test]
    fn test_zero_source_gives_zero_solution() {
        let mesh = channel_mesh();
        let source = vec![0.0; mesh.n_cells()];
        let fixed = open_patches(&mesh);
        let problem = PoissonProblem {
            mesh: &mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference: None,
        };
        let phi = PcgPoissonSolver::new(1e-10, 10).solve(&problem).unwrap();
        assert!(phi.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reference_cell_fixes_neumann_level() {
        let mesh = PolyMesh::block(&BlockMeshSpec::closed_box(
            Vector3::zeros(),
            Vector3::new(4.0, 1.0, 1.0),
            [4, 1, 1],
        ))
        .unwrap();
        // zero-mean source, compatible with pure Neumann conditions
        let source = vec![1.0, 0.0, 0.0, -1.0];
        let fixed = vec![false; mesh.patches().len()];
        let problem = PoissonProblem {
            mesh: &mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference: Some((0, 0.0)),
        };
        let phi = PcgPoissonSolver::new(1e-12, 100).solve(&problem).unwrap();
        assert_relative_eq!(phi[0], 0.0, epsilon = 1e-9);
        // flux balance of cell 0: (phi1 - phi0) = s0 * V0
        assert_relative_eq!(phi[1] - phi[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(phi[2] - phi[1], 1.0, epsilon = 1e-8);
        assert_relative_eq!(phi[3] - phi[2], 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_singular_system_is_rejected() {
        let mesh = PolyMesh::block(&BlockMeshSpec::closed_box(
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 1.0),
            [2, 2, 2],
        ))
        .unwrap();
        let source = vec![1.0; mesh.n_cells()];
        let fixed = vec![false; mesh.patches().len()];
        let problem = PoissonProblem {
            mesh: &mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference: None,
        };
        let result = PcgPoissonSolver::new(1e-10, 100).solve(&problem);
        assert!(matches!(result, Err(SolverError::Singular(_))));
    }

    #[test]
    fn test_source_size_mismatch() {
        let mesh = channel_mesh();
        let source = vec![1.0; 3];
        let fixed = open_patches(&mesh);
        let problem = PoissonProblem {
            mesh: &mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference: None,
        };
        let result = PcgPoissonSolver::new(1e-10, 100).solve(&problem);
        assert!(matches!(
            result,
            Err(SolverError::SizeMismatch { expected: NX, got: 3 })
        ));
    }

    #[test]
    fn test_not_converged_is_reported() {
        let mesh = channel_mesh();
        let source: Vec<f64> = (0..mesh.n_cells()).map(|c| (c as f64).sin()).collect();
        let fixed = open_patches(&mesh);
        let problem = PoissonProblem {
            mesh: &mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference: None,
        };
        let mut solver = PcgPoissonSolver::new(1e-14, 1);
        match solver.solve(&problem) {
            Err(SolverError::NotConverged { iterations, residual, .. }) => {
                assert_eq!(iterations, 1);
                assert!(residual > 1e-14);
            }
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }
}
