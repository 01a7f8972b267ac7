#[cfg(test)]
mod tests {
    use crate::Mesh::PolyMesh::{BlockMeshSpec, PolyMesh};
    use crate::Particles::mc_particle::McParticle;
    use crate::Statistics::moments::MomentAccumulator;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn mesh() -> PolyMesh {
        let spec = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(2.0, 1.0, 1.0), [2, 1, 1]);
        PolyMesh::block(&spec).unwrap()
    }

    fn particle(mesh: &PolyMesh, cell: usize, m: f64, u: Vector3<f64>, phi: f64) -> McParticle {
        let mut p = McParticle::new(mesh, mesh.cell_centre(cell), cell, 0, m, u, vec![phi], Vector3::zeros(), 0);
        p.rho = 2.0;
        p
    }

    #[test]
    fn test_instantaneous_moments() {
        let mesh = mesh();
        let mut acc = MomentAccumulator::new(mesh.cell_volumes().to_vec(), 1);
        let particles = vec![
            particle(&mesh, 0, 1.0, Vector3::new(1.0, 0.0, 0.0), 0.0),
            particle(&mesh, 0, 1.0, Vector3::new(3.0, 2.0, 0.0), 1.0),
        ];
        acc.update_cloud_pdf(&particles, 0.0);
        assert_relative_eq!(acc.rho(0), 2.0);
        let u = acc.u(0);
        assert_relative_eq!(u.x, 2.0);
        assert_relative_eq!(u.y, 1.0);
        let tau = acc.tau(0);
        assert_relative_eq!(tau[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(tau[(1, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(tau[(0, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(acc.k(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(acc.phi(0, 0), 0.5);
        assert_relative_eq!(acc.phi_variance(0, 0), 0.25, epsilon = 1e-12);
        assert_relative_eq!(acc.pnd(0), 2.0);
        assert_eq!(acc.averaged()[0].n_particles, 2);
        assert!(!acc.has_statistics(1));
    }

    #[test]
    fn test_existence_weight_blending() {
        let mesh = mesh();
        let mut acc = MomentAccumulator::new(mesh.cell_volumes().to_vec(), 1);
        let first = vec![particle(&mesh, 0, 1.0, Vector3::zeros(), 0.0)];
        acc.update_cloud_pdf(&first, 0.0);
        let second = vec![particle(&mesh, 0, 3.0, Vector3::zeros(), 0.0)];
        acc.update_cloud_pdf(&second, 0.8);
        // 0.8 * 1 + 0.2 * 3
        assert_relative_eq!(acc.averaged()[0].mass, 1.4, epsilon = 1e-12);
        assert_relative_eq!(acc.instantaneous()[0].mass, 3.0);
        assert_relative_eq!(acc.pnd_instantaneous(0), 3.0);
    }

    #[test]
    fn test_unit_existence_weight_keeps_previous_moments() {
        let mesh = mesh();
        let mut acc = MomentAccumulator::new(mesh.cell_volumes().to_vec(), 1);
        let first = vec![
            particle(&mesh, 0, 1.0, Vector3::new(1.0, 0.0, 0.0), 0.2),
            particle(&mesh, 1, 2.0, Vector3::new(0.0, -1.0, 0.5), 0.7),
        ];
        acc.update_cloud_pdf(&first, 0.0);
        let previous = acc.averaged().to_vec();
        let second = vec![
            particle(&mesh, 0, 4.0, Vector3::new(-2.0, 3.0, 0.0), 0.9),
            particle(&mesh, 1, 0.5, Vector3::new(5.0, 0.0, 1.0), 0.1),
        ];
        acc.update_cloud_pdf(&second, 1.0);
        for (after, before) in acc.averaged().iter().zip(previous.iter()) {
            assert_relative_eq!(after.mass, before.mass);
            assert_relative_eq!(after.volume, before.volume);
            assert_relative_eq!(after.momentum, before.momentum);
            assert_relative_eq!(after.uu, before.uu);
            assert_relative_eq!(after.phi[0], before.phi[0]);
            assert_relative_eq!(after.phi_phi[0], before.phi_phi[0]);
        }
        assert_relative_eq!(acc.instantaneous()[0].mass, 4.0);
    }

    #[test]
    fn test_empty_cells_keep_old_moments() {
        let mesh = mesh();
        let mut acc = MomentAccumulator::new(mesh.cell_volumes().to_vec(), 1);
        let particles = vec![
            particle(&mesh, 0, 1.0, Vector3::new(1.0, 0.0, 0.0), 0.2),
            particle(&mesh, 1, 2.0, Vector3::new(0.0, 1.0, 0.0), 0.4),
        ];
        acc.update_cloud_pdf(&particles, 0.5);
        let before = acc.averaged()[1].clone();
        acc.update_cloud_pdf(&particles[..1], 0.5);
        let after = &acc.averaged()[1];
        assert_eq!(after.n_particles, 0);
        assert_relative_eq!(after.mass, before.mass);
        assert_relative_eq!(after.momentum.y, before.momentum.y);
        assert_relative_eq!(after.phi[0], before.phi[0]);
    }

    #[test]
    fn test_ghosts_are_excluded() {
        let mesh = mesh();
        let mut acc = MomentAccumulator::new(mesh.cell_volumes().to_vec(), 1);
        let mut ghost = particle(&mesh, 1, 5.0, Vector3::zeros(), 1.0);
        ghost.ghost = 1;
        let particles = vec![particle(&mesh, 0, 1.0, Vector3::zeros(), 0.0), ghost];
        acc.update_cloud_pdf(&particles, 0.0);
        assert_eq!(acc.averaged()[1].n_particles, 0);
        assert_relative_eq!(acc.averaged()[1].mass, 0.0);
        assert_relative_eq!(acc.rho(1), 0.0);
    }
}
