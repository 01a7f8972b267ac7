#[cfg(test)]
mod tests {
    use crate::Cloud::McParticleCloud::{McError, McParticleCloud};
    use crate::Cloud::config::{
        AxisymmetricConfig, BoundaryConfig, McSolution, MixingModelConfig, PositionCorrectionConfig,
        VelocityModelConfig,
    };
    use crate::Cloud::transport::{ExchangeRound, ParticleTransfer, ParticleTransport, TransportError};
    use crate::Mesh::PolyMesh::{BlockMeshSpec, PatchKind, PolyMesh};
    use crate::Models::elliptic_solver::{PcgPoissonSolver, SolverError};
    use crate::Models::flow_fields::CellFlowFields;
    use crate::Models::model_api::ModelError;
    use crate::Particles::mc_particle::McParticle;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fields(mesh: &PolyMesh, u: Vector3<f64>, k: f64, density: f64, scalars: &[f64]) -> Box<CellFlowFields> {
        Box::new(CellFlowFields::uniform(mesh.n_cells(), u, 0.0, k, 0.1, density, scalars))
    }

    fn closed_box(divisions: [usize; 3]) -> PolyMesh {
        PolyMesh::block(&BlockMeshSpec::closed_box(
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 1.0),
            divisions,
        ))
        .unwrap()
    }

    /// deterministic transport: frozen velocities, no correction, no mixing
    fn frozen_solution(delta_t: f64, npc: usize) -> McSolution {
        McSolution {
            delta_t,
            particles_per_cell: npc,
            velocity_model: VelocityModelConfig::Frozen,
            mixing_model: MixingModelConfig::NoMixing,
            position_correction: PositionCorrectionConfig::NoCorrection,
            ..McSolution::default()
        }
    }

    fn single_particle(cloud: &McParticleCloud, position: Vector3<f64>, velocity: Vector3<f64>) -> McParticle {
        let mesh = cloud.mesh();
        let (cell, tet) = (0..mesh.n_cells())
            .find_map(|c| cloud.decomposition().find_tet(c, &position).map(|t| (c, t)))
            .unwrap();
        let mut p = McParticle::new(mesh, position, cell, tet, 1.0, velocity, vec![], Vector3::zeros(), 0);
        p.rho = 1.0;
        cloud.compute_courant_no(&mut p);
        p
    }

    #[test]
    fn test_release_reproduces_density() {
        let mesh = closed_box([2, 1, 1]);
        let f = fields(&mesh, Vector3::new(0.5, 0.0, 0.0), 0.3, 1.2, &[]);
        let mut cloud = McParticleCloud::new(mesh, McSolution::default(), f).unwrap();
        cloud.init_release_particles();
        assert_eq!(cloud.particles().len(), 40);
        assert_relative_eq!(cloud.total_mass(), 1.2, epsilon = 1e-12);
        for c in 0..2 {
            assert_relative_eq!(cloud.rho_cpdf()[c], 1.2, epsilon = 1e-12);
            assert_relative_eq!(cloud.pnd_cpdf()[c], 1.2, epsilon = 1e-12);
            assert_relative_eq!(cloud.rho_cpdf_inst()[c], 1.2, epsilon = 1e-12);
        }
        let tau = cloud.tau_cpdf();
        let k = cloud.k_cpdf();
        for c in 0..2 {
            assert_relative_eq!(tau[c], tau[c].transpose(), epsilon = 1e-12);
            assert_relative_eq!(0.5 * tau[c].trace(), k[c], epsilon = 1e-12);
            assert!(k[c] > 0.0);
        }
        let ids: std::collections::HashSet<usize> = cloud.particles().iter().map(|p| p.orig_id).collect();
        assert_eq!(ids.len(), 40);
        assert!(cloud.assert_population_health().is_ok());
    }

    #[test]
    fn test_particle_gen_in_cell() {
        let mesh = closed_box([2, 2, 2]);
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[0.5]);
        let solution = McSolution {
            scalar_names: vec!["z".to_string()],
            ..McSolution::default()
        };
        let mut cloud = McParticleCloud::new(mesh, solution, f).unwrap();
        let range = cloud.particle_gen_in_cell(
            3,
            25,
            0.01,
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::zeros(),
            &[0.7],
            Vector3::zeros(),
            0,
        );
        assert_eq!(range, 0..25);
        for p in &cloud.particles()[range] {
            assert_eq!(p.cell, 3);
            assert_eq!(p.UParticle, Vector3::new(1.0, 2.0, 3.0));
            assert_eq!(p.Phi, vec![0.7]);
            assert!(cloud.decomposition().tet(p.tet).contains(&p.position, 1e-9));
        }
        assert!(cloud.assert_population_health().is_ok());
    }

    #[test]
    fn test_closed_box_conserves_mass() {
        let mesh = closed_box([2, 2, 2]);
        let f = fields(&mesh, Vector3::zeros(), 0.5, 1.0, &[0.3]);
        let solution = McSolution {
            delta_t: 0.05,
            scalar_names: vec!["z".to_string()],
            mixed_scalars: vec!["z".to_string()],
            conserved_scalars: vec!["z".to_string()],
            check_population_health: true,
            ..McSolution::default()
        };
        let mut cloud = McParticleCloud::new(mesh, solution, f).unwrap();
        cloud.init_release_particles();
        let mass0 = cloud.total_mass();
        for _ in 0..5 {
            let report = cloud.evolve().unwrap();
            assert_eq!(report.fluxes.mass_in, 0.0);
            assert_eq!(report.fluxes.mass_out, 0.0);
            assert_eq!(report.n_generated, 0);
            assert_eq!(report.n_lost, 0);
            assert_relative_eq!(report.total_mass, mass0, max_relative = 1e-10);
            assert_eq!(report.conserved_scalars.len(), 1);
            assert_relative_eq!(report.conserved_scalars[0].1, 0.3 * mass0, max_relative = 1e-9);
        }
        assert_eq!(cloud.step(), 5);
        assert!(cloud.cumulative_balance().imbalance().abs() < 1e-10);
        assert!(cloud.particles().iter().all(|p| !p.is_ghost()));
    }

    #[test]
    fn test_channel_inlet_admission_and_outflow() {
        let mesh = PolyMesh::block(&BlockMeshSpec::channel(Vector3::new(1.0, 0.5, 0.5), [4, 1, 1], false)).unwrap();
        let f = fields(&mesh, Vector3::new(1.0, 0.0, 0.0), 0.0, 1.0, &[]);
        let mut solution = frozen_solution(0.1, 40);
        solution.boundaries.insert(
            "xmin".to_string(),
            BoundaryConfig::InletOutlet {
                velocity: [1.0, 0.0, 0.0],
                density: 1.0,
                velocity_fluctuation: 0.0,
                omega: 0.0,
                scalars: vec![],
            },
        );
        let mut cloud = McParticleCloud::new(mesh, solution, f).unwrap();
        cloud.init_release_particles();
        let mass0 = cloud.total_mass();
        let report = cloud.evolve().unwrap();

        // inflow volume 1 * 0.25 * 0.1, cell volume 0.0625: 16 particles
        assert_eq!(report.n_generated, 16);
        assert_eq!(report.fluxes.n_in, 16);
        assert_relative_eq!(report.fluxes.mass_in, 0.025, epsilon = 1e-12);
        assert!(report.fluxes.n_out > 0);
        assert_relative_eq!(
            report.fluxes.mass_out,
            report.fluxes.n_out as f64 * 0.0625 / 40.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            report.total_mass - mass0,
            report.fluxes.mass_in - report.fluxes.mass_out,
            epsilon = 1e-12
        );
        assert!(report.balance.imbalance().abs() < 1e-12);

        // admitted ghosts are real particles and all of them are counted in the moments
        assert!(cloud.particles().iter().all(|p| !p.is_ghost()));
        let counted: usize = cloud.moments().instantaneous().iter().map(|s| s.n_particles).sum();
        assert_eq!(counted, cloud.particles().len());
        assert!(cloud.assert_population_health().is_ok());
    }

    #[test]
    fn test_inlet_requires_configuration() {
        let mesh = PolyMesh::block(&BlockMeshSpec::channel(Vector3::new(1.0, 0.5, 0.5), [2, 1, 1], true)).unwrap();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let result = McParticleCloud::new(mesh, McSolution::default(), f);
        assert!(matches!(result, Err(McError::MissingBoundary(name)) if name == "xmin"));
    }

    #[test]
    fn test_health_check_detects_ghosts_and_misplaced_particles() {
        let mesh = closed_box([1, 1, 1]);
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(0.1, 4), f).unwrap();
        cloud.init_release_particles();
        assert!(cloud.assert_population_health().is_ok());

        cloud.particles_mut()[0].ghost = 1;
        assert!(matches!(cloud.assert_population_health(), Err(McError::PopulationHealth(_))));
        cloud.particles_mut()[0].ghost = 0;

        cloud.particles_mut()[1].position = Vector3::new(5.0, 5.0, 5.0);
        assert!(matches!(cloud.assert_population_health(), Err(McError::PopulationHealth(_))));
    }

    #[test]
    fn test_left_over_ghosts_are_purged() {
        let mesh = closed_box([1, 1, 1]);
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(0.1, 4), f).unwrap();
        cloud.init_release_particles();
        let mut ghost = cloud.particles()[0].clone();
        ghost.ghost = 1;
        cloud.add_particle(ghost);
        let report = cloud.evolve().unwrap();
        assert_eq!(report.n_particles, 4);
        assert!(cloud.particles().iter().all(|p| !p.is_ghost()));
    }

    /// Plays the neighbouring sub-domain: sends every particle straight back through the same
    /// face with reversed velocity
    struct MirrorTransport {
        sent: Rc<RefCell<Vec<ParticleTransfer>>>,
        deliver_to: usize,
    }

    impl ParticleTransport for MirrorTransport {
        fn exchange(&mut self, outbound: Vec<ParticleTransfer>) -> Result<ExchangeRound, TransportError> {
            if outbound.is_empty() {
                return Ok(ExchangeRound {
                    inbound: Vec::new(),
                    complete: true,
                });
            }
            self.sent.borrow_mut().extend(outbound.iter().cloned());
            let inbound = outbound
                .into_iter()
                .map(|t| {
                    let mut particle = t.particle;
                    particle.UParticle = -particle.UParticle;
                    particle.Utracking = -particle.Utracking;
                    ParticleTransfer {
                        particle,
                        from_processor: t.to_processor,
                        to_processor: self.deliver_to,
                        patch_face: t.patch_face,
                    }
                })
                .collect();
            Ok(ExchangeRound {
                inbound,
                complete: false,
            })
        }
    }

    /// reports a finished round that still carries particles
    struct BrokenTransport;

    impl ParticleTransport for BrokenTransport {
        fn exchange(&mut self, outbound: Vec<ParticleTransfer>) -> Result<ExchangeRound, TransportError> {
            Ok(ExchangeRound {
                inbound: outbound,
                complete: true,
            })
        }
    }

    fn processor_box() -> PolyMesh {
        let spec = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(2.0, 1.0, 1.0), [2, 1, 1])
            .with_patch(1, PatchKind::Processor { neighbour_processor: 1 });
        PolyMesh::block(&spec).unwrap()
    }

    #[test]
    fn test_processor_handoff_resumes_tracking() {
        let mesh = processor_box();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let sent = Rc::new(RefCell::new(Vec::new()));
        let transport = MirrorTransport {
            sent: Rc::clone(&sent),
            deliver_to: 0,
        };
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(1.0, 1), f)
            .unwrap()
            .with_transport(Box::new(transport));
        let p = single_particle(&cloud, Vector3::new(1.5, 0.4, 0.6), Vector3::new(1.0, 0.0, 0.0));
        cloud.add_particle(p);
        let report = cloud.evolve().unwrap();

        let sent = sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_processor, 1);
        assert_eq!(sent[0].from_processor, 0);
        assert_eq!(sent[0].patch_face, 0);
        assert_relative_eq!(sent[0].particle.step_fraction, 0.5, epsilon = 1e-9);
        assert_relative_eq!(sent[0].particle.position.x, 2.0, epsilon = 1e-9);

        assert_eq!(report.n_particles, 1);
        let p = &cloud.particles()[0];
        assert_eq!(p.cell, 1);
        assert_relative_eq!(p.position.x, 1.5, epsilon = 1e-9);
        assert_relative_eq!(p.step_fraction, 1.0, epsilon = 1e-9);
        assert_relative_eq!(p.UParticle.x, -1.0);
    }

    #[test]
    fn test_serial_transport_rejects_processor_crossing() {
        let mesh = processor_box();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(1.0, 1), f).unwrap();
        let p = single_particle(&cloud, Vector3::new(1.5, 0.4, 0.6), Vector3::new(1.0, 0.0, 0.0));
        cloud.add_particle(p);
        let result = cloud.evolve();
        assert!(matches!(
            result,
            Err(McError::Transport(TransportError::NoNeighbour { processor: 1 }))
        ));
    }

    #[test]
    fn test_failed_exchange_restores_ensemble() {
        let mesh = processor_box();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(1.0, 1), f).unwrap();
        let p = single_particle(&cloud, Vector3::new(1.5, 0.4, 0.6), Vector3::new(1.0, 0.0, 0.0));
        cloud.add_particle(p);
        let before = cloud.particles().to_vec();
        for _ in 0..2 {
            assert!(matches!(cloud.evolve(), Err(McError::Transport(_))));
            assert_eq!(cloud.particles(), &before[..]);
            assert_eq!(cloud.step(), 0);
            assert_relative_eq!(cloud.total_mass(), 1.0);
        }
    }

    #[test]
    fn test_handoff_to_wrong_processor_fails() {
        let mesh = processor_box();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let transport = MirrorTransport {
            sent: Rc::new(RefCell::new(Vec::new())),
            deliver_to: 7,
        };
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(1.0, 1), f)
            .unwrap()
            .with_transport(Box::new(transport));
        let p = single_particle(&cloud, Vector3::new(1.5, 0.4, 0.6), Vector3::new(1.0, 0.0, 0.0));
        cloud.add_particle(p);
        assert!(matches!(cloud.evolve(), Err(McError::ProcessorHandoff(_))));
        assert_eq!(cloud.particles().len(), 1);
        assert!(matches!(cloud.evolve(), Err(McError::ProcessorHandoff(_))));
    }

    #[test]
    fn test_completed_round_with_particles_fails() {
        let mesh = processor_box();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut cloud = McParticleCloud::new(mesh, frozen_solution(1.0, 1), f)
            .unwrap()
            .with_transport(Box::new(BrokenTransport));
        let p = single_particle(&cloud, Vector3::new(1.5, 0.4, 0.6), Vector3::new(1.0, 0.0, 0.0));
        cloud.add_particle(p);
        assert!(matches!(cloud.evolve(), Err(McError::ProcessorHandoff(_))));
    }

    #[test]
    fn test_local_time_stepping_limits_courant_number() {
        let mesh = closed_box([1, 1, 1]);
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut solution = frozen_solution(1.0, 1);
        solution.local_time_stepping.enabled = true;
        solution.local_time_stepping.max_courant = 0.5;
        let mut cloud = McParticleCloud::new(mesh, solution, f).unwrap();
        let p = single_particle(&cloud, Vector3::new(0.2, 0.4, 0.6), Vector3::new(1.0, 0.0, 0.0));
        // unit cell: U / (2 * half width) = 1
        assert_relative_eq!(p.Co, 1.0, epsilon = 1e-12);
        cloud.add_particle(p);
        let report = cloud.evolve().unwrap();
        let p = &cloud.particles()[0];
        assert_relative_eq!(p.eta, 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.position.x, 0.7, epsilon = 1e-9);
        assert_relative_eq!(report.max_courant, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_axisymmetric_mass_per_depth() {
        let spec = BlockMeshSpec::closed_box(Vector3::new(0.0, 0.5, 0.0), Vector3::new(1.0, 1.0, 0.1), [1, 1, 1]);
        let mesh = PolyMesh::block(&spec).unwrap();
        let f = fields(&mesh, Vector3::zeros(), 0.0, 2.0, &[]);
        let mut solution = frozen_solution(0.1, 50);
        solution.axisymmetric = Some(AxisymmetricConfig {
            axis: [1.0, 0.0, 0.0],
            centre_plane_normal: [0.0, 0.0, 1.0],
            opening_angle: 0.1,
        });
        let mut cloud = McParticleCloud::new(mesh, solution, f).unwrap();
        cloud.init_release_particles();
        assert_relative_eq!(cloud.total_mass(), 2.0 * 0.1, epsilon = 1e-12);
        let first = cloud.mass_per_depth(&cloud.particles()[0]);
        for p in cloud.particles() {
            assert_relative_eq!(cloud.mass_per_depth(p), first, max_relative = 1e-10);
        }
        let centre = cloud.mesh().cell_centre(0);
        let r = (centre.y * centre.y + centre.z * centre.z).sqrt();
        assert_relative_eq!(cloud.volume_or_area(0), 0.1 / (0.1 * r), epsilon = 1e-12);
    }

    #[test]
    fn test_planar_volume_or_area_is_volume() {
        let mesh = closed_box([2, 1, 1]);
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let cloud = McParticleCloud::new(mesh, McSolution::default(), f).unwrap();
        assert_relative_eq!(cloud.volume_or_area(1), 0.5);
        let p = McParticle::new(cloud.mesh(), cloud.mesh().cell_centre(0), 0, 0, 0.3, Vector3::zeros(), vec![], Vector3::zeros(), 0);
        assert_relative_eq!(cloud.mass_per_depth(&p), 0.3);
    }

    #[test]
    fn test_notify_lost_particle() {
        let mesh = closed_box([2, 1, 1]);
        let f = fields(&mesh, Vector3::zeros(), 0.0, 1.0, &[]);
        let mut cloud = McParticleCloud::new(mesh, McSolution::default(), f).unwrap();
        let p = single_particle(&cloud, Vector3::new(0.75, 0.5, 0.5), Vector3::new(2.0, 0.0, 0.0));
        cloud.notify_lost_particle(&p);
        cloud.notify_lost_particle(&p);
        let lost = cloud.lost_particles();
        assert_eq!(lost.count(), 2);
        assert_relative_eq!(lost.lost_mass, 2.0);
        assert_relative_eq!(lost.lost_momentum.x, 4.0);
        assert_eq!(lost.lost_mass_by_cell.get(&1), Some(&2.0));
        assert!(lost.lost_mass_by_cell.get(&0).is_none());
    }

    #[test]
    fn test_elliptic_failure_aborts_step() {
        let mesh = closed_box([3, 3, 3]);
        let f = fields(&mesh, Vector3::zeros(), 1.0, 1.0, &[]);
        let solution = McSolution {
            delta_t: 0.1,
            ..McSolution::default()
        };
        let mut cloud = McParticleCloud::new(mesh, solution, f)
            .unwrap()
            .with_elliptic_solver(Box::new(PcgPoissonSolver::new(1e-14, 1)));
        cloud.init_release_particles();
        // unbalance the particle mass density
        for p in cloud.particles_mut().iter_mut().filter(|p| p.cell == 13) {
            p.m *= 3.0;
        }
        let result = cloud.evolve();
        assert!(matches!(
            result,
            Err(McError::Model(ModelError::Solver(SolverError::NotConverged { .. })))
        ));
    }
}
