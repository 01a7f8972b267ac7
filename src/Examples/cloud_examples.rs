//! Demonstration runs of the particle cloud on block meshes with uniform flow fields.
//!
//! - task 0: closed box, turbulent particles relaxing under the Langevin model
//! - task 1: planar channel with an inlet of mixture fraction 1 and a first-order reaction A -> B
//! - task 2: the channel of task 1 with local time stepping and the stochastic frequency model
use crate::Cloud::McParticleCloud::{McError, McParticleCloud};
use crate::Cloud::config::{
    BoundaryConfig, McSolution, MixingModelConfig, OmegaModelConfig, ReactionModelConfig,
};
use crate::Mesh::PolyMesh::{BlockMeshSpec, PolyMesh};
use crate::Models::flow_fields::CellFlowFields;
use log::info;
use nalgebra::Vector3;
use prettytable::{Cell, Row, Table, row};

/// channel solution: scalars z (mixed), A and B (conserved), inlet on xmin
pub fn channel_solution() -> McSolution {
    let mut solution = McSolution {
        delta_t: 0.01,
        particles_per_cell: 20,
        scalar_names: vec!["z".to_string(), "A".to_string(), "B".to_string()],
        mixed_scalars: vec!["z".to_string()],
        conserved_scalars: vec!["A".to_string(), "B".to_string()],
        reaction_model: ReactionModelConfig::FirstOrder {
            reactant: "A".to_string(),
            product: Some("B".to_string()),
            rate: 2.0,
        },
        ..McSolution::default()
    };
    solution.boundaries.insert(
        "xmin".to_string(),
        BoundaryConfig::InletOutlet {
            velocity: [1.0, 0.0, 0.0],
            density: 1.0,
            velocity_fluctuation: 0.08,
            omega: 1.0,
            scalars: vec![1.0, 1.0, 0.0],
        },
    );
    solution
}

/// Runs the channel case with `solution` for `n_steps` steps and prints the mean scalar
/// profiles along the channel
pub fn run_channel(solution: McSolution, n_steps: usize) -> Result<McParticleCloud, McError> {
    let mesh = PolyMesh::block(&BlockMeshSpec::channel(
        Vector3::new(1.0, 0.2, 0.02),
        [20, 4, 1],
        true,
    ))?;
    let n_scalars = solution.n_scalars();
    let fields = CellFlowFields::uniform(
        mesh.n_cells(),
        Vector3::new(1.0, 0.0, 0.0),
        0.0,
        0.01,
        0.01,
        1.0,
        &vec![0.0; n_scalars],
    );
    let mut cloud = McParticleCloud::new(mesh, solution, Box::new(fields))?;
    cloud.init_release_particles();
    for step in 0..n_steps {
        let report = cloud.evolve()?;
        if step % 10 == 0 || step + 1 == n_steps {
            report.pretty_print();
        }
    }
    print_profiles(&cloud);
    let balance = cloud.cumulative_balance();
    info!(
        "cumulative mass in {:e}, out {:e}, imbalance {:e}",
        balance.mass_in,
        balance.mass_out,
        balance.imbalance()
    );
    Ok(cloud)
}

/// averages of the cell means over the cross-section, one row per x station
fn print_profiles(cloud: &McParticleCloud) {
    let mesh = cloud.mesh();
    let names = &cloud.solution().scalar_names;
    let means: Vec<Vec<f64>> = (0..names.len()).map(|i| cloud.phi_cpdf(i)).collect();
    let rho = cloud.rho_cpdf();
    let mut stations: Vec<(f64, Vec<usize>)> = Vec::new();
    for cell in 0..mesh.n_cells() {
        let x = mesh.cell_centre(cell).x;
        match stations.iter_mut().find(|(xs, _)| (xs - x).abs() < 1e-9) {
            Some((_, cells)) => cells.push(cell),
            None => stations.push((x, vec![cell])),
        }
    }
    stations.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut table = Table::new();
    let mut header = vec!["x".to_string(), "rho".to_string()];
    header.extend(names.iter().cloned());
    table.add_row(Row::new(header.iter().map(|h| Cell::new(h)).collect()));
    for (x, cells) in &stations {
        let n = cells.len() as f64;
        let mut cols = vec![format!("{:.3}", x), format!("{:.4}", cells.iter().map(|&c| rho[c]).sum::<f64>() / n)];
        for field in &means {
            cols.push(format!("{:.4}", cells.iter().map(|&c| field[c]).sum::<f64>() / n));
        }
        table.add_row(Row::new(cols.iter().map(|c| Cell::new(c)).collect()));
    }
    table.printstd();
}

pub fn cloud_examples(task: usize, n_steps: usize) -> Result<(), McError> {
    match task {
        0 => {
            // CLOSED BOX
            let mesh = PolyMesh::block(&BlockMeshSpec::closed_box(
                Vector3::zeros(),
                Vector3::new(1.0, 1.0, 1.0),
                [4, 4, 4],
            ))?;
            let fields = CellFlowFields::uniform(mesh.n_cells(), Vector3::zeros(), 0.0, 0.5, 0.5, 1.0, &[]);
            let solution = McSolution {
                delta_t: 0.05,
                check_population_health: true,
                ..McSolution::default()
            };
            let mut cloud = McParticleCloud::new(mesh, solution, Box::new(fields))?;
            cloud.init_release_particles();
            let mut table = Table::new();
            table.add_row(row!["step", "mean k", "total mass", "residual"]);
            for _ in 0..n_steps {
                let report = cloud.evolve()?;
                let k = cloud.k_cpdf();
                let k_mean = k.iter().sum::<f64>() / k.len() as f64;
                table.add_row(row![
                    report.step,
                    format!("{:.5}", k_mean),
                    format!("{:e}", report.total_mass),
                    format!("{:e}", report.residual)
                ]);
            }
            table.printstd();
            cloud.info();
        }
        1 => {
            // REACTIVE CHANNEL
            run_channel(channel_solution(), n_steps)?;
        }
        2 => {
            // CHANNEL WITH LOCAL TIME STEPPING
            let mut solution = channel_solution();
            solution.delta_t = 0.1;
            solution.local_time_stepping.enabled = true;
            solution.local_time_stepping.max_courant = 0.5;
            solution.omega_model = OmegaModelConfig::Stochastic { C3: 1.0, C4: 0.25 };
            solution.mixing_model = MixingModelConfig::IEM { C_phi: 2.0 };
            let cloud = run_channel(solution, n_steps)?;
            let min_eta = cloud.particles().iter().map(|p| p.eta).fold(1.0, f64::min);
            info!("smallest local time step factor {:.3}", min_eta);
        }
        _ => {
            info!("no example with number {}", task);
        }
    }
    Ok(())
}
