//! # Monte-Carlo Particle Cloud
//!
//! ## Purpose
//! `McParticleCloud` owns the particle ensemble of one (sub-)domain and advances it by one global
//! time step per `evolve()` call. Every call runs the same cycle:
//! 1. purge left-over ghost particles, reset the per-step tracking state
//! 2. local time stepping: every particle gets `eta = min(1, max_courant / (Co dt))`
//! 3. boundary handlers inject ghost particles at inlets
//! 4. track all particles over `eta * dt`, applying boundary conditions
//! 5. exchange particles that reached processor patches until every sub-domain is done
//! 6. admit surviving ghosts as real particles (mass in)
//! 7. refresh the particle density from the mean density field
//! 8. blend the moments of the new population into the time averages
//! 9. population control: clone in sparse cells, eliminate in crowded ones
//! 10. update the frequency, velocity, mixing, reaction and position-correction models and apply
//!     them to every particle, then refresh tracking velocities and Courant numbers
//! 11. report the density residual and the mass budget
//!
//! ## Main Structures
//! - `McParticleCloud`: the orchestrator
//! - `McError`: every failure `evolve()` and the constructor can return
//!
//! ## Non-obvious features
//! - Models never see a particle mid-trajectory: all tracking and exchange finish before the first
//!   model update.
//! - Failures of the elliptic solver or of the population bookkeeping abort the step; lost
//!   particles do not, they are only recorded.
//! - A failure while tracking or exchanging particles puts the ensemble back to its state before
//!   the step, so a failed `evolve()` never leaves a partial ensemble behind.
//! - In axi-symmetric cases particle masses of every generated batch are redistributed in
//!   proportion to the radius, so that the mass per unit depth is equal inside the batch.

use crate::Cloud::config::{BoundaryConfig, ConfigError, McSolution};
use crate::Cloud::diagnostics::{BoundaryFluxes, EvolveReport, LostParticles, MassBalance};
use crate::Cloud::transport::{ParticleTransfer, ParticleTransport, SerialTransport, TransportError};
use crate::Mesh::PolyMesh::{MeshError, PatchKind, PolyMesh};
use crate::Mesh::tet_decomposition::{GeometryError, TetFacePointCellDecomposition};
use crate::Models::elliptic_solver::EllipticSolver;
use crate::Models::flow_fields::{FlowFields, mean_frequency};
use crate::Models::model_api::{
    McModel, MixingModel, ModelContext, ModelError, OmegaModel, PositionCorrection, ReactionModel,
    VelocityModel, create_mixing_model, create_omega_model, create_position_correction,
    create_reaction_model, create_velocity_model,
};
use crate::Particles::boundary::{
    BoundaryHandler, GenerationContext, InletOutlet, McBoundary, OutletDeletion, PeriodicWrap,
    WallReflection,
};
use crate::Particles::mc_particle::McParticle;
use crate::Particles::tracking::{TrackData, TrackingContext};
use crate::Statistics::moments::MomentAccumulator;
use crate::Statistics::population::{PopulationController, PopulationError};
use log::{debug, error, info, warn};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;

/// exchange rounds after which a sub-domain gives up waiting for the others
pub const MAX_EXCHANGE_ROUNDS: usize = 100;
/// barycentric coordinates below -HEALTH_TOLERANCE put a particle outside its tetrahedron
const HEALTH_TOLERANCE: f64 = 1e-6;
/// periodic shifts above this multiple of the domain diagonal are considered runaway
const MAX_SHIFT_FACTOR: f64 = 1e6;

#[derive(Debug, Error)]
pub enum McError {
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    PopulationControl(#[from] PopulationError),
    #[error("Processor handoff failed: {0}")]
    ProcessorHandoff(String),
    #[error("Population health check failed: {0}")]
    PopulationHealth(String),
    #[error("No boundary condition for patch '{0}'")]
    MissingBoundary(String),
}

/// Wedge of an axi-symmetric case, the axis passes through the origin
#[derive(Debug, Clone)]
pub struct AxisymmetricGeometry {
    pub axis: Vector3<f64>,
    pub centre_plane_normal: Vector3<f64>,
    pub opening_angle: f64,
}

impl AxisymmetricGeometry {
    pub fn radius(&self, position: &Vector3<f64>) -> f64 {
        (position - position.dot(&self.axis) * self.axis).norm()
    }

    /// azimuthal extent of the wedge at `position`
    pub fn depth(&self, position: &Vector3<f64>) -> f64 {
        self.opening_angle * self.radius(position)
    }
}

pub struct McParticleCloud {
    mesh: PolyMesh,
    decomposition: TetFacePointCellDecomposition,
    solution: McSolution,
    fields: Box<dyn FlowFields>,
    transport: Box<dyn ParticleTransport>,
    particles: Vec<McParticle>,
    rng: StdRng,
    processor: usize,
    next_id: usize,
    moments: MomentAccumulator,
    population: PopulationController,
    /// one entry per patch, `None` where tracking handles the patch itself
    handlers: Vec<Option<McBoundary>>,
    velocity_model: VelocityModel,
    omega_model: OmegaModel,
    mixing_model: MixingModel,
    reaction_model: ReactionModel,
    position_correction: PositionCorrection,
    /// unit face normals divided by the distance the face is seen from its cells
    courant_coeffs: Vec<Vector3<f64>>,
    lost: LostParticles,
    cumulative_balance: MassBalance,
    axisymmetric: Option<AxisymmetricGeometry>,
    step: usize,
}

impl McParticleCloud {
    pub fn new(mesh: PolyMesh, solution: McSolution, fields: Box<dyn FlowFields>) -> Result<Self, McError> {
        solution.validate()?;
        let decomposition = TetFacePointCellDecomposition::new(&mesh)?;
        let handlers = create_handlers(&mesh, &solution)?;
        let axisymmetric = match &solution.axisymmetric {
            Some(cfg) => {
                let axis = Vector3::from(cfg.axis);
                let normal = Vector3::from(cfg.centre_plane_normal);
                if axis.norm() == 0.0 || normal.norm() == 0.0 || !(cfg.opening_angle > 0.0) {
                    return Err(ConfigError::Invalid(
                        "axi-symmetric axis and centre plane normal must be non-zero, opening angle positive"
                            .to_string(),
                    )
                    .into());
                }
                Some(AxisymmetricGeometry {
                    axis: axis.normalize(),
                    centre_plane_normal: normal.normalize(),
                    opening_angle: cfg.opening_angle,
                })
            }
            None => None,
        };
        let courant_coeffs = courant_coefficients(&mesh);
        let moments = MomentAccumulator::new(mesh.cell_volumes().to_vec(), solution.n_scalars());
        let population = PopulationController::new(
            solution.particles_per_cell,
            solution.clone_at,
            solution.eliminate_at,
            solution.ranking,
        );
        let cloud = Self {
            decomposition,
            fields,
            transport: Box::new(SerialTransport),
            particles: Vec::new(),
            rng: StdRng::seed_from_u64(solution.random_seed),
            processor: 0,
            next_id: 0,
            moments,
            population,
            handlers,
            velocity_model: create_velocity_model(&solution.velocity_model),
            omega_model: create_omega_model(&solution.omega_model),
            mixing_model: create_mixing_model(&solution)?,
            reaction_model: create_reaction_model(&solution)?,
            position_correction: create_position_correction(&solution.position_correction),
            courant_coeffs,
            lost: LostParticles::default(),
            cumulative_balance: MassBalance::default(),
            axisymmetric,
            step: 0,
            mesh,
            solution,
        };
        info!(
            "particle cloud on {} cells, {} tetrahedra, {} patches with handlers",
            cloud.mesh.n_cells(),
            cloud.decomposition.n_tets(),
            cloud.handlers.iter().filter(|h| h.is_some()).count()
        );
        Ok(cloud)
    }

    pub fn with_transport(mut self, transport: Box<dyn ParticleTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// replaces the Poisson solver of the integrated position correction
    pub fn with_elliptic_solver(mut self, solver: Box<dyn EllipticSolver>) -> Self {
        if let PositionCorrection::Integrated(pc) = &mut self.position_correction {
            pc.set_solver(solver);
        }
        self
    }

    /// rank of this sub-domain, used as origin of new particles and in exchanges
    pub fn set_processor(&mut self, processor: usize) {
        self.processor = processor;
    }

    pub fn processor(&self) -> usize {
        self.processor
    }

    pub fn mesh(&self) -> &PolyMesh {
        &self.mesh
    }

    pub fn decomposition(&self) -> &TetFacePointCellDecomposition {
        &self.decomposition
    }

    pub fn solution(&self) -> &McSolution {
        &self.solution
    }

    pub fn particles(&self) -> &[McParticle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut Vec<McParticle> {
        &mut self.particles
    }

    pub fn moments(&self) -> &MomentAccumulator {
        &self.moments
    }

    pub fn flow_fields(&self) -> &dyn FlowFields {
        self.fields.as_ref()
    }

    /// new mean flow state from the finite-volume solver, used from the next step on
    pub fn set_flow_fields(&mut self, fields: Box<dyn FlowFields>) {
        self.fields = fields;
    }

    pub fn lost_particles(&self) -> &LostParticles {
        &self.lost
    }

    pub fn cumulative_balance(&self) -> &MassBalance {
        &self.cumulative_balance
    }

    pub fn position_correction(&self) -> &PositionCorrection {
        &self.position_correction
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn total_mass(&self) -> f64 {
        self.particles.iter().filter(|p| !p.is_ghost()).map(|p| p.m).sum()
    }

    ////////////////////////////////////PARTICLE GENERATION//////////////////////////////////////

    /// Fills every cell with `particles_per_cell` particles sampled from the mean flow state and
    /// initialises the moments from them.
    pub fn init_release_particles(&mut self) {
        let npc = self.solution.particles_per_cell;
        let n_scalars = self.solution.n_scalars();
        for cell in 0..self.mesh.n_cells() {
            let m = self.fields.density(cell) * self.mesh.cell_volume(cell) / npc as f64;
            let u = self.fields.velocity(cell);
            let scale = (2.0 * self.fields.k(cell).max(0.0) / 3.0).sqrt();
            let phi: Vec<f64> = (0..n_scalars).map(|i| self.fields.scalar(i, cell)).collect();
            self.particle_gen_in_cell(
                cell,
                npc,
                m,
                u,
                Vector3::new(scale, scale, scale),
                &phi,
                Vector3::zeros(),
                0,
            );
        }
        self.moments.update_cloud_pdf(&self.particles, 0.0);
        info!(
            "released {} particles, total mass {:e}",
            self.particles.len(),
            self.total_mass()
        );
    }

    /// Generates `n` particles at random positions in `cell` with velocities `u + uscales * xi`.
    /// Returns the index range of the new particles.
    #[allow(clippy::too_many_arguments)]
    pub fn particle_gen_in_cell(
        &mut self,
        cell: usize,
        n: usize,
        m: f64,
        u: Vector3<f64>,
        uscales: Vector3<f64>,
        phi: &[f64],
        shift: Vector3<f64>,
        ghost: u32,
    ) -> Range<usize> {
        let points = self.random_points_in_cell(n, cell);
        let omega = mean_frequency(self.fields.k(cell), self.fields.epsilon(cell));
        let rho = self.fields.density(cell);
        let mut batch = Vec::with_capacity(n);
        for (position, tet) in points {
            let xi = Vector3::new(
                self.rng.sample::<f64, _>(StandardNormal),
                self.rng.sample::<f64, _>(StandardNormal),
                self.rng.sample::<f64, _>(StandardNormal),
            );
            let velocity = u + uscales.component_mul(&xi);
            let mut p = McParticle::new(&self.mesh, position, cell, tet, m, velocity, phi.to_vec(), shift, ghost);
            p.Omega = omega;
            p.rho = rho;
            self.compute_courant_no(&mut p);
            batch.push(p);
        }
        self.adjust_axisymmetric_mass(&mut batch);
        let start = self.particles.len();
        for p in batch {
            self.add_particle(p);
        }
        start..self.particles.len()
    }

    /// `n` uniformly distributed points in `cell` with the tetrahedron containing each
    pub fn random_points_in_cell(&mut self, n: usize, cell: usize) -> Vec<(Vector3<f64>, usize)> {
        (0..n)
            .map(|_| self.decomposition.random_point_in_cell(cell, &mut self.rng))
            .collect()
    }

    /// Adds a particle to the ensemble under a new id of this processor
    pub fn add_particle(&mut self, mut p: McParticle) {
        p.orig_id = self.next_id;
        p.orig_proc = self.processor;
        self.next_id += 1;
        self.particles.push(p);
    }

    ////////////////////////////////////EVOLVE//////////////////////////////////////////////////

    /// Advances the ensemble by one time step
    pub fn evolve(&mut self) -> Result<EvolveReport, McError> {
        let snapshot = self.particles.clone();
        let lost_snapshot = self.lost.clone();
        let next_id_snapshot = self.next_id;
        self.step += 1;
        let dt = self.solution.delta_t;
        let mass_before = self.total_mass();
        let lost_before = (self.lost.count(), self.lost.lost_mass);

        let n_purged = self.particles.len();
        self.particles.retain(|p| !p.is_ghost());
        let n_purged = n_purged - self.particles.len();
        if n_purged > 0 {
            warn!("{} ghost particles left from the previous step purged", n_purged);
        }
        for p in self.particles.iter_mut() {
            p.n_steps = 0;
            p.step_fraction = 0.0;
            p.face = None;
            p.reflected_at_open_boundary = false;
        }

        self.apply_local_time_stepping();

        let generated = self.generate_boundary_particles();
        let n_generated = generated.len();
        for p in generated {
            self.add_particle(p);
        }

        let mut fluxes = BoundaryFluxes::default();
        let particles = std::mem::take(&mut self.particles);
        match self.transport_particles(particles, &mut fluxes) {
            Ok(kept) => self.particles = kept,
            Err(e) => {
                // a partial ensemble is never kept: go back to the state before this step
                self.particles = snapshot;
                self.lost = lost_snapshot;
                self.next_id = next_id_snapshot;
                self.step -= 1;
                return Err(e);
            }
        }

        for p in self.particles.iter_mut().filter(|p| p.is_ghost()) {
            p.ghost = 0;
            fluxes.mass_in += p.m;
            fluxes.n_in += 1;
        }

        for p in self.particles.iter_mut() {
            p.rho = self.fields.density(p.cell);
        }

        let rho_old: Vec<f64> = (0..self.mesh.n_cells()).map(|c| self.moments.rho(c)).collect();
        self.moments.update_cloud_pdf(&self.particles, self.solution.exist_weight);
        let residual = rho_old
            .iter()
            .enumerate()
            .filter(|(c, _)| self.moments.has_statistics(*c))
            .map(|(c, &old)| {
                let new = self.moments.rho(c);
                if new > 0.0 { ((new - old) / new).abs() } else { 0.0 }
            })
            .fold(0.0, f64::max);

        let population = self
            .population
            .control(&mut self.particles, self.mesh.n_cells(), &mut self.next_id)
            .map_err(|e| {
                error!("population control failed: {}", e);
                e
            })?;
        // clones are appended and numbered by this processor
        let first_clone = self.particles.len() - population.n_cloned;
        for p in self.particles[first_clone..].iter_mut() {
            p.orig_proc = self.processor;
        }

        self.correct_particles()?;

        let n_lost = self.lost.count() - lost_before.0;
        let lost_mass = self.lost.lost_mass - lost_before.1;
        let total_mass = self.total_mass();
        let mut balance = MassBalance::default();
        balance.record(&fluxes, lost_mass, total_mass - mass_before);
        self.cumulative_balance.record(&fluxes, lost_mass, total_mass - mass_before);

        let conserved_scalars = self
            .solution
            .conserved_scalars
            .iter()
            .filter_map(|name| {
                self.solution.scalar_index(name).map(|i| {
                    let total: f64 = self.particles.iter().map(|p| p.m * p.Phi[i]).sum();
                    (name.clone(), total)
                })
            })
            .collect();
        let report = EvolveReport {
            step: self.step,
            n_particles: self.particles.len(),
            n_generated,
            total_mass,
            residual,
            max_courant: self.particles.iter().map(|p| p.Co * p.eta * dt).fold(0.0, f64::max),
            fluxes,
            balance,
            n_lost,
            lost_mass,
            population,
            conserved_scalars,
        };
        info!(
            "step {}: {} particles, mass {:e}, residual {:e}, {} lost",
            report.step, report.n_particles, report.total_mass, report.residual, report.n_lost
        );
        if self.solution.check_population_health {
            self.assert_population_health()?;
        }
        Ok(report)
    }

    fn apply_local_time_stepping(&mut self) {
        let lts = &self.solution.local_time_stepping;
        let dt = self.solution.delta_t;
        for p in self.particles.iter_mut() {
            p.eta = if lts.enabled && p.Co * dt > lts.max_courant {
                lts.max_courant / (p.Co * dt)
            } else {
                1.0
            };
        }
    }

    fn generate_boundary_particles(&mut self) -> Vec<McParticle> {
        let ctx = GenerationContext {
            mesh: &self.mesh,
            decomposition: &self.decomposition,
            delta_t: self.solution.delta_t,
            particles_per_cell: self.solution.particles_per_cell,
        };
        let mut generated = Vec::new();
        for handler in self.handlers.iter_mut().flatten() {
            generated.extend(handler.before_move(&ctx, &mut self.rng));
        }
        for p in generated.iter_mut() {
            p.rho = if p.rho > 0.0 { p.rho } else { self.fields.density(p.cell) };
            courant_number(&self.mesh, &self.courant_coeffs, p);
        }
        if self.axisymmetric.is_some() {
            let mut by_cell: HashMap<usize, Vec<McParticle>> = HashMap::new();
            for p in generated {
                by_cell.entry(p.cell).or_default().push(p);
            }
            generated = Vec::new();
            let mut cells: Vec<usize> = by_cell.keys().copied().collect();
            cells.sort_unstable();
            for cell in cells {
                if let Some(mut batch) = by_cell.remove(&cell) {
                    self.adjust_axisymmetric_mass(&mut batch);
                    generated.extend(batch);
                }
            }
        }
        generated
    }

    /// Tracks `particles` and runs the exchange rounds until every sub-domain is done; returns
    /// the particles owned by this sub-domain at the end of the step
    fn transport_particles(
        &mut self,
        particles: Vec<McParticle>,
        fluxes: &mut BoundaryFluxes,
    ) -> Result<Vec<McParticle>, McError> {
        let (mut kept, mut outbound) = self.track_particles(particles, fluxes)?;
        let mut rounds = 0;
        loop {
            let round = self.transport.exchange(std::mem::take(&mut outbound))?;
            if round.complete {
                if !round.inbound.is_empty() {
                    error!("completed exchange round delivered {} particles", round.inbound.len());
                    return Err(McError::ProcessorHandoff(format!(
                        "{} particles arrived in a completed exchange round",
                        round.inbound.len()
                    )));
                }
                break;
            }
            rounds += 1;
            if rounds > MAX_EXCHANGE_ROUNDS {
                error!("particle exchange did not complete");
                return Err(McError::ProcessorHandoff(format!(
                    "exchange not complete after {} rounds",
                    MAX_EXCHANGE_ROUNDS
                )));
            }
            let arrived = round
                .inbound
                .into_iter()
                .map(|t| self.receive_particle(t))
                .collect::<Result<Vec<_>, _>>()?;
            debug!("exchange round {}: {} particles arrived", rounds, arrived.len());
            let (k, o) = self.track_particles(arrived, fluxes)?;
            kept.extend(k);
            outbound = o;
        }
        Ok(kept)
    }

    /// Tracks `particles` over their time step; returns the particles staying in this
    /// sub-domain and the transfers to neighbouring ones.
    fn track_particles(
        &mut self,
        particles: Vec<McParticle>,
        fluxes: &mut BoundaryFluxes,
    ) -> Result<(Vec<McParticle>, Vec<ParticleTransfer>), McError> {
        let dt = self.solution.delta_t;
        let mut kept = Vec::with_capacity(particles.len());
        let mut outbound = Vec::new();
        let mut ctx = TrackingContext {
            mesh: &self.mesh,
            decomposition: &self.decomposition,
            handlers: &mut self.handlers,
            rng: &mut self.rng,
            lost: &mut self.lost,
            fluxes,
        };
        for mut p in particles {
            let mut td = TrackData::default();
            let track_time = p.eta * dt;
            p.move_particle(&mut td, &mut ctx, track_time);
            if td.switch_processor {
                let transfer = p
                    .face
                    .and_then(|f| self.mesh.which_patch(f).map(|i| (f, &self.mesh.patches()[i])))
                    .and_then(|(f, patch)| match patch.kind {
                        PatchKind::Processor { neighbour_processor } => {
                            Some((neighbour_processor, f - patch.start))
                        }
                        _ => None,
                    });
                let Some((to_processor, patch_face)) = transfer else {
                    return Err(McError::ProcessorHandoff(format!(
                        "particle {} switches processor without a processor face",
                        p.orig_id
                    )));
                };
                outbound.push(ParticleTransfer {
                    particle: p,
                    from_processor: self.processor,
                    to_processor,
                    patch_face,
                });
            } else if td.keep_particle {
                kept.push(p);
            }
        }
        Ok((kept, outbound))
    }

    /// Places a particle arriving from another sub-domain on the matching processor face
    fn receive_particle(&self, transfer: ParticleTransfer) -> Result<McParticle, McError> {
        let handoff_error = |msg: String| {
            error!("{}", msg);
            McError::ProcessorHandoff(msg)
        };
        if transfer.to_processor != self.processor {
            return Err(handoff_error(format!(
                "particle for processor {} delivered to processor {}",
                transfer.to_processor, self.processor
            )));
        }
        let patch = self
            .mesh
            .patches()
            .iter()
            .find(|patch| {
                matches!(patch.kind, PatchKind::Processor { neighbour_processor } if neighbour_processor == transfer.from_processor)
            })
            .ok_or_else(|| handoff_error(format!("no processor patch towards {}", transfer.from_processor)))?;
        if transfer.patch_face >= patch.size {
            return Err(handoff_error(format!(
                "face {} out of range of patch '{}' with {} faces",
                transfer.patch_face, patch.name, patch.size
            )));
        }
        let mut p = transfer.particle;
        if !(p.m > 0.0 && p.m.is_finite()) || p.Phi.len() != self.solution.n_scalars() {
            return Err(handoff_error(format!("malformed particle {}/{}", p.orig_proc, p.orig_id)));
        }
        if !(0.0..=1.0).contains(&p.step_fraction) {
            return Err(handoff_error(format!(
                "particle {}/{} arrived with step fraction {}",
                p.orig_proc, p.orig_id, p.step_fraction
            )));
        }
        let face = patch.start + transfer.patch_face;
        let cell = self.mesh.face_owner(face);
        let tet = self.decomposition.find_tet(cell, &p.position).ok_or_else(|| {
            handoff_error(format!(
                "particle {}/{} at {:?} is not in cell {} behind face {}",
                p.orig_proc, p.orig_id, p.position, cell, face
            ))
        })?;
        p.cell = cell;
        p.tet = tet;
        p.face = None;
        Ok(p)
    }

    /// Updates all models from the current moments and applies them to every particle
    fn correct_particles(&mut self) -> Result<(), McError> {
        let ctx = ModelContext {
            mesh: &self.mesh,
            decomposition: &self.decomposition,
            moments: &self.moments,
            fields: self.fields.as_ref(),
            delta_t: self.solution.delta_t,
        };
        self.omega_model.update_internals(&ctx)?;
        self.velocity_model.update_internals(&ctx)?;
        self.mixing_model.update_internals(&ctx)?;
        self.reaction_model.update_internals(&ctx)?;
        self.position_correction.update_internals(&ctx)?;
        for p in self.particles.iter_mut() {
            self.omega_model.correct(p, &ctx, &mut self.rng);
            self.velocity_model.correct(p, &ctx, &mut self.rng);
            self.mixing_model.correct(p, &ctx, &mut self.rng);
            self.reaction_model.correct(p, &ctx, &mut self.rng);
            self.position_correction.correct(p, &ctx, &mut self.rng);
            p.update_tracking_velocity(&self.mesh);
            courant_number(&self.mesh, &self.courant_coeffs, p);
        }
        Ok(())
    }

    ////////////////////////////////////DIAGNOSTICS//////////////////////////////////////////////

    pub fn notify_lost_particle(&mut self, p: &McParticle) {
        self.lost.notify(p);
    }

    /// Checks that every particle is a real particle inside the tetrahedron and cell it claims,
    /// with a finite mass and a bounded periodic shift
    pub fn assert_population_health(&self) -> Result<(), McError> {
        let max_shift = MAX_SHIFT_FACTOR * self.mesh.bounding_diagonal();
        let n_tets = self.decomposition.n_tets();
        for p in &self.particles {
            let id = format!("particle {}/{}", p.orig_proc, p.orig_id);
            let problem = if p.is_ghost() {
                Some(format!("{} is a ghost", id))
            } else if p.cell >= self.mesh.n_cells() || p.tet >= n_tets {
                Some(format!("{} refers to cell {} tet {} outside the mesh", id, p.cell, p.tet))
            } else if self.decomposition.tetrahedron_cell()[p.tet] != p.cell {
                Some(format!("{} in cell {} holds tet {} of another cell", id, p.cell, p.tet))
            } else if self
                .decomposition
                .tet(p.tet)
                .barycentric(&p.position)
                .iter()
                .any(|&l| l < -HEALTH_TOLERANCE)
            {
                Some(format!("{} at {:?} is outside its tetrahedron", id, p.position))
            } else if !(p.m > 0.0 && p.m.is_finite()) {
                Some(format!("{} has mass {}", id, p.m))
            } else if !p.shift.iter().all(|s| s.is_finite()) || p.shift.norm() > max_shift {
                Some(format!("{} has shift {:?}", id, p.shift))
            } else {
                None
            };
            if let Some(msg) = problem {
                error!("{}", msg);
                return Err(McError::PopulationHealth(msg));
            }
        }
        Ok(())
    }

    pub fn info(&self) {
        let n_ghosts = self.particles.iter().filter(|p| p.is_ghost()).count();
        info!(
            "cloud on processor {}: {} particles ({} ghosts), total mass {:e}, {} lost particles with mass {:e}",
            self.processor,
            self.particles.len(),
            n_ghosts,
            self.total_mass(),
            self.lost.count(),
            self.lost.lost_mass
        );
    }

    /// Courant number of `p` for a unit time step
    pub fn compute_courant_no(&self, p: &mut McParticle) {
        courant_number(&self.mesh, &self.courant_coeffs, p);
    }

    ////////////////////////////////////AXI-SYMMETRY/////////////////////////////////////////////

    pub fn axisymmetric(&self) -> Option<&AxisymmetricGeometry> {
        self.axisymmetric.as_ref()
    }

    /// mass per unit azimuthal depth in axi-symmetric cases, plain mass otherwise
    pub fn mass_per_depth(&self, p: &McParticle) -> f64 {
        match &self.axisymmetric {
            Some(geom) => {
                let depth = geom.depth(&p.position);
                if depth > 0.0 { p.m / depth } else { 0.0 }
            }
            None => p.m,
        }
    }

    /// cell volume, or the area of the cell in the centre plane for axi-symmetric cases
    pub fn volume_or_area(&self, cell: usize) -> f64 {
        let volume = self.mesh.cell_volume(cell);
        match &self.axisymmetric {
            Some(geom) => {
                let depth = geom.depth(&self.mesh.cell_centre(cell));
                if depth > 0.0 { volume / depth } else { 0.0 }
            }
            None => volume,
        }
    }

    /// Redistributes the mass of a generated batch in proportion to the radius, keeping its total
    pub fn adjust_axisymmetric_mass(&self, particles: &mut [McParticle]) {
        let Some(geom) = &self.axisymmetric else {
            return;
        };
        let total_mass: f64 = particles.iter().map(|p| p.m).sum();
        let radii: Vec<f64> = particles.iter().map(|p| geom.radius(&p.position)).collect();
        let total_radius: f64 = radii.iter().sum();
        if !(total_radius > 0.0) {
            return;
        }
        for (p, r) in particles.iter_mut().zip(radii) {
            p.m = total_mass * r / total_radius;
        }
        debug!("axi-symmetric mass adjustment of {} particles", particles.len());
    }

    ////////////////////////////////////PDF FIELDS///////////////////////////////////////////////

    pub fn rho_cpdf(&self) -> Vec<f64> {
        self.cell_field(|c| self.moments.rho(c))
    }

    pub fn rho_cpdf_inst(&self) -> Vec<f64> {
        self.cell_field(|c| self.moments.rho_instantaneous(c))
    }

    pub fn pnd_cpdf(&self) -> Vec<f64> {
        self.cell_field(|c| self.moments.pnd(c))
    }

    pub fn pnd_cpdf_inst(&self) -> Vec<f64> {
        self.cell_field(|c| self.moments.pnd_instantaneous(c))
    }

    pub fn u_cpdf(&self) -> Vec<Vector3<f64>> {
        (0..self.mesh.n_cells()).map(|c| self.moments.u(c)).collect()
    }

    /// Reynolds stress tensor per cell
    pub fn tau_cpdf(&self) -> Vec<Matrix3<f64>> {
        (0..self.mesh.n_cells()).map(|c| self.moments.tau(c)).collect()
    }

    pub fn k_cpdf(&self) -> Vec<f64> {
        self.cell_field(|c| self.moments.k(c))
    }

    pub fn phi_cpdf(&self, scalar: usize) -> Vec<f64> {
        self.cell_field(|c| self.moments.phi(c, scalar))
    }

    pub fn phi_variance_cpdf(&self, scalar: usize) -> Vec<f64> {
        self.cell_field(|c| self.moments.phi_variance(c, scalar))
    }

    fn cell_field<F: Fn(usize) -> f64>(&self, f: F) -> Vec<f64> {
        (0..self.mesh.n_cells()).map(f).collect()
    }
}

/// Coefficients turning a velocity into a Courant number for a unit time step: unit normals over
/// the centre distance for internal faces, over twice the face distance for boundary faces
fn courant_coefficients(mesh: &PolyMesh) -> Vec<Vector3<f64>> {
    (0..mesh.n_faces())
        .map(|face| {
            let normal = mesh.face_unit_normal(face);
            let own = mesh.cell_centre(mesh.face_owner(face));
            let distance = match mesh.face_neighbour(face) {
                Some(nei) => (mesh.cell_centre(nei) - own).norm(),
                None => 2.0 * (mesh.face_centre(face) - own).norm(),
            };
            normal / distance
        })
        .collect()
}

fn courant_number(mesh: &PolyMesh, coeffs: &[Vector3<f64>], p: &mut McParticle) {
    p.Co = mesh
        .cell_faces(p.cell)
        .iter()
        .map(|&f| p.Utracking.dot(&coeffs[f]).abs())
        .fold(0.0, f64::max);
}

/// One handler per patch from its kind and the optional boundary configuration
fn create_handlers(mesh: &PolyMesh, solution: &McSolution) -> Result<Vec<Option<McBoundary>>, McError> {
    for name in solution.boundaries.keys() {
        if mesh.find_patch(name).is_none() {
            warn!("boundary configuration for unknown patch '{}' ignored", name);
        }
    }
    let mut handlers = Vec::with_capacity(mesh.patches().len());
    for (i, patch) in mesh.patches().iter().enumerate() {
        let config = solution.boundaries.get(&patch.name);
        let handler: Option<McBoundary> = match (&patch.kind, config) {
            (PatchKind::Periodic { .. }, _) => PeriodicWrap::from_mesh(mesh, i).map(Into::into),
            (PatchKind::Wedge | PatchKind::Empty | PatchKind::Processor { .. }, c) => {
                if c.is_some() {
                    warn!(
                        "patch '{}' of type {} ignores its boundary configuration",
                        patch.name,
                        patch.kind.type_name()
                    );
                }
                None
            }
            (
                _,
                Some(BoundaryConfig::InletOutlet {
                    velocity,
                    density,
                    velocity_fluctuation,
                    omega,
                    scalars,
                }),
            ) => {
                // scalars left out enter with zero values
                let phi = if scalars.is_empty() {
                    vec![0.0; solution.n_scalars()]
                } else {
                    scalars.clone()
                };
                Some(
                    InletOutlet::new(
                        i,
                        Vector3::from(*velocity),
                        *density,
                        *velocity_fluctuation,
                        *omega,
                        phi,
                    )
                    .into(),
                )
            }
            (_, Some(BoundaryConfig::Wall)) => Some(WallReflection::new(i).into()),
            (_, Some(BoundaryConfig::Outlet)) => Some(OutletDeletion::new(i).into()),
            (PatchKind::Inlet, None) => return Err(McError::MissingBoundary(patch.name.clone())),
            (PatchKind::Outlet, None) => Some(OutletDeletion::new(i).into()),
            (PatchKind::Wall, None) => Some(WallReflection::new(i).into()),
        };
        handlers.push(handler);
    }
    Ok(handlers)
}
