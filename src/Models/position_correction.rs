//! # Position Correction
//!
//! Particle methods cluster: numerical diffusion in tracking and interpolation lets the particle
//! mass density drift away from the mean density of the finite-volume solution. The integrated
//! correction computes a potential `phi` from
//! ```text
//!  laplacian(phi) = -(pnd / rho - 1) / dt^2
//! ```
//! where `pnd` is the instantaneous particle mass per unit volume, and gives every particle the
//! drift velocity `Ucorrection = -relaxation * dt * grad(phi)`. Its divergence removes the relative
//! density error within `dt / relaxation`.
//!
//! Inlet and outlet patches carry `phi = 0`. A closed domain has no fixed value; there the source
//! mean is removed (the total mass is fixed) and cell 0 is pinned to zero.
//!
//! After a reflection at a wall the particle carries a correction computed for its unreflected
//! state, so the scheme is only first-order accurate next to walls.

use crate::Mesh::PolyMesh::PatchKind;
use crate::Mesh::interpolation::GradInterpolationConstantTet;
use crate::Models::elliptic_solver::{EllipticSolver, PoissonProblem};
use crate::Models::model_api::{McModel, ModelContext, ModelError};
use crate::Particles::mc_particle::McParticle;
use log::{debug, error};
use nalgebra::Vector3;
use rand::rngs::StdRng;

#[derive(Debug)]
pub struct IntegratedPositionCorrection {
    pub relaxation: f64,
    solver: Box<dyn EllipticSolver>,
    potential: Option<GradInterpolationConstantTet>,
}

impl IntegratedPositionCorrection {
    pub fn new(relaxation: f64, solver: Box<dyn EllipticSolver>) -> Self {
        Self {
            relaxation,
            solver,
            potential: None,
        }
    }

    pub fn set_solver(&mut self, solver: Box<dyn EllipticSolver>) {
        self.solver = solver;
    }

    /// cell values of the last solved potential
    pub fn potential(&self) -> Option<&[f64]> {
        self.potential.as_ref().map(|g| g.field().cell_values())
    }
}

impl McModel for IntegratedPositionCorrection {
    fn update_internals(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
        let mesh = ctx.mesh;
        let n = mesh.n_cells();
        let dt2 = ctx.delta_t * ctx.delta_t;
        let mut source: Vec<f64> = (0..n)
            .map(|c| {
                let rho = ctx.fields.density(c);
                if rho > 0.0 {
                    -(ctx.moments.pnd_instantaneous(c) / rho - 1.0) / dt2
                } else {
                    0.0
                }
            })
            .collect();
        let fixed: Vec<bool> = mesh
            .patches()
            .iter()
            .map(|p| matches!(p.kind, PatchKind::Inlet | PatchKind::Outlet))
            .collect();
        let reference = if fixed.iter().any(|&f| f) {
            None
        } else {
            let volumes = mesh.cell_volumes();
            let total: f64 = volumes.iter().sum();
            let mean = source.iter().zip(volumes).map(|(s, v)| s * v).sum::<f64>() / total;
            source.iter_mut().for_each(|s| *s -= mean);
            Some((0, 0.0))
        };
        let problem = PoissonProblem {
            mesh,
            source: &source,
            fixed_value_patches: &fixed,
            reference,
        };
        let phi = self.solver.solve(&problem).map_err(|e| {
            error!("position correction failed: {}", e);
            e
        })?;
        debug!(
            "position correction potential in [{:e}, {:e}]",
            phi.iter().cloned().fold(f64::INFINITY, f64::min),
            phi.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        );
        self.potential = Some(GradInterpolationConstantTet::new(mesh, phi));
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, _rng: &mut StdRng) {
        let Some(potential) = &self.potential else {
            return;
        };
        let mut u = -self.relaxation * ctx.delta_t * potential.interpolate(ctx.decomposition, p.tet);
        ctx.mesh.constrain_direction(&mut u);
        p.Ucorrection = u;
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoPositionCorrection;

impl McModel for NoPositionCorrection {
    fn update_internals(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, _ctx: &ModelContext, _rng: &mut StdRng) {
        p.Ucorrection = Vector3::zeros();
    }
}
