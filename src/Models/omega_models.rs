//! # Turbulent Frequency Models
//!
//! `MeanFrequencyOmegaModel` sets the particle frequency to `C_Omega * epsilon / k` of the mean
//! flow, interpolated to the particle position.
//!
//! `StochasticOmegaModel` lets every particle carry its own frequency, relaxing to the mean
//! frequency `Omega_m = epsilon / k` with a gamma-like diffusion:
//! ```text
//!  d omega = -C3 (omega - Omega_m) Omega_m dt + sqrt(2 C3 C4 Omega_m^2 omega dt) xi
//! ```
//! The result is clipped at zero.

use crate::Mesh::interpolation::CellPointFaceInterpolation;
use crate::Models::flow_fields::mean_frequency;
use crate::Models::model_api::{McModel, ModelContext, ModelError};
use crate::Particles::mc_particle::McParticle;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

fn mean_frequency_field(ctx: &ModelContext, factor: f64) -> CellPointFaceInterpolation<f64> {
    let values = (0..ctx.mesh.n_cells())
        .map(|c| factor * mean_frequency(ctx.fields.k(c), ctx.fields.epsilon(c)))
        .collect();
    CellPointFaceInterpolation::new(ctx.mesh, values)
}

#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct MeanFrequencyOmegaModel {
    pub C_Omega: f64,
    omega: Option<CellPointFaceInterpolation<f64>>,
}

impl MeanFrequencyOmegaModel {
    #[allow(non_snake_case)]
    pub fn new(C_Omega: f64) -> Self {
        Self { C_Omega, omega: None }
    }
}

impl McModel for MeanFrequencyOmegaModel {
    fn update_internals(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
        self.omega = Some(mean_frequency_field(ctx, self.C_Omega));
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, _rng: &mut StdRng) {
        if let Some(omega) = &self.omega {
            p.Omega = omega.interpolate(ctx.decomposition, &p.position, p.tet).max(0.0);
        }
    }
}

#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct StochasticOmegaModel {
    pub C3: f64,
    pub C4: f64,
    omega_mean: Option<CellPointFaceInterpolation<f64>>,
}

impl StochasticOmegaModel {
    #[allow(non_snake_case)]
    pub fn new(C3: f64, C4: f64) -> Self {
        Self {
            C3,
            C4,
            omega_mean: None,
        }
    }
}

impl McModel for StochasticOmegaModel {
    fn update_internals(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
        self.omega_mean = Some(mean_frequency_field(ctx, 1.0));
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, rng: &mut StdRng) {
        let Some(field) = &self.omega_mean else {
            return;
        };
        let omega_m = field.interpolate(ctx.decomposition, &p.position, p.tet).max(0.0);
        if p.Omega <= 0.0 {
            p.Omega = omega_m;
            return;
        }
        let dt = ctx.particle_time_step(p);
        let xi: f64 = rng.sample(StandardNormal);
        let drift = -self.C3 * (p.Omega - omega_m) * omega_m * dt;
        let diffusion = (2.0 * self.C3 * self.C4 * omega_m * omega_m * p.Omega * dt).sqrt() * xi;
        p.Omega = (p.Omega + drift + diffusion).max(0.0);
    }
}
