use crate::Models::flow_fields::mean_frequency;
use crate::Models::model_api::{McModel, ModelContext, ModelError};
use crate::Particles::mc_particle::McParticle;
use rand::rngs::StdRng;

/// Interaction by exchange with the mean: every mixed scalar relaxes towards its cell mean,
/// `phi = phi_mean + (phi - phi_mean) exp(-C_phi/2 Omega dt)`, which keeps the mean and
/// damps the variance by `exp(-C_phi Omega dt)`.
#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct IEMMixingModel {
    pub C_phi: f64,
    /// indices of the mixed scalars
    pub mixed: Vec<usize>,
}

impl IEMMixingModel {
    #[allow(non_snake_case)]
    pub fn new(C_phi: f64, mixed: Vec<usize>) -> Self {
        Self { C_phi, mixed }
    }
}

impl McModel for IEMMixingModel {
    fn update_internals(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, _rng: &mut StdRng) {
        if self.mixed.is_empty() || !ctx.moments.has_statistics(p.cell) {
            return;
        }
        let omega = if p.Omega > 0.0 {
            p.Omega
        } else {
            mean_frequency(ctx.fields.k(p.cell), ctx.fields.epsilon(p.cell))
        };
        let decay = (-0.5 * self.C_phi * omega * ctx.particle_time_step(p)).exp();
        for &i in &self.mixed {
            if let Some(phi) = p.Phi.get_mut(i) {
                let mean = ctx.moments.phi(p.cell, i);
                *phi = mean + (*phi - mean) * decay;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoMixing;

impl McModel for NoMixing {
    fn update_internals(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn correct(&mut self, _p: &mut McParticle, _ctx: &ModelContext, _rng: &mut StdRng) {}
}
