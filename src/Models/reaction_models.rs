use crate::Models::model_api::{McModel, ModelContext, ModelError};
use crate::Particles::mc_particle::McParticle;
use rand::rngs::StdRng;

/// Irreversible first-order reaction A -> B integrated exactly over the particle time step.
/// The consumed amount of A is added to B, so A + B is conserved on every particle.
#[derive(Debug, Clone)]
pub struct FirstOrderReaction {
    pub reactant: usize,
    pub product: Option<usize>,
    /// rate constant [1/s]
    pub rate: f64,
}

impl FirstOrderReaction {
    pub fn new(reactant: usize, product: Option<usize>, rate: f64) -> Self {
        Self {
            reactant,
            product,
            rate,
        }
    }
}

impl McModel for FirstOrderReaction {
    fn update_internals(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, _rng: &mut StdRng) {
        let Some(&a) = p.Phi.get(self.reactant) else {
            return;
        };
        let remaining = a * (-self.rate * ctx.particle_time_step(p)).exp();
        p.Phi[self.reactant] = remaining;
        if let Some(b) = self.product.and_then(|i| p.Phi.get_mut(i)) {
            *b += a - remaining;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoReaction;

impl McModel for NoReaction {
    fn update_internals(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn correct(&mut self, _p: &mut McParticle, _ctx: &ModelContext, _rng: &mut StdRng) {}
}
