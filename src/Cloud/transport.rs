//! # Particle Exchange Between Sub-domains
//!
//! A particle that stops on a processor patch leaves the local ensemble and is handed to the
//! transport with the index of the face within that patch. The receiving sub-domain finds its own
//! processor patch facing the sender, places the particle on the same face and resumes tracking
//! with the step fraction the particle arrived with.
//!
//! `exchange` is a synchronisation barrier: every sub-domain sends what it has (possibly nothing)
//! and receives what the others sent. The round is `complete` when no sub-domain has particles in
//! flight any more; a complete round never carries inbound particles.

use crate::Particles::mc_particle::McParticle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No neighbouring sub-domain {processor}")]
    NoNeighbour { processor: usize },
    #[error("Particle exchange failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleTransfer {
    pub particle: McParticle,
    pub from_processor: usize,
    pub to_processor: usize,
    /// index of the face within the processor patch
    pub patch_face: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRound {
    pub inbound: Vec<ParticleTransfer>,
    pub complete: bool,
}

pub trait ParticleTransport {
    fn exchange(&mut self, outbound: Vec<ParticleTransfer>) -> Result<ExchangeRound, TransportError>;
}

/// Transport of a run on a single domain: there is nobody to talk to
#[derive(Debug, Clone, Default)]
pub struct SerialTransport;

impl ParticleTransport for SerialTransport {
    fn exchange(&mut self, outbound: Vec<ParticleTransfer>) -> Result<ExchangeRound, TransportError> {
        if let Some(t) = outbound.first() {
            return Err(TransportError::NoNeighbour {
                processor: t.to_processor,
            });
        }
        Ok(ExchangeRound {
            inbound: Vec::new(),
            complete: true,
        })
    }
}
