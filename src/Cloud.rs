//! # Cloud Module
//!
//! The particle cloud ties the mesh, the particles, the statistics and the models together and
//! advances the ensemble one time step at a time.
//!
//! ## Submodules
//! - `McParticleCloud`: the orchestrator with the `evolve()` cycle, particle release and health checks
//! - `config`: `McSolution`, the JSON-configurable solver settings
//! - `transport`: particle exchange between sub-domains of a decomposed mesh
//! - `diagnostics`: lost particles, boundary mass fluxes, mass budget and step reports

pub mod McParticleCloud;
pub mod config;
pub mod diagnostics;
pub mod transport;

mod cloud_tests;
