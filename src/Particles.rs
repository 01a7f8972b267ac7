//! # Particles Module
//!
//! Notional particles of the Monte-Carlo PDF method and their motion through the mesh.
//!
//! ## Submodules
//! - `mc_particle`: the particle record (position, cell/tetrahedron, mass, velocity, scalars, ...)
//! - `tracking`: sub-stepped tracking of a particle over one time step, face hits and dispatch
//! - `boundary`: boundary handlers (walls, inlets/outlets, periodic wrap) and inlet injection

pub mod boundary;
pub mod mc_particle;
pub mod tracking;
