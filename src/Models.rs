//! # Models Module
//!
//! Stochastic sub-models that update particle properties once per time step, and the mean flow
//! fields they are closed with.
//!
//! Every model implements `McModel`: `update_internals` prepares cell-level data (interpolators,
//! mean fields, solved potentials) from the current moments and flow fields, `correct` then updates
//! one particle. Model families are closed enums dispatched with `enum_dispatch`.
//!
//! - `flow_fields`: the mean flow state provided by the coupled finite-volume solver
//! - `model_api`: `McModel` trait, `ModelContext`, model family enums and factories
//! - `velocity_models`: simplified Langevin model (SLM) with consistency corrections, frozen velocity
//! - `omega_models`: turbulent frequency from the mean field or from a stochastic model
//! - `mixing_models`: interaction by exchange with the mean (IEM)
//! - `reaction_models`: first-order irreversible reaction
//! - `position_correction`: density-consistency velocity correction from a Poisson potential
//! - `elliptic_solver`: preconditioned conjugate-gradient Poisson solver on the mesh

pub mod elliptic_solver;
pub mod flow_fields;
pub mod mixing_models;
pub mod model_api;
pub mod omega_models;
pub mod position_correction;
pub mod reaction_models;
pub mod velocity_models;

mod elliptic_solver_tests;
