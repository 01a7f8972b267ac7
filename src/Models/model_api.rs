//! # Model Interface
//!
//! All stochastic sub-models share the `McModel` trait. Each physical process has a closed family
//! of implementations collected in an enum dispatched with `enum_dispatch`, so the cloud owns
//! one value per process and calls the trait methods without boxing:
//!
//! | Family | Variants |
//! |--------|----------|
//! | `VelocityModel` | `SLMFull`, `Frozen` |
//! | `OmegaModel` | `MeanFrequency`, `Stochastic` |
//! | `MixingModel` | `IEM`, `NoMixing` |
//! | `ReactionModel` | `FirstOrder`, `NoReaction` |
//! | `PositionCorrection` | `Integrated`, `NoCorrection` |
//!
//! The `create_*` functions build a family member from its configuration section.

use crate::Cloud::config::{
    McSolution, MixingModelConfig, OmegaModelConfig, PositionCorrectionConfig, ReactionModelConfig,
    VelocityModelConfig,
};
use crate::Mesh::PolyMesh::PolyMesh;
use crate::Mesh::tet_decomposition::TetFacePointCellDecomposition;
use crate::Models::elliptic_solver::{PcgPoissonSolver, SolverError};
use crate::Models::flow_fields::FlowFields;
use crate::Models::mixing_models::{IEMMixingModel, NoMixing};
use crate::Models::omega_models::{MeanFrequencyOmegaModel, StochasticOmegaModel};
use crate::Models::position_correction::{IntegratedPositionCorrection, NoPositionCorrection};
use crate::Models::reaction_models::{FirstOrderReaction, NoReaction};
use crate::Models::velocity_models::{FrozenVelocityModel, SLMFullVelocityModel};
use crate::Particles::mc_particle::McParticle;
use crate::Statistics::moments::MomentAccumulator;
use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("Unknown scalar '{0}'")]
    UnknownScalar(String),
}

/// Read-only state a model may use while updating
pub struct ModelContext<'a> {
    pub mesh: &'a PolyMesh,
    pub decomposition: &'a TetFacePointCellDecomposition,
    pub moments: &'a MomentAccumulator,
    pub fields: &'a dyn FlowFields,
    /// global time step; particles integrate over `eta * delta_t`
    pub delta_t: f64,
}

impl ModelContext<'_> {
    pub fn particle_time_step(&self, p: &McParticle) -> f64 {
        p.eta * self.delta_t
    }
}

#[enum_dispatch]
pub trait McModel {
    /// prepares cell-level data from the current moments and flow fields
    fn update_internals(&mut self, ctx: &ModelContext) -> Result<(), ModelError>;
    /// updates one particle over its time step
    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, rng: &mut StdRng);
}

#[derive(Debug, Clone)]
#[enum_dispatch(McModel)]
pub enum VelocityModel {
    SLMFull(SLMFullVelocityModel),
    Frozen(FrozenVelocityModel),
}

#[derive(Debug, Clone)]
#[enum_dispatch(McModel)]
pub enum OmegaModel {
    MeanFrequency(MeanFrequencyOmegaModel),
    Stochastic(StochasticOmegaModel),
}

#[derive(Debug, Clone)]
#[enum_dispatch(McModel)]
pub enum MixingModel {
    IEM(IEMMixingModel),
    NoMixing(NoMixing),
}

#[derive(Debug, Clone)]
#[enum_dispatch(McModel)]
pub enum ReactionModel {
    FirstOrder(FirstOrderReaction),
    NoReaction(NoReaction),
}

#[derive(Debug)]
#[enum_dispatch(McModel)]
pub enum PositionCorrection {
    Integrated(IntegratedPositionCorrection),
    NoCorrection(NoPositionCorrection),
}

#[allow(non_snake_case)]
pub fn create_velocity_model(config: &VelocityModelConfig) -> VelocityModel {
    match config {
        VelocityModelConfig::SLMFull {
            C0,
            C1,
            U_relaxation_time,
            k_relaxation_time,
        } => SLMFullVelocityModel::new(*C0, *C1, *U_relaxation_time, *k_relaxation_time).into(),
        VelocityModelConfig::Frozen => FrozenVelocityModel.into(),
    }
}

#[allow(non_snake_case)]
pub fn create_omega_model(config: &OmegaModelConfig) -> OmegaModel {
    match config {
        OmegaModelConfig::MeanFrequency { C_Omega } => MeanFrequencyOmegaModel::new(*C_Omega).into(),
        OmegaModelConfig::Stochastic { C3, C4 } => StochasticOmegaModel::new(*C3, *C4).into(),
    }
}

#[allow(non_snake_case)]
pub fn create_mixing_model(solution: &McSolution) -> Result<MixingModel, ModelError> {
    match &solution.mixing_model {
        MixingModelConfig::IEM { C_phi } => {
            let mixed = solution
                .mixed_scalars
                .iter()
                .map(|name| {
                    solution
                        .scalar_index(name)
                        .ok_or_else(|| ModelError::UnknownScalar(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(IEMMixingModel::new(*C_phi, mixed).into())
        }
        MixingModelConfig::NoMixing => Ok(NoMixing.into()),
    }
}

pub fn create_reaction_model(solution: &McSolution) -> Result<ReactionModel, ModelError> {
    match &solution.reaction_model {
        ReactionModelConfig::NoReaction => Ok(NoReaction.into()),
        ReactionModelConfig::FirstOrder {
            reactant,
            product,
            rate,
        } => {
            let reactant_index = solution
                .scalar_index(reactant)
                .ok_or_else(|| ModelError::UnknownScalar(reactant.clone()))?;
            let product_index = match product {
                Some(name) => Some(
                    solution
                        .scalar_index(name)
                        .ok_or_else(|| ModelError::UnknownScalar(name.clone()))?,
                ),
                None => None,
            };
            Ok(FirstOrderReaction::new(reactant_index, product_index, *rate).into())
        }
    }
}

pub fn create_position_correction(config: &PositionCorrectionConfig) -> PositionCorrection {
    match config {
        PositionCorrectionConfig::Integrated {
            relaxation,
            tolerance,
            max_iterations,
        } => IntegratedPositionCorrection::new(
            *relaxation,
            Box::new(PcgPoissonSolver::new(*tolerance, *max_iterations)),
        )
        .into(),
        PositionCorrectionConfig::NoCorrection => NoPositionCorrection.into(),
    }
}
