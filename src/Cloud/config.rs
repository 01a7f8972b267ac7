//! # Solution Settings of the Particle Cloud
//!
//! `McSolution` collects every numerical and model parameter of the Monte-Carlo solver. It is a
//! serde document with defaults for every field, read from JSON text or a file and checked with
//! `validate()` before the cloud is built.
//!
//! ```json
//! {
//!   "delta_t": 1e-3,
//!   "particles_per_cell": 30,
//!   "scalar_names": ["z", "A", "B"],
//!   "mixed_scalars": ["z", "A", "B"],
//!   "velocity_model": {"type": "SLMFull", "C0": 2.1},
//!   "reaction_model": {"type": "FirstOrder", "reactant": "A", "product": "B", "rate": 5.0},
//!   "boundaries": {"xmin": {"type": "InletOutlet", "velocity": [1.0, 0.0, 0.0], "density": 1.2}}
//! }
//! ```

use crate::Statistics::population::RankingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum VelocityModelConfig {
    /// simplified Langevin model with optional relaxation towards the finite-volume state
    SLMFull {
        #[serde(default = "default_c0")]
        C0: f64,
        /// 1.0 switches the Reynolds-stress term on, 0.0 off
        #[serde(default = "default_one")]
        C1: f64,
        #[serde(default)]
        U_relaxation_time: Option<f64>,
        #[serde(default)]
        k_relaxation_time: Option<f64>,
    },
    Frozen,
}

impl Default for VelocityModelConfig {
    fn default() -> Self {
        VelocityModelConfig::SLMFull {
            C0: default_c0(),
            C1: 1.0,
            U_relaxation_time: None,
            k_relaxation_time: None,
        }
    }
}

#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OmegaModelConfig {
    MeanFrequency {
        #[serde(default = "default_one")]
        C_Omega: f64,
    },
    Stochastic {
        #[serde(default = "default_one")]
        C3: f64,
        #[serde(default = "default_c4")]
        C4: f64,
    },
}

impl Default for OmegaModelConfig {
    fn default() -> Self {
        OmegaModelConfig::MeanFrequency { C_Omega: 1.0 }
    }
}

#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum MixingModelConfig {
    IEM {
        #[serde(default = "default_c_phi")]
        C_phi: f64,
    },
    #[serde(rename = "None")]
    NoMixing,
}

impl Default for MixingModelConfig {
    fn default() -> Self {
        MixingModelConfig::IEM {
            C_phi: default_c_phi(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type")]
pub enum ReactionModelConfig {
    #[default]
    #[serde(rename = "None")]
    NoReaction,
    /// reactant -> product with rate constant `rate` [1/s]
    FirstOrder {
        reactant: String,
        #[serde(default)]
        product: Option<String>,
        rate: f64,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum PositionCorrectionConfig {
    Integrated {
        #[serde(default = "default_relaxation")]
        relaxation: f64,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
    },
    #[serde(rename = "None")]
    NoCorrection,
}

impl Default for PositionCorrectionConfig {
    fn default() -> Self {
        PositionCorrectionConfig::Integrated {
            relaxation: default_relaxation(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LocalTimeSteppingConfig {
    pub enabled: bool,
    pub max_courant: f64,
}

impl Default for LocalTimeSteppingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_courant: 0.5,
        }
    }
}

/// Wedge geometry of axi-symmetric cases
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AxisymmetricConfig {
    /// direction of the symmetry axis, which passes through the origin
    pub axis: [f64; 3],
    pub centre_plane_normal: [f64; 3],
    /// wedge opening angle [rad]
    pub opening_angle: f64,
}

/// Boundary handler options of one patch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum BoundaryConfig {
    Wall,
    Outlet,
    InletOutlet {
        velocity: [f64; 3],
        density: f64,
        #[serde(default)]
        velocity_fluctuation: f64,
        #[serde(default)]
        omega: f64,
        /// values in the order of `scalar_names`
        #[serde(default)]
        scalars: Vec<f64>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct McSolution {
    pub delta_t: f64,
    pub particles_per_cell: usize,
    pub clone_at: f64,
    pub eliminate_at: f64,
    /// weight of the previous averages when the moments are updated
    pub exist_weight: f64,
    pub random_seed: u64,
    pub ranking: RankingKey,
    pub scalar_names: Vec<String>,
    pub mixed_scalars: Vec<String>,
    pub conserved_scalars: Vec<String>,
    pub velocity_model: VelocityModelConfig,
    pub omega_model: OmegaModelConfig,
    pub mixing_model: MixingModelConfig,
    pub reaction_model: ReactionModelConfig,
    pub position_correction: PositionCorrectionConfig,
    pub local_time_stepping: LocalTimeSteppingConfig,
    pub axisymmetric: Option<AxisymmetricConfig>,
    pub boundaries: HashMap<String, BoundaryConfig>,
    pub check_population_health: bool,
}

impl Default for McSolution {
    fn default() -> Self {
        Self {
            delta_t: 1e-3,
            particles_per_cell: 20,
            clone_at: 0.5,
            eliminate_at: 1.5,
            exist_weight: 0.8,
            random_seed: 42,
            ranking: RankingKey::Mass,
            scalar_names: Vec::new(),
            mixed_scalars: Vec::new(),
            conserved_scalars: Vec::new(),
            velocity_model: VelocityModelConfig::default(),
            omega_model: OmegaModelConfig::default(),
            mixing_model: MixingModelConfig::default(),
            reaction_model: ReactionModelConfig::default(),
            position_correction: PositionCorrectionConfig::default(),
            local_time_stepping: LocalTimeSteppingConfig::default(),
            axisymmetric: None,
            boundaries: HashMap::new(),
            check_population_health: false,
        }
    }
}

impl McSolution {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let solution: McSolution = serde_json::from_str(text)?;
        solution.validate()?;
        Ok(solution)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn scalar_index(&self, name: &str) -> Option<usize> {
        self.scalar_names.iter().position(|n| n == name)
    }

    pub fn n_scalars(&self) -> usize {
        self.scalar_names.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.delta_t > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "delta_t must be positive, got {}",
                self.delta_t
            )));
        }
        if self.particles_per_cell == 0 {
            return Err(ConfigError::Invalid(
                "particles_per_cell must be positive".to_string(),
            ));
        }
        if !(self.clone_at > 0.0 && self.clone_at < self.eliminate_at) {
            return Err(ConfigError::Invalid(format!(
                "need 0 < clone_at < eliminate_at, got {} and {}",
                self.clone_at, self.eliminate_at
            )));
        }
        if !(0.0..=1.0).contains(&self.exist_weight) {
            return Err(ConfigError::Invalid(format!(
                "exist_weight must lie in [0, 1], got {}",
                self.exist_weight
            )));
        }
        for name in self.mixed_scalars.iter().chain(self.conserved_scalars.iter()) {
            if self.scalar_index(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown scalar '{}'", name)));
            }
        }
        if let VelocityModelConfig::SLMFull {
            C0,
            U_relaxation_time,
            k_relaxation_time,
            ..
        } = &self.velocity_model
        {
            if *C0 <= 0.0 {
                return Err(ConfigError::Invalid(format!("C0 must be positive, got {}", C0)));
            }
            for tau in [U_relaxation_time, k_relaxation_time].into_iter().flatten() {
                if *tau <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "relaxation times must be positive, got {}",
                        tau
                    )));
                }
            }
        }
        if let ReactionModelConfig::FirstOrder {
            reactant,
            product,
            rate,
        } = &self.reaction_model
        {
            for name in std::iter::once(reactant).chain(product.iter()) {
                if self.scalar_index(name).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "reaction refers to unknown scalar '{}'",
                        name
                    )));
                }
            }
            if *rate < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "reaction rate must be non-negative, got {}",
                    rate
                )));
            }
        }
        if let PositionCorrectionConfig::Integrated {
            relaxation,
            tolerance,
            max_iterations,
        } = &self.position_correction
        {
            if *relaxation < 0.0 || *tolerance <= 0.0 || *max_iterations == 0 {
                return Err(ConfigError::Invalid(
                    "position correction needs relaxation >= 0, tolerance > 0 and max_iterations > 0"
                        .to_string(),
                ));
            }
        }
        if self.local_time_stepping.max_courant <= 0.0 {
            return Err(ConfigError::Invalid(
                "local_time_stepping.max_courant must be positive".to_string(),
            ));
        }
        if let Some(axi) = &self.axisymmetric {
            let axis_norm = axi.axis.iter().map(|a| a * a).sum::<f64>().sqrt();
            if axis_norm == 0.0 || !(axi.opening_angle > 0.0 && axi.opening_angle < std::f64::consts::PI) {
                return Err(ConfigError::Invalid(
                    "axisymmetric needs a non-zero axis and an opening angle in (0, pi)".to_string(),
                ));
            }
        }
        for (patch, boundary) in &self.boundaries {
            if let BoundaryConfig::InletOutlet {
                density,
                scalars,
                velocity_fluctuation,
                ..
            } = boundary
            {
                if *density <= 0.0 || *velocity_fluctuation < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "patch '{}': density must be positive and velocity_fluctuation non-negative",
                        patch
                    )));
                }
                if !scalars.is_empty() && scalars.len() != self.n_scalars() {
                    return Err(ConfigError::Invalid(format!(
                        "patch '{}' sets {} scalars, {} are declared",
                        patch,
                        scalars.len(),
                        self.n_scalars()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_c0() -> f64 {
    2.1
}
fn default_one() -> f64 {
    1.0
}
fn default_c4() -> f64 {
    0.25
}
fn default_c_phi() -> f64 {
    2.0
}
fn default_relaxation() -> f64 {
    0.5
}
fn default_tolerance() -> f64 {
    1e-8
}
fn default_max_iterations() -> usize {
    2000
}
