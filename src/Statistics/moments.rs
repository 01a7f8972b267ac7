//! # Time-Averaged Cell Moments
//!
//! For every cell the accumulator keeps raw particle sums
//! ```text
//!   mass     = sum m
//!   volume   = sum m / rho
//!   momentum = sum m U
//!   UU       = sum m U U^T
//!   Phi_i    = sum m phi_i,   PhiPhi_i = sum m phi_i^2
//! ```
//! over real (non-ghost) particles. At every update the sums of the current population are
//! blended into the averaged ones, `new = w * old + (1 - w) * current`, where `w` is the
//! existence weight. Cells without particles keep their previous averaged moments.
//! Derived quantities (density, Favre velocity, Reynolds stress, k, scalar mean and variance,
//! particle number density) are computed from the averaged sums on demand.

use crate::Particles::mc_particle::McParticle;
use log::debug;
use nalgebra::{Matrix3, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub struct CellStatistics {
    pub n_particles: usize,
    pub mass: f64,
    pub volume: f64,
    pub momentum: Vector3<f64>,
    pub uu: Matrix3<f64>,
    pub phi: Vec<f64>,
    pub phi_phi: Vec<f64>,
}

impl CellStatistics {
    pub fn zero(n_scalars: usize) -> Self {
        Self {
            n_particles: 0,
            mass: 0.0,
            volume: 0.0,
            momentum: Vector3::zeros(),
            uu: Matrix3::zeros(),
            phi: vec![0.0; n_scalars],
            phi_phi: vec![0.0; n_scalars],
        }
    }

    pub fn add_particle(&mut self, p: &McParticle) {
        self.n_particles += 1;
        self.mass += p.m;
        if p.rho > 0.0 {
            self.volume += p.m / p.rho;
        }
        self.momentum += p.m * p.UParticle;
        self.uu += p.m * p.UParticle * p.UParticle.transpose();
        for (i, &phi) in p.Phi.iter().enumerate().take(self.phi.len()) {
            self.phi[i] += p.m * phi;
            self.phi_phi[i] += p.m * phi * phi;
        }
    }

    /// self = w * self + (1 - w) * current
    pub fn blend(&mut self, current: &Self, w: f64) {
        let c = 1.0 - w;
        self.n_particles = current.n_particles;
        self.mass = w * self.mass + c * current.mass;
        self.volume = w * self.volume + c * current.volume;
        self.momentum = w * self.momentum + c * current.momentum;
        self.uu = w * self.uu + c * current.uu;
        for i in 0..self.phi.len() {
            self.phi[i] = w * self.phi[i] + c * current.phi[i];
            self.phi_phi[i] = w * self.phi_phi[i] + c * current.phi_phi[i];
        }
    }
}

#[derive(Debug, Clone)]
pub struct MomentAccumulator {
    averaged: Vec<CellStatistics>,
    instantaneous: Vec<CellStatistics>,
    cell_volumes: Vec<f64>,
    n_scalars: usize,
}

impl MomentAccumulator {
    pub fn new(cell_volumes: Vec<f64>, n_scalars: usize) -> Self {
        let n_cells = cell_volumes.len();
        Self {
            averaged: vec![CellStatistics::zero(n_scalars); n_cells],
            instantaneous: vec![CellStatistics::zero(n_scalars); n_cells],
            cell_volumes,
            n_scalars,
        }
    }

    pub fn n_cells(&self) -> usize {
        self.cell_volumes.len()
    }

    pub fn n_scalars(&self) -> usize {
        self.n_scalars
    }

    pub fn averaged(&self) -> &[CellStatistics] {
        &self.averaged
    }

    pub fn instantaneous(&self) -> &[CellStatistics] {
        &self.instantaneous
    }

    /// sums of the current population only
    pub fn instantaneous_moments(&self, particles: &[McParticle]) -> Vec<CellStatistics> {
        let mut current = vec![CellStatistics::zero(self.n_scalars); self.n_cells()];
        for p in particles.iter().filter(|p| !p.is_ghost()) {
            current[p.cell].add_particle(p);
        }
        current
    }

    /// Blends the moments of `particles` into the averages with existence weight `exist_wt`
    pub fn update_cloud_pdf(&mut self, particles: &[McParticle], exist_wt: f64) {
        debug_assert!((0.0..=1.0).contains(&exist_wt));
        let current = self.instantaneous_moments(particles);
        let mut n_empty = 0;
        for (avg, cur) in self.averaged.iter_mut().zip(current.iter()) {
            if cur.n_particles == 0 {
                avg.n_particles = 0;
                n_empty += 1;
            } else {
                avg.blend(cur, exist_wt);
            }
        }
        debug!(
            "cloud moments updated with existence weight {}, {} cells without particles",
            exist_wt, n_empty
        );
        self.instantaneous = current;
    }

    /// PDF density: sum m / sum (m / rho); zero where no particle volume was recorded
    pub fn rho(&self, cell: usize) -> f64 {
        let s = &self.averaged[cell];
        if s.volume > 0.0 { s.mass / s.volume } else { 0.0 }
    }

    /// density of the current population only
    pub fn rho_instantaneous(&self, cell: usize) -> f64 {
        let s = &self.instantaneous[cell];
        if s.volume > 0.0 { s.mass / s.volume } else { 0.0 }
    }

    /// Favre-averaged velocity
    pub fn u(&self, cell: usize) -> Vector3<f64> {
        let s = &self.averaged[cell];
        if s.mass > 0.0 {
            s.momentum / s.mass
        } else {
            Vector3::zeros()
        }
    }

    /// Reynolds stress tensor UU/m - U U^T
    pub fn tau(&self, cell: usize) -> Matrix3<f64> {
        let s = &self.averaged[cell];
        if s.mass > 0.0 {
            let u = s.momentum / s.mass;
            s.uu / s.mass - u * u.transpose()
        } else {
            Matrix3::zeros()
        }
    }

    /// turbulent kinetic energy, half the trace of the Reynolds stress
    pub fn k(&self, cell: usize) -> f64 {
        0.5 * self.tau(cell).trace()
    }

    pub fn phi(&self, cell: usize, scalar: usize) -> f64 {
        let s = &self.averaged[cell];
        if s.mass > 0.0 {
            s.phi[scalar] / s.mass
        } else {
            0.0
        }
    }

    pub fn phi_variance(&self, cell: usize, scalar: usize) -> f64 {
        let s = &self.averaged[cell];
        if s.mass > 0.0 {
            let mean = s.phi[scalar] / s.mass;
            s.phi_phi[scalar] / s.mass - mean * mean
        } else {
            0.0
        }
    }

    /// averaged particle mass per unit cell volume
    pub fn pnd(&self, cell: usize) -> f64 {
        self.averaged[cell].mass / self.cell_volumes[cell]
    }

    /// particle mass per unit cell volume of the current population
    pub fn pnd_instantaneous(&self, cell: usize) -> f64 {
        self.instantaneous[cell].mass / self.cell_volumes[cell]
    }

    pub fn has_statistics(&self, cell: usize) -> bool {
        self.averaged[cell].mass > 0.0
    }
}
