//! Bookkeeping of the particle cloud: lost particles, boundary mass fluxes and the per-step
//! report printed after every evolve call.

use crate::Particles::mc_particle::McParticle;
use crate::Statistics::population::PopulationReport;
use log::warn;
use nalgebra::Vector3;
use prettytable::{Table, row};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct LostParticleRecord {
    pub orig_id: usize,
    pub orig_proc: usize,
    pub cell: usize,
    pub position: Vector3<f64>,
    pub m: f64,
}

/// Particles dropped because tracking failed to finish within the sub-step limit
#[derive(Debug, Clone, Default)]
pub struct LostParticles {
    pub records: Vec<LostParticleRecord>,
    pub lost_mass: f64,
    pub lost_momentum: Vector3<f64>,
    /// mass lost per cell, cells without losses are absent
    pub lost_mass_by_cell: BTreeMap<usize, f64>,
}

impl LostParticles {
    pub fn notify(&mut self, p: &McParticle) {
        warn!(
            "particle {}/{} lost in cell {} after {} tracking steps",
            p.orig_proc, p.orig_id, p.cell, p.n_steps
        );
        self.records.push(LostParticleRecord {
            orig_id: p.orig_id,
            orig_proc: p.orig_proc,
            cell: p.cell,
            position: p.position,
            m: p.m,
        });
        self.lost_mass += p.m;
        self.lost_momentum += p.momentum();
        *self.lost_mass_by_cell.entry(p.cell).or_insert(0.0) += p.m;
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }
}

/// Mass crossing open boundaries during one evolve call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundaryFluxes {
    pub mass_in: f64,
    pub mass_out: f64,
    pub n_in: usize,
    pub n_out: usize,
    pub n_reflected: usize,
}

/// Mass budget of the domain: the interior change equals what came in minus what left
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MassBalance {
    pub mass_in: f64,
    pub mass_out: f64,
    pub mass_lost: f64,
    pub delta_mass: f64,
}

impl MassBalance {
    pub fn record(&mut self, fluxes: &BoundaryFluxes, mass_lost: f64, delta_mass: f64) {
        self.mass_in += fluxes.mass_in;
        self.mass_out += fluxes.mass_out;
        self.mass_lost += mass_lost;
        self.delta_mass += delta_mass;
    }

    /// interior change not explained by the boundary fluxes and losses
    pub fn imbalance(&self) -> f64 {
        self.delta_mass - (self.mass_in - self.mass_out - self.mass_lost)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvolveReport {
    pub step: usize,
    pub n_particles: usize,
    pub n_generated: usize,
    pub total_mass: f64,
    /// largest relative change of the averaged density
    pub residual: f64,
    pub max_courant: f64,
    pub fluxes: BoundaryFluxes,
    pub balance: MassBalance,
    pub n_lost: usize,
    pub lost_mass: f64,
    pub population: PopulationReport,
    pub conserved_scalars: Vec<(String, f64)>,
}

impl EvolveReport {
    pub fn pretty_print(&self) {
        let mut table = Table::new();
        table.add_row(row!["Quantity", "Value"]);
        table.add_row(row!["step", self.step]);
        table.add_row(row!["particles", self.n_particles]);
        table.add_row(row!["generated at inlets", self.n_generated]);
        table.add_row(row!["total mass", format!("{:e}", self.total_mass)]);
        table.add_row(row!["density residual", format!("{:e}", self.residual)]);
        table.add_row(row!["max Courant number", format!("{:.4}", self.max_courant)]);
        table.add_row(row!["mass in", format!("{:e}", self.fluxes.mass_in)]);
        table.add_row(row!["mass out", format!("{:e}", self.fluxes.mass_out)]);
        table.add_row(row!["interior mass change", format!("{:e}", self.balance.delta_mass)]);
        table.add_row(row!["reflected at open boundaries", self.fluxes.n_reflected]);
        table.add_row(row!["lost particles", self.n_lost]);
        table.add_row(row!["lost mass", format!("{:e}", self.lost_mass)]);
        table.add_row(row!["cloned", self.population.n_cloned]);
        table.add_row(row!["eliminated", self.population.n_eliminated]);
        table.add_row(row!["empty cells", self.population.n_empty]);
        table.add_row(row!["cells with too few", self.population.n_too_few]);
        table.add_row(row!["cells with too many", self.population.n_too_many]);
        for (name, total) in &self.conserved_scalars {
            table.add_row(row![format!("total {}", name), format!("{:e}", total)]);
        }
        table.printstd();
    }
}
