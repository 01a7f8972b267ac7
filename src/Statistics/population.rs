//! # Particle Number Control
//!
//! Keeps the number of particles per cell near the target `Npc`:
//!
//! | status | condition |
//! |--------|-----------|
//! | `Empty` | no particles |
//! | `TooFew` | count < clone_at * Npc |
//! | `TooMany` | count > eliminate_at * Npc |
//! | `Normal` | otherwise |
//!
//! Cloning splits the `min(Npc - count, count)` highest ranked particles into two halves of equal
//! mass. Elimination removes the `count - Npc` lowest ranked particles and merges each of them
//! into a survivor: masses add, velocities and scalars are mass-weighted means. Cell mass,
//! momentum and scalar content are unchanged and every survivor stays inside the range of values
//! present before. Both operations are verified afterwards; a violation is returned as an error.

use crate::Particles::mc_particle::McParticle;
use log::{debug, info};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// relative tolerance of the conservation checks
pub const CONSERVATION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum PopulationError {
    #[error("Cell {cell}: {operation} changed the {quantity} from {before:e} to {after:e}")]
    NotConserved {
        cell: usize,
        operation: &'static str,
        quantity: &'static str,
        before: f64,
        after: f64,
    },
    #[error("Cell {cell}: asked to {operation} {requested} particles, only {available} available")]
    CountMismatch {
        cell: usize,
        operation: &'static str,
        requested: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPopStatus {
    Empty,
    TooFew,
    Normal,
    TooMany,
}

/// Order in which particles are picked for cloning (highest first) and elimination (lowest first)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingKey {
    #[default]
    Mass,
    VelocityMagnitude,
}

impl RankingKey {
    pub fn value(&self, p: &McParticle) -> f64 {
        match self {
            RankingKey::Mass => p.m,
            RankingKey::VelocityMagnitude => p.UParticle.norm(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationReport {
    pub n_empty: usize,
    pub n_too_few: usize,
    pub n_normal: usize,
    pub n_too_many: usize,
    pub n_cloned: usize,
    pub n_eliminated: usize,
    pub empty_cells: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PopulationController {
    pub particles_per_cell: usize,
    pub clone_at: f64,
    pub eliminate_at: f64,
    pub ranking: RankingKey,
}

impl PopulationController {
    pub fn new(particles_per_cell: usize, clone_at: f64, eliminate_at: f64, ranking: RankingKey) -> Self {
        Self {
            particles_per_cell,
            clone_at,
            eliminate_at,
            ranking,
        }
    }

    pub fn classify(&self, count: usize) -> CellPopStatus {
        let target = self.particles_per_cell as f64;
        if count == 0 {
            CellPopStatus::Empty
        } else if (count as f64) < self.clone_at * target {
            CellPopStatus::TooFew
        } else if (count as f64) > self.eliminate_at * target {
            CellPopStatus::TooMany
        } else {
            CellPopStatus::Normal
        }
    }

    /// indices of the real particles of every cell, highest ranked first
    pub fn cell_particle_lists(&self, particles: &[McParticle], n_cells: usize) -> Vec<Vec<usize>> {
        let mut lists = vec![Vec::new(); n_cells];
        for (i, p) in particles.iter().enumerate() {
            if !p.is_ghost() {
                lists[p.cell].push(i);
            }
        }
        for list in lists.iter_mut() {
            list.sort_by(|&a, &b| {
                self.ranking
                    .value(&particles[b])
                    .total_cmp(&self.ranking.value(&particles[a]))
            });
        }
        lists
    }

    /// Classifies every cell and clones or eliminates particles where needed.
    /// New particles get ids starting at `next_id`.
    pub fn control(
        &self,
        particles: &mut Vec<McParticle>,
        n_cells: usize,
        next_id: &mut usize,
    ) -> Result<PopulationReport, PopulationError> {
        let lists = self.cell_particle_lists(particles, n_cells);
        let mut report = PopulationReport::default();
        let mut remove = vec![false; particles.len()];
        let mut clones = Vec::new();
        for (cell, list) in lists.iter().enumerate() {
            match self.classify(list.len()) {
                CellPopStatus::Empty => {
                    report.n_empty += 1;
                    report.empty_cells.push(cell);
                }
                CellPopStatus::Normal => report.n_normal += 1,
                CellPopStatus::TooFew => {
                    report.n_too_few += 1;
                    let n_clone = self.particles_per_cell.saturating_sub(list.len()).min(list.len());
                    let new = self.clone_particles(particles, cell, list, n_clone, next_id)?;
                    report.n_cloned += new.len();
                    clones.extend(new);
                }
                CellPopStatus::TooMany => {
                    report.n_too_many += 1;
                    let n_eliminate = list.len().saturating_sub(self.particles_per_cell);
                    report.n_eliminated +=
                        self.eliminate_particles(particles, cell, list, n_eliminate, &mut remove)?;
                }
            }
        }
        if report.n_eliminated > 0 {
            let mut flags = remove.into_iter();
            particles.retain(|_| !flags.next().unwrap_or(false));
        }
        particles.extend(clones);
        if report.n_too_few + report.n_too_many > 0 {
            info!(
                "population control: {} cloned in {} cells, {} eliminated in {} cells, {} empty cells",
                report.n_cloned, report.n_too_few, report.n_eliminated, report.n_too_many, report.n_empty
            );
        }
        Ok(report)
    }

    /// Halves the mass of the `n_clone` first particles of `list` and returns their copies
    pub fn clone_particles(
        &self,
        particles: &mut [McParticle],
        cell: usize,
        list: &[usize],
        n_clone: usize,
        next_id: &mut usize,
    ) -> Result<Vec<McParticle>, PopulationError> {
        if n_clone > list.len() {
            return Err(PopulationError::CountMismatch {
                cell,
                operation: "clone",
                requested: n_clone,
                available: list.len(),
            });
        }
        let (mass_before, momentum_before, _) = cell_totals(particles, list, 0);
        let mut clones = Vec::with_capacity(n_clone);
        for &i in &list[..n_clone] {
            particles[i].m *= 0.5;
            let mut copy = particles[i].clone();
            copy.orig_id = *next_id;
            *next_id += 1;
            clones.push(copy);
        }
        let (mass_kept, momentum_kept, _) = cell_totals(particles, list, 0);
        let mass_after = mass_kept + clones.iter().map(|p| p.m).sum::<f64>();
        let momentum_after = clones
            .iter()
            .fold(momentum_kept, |acc, p| acc + p.momentum());
        check_conserved(cell, "cloning", "mass", mass_before, mass_after)?;
        check_conserved_vector(cell, "cloning", momentum_before, momentum_after, mass_before)?;
        debug!("cell {}: {} particles cloned", cell, n_clone);
        Ok(clones)
    }

    /// Marks the `n_eliminate` last particles of `list` for removal and merges them into survivors.
    /// Returns the number of particles marked.
    pub fn eliminate_particles(
        &self,
        particles: &mut [McParticle],
        cell: usize,
        list: &[usize],
        n_eliminate: usize,
        remove: &mut [bool],
    ) -> Result<usize, PopulationError> {
        if n_eliminate >= list.len() {
            return Err(PopulationError::CountMismatch {
                cell,
                operation: "eliminate",
                requested: n_eliminate,
                available: list.len(),
            });
        }
        if n_eliminate == 0 {
            return Ok(0);
        }
        let n_scalars = list
            .first()
            .map_or(0, |&i| particles[i].Phi.len());
        let (mass_before, momentum_before, phi_before) = cell_totals(particles, list, n_scalars);
        let survivors = &list[..list.len() - n_eliminate];
        for &i in &list[list.len() - n_eliminate..] {
            remove[i] = true;
        }
        // every eliminated particle is absorbed by a survivor, lowest ranked survivors first
        for (k, &r) in list[list.len() - n_eliminate..].iter().enumerate() {
            let s = survivors[survivors.len() - 1 - k % survivors.len()];
            let removed = particles[r].clone();
            absorb(&mut particles[s], &removed);
        }

        let (mass_after, momentum_after, phi_after) = cell_totals(particles, survivors, n_scalars);
        check_conserved(cell, "elimination", "mass", mass_before, mass_after)?;
        check_conserved_vector(cell, "elimination", momentum_before, momentum_after, mass_before)?;
        for (b, a) in phi_before.iter().zip(phi_after.iter()) {
            let scale = mass_before * b.abs().max(1.0);
            if (b - a).abs() > CONSERVATION_TOLERANCE * scale {
                return Err(PopulationError::NotConserved {
                    cell,
                    operation: "elimination",
                    quantity: "scalar content",
                    before: *b,
                    after: *a,
                });
            }
        }
        debug!("cell {}: {} particles eliminated", cell, n_eliminate);
        Ok(n_eliminate)
    }
}

/// Merges `other` into `p`: masses add, velocities, frequency and scalars become mass-weighted means
fn absorb(p: &mut McParticle, other: &McParticle) {
    let m = p.m + other.m;
    let (wp, wo) = (p.m / m, other.m / m);
    p.UParticle = wp * p.UParticle + wo * other.UParticle;
    p.Ucorrection = wp * p.Ucorrection + wo * other.Ucorrection;
    p.Utracking = wp * p.Utracking + wo * other.Utracking;
    p.Omega = wp * p.Omega + wo * other.Omega;
    for (phi, o) in p.Phi.iter_mut().zip(other.Phi.iter()) {
        *phi = wp * *phi + wo * o;
    }
    p.m = m;
}

/// mass, momentum and scalar content of the listed particles
fn cell_totals(particles: &[McParticle], list: &[usize], n_scalars: usize) -> (f64, Vector3<f64>, Vec<f64>) {
    let mut mass = 0.0;
    let mut momentum = Vector3::zeros();
    let mut phi = vec![0.0; n_scalars];
    for &i in list {
        let p = &particles[i];
        mass += p.m;
        momentum += p.momentum();
        for (total, value) in phi.iter_mut().zip(p.Phi.iter()) {
            *total += p.m * value;
        }
    }
    (mass, momentum, phi)
}

fn check_conserved(
    cell: usize,
    operation: &'static str,
    quantity: &'static str,
    before: f64,
    after: f64,
) -> Result<(), PopulationError> {
    if (before - after).abs() > CONSERVATION_TOLERANCE * before.abs().max(f64::MIN_POSITIVE) {
        return Err(PopulationError::NotConserved {
            cell,
            operation,
            quantity,
            before,
            after,
        });
    }
    Ok(())
}

fn check_conserved_vector(
    cell: usize,
    operation: &'static str,
    before: Vector3<f64>,
    after: Vector3<f64>,
    mass: f64,
) -> Result<(), PopulationError> {
    // momentum is compared on the scale of the cell mass times a unit velocity or the mean velocity
    let scale = mass * (before.norm() / mass.max(f64::MIN_POSITIVE)).max(1.0);
    if (before - after).norm() > CONSERVATION_TOLERANCE * scale {
        return Err(PopulationError::NotConserved {
            cell,
            operation,
            quantity: "momentum",
            before: before.norm(),
            after: after.norm(),
        });
    }
    Ok(())
}
