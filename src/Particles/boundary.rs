//! # Boundary Handlers
//!
//! One handler per boundary patch decides what happens to a particle that reaches a face of the
//! patch, and may create new particles at the start of every time step.
//!
//! | Handler | on hit | before move |
//! |---------|--------|-------------|
//! | `WallReflection` | specular reflection of all velocities | - |
//! | `InletOutlet` | reflect if the prescribed flow enters the domain, remove otherwise | injects ghost particles carrying the inflow mass |
//! | `OutletDeletion` | remove, count mass out | - |
//! | `PeriodicWrap` | move to the coupled face, rotate vectors for rotational periodicity | - |
//!
//! Wedge, empty and processor patches have no handler; tracking handles them directly.
//!
//! Injected particles are ghosts (`ghost = 1`): they take part in tracking in the step they are
//! created, with a random fraction of the step, and are admitted as real particles after tracking.

use crate::Cloud::diagnostics::BoundaryFluxes;
use crate::Mesh::PolyMesh::{PatchKind, PolyMesh};
use crate::Mesh::tet_decomposition::TetFacePointCellDecomposition;
use crate::Particles::mc_particle::McParticle;
use crate::Particles::tracking::TrackData;
use enum_dispatch::enum_dispatch;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

/// relative distance an injected particle is moved from the face towards the cell centre
pub const INLET_OFFSET: f64 = 1e-6;

pub struct HitContext<'a> {
    pub mesh: &'a PolyMesh,
    pub decomposition: &'a TetFacePointCellDecomposition,
    pub fluxes: &'a mut BoundaryFluxes,
}

pub struct GenerationContext<'a> {
    pub mesh: &'a PolyMesh,
    pub decomposition: &'a TetFacePointCellDecomposition,
    pub delta_t: f64,
    pub particles_per_cell: usize,
}

#[enum_dispatch]
pub trait BoundaryHandler {
    /// index of the patch this handler serves
    fn patch(&self) -> usize;

    /// particles created on the patch before tracking starts
    fn before_move(&mut self, _ctx: &GenerationContext, _rng: &mut StdRng) -> Vec<McParticle> {
        Vec::new()
    }

    /// applies the boundary condition to a particle sitting on `face`
    fn hit_patch(&mut self, p: &mut McParticle, td: &mut TrackData, face: usize, ctx: &mut HitContext);
}

#[derive(Debug, Clone)]
#[enum_dispatch(BoundaryHandler)]
pub enum McBoundary {
    WallReflection(WallReflection),
    InletOutlet(InletOutlet),
    OutletDeletion(OutletDeletion),
    PeriodicWrap(PeriodicWrap),
}

#[derive(Debug, Clone)]
pub struct WallReflection {
    pub patch: usize,
}

impl WallReflection {
    pub fn new(patch: usize) -> Self {
        Self { patch }
    }
}

impl BoundaryHandler for WallReflection {
    fn patch(&self) -> usize {
        self.patch
    }

    fn hit_patch(&mut self, p: &mut McParticle, _td: &mut TrackData, face: usize, ctx: &mut HitContext) {
        p.reflect(&ctx.mesh.face_unit_normal(face));
    }
}

/// Open boundary with a prescribed state
#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct InletOutlet {
    pub patch: usize,
    pub velocity: Vector3<f64>,
    pub density: f64,
    /// standard deviation of every velocity component of injected particles
    pub velocity_fluctuation: f64,
    pub omega: f64,
    pub Phi: Vec<f64>,
}

impl InletOutlet {
    #[allow(non_snake_case)]
    pub fn new(
        patch: usize,
        velocity: Vector3<f64>,
        density: f64,
        velocity_fluctuation: f64,
        omega: f64,
        Phi: Vec<f64>,
    ) -> Self {
        Self {
            patch,
            velocity,
            density,
            velocity_fluctuation,
            omega,
            Phi,
        }
    }

    /// volume flux entering the domain through `face`, zero for outflow
    pub fn inflow_rate(&self, mesh: &PolyMesh, face: usize) -> f64 {
        (-self.velocity.dot(&mesh.face_area(face))).max(0.0)
    }
}

impl BoundaryHandler for InletOutlet {
    fn patch(&self) -> usize {
        self.patch
    }

    fn before_move(&mut self, ctx: &GenerationContext, rng: &mut StdRng) -> Vec<McParticle> {
        let mesh = ctx.mesh;
        let mut generated = Vec::new();
        for face in mesh.patches()[self.patch].faces() {
            let inflow_volume = self.inflow_rate(mesh, face) * ctx.delta_t;
            if inflow_volume <= 0.0 {
                continue;
            }
            let cell = mesh.face_owner(face);
            let n_gen = ((ctx.particles_per_cell as f64 * inflow_volume / mesh.cell_volume(cell))
                .round() as usize)
                .max(1);
            let m = self.density * inflow_volume / n_gen as f64;
            let tets = ctx.decomposition.face_tets(cell, face);
            if tets.is_empty() {
                continue;
            }
            let areas: Vec<f64> = tets
                .iter()
                .map(|&t| ctx.decomposition.tet(t).base_area())
                .collect();
            let total_area: f64 = areas.iter().sum();
            for _ in 0..n_gen {
                let mut target = rng.random::<f64>() * total_area;
                let mut tet = tets[tets.len() - 1];
                for (&t, &a) in tets.iter().zip(areas.iter()) {
                    target -= a;
                    if target <= 0.0 {
                        tet = t;
                        break;
                    }
                }
                let on_face = ctx.decomposition.random_point_on_face_triangle(tet, rng);
                let position = on_face + INLET_OFFSET * (ctx.decomposition.tet(tet).d - on_face);
                let fluctuation = Vector3::new(
                    rng.sample::<f64, _>(StandardNormal),
                    rng.sample::<f64, _>(StandardNormal),
                    rng.sample::<f64, _>(StandardNormal),
                ) * self.velocity_fluctuation;
                let mut p = McParticle::new(
                    mesh,
                    position,
                    cell,
                    tet,
                    m,
                    self.velocity + fluctuation,
                    self.Phi.clone(),
                    Vector3::zeros(),
                    1,
                );
                p.Omega = self.omega;
                p.rho = self.density;
                p.on_inlet_boundary = true;
                generated.push(p);
            }
        }
        debug!(
            "patch {}: {} ghost particles injected",
            mesh.patches()[self.patch].name,
            generated.len()
        );
        generated
    }

    fn hit_patch(&mut self, p: &mut McParticle, td: &mut TrackData, face: usize, ctx: &mut HitContext) {
        if p.is_ghost() {
            td.keep_particle = false;
            return;
        }
        if self.inflow_rate(ctx.mesh, face) > 0.0 {
            p.reflect(&ctx.mesh.face_unit_normal(face));
            p.reflected_at_open_boundary = true;
            ctx.fluxes.n_reflected += 1;
        } else {
            td.keep_particle = false;
            ctx.fluxes.mass_out += p.m;
            ctx.fluxes.n_out += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutletDeletion {
    pub patch: usize,
}

impl OutletDeletion {
    pub fn new(patch: usize) -> Self {
        Self { patch }
    }
}

impl BoundaryHandler for OutletDeletion {
    fn patch(&self) -> usize {
        self.patch
    }

    fn hit_patch(&mut self, p: &mut McParticle, td: &mut TrackData, _face: usize, ctx: &mut HitContext) {
        td.keep_particle = false;
        if !p.is_ghost() {
            ctx.fluxes.mass_out += p.m;
            ctx.fluxes.n_out += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeriodicWrap {
    pub patch: usize,
    pub neighbour_patch: usize,
    pub rotation: Option<Matrix3<f64>>,
}

impl PeriodicWrap {
    /// reads the coupling from the patch kind, `None` for non-periodic patches
    pub fn from_mesh(mesh: &PolyMesh, patch: usize) -> Option<Self> {
        match &mesh.patches()[patch].kind {
            PatchKind::Periodic {
                neighbour_patch,
                rotation,
            } => Some(Self {
                patch,
                neighbour_patch: *neighbour_patch,
                rotation: *rotation,
            }),
            _ => None,
        }
    }

    pub fn coupled_face(&self, mesh: &PolyMesh, face: usize) -> usize {
        let patches = mesh.patches();
        patches[self.neighbour_patch].start + (face - patches[self.patch].start)
    }
}

impl BoundaryHandler for PeriodicWrap {
    fn patch(&self) -> usize {
        self.patch
    }

    fn hit_patch(&mut self, p: &mut McParticle, _td: &mut TrackData, face: usize, ctx: &mut HitContext) {
        let mesh = ctx.mesh;
        let coupled = self.coupled_face(mesh, face);
        let offset = p.position - mesh.face_centre(face);
        let rotated = match &self.rotation {
            Some(r) => r * offset,
            None => offset,
        };
        let new_position = mesh.face_centre(coupled) + rotated;
        p.transform_separation(&(new_position - p.position));
        if let Some(r) = &self.rotation {
            p.transform_properties(r);
        }
        p.position = new_position;
        p.cell = mesh.face_owner(coupled);
        p.tet = ctx
            .decomposition
            .nearest_tet_on_face(p.cell, coupled, &new_position)
            .unwrap_or_else(|| ctx.decomposition.nearest_tet(p.cell, &new_position));
        p.face = None;
    }
}
