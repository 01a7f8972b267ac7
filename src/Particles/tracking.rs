//! # Particle Tracking
//!
//! Moves a particle with its tracking velocity over its share of the time step. The motion is
//! split into sub-steps that end either at the destination or on a mesh face:
//! ```text
//!  tEnd = (1 - stepFraction) * trackTime,  dtMax = tEnd
//!  while keep && !switchProcessor && tEnd > 0:
//!      dt   = min(dtMax, tEnd)
//!      tf   = trackToFace(position + dt * Utracking)
//!      dt  *= tf;  tEnd -= dt;  stepFraction = 1 - tEnd / trackTime
//!      on a face: cross it, or apply the boundary condition of its patch
//! ```
//! Within a cell the particle walks from tetrahedron to tetrahedron using the barycentric exit
//! test. A particle that needs more than `MAX_TRACKING_STEPS` sub-steps in one evolve call is
//! reported as lost and removed.

use crate::Cloud::diagnostics::{BoundaryFluxes, LostParticles};
use crate::Mesh::PolyMesh::{PatchKind, PolyMesh};
use crate::Mesh::tet_decomposition::{TetFacePointCellDecomposition, TetLink};
use crate::Particles::boundary::{BoundaryHandler, HitContext, McBoundary};
use crate::Particles::mc_particle::McParticle;
use log::{debug, warn};
use nalgebra::Vector3;
use rand::Rng;
use rand::rngs::StdRng;

pub const MAX_TRACKING_STEPS: usize = 1000;
/// fractions of the remaining displacement above 1 - TRACK_TOLERANCE reach the destination
pub const TRACK_TOLERANCE: f64 = 1e-9;
const PROBE_FRACTION: f64 = 1e-6;

/// Outcome flags of one move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackData {
    pub keep_particle: bool,
    pub switch_processor: bool,
}

impl Default for TrackData {
    fn default() -> Self {
        Self {
            keep_particle: true,
            switch_processor: false,
        }
    }
}

pub struct TrackingContext<'a> {
    pub mesh: &'a PolyMesh,
    pub decomposition: &'a TetFacePointCellDecomposition,
    /// one entry per patch
    pub handlers: &'a mut [Option<McBoundary>],
    pub rng: &'a mut StdRng,
    pub lost: &'a mut LostParticles,
    pub fluxes: &'a mut BoundaryFluxes,
}

impl McParticle {
    /// Moves the particle in a straight line towards `end`, stopping on the first mesh face.
    /// Returns the fraction of the displacement travelled; `self.face` is set when a face was hit.
    pub fn track_to_face(
        &mut self,
        end: Vector3<f64>,
        decomposition: &TetFacePointCellDecomposition,
    ) -> f64 {
        self.face = None;
        let total = end - self.position;
        if total.norm_squared() == 0.0 {
            return 1.0;
        }
        let mut travelled = 0.0;
        let n_cell_tets = decomposition.cell_tetrahedra()[self.cell].len();
        let max_walk = 4 * n_cell_tets + 8;
        // consecutive zero-length moves, e.g. when the ray starts on an edge or vertex
        let mut stalled = 0;
        for _ in 0..max_walk {
            let remaining = total * (1.0 - travelled);
            let (t, exit) = decomposition.tet(self.tet).exit_fraction(&self.position, &remaining);
            match exit {
                Some(vertex) if t < 1.0 - TRACK_TOLERANCE => {
                    if t <= TRACK_TOLERANCE {
                        stalled += 1;
                        if stalled > n_cell_tets {
                            let probe = self.position + remaining * PROBE_FRACTION;
                            self.tet = decomposition.nearest_tet(self.cell, &probe);
                            stalled = 0;
                            continue;
                        }
                    } else {
                        stalled = 0;
                    }
                    self.position += remaining * t;
                    travelled += (1.0 - travelled) * t;
                    match decomposition.link(self.tet, vertex) {
                        TetLink::Tet(next) => self.tet = next,
                        TetLink::MeshFace => {
                            self.face = Some(decomposition.tetrahedron_face()[self.tet]);
                            return travelled;
                        }
                    }
                }
                _ => {
                    self.position = end;
                    return 1.0;
                }
            }
        }
        debug!(
            "particle {} did not settle in cell {} after {} tetrahedron moves",
            self.orig_id, self.cell, max_walk
        );
        travelled
    }

    /// Tracks the particle over its part of `track_time`. Returns `td.keep_particle`.
    pub fn move_particle(&mut self, td: &mut TrackData, ctx: &mut TrackingContext, track_time: f64) -> bool {
        td.keep_particle = true;
        td.switch_processor = false;

        if self.on_inlet_boundary {
            self.step_fraction = ctx.rng.random::<f64>();
            self.on_inlet_boundary = false;
        }

        let mut t_end = (1.0 - self.step_fraction) * track_time;
        let dt_max = t_end;
        while td.keep_particle && !td.switch_processor && t_end > 0.0 {
            let mut dt = dt_max.min(t_end);
            let mut destination = self.position + dt * self.Utracking;
            ctx.mesh.constrain_to_mesh_centre(&mut destination);
            let tf = self.track_to_face(destination, ctx.decomposition);

            self.n_steps += 1;
            if self.n_steps > MAX_TRACKING_STEPS {
                ctx.lost.notify(self);
                td.keep_particle = false;
                break;
            }

            dt *= tf;
            t_end -= dt;
            self.step_fraction = 1.0 - t_end / track_time;

            if let Some(face) = self.face {
                self.hit_face(face, td, ctx);
            }
        }
        td.keep_particle
    }

    fn hit_face(&mut self, face: usize, td: &mut TrackData, ctx: &mut TrackingContext) {
        let mesh = ctx.mesh;
        if let Some(next_cell) = mesh.other_cell(face, self.cell) {
            self.cell = next_cell;
            self.tet = ctx
                .decomposition
                .tet_across_face(self.tet)
                .unwrap_or_else(|| ctx.decomposition.nearest_tet(next_cell, &self.position));
            self.face = None;
            return;
        }
        let Some(patch) = mesh.which_patch(face) else {
            warn!("boundary face {} belongs to no patch, particle {} removed", face, self.orig_id);
            td.keep_particle = false;
            return;
        };
        match &mesh.patches()[patch].kind {
            PatchKind::Processor { .. } => td.switch_processor = true,
            PatchKind::Wedge | PatchKind::Empty => self.reflect(&mesh.face_unit_normal(face)),
            _ => match ctx.handlers.get_mut(patch).and_then(|h| h.as_mut()) {
                Some(handler) => {
                    let mut hit = HitContext {
                        mesh,
                        decomposition: ctx.decomposition,
                        fluxes: &mut *ctx.fluxes,
                    };
                    handler.hit_patch(self, td, face, &mut hit);
                }
                None => self.reflect(&mesh.face_unit_normal(face)),
            },
        }
    }
}
