//! # Velocity Models
//!
//! ## SLMFullVelocityModel
//! Simplified Langevin model for the particle velocity, integrated with one explicit Euler step
//! over the particle time step `dt`:
//! ```text
//!  dU = -grad(p)/rho dt
//!       - (C1/2 + 3/4 C0) Omega (U - U~) dt
//!       + (U_fv - U~) / tau_U dt                        (optional)
//!       + (U - U~) (k_fv - k_pdf) / (2 k_pdf tau_k) dt  (optional)
//!       + sqrt(C0 k_pdf Omega dt) xi,    xi ~ N(0, I)
//! ```
//! `U~` and `k_pdf` are the Favre mean velocity and turbulent kinetic energy of the particle
//! moments, `U_fv` and `k_fv` the finite-volume mean fields; the two optional relaxation terms
//! pull the particle statistics towards the finite-volume solution with time scales `tau_U` and
//! `tau_k`. With `C1 = 0` the drift and diffusion balance and k is conserved; `C1 = 1` gives
//! the usual decay of k at rate Omega.
//!
//! All cell fields are interpolated to the particle position with the cell-point-face scheme, the
//! pressure gradient is constant per tetrahedron.
//!
//! ## FrozenVelocityModel
//! Leaves the particle velocity unchanged.

use crate::Mesh::interpolation::{CellPointFaceInterpolation, GradInterpolationConstantTet};
use crate::Models::flow_fields::mean_frequency;
use crate::Models::model_api::{McModel, ModelContext, ModelError};
use crate::Particles::mc_particle::McParticle;
use log::debug;
use nalgebra::Vector3;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

#[derive(Debug, Clone)]
struct SlmFields {
    grad_p: GradInterpolationConstantTet,
    rho: CellPointFaceInterpolation<f64>,
    u_pdf: CellPointFaceInterpolation<Vector3<f64>>,
    diff_u: CellPointFaceInterpolation<Vector3<f64>>,
    k_pdf: CellPointFaceInterpolation<f64>,
    k_fv: CellPointFaceInterpolation<f64>,
    omega_fv: CellPointFaceInterpolation<f64>,
}

#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct SLMFullVelocityModel {
    pub C0: f64,
    pub C1: f64,
    pub U_relaxation_time: Option<f64>,
    pub k_relaxation_time: Option<f64>,
    fields: Option<SlmFields>,
}

impl SLMFullVelocityModel {
    #[allow(non_snake_case)]
    pub fn new(C0: f64, C1: f64, U_relaxation_time: Option<f64>, k_relaxation_time: Option<f64>) -> Self {
        Self {
            C0,
            C1,
            U_relaxation_time,
            k_relaxation_time,
            fields: None,
        }
    }
}

impl McModel for SLMFullVelocityModel {
    fn update_internals(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
        let mesh = ctx.mesh;
        let n = mesh.n_cells();
        let moments = ctx.moments;
        let fields = ctx.fields;
        let pressure: Vec<f64> = (0..n).map(|c| fields.pressure(c)).collect();
        // cells without particle statistics fall back on the finite-volume state
        let rho: Vec<f64> = (0..n)
            .map(|c| {
                let r = moments.rho(c);
                if r > 0.0 { r } else { fields.density(c) }
            })
            .collect();
        let u_pdf: Vec<Vector3<f64>> = (0..n)
            .map(|c| {
                if moments.has_statistics(c) {
                    moments.u(c)
                } else {
                    fields.velocity(c)
                }
            })
            .collect();
        let diff_u: Vec<Vector3<f64>> = (0..n).map(|c| fields.velocity(c) - u_pdf[c]).collect();
        let k_pdf: Vec<f64> = (0..n)
            .map(|c| {
                if moments.has_statistics(c) {
                    moments.k(c).max(0.0)
                } else {
                    fields.k(c)
                }
            })
            .collect();
        let k_fv: Vec<f64> = (0..n).map(|c| fields.k(c)).collect();
        let omega_fv: Vec<f64> = (0..n)
            .map(|c| mean_frequency(fields.k(c), fields.epsilon(c)))
            .collect();
        self.fields = Some(SlmFields {
            grad_p: GradInterpolationConstantTet::new(mesh, pressure),
            rho: CellPointFaceInterpolation::new(mesh, rho),
            u_pdf: CellPointFaceInterpolation::new(mesh, u_pdf),
            diff_u: CellPointFaceInterpolation::new(mesh, diff_u),
            k_pdf: CellPointFaceInterpolation::new(mesh, k_pdf),
            k_fv: CellPointFaceInterpolation::new(mesh, k_fv),
            omega_fv: CellPointFaceInterpolation::new(mesh, omega_fv),
        });
        debug!("SLM velocity model updated on {} cells", n);
        Ok(())
    }

    fn correct(&mut self, p: &mut McParticle, ctx: &ModelContext, rng: &mut StdRng) {
        let Some(f) = &self.fields else {
            return;
        };
        let d = ctx.decomposition;
        let dt = ctx.particle_time_step(p);
        let x = p.position;

        let rho = f.rho.interpolate(d, &x, p.tet);
        let u_mean = f.u_pdf.interpolate(d, &x, p.tet);
        let k_pdf = f.k_pdf.interpolate(d, &x, p.tet).max(0.0);
        let omega = if p.Omega > 0.0 {
            p.Omega
        } else {
            f.omega_fv.interpolate(d, &x, p.tet).max(0.0)
        };
        let fluctuation = p.UParticle - u_mean;

        let mut drift = -(0.5 * self.C1 + 0.75 * self.C0) * omega * fluctuation;
        if rho > 0.0 {
            drift -= f.grad_p.interpolate(d, p.tet) / rho;
        }
        if let Some(tau_u) = self.U_relaxation_time {
            drift += f.diff_u.interpolate(d, &x, p.tet) / tau_u;
        }
        if let Some(tau_k) = self.k_relaxation_time {
            if k_pdf > f64::EPSILON {
                let k_fv = f.k_fv.interpolate(d, &x, p.tet).max(0.0);
                drift += fluctuation * (k_fv - k_pdf) / (2.0 * k_pdf * tau_k);
            }
        }
        let xi = Vector3::new(
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
        );
        let diffusion = (self.C0 * k_pdf * omega * dt).sqrt() * xi;
        p.UParticle += drift * dt + diffusion;
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrozenVelocityModel;

impl McModel for FrozenVelocityModel {
    fn update_internals(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn correct(&mut self, _p: &mut McParticle, _ctx: &ModelContext, _rng: &mut StdRng) {}
}
