use crate::Mesh::PolyMesh::PolyMesh;
use nalgebra::{Matrix3, Vector3};

/// A notional Monte-Carlo particle
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct McParticle {
    pub position: Vector3<f64>,
    pub cell: usize,
    /// tetrahedron of the face-point-cell decomposition containing `position`
    pub tet: usize,
    /// boundary or internal face the particle stopped on in the last tracking sub-step
    pub face: Option<usize>,
    /// fraction of the current time step already tracked, in [0, 1]
    pub step_fraction: f64,
    pub orig_id: usize,
    pub orig_proc: usize,
    /// particle mass
    pub m: f64,
    /// scalar composition
    pub Phi: Vec<f64>,
    pub UParticle: Vector3<f64>,
    pub Ucorrection: Vector3<f64>,
    /// velocity the particle is moved with
    pub Utracking: Vector3<f64>,
    /// turbulent frequency
    pub Omega: f64,
    pub rho: f64,
    /// local time-stepping factor in (0, 1]
    pub eta: f64,
    /// accumulated periodic displacement
    pub shift: Vector3<f64>,
    /// 0 for real particles, > 0 for particles injected this step and not yet admitted
    pub ghost: u32,
    /// Courant number of the tracking velocity in the current cell
    pub Co: f64,
    /// tracking sub-steps used in the current evolve call
    pub n_steps: usize,
    /// step fraction is randomised at the next move
    pub on_inlet_boundary: bool,
    pub reflected_at_open_boundary: bool,
}

impl McParticle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mesh: &PolyMesh,
        position: Vector3<f64>,
        cell: usize,
        tet: usize,
        m: f64,
        velocity: Vector3<f64>,
        phi: Vec<f64>,
        shift: Vector3<f64>,
        ghost: u32,
    ) -> Self {
        let mut p = Self {
            position,
            cell,
            tet,
            face: None,
            step_fraction: 0.0,
            orig_id: 0,
            orig_proc: 0,
            m,
            Phi: phi,
            UParticle: velocity,
            Ucorrection: Vector3::zeros(),
            Utracking: Vector3::zeros(),
            Omega: 0.0,
            rho: 0.0,
            eta: 1.0,
            shift,
            ghost,
            Co: 0.0,
            n_steps: 0,
            on_inlet_boundary: false,
            reflected_at_open_boundary: false,
        };
        p.update_tracking_velocity(mesh);
        p
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost > 0
    }

    pub fn momentum(&self) -> Vector3<f64> {
        self.m * self.UParticle
    }

    /// Utracking = UParticle + Ucorrection, without components the mesh does not resolve
    pub fn update_tracking_velocity(&mut self, mesh: &PolyMesh) {
        let mut u = self.UParticle + self.Ucorrection;
        mesh.constrain_direction(&mut u);
        self.Utracking = u;
    }

    /// rotates all vector properties, used by rotational periodic boundaries
    pub fn transform_properties(&mut self, rotation: &Matrix3<f64>) {
        self.UParticle = rotation * self.UParticle;
        self.Ucorrection = rotation * self.Ucorrection;
        self.Utracking = rotation * self.Utracking;
    }

    /// records a periodic jump of the position
    pub fn transform_separation(&mut self, separation: &Vector3<f64>) {
        self.shift += separation;
    }

    /// specular reflection of all velocities about a plane with unit normal `normal`
    pub fn reflect(&mut self, normal: &Vector3<f64>) {
        for v in [&mut self.UParticle, &mut self.Ucorrection, &mut self.Utracking] {
            let vn = v.dot(normal);
            *v -= 2.0 * vn * normal;
        }
    }

    pub fn info(&self) -> String {
        format!(
            "particle {}/{}: position {:?} cell {} tet {} m {:e} U {:?} Ucorr {:?} Omega {:e} rho {:e} eta {} ghost {} steps {} shift {:?} Phi {:?}",
            self.orig_proc,
            self.orig_id,
            self.position.as_slice(),
            self.cell,
            self.tet,
            self.m,
            self.UParticle.as_slice(),
            self.Ucorrection.as_slice(),
            self.Omega,
            self.rho,
            self.eta,
            self.ghost,
            self.n_steps,
            self.shift.as_slice(),
            self.Phi
        )
    }
}
