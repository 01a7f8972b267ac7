//! # Elliptic Solver
//!
//! Solves the Poisson problem `laplacian(phi) = s` on the mesh with a cell-centred two-point
//! finite-volume Laplacian:
//! ```text
//!   sum_f |S_f| / |d_f| * (phi_N - phi_P) = s_P * V_P
//! ```
//! Boundary faces of fixed-value patches contribute `phi = 0` at the face centre, all other
//! boundaries are zero-gradient. Without fixed-value faces the system is singular up to a
//! constant; a reference cell pins the level with a diagonal penalty.
//!
//! The default solver is conjugate gradients with Jacobi preconditioning; the assembled matrix
//! is symmetric positive definite.

use crate::Mesh::PolyMesh::PolyMesh;
use log::debug;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error(
        "Elliptic solver did not converge after {iterations} iterations: residual {residual:e}, tolerance {tolerance:e}"
    )]
    NotConverged {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },
    #[error("Source has {got} entries, the mesh has {expected} cells")]
    SizeMismatch { expected: usize, got: usize },
    #[error("Singular system: {0}")]
    Singular(String),
}

pub struct PoissonProblem<'a> {
    pub mesh: &'a PolyMesh,
    pub source: &'a [f64],
    /// one entry per patch, true where phi = 0 is imposed
    pub fixed_value_patches: &'a [bool],
    /// (cell, value) fixing the level of a pure Neumann problem
    pub reference: Option<(usize, f64)>,
}

pub trait EllipticSolver: fmt::Debug {
    fn solve(&mut self, problem: &PoissonProblem) -> Result<Vec<f64>, SolverError>;
}

/// sparse symmetric matrix: diagonal plus one coefficient per internal face
struct FaceMatrix {
    diag: Vec<f64>,
    off: Vec<(usize, usize, f64)>,
}

impl FaceMatrix {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = self.diag[i] * x[i];
        }
        for &(p, n, a) in &self.off {
            y[p] -= a * x[n];
            y[n] -= a * x[p];
        }
    }
}

#[derive(Debug, Clone)]
pub struct PcgPoissonSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub last_iterations: usize,
    pub last_residual: f64,
}

impl PcgPoissonSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            last_iterations: 0,
            last_residual: 0.0,
        }
    }

    fn assemble(problem: &PoissonProblem) -> Result<(FaceMatrix, Vec<f64>), SolverError> {
        let mesh = problem.mesh;
        let n = mesh.n_cells();
        if problem.source.len() != n {
            return Err(SolverError::SizeMismatch {
                expected: n,
                got: problem.source.len(),
            });
        }
        let mut diag = vec![0.0; n];
        let mut off = Vec::with_capacity(mesh.n_internal_faces());
        for face in 0..mesh.n_internal_faces() {
            let p = mesh.face_owner(face);
            let Some(nb) = mesh.face_neighbour(face) else {
                continue;
            };
            let d = (mesh.cell_centre(nb) - mesh.cell_centre(p)).norm();
            let coeff = mesh.face_area(face).norm() / d;
            diag[p] += coeff;
            diag[nb] += coeff;
            off.push((p, nb, coeff));
        }
        let mut n_fixed_faces = 0;
        for (patch_i, patch) in mesh.patches().iter().enumerate() {
            if !problem.fixed_value_patches.get(patch_i).copied().unwrap_or(false) {
                continue;
            }
            for face in patch.faces() {
                let p = mesh.face_owner(face);
                let d = (mesh.face_centre(face) - mesh.cell_centre(p)).norm();
                diag[p] += mesh.face_area(face).norm() / d;
                n_fixed_faces += 1;
            }
        }
        let mut b: Vec<f64> = problem
            .source
            .iter()
            .zip(mesh.cell_volumes().iter())
            .map(|(s, v)| -s * v)
            .collect();
        if let Some((cell, value)) = problem.reference {
            if cell >= n {
                return Err(SolverError::Singular(format!(
                    "reference cell {} outside the mesh",
                    cell
                )));
            }
            let penalty = diag[cell].max(1.0);
            diag[cell] += penalty;
            b[cell] += penalty * value;
        } else if n_fixed_faces == 0 {
            return Err(SolverError::Singular(
                "no fixed-value boundary and no reference cell".to_string(),
            ));
        }
        if let Some(cell) = diag.iter().position(|&d| d <= 0.0) {
            return Err(SolverError::Singular(format!("cell {} is not coupled", cell)));
        }
        Ok((FaceMatrix { diag, off }, b))
    }
}

impl EllipticSolver for PcgPoissonSolver {
    fn solve(&mut self, problem: &PoissonProblem) -> Result<Vec<f64>, SolverError> {
        let (a, b) = Self::assemble(problem)?;
        let n = b.len();
        let mut x = vec![0.0; n];
        let norm_b = norm(&b);
        self.last_iterations = 0;
        self.last_residual = 0.0;
        if norm_b == 0.0 {
            return Ok(x);
        }
        let mut r = b;
        let mut z: Vec<f64> = r.iter().zip(a.diag.iter()).map(|(ri, di)| ri / di).collect();
        let mut p = z.clone();
        let mut ap = vec![0.0; n];
        let mut rz = dot(&r, &z);
        for iteration in 1..=self.max_iterations {
            a.apply(&p, &mut ap);
            let alpha = rz / dot(&p, &ap);
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            let residual = norm(&r) / norm_b;
            if residual < self.tolerance {
                self.last_iterations = iteration;
                self.last_residual = residual;
                debug!(
                    "Poisson solve converged in {} iterations, residual {:e}",
                    iteration, residual
                );
                return Ok(x);
            }
            for i in 0..n {
                z[i] = r[i] / a.diag[i];
            }
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }
        let residual = norm(&r) / norm_b;
        self.last_iterations = self.max_iterations;
        self.last_residual = residual;
        Err(SolverError::NotConverged {
            iterations: self.max_iterations,
            residual,
            tolerance: self.tolerance,
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
