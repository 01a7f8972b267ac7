//! # Face-Point-Cell Tetrahedral Decomposition
//!
//! Every cell is split into tetrahedra built from one face centre, two consecutive points of that
//! face and the cell centre:
//! ```text
//!   a = face centre, b = face[i], c = face[i-1], d = cell centre
//! ```
//! with `b` and `c` swapped when the cell is the neighbour of the face, so that all tetrahedra have
//! positive volume with respect to their own cell. Particles are tracked tetrahedron by
//! tetrahedron; the barycentric coordinates of the current tetrahedron tell when a straight
//! ray leaves it and through which of its four faces.
//!
//! For every tetrahedron and vertex the decomposition stores the link across the face opposite to
//! that vertex: either the tetrahedron of the same cell sharing that face, or the mesh face itself
//! (only for the face opposite to the cell centre). `tet_across_face` gives the tetrahedron in the
//! neighbouring cell that shares the same mesh-face triangle.

use crate::Mesh::PolyMesh::PolyMesh;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::Exp1;
use std::collections::HashMap;
use thiserror::Error;

/// threshold on barycentric rates below which a tetrahedron face is treated as parallel to the ray
pub const TET_SMALL: f64 = 1e-12;
/// barycentric tolerance used when locating points
pub const LOCATE_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Inside-out tetrahedron in cell {cell} on face {face}: signed volume {volume:e}")]
    InvertedTetrahedron { cell: usize, face: usize, volume: f64 },
    #[error("Degenerate tetrahedron in cell {cell} on face {face}: signed volume {volume:e}")]
    DegenerateTetrahedron { cell: usize, face: usize, volume: f64 },
    #[error("Cell {cell} is not closed: tetrahedron {tet} has an unmatched internal face")]
    OpenCell { cell: usize, tet: usize },
    #[error("Position {position:?} is not inside cell {cell}")]
    NotInCell { cell: usize, position: [f64; 3] },
}

#[derive(Debug, Clone)]
pub struct Tetrahedron {
    pub a: Vector3<f64>,
    pub b: Vector3<f64>,
    pub c: Vector3<f64>,
    pub d: Vector3<f64>,
    /// inverse of [b-a, c-a, d-a]; zero when the tetrahedron is degenerate
    inverse: Matrix3<f64>,
    volume: f64,
}

impl Tetrahedron {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>, d: Vector3<f64>) -> Self {
        let edges = Matrix3::from_columns(&[b - a, c - a, d - a]);
        let volume = (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0;
        let inverse = edges.try_inverse().unwrap_or_else(Matrix3::zeros);
        Self {
            a,
            b,
            c,
            d,
            inverse,
            volume,
        }
    }

    pub fn signed_volume(&self) -> f64 {
        self.volume
    }

    pub fn centre(&self) -> Vector3<f64> {
        0.25 * (self.a + self.b + self.c + self.d)
    }

    /// area of the triangle (a, b, c) lying on the mesh face
    pub fn base_area(&self) -> f64 {
        0.5 * (self.b - self.a).cross(&(self.c - self.a)).norm()
    }

    pub fn barycentric(&self, p: &Vector3<f64>) -> [f64; 4] {
        let l = self.inverse * (p - self.a);
        [1.0 - l.x - l.y - l.z, l.x, l.y, l.z]
    }

    /// rate of change of the barycentric coordinates along a displacement
    pub fn barycentric_rate(&self, displacement: &Vector3<f64>) -> [f64; 4] {
        let l = self.inverse * displacement;
        [-(l.x + l.y + l.z), l.x, l.y, l.z]
    }

    /// gradients of the four barycentric coordinates (shape functions)
    pub fn barycentric_gradients(&self) -> [Vector3<f64>; 4] {
        let r1: Vector3<f64> = self.inverse.row(0).transpose();
        let r2: Vector3<f64> = self.inverse.row(1).transpose();
        let r3: Vector3<f64> = self.inverse.row(2).transpose();
        [-(r1 + r2 + r3), r1, r2, r3]
    }

    pub fn point_from_barycentric(&self, lambda: &[f64; 4]) -> Vector3<f64> {
        lambda[0] * self.a + lambda[1] * self.b + lambda[2] * self.c + lambda[3] * self.d
    }

    pub fn contains(&self, p: &Vector3<f64>, tolerance: f64) -> bool {
        self.barycentric(p).iter().all(|&l| l >= -tolerance)
    }

    /// Fraction of `displacement` after which the ray from `p` leaves the tetrahedron, and the
    /// vertex opposite to the exit face. `(INFINITY, None)` if the ray never leaves.
    pub fn exit_fraction(&self, p: &Vector3<f64>, displacement: &Vector3<f64>) -> (f64, Option<usize>) {
        let lambda = self.barycentric(p);
        let rate = self.barycentric_rate(displacement);
        let mut t_min = f64::INFINITY;
        let mut exit = None;
        for i in 0..4 {
            if rate[i] < -TET_SMALL {
                let t = lambda[i].max(0.0) / -rate[i];
                if t < t_min {
                    t_min = t;
                    exit = Some(i);
                }
            }
        }
        (t_min, exit)
    }
}

/// Where the face opposite to a tetrahedron vertex leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TetLink {
    Tet(usize),
    MeshFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum VertexKey {
    FaceCentre(usize),
    Point(usize),
    CellCentre(usize),
}

#[derive(Debug, Clone)]
pub struct TetFacePointCellDecomposition {
    tets: Vec<Tetrahedron>,
    cell_tets: Vec<Vec<usize>>,
    tet_cell: Vec<usize>,
    tet_face: Vec<usize>,
    /// (b, c) point indices of every tetrahedron
    tet_points: Vec<(usize, usize)>,
    links: Vec<[TetLink; 4]>,
    across_face: Vec<Option<usize>>,
}

impl TetFacePointCellDecomposition {
    pub fn new(mesh: &PolyMesh) -> Result<Self, GeometryError> {
        let points = mesh.points();
        let mut tets = Vec::new();
        let mut cell_tets = vec![Vec::new(); mesh.n_cells()];
        let mut tet_cell = Vec::new();
        let mut tet_face = Vec::new();
        let mut tet_points = Vec::new();
        let mut links = Vec::new();
        let mut face_triangles: HashMap<(usize, usize, usize), Vec<usize>> = HashMap::new();

        for cell in 0..mesh.n_cells() {
            let cc = mesh.cell_centre(cell);
            let tolerance = TET_SMALL * mesh.cell_volume(cell);
            let mut open_faces: HashMap<[VertexKey; 3], (usize, usize)> = HashMap::new();
            for &face in mesh.cell_faces(cell) {
                let f = mesh.face(face);
                let n = f.len();
                let fc = mesh.face_centre(face);
                for i in 0..n {
                    let (mut b, mut c) = (f[i], f[(i + n - 1) % n]);
                    if mesh.face_owner(face) != cell {
                        std::mem::swap(&mut b, &mut c);
                    }
                    let tet = Tetrahedron::new(fc, points[b], points[c], cc);
                    let volume = tet.signed_volume();
                    if volume < -tolerance {
                        return Err(GeometryError::InvertedTetrahedron { cell, face, volume });
                    }
                    if volume.abs() <= tolerance {
                        return Err(GeometryError::DegenerateTetrahedron { cell, face, volume });
                    }
                    let tet_i = tets.len();
                    tets.push(tet);
                    cell_tets[cell].push(tet_i);
                    tet_cell.push(cell);
                    tet_face.push(face);
                    tet_points.push((b, c));
                    links.push([TetLink::MeshFace; 4]);
                    face_triangles
                        .entry((face, b.min(c), b.max(c)))
                        .or_default()
                        .push(tet_i);

                    let vertices = [
                        VertexKey::FaceCentre(face),
                        VertexKey::Point(b),
                        VertexKey::Point(c),
                        VertexKey::CellCentre(cell),
                    ];
                    for opposite in 0..3 {
                        let mut key = [VertexKey::CellCentre(cell); 3];
                        let mut k = 0;
                        for (v, vertex) in vertices.iter().enumerate() {
                            if v != opposite {
                                key[k] = *vertex;
                                k += 1;
                            }
                        }
                        key.sort();
                        if let Some((other, other_vertex)) = open_faces.remove(&key) {
                            links[tet_i][opposite] = TetLink::Tet(other);
                            links[other][other_vertex] = TetLink::Tet(tet_i);
                        } else {
                            open_faces.insert(key, (tet_i, opposite));
                        }
                    }
                }
            }
            if let Some((tet, _)) = open_faces.values().next() {
                return Err(GeometryError::OpenCell { cell, tet: *tet });
            }
        }

        let mut across_face = vec![None; tets.len()];
        for pair in face_triangles.values() {
            if let [first, second] = pair.as_slice() {
                across_face[*first] = Some(*second);
                across_face[*second] = Some(*first);
            }
        }
        debug!(
            "decomposed {} cells into {} tetrahedra",
            mesh.n_cells(),
            tets.len()
        );

        Ok(Self {
            tets,
            cell_tets,
            tet_cell,
            tet_face,
            tet_points,
            links,
            across_face,
        })
    }

    pub fn n_tets(&self) -> usize {
        self.tets.len()
    }
    pub fn tetrahedra(&self) -> &[Tetrahedron] {
        &self.tets
    }
    pub fn tet(&self, tet: usize) -> &Tetrahedron {
        &self.tets[tet]
    }
    pub fn cell_tetrahedra(&self) -> &[Vec<usize>] {
        &self.cell_tets
    }
    pub fn tetrahedron_cell(&self) -> &[usize] {
        &self.tet_cell
    }
    pub fn tetrahedron_face(&self) -> &[usize] {
        &self.tet_face
    }
    pub fn tetrahedron_points(&self) -> &[(usize, usize)] {
        &self.tet_points
    }

    /// link across the face opposite to `vertex` (0 = a, 1 = b, 2 = c, 3 = d)
    pub fn link(&self, tet: usize, vertex: usize) -> TetLink {
        self.links[tet][vertex]
    }

    /// tetrahedron of the neighbouring cell sharing the mesh-face triangle, internal faces only
    pub fn tet_across_face(&self, tet: usize) -> Option<usize> {
        self.across_face[tet]
    }

    /// the tetrahedron of `cell` containing `p`, within `LOCATE_TOLERANCE`
    pub fn find_tet(&self, cell: usize, p: &Vector3<f64>) -> Option<usize> {
        let (tet, min_lambda) = self.best_tet(self.cell_tets[cell].iter().copied(), p)?;
        (min_lambda >= -LOCATE_TOLERANCE).then_some(tet)
    }

    /// the tetrahedron of `cell` that `p` is least outside of
    pub fn nearest_tet(&self, cell: usize, p: &Vector3<f64>) -> usize {
        self.best_tet(self.cell_tets[cell].iter().copied(), p)
            .map_or(0, |(tet, _)| tet)
    }

    /// the tetrahedron of `cell` built on mesh face `face` that `p` is least outside of
    pub fn nearest_tet_on_face(&self, cell: usize, face: usize, p: &Vector3<f64>) -> Option<usize> {
        let candidates = self.cell_tets[cell]
            .iter()
            .copied()
            .filter(|&t| self.tet_face[t] == face);
        self.best_tet(candidates, p).map(|(tet, _)| tet)
    }

    /// tetrahedra of `cell` built on mesh face `face`
    pub fn face_tets(&self, cell: usize, face: usize) -> Vec<usize> {
        self.cell_tets[cell]
            .iter()
            .copied()
            .filter(|&t| self.tet_face[t] == face)
            .collect()
    }

    fn best_tet(&self, candidates: impl Iterator<Item = usize>, p: &Vector3<f64>) -> Option<(usize, f64)> {
        candidates
            .map(|t| {
                let min_lambda = self.tets[t]
                    .barycentric(p)
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min);
                (t, min_lambda)
            })
            .max_by(|x, y| x.1.total_cmp(&y.1))
    }

    /// uniformly distributed point inside `cell`: tetrahedron picked by volume, then a
    /// Dirichlet(1,1,1,1) sample of barycentric coordinates
    pub fn random_point_in_cell(&self, cell: usize, rng: &mut StdRng) -> (Vector3<f64>, usize) {
        let tets = &self.cell_tets[cell];
        let total: f64 = tets.iter().map(|&t| self.tets[t].signed_volume()).sum();
        let mut target = rng.random::<f64>() * total;
        let mut chosen = tets[tets.len() - 1];
        for &t in tets {
            target -= self.tets[t].signed_volume();
            if target <= 0.0 {
                chosen = t;
                break;
            }
        }
        let mut lambda = [0.0; 4];
        for l in lambda.iter_mut() {
            *l = rng.sample::<f64, _>(Exp1);
        }
        let sum: f64 = lambda.iter().sum();
        for l in lambda.iter_mut() {
            *l /= sum;
        }
        (self.tets[chosen].point_from_barycentric(&lambda), chosen)
    }

    /// uniformly distributed point on the triangle (a, b, c) of `tet`
    pub fn random_point_on_face_triangle(&self, tet: usize, rng: &mut StdRng) -> Vector3<f64> {
        let t = &self.tets[tet];
        let mut r1: f64 = rng.random();
        let mut r2: f64 = rng.random();
        if r1 + r2 > 1.0 {
            r1 = 1.0 - r1;
            r2 = 1.0 - r2;
        }
        t.a + r1 * (t.b - t.a) + r2 * (t.c - t.a)
    }
}
