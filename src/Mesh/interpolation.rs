//! # Interpolation of Cell Fields to Particle Positions
//!
//! `CellPointFaceInterpolation` turns cell-centred values into a field that is linear inside every
//! tetrahedron of the face-point-cell decomposition. The four vertex values are
//! - the face value at the face centre (linear between owner and neighbour, owner value on
//!   boundary faces),
//! - inverse-distance averages of the surrounding cells at the two mesh points,
//! - the cell value at the cell centre.
//!
//! `GradInterpolationConstantTet` returns the gradient of that piecewise-linear field, which is
//! constant inside a tetrahedron.

use crate::Mesh::PolyMesh::PolyMesh;
use crate::Mesh::tet_decomposition::TetFacePointCellDecomposition;
use nalgebra::Vector3;
use std::ops::{Add, Mul, Sub};

const VSMALL: f64 = 1e-300;

/// Values that can be interpolated linearly
pub trait InterpolationValue:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f64, Output = Self>
{
    fn zero() -> Self;
}

impl InterpolationValue for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl InterpolationValue for Vector3<f64> {
    fn zero() -> Self {
        Vector3::zeros()
    }
}

#[derive(Debug, Clone)]
pub struct CellPointFaceInterpolation<T: InterpolationValue> {
    cell_values: Vec<T>,
    point_values: Vec<T>,
    face_values: Vec<T>,
}

impl<T: InterpolationValue> CellPointFaceInterpolation<T> {
    pub fn new(mesh: &PolyMesh, cell_values: Vec<T>) -> Self {
        debug_assert_eq!(cell_values.len(), mesh.n_cells());
        let face_values = (0..mesh.n_faces())
            .map(|face| {
                let own = mesh.face_owner(face);
                match mesh.face_neighbour(face) {
                    Some(nei) => {
                        let normal = mesh.face_unit_normal(face);
                        let fc = mesh.face_centre(face);
                        let d_own = normal.dot(&(fc - mesh.cell_centre(own))).abs();
                        let d_nei = normal.dot(&(mesh.cell_centre(nei) - fc)).abs();
                        let w = d_nei / (d_own + d_nei).max(VSMALL);
                        cell_values[own] * w + cell_values[nei] * (1.0 - w)
                    }
                    None => cell_values[own],
                }
            })
            .collect();
        let point_values = (0..mesh.n_points())
            .map(|point| {
                let p = mesh.points()[point];
                let mut sum = T::zero();
                let mut weights = 0.0;
                for &cell in mesh.point_cells(point) {
                    let w = 1.0 / (mesh.cell_centre(cell) - p).norm().max(VSMALL);
                    sum = sum + cell_values[cell] * w;
                    weights += w;
                }
                if weights > 0.0 {
                    sum * (1.0 / weights)
                } else {
                    T::zero()
                }
            })
            .collect();
        Self {
            cell_values,
            point_values,
            face_values,
        }
    }

    pub fn cell_values(&self) -> &[T] {
        &self.cell_values
    }

    pub fn cell_value(&self, cell: usize) -> T {
        self.cell_values[cell]
    }

    pub fn face_value(&self, face: usize) -> T {
        self.face_values[face]
    }

    pub fn point_value(&self, point: usize) -> T {
        self.point_values[point]
    }

    /// values at the vertices (a, b, c, d) of a tetrahedron
    pub fn vertex_values(&self, decomposition: &TetFacePointCellDecomposition, tet: usize) -> [T; 4] {
        let (b, c) = decomposition.tetrahedron_points()[tet];
        [
            self.face_values[decomposition.tetrahedron_face()[tet]],
            self.point_values[b],
            self.point_values[c],
            self.cell_values[decomposition.tetrahedron_cell()[tet]],
        ]
    }

    pub fn interpolate(
        &self,
        decomposition: &TetFacePointCellDecomposition,
        position: &Vector3<f64>,
        tet: usize,
    ) -> T {
        let lambda = decomposition.tet(tet).barycentric(position);
        let values = self.vertex_values(decomposition, tet);
        values
            .iter()
            .zip(lambda.iter())
            .fold(T::zero(), |acc, (&v, &l)| acc + v * l)
    }
}

#[derive(Debug, Clone)]
pub struct GradInterpolationConstantTet {
    field: CellPointFaceInterpolation<f64>,
}

impl GradInterpolationConstantTet {
    pub fn new(mesh: &PolyMesh, cell_values: Vec<f64>) -> Self {
        Self {
            field: CellPointFaceInterpolation::new(mesh, cell_values),
        }
    }

    pub fn field(&self) -> &CellPointFaceInterpolation<f64> {
        &self.field
    }

    pub fn interpolate(&self, decomposition: &TetFacePointCellDecomposition, tet: usize) -> Vector3<f64> {
        let gradients = decomposition.tet(tet).barycentric_gradients();
        let values = self.field.vertex_values(decomposition, tet);
        gradients
            .iter()
            .zip(values.iter())
            .fold(Vector3::zeros(), |acc, (g, &v)| acc + g * v)
    }
}
