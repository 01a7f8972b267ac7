//! # Polyhedral Mesh
//!
//! ## Aim
//! Stores an unstructured polyhedral mesh in owner/neighbour form and derives the geometric
//! primitives the particle solver needs: face centres and area vectors, cell centres and volumes,
//! point-to-cell adjacency, boundary patches and the set of geometric directions.
//!
//! ## Main Data Structures
//! - `PolyMesh`: the mesh itself; immutable after construction
//! - `Patch` / `PatchKind`: contiguous ranges of boundary faces and their physical type
//! - `BlockMeshSpec`: a structured hexahedral box, one patch per side
//!
//! ## Non-Obvious Features
//! - Face and cell geometry use the pyramid decomposition around an estimated centre, so warped
//!   faces and non-convex cells still get consistent centroids.
//! - Directions normal to `Empty` patches are removed from the geometric directions.
//!   `constrain_direction` zeroes those components of a vector and `constrain_to_mesh_centre`
//!   pins a position to the mid-plane of the mesh in that direction.
//! - Periodic patches store the index of their partner patch; face `i` of a patch is coupled to
//!   face `i` of the partner.

use nalgebra::{Matrix3, Vector3};
use std::ops::Range;
use thiserror::Error;

const VSMALL: f64 = 1e-300;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Inconsistent mesh sizes: {0}")]
    InconsistentSizes(String),
    #[error("Face {face} references point {point}, but the mesh has {n_points} points")]
    InvalidPoint {
        face: usize,
        point: usize,
        n_points: usize,
    },
    #[error("Face {face} has {n} vertices, at least 3 are required")]
    DegenerateFace { face: usize, n: usize },
    #[error("Cell {cell} has non-positive volume {volume:e}")]
    NonPositiveVolume { cell: usize, volume: f64 },
    #[error("Patches do not cover the boundary faces contiguously: {0}")]
    NonContiguousPatches(String),
    #[error("Periodic patch {patch} refers to partner {partner}, which is missing or of different size")]
    InvalidPeriodicPartner { patch: usize, partner: usize },
    #[error("Invalid block specification: {0}")]
    InvalidBlock(String),
}

/// Physical type of a boundary patch
#[derive(Debug, Clone, PartialEq)]
pub enum PatchKind {
    Wall,
    Inlet,
    Outlet,
    /// translational (rotation = None) or rotational periodic coupling with another patch
    Periodic {
        neighbour_patch: usize,
        rotation: Option<Matrix3<f64>>,
    },
    Wedge,
    /// direction normal to the patch is not solved (planar 2-D cases)
    Empty,
    /// sub-domain boundary; particles crossing it are handed to another processor
    Processor { neighbour_processor: usize },
}

impl PatchKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            PatchKind::Wall => "wall",
            PatchKind::Inlet => "inlet",
            PatchKind::Outlet => "outlet",
            PatchKind::Periodic { .. } => "periodic",
            PatchKind::Wedge => "wedge",
            PatchKind::Empty => "empty",
            PatchKind::Processor { .. } => "processor",
        }
    }
}

/// Contiguous range of boundary faces
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub name: String,
    pub kind: PatchKind,
    pub start: usize,
    pub size: usize,
}

impl Patch {
    pub fn new(name: &str, kind: PatchKind, start: usize, size: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            start,
            size,
        }
    }

    pub fn faces(&self) -> Range<usize> {
        self.start..self.start + self.size
    }

    pub fn contains(&self, face: usize) -> bool {
        face >= self.start && face < self.start + self.size
    }
}

#[derive(Debug, Clone)]
pub struct PolyMesh {
    points: Vec<Vector3<f64>>,
    faces: Vec<Vec<usize>>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    patches: Vec<Patch>,
    n_cells: usize,
    cells: Vec<Vec<usize>>,
    point_cells: Vec<Vec<usize>>,
    face_centres: Vec<Vector3<f64>>,
    face_areas: Vec<Vector3<f64>>,
    cell_centres: Vec<Vector3<f64>>,
    cell_volumes: Vec<f64>,
    face_patch: Vec<Option<usize>>,
    geometric_d: [bool; 3],
    bounds: (Vector3<f64>, Vector3<f64>),
}

impl PolyMesh {
    /// Builds the mesh from raw connectivity. `neighbour.len()` is the number of internal faces.
    pub fn new(
        points: Vec<Vector3<f64>>,
        faces: Vec<Vec<usize>>,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        patches: Vec<Patch>,
    ) -> Result<Self, MeshError> {
        let n_faces = faces.len();
        let n_internal = neighbour.len();
        if owner.len() != n_faces {
            return Err(MeshError::InconsistentSizes(format!(
                "{} faces but {} owner entries",
                n_faces,
                owner.len()
            )));
        }
        if n_internal > n_faces {
            return Err(MeshError::InconsistentSizes(format!(
                "{} neighbour entries exceed {} faces",
                n_internal, n_faces
            )));
        }
        if points.is_empty() || n_faces == 0 {
            return Err(MeshError::InconsistentSizes("empty mesh".to_string()));
        }
        for (face_i, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::DegenerateFace {
                    face: face_i,
                    n: face.len(),
                });
            }
            if let Some(&point) = face.iter().find(|&&p| p >= points.len()) {
                return Err(MeshError::InvalidPoint {
                    face: face_i,
                    point,
                    n_points: points.len(),
                });
            }
        }

        let n_cells = owner
            .iter()
            .chain(neighbour.iter())
            .copied()
            .max()
            .map_or(0, |c| c + 1);

        // patches must tile the boundary faces in order
        let mut expected_start = n_internal;
        let mut face_patch = vec![None; n_faces];
        for (patch_i, patch) in patches.iter().enumerate() {
            if patch.start != expected_start {
                return Err(MeshError::NonContiguousPatches(format!(
                    "patch '{}' starts at face {}, expected {}",
                    patch.name, patch.start, expected_start
                )));
            }
            expected_start += patch.size;
            if expected_start > n_faces {
                return Err(MeshError::NonContiguousPatches(format!(
                    "patch '{}' extends beyond the last face",
                    patch.name
                )));
            }
            for face in patch.faces() {
                face_patch[face] = Some(patch_i);
            }
        }
        if expected_start != n_faces {
            return Err(MeshError::NonContiguousPatches(format!(
                "{} boundary faces are not covered by any patch",
                n_faces - expected_start
            )));
        }
        for (patch_i, patch) in patches.iter().enumerate() {
            if let PatchKind::Periodic {
                neighbour_patch, ..
            } = patch.kind
            {
                let valid = patches
                    .get(neighbour_patch)
                    .is_some_and(|partner| partner.size == patch.size && neighbour_patch != patch_i);
                if !valid {
                    return Err(MeshError::InvalidPeriodicPartner {
                        patch: patch_i,
                        partner: neighbour_patch,
                    });
                }
            }
        }

        let mut cells = vec![Vec::new(); n_cells];
        for (face, &own) in owner.iter().enumerate() {
            cells[own].push(face);
            if face < n_internal {
                cells[neighbour[face]].push(face);
            }
        }

        let mut point_cells = vec![Vec::new(); points.len()];
        for (cell, cell_faces) in cells.iter().enumerate() {
            for &face in cell_faces {
                for &point in &faces[face] {
                    point_cells[point].push(cell);
                }
            }
        }
        for list in point_cells.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }

        let (face_centres, face_areas): (Vec<_>, Vec<_>) = faces
            .iter()
            .map(|face| {
                let pts: Vec<Vector3<f64>> = face.iter().map(|&p| points[p]).collect();
                face_centre_and_area(&pts)
            })
            .unzip();

        let mut cell_centres = Vec::with_capacity(n_cells);
        let mut cell_volumes = Vec::with_capacity(n_cells);
        for (cell, cell_faces) in cells.iter().enumerate() {
            let estimate = cell_faces
                .iter()
                .fold(Vector3::zeros(), |acc, &f| acc + face_centres[f])
                / cell_faces.len().max(1) as f64;
            let mut centre_sum = Vector3::zeros();
            let mut volume_sum = 0.0;
            for &face in cell_faces {
                let outward = if owner[face] == cell {
                    face_areas[face]
                } else {
                    -face_areas[face]
                };
                let pyr3vol = outward.dot(&(face_centres[face] - estimate)).max(VSMALL);
                let pyr_centre = 0.75 * face_centres[face] + 0.25 * estimate;
                centre_sum += pyr3vol * pyr_centre;
                volume_sum += pyr3vol;
            }
            let volume = volume_sum / 3.0;
            if volume <= VSMALL {
                return Err(MeshError::NonPositiveVolume { cell, volume });
            }
            cell_centres.push(centre_sum / volume_sum);
            cell_volumes.push(volume);
        }

        let mut geometric_d = [true; 3];
        for patch in patches.iter().filter(|p| p.kind == PatchKind::Empty) {
            for face in patch.faces() {
                let normal = face_areas[face].normalize();
                for (dir, solved) in geometric_d.iter_mut().enumerate() {
                    if normal[dir].abs() > 1.0 - 1e-6 {
                        *solved = false;
                    }
                }
            }
        }

        let mut lower = points[0];
        let mut upper = points[0];
        for p in &points {
            lower = lower.inf(p);
            upper = upper.sup(p);
        }

        Ok(Self {
            points,
            faces,
            owner,
            neighbour,
            patches,
            n_cells,
            cells,
            point_cells,
            face_centres,
            face_areas,
            cell_centres,
            cell_volumes,
            face_patch,
            geometric_d,
            bounds: (lower, upper),
        })
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }
    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }
    pub fn n_internal_faces(&self) -> usize {
        self.neighbour.len()
    }
    pub fn n_points(&self) -> usize {
        self.points.len()
    }
    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }
    pub fn face(&self, face: usize) -> &[usize] {
        &self.faces[face]
    }
    pub fn face_owner(&self, face: usize) -> usize {
        self.owner[face]
    }
    /// neighbour cell of a face, `None` on boundary faces
    pub fn face_neighbour(&self, face: usize) -> Option<usize> {
        self.neighbour.get(face).copied()
    }
    pub fn is_internal_face(&self, face: usize) -> bool {
        face < self.neighbour.len()
    }
    /// the cell on the other side of `face` as seen from `cell`
    pub fn other_cell(&self, face: usize, cell: usize) -> Option<usize> {
        let neighbour = self.face_neighbour(face)?;
        if self.owner[face] == cell {
            Some(neighbour)
        } else {
            Some(self.owner[face])
        }
    }
    pub fn cell_faces(&self, cell: usize) -> &[usize] {
        &self.cells[cell]
    }
    pub fn point_cells(&self, point: usize) -> &[usize] {
        &self.point_cells[point]
    }
    pub fn face_centres(&self) -> &[Vector3<f64>] {
        &self.face_centres
    }
    pub fn face_centre(&self, face: usize) -> Vector3<f64> {
        self.face_centres[face]
    }
    /// area vector, magnitude = face area, direction = owner to neighbour
    pub fn face_area(&self, face: usize) -> Vector3<f64> {
        self.face_areas[face]
    }
    pub fn face_unit_normal(&self, face: usize) -> Vector3<f64> {
        self.face_areas[face] / self.face_areas[face].norm().max(VSMALL)
    }
    pub fn cell_centres(&self) -> &[Vector3<f64>] {
        &self.cell_centres
    }
    pub fn cell_centre(&self, cell: usize) -> Vector3<f64> {
        self.cell_centres[cell]
    }
    pub fn cell_volumes(&self) -> &[f64] {
        &self.cell_volumes
    }
    pub fn cell_volume(&self, cell: usize) -> f64 {
        self.cell_volumes[cell]
    }
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }
    pub fn which_patch(&self, face: usize) -> Option<usize> {
        self.face_patch[face]
    }
    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }
    pub fn geometric_d(&self) -> [bool; 3] {
        self.geometric_d
    }
    pub fn n_geometric_d(&self) -> usize {
        self.geometric_d.iter().filter(|&&d| d).count()
    }
    pub fn bounds(&self) -> (Vector3<f64>, Vector3<f64>) {
        self.bounds
    }
    pub fn bounding_diagonal(&self) -> f64 {
        (self.bounds.1 - self.bounds.0).norm()
    }

    /// removes the components of `v` along directions the mesh does not resolve
    pub fn constrain_direction(&self, v: &mut Vector3<f64>) {
        for dir in 0..3 {
            if !self.geometric_d[dir] {
                v[dir] = 0.0;
            }
        }
    }

    /// moves a position onto the mid-plane of every unresolved direction
    pub fn constrain_to_mesh_centre(&self, position: &mut Vector3<f64>) {
        for dir in 0..3 {
            if !self.geometric_d[dir] {
                position[dir] = 0.5 * (self.bounds.0[dir] + self.bounds.1[dir]);
            }
        }
    }

    /// structured hexahedral box; patches in the order xmin, xmax, ymin, ymax, zmin, zmax
    pub fn block(spec: &BlockMeshSpec) -> Result<Self, MeshError> {
        let [nx, ny, nz] = spec.divisions;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(MeshError::InvalidBlock(format!(
                "divisions must be positive, got {:?}",
                spec.divisions
            )));
        }
        if spec.lengths.iter().any(|&l| l <= 0.0) {
            return Err(MeshError::InvalidBlock(format!(
                "lengths must be positive, got {:?}",
                spec.lengths
            )));
        }
        let step = Vector3::new(
            spec.lengths.x / nx as f64,
            spec.lengths.y / ny as f64,
            spec.lengths.z / nz as f64,
        );
        let pid = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);
        let cid = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);

        let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    points.push(
                        spec.origin
                            + Vector3::new(
                                i as f64 * step.x,
                                j as f64 * step.y,
                                k as f64 * step.z,
                            ),
                    );
                }
            }
        }

        let mut faces = Vec::new();
        let mut owner = Vec::new();
        let mut neighbour = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                for i in 1..nx {
                    faces.push(vec![
                        pid(i, j, k),
                        pid(i, j + 1, k),
                        pid(i, j + 1, k + 1),
                        pid(i, j, k + 1),
                    ]);
                    owner.push(cid(i - 1, j, k));
                    neighbour.push(cid(i, j, k));
                }
            }
        }
        for k in 0..nz {
            for j in 1..ny {
                for i in 0..nx {
                    faces.push(vec![
                        pid(i, j, k),
                        pid(i, j, k + 1),
                        pid(i + 1, j, k + 1),
                        pid(i + 1, j, k),
                    ]);
                    owner.push(cid(i, j - 1, k));
                    neighbour.push(cid(i, j, k));
                }
            }
        }
        for k in 1..nz {
            for j in 0..ny {
                for i in 0..nx {
                    faces.push(vec![
                        pid(i, j, k),
                        pid(i + 1, j, k),
                        pid(i + 1, j + 1, k),
                        pid(i, j + 1, k),
                    ]);
                    owner.push(cid(i, j, k - 1));
                    neighbour.push(cid(i, j, k));
                }
            }
        }

        let mut patches = Vec::with_capacity(6);
        let mut add_patch = |side: usize,
                             faces: &mut Vec<Vec<usize>>,
                             owner: &mut Vec<usize>,
                             side_faces: Vec<(Vec<usize>, usize)>| {
            let start = faces.len();
            let size = side_faces.len();
            for (face, own) in side_faces {
                faces.push(face);
                owner.push(own);
            }
            patches.push(Patch::new(
                BlockMeshSpec::PATCH_NAMES[side],
                spec.patch_kinds[side].clone(),
                start,
                size,
            ));
        };

        let mut xmin = Vec::new();
        let mut xmax = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                xmin.push((
                    vec![pid(0, j, k), pid(0, j, k + 1), pid(0, j + 1, k + 1), pid(0, j + 1, k)],
                    cid(0, j, k),
                ));
                xmax.push((
                    vec![
                        pid(nx, j, k),
                        pid(nx, j + 1, k),
                        pid(nx, j + 1, k + 1),
                        pid(nx, j, k + 1),
                    ],
                    cid(nx - 1, j, k),
                ));
            }
        }
        let mut ymin = Vec::new();
        let mut ymax = Vec::new();
        for k in 0..nz {
            for i in 0..nx {
                ymin.push((
                    vec![pid(i, 0, k), pid(i + 1, 0, k), pid(i + 1, 0, k + 1), pid(i, 0, k + 1)],
                    cid(i, 0, k),
                ));
                ymax.push((
                    vec![
                        pid(i, ny, k),
                        pid(i, ny, k + 1),
                        pid(i + 1, ny, k + 1),
                        pid(i + 1, ny, k),
                    ],
                    cid(i, ny - 1, k),
                ));
            }
        }
        let mut zmin = Vec::new();
        let mut zmax = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                zmin.push((
                    vec![pid(i, j, 0), pid(i, j + 1, 0), pid(i + 1, j + 1, 0), pid(i + 1, j, 0)],
                    cid(i, j, 0),
                ));
                zmax.push((
                    vec![
                        pid(i, j, nz),
                        pid(i + 1, j, nz),
                        pid(i + 1, j + 1, nz),
                        pid(i, j + 1, nz),
                    ],
                    cid(i, j, nz - 1),
                ));
            }
        }
        for (side, side_faces) in [xmin, xmax, ymin, ymax, zmin, zmax].into_iter().enumerate() {
            add_patch(side, &mut faces, &mut owner, side_faces);
        }

        Self::new(points, faces, owner, neighbour, patches)
    }
}

/// Structured box: `divisions` cells along x, y, z starting at `origin`
#[derive(Debug, Clone)]
pub struct BlockMeshSpec {
    pub origin: Vector3<f64>,
    pub lengths: Vector3<f64>,
    pub divisions: [usize; 3],
    /// patch kinds in the order of `PATCH_NAMES`
    pub patch_kinds: [PatchKind; 6],
}

impl BlockMeshSpec {
    pub const PATCH_NAMES: [&'static str; 6] = ["xmin", "xmax", "ymin", "ymax", "zmin", "zmax"];

    /// box with walls on every side
    pub fn closed_box(origin: Vector3<f64>, lengths: Vector3<f64>, divisions: [usize; 3]) -> Self {
        Self {
            origin,
            lengths,
            divisions,
            patch_kinds: [
                PatchKind::Wall,
                PatchKind::Wall,
                PatchKind::Wall,
                PatchKind::Wall,
                PatchKind::Wall,
                PatchKind::Wall,
            ],
        }
    }

    /// channel along x: inlet at xmin, outlet at xmax, walls in y, empty (2-D) or walls in z
    pub fn channel(lengths: Vector3<f64>, divisions: [usize; 3], planar: bool) -> Self {
        let z_kind = if planar {
            PatchKind::Empty
        } else {
            PatchKind::Wall
        };
        Self {
            origin: Vector3::zeros(),
            lengths,
            divisions,
            patch_kinds: [
                PatchKind::Inlet,
                PatchKind::Outlet,
                PatchKind::Wall,
                PatchKind::Wall,
                z_kind.clone(),
                z_kind,
            ],
        }
    }

    pub fn with_patch(mut self, side: usize, kind: PatchKind) -> Self {
        self.patch_kinds[side] = kind;
        self
    }
}

/// centre and area vector of a polygon (triangle fan around the point average)
fn face_centre_and_area(pts: &[Vector3<f64>]) -> (Vector3<f64>, Vector3<f64>) {
    let n = pts.len();
    if n == 3 {
        let centre = (pts[0] + pts[1] + pts[2]) / 3.0;
        let area = 0.5 * (pts[1] - pts[0]).cross(&(pts[2] - pts[0]));
        return (centre, area);
    }
    let estimate = pts.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n as f64;
    let mut sum_n = Vector3::zeros();
    let mut sum_a = 0.0;
    let mut sum_ac = Vector3::zeros();
    for i in 0..n {
        let this = pts[i];
        let next = pts[(i + 1) % n];
        let c = this + next + estimate;
        let tri_normal = (next - this).cross(&(estimate - this));
        let a = tri_normal.norm();
        sum_n += tri_normal;
        sum_a += a;
        sum_ac += a * c;
    }
    let centre = if sum_a > VSMALL {
        sum_ac / (3.0 * sum_a)
    } else {
        estimate
    };
    (centre, 0.5 * sum_n)
}
