//! # Mesh Module
//!
//! Geometric layer of the particle solver: the unstructured polyhedral mesh the particles live in,
//! its decomposition into face-centred tetrahedra and the interpolation of cell fields to
//! arbitrary points inside those tetrahedra.
//!
//! ## Conventions
//!
//! | Item | Convention |
//! |------|------------|
//! | face ordering | internal faces first, then boundary faces grouped by patch |
//! | face normal | area vector points from the owner cell to the neighbour cell |
//! | owner/neighbour | every face has an owner, only internal faces have a neighbour |
//! | tetrahedron | (face centre, face point, previous face point, cell centre), positive volume |
//!
//! ## Submodules
//! - `PolyMesh`: points/faces/owner/neighbour storage, derived geometry, patches, block generator
//! - `tet_decomposition`: face-point-cell tetrahedra, barycentric ray tests, tetrahedron walking links
//! - `interpolation`: cell-point-face interpolation and constant-per-tetrahedron gradients

pub mod PolyMesh;
pub mod interpolation;
pub mod tet_decomposition;

mod interpolation_tests;
mod mesh_tests;
