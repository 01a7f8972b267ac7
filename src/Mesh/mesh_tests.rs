#[cfg(test)]
mod tests {
    use crate::Mesh::PolyMesh::{BlockMeshSpec, MeshError, Patch, PatchKind, PolyMesh};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn unit_box(n: usize) -> PolyMesh {
        let spec = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0), [n, n, n]);
        PolyMesh::block(&spec).unwrap()
    }

    #[test]
    fn test_single_hex_geometry() {
        let mesh = unit_box(1);
        assert_eq!(mesh.n_cells(), 1);
        assert_eq!(mesh.n_faces(), 6);
        assert_eq!(mesh.n_internal_faces(), 0);
        assert_eq!(mesh.n_points(), 8);
        assert_relative_eq!(mesh.cell_volume(0), 1.0, epsilon = 1e-12);
        let c = mesh.cell_centre(0);
        assert_relative_eq!(c.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_normals_point_outwards() {
        let mesh = unit_box(2);
        for patch in mesh.patches() {
            for face in patch.faces() {
                let owner = mesh.face_owner(face);
                let outward = mesh.face_centre(face) - mesh.cell_centre(owner);
                assert!(
                    mesh.face_area(face).dot(&outward) > 0.0,
                    "face {} of patch {} points inwards",
                    face,
                    patch.name
                );
            }
        }
    }

    #[test]
    fn test_internal_normals_point_owner_to_neighbour() {
        let mesh = unit_box(3);
        for face in 0..mesh.n_internal_faces() {
            let own = mesh.face_owner(face);
            let nei = mesh.face_neighbour(face).unwrap();
            assert!(own < nei);
            let d = mesh.cell_centre(nei) - mesh.cell_centre(own);
            assert!(mesh.face_area(face).dot(&d) > 0.0);
        }
    }

    #[test]
    fn test_volumes_sum_to_box_volume() {
        let spec = BlockMeshSpec::closed_box(
            Vector3::new(-1.0, 0.5, 2.0),
            Vector3::new(2.0, 0.5, 3.0),
            [4, 3, 5],
        );
        let mesh = PolyMesh::block(&spec).unwrap();
        assert_eq!(mesh.n_cells(), 60);
        let total: f64 = mesh.cell_volumes().iter().sum();
        assert_relative_eq!(total, 3.0, epsilon = 1e-10);
        let (lower, upper) = mesh.bounds();
        assert_relative_eq!(lower.x, -1.0);
        assert_relative_eq!(upper.z, 5.0);
    }

    #[test]
    fn test_closed_cells_have_zero_net_area() {
        let mesh = unit_box(2);
        for cell in 0..mesh.n_cells() {
            let net = mesh.cell_faces(cell).iter().fold(Vector3::zeros(), |acc, &f| {
                if mesh.face_owner(f) == cell {
                    acc + mesh.face_area(f)
                } else {
                    acc - mesh.face_area(f)
                }
            });
            assert!(net.norm() < 1e-12);
        }
    }

    #[test]
    fn test_patch_layout_and_lookup() {
        let mesh = unit_box(2);
        assert_eq!(mesh.patches().len(), 6);
        let xmax = mesh.find_patch("xmax").unwrap();
        assert_eq!(mesh.patches()[xmax].size, 4);
        for face in mesh.patches()[xmax].faces() {
            assert_eq!(mesh.which_patch(face), Some(xmax));
            assert_relative_eq!(mesh.face_centre(face).x, 1.0, epsilon = 1e-12);
        }
        assert_eq!(mesh.which_patch(0), None);
    }

    #[test]
    fn test_empty_patches_remove_direction() {
        let spec = BlockMeshSpec::channel(Vector3::new(4.0, 1.0, 0.1), [4, 2, 1], true);
        let mesh = PolyMesh::block(&spec).unwrap();
        assert_eq!(mesh.geometric_d(), [true, true, false]);
        assert_eq!(mesh.n_geometric_d(), 2);
        let mut v = Vector3::new(1.0, 2.0, 3.0);
        mesh.constrain_direction(&mut v);
        assert_eq!(v, Vector3::new(1.0, 2.0, 0.0));
        let mut x = Vector3::new(0.3, 0.2, 0.01);
        mesh.constrain_to_mesh_centre(&mut x);
        assert_relative_eq!(x.z, 0.05, epsilon = 1e-14);
    }

    #[test]
    fn test_periodic_faces_are_paired_by_position() {
        let spec = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(2.0, 1.0, 1.0), [2, 3, 2])
            .with_patch(
                0,
                PatchKind::Periodic {
                    neighbour_patch: 1,
                    rotation: None,
                },
            )
            .with_patch(
                1,
                PatchKind::Periodic {
                    neighbour_patch: 0,
                    rotation: None,
                },
            );
        let mesh = PolyMesh::block(&spec).unwrap();
        let (xmin, xmax) = (&mesh.patches()[0], &mesh.patches()[1]);
        for i in 0..xmin.size {
            let a = mesh.face_centre(xmin.start + i);
            let b = mesh.face_centre(xmax.start + i);
            assert_relative_eq!(b.x - a.x, 2.0, epsilon = 1e-12);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-12);
            assert_relative_eq!(a.z, b.z, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_meshes_are_rejected() {
        let spec = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0), [0, 1, 1]);
        assert!(matches!(PolyMesh::block(&spec), Err(MeshError::InvalidBlock(_))));

        let bad_partner = BlockMeshSpec::closed_box(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0), [2, 1, 1])
            .with_patch(
                0,
                PatchKind::Periodic {
                    neighbour_patch: 2,
                    rotation: None,
                },
            );
        // xmin has 1 face, ymin has 2
        assert!(matches!(
            PolyMesh::block(&bad_partner),
            Err(MeshError::InvalidPeriodicPartner { .. })
        ));

        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        let faces = vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 7]];
        let result = PolyMesh::new(
            points.clone(),
            faces,
            vec![0; 4],
            vec![],
            vec![Patch::new("walls", PatchKind::Wall, 0, 4)],
        );
        assert!(matches!(result, Err(MeshError::InvalidPoint { point: 7, .. })));

        let faces = vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]];
        let uncovered = PolyMesh::new(
            points,
            faces,
            vec![0; 4],
            vec![],
            vec![Patch::new("walls", PatchKind::Wall, 0, 3)],
        );
        assert!(matches!(uncovered, Err(MeshError::NonContiguousPatches(_))));
    }

    #[test]
    fn test_single_tetrahedron_cell() {
        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        let faces = vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]];
        let mesh = PolyMesh::new(
            points,
            faces,
            vec![0; 4],
            vec![],
            vec![Patch::new("walls", PatchKind::Wall, 0, 4)],
        )
        .unwrap();
        assert_relative_eq!(mesh.cell_volume(0), 1.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(mesh.cell_centre(0).x, 0.25, epsilon = 1e-12);
        assert_eq!(mesh.point_cells(3), &[0]);
    }
}
