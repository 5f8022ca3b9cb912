//! Normal generation honoring smoothing groups.
//!
//! Face normals are left unnormalized while they are averaged so that larger
//! faces pull the shared normal further toward their own plane.

use {
    super::spatial::SpatialSort,
    crate::{
        math::{position_epsilon, vec3_normalize_safe, Vec3},
        scene::{Mesh, Scene},
    },
};

/// Fills in per-vertex normals for every mesh that has none.
pub fn generate(scene: &mut Scene) {
    let mut generated = 0;
    for mesh in &mut scene.meshes {
        if mesh.normals.is_none() && !mesh.faces.is_empty() {
            generate_mesh(mesh);
            generated += 1;
        }
    }

    if generated > 0 {
        debug!("generated smoothed normals for {} meshes", generated);
    }
}

fn face_normal(mesh: &Mesh, indices: &[u32]) -> Vec3 {
    let v0 = mesh.positions[indices[0] as usize];
    let v1 = mesh.positions[indices[1] as usize];
    let v2 = mesh.positions[indices[2] as usize];

    (v1 - v0).cross(v2 - v0)
}

fn generate_mesh(mesh: &mut Mesh) {
    // per-vertex copy of the owning face's unnormalized normal; decoders
    // deliver the verbose layout, so each vertex has exactly one owner
    let mut flat = vec![Vec3::ZERO; mesh.positions.len()];
    for face in &mesh.faces {
        if face.indices.len() < 3 {
            continue;
        }

        let normal = face_normal(mesh, &face.indices);
        for &index in &face.indices {
            flat[index as usize] = normal;
        }
    }

    let epsilon = position_epsilon(&mesh.positions);
    let sort = SpatialSort::prepare(&mesh.positions, &mesh.faces);

    let mut normals = vec![Vec3::ZERO; mesh.positions.len()];
    for face in &mesh.faces {
        for &index in &face.indices {
            let smoothed = if face.smoothing == 0 {
                flat[index as usize]
            } else {
                let mut sum = Vec3::ZERO;
                for other in sort.find(
                    mesh.positions[index as usize],
                    face.smoothing,
                    epsilon,
                ) {
                    sum += flat[other as usize];
                }

                sum
            };

            normals[index as usize] = vec3_normalize_safe(smoothed);
        }
    }

    mesh.normals = Some(normals);
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            math::vec3,
            scene::{Face, Mesh},
        },
    };

    fn roof_mesh(smoothing: u32) -> Mesh {
        // two faces meeting at a ridge, one tilted out of plane
        let mut mesh = Mesh::default();
        mesh.positions = vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 1.0, 1.0),
        ];
        mesh.faces = vec![
            Face::triangle(0, 1, 2).with_smoothing(smoothing),
            Face::triangle(3, 4, 5).with_smoothing(smoothing),
        ];

        mesh
    }

    #[test]
    pub fn flat_faces_keep_their_plane() {
        let mut mesh = roof_mesh(0);
        generate_mesh(&mut mesh);

        let normals = mesh.normals.unwrap();

        // face 1 lies in the xy plane; every one of its vertices points at +z
        assert!((normals[0] - vec3(0.0, 0.0, 1.0)).length() < 1e-6);
        assert!((normals[1] - vec3(0.0, 0.0, 1.0)).length() < 1e-6);

        // the ridge vertices of the two faces disagree
        assert!((normals[1] - normals[3]).length() > 1e-3);
    }

    #[test]
    pub fn common_group_smooths_the_ridge() {
        let mut mesh = roof_mesh(1);
        generate_mesh(&mut mesh);

        let normals = mesh.normals.unwrap();

        // vertices 1 and 3 share a position and a group: identical normals
        assert!((normals[1] - normals[3]).length() < 1e-6);
        assert!((normals[1].length() - 1.0).abs() < 1e-6);
    }

    #[test]
    pub fn idempotent_for_uniform_groups() {
        let mut mesh = roof_mesh(1);
        generate_mesh(&mut mesh);
        let first = mesh.normals.clone().unwrap();

        mesh.normals = None;
        generate_mesh(&mut mesh);
        let second = mesh.normals.unwrap();

        for (a, b) in first.iter().zip(&second) {
            assert!((*a - *b).length() < 1e-6);
        }
    }

    #[test]
    pub fn existing_normals_are_kept() {
        let mut scene = Scene::new();
        let mut mesh = roof_mesh(1);
        let canned = vec![vec3(0.0, 1.0, 0.0); 6];
        mesh.normals = Some(canned.clone());
        scene.meshes.push(mesh);

        generate(&mut scene);

        assert_eq!(scene.meshes[0].normals.as_ref().unwrap(), &canned);
    }
}
