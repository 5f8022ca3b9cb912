//! Structural and semantic checks over the finished scene.
//!
//! Recoverable defects are logged and repaired in place (indices clamped,
//! broken faces dropped, channels compacted); a scene that ends up without
//! any geometry while claiming to have some is rejected.

use crate::{
    scene::{Scene, SceneFlags},
    Error, ErrorKind,
};

const WEIGHT_SUM_MIN: f32 = 0.995;
const WEIGHT_SUM_MAX: f32 = 1.005;

pub fn validate(scene: &mut Scene) -> Result<(), Error> {
    validate_meshes(scene)?;
    validate_materials(scene);
    validate_nodes(scene);
    validate_animations(scene);

    scene.flags |= SceneFlags::VALIDATED;

    Ok(())
}

// texture slots of a kind must be dense from index zero
fn validate_materials(scene: &Scene) {
    use crate::scene::{material::TextureStack, TextureKind};

    for (material_idx, material) in scene.materials.iter().enumerate() {
        for kind in TextureKind::ALL.iter().copied() {
            let dense = material.texture_count(kind);
            let sparse = (dense..dense + 8).any(|index| {
                material
                    .value(&crate::scene::material::PropertyKey::texture(
                        TextureStack::File,
                        kind,
                        index + 1,
                    ))
                    .is_some()
            });
            if sparse {
                warn!(
                    "material {}: texture stack {:?} has a hole below its top slot",
                    material_idx, kind
                );
            }
        }
    }
}

fn validate_meshes(scene: &mut Scene) -> Result<(), Error> {
    let material_count = scene.materials.len();
    for (mesh_idx, mesh) in scene.meshes.iter_mut().enumerate() {
        if mesh.material as usize >= material_count {
            warn!(
                "mesh {} references material {} of {}, clamping",
                mesh_idx, mesh.material, material_count
            );
            mesh.material = material_count.saturating_sub(1) as u32;
        }

        let vertex_count = mesh.positions.len() as u32;
        let before = mesh.faces.len();
        mesh.faces.retain(|face| {
            face.indices.len() >= 3 && face.indices.iter().all(|index| *index < vertex_count)
        });
        if mesh.faces.len() != before {
            warn!(
                "mesh {}: dropped {} faces with too few or out-of-range indices",
                mesh_idx,
                before - mesh.faces.len()
            );
        }

        // parallel vertex streams must match the position count
        if let Some(normals) = &mesh.normals {
            if normals.len() != mesh.positions.len() {
                warn!("mesh {}: normal count mismatch, discarding normals", mesh_idx);
                mesh.normals = None;
            }
        }

        // channels must be packed from zero upward
        for k in 1..mesh.texcoords.len() {
            if mesh.texcoords[k].is_some() && mesh.texcoords[k - 1].is_none() {
                warn!("mesh {}: texture coordinate channel {} has a hole below it", mesh_idx, k);
                mesh.texcoords.swap(k - 1, k);
            }
        }
        for k in 1..mesh.colors.len() {
            if mesh.colors[k].is_some() && mesh.colors[k - 1].is_none() {
                warn!("mesh {}: color channel {} has a hole below it", mesh_idx, k);
                mesh.colors.swap(k - 1, k);
            }
        }

        let mut referenced = vec![false; mesh.positions.len()];
        for face in &mesh.faces {
            for &index in &face.indices {
                referenced[index as usize] = true;
            }
        }
        let orphans = referenced.iter().filter(|r| !**r).count();
        if orphans > 0 {
            warn!("mesh {}: {} vertices are referenced by no face", mesh_idx, orphans);
        }

        for bone in &mesh.bones {
            for weight in &bone.weights {
                if weight.vertex >= vertex_count {
                    warn!(
                        "mesh {}: bone {:?} weights vertex {} of {}",
                        mesh_idx, bone.name, weight.vertex, vertex_count
                    );
                }
            }
        }

        for (vertex, sum) in mesh.weight_sums().iter().enumerate() {
            if *sum != 0.0 && (*sum < WEIGHT_SUM_MIN || *sum > WEIGHT_SUM_MAX) {
                warn!(
                    "mesh {}: bone weights of vertex {} sum to {}",
                    mesh_idx, vertex, sum
                );
            }
        }
    }

    let has_meshes = !scene.meshes.is_empty();
    let has_faces = scene.face_count() > 0;
    let skeleton_only = scene.flags.contains(SceneFlags::ANIM_SKELETON_ONLY)
        || scene.flags.contains(SceneFlags::INCOMPLETE);
    if has_meshes && !has_faces && !skeleton_only {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "no face survived validation",
        ));
    }

    Ok(())
}

fn validate_nodes(scene: &mut Scene) {
    let mesh_count = scene.meshes.len();
    let mut dropped = 0;
    let mut fix = |node: &mut crate::scene::Node| {
        let before = node.meshes.len();
        node.meshes.retain(|index| *index < mesh_count);
        dropped += before - node.meshes.len();
    };

    fn walk(node: &mut crate::scene::Node, fix: &mut impl FnMut(&mut crate::scene::Node)) {
        fix(node);
        for child in &mut node.children {
            walk(child, fix);
        }
    }

    walk(&mut scene.root, &mut fix);

    if dropped > 0 {
        warn!("{} node mesh references were out of range and removed", dropped);
    }
}

fn validate_animations(scene: &Scene) {
    let mut bone_names = vec![];
    for mesh in &scene.meshes {
        for bone in &mesh.bones {
            bone_names.push(bone.name.as_str());
        }
    }

    for (anim_idx, anim) in scene.animations.iter().enumerate() {
        for channel in &anim.channels {
            if !bone_names.is_empty() && !bone_names.contains(&channel.name.as_str()) {
                warn!(
                    "animation {}: channel {:?} matches no mesh bone",
                    anim_idx, channel.name
                );
            }

            let check = |times: &mut dyn Iterator<Item = f64>, what: &str| {
                let mut last = f64::NEG_INFINITY;
                for time in times {
                    if time <= last {
                        warn!(
                            "animation {}: {} keys of {:?} are not strictly increasing",
                            anim_idx, what, channel.name
                        );
                        break;
                    }

                    if time < 0.0 || time > anim.duration {
                        warn!(
                            "animation {}: {} key at {} lies outside [0, {}]",
                            anim_idx, what, time, anim.duration
                        );
                    }

                    last = time;
                }
            };

            check(&mut channel.position_keys.iter().map(|k| k.time), "position");
            check(&mut channel.rotation_keys.iter().map(|k| k.time), "rotation");
            check(&mut channel.scale_keys.iter().map(|k| k.time), "scale");
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            math::vec3,
            scene::{Face, Material, Mesh},
        },
    };

    fn triangle_mesh() -> Mesh {
        let mut mesh = Mesh::default();
        mesh.positions = vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        ];
        mesh.faces = vec![Face::triangle(0, 1, 2)];
        mesh.material = 0;

        mesh
    }

    #[test]
    pub fn valid_scene_is_flagged() {
        let mut scene = Scene::new();
        scene.materials.push(Material::new());
        scene.meshes.push(triangle_mesh());

        validate(&mut scene).unwrap();

        assert!(scene.flags.contains(SceneFlags::VALIDATED));
    }

    #[test]
    pub fn broken_faces_are_dropped() {
        let mut scene = Scene::new();
        scene.materials.push(Material::new());
        let mut mesh = triangle_mesh();
        mesh.faces.push(Face::triangle(0, 1, 99));
        mesh.faces.push(Face {
            indices: vec![0, 1],
            smoothing: 0,
        });
        scene.meshes.push(mesh);

        validate(&mut scene).unwrap();

        assert_eq!(scene.meshes[0].faces.len(), 1);
    }

    #[test]
    pub fn all_faces_lost_is_fatal() {
        let mut scene = Scene::new();
        scene.materials.push(Material::new());
        let mut mesh = triangle_mesh();
        mesh.faces = vec![Face::triangle(7, 8, 9)];
        scene.meshes.push(mesh);

        assert!(validate(&mut scene).is_err());
    }

    #[test]
    pub fn skeleton_only_scene_passes_without_faces() {
        let mut scene = Scene::new();
        scene.flags |= SceneFlags::ANIM_SKELETON_ONLY | SceneFlags::INCOMPLETE;

        validate(&mut scene).unwrap();
    }

    #[test]
    pub fn unpacked_channels_are_compacted() {
        use crate::scene::mesh::TexCoordChannel;

        let mut scene = Scene::new();
        scene.materials.push(Material::new());
        let mut mesh = triangle_mesh();
        mesh.texcoords[1] = Some(TexCoordChannel {
            components: 2,
            data: vec![vec3(0.0, 0.0, 0.0); 3],
        });
        scene.meshes.push(mesh);

        validate(&mut scene).unwrap();

        assert!(scene.meshes[0].texcoords[0].is_some());
        assert!(scene.meshes[0].texcoords[1].is_none());
    }
}
