//! Replaces the "no material assigned" sentinel and out-of-range material
//! references with a guaranteed-present default material.
//!
//! Some exporters write their own default material; one is recognized by a
//! name containing "default", a grey diffuse color and the absence of any
//! texture, and reused instead of creating a second one.

use crate::{
    math::vec3,
    scene::{
        material::{PropertyKey, KEY_COLOR_DIFFUSE, KEY_NAME},
        mesh::DEFAULT_MATERIAL_SENTINEL,
        Material, Scene,
    },
    math::Vec3,
};

/// Name given to the default material when none was found in the file.
pub const DEFAULT_MATERIAL_NAME: &str = "%%%DEFAULT";

fn is_default_candidate(material: &Material) -> bool {
    let name = match material.name() {
        Some(name) => name,
        None => return false,
    };
    if !name.to_lowercase().contains("default") {
        return false;
    }

    match material.get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE)) {
        Some(diffuse) if diffuse.x == diffuse.y && diffuse.x == diffuse.z => {}
        _ => return false,
    }

    !material.has_any_texture()
}

pub fn replace(scene: &mut Scene) {
    let materials = &mut scene.materials;
    let mut default_idx = materials.iter().position(is_default_candidate);

    let mut reassigned = 0;
    for mesh in &mut scene.meshes {
        let out_of_range = mesh.material != DEFAULT_MATERIAL_SENTINEL
            && mesh.material as usize >= materials.len();
        if mesh.material == DEFAULT_MATERIAL_SENTINEL || out_of_range {
            if out_of_range {
                warn!(
                    "material index {} is out of range, assigning the default material",
                    mesh.material
                );
            }

            let idx = match default_idx {
                Some(idx) => idx,
                None => {
                    let mut material = Material::new();
                    material.add_str(PropertyKey::scalar(KEY_NAME), DEFAULT_MATERIAL_NAME);
                    material
                        .add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), vec3(0.3, 0.3, 0.3));
                    materials.push(material);
                    default_idx = Some(materials.len() - 1);

                    materials.len() - 1
                }
            };

            mesh.material = idx as u32;
            reassigned += 1;
        }
    }

    if reassigned > 0 {
        debug!("{} meshes reassigned to the default material", reassigned);
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::scene::Mesh};

    fn mesh_with_material(material: u32) -> Mesh {
        let mut mesh = Mesh::default();
        mesh.material = material;
        mesh
    }

    #[test]
    pub fn sentinel_creates_default_material() {
        let mut scene = Scene::new();
        scene.meshes.push(mesh_with_material(DEFAULT_MATERIAL_SENTINEL));

        replace(&mut scene);

        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.meshes[0].material, 0);
        assert_eq!(
            scene.materials[0].name().as_deref(),
            Some(DEFAULT_MATERIAL_NAME)
        );
        assert_eq!(
            scene.materials[0].get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE)),
            Some(vec3(0.3, 0.3, 0.3))
        );
    }

    #[test]
    pub fn existing_grey_default_is_reused() {
        let mut scene = Scene::new();
        let mut material = Material::new();
        material.add_str(PropertyKey::scalar(KEY_NAME), "DEFAULT_GREY");
        material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), vec3(0.5, 0.5, 0.5));
        scene.materials.push(material);
        scene.meshes.push(mesh_with_material(DEFAULT_MATERIAL_SENTINEL));
        scene.meshes.push(mesh_with_material(17));

        replace(&mut scene);

        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.meshes[0].material, 0);
        assert_eq!(scene.meshes[1].material, 0);
    }

    #[test]
    pub fn textured_default_is_not_a_candidate() {
        use crate::scene::{TextureKind, TextureStack};

        let mut scene = Scene::new();
        let mut material = Material::new();
        material.add_str(PropertyKey::scalar(KEY_NAME), "default");
        material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), vec3(0.5, 0.5, 0.5));
        material.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0),
            "oops.png",
        );
        scene.materials.push(material);
        scene.meshes.push(mesh_with_material(DEFAULT_MATERIAL_SENTINEL));

        replace(&mut scene);

        assert_eq!(scene.materials.len(), 2);
        assert_eq!(scene.meshes[0].material, 1);
    }

    #[test]
    pub fn valid_indices_are_untouched() {
        let mut scene = Scene::new();
        scene.materials.push(Material::new());
        scene.meshes.push(mesh_with_material(0));

        replace(&mut scene);

        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.meshes[0].material, 0);
    }
}
