//! Drops selected vertex streams from every mesh.
//!
//! After removal the surviving texture coordinate and color channels are
//! compacted toward index zero so that channel `k + 1` never exists without
//! channel `k`.

use crate::scene::{Mesh, Scene};

bitflags! {
    pub struct ComponentFlags: u32 {
        const NORMALS = 0x2;
        const TANGENTS_AND_BITANGENTS = 0x4;

        /// All vertex color channels at once.
        const COLORS = 0x8;

        /// All texture coordinate channels at once.
        const TEXCOORDS = 0x10;

        const BONE_WEIGHTS = 0x20;
        const ANIMATIONS = 0x40;

        const COLOR_0 = 1 << 20;
        const COLOR_1 = 1 << 21;
        const COLOR_2 = 1 << 22;
        const COLOR_3 = 1 << 23;

        const TEXCOORD_0 = 1 << 25;
        const TEXCOORD_1 = 1 << 26;
        const TEXCOORD_2 = 1 << 27;
        const TEXCOORD_3 = 1 << 28;
    }
}

impl ComponentFlags {
    /// Flag selecting a single vertex color channel.
    pub fn color_channel(n: usize) -> Self {
        Self::from_bits_truncate((Self::COLOR_0.bits()) << n)
    }

    /// Flag selecting a single texture coordinate channel.
    pub fn texcoord_channel(n: usize) -> Self {
        Self::from_bits_truncate((Self::TEXCOORD_0.bits()) << n)
    }
}

pub fn remove(scene: &mut Scene, flags: ComponentFlags) {
    if flags.is_empty() {
        warn!("component removal requested with an empty mask, nothing selected");
        return;
    }

    let mut touched = false;
    for mesh in &mut scene.meshes {
        touched |= remove_from_mesh(mesh, flags);
    }

    if flags.contains(ComponentFlags::ANIMATIONS) && !scene.animations.is_empty() {
        scene.animations.clear();
        touched = true;
    }

    if touched {
        info!("the selected vertex components have been removed");
    } else {
        debug!("component removal had nothing to do");
    }
}

fn remove_from_mesh(mesh: &mut Mesh, flags: ComponentFlags) -> bool {
    let mut touched = false;

    if flags.contains(ComponentFlags::NORMALS) && mesh.normals.is_some() {
        mesh.normals = None;
        touched = true;
    }

    if flags.contains(ComponentFlags::TANGENTS_AND_BITANGENTS)
        && (mesh.tangents.is_some() || mesh.bitangents.is_some())
    {
        mesh.tangents = None;
        mesh.bitangents = None;
        touched = true;
    }

    if flags.contains(ComponentFlags::BONE_WEIGHTS) && !mesh.bones.is_empty() {
        mesh.bones.clear();
        touched = true;
    }

    let all_tex = flags.contains(ComponentFlags::TEXCOORDS);
    for n in 0..mesh.texcoords.len() {
        if mesh.texcoords[n].is_some() && (all_tex || flags.contains(ComponentFlags::texcoord_channel(n))) {
            mesh.texcoords[n] = None;
            touched = true;
        }
    }

    let all_colors = flags.contains(ComponentFlags::COLORS);
    for n in 0..mesh.colors.len() {
        if mesh.colors[n].is_some() && (all_colors || flags.contains(ComponentFlags::color_channel(n))) {
            mesh.colors[n] = None;
            touched = true;
        }
    }

    if touched {
        compact(mesh);
    }

    touched
}

// slide the surviving channels left so no hole remains
fn compact(mesh: &mut Mesh) {
    let mut write = 0;
    for read in 0..mesh.texcoords.len() {
        if mesh.texcoords[read].is_some() {
            mesh.texcoords.swap(write, read);
            write += 1;
        }
    }

    let mut write = 0;
    for read in 0..mesh.colors.len() {
        if mesh.colors[read].is_some() {
            mesh.colors.swap(write, read);
            write += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            math::{vec3, vec4},
            scene::mesh::TexCoordChannel,
        },
    };

    fn mesh_with_channels() -> Mesh {
        let mut mesh = Mesh::default();
        mesh.positions = vec![vec3(0.0, 0.0, 0.0)];
        mesh.normals = Some(vec![vec3(0.0, 1.0, 0.0)]);
        for n in 0..3 {
            mesh.texcoords[n] = Some(TexCoordChannel {
                components: 2,
                data: vec![vec3(n as f32, 0.0, 0.0)],
            });
        }
        mesh.colors[0] = Some(vec![vec4(1.0, 0.0, 0.0, 1.0)]);

        mesh
    }

    #[test]
    pub fn middle_channel_removal_compacts() {
        let mut scene = Scene::new();
        scene.meshes.push(mesh_with_channels());

        remove(&mut scene, ComponentFlags::texcoord_channel(1));

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.texcoord_channel_count(), 2);
        assert_eq!(mesh.texcoords[0].as_ref().unwrap().data[0].x, 0.0);
        assert_eq!(mesh.texcoords[1].as_ref().unwrap().data[0].x, 2.0);
        assert!(mesh.texcoords[2].is_none());
    }

    #[test]
    pub fn group_flags_clear_everything() {
        let mut scene = Scene::new();
        scene.meshes.push(mesh_with_channels());

        remove(
            &mut scene,
            ComponentFlags::TEXCOORDS | ComponentFlags::COLORS | ComponentFlags::NORMALS,
        );

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.texcoord_channel_count(), 0);
        assert_eq!(mesh.color_channel_count(), 0);
        assert!(mesh.normals.is_none());
        assert!(!mesh.positions.is_empty());
    }

    #[test]
    pub fn empty_mask_is_a_no_op() {
        let mut scene = Scene::new();
        scene.meshes.push(mesh_with_channels());

        remove(&mut scene, ComponentFlags::empty());

        assert_eq!(scene.meshes[0].texcoord_channel_count(), 3);
    }
}
