//! Bakes per-texture UV transformations into the texture coordinate
//! channels so that renderers never have to evaluate them.
//!
//! Decoders record a five-float `$tex.uvtrafo` property (scale u/v, offset
//! u/v, rotation in radians) next to each texture slot. One distinct
//! transform per material is applied to channel 0 in place; several distinct
//! transforms fan out into additional channels and each texture's
//! `$tex.uvwsrc` is rewritten to its channel. Transform properties are
//! consumed by this step, which makes re-running it a no-op.

use crate::{
    config::Config,
    scene::{
        material::{PropertyKey, TextureStack},
        Material, Scene, TextureKind, MAX_TEXCOORD_CHANNELS,
    },
};

const TWO_PI: f32 = 2.0 * std::f32::consts::PI;

/// Which parts of a transform the step is allowed to bake.
pub const PROCESS_SCALE: u32 = 0x1;
pub const PROCESS_ROTATION: u32 = 0x2;
pub const PROCESS_TRANSLATION: u32 = 0x4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvTransform {
    pub offset_u: f32,
    pub offset_v: f32,
    pub rotation: f32,
    pub scale_u: f32,
    pub scale_v: f32,
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            offset_u: 0.0,
            offset_v: 0.0,
            rotation: 0.0,
            scale_u: 1.0,
            scale_v: 1.0,
        }
    }
}

impl UvTransform {
    pub fn to_floats(self) -> Vec<f32> {
        vec![
            self.scale_u,
            self.scale_v,
            self.offset_u,
            self.offset_v,
            self.rotation,
        ]
    }

    pub fn from_floats(data: &[f32]) -> Option<Self> {
        if data.len() < 5 {
            return None;
        }

        Some(Self {
            scale_u: data[0],
            scale_v: data[1],
            offset_u: data[2],
            offset_v: data[3],
            rotation: data[4],
        })
    }

    pub fn is_identity(self) -> bool {
        self == Self::default()
    }

    /// Snaps the documented redundancies of broken exporters: whole-number
    /// offsets become 1 and rotations within ±0.05 rad of a full turn
    /// become 0.
    fn normalized(mut self) -> Self {
        if self.offset_u != 0.0 && self.offset_u % 1.0 == 0.0 {
            warn!("whole-number u offset {} snapped to 1", self.offset_u);
            self.offset_u = 1.0;
        }

        if self.offset_v != 0.0 && self.offset_v % 1.0 == 0.0 {
            warn!("whole-number v offset {} snapped to 1", self.offset_v);
            self.offset_v = 1.0;
        }

        if self.rotation != 0.0 {
            let remainder = self.rotation % TWO_PI;
            if remainder.abs() <= 0.05 {
                warn!("rotation {} is a whole number of turns, snapped to 0", self.rotation);
                self.rotation = 0.0;
            }
        }

        self
    }

    fn masked(mut self, process: u32) -> Self {
        if process & PROCESS_SCALE == 0 {
            self.scale_u = 1.0;
            self.scale_v = 1.0;
        }

        if process & PROCESS_ROTATION == 0 {
            self.rotation = 0.0;
        }

        if process & PROCESS_TRANSLATION == 0 {
            self.offset_u = 0.0;
            self.offset_v = 0.0;
        }

        self
    }

    fn apply(self, uv: (f32, f32), legacy_rotation: bool) -> (f32, f32) {
        let mut x = uv.0 * self.scale_u;
        let mut y = uv.1 * self.scale_v;

        if self.rotation != 0.0 {
            let sin = self.rotation.sin();
            let cos = self.rotation.cos();
            if legacy_rotation {
                // historical behavior kept for byte-compatible output
                x *= cos;
                y *= sin;
            } else {
                let (rx, ry) = (x * cos - y * sin, x * sin + y * cos);
                x = rx;
                y = ry;
            }
        }

        (x + self.offset_u, y + self.offset_v)
    }
}

struct Slot {
    kind: TextureKind,
    index: u32,
    transform: UvTransform,
}

fn collect_slots(material: &Material, process: u32) -> Vec<Slot> {
    let mut res = vec![];
    for kind in TextureKind::ALL.iter().copied() {
        for index in 0..material.texture_count(kind) {
            let key = PropertyKey::texture(TextureStack::Transform, kind, index);
            if let Some(data) = material.get::<Vec<f32>>(&key) {
                if let Some(transform) = UvTransform::from_floats(&data) {
                    res.push(Slot {
                        kind,
                        index,
                        transform: transform.normalized().masked(process),
                    });
                }
            }
        }
    }

    res
}

/// Runs the baking step over the whole scene.
pub fn bake(scene: &mut Scene, config: &Config) {
    let process = config.uv_transform_process();
    let legacy_rotation = config.uv_legacy_rotation();

    for material_idx in 0..scene.materials.len() {
        let slots = collect_slots(&scene.materials[material_idx], process);
        if slots.is_empty() {
            continue;
        }

        // distinct non-identity transforms decide how many channels we need
        let mut unique: Vec<UvTransform> = vec![];
        for slot in &slots {
            if !slot.transform.is_identity() && !unique.contains(&slot.transform) {
                unique.push(slot.transform);
            }
        }

        let material = &mut scene.materials[material_idx];
        if unique.is_empty() {
            for slot in &slots {
                consume(material, slot, 0);
            }
            continue;
        }

        for mesh in scene
            .meshes
            .iter_mut()
            .filter(|mesh| mesh.material as usize == material_idx)
        {
            let base = match &mesh.texcoords[0] {
                Some(channel) => channel.clone(),
                None => continue,
            };

            if unique.len() == 1 {
                info!(
                    "transforming UV channel 0 in place: scale ({}, {}) offset ({}, {}) rotation {}",
                    unique[0].scale_u,
                    unique[0].scale_v,
                    unique[0].offset_u,
                    unique[0].offset_v,
                    unique[0].rotation
                );

                let channel = mesh.texcoords[0].as_mut().unwrap();
                for uv in &mut channel.data {
                    let (x, y) = unique[0].apply((uv.x, uv.y), legacy_rotation);
                    uv.x = x;
                    uv.y = y;
                }
            } else {
                for (channel_idx, transform) in unique.iter().enumerate() {
                    if channel_idx >= MAX_TEXCOORD_CHANNELS {
                        error!(
                            "too many distinct UV transforms for {} channels; \
                             the excess shares channel 0",
                            MAX_TEXCOORD_CHANNELS
                        );
                        break;
                    }

                    info!(
                        "generating UV channel {} from channel 0: scale ({}, {}) offset ({}, {}) rotation {}",
                        channel_idx,
                        transform.scale_u,
                        transform.scale_v,
                        transform.offset_u,
                        transform.offset_v,
                        transform.rotation
                    );

                    let mut channel = base.clone();
                    for uv in &mut channel.data {
                        let (x, y) = transform.apply((uv.x, uv.y), legacy_rotation);
                        uv.x = x;
                        uv.y = y;
                    }

                    mesh.texcoords[channel_idx] = Some(channel);
                }
            }
        }

        for slot in &slots {
            let channel = unique
                .iter()
                .position(|t| *t == slot.transform)
                .filter(|idx| unique.len() > 1 && *idx < MAX_TEXCOORD_CHANNELS)
                .unwrap_or(0);
            consume(material, slot, channel as i32);
        }
    }
}

// the transform has been baked: point the texture at its channel and drop
// the transform property so a second pass finds nothing to do
fn consume(material: &mut Material, slot: &Slot, channel: i32) {
    material.add_i32(
        PropertyKey::texture(TextureStack::UvwSrc, slot.kind, slot.index),
        channel,
    );
    material.remove(&PropertyKey::texture(
        TextureStack::Transform,
        slot.kind,
        slot.index,
    ));
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            math::vec3,
            scene::{mesh::TexCoordChannel, Face, Mesh},
        },
    };

    fn scene_with_transform(transforms: &[(TextureKind, UvTransform)]) -> Scene {
        let mut scene = Scene::new();
        let mut material = Material::new();
        for (idx, (kind, transform)) in transforms.iter().enumerate() {
            material.add_str(
                PropertyKey::texture(TextureStack::File, *kind, 0),
                format!("tex{}.png", idx),
            );
            material.add(
                PropertyKey::texture(TextureStack::Transform, *kind, 0),
                crate::scene::PropertyValue::Floats(transform.to_floats()),
            );
        }
        scene.materials.push(material);

        let mut mesh = Mesh::default();
        mesh.positions = vec![vec3(0.0, 0.0, 0.0); 3];
        mesh.faces = vec![Face::triangle(0, 1, 2)];
        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: vec![vec3(1.0, 1.0, 0.0), vec3(0.5, 0.0, 0.0), vec3(0.0, 0.25, 0.0)],
        });
        scene.meshes.push(mesh);

        scene
    }

    #[test]
    pub fn single_transform_bakes_into_channel_zero() {
        let transform = UvTransform {
            scale_u: 2.0,
            scale_v: 4.0,
            offset_u: 0.5,
            ..Default::default()
        };
        let mut scene = scene_with_transform(&[(TextureKind::Diffuse, transform)]);
        bake(&mut scene, &Config::new());

        let uv = &scene.meshes[0].texcoords[0].as_ref().unwrap().data;
        assert!((uv[0].x - 2.5).abs() < 1e-6);
        assert!((uv[0].y - 4.0).abs() < 1e-6);

        assert_eq!(
            scene.materials[0].get::<i32>(&PropertyKey::texture(
                TextureStack::UvwSrc,
                TextureKind::Diffuse,
                0
            )),
            Some(0)
        );
    }

    #[test]
    pub fn baking_is_idempotent() {
        let transform = UvTransform {
            scale_u: 2.0,
            ..Default::default()
        };
        let mut scene = scene_with_transform(&[(TextureKind::Diffuse, transform)]);
        bake(&mut scene, &Config::new());
        let baked = scene.meshes[0].texcoords[0].as_ref().unwrap().data.clone();

        bake(&mut scene, &Config::new());
        assert_eq!(
            scene.meshes[0].texcoords[0].as_ref().unwrap().data,
            baked
        );
    }

    #[test]
    pub fn distinct_transforms_fan_out_into_channels() {
        let scale = UvTransform {
            scale_u: 2.0,
            ..Default::default()
        };
        let offset = UvTransform {
            offset_u: 0.25,
            ..Default::default()
        };
        let mut scene = scene_with_transform(&[
            (TextureKind::Diffuse, scale),
            (TextureKind::Specular, offset),
        ]);
        bake(&mut scene, &Config::new());

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.texcoord_channel_count(), 2);
        assert!((mesh.texcoords[0].as_ref().unwrap().data[1].x - 1.0).abs() < 1e-6);
        assert!((mesh.texcoords[1].as_ref().unwrap().data[1].x - 0.75).abs() < 1e-6);

        let material = &scene.materials[0];
        assert_eq!(
            material.get::<i32>(&PropertyKey::texture(
                TextureStack::UvwSrc,
                TextureKind::Specular,
                0
            )),
            Some(1)
        );
    }

    #[test]
    pub fn near_turn_rotation_is_snapped() {
        let transform = UvTransform {
            rotation: TWO_PI + 0.01,
            ..Default::default()
        };
        let mut scene = scene_with_transform(&[(TextureKind::Diffuse, transform)]);
        let before = scene.meshes[0].texcoords[0].as_ref().unwrap().data.clone();
        bake(&mut scene, &Config::new());

        assert_eq!(scene.meshes[0].texcoords[0].as_ref().unwrap().data, before);
    }

    #[test]
    pub fn legacy_rotation_flag_changes_output() {
        let transform = UvTransform {
            rotation: 1.0,
            ..Default::default()
        };

        let mut proper = scene_with_transform(&[(TextureKind::Diffuse, transform)]);
        bake(&mut proper, &Config::new());

        let mut config = Config::new();
        config.set("pp.tuv.legacy_rot", true);
        let mut legacy = scene_with_transform(&[(TextureKind::Diffuse, transform)]);
        bake(&mut legacy, &config);

        let a = proper.meshes[0].texcoords[0].as_ref().unwrap().data[0];
        let b = legacy.meshes[0].texcoords[0].as_ref().unwrap().data[0];
        assert!((a - b).length() > 1e-4);

        // the legacy path multiplies the components independently
        assert!((b.x - 1.0f32.cos()).abs() < 1e-6);
        assert!((b.y - 1.0f32.sin()).abs() < 1e-6);
    }
}
