//! Decoder for Doom 3 MD5 meshes and animations.
//!
//! Both file kinds share the section syntax handled by [`parser`]. A mesh
//! file carries the joint hierarchy plus skinned meshes; an animation file
//! carries per-frame component values selected by per-joint flag bits. A
//! lone animation still produces a scene, flagged as skeleton-only.

pub(crate) mod parser;

use {
    self::parser::{next_float, next_int, next_string, next_token, next_triple, Section},
    crate::{
        config::Config,
        imp::{Decoder, RawAsset},
        math::{vec3, Mat4, Quat, Vec2, Vec3},
        scene::{
            material::{PropertyKey, TextureStack},
            Animation, Bone, Face, Material, Mesh, Node, NodeChannel, QuatKey, Scene, SceneFlags,
            TexCoordChannel, TextureKind, VectorKey, VertexWeight,
        },
        Error, ErrorKind,
    },
};

// animation flag bits: which components are stored per frame
const FLAG_TX: u32 = 0x1;
const FLAG_TY: u32 = 0x2;
const FLAG_TZ: u32 = 0x4;
const FLAG_QX: u32 = 0x8;
const FLAG_QY: u32 = 0x10;
const FLAG_QZ: u32 = 0x20;

struct Joint {
    name: String,
    parent: i32,
    position: Vec3,
    rotation: Quat,
}

#[derive(Clone, Copy, Default)]
struct VertexDesc {
    first_weight: usize,
    num_weights: usize,
    uv: Vec2,
}

#[derive(Clone, Copy, Default)]
struct WeightDesc {
    bone: usize,
    offset: Vec3,
    weight: f32,
}

#[derive(Default)]
struct MeshDesc {
    faces: Vec<[u32; 3]>,
    shader: String,
    vertices: Vec<VertexDesc>,
    weights: Vec<WeightDesc>,
}

struct AnimJoint {
    first_key: usize,
    flags: u32,
    name: String,
    parent: i32,
}

#[derive(Clone, Copy, Default)]
struct BaseFrame {
    position: Vec3,
    rotation: Vec3,
}

// MD5 stores normalized quaternions without w; reconstruct it
fn quat_from_xyz(v: Vec3) -> Quat {
    let t = 1.0 - v.length_squared();
    let w = if t <= 0.0 { 0.0 } else { -t.sqrt() };

    Quat::from_xyzw(v.x, v.y, v.z, w)
}

pub struct Md5Decoder;

impl Decoder for Md5Decoder {
    fn name(&self) -> &'static str {
        "MD5"
    }

    fn can_read(&self, extension: &str) -> bool {
        matches!(extension, "md5" | "md5mesh" | "md5anim")
    }

    fn read(&self, asset: &RawAsset<'_>, _config: &Config) -> Result<Scene, Error> {
        let text = String::from_utf8_lossy(asset.bytes);
        let sections = parser::parse_sections(&text).map_err(|err| err.with_format("MD5"))?;

        let has_mesh = sections
            .iter()
            .any(|section| section.name == "mesh" || section.name == "joints");
        let has_anim = sections
            .iter()
            .any(|section| section.name == "hierarchy" || section.name == "baseframe");

        let mut scene = Scene::new();
        if has_mesh {
            build_mesh_scene(&sections, &mut scene).map_err(|err| err.with_format("MD5"))?;
        } else if has_anim {
            build_anim_scene(&sections, &mut scene).map_err(|err| err.with_format("MD5"))?;

            // there is nothing but the animation skeleton in this file
            scene.flags |= SceneFlags::ANIM_SKELETON_ONLY | SceneFlags::INCOMPLETE;
        } else {
            return Err(Error::new(
                ErrorKind::InvalidGeometry,
                "failed to read valid data from this MD5",
            )
            .with_format("MD5"));
        }

        Ok(scene)
    }
}

fn parse_joints(section: &Section) -> Vec<Joint> {
    let mut res = vec![];
    for element in &section.elements {
        let mut cursor = element.text.as_str();
        let name = next_string(&mut cursor, element.line);
        let parent = next_int(&mut cursor, element.line) as i32;
        let position = next_triple(&mut cursor, element.line);
        let rotation = next_triple(&mut cursor, element.line);

        res.push(Joint {
            name,
            parent,
            position: Vec3::from(position),
            rotation: quat_from_xyz(Vec3::from(rotation)),
        });
    }

    res
}

fn parse_mesh(section: &Section) -> MeshDesc {
    let mut desc = MeshDesc::default();
    for element in &section.elements {
        let mut cursor = element.text.as_str();
        let keyword = match next_token(&mut cursor) {
            Some(keyword) => keyword,
            None => continue,
        };

        match keyword {
            "shader" => desc.shader = next_string(&mut cursor, element.line),
            "numverts" => {
                let count = next_int(&mut cursor, element.line).max(0) as usize;
                desc.vertices.resize(count, VertexDesc::default());
            }
            "numtris" => {
                let count = next_int(&mut cursor, element.line).max(0) as usize;
                desc.faces.resize(count, [0; 3]);
            }
            "numweights" => {
                let count = next_int(&mut cursor, element.line).max(0) as usize;
                desc.weights.resize(count, WeightDesc::default());
            }
            // vert 0 ( 0.394531 0.513672 ) 0 1
            "vert" => {
                let index = next_int(&mut cursor, element.line).max(0) as usize;
                if index >= desc.vertices.len() {
                    desc.vertices.resize(index + 1, VertexDesc::default());
                }

                let vert = &mut desc.vertices[index];
                if next_token(&mut cursor) != Some("(") {
                    parser::report_warning("unexpected token: ( was expected", element.line);
                }
                vert.uv.x = next_float(&mut cursor, element.line);
                vert.uv.y = next_float(&mut cursor, element.line);
                if next_token(&mut cursor) != Some(")") {
                    parser::report_warning("unexpected token: ) was expected", element.line);
                }
                vert.first_weight = next_int(&mut cursor, element.line).max(0) as usize;
                vert.num_weights = next_int(&mut cursor, element.line).max(0) as usize;
            }
            // tri 0 15 13 12
            "tri" => {
                let index = next_int(&mut cursor, element.line).max(0) as usize;
                if index >= desc.faces.len() {
                    desc.faces.resize(index + 1, [0; 3]);
                }

                for corner in 0..3 {
                    desc.faces[index][corner] =
                        next_int(&mut cursor, element.line).max(0) as u32;
                }
            }
            // weight 362 5 0.500000 ( -3.553583 11.893474 9.719339 )
            "weight" => {
                let index = next_int(&mut cursor, element.line).max(0) as usize;
                if index >= desc.weights.len() {
                    desc.weights.resize(index + 1, WeightDesc::default());
                }

                let weight = &mut desc.weights[index];
                weight.bone = next_int(&mut cursor, element.line).max(0) as usize;
                weight.weight = next_float(&mut cursor, element.line);
                weight.offset = Vec3::from(next_triple(&mut cursor, element.line));
            }
            _ => (),
        }
    }

    desc
}

// duplicate vertices referenced by more than one face so that each face
// owns its corners
fn make_data_unique(desc: &mut MeshDesc) {
    let mut seen = vec![false; desc.vertices.len()];
    for face in &mut desc.faces {
        for index in face.iter_mut() {
            let slot = *index as usize;
            if slot >= desc.vertices.len() {
                warn!("triangle references vertex {} of {}", slot, desc.vertices.len());
                *index = 0;
                continue;
            }

            if seen[slot] {
                desc.vertices.push(desc.vertices[slot]);
                *index = desc.vertices.len() as u32 - 1;
            } else {
                seen[slot] = true;
            }
        }
    }
}

fn joint_hierarchy(joints: &[Joint]) -> Node {
    // joint transforms in the file are absolute; node transforms are
    // relative to the parent
    fn attach(parent_id: i32, joints: &[Joint], abs: &[Mat4]) -> Vec<Node> {
        let mut res = vec![];
        for (id, joint) in joints.iter().enumerate() {
            if joint.parent != parent_id || id as i32 == parent_id {
                continue;
            }

            let mut node = Node::new(joint.name.clone());
            node.transform = if parent_id >= 0 {
                abs[parent_id as usize].inverse() * abs[id]
            } else {
                abs[id]
            };
            node.children = attach(id as i32, joints, abs);
            res.push(node);
        }

        res
    }

    let abs: Vec<Mat4> = joints
        .iter()
        .map(|joint| Mat4::from_rotation_translation(joint.rotation, joint.position))
        .collect();

    let mut node = Node::new("<MD5_Hierarchy>");
    node.children = attach(-1, joints, &abs);

    node
}

fn build_mesh_scene(sections: &[Section], scene: &mut Scene) -> Result<(), Error> {
    let joints = sections
        .iter()
        .find(|section| section.name == "joints")
        .map(|section| parse_joints(section))
        .unwrap_or_default();

    let mut mesh_node = Node::new("<MD5_Mesh>");
    for section in sections.iter().filter(|section| section.name == "mesh") {
        let mut desc = parse_mesh(section);

        // empty meshes occur in files exported from Blender
        if desc.faces.is_empty() || desc.vertices.is_empty() {
            continue;
        }

        make_data_unique(&mut desc);

        let mut mesh = Mesh::default();
        mesh.material = scene.materials.len() as u32;

        let mut uv = Vec::with_capacity(desc.vertices.len());
        let mut bone_weights: Vec<Vec<VertexWeight>> = vec![vec![]; joints.len()];
        for (vertex_id, vert) in desc.vertices.iter().enumerate() {
            let weights = desc
                .weights
                .get(vert.first_weight..vert.first_weight + vert.num_weights)
                .unwrap_or(&[]);

            // some models carry weights which do not sum to one
            let sum: f32 = weights.iter().map(|weight| weight.weight).sum();
            if sum == 0.0 && !weights.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidGeometry,
                    "the sum of all vertex bone weights is 0",
                ));
            }

            let mut position = Vec3::ZERO;
            for weight in weights {
                let joint = match joints.get(weight.bone) {
                    Some(joint) => joint,
                    None => {
                        warn!("vertex weight references a missing joint");
                        continue;
                    }
                };

                // the offset position lives in joint space
                position += (joint.rotation * weight.offset + joint.position) * weight.weight;

                bone_weights[weight.bone].push(VertexWeight {
                    vertex: vertex_id as u32,
                    weight: weight.weight / sum,
                });
            }

            // DOOM is z-up
            mesh.positions.push(vec3(position.x, position.z, position.y));
            uv.push(vec3(vert.uv.x, 1.0 - vert.uv.y, 0.0));
        }

        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: uv,
        });

        for (joint_id, weights) in bone_weights.into_iter().enumerate() {
            if weights.is_empty() {
                continue;
            }

            let joint = &joints[joint_id];
            mesh.bones.push(Bone {
                name: joint.name.clone(),
                offset: Mat4::from_rotation_translation(joint.rotation, joint.position)
                    .inverse(),
                weights,
            });
        }

        for face in &desc.faces {
            mesh.faces.push(Face::triangle(face[0], face[1], face[2]));
        }

        let mut material = Material::new();
        material.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0),
            desc.shader.clone(),
        );
        scene.materials.push(material);

        mesh_node.meshes.push(scene.meshes.len());
        scene.meshes.push(mesh);
    }

    scene.root = Node::new("<MD5_Root>");
    scene.root.children.push(mesh_node);
    scene.root.children.push(joint_hierarchy(&joints));

    Ok(())
}

fn build_anim_scene(sections: &[Section], scene: &mut Scene) -> Result<(), Error> {
    let mut anim_joints = vec![];
    let mut base_frames = vec![];
    let mut frames: Vec<(usize, Vec<f32>)> = vec![];
    let mut frame_rate = 24.0;

    for section in sections {
        match section.name.as_str() {
            // "sheath" 0 63 6
            "hierarchy" => {
                for element in &section.elements {
                    let mut cursor = element.text.as_str();
                    let name = next_string(&mut cursor, element.line);
                    let parent = next_int(&mut cursor, element.line) as i32;
                    let flags = next_int(&mut cursor, element.line).max(0) as u32;
                    if flags > 63 {
                        parser::report_warning(
                            "invalid flag combination in hierarchy section",
                            element.line,
                        );
                    }
                    let first_key = next_int(&mut cursor, element.line).max(0) as usize;

                    anim_joints.push(AnimJoint {
                        first_key,
                        flags,
                        name,
                        parent,
                    });
                }
            }
            "baseframe" => {
                for element in &section.elements {
                    let mut cursor = element.text.as_str();
                    let position = next_triple(&mut cursor, element.line);
                    let rotation = next_triple(&mut cursor, element.line);
                    base_frames.push(BaseFrame {
                        position: Vec3::from(position),
                        rotation: Vec3::from(rotation),
                    });
                }
            }
            "frame" => {
                let index = section.global.parse::<usize>().unwrap_or_else(|_| {
                    parser::report_warning(
                        "a frame section must have a frame index",
                        section.line,
                    );
                    frames.len()
                });

                let mut values = vec![];
                for element in &section.elements {
                    let mut cursor = element.text.as_str();
                    while let Some(token) = next_token(&mut cursor) {
                        values.push(token.parse().unwrap_or(0.0));
                    }
                }

                frames.push((index, values));
            }
            "frameRate" => {
                frame_rate = section.global.parse().unwrap_or(frame_rate);
            }
            _ => (),
        }
    }

    if anim_joints.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "animation contains no bone hierarchy",
        ));
    }

    let mut anim = Animation::default();
    anim.ticks_per_second = frame_rate as f64;
    for joint in &anim_joints {
        anim.channels.push(NodeChannel {
            name: joint.name.clone(),
            ..Default::default()
        });
    }

    for (frame_index, values) in &frames {
        let time = *frame_index as f64;
        anim.cover(time);

        for (joint_id, joint) in anim_joints.iter().enumerate() {
            let base = base_frames.get(joint_id).copied().unwrap_or_default();
            if joint.first_key >= values.len() && joint.flags != 0 {
                error!("keyframe index is out of range");
                continue;
            }

            let mut cursor = joint.first_key;
            let mut component = |flag: u32, fallback: f32| -> f32 {
                if joint.flags & flag != 0 {
                    let val = values.get(cursor).copied().unwrap_or(fallback);
                    cursor += 1;
                    val
                } else {
                    fallback
                }
            };

            let position = vec3(
                component(FLAG_TX, base.position.x),
                component(FLAG_TY, base.position.y),
                component(FLAG_TZ, base.position.z),
            );
            let rotation = vec3(
                component(FLAG_QX, base.rotation.x),
                component(FLAG_QY, base.rotation.y),
                component(FLAG_QZ, base.rotation.z),
            );

            let channel = &mut anim.channels[joint_id];
            channel.position_keys.push(VectorKey {
                time,
                value: position,
            });
            channel.rotation_keys.push(QuatKey {
                time,
                value: quat_from_xyz(rotation),
            });
        }
    }

    // rebuild the node hierarchy so the channels have something to animate
    let default_base = BaseFrame::default();
    let joints: Vec<Joint> = anim_joints
        .iter()
        .zip(base_frames.iter().chain(std::iter::repeat(&default_base)))
        .map(|(joint, base)| Joint {
            name: joint.name.clone(),
            parent: joint.parent,
            position: base.position,
            rotation: quat_from_xyz(base.rotation),
        })
        .collect();
    scene.root = Node::new("<MD5_Root>");
    scene.root.children.push(joint_hierarchy(&joints));

    scene.animations.push(anim);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANIM_ONLY: &str = r#"MD5Version 10
commandline ""

numFrames 2
numJoints 1
frameRate 30
numAnimatedComponents 6

hierarchy {
	"root"	-1 63 0
}

baseframe {
	( 0.0 1.0 0.0 ) ( 0.0 0.0 0.0 )
}

frame 0 {
	 0.0 1.0 0.0 0.0 0.0 0.0
}

frame 1 {
	 0.0 2.0 0.0 0.1 0.0 0.0
}
"#;

    const MESH_ONLY: &str = r#"MD5Version 10
commandline ""

numJoints 1
numMeshes 1

joints {
	"origin"	-1 ( 0.0 0.0 0.0 ) ( 0.0 0.0 0.0 )
}

mesh {
	shader "models/monsters/imp"
	numverts 3
	vert 0 ( 0.0 0.0 ) 0 1
	vert 1 ( 1.0 0.0 ) 0 1
	vert 2 ( 0.0 1.0 ) 0 1
	numtris 1
	tri 0 0 1 2
	numweights 1
	weight 0 0 1.0 ( 1.0 2.0 3.0 )
}
"#;

    fn decode(text: &str) -> Scene {
        let asset = RawAsset::new(text.as_bytes(), "md5");
        Md5Decoder.read(&asset, &Config::new()).unwrap()
    }

    #[test]
    pub fn anim_without_mesh_is_skeleton_only() {
        let scene = decode(ANIM_ONLY);

        assert!(scene.flags.contains(SceneFlags::ANIM_SKELETON_ONLY));
        assert_eq!(scene.animations.len(), 1);
        assert!(scene.meshes.is_empty());

        let anim = &scene.animations[0];
        assert_eq!(anim.ticks_per_second, 30.0);
        assert_eq!(anim.duration, 1.0);
        assert_eq!(anim.channels.len(), 1);
        assert_eq!(anim.channels[0].name, "root");
        assert_eq!(anim.channels[0].position_keys.len(), 2);
        assert_eq!(anim.channels[0].position_keys[1].value, vec3(0.0, 2.0, 0.0));
    }

    #[test]
    pub fn mesh_file_builds_bones_and_weights() {
        let scene = decode(MESH_ONLY);

        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.materials.len(), 1);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.bones.len(), 1);
        assert_eq!(mesh.bones[0].name, "origin");
        assert_eq!(mesh.bones[0].weights.len(), 3);

        // joint at origin with identity rotation: position is the weight
        // offset with y and z swapped
        assert_eq!(mesh.positions[0], vec3(1.0, 3.0, 2.0));

        assert_eq!(
            scene.materials[0].get::<String>(&PropertyKey::texture(
                TextureStack::File,
                TextureKind::Diffuse,
                0
            )),
            Some("models/monsters/imp".to_owned())
        );
    }

    #[test]
    pub fn garbage_is_rejected() {
        let asset = RawAsset::new(b"not an md5 file", "md5");
        assert!(Md5Decoder.read(&asset, &Config::new()).is_err());
    }
}
