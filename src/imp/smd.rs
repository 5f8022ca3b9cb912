//! Decoder for Valve `.smd` and `.vta` files.
//!
//! The format is line based: a `nodes` section naming the bones, a
//! `skeleton` section with per-frame bone poses and a `triangles` section
//! with one texture line and three vertex lines per triangle. A file with
//! bones but no triangles is an animation and yields a skeleton-only scene.

use {
    crate::{
        config::Config,
        imp::{Decoder, RawAsset},
        math::{vec2, vec3, EulerRot, Mat4, Quat, Vec2, Vec3},
        scene::{
            material::{PropertyKey, TextureStack, KEY_COLOR_DIFFUSE, KEY_NAME},
            Animation, Bone, Face, Material, Mesh, Node, NodeChannel, QuatKey, Scene, SceneFlags,
            TexCoordChannel, TextureKind, VectorKey, VertexWeight,
        },
        Error, ErrorKind,
    },
    std::collections::BTreeMap,
};

#[derive(Clone, Default)]
struct SmdBone {
    frames: Vec<(f64, Vec3, Vec3)>,
    name: String,
    parent: i32,
}

#[derive(Clone)]
struct SmdVertex {
    normal: Vec3,
    parent_bone: i32,
    position: Vec3,
    uv: Vec2,
    weights: Vec<(usize, f32)>,
}

struct SmdTriangle {
    texture: String,
    vertices: Vec<SmdVertex>,
}

#[derive(Default)]
struct Intermediate {
    bones: Vec<SmdBone>,
    triangles: Vec<SmdTriangle>,
}

pub struct SmdDecoder;

impl Decoder for SmdDecoder {
    fn name(&self) -> &'static str {
        "SMD"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "smd" || extension == "vta"
    }

    fn read(&self, asset: &RawAsset<'_>, _config: &Config) -> Result<Scene, Error> {
        let text = String::from_utf8_lossy(asset.bytes);
        let mut scratch = parse(&text).map_err(|err| err.with_format("SMD"))?;

        if scratch.triangles.is_empty() && scratch.bones.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidGeometry,
                "no triangles and no bones have been found in the file",
            )
            .with_format("SMD"));
        }

        for bone in &scratch.bones {
            if bone.name.is_empty() {
                warn!("not all bones have been initialized");
                break;
            }
        }

        fix_time_values(&mut scratch);

        let mut scene = Scene::new();
        let absolute = absolute_bone_transforms(&scratch);
        if scratch.triangles.is_empty() {
            // an animation SMD containing only the skeleton
            scene.flags |= SceneFlags::ANIM_SKELETON_ONLY | SceneFlags::INCOMPLETE;
        } else {
            build_meshes(&scratch, &absolute, &mut scene);
        }

        build_animation(&scratch, &mut scene);
        scene.root = build_nodes(&scratch, &scene);

        Ok(scene)
    }
}

fn parse(text: &str) -> Result<Intermediate, Error> {
    let mut scratch = Intermediate::default();
    let mut lines = text.lines().peekable();
    let mut current_time = 0.0f64;

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("version") => {
                let version: i32 = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
                if version != 1 {
                    warn!("version is not 1, proceeding anyway");
                }
            }
            Some("nodes") => {
                for line in &mut lines {
                    let line = line.trim();
                    if line == "end" {
                        break;
                    }

                    parse_node_line(line, &mut scratch);
                }
            }
            Some("skeleton") => {
                for line in &mut lines {
                    let line = line.trim();
                    if line == "end" {
                        break;
                    }

                    let mut tokens = line.split_whitespace();
                    match tokens.next() {
                        Some("time") => {
                            current_time = tokens
                                .next()
                                .and_then(|t| t.parse().ok())
                                .unwrap_or(current_time);
                        }
                        Some(first) => {
                            parse_skeleton_line(first, tokens, current_time, &mut scratch);
                        }
                        None => (),
                    }
                }
            }
            Some("triangles") => {
                loop {
                    let texture = match lines.next() {
                        Some(line) if line.trim() == "end" => break,
                        Some(line) => line.trim().to_owned(),
                        None => break,
                    };

                    let mut vertices = vec![];
                    for _ in 0..3 {
                        match lines.next() {
                            Some(line) => {
                                if let Some(vertex) = parse_vertex_line(line.trim()) {
                                    vertices.push(vertex);
                                }
                            }
                            None => {
                                warn!("unexpected end of file inside a triangle");
                                break;
                            }
                        }
                    }

                    if vertices.len() == 3 {
                        scratch.triangles.push(SmdTriangle { texture, vertices });
                    }
                }
            }
            Some("vertexanimation") => {
                warn!("vertex animation sections are not supported and were skipped");
                for line in &mut lines {
                    if line.trim() == "end" {
                        break;
                    }
                }
            }
            _ => (),
        }
    }

    Ok(scratch)
}

// 0 "root" -1
fn parse_node_line(line: &str, scratch: &mut Intermediate) {
    let mut tokens = line.split_whitespace();
    let index: usize = match tokens.next().and_then(|t| t.parse().ok()) {
        Some(index) => index,
        None => return,
    };

    // the name may contain spaces when quoted
    let rest = line.splitn(2, char::is_whitespace).nth(1).unwrap_or("");
    let rest = rest.trim_start();
    let (name, rest) = if let Some(stripped) = rest.strip_prefix('"') {
        match stripped.find('"') {
            Some(end) => (stripped[..end].to_owned(), &stripped[end + 1..]),
            None => (stripped.to_owned(), ""),
        }
    } else {
        let end = rest.find(char::is_whitespace).unwrap_or_else(|| rest.len());
        (rest[..end].to_owned(), &rest[end..])
    };

    let parent: i32 = rest.trim().parse().unwrap_or(-1);

    if index >= scratch.bones.len() {
        scratch.bones.resize(index + 1, SmdBone::default());
    }

    scratch.bones[index].name = name;
    scratch.bones[index].parent = parent;
}

// <bone> px py pz rx ry rz
fn parse_skeleton_line<'a>(
    first: &str,
    mut tokens: impl Iterator<Item = &'a str>,
    time: f64,
    scratch: &mut Intermediate,
) {
    let index: usize = match first.parse().ok() {
        Some(index) => index,
        None => return,
    };

    let mut values = [0.0f32; 6];
    for val in &mut values {
        *val = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0.0);
    }

    if index >= scratch.bones.len() {
        scratch.bones.resize(index + 1, SmdBone::default());
    }

    scratch.bones[index].frames.push((
        time,
        vec3(values[0], values[1], values[2]),
        vec3(values[3], values[4], values[5]),
    ));
}

// <parent bone> px py pz nx ny nz u v [count (bone weight)...]
fn parse_vertex_line(line: &str) -> Option<SmdVertex> {
    let mut tokens = line.split_whitespace();
    let parent_bone: i32 = tokens.next()?.parse().ok()?;

    let mut values = [0.0f32; 8];
    for val in &mut values {
        *val = tokens.next()?.parse().ok()?;
    }

    let mut weights = vec![];
    if let Some(count) = tokens.next().and_then(|t| t.parse::<usize>().ok()) {
        for _ in 0..count {
            let bone: usize = tokens.next().and_then(|t| t.parse().ok())?;
            let weight: f32 = tokens.next().and_then(|t| t.parse().ok())?;
            weights.push((bone, weight));
        }
    }

    Some(SmdVertex {
        normal: vec3(values[3], values[4], values[5]),
        parent_bone,
        position: vec3(values[0], values[1], values[2]),
        uv: vec2(values[6], values[7]),
        weights,
    })
}

// animations should start at frame 0, some exporters disagree
fn fix_time_values(scratch: &mut Intermediate) {
    let min = scratch
        .bones
        .iter()
        .flat_map(|bone| bone.frames.iter().map(|frame| frame.0))
        .fold(f64::INFINITY, f64::min);
    if !min.is_finite() || min == 0.0 {
        return;
    }

    for bone in &mut scratch.bones {
        for frame in &mut bone.frames {
            frame.0 -= min;
        }
    }
}

fn local_transform(position: Vec3, rotation: Vec3) -> Mat4 {
    let quat = Quat::from_euler(EulerRot::ZYX, rotation.z, rotation.y, rotation.x);

    Mat4::from_rotation_translation(quat, position)
}

// absolute bind-pose transforms from the first keyframe of every bone
fn absolute_bone_transforms(scratch: &Intermediate) -> Vec<Mat4> {
    fn compute(index: usize, scratch: &Intermediate, cache: &mut Vec<Option<Mat4>>, depth: usize) -> Mat4 {
        if let Some(mat) = cache[index] {
            return mat;
        }

        // broken files may contain a parent loop
        if depth > scratch.bones.len() {
            warn!("bone parent chain is cyclic");
            return Mat4::IDENTITY;
        }

        let bone = &scratch.bones[index];
        let local = bone
            .frames
            .first()
            .map(|frame| local_transform(frame.1, frame.2))
            .unwrap_or(Mat4::IDENTITY);
        let parent = bone.parent;
        let res = if parent >= 0 && (parent as usize) < scratch.bones.len() {
            compute(parent as usize, scratch, cache, depth + 1) * local
        } else {
            local
        };

        cache[index] = Some(res);

        res
    }

    let mut cache = vec![None; scratch.bones.len()];
    (0..scratch.bones.len())
        .map(|index| compute(index, scratch, &mut cache, 0))
        .collect()
}

fn build_meshes(scratch: &Intermediate, absolute: &[Mat4], scene: &mut Scene) {
    // one mesh and one material per referenced texture
    let mut by_texture: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, triangle) in scratch.triangles.iter().enumerate() {
        by_texture.entry(&triangle.texture).or_default().push(index);
    }

    for (texture, triangle_indices) in by_texture {
        let mut mesh = Mesh::default();
        mesh.material = scene.materials.len() as u32;

        let mut normals = vec![];
        let mut uv = vec![];
        let mut bone_weights: Vec<Vec<VertexWeight>> = vec![vec![]; scratch.bones.len()];
        for &triangle_idx in &triangle_indices {
            let triangle = &scratch.triangles[triangle_idx];
            let base = mesh.positions.len() as u32;
            for vertex in &triangle.vertices {
                let vertex_id = mesh.positions.len() as u32;
                mesh.positions.push(vertex.position);
                normals.push(vertex.normal);
                uv.push(vec3(vertex.uv.x, vertex.uv.y, 0.0));

                // explicit links first; whatever weight is left goes to the
                // parent bone
                let mut total = 0.0;
                for &(bone, weight) in &vertex.weights {
                    if bone >= scratch.bones.len() {
                        warn!("vertex weight references bone {} of {}", bone, scratch.bones.len());
                        continue;
                    }

                    bone_weights[bone].push(VertexWeight {
                        vertex: vertex_id,
                        weight,
                    });
                    total += weight;
                }

                if total < 1.0 - 1e-4 {
                    let parent = vertex.parent_bone;
                    if parent >= 0 && (parent as usize) < scratch.bones.len() {
                        bone_weights[parent as usize].push(VertexWeight {
                            vertex: vertex_id,
                            weight: 1.0 - total,
                        });
                    } else if !bone_weights.is_empty() && total == 0.0 {
                        warn!("vertex has no valid bone assignment");
                    }
                }
            }

            mesh.faces.push(Face::triangle(base, base + 1, base + 2));
        }

        mesh.normals = Some(normals);
        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: uv,
        });

        for (bone_idx, weights) in bone_weights.into_iter().enumerate() {
            if weights.is_empty() {
                continue;
            }

            mesh.bones.push(Bone {
                name: scratch.bones[bone_idx].name.clone(),
                offset: absolute[bone_idx].inverse(),
                weights,
            });
        }

        let mut material = Material::new();
        material.add_str(PropertyKey::scalar(KEY_NAME), texture);
        material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), vec3(0.6, 0.6, 0.6));
        material.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0),
            texture,
        );
        scene.materials.push(material);
        scene.meshes.push(mesh);
    }
}

fn build_animation(scratch: &Intermediate, scene: &mut Scene) {
    if scratch.bones.iter().all(|bone| bone.frames.is_empty()) {
        return;
    }

    let mut anim = Animation::default();
    for bone in &scratch.bones {
        let mut channel = NodeChannel {
            name: bone.name.clone(),
            ..Default::default()
        };
        for (time, position, rotation) in &bone.frames {
            anim.cover(*time);
            channel.position_keys.push(VectorKey {
                time: *time,
                value: *position,
            });
            channel.rotation_keys.push(QuatKey {
                time: *time,
                value: Quat::from_euler(EulerRot::ZYX, rotation.z, rotation.y, rotation.x),
            });
        }

        anim.channels.push(channel);
    }

    scene.animations.push(anim);
}

fn build_nodes(scratch: &Intermediate, scene: &Scene) -> Node {
    fn attach(parent: i32, scratch: &Intermediate) -> Vec<Node> {
        let mut res = vec![];
        for (index, bone) in scratch.bones.iter().enumerate() {
            if bone.parent != parent || index as i32 == parent {
                continue;
            }

            let mut node = Node::new(bone.name.clone());
            node.transform = bone
                .frames
                .first()
                .map(|frame| local_transform(frame.1, frame.2))
                .unwrap_or(Mat4::IDENTITY);
            node.children = attach(index as i32, scratch);
            res.push(node);
        }

        res
    }

    let mut root = Node::new("<SMD_Root>");
    root.children = attach(-1, scratch);
    root.meshes.extend(0..scene.meshes.len());

    root
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"version 1
nodes
0 "root" -1
end
skeleton
time 0
0 0.0 0.0 0.0 0.0 0.0 0.0
end
triangles
metal.bmp
0 0.0 0.0 0.0 0.0 0.0 1.0 0.0 0.0
0 1.0 0.0 0.0 0.0 0.0 1.0 1.0 0.0
0 0.0 1.0 0.0 0.0 0.0 1.0 0.0 1.0
end
"#;

    fn decode(text: &str) -> Scene {
        let asset = RawAsset::new(text.as_bytes(), "smd");
        SmdDecoder.read(&asset, &Config::new()).unwrap()
    }

    #[test]
    pub fn one_bone_one_triangle() {
        let scene = decode(TRIANGLE);

        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.animations.len(), 1);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.bones.len(), 1);
        assert_eq!(mesh.bones[0].name, "root");

        // every vertex is fully parented to the one bone
        assert_eq!(mesh.weight_sums(), vec![1.0, 1.0, 1.0]);

        assert_eq!(
            scene.materials[0].get::<String>(&PropertyKey::texture(
                TextureStack::File,
                TextureKind::Diffuse,
                0
            )),
            Some("metal.bmp".to_owned())
        );

        let anim = &scene.animations[0];
        assert_eq!(anim.channels.len(), 1);
        assert_eq!(anim.channels[0].name, "root");
        assert_eq!(anim.channels[0].position_keys.len(), 1);
        assert_eq!(anim.channels[0].position_keys[0].time, 0.0);
    }

    #[test]
    pub fn skeleton_only_file() {
        let scene = decode(
            "version 1\nnodes\n0 \"root\" -1\nend\nskeleton\ntime 5\n0 0 0 0 0 0 0\nend\n",
        );

        assert!(scene.flags.contains(SceneFlags::ANIM_SKELETON_ONLY));
        assert!(scene.meshes.is_empty());

        // times are shifted so the animation starts at frame 0
        assert_eq!(scene.animations[0].channels[0].position_keys[0].time, 0.0);
    }

    #[test]
    pub fn empty_file_is_rejected() {
        let asset = RawAsset::new(b"version 1\n", "smd");
        assert!(SmdDecoder.read(&asset, &Config::new()).is_err());
    }
}
