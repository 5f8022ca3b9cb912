//! Decoder for Neutral File Format (`.nff`) scenes.
//!
//! The format is line oriented: `f` lines set the active shading state,
//! `p`/`pp` lines start polygons, and single letters introduce shape
//! primitives which are tessellated for real by [`super::shapes`].

use {
    crate::{
        config::Config,
        imp::{shapes, Decoder, RawAsset},
        math::{vec3, Mat4, Quat, Vec3},
        scene::{
            material::{
                shading, PropertyKey, KEY_COLOR_DIFFUSE, KEY_NAME, KEY_SHADING_MODEL,
            },
            Face, Material, Mesh, Node, Scene,
        },
        Error, ErrorKind,
    },
};

#[derive(Clone, Copy, PartialEq)]
struct ShadingInfo {
    color: Vec3,
}

impl Default for ShadingInfo {
    fn default() -> Self {
        Self {
            color: vec3(0.6, 0.6, 0.6),
        }
    }
}

struct MeshInfo {
    faces: Vec<usize>,
    has_normals: bool,
    /// Shape meshes never absorb later polygons.
    locked: bool,
    name: String,
    normals: Vec<Vec3>,
    shader: ShadingInfo,
    transform: Mat4,
    vertices: Vec<Vec3>,
}

impl MeshInfo {
    fn new(has_normals: bool, locked: bool) -> Self {
        Self {
            faces: vec![],
            has_normals,
            locked,
            name: String::new(),
            normals: vec![],
            shader: ShadingInfo::default(),
            transform: Mat4::IDENTITY,
            vertices: vec![],
        }
    }
}

fn floats(tokens: &mut std::str::SplitWhitespace<'_>, out: &mut [f32]) -> bool {
    for val in out.iter_mut() {
        match tokens.next().and_then(|t| t.parse().ok()) {
            Some(parsed) => *val = parsed,
            None => return false,
        }
    }

    true
}

pub struct NffDecoder;

impl Decoder for NffDecoder {
    fn name(&self) -> &'static str {
        "NFF"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "nff" || extension == "enff"
    }

    fn read(&self, asset: &RawAsset<'_>, _config: &Config) -> Result<Scene, Error> {
        let text = String::from_utf8_lossy(asset.bytes);
        decode(&text).map_err(|err| err.with_format("NFF"))
    }
}

fn decode(text: &str) -> Result<Scene, Error> {
    let mut meshes: Vec<MeshInfo> = vec![];
    let mut shader = ShadingInfo::default();
    let mut tessellation = 4u32;
    let mut shape_counts = [0u32; 6];

    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().unwrap_or("");
        match keyword {
            // shading state: color then reflectance parameters
            "f" => {
                let mut rgb = [0.0f32; 3];
                if floats(&mut tokens, &mut rgb) {
                    shader = ShadingInfo {
                        color: vec3(rgb[0], rgb[1], rgb[2]),
                    };
                }
            }
            // polygon, optionally with per-vertex normals
            "p" | "pp" => {
                let has_normals = keyword == "pp";
                let count: usize = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);

                let mesh_idx = match meshes
                    .iter()
                    .position(|m| !m.locked && m.has_normals == has_normals && m.shader == shader)
                {
                    Some(idx) => idx,
                    None => {
                        let mut mesh = MeshInfo::new(has_normals, false);
                        mesh.shader = shader;
                        meshes.push(mesh);

                        meshes.len() - 1
                    }
                };
                let mesh = &mut meshes[mesh_idx];

                let base = mesh.vertices.len();
                for _ in 0..count {
                    let line = match lines.next() {
                        Some(line) => line,
                        None => {
                            error!("unexpected end of file in a polygon");
                            break;
                        }
                    };

                    let mut tokens = line.split_whitespace();
                    let mut vals = [0.0f32; 3];
                    if !floats(&mut tokens, &mut vals) {
                        error!("malformed polygon vertex line");
                        continue;
                    }
                    mesh.vertices.push(vec3(vals[0], vals[1], vals[2]));

                    if has_normals {
                        let mut normal = [0.0f32; 3];
                        if floats(&mut tokens, &mut normal) {
                            mesh.normals.push(vec3(normal[0], normal[1], normal[2]));
                        } else {
                            mesh.normals.push(Vec3::ZERO);
                        }
                    }
                }

                let got = mesh.vertices.len() - base;
                if got >= 3 {
                    // flip the face order
                    mesh.vertices[base..].reverse();
                    if has_normals {
                        mesh.normals[base..].reverse();
                    }
                    mesh.faces.push(got);
                } else if got > 0 {
                    warn!("polygon with fewer than 3 vertices ignored");
                    mesh.vertices.truncate(base);
                    mesh.normals.truncate(base.min(mesh.normals.len()));
                }
            }
            // tessellation selector for the shape primitives
            "tess" => {
                tessellation = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(4);
            }
            "s" | "dod" | "oct" | "tet" | "hex" => {
                let mut vals = [0.0f32; 6];
                let mut have = 0;
                for slot in 0..6 {
                    match tokens.next().and_then(|t| t.parse().ok()) {
                        Some(parsed) => {
                            vals[slot] = parsed;
                            have += 1;
                        }
                        None => break,
                    }
                }
                if have < 4 {
                    error!("shape primitive with too few parameters");
                    continue;
                }

                let center = vec3(vals[0], vals[1], vals[2]);
                let radius = vals[3];

                let mut mesh = MeshInfo::new(false, true);
                mesh.shader = shader;
                mesh.transform = Mat4::from_translation(center)
                    * Mat4::from_scale(vec3(radius, radius, radius));

                let (slot, label) = match keyword {
                    "s" => (0, "sphere"),
                    "dod" => (1, "dodecahedron"),
                    "oct" => (2, "octahedron"),
                    "tet" => (3, "tetrahedron"),
                    _ => (4, "hexahedron"),
                };
                match keyword {
                    "s" => shapes::make_sphere(tessellation.min(6), &mut mesh.vertices),
                    "dod" => shapes::make_dodecahedron(&mut mesh.vertices),
                    "oct" => shapes::make_octahedron(&mut mesh.vertices),
                    "tet" => shapes::make_tetrahedron(&mut mesh.vertices),
                    _ => shapes::make_hexahedron(&mut mesh.vertices),
                }

                mesh.faces = vec![3; mesh.vertices.len() / 3];
                mesh.name = format!("{}_{}", label, shape_counts[slot]);
                shape_counts[slot] += 1;
                meshes.push(mesh);
            }
            // cone or cylinder: two center lines with radii
            "c" => {
                let mut base = [0.0f32; 4];
                let mut apex = [0.0f32; 4];
                let ok = {
                    let mut first = tokens;
                    let base_ok = floats(&mut first, &mut base)
                        || match lines.next() {
                            Some(line) => floats(&mut line.split_whitespace(), &mut base),
                            None => false,
                        };
                    let apex_ok = match lines.next() {
                        Some(line) => floats(&mut line.split_whitespace(), &mut apex),
                        None => false,
                    };

                    base_ok && apex_ok
                };
                if !ok {
                    error!("malformed cone primitive");
                    continue;
                }

                let bottom = vec3(base[0], base[1], base[2]);
                let top = vec3(apex[0], apex[1], apex[2]);
                let axis = top - bottom;
                let height = axis.length();
                if height <= 0.0 {
                    warn!("cone with zero length ignored");
                    continue;
                }

                let mut mesh = MeshInfo::new(false, true);
                mesh.shader = shader;
                mesh.transform = Mat4::from_translation(bottom)
                    * Mat4::from_quat(Quat::from_rotation_arc(Vec3::Y, axis / height));
                shapes::make_cone(height, base[3], apex[3], 16, &mut mesh.vertices);
                mesh.faces = vec![3; mesh.vertices.len() / 3];
                mesh.name = format!("cone_{}", shape_counts[5]);
                shape_counts[5] += 1;
                meshes.push(mesh);
            }
            // viewport and lighting state is not imported
            "v" | "b" | "l" | "from" | "at" | "up" | "angle" | "hither" | "resolution" => (),
            _ => (),
        }
    }

    meshes.retain(|mesh| !mesh.faces.is_empty());
    if meshes.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "no usable geometry found",
        ));
    }

    let mut scene = Scene::new();
    scene.root = Node::new("<NFF_Root>");
    for (index, info) in meshes.into_iter().enumerate() {
        let mut mesh = Mesh::default();
        mesh.material = index as u32;
        mesh.positions = info.vertices;
        if info.has_normals {
            mesh.normals = Some(info.normals);
        }

        let mut cursor = 0u32;
        for count in &info.faces {
            let indices = (cursor..cursor + *count as u32).collect();
            cursor += *count as u32;

            // shapes smooth across their whole surface
            let smoothing = if info.locked { 1 } else { 0 };
            mesh.faces.push(Face { indices, smoothing });
        }

        let mut material = Material::new();
        material.add_str(PropertyKey::scalar(KEY_NAME), format!("shader_{}", index));
        material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), info.shader.color);
        material.add_i32(PropertyKey::scalar(KEY_SHADING_MODEL), shading::GOURAUD);
        scene.materials.push(material);

        let mut node = Node::new(if info.name.is_empty() {
            format!("poly_{}", index)
        } else {
            info.name
        });
        node.transform = info.transform;
        node.meshes.push(scene.meshes.len());
        scene.root.children.push(node);
        scene.meshes.push(mesh);
    }

    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn polygons_group_by_shader() {
        let text = "f 1.0 0.0 0.0 1 0 0 0 1\np 3\n0 0 0\n1 0 0\n0 1 0\np 3\n0 0 1\n1 0 1\n0 1 1\n";
        let scene = decode(text).unwrap();

        // both polygons share the shading state, so one mesh results
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].faces.len(), 2);
        assert_eq!(scene.meshes[0].vertex_count(), 6);
        assert_eq!(
            scene.materials[0].get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE)),
            Some(vec3(1.0, 0.0, 0.0))
        );
    }

    #[test]
    pub fn sphere_primitive_tessellates() {
        let scene = decode("s 1.0 2.0 3.0 0.5\n").unwrap();

        assert_eq!(scene.meshes.len(), 1);
        assert!(!scene.meshes[0].faces.is_empty());

        let node = &scene.root.children[0];
        assert_eq!(node.name, "sphere_0");

        // center lands in the node transform
        let translation = node.transform.w_axis;
        assert_eq!(
            vec3(translation.x, translation.y, translation.z),
            vec3(1.0, 2.0, 3.0)
        );
    }

    #[test]
    pub fn normals_polygon_keeps_its_normals() {
        let text = "pp 3\n0 0 0 0 0 1\n1 0 0 0 0 1\n0 1 0 0 0 1\n";
        let scene = decode(text).unwrap();

        let normals = scene.meshes[0].normals.as_ref().unwrap();
        assert_eq!(normals.len(), 3);
        assert_eq!(normals[0], vec3(0.0, 0.0, 1.0));
    }

    #[test]
    pub fn empty_input_is_rejected() {
        assert!(decode("b 0.1 0.2 0.3\n").is_err());
    }
}
