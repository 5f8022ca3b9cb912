//! Decoder for 3ds Max ASCII export (`.ase` / `.ask`) files.
//!
//! The file is a tree of `*KEYWORD` lines with brace-delimited blocks. The
//! decoder walks the material list and every geometry object, producing one
//! canonical mesh per object in the verbose layout. Normals are rebuilt
//! from smoothing groups by the post pipeline unless reconstruction is
//! disabled and the file carries its own.

use {
    crate::{
        config::Config,
        imp::{Decoder, RawAsset},
        math::{vec2, vec3, Vec2, Vec3},
        scene::{
            material::{
                shading, PropertyKey, TextureStack, KEY_COLOR_AMBIENT, KEY_COLOR_DIFFUSE,
                KEY_COLOR_SPECULAR, KEY_NAME, KEY_OPACITY, KEY_SHADING_MODEL, KEY_SHININESS,
            },
            mesh::DEFAULT_MATERIAL_SENTINEL,
            Face, Material, Mesh, Node, Scene, TexCoordChannel, TextureKind,
        },
        Error, ErrorKind,
    },
};

#[derive(Default)]
struct AseMaterial {
    ambient: Vec3,
    diffuse: Vec3,
    diffuse_map: Option<String>,
    name: String,
    shine: f32,
    specular: Vec3,
    transparency: f32,
}

#[derive(Clone, Copy, Default)]
struct AseFace {
    indices: [u32; 3],
    smoothing: u32,
}

#[derive(Default)]
struct AseObject {
    faces: Vec<AseFace>,
    material: Option<u32>,
    name: String,
    normals: Vec<Vec3>,
    positions: Vec<Vec3>,
    tfaces: Vec<[u32; 3]>,
    tverts: Vec<Vec2>,
}

struct Lines<'a> {
    inner: std::str::Lines<'a>,
}

impl<'a> Lines<'a> {
    fn next(&mut self) -> Option<&'a str> {
        self.inner.next().map(str::trim)
    }
}

fn skip_block(lines: &mut Lines<'_>) {
    let mut depth = 1;
    while depth > 0 {
        let line = match lines.next() {
            Some(line) => line,
            None => return,
        };

        depth += line.matches('{').count();
        depth -= line.matches('}').count().min(depth);
    }
}

fn quoted(line: &str) -> String {
    let start = match line.find('"') {
        Some(start) => start + 1,
        None => return String::new(),
    };
    let end = line[start..].find('"').map(|e| start + e).unwrap_or_else(|| line.len());

    line[start..end].to_owned()
}

fn floats_after(line: &str, keyword: &str, out: &mut [f32]) -> bool {
    let rest = match line.strip_prefix(keyword) {
        Some(rest) => rest,
        None => return false,
    };

    let mut tokens = rest.split_whitespace();
    for val in out.iter_mut() {
        match tokens.next().and_then(|t| t.parse().ok()) {
            Some(parsed) => *val = parsed,
            None => return false,
        }
    }

    true
}

pub struct AseDecoder;

impl Decoder for AseDecoder {
    fn name(&self) -> &'static str {
        "ASE"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "ase" || extension == "ask"
    }

    fn read(&self, asset: &RawAsset<'_>, config: &Config) -> Result<Scene, Error> {
        let text = String::from_utf8_lossy(asset.bytes);
        decode(&text, config).map_err(|err| err.with_format("ASE"))
    }
}

fn decode(text: &str, config: &Config) -> Result<Scene, Error> {
    if !text.contains("*3DSMAX_ASCIIEXPORT") {
        return Err(Error::new(
            ErrorKind::InvalidMagic,
            "the 3DSMAX_ASCIIEXPORT tag was not found",
        ));
    }

    let mut lines = Lines {
        inner: text.lines(),
    };
    let mut materials = vec![];
    let mut objects = vec![];
    while let Some(line) = lines.next() {
        if line.starts_with("*MATERIAL_LIST") {
            parse_material_list(&mut lines, &mut materials);
        } else if line.starts_with("*GEOMOBJECT") {
            objects.push(parse_geomobject(&mut lines));
        } else if line.ends_with('{') {
            skip_block(&mut lines);
        }
    }

    if objects.iter().all(|object| object.faces.is_empty()) {
        return Err(Error::new(ErrorKind::InvalidGeometry, "no faces loaded"));
    }

    let reconstruct = config.ase_reconstruct_normals();

    let mut scene = Scene::new();
    for material in &materials {
        scene.materials.push(convert_material(material));
    }

    scene.root = Node::new("<ASE_Root>");
    for object in objects {
        if object.faces.is_empty() {
            continue;
        }

        let mut node = Node::new(object.name.clone());
        node.meshes.push(scene.meshes.len());
        scene.root.children.push(node);
        scene.meshes.push(convert_object(object, reconstruct));
    }

    Ok(scene)
}

fn parse_material_list(lines: &mut Lines<'_>, out: &mut Vec<AseMaterial>) {
    let mut depth = 1;
    while depth > 0 {
        let line = match lines.next() {
            Some(line) => line,
            None => return,
        };

        if line.starts_with("*MATERIAL ") && line.ends_with('{') {
            out.push(parse_material(lines));
            continue;
        }

        depth += line.matches('{').count();
        depth -= line.matches('}').count().min(depth);
    }
}

fn parse_material(lines: &mut Lines<'_>) -> AseMaterial {
    let mut material = AseMaterial::default();
    let mut depth = 1;
    while depth > 0 {
        let line = match lines.next() {
            Some(line) => line,
            None => break,
        };

        let mut rgb = [0.0f32; 3];
        let mut val = [0.0f32; 1];
        if line.starts_with("*MATERIAL_NAME") {
            material.name = quoted(line);
        } else if floats_after(line, "*MATERIAL_AMBIENT", &mut rgb) {
            material.ambient = vec3(rgb[0], rgb[1], rgb[2]);
        } else if floats_after(line, "*MATERIAL_DIFFUSE", &mut rgb) {
            material.diffuse = vec3(rgb[0], rgb[1], rgb[2]);
        } else if floats_after(line, "*MATERIAL_SPECULAR", &mut rgb) {
            material.specular = vec3(rgb[0], rgb[1], rgb[2]);
        } else if floats_after(line, "*MATERIAL_SHINE ", &mut val) {
            material.shine = val[0];
        } else if floats_after(line, "*MATERIAL_TRANSPARENCY", &mut val) {
            material.transparency = val[0];
        } else if line.starts_with("*MAP_DIFFUSE") && line.ends_with('{') {
            let mut map_depth = 1;
            while map_depth > 0 {
                let line = match lines.next() {
                    Some(line) => line,
                    None => return material,
                };

                if line.starts_with("*BITMAP ") {
                    material.diffuse_map = Some(quoted(line));
                }

                map_depth += line.matches('{').count();
                map_depth -= line.matches('}').count().min(map_depth);
            }
            continue;
        }

        depth += line.matches('{').count();
        depth -= line.matches('}').count().min(depth);
    }

    material
}

fn parse_geomobject(lines: &mut Lines<'_>) -> AseObject {
    let mut object = AseObject::default();
    let mut depth = 1;
    while depth > 0 {
        let line = match lines.next() {
            Some(line) => line,
            None => break,
        };

        let mut val = [0.0f32; 1];
        if line.starts_with("*NODE_NAME") && object.name.is_empty() {
            object.name = quoted(line);
        } else if line.starts_with("*MESH_VERTEX ") {
            let mut vals = [0.0f32; 4];
            if floats_after(line, "*MESH_VERTEX ", &mut vals) {
                object.positions.push(vec3(vals[1], vals[2], vals[3]));
            }
        } else if line.starts_with("*MESH_TVERT ") {
            let mut vals = [0.0f32; 4];
            if floats_after(line, "*MESH_TVERT ", &mut vals) {
                object.tverts.push(vec2(vals[1], vals[2]));
            }
        } else if line.starts_with("*MESH_TFACE ") {
            let mut vals = [0.0f32; 4];
            if floats_after(line, "*MESH_TFACE ", &mut vals) {
                object.tfaces.push([vals[1] as u32, vals[2] as u32, vals[3] as u32]);
            }
        } else if line.starts_with("*MESH_FACE ") {
            if let Some(face) = parse_face_line(line) {
                object.faces.push(face);
            }
        } else if line.starts_with("*MESH_VERTEXNORMAL") {
            let mut vals = [0.0f32; 4];
            if floats_after(line, "*MESH_VERTEXNORMAL", &mut vals) {
                object.normals.push(vec3(vals[1], vals[2], vals[3]));
            }
        } else if floats_after(line, "*MATERIAL_REF", &mut val) {
            object.material = Some(val[0] as u32);
        }

        depth += line.matches('{').count();
        depth -= line.matches('}').count().min(depth);
    }

    object
}

// *MESH_FACE 0: A: 0 B: 1 C: 2 AB: 1 BC: 1 CA: 0 *MESH_SMOOTHING 1,3 *MESH_MTLID 0
fn parse_face_line(line: &str) -> Option<AseFace> {
    let mut face = AseFace::default();
    let mut tokens = line.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        match token {
            "A:" => face.indices[0] = tokens.next()?.parse().ok()?,
            "B:" => face.indices[1] = tokens.next()?.parse().ok()?,
            "C:" => face.indices[2] = tokens.next()?.parse().ok()?,
            "*MESH_SMOOTHING" => {
                // a comma separated list of group numbers, possibly absent
                if let Some(groups) = tokens.peek() {
                    if !groups.starts_with('*') {
                        for group in groups.split(',') {
                            if let Ok(group) = group.parse::<u32>() {
                                face.smoothing |= 1 << (group & 31);
                            }
                        }
                        tokens.next();
                    }
                }
            }
            _ => (),
        }
    }

    Some(face)
}

fn convert_material(src: &AseMaterial) -> Material {
    let mut res = Material::new();
    res.add_str(PropertyKey::scalar(KEY_NAME), src.name.clone());
    res.add_color(PropertyKey::scalar(KEY_COLOR_AMBIENT), src.ambient);
    res.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), src.diffuse);
    res.add_color(PropertyKey::scalar(KEY_COLOR_SPECULAR), src.specular);
    res.add_f32(PropertyKey::scalar(KEY_OPACITY), 1.0 - src.transparency);
    res.add_i32(PropertyKey::scalar(KEY_SHADING_MODEL), shading::GOURAUD);
    if src.shine > 0.0 {
        res.add_f32(PropertyKey::scalar(KEY_SHININESS), src.shine);
    }
    if let Some(map) = &src.diffuse_map {
        res.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0),
            map.clone(),
        );
    }

    res
}

fn convert_object(object: AseObject, reconstruct_normals: bool) -> Mesh {
    let mut mesh = Mesh::default();
    mesh.material = object.material.unwrap_or(DEFAULT_MATERIAL_SENTINEL);

    let has_uv = !object.tverts.is_empty();
    let mut uv = vec![];

    // the file stores one normal per face corner, in face order
    let use_normals =
        !reconstruct_normals && object.normals.len() == object.faces.len() * 3;
    let mut normals = vec![];

    for (face_idx, face) in object.faces.iter().enumerate() {
        let base = mesh.positions.len() as u32;
        for (corner, &index) in face.indices.iter().enumerate() {
            let position = object
                .positions
                .get(index as usize)
                .copied()
                .unwrap_or_else(|| {
                    warn!("face index {} is out of range", index);
                    Vec3::ZERO
                });
            mesh.positions.push(position);

            if has_uv {
                let tv = object
                    .tfaces
                    .get(face_idx)
                    .and_then(|tface| object.tverts.get(tface[corner] as usize))
                    .copied()
                    .unwrap_or_default();
                uv.push(vec3(tv.x, tv.y, 0.0));
            }

            if use_normals {
                normals.push(object.normals[face_idx * 3 + corner]);
            }
        }

        mesh.faces.push(
            Face::triangle(base, base + 1, base + 2).with_smoothing(face.smoothing),
        );
    }

    if has_uv {
        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: uv,
        });
    }

    if use_normals {
        mesh.normals = Some(normals);
    }

    mesh
}
