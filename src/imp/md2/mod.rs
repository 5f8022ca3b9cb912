//! Decoder for Quake II `.md2` models.
//!
//! The file is one fixed header with offsets to skins, texture coordinates,
//! triangles and frames. Vertex positions are stored compressed as three
//! bytes scaled and translated per frame; normals come from a 162-entry
//! lookup table.

mod normal_table;

use {
    crate::{
        config::Config,
        imp::{Decoder, RawAsset},
        math::{vec3, Vec3},
        scene::{
            material::{
                shading, PropertyKey, TextureStack, KEY_COLOR_AMBIENT, KEY_COLOR_DIFFUSE,
                KEY_COLOR_SPECULAR, KEY_SHADING_MODEL,
            },
            Face, Material, Mesh, Node, Scene, TexCoordChannel, TextureKind,
        },
        ByteReader, Error, ErrorKind,
    },
};

const NAN: f32 = f32::NAN;

const HEADER_SIZE: usize = 68;
const MAGIC_LE: u32 = 0x3250_4449; // "IDP2"
const MAGIC_BE: u32 = 0x4944_5032;
const VERSION: u32 = 8;

struct Header {
    frame_size: u32,
    num_frames: u32,
    num_skins: u32,
    num_tex_coords: u32,
    num_triangles: u32,
    num_vertices: u32,
    offset_end: u32,
    offset_frames: u32,
    offset_skins: u32,
    offset_tex_coords: u32,
    offset_triangles: u32,
    skin_height: u32,
    skin_width: u32,
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<Header, Error> {
    let magic = reader.read_u32()?;
    if magic != MAGIC_LE && magic != MAGIC_BE {
        return Err(Error::new(
            ErrorKind::InvalidMagic,
            "magic bytes IDP2 not found",
        ));
    }

    let version = reader.read_u32()?;
    if version != VERSION {
        warn!("unsupported file version {}, expecting 8; decoding anyway", version);
    }

    let skin_width = reader.read_u32()?;
    let skin_height = reader.read_u32()?;
    let frame_size = reader.read_u32()?;
    let num_skins = reader.read_u32()?;
    let num_vertices = reader.read_u32()?;
    let num_tex_coords = reader.read_u32()?;
    let num_triangles = reader.read_u32()?;
    let _num_gl_cmds = reader.read_u32()?;
    let num_frames = reader.read_u32()?;
    let offset_skins = reader.read_u32()?;
    let offset_tex_coords = reader.read_u32()?;
    let offset_triangles = reader.read_u32()?;
    let offset_frames = reader.read_u32()?;
    let _offset_gl_cmds = reader.read_u32()?;
    let offset_end = reader.read_u32()?;

    Ok(Header {
        frame_size,
        num_frames,
        num_skins,
        num_tex_coords,
        num_triangles,
        num_vertices,
        offset_end,
        offset_frames,
        offset_skins,
        offset_tex_coords,
        offset_triangles,
        skin_height,
        skin_width,
    })
}

pub struct Md2Decoder;

impl Decoder for Md2Decoder {
    fn name(&self) -> &'static str {
        "MD2"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "md2"
    }

    fn read(&self, asset: &RawAsset<'_>, config: &Config) -> Result<Scene, Error> {
        read_md2(asset.bytes, config).map_err(|err| err.with_format("MD2"))
    }
}

fn read_md2(bytes: &[u8], config: &Config) -> Result<Scene, Error> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::new(
            ErrorKind::FileTooSmall,
            "the file is too small to contain the header",
        ));
    }

    let mut reader = ByteReader::new(bytes);
    let header = read_header(&mut reader)?;
    if header.num_frames == 0 {
        return Err(Error::new(ErrorKind::InvalidGeometry, "NUM_FRAMES is 0"));
    }

    if header.offset_end as usize > bytes.len() {
        return Err(Error::new(
            ErrorKind::FileTooSmall,
            "the file is shorter than its header declares",
        ));
    }

    let mut frame = config.global_keyframe();
    if frame >= header.num_frames {
        warn!(
            "keyframe {} was requested but the file has {} frames",
            frame, header.num_frames
        );
        frame = header.num_frames - 1;
    }

    // frame header: scale, translation and a 16 byte name, then one
    // compressed vertex per slot
    reader.seek(header.offset_frames as usize + frame as usize * header.frame_size as usize)?;
    let scale = vec3(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);
    let translate = vec3(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);
    reader.skip(16)?;

    let vertex_count = header.num_vertices as usize;
    let mut positions = Vec::with_capacity(vertex_count);
    let mut normals = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let x = reader.read_u8()? as f32 * scale.x + translate.x;
        let z = reader.read_u8()? as f32 * scale.y + translate.y;
        let y = reader.read_u8()? as f32 * scale.z + translate.z;

        // Quake uses z-up; flip the y and z components
        positions.push(vec3(x, y, z));

        let normal_idx = (reader.read_u8()? as usize).min(normal_table::NORMALS.len() - 1);
        let normal = normal_table::NORMALS[normal_idx];
        normals.push(vec3(normal[0], normal[2], normal[1]));
    }

    let mut texcoords = vec![vec3(NAN, NAN, 0.0); vertex_count];
    let has_uv = header.num_tex_coords > 0;

    let mut material = Material::new();
    material.add_i32(PropertyKey::scalar(KEY_SHADING_MODEL), shading::GOURAUD);
    if has_uv && header.num_skins > 0 {
        material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), Vec3::ONE);
        material.add_color(PropertyKey::scalar(KEY_COLOR_SPECULAR), Vec3::ONE);
        material.add_color(
            PropertyKey::scalar(KEY_COLOR_AMBIENT),
            vec3(0.05, 0.05, 0.05),
        );

        // the first skin becomes the diffuse texture
        reader.seek(header.offset_skins as usize)?;
        let (skin, _) = reader.read_cstr_bounded(64)?;
        material.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0),
            skin,
        );
    } else {
        material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), vec3(0.6, 0.6, 0.6));
        material.add_color(PropertyKey::scalar(KEY_COLOR_SPECULAR), vec3(0.6, 0.6, 0.6));
        material.add_color(
            PropertyKey::scalar(KEY_COLOR_AMBIENT),
            vec3(0.05, 0.05, 0.05),
        );
    }

    let mut mesh = Mesh::default();
    mesh.material = 0;

    for tri in 0..header.num_triangles as usize {
        reader.seek(header.offset_triangles as usize + tri * 12)?;
        let mut vertex_indices = [0u32; 3];
        for slot in &mut vertex_indices {
            let index = reader.read_u16()? as u32;
            *slot = if index >= header.num_vertices {
                warn!("triangle vertex index is out of range");
                header.num_vertices - 1
            } else {
                index
            };
        }

        if has_uv {
            let mut uv_indices = [0u32; 3];
            for slot in &mut uv_indices {
                let index = reader.read_u16()? as u32;
                *slot = if index >= header.num_tex_coords {
                    warn!("triangle texture index is out of range");
                    header.num_tex_coords - 1
                } else {
                    index
                };
            }

            for corner in 0..3 {
                let mut cursor = ByteReader::new(bytes);
                cursor.seek(
                    header.offset_tex_coords as usize + uv_indices[corner] as usize * 4,
                )?;
                let u = cursor.read_i16()? as f32 / header.skin_width.max(1) as f32;
                let v = cursor.read_i16()? as f32 / header.skin_height.max(1) as f32;

                let slot = vertex_indices[corner] as usize;
                let existing = texcoords[slot];
                if !existing.x.is_nan() && (existing.x != u || existing.y != v) {
                    // the same position is used with a different UV; give
                    // this corner its own vertex
                    positions.push(positions[slot]);
                    normals.push(normals[slot]);
                    texcoords.push(vec3(u, v, 0.0));
                    vertex_indices[corner] = positions.len() as u32 - 1;
                } else {
                    texcoords[slot] = vec3(u, v, 0.0);
                }
            }
        }

        mesh.faces.push(Face::triangle(
            vertex_indices[0],
            vertex_indices[1],
            vertex_indices[2],
        ));
    }

    mesh.positions = positions;
    mesh.normals = Some(normals);
    if has_uv {
        for uv in &mut texcoords {
            if uv.x.is_nan() {
                *uv = vec3(0.0, 0.0, 0.0);
            }
        }
        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: texcoords,
        });
    }

    let mut scene = Scene::new();
    scene.materials.push(material);
    scene.meshes.push(mesh);
    scene.root = Node::new("<MD2>");
    scene.root.meshes.push(0);

    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u32(buf: &mut Vec<u8>, val: u32) {
        buf.extend_from_slice(&val.to_le_bytes());
    }

    fn minimal_md2() -> Vec<u8> {
        // one frame, three vertices, one triangle, no skins or UVs
        let mut buf = vec![];
        put_u32(&mut buf, MAGIC_LE);
        put_u32(&mut buf, VERSION);
        put_u32(&mut buf, 64); // skin width
        put_u32(&mut buf, 64); // skin height
        put_u32(&mut buf, 40 + 3 * 4); // frame size
        put_u32(&mut buf, 0); // skins
        put_u32(&mut buf, 3); // vertices
        put_u32(&mut buf, 0); // tex coords
        put_u32(&mut buf, 1); // triangles
        put_u32(&mut buf, 0); // gl cmds
        put_u32(&mut buf, 1); // frames
        put_u32(&mut buf, 68); // offset skins
        put_u32(&mut buf, 68); // offset tex coords
        put_u32(&mut buf, 68); // offset triangles
        put_u32(&mut buf, 68 + 12); // offset frames
        put_u32(&mut buf, 0); // offset gl cmds

        let end = 68 + 12 + 40 + 3 * 4;
        put_u32(&mut buf, end as u32);

        // triangle
        for index in [0u16, 1, 2, 0, 0, 0] {
            buf.extend_from_slice(&index.to_le_bytes());
        }

        // frame: scale 1, translate 0, name, verts
        for val in [1.0f32, 1.0, 1.0, 0.0, 0.0, 0.0] {
            buf.extend_from_slice(&val.to_le_bytes());
        }
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&[0, 0, 0, 0]); // vertex 0
        buf.extend_from_slice(&[10, 0, 0, 0]); // vertex 1
        buf.extend_from_slice(&[0, 10, 0, 0]); // vertex 2

        buf
    }

    #[test]
    pub fn decodes_minimal_model() {
        let buf = minimal_md2();
        let scene = read_md2(&buf, &Config::new()).unwrap();

        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.materials.len(), 1);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.positions[1], vec3(10.0, 0.0, 0.0));

        // the y byte lands in the z component
        assert_eq!(mesh.positions[2], vec3(0.0, 0.0, 10.0));
        assert!(mesh.normals.is_some());
    }

    #[test]
    pub fn short_file_is_rejected() {
        let err = read_md2(&[0u8; 20], &Config::new()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::FileTooSmall));
    }

    #[test]
    pub fn wrong_magic_is_rejected() {
        let mut buf = minimal_md2();
        buf[0] = b'X';

        let err = read_md2(&buf, &Config::new()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidMagic));
    }

    #[test]
    pub fn normal_table_entries_are_unit_length() {
        for normal in normal_table::NORMALS.iter() {
            let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2])
                .sqrt();
            assert!((len - 1.0).abs() < 1e-3);
        }
    }
}
